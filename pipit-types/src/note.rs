//! Note notation parser.
//!
//! Shorthand form: `"<TONE><OCT> <DURATION> <VOLUME?>"`, e.g. `"C#3 es 0.5"`.
//! Structured form: `{"note": "C3 q", "fx": [...], "waveform": "sine"}`.
//! Both normalize to the same [`Note`].

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::effect::EffectDescriptor;
use crate::waveform::WaveformRef;

/// Octave used when the tone token carries no octave number.
pub const DEFAULT_OCTAVE: i32 = 4;

/// Volume used when the volume token is absent or unparsable.
pub const DEFAULT_VOLUME: f64 = 1.0;

/// Standard concert pitch for A4.
pub const STANDARD_A4: f64 = 440.0;

/// Pitch class after enharmonic folding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tone {
    C,
    Cs,
    D,
    Ds,
    E,
    F,
    Fs,
    G,
    Gs,
    A,
    As,
    B,
}

impl Tone {
    pub const ALL: [Tone; 12] = [
        Tone::C,
        Tone::Cs,
        Tone::D,
        Tone::Ds,
        Tone::E,
        Tone::F,
        Tone::Fs,
        Tone::G,
        Tone::Gs,
        Tone::A,
        Tone::As,
        Tone::B,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Tone::C => "C",
            Tone::Cs => "C#",
            Tone::D => "D",
            Tone::Ds => "D#",
            Tone::E => "E",
            Tone::F => "F",
            Tone::Fs => "F#",
            Tone::G => "G",
            Tone::Gs => "G#",
            Tone::A => "A",
            Tone::As => "A#",
            Tone::B => "B",
        }
    }

    /// Distance in semitones from C within the same octave number
    pub fn semitone(&self) -> i32 {
        match self {
            Tone::C => 0,
            Tone::Cs => 1,
            Tone::D => 2,
            Tone::Ds => 3,
            Tone::E => 4,
            Tone::F => 5,
            Tone::Fs => 6,
            Tone::G => 7,
            Tone::Gs => 8,
            Tone::A => 9,
            Tone::As => 10,
            Tone::B => 11,
        }
    }

    /// Resolve a spelled tone (letter plus optional `#`/`b`) through the
    /// enharmonic table. `Cb` and `B#` fold within the written octave.
    pub fn from_spelling(letter: char, accidental: Option<char>) -> Option<Tone> {
        let tone = match (letter.to_ascii_uppercase(), accidental) {
            ('C', None) | ('B', Some('#')) => Tone::C,
            ('C', Some('#')) | ('D', Some('b')) => Tone::Cs,
            ('D', None) => Tone::D,
            ('D', Some('#')) | ('E', Some('b')) => Tone::Ds,
            ('E', None) | ('F', Some('b')) => Tone::E,
            ('F', None) | ('E', Some('#')) => Tone::F,
            ('F', Some('#')) | ('G', Some('b')) => Tone::Fs,
            ('G', None) => Tone::G,
            ('G', Some('#')) | ('A', Some('b')) => Tone::Gs,
            ('A', None) => Tone::A,
            ('A', Some('#')) | ('B', Some('b')) => Tone::As,
            ('B', None) | ('C', Some('b')) => Tone::B,
            _ => return None,
        };
        Some(tone)
    }
}

/// Equal-temperament frequency of `tone` in `octave`, anchored on `a4`.
///
/// `a4 * 2^((semitone - 9) / 12) * 2^(octave - 4)`
pub fn tone_frequency(tone: Tone, octave: i32, a4: f64) -> f64 {
    let from_a = (tone.semitone() - Tone::A.semitone()) as f64;
    a4 * 2f64.powf(from_a / 12.0) * 2f64.powi(octave - DEFAULT_OCTAVE)
}

fn pitch_regex() -> &'static Regex {
    static PITCH: OnceLock<Regex> = OnceLock::new();
    PITCH.get_or_init(|| {
        Regex::new(r"^(?P<letter>[A-Ga-g])(?P<acc>[#b]?)(?P<octave>-?\d+)?$")
            .expect("pitch pattern is valid")
    })
}

/// Parse the pitch token. Rests (`-`) and unknown spellings give 0 Hz.
fn parse_pitch(token: &str, a4: f64) -> f64 {
    if token.starts_with('-') && token[1..].chars().all(|c| c.is_ascii_digit()) {
        return 0.0;
    }
    let Some(caps) = pitch_regex().captures(token) else {
        log::debug!(target: "pipit::note", "unknown tone {:?}, treating as rest", token);
        return 0.0;
    };
    let letter = caps["letter"].chars().next().unwrap_or('C');
    let accidental = caps.name("acc").and_then(|m| m.as_str().chars().next());
    let octave = caps
        .name("octave")
        .and_then(|m| m.as_str().parse::<i32>().ok())
        .unwrap_or(DEFAULT_OCTAVE);
    match Tone::from_spelling(letter, accidental) {
        Some(tone) => tone_frequency(tone, octave, a4),
        None => 0.0,
    }
}

fn letter_beats(c: char) -> f64 {
    match c {
        'w' => 4.0,
        'h' => 2.0,
        'q' => 1.0,
        'e' => 0.5,
        's' => 0.25,
        _ => 0.0,
    }
}

/// Parse a duration token into beats.
///
/// A numeric token is taken literally (`"0.125"`); otherwise each letter adds
/// its value (`w=4 h=2 q=1 e=0.5 s=0.25`), so `"es"` is 0.75. Unknown letters
/// contribute nothing.
pub fn parse_duration(token: &str) -> f64 {
    let token = token.trim();
    if token.starts_with(|c: char| c.is_ascii_digit() || c == '.') {
        if let Ok(beats) = token.parse::<f64>() {
            if beats.is_finite() && beats >= 0.0 {
                return beats;
            }
        }
    }
    token.chars().map(letter_beats).sum()
}

/// Parse the optional volume token, clamped to `[0, 1]`.
/// Absent or unparsable tokens yield [`DEFAULT_VOLUME`].
pub fn parse_volume(token: Option<&str>) -> f64 {
    token
        .and_then(|t| t.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .map(|v| v.clamp(0.0, 1.0))
        .unwrap_or(DEFAULT_VOLUME)
}

/// A single scheduled tone. Immutable once parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    /// Hz, 0 for a rest
    pub frequency: f64,
    /// In beats
    pub duration: f64,
    pub volume: f64,
    pub effects: Vec<EffectDescriptor>,
    pub waveform: Option<WaveformRef>,
}

impl Note {
    pub fn new(frequency: f64, duration: f64, volume: f64) -> Self {
        Self {
            frequency,
            duration: duration.max(0.0),
            volume,
            effects: Vec::new(),
            waveform: None,
        }
    }

    /// Parse shorthand notation against A4 = 440 Hz.
    pub fn parse(shorthand: &str) -> Self {
        Self::parse_tuned(shorthand, STANDARD_A4)
    }

    /// Parse shorthand notation against a custom A4 reference.
    pub fn parse_tuned(shorthand: &str, a4: f64) -> Self {
        let mut tokens = shorthand.split_whitespace();
        let frequency = tokens.next().map_or(0.0, |t| parse_pitch(t, a4));
        let duration = tokens.next().map_or(0.0, parse_duration);
        let volume = parse_volume(tokens.next());
        Self::new(frequency, duration, volume)
    }

    pub fn with_effects(mut self, effects: Vec<EffectDescriptor>) -> Self {
        self.effects = effects;
        self
    }

    pub fn with_waveform(mut self, waveform: WaveformRef) -> Self {
        self.waveform = Some(waveform);
        self
    }

    pub fn is_rest(&self) -> bool {
        self.frequency == 0.0
    }
}

/// Raw note entry as it appears in a pattern: shorthand string or
/// structured object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NoteInput {
    Shorthand(String),
    Structured {
        note: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        fx: Vec<EffectDescriptor>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        waveform: Option<WaveformRef>,
    },
}

impl NoteInput {
    pub fn into_note(self, a4: f64) -> Note {
        match self {
            NoteInput::Shorthand(s) => Note::parse_tuned(&s, a4),
            NoteInput::Structured { note, fx, waveform } => {
                let mut parsed = Note::parse_tuned(&note, a4).with_effects(fx);
                parsed.waveform = waveform;
                parsed
            }
        }
    }
}

impl From<&str> for NoteInput {
    fn from(s: &str) -> Self {
        NoteInput::Shorthand(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_a4_is_reference() {
        assert!(close(Note::parse("A4 q").frequency, 440.0));
        assert!(close(Note::parse("A q").frequency, 440.0));
    }

    #[test]
    fn test_octave_doubles() {
        for tone in Tone::ALL {
            for octave in 0..8 {
                let low = tone_frequency(tone, octave, STANDARD_A4);
                let high = tone_frequency(tone, octave + 1, STANDARD_A4);
                assert!(close(high, low * 2.0), "{} {}", tone.name(), octave);
            }
        }
    }

    #[test]
    fn test_enharmonics() {
        assert_eq!(Tone::from_spelling('D', Some('b')), Some(Tone::Cs));
        assert_eq!(Tone::from_spelling('e', Some('#')), Some(Tone::F));
        assert_eq!(Tone::from_spelling('C', Some('b')), Some(Tone::B));
        assert!(close(Note::parse("Bb3 q").frequency, Note::parse("A#3 q").frequency));
        assert!(close(Note::parse("C4 q").frequency, 261.6255653005986));
    }

    #[test]
    fn test_durations() {
        assert_eq!(parse_duration("q"), 1.0);
        assert_eq!(parse_duration("h"), 2.0);
        assert_eq!(parse_duration("es"), 0.75);
        assert_eq!(parse_duration("0.125"), 0.125);
        assert_eq!(parse_duration("wh"), 6.0);
        assert_eq!(parse_duration("xq"), 1.0);
        assert_eq!(parse_duration("zz"), 0.0);
    }

    #[test]
    fn test_rest() {
        let rest = Note::parse("- e");
        assert_eq!(rest.frequency, 0.0);
        assert_eq!(rest.duration, 0.5);
        assert_eq!(rest.volume, 1.0);
        assert!(rest.is_rest());
    }

    #[test]
    fn test_volume() {
        assert_eq!(Note::parse("C3 q 0.25").volume, 0.25);
        assert_eq!(Note::parse("C3 q loud").volume, 1.0);
        assert_eq!(Note::parse("C3 q 0").volume, 0.0);
        assert_eq!(Note::parse("C3 q 7").volume, 1.0);
    }

    #[test]
    fn test_unknown_tone_is_rest() {
        let note = Note::parse("H3 q");
        assert_eq!(note.frequency, 0.0);
        assert_eq!(note.duration, 1.0);
    }

    #[test]
    fn test_structured_matches_shorthand() {
        let json = r#"[ "C3 q", { "note": "C3 q" } ]"#;
        let inputs: Vec<NoteInput> = serde_json::from_str(json).unwrap();
        let notes: Vec<Note> = inputs.into_iter().map(|n| n.into_note(STANDARD_A4)).collect();
        assert_eq!(notes[0], notes[1]);
    }

    #[test]
    fn test_custom_tuning() {
        let note = Note::parse_tuned("A4 q", 432.0);
        assert!(close(note.frequency, 432.0));
    }
}
