//! Pattern wire format: note lists, playback options and music piece layouts.

use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::note::{Note, NoteInput, STANDARD_A4};

/// An ordered, immutable note list.
///
/// The note storage is reference counted so every sequence playing the
/// pattern (including sliced prelude/loop parts) shares it rather than
/// copying it.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    notes: Rc<[Note]>,
}

impl Pattern {
    pub fn new(notes: Vec<Note>) -> Self {
        Self { notes: notes.into() }
    }

    /// Parse shorthand entries against A4 = 440 Hz.
    pub fn parse(entries: &[&str]) -> Self {
        Self::new(entries.iter().map(|e| Note::parse(e)).collect())
    }

    pub fn from_inputs(inputs: Vec<NoteInput>, a4: f64) -> Self {
        Self::new(inputs.into_iter().map(|n| n.into_note(a4)).collect())
    }

    /// Parse a JSON array of shorthand strings and/or structured notes.
    pub fn from_json(json: &str, a4: f64) -> serde_json::Result<Self> {
        let inputs: Vec<NoteInput> = serde_json::from_str(json)?;
        Ok(Self::from_inputs(inputs, a4))
    }

    pub fn notes(&self) -> &Rc<[Note]> {
        &self.notes
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }
}

impl From<Vec<Note>> for Pattern {
    fn from(notes: Vec<Note>) -> Self {
        Self::new(notes)
    }
}

impl Default for Pattern {
    fn default() -> Self {
        Self::parse(&[])
    }
}

/// Per-pattern playback options. Unset fields fall back to the engine
/// defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternOptions {
    /// Beats per minute
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tempo: Option<f64>,
    /// Loop window `[start, end)` in note indices
    #[serde(default, rename = "loop", skip_serializing_if = "Option::is_none")]
    pub loop_window: Option<[i64; 2]>,
    /// Fraction of each note silenced at its tail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staccato: Option<f64>,
    /// Portamento fraction of a beat
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smoothing: Option<f64>,
}

impl PatternOptions {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn with_tempo(mut self, tempo: f64) -> Self {
        self.tempo = Some(tempo);
        self
    }

    pub fn with_loop(mut self, start: i64, end: i64) -> Self {
        self.loop_window = Some([start, end]);
        self
    }

    pub fn with_staccato(mut self, staccato: f64) -> Self {
        self.staccato = Some(staccato);
        self
    }

    pub fn with_smoothing(mut self, smoothing: f64) -> Self {
        self.smoothing = Some(smoothing);
        self
    }
}

/// A multi-part piece: one sfx slot index per channel position.
/// `null` and negative entries are holes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MusicPattern {
    parts: Vec<Option<i64>>,
}

impl MusicPattern {
    pub fn new(parts: Vec<Option<i64>>) -> Self {
        Self { parts }
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Sfx slot per position, `None` for holes.
    pub fn parts(&self) -> impl Iterator<Item = Option<usize>> + '_ {
        self.parts
            .iter()
            .map(|p| p.and_then(|idx| usize::try_from(idx).ok()))
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

impl From<Vec<Option<i64>>> for MusicPattern {
    fn from(parts: Vec<Option<i64>>) -> Self {
        Self::new(parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::EffectMethod;
    use crate::waveform::{WaveShape, WaveformRef};

    #[test]
    fn test_pattern_from_json() {
        let json = r#"[
            "C3 q",
            { "note": "E3 e 0.5", "fx": [ { "method": "arp", "value": 8 } ], "waveform": "sine" },
            "- s"
        ]"#;
        let pattern = Pattern::from_json(json, STANDARD_A4).unwrap();
        assert_eq!(pattern.len(), 3);
        let second = &pattern.notes()[1];
        assert_eq!(second.volume, 0.5);
        assert_eq!(second.effects[0].method, EffectMethod::Arp);
        assert_eq!(second.waveform, Some(WaveformRef::Builtin(WaveShape::Sine)));
        assert!(pattern.notes()[2].is_rest());
    }

    #[test]
    fn test_options_from_json() {
        let opts = PatternOptions::from_json(r#"{ "tempo": 90, "loop": [2, 6] }"#).unwrap();
        assert_eq!(opts.tempo, Some(90.0));
        assert_eq!(opts.loop_window, Some([2, 6]));
        assert_eq!(opts.staccato, None);
    }

    #[test]
    fn test_music_holes() {
        let music = MusicPattern::from_json("[0, null, 2, -1]").unwrap();
        let parts: Vec<Option<usize>> = music.parts().collect();
        assert_eq!(parts, vec![Some(0), None, Some(2), None]);
    }

    #[test]
    fn test_clones_share_notes() {
        let pattern = Pattern::parse(&["C3 q", "D3 q"]);
        let copy = pattern.clone();
        assert!(Rc::ptr_eq(pattern.notes(), copy.notes()));
    }
}
