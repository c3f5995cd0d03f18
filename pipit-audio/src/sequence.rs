//! Sequencer: one voice playing one note range.
//!
//! A pass is scheduled up front: every frequency, gain, slide, effect and
//! cutoff for the whole range is committed to the device before the voice
//! starts. The device reports the voice once its stop time is rendered, and
//! the owner feeds that back as [`SequenceEvent::PassExhausted`] to rewind or
//! finish. The sequence never touches channel state.

use std::collections::HashMap;
use std::ops::Range;
use std::rc::Rc;

use pipit_types::{Note, WaveformRef};

use crate::automation::{apply_effects, ArpSource, NoteWindow, ScheduleError};
use crate::device::{
    AudioDevice, Automation, DeviceResult, Oscillator, Route, VoiceId, VoiceParam, WaveHandle,
};
use crate::poller::{WaveformMarker, WaveformPoller, DEFAULT_POLL_INTERVAL};

pub const DEFAULT_TEMPO: f64 = 132.0;

/// What to play and how.
#[derive(Debug, Clone, PartialEq)]
pub struct SequencePlan {
    /// Full unsliced note list, shared with the pattern slot
    pub source: Rc<[Note]>,
    /// Absolute range of `source` this sequence plays
    pub range: Range<usize>,
    /// Beats per minute
    pub tempo: f64,
    pub looping: bool,
    pub staccato: f64,
    pub smoothing: f64,
    /// Waveform for notes that carry none
    pub waveform: WaveformRef,
}

impl SequencePlan {
    pub fn new(source: Rc<[Note]>) -> Self {
        let range = 0..source.len();
        Self {
            source,
            range,
            tempo: DEFAULT_TEMPO,
            looping: false,
            staccato: 0.0,
            smoothing: 0.0,
            waveform: WaveformRef::default(),
        }
    }

    /// Restrict to `range`, clamped into the source.
    pub fn with_range(mut self, range: Range<usize>) -> Self {
        let len = self.source.len();
        let end = range.end.min(len);
        self.range = range.start.min(end)..end;
        self
    }

    pub fn with_tempo(mut self, tempo: f64) -> Self {
        if tempo.is_finite() && tempo > 0.0 {
            self.tempo = tempo;
        }
        self
    }

    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn with_staccato(mut self, staccato: f64) -> Self {
        self.staccato = clamp_unit(staccato);
        self
    }

    pub fn with_smoothing(mut self, smoothing: f64) -> Self {
        self.smoothing = clamp_unit(smoothing);
        self
    }

    pub fn with_waveform(mut self, waveform: WaveformRef) -> Self {
        self.waveform = waveform;
        self
    }

    pub fn notes(&self) -> &[Note] {
        &self.source[self.range.clone()]
    }

    /// Absolute index of the first played note.
    pub fn slice_offset(&self) -> usize {
        self.range.start
    }

    /// Seconds per beat.
    pub fn beat(&self) -> f64 {
        60.0 / self.tempo
    }

    /// Length of one pass, in seconds.
    pub fn pass_length(&self) -> f64 {
        let beat = self.beat();
        self.notes().iter().map(|n| beat * n.duration).sum()
    }

    fn waveform_of<'a>(&'a self, note: &'a Note) -> &'a WaveformRef {
        note.waveform.as_ref().unwrap_or(&self.waveform)
    }

    fn is_homogeneous(&self) -> bool {
        let mut notes = self.notes().iter();
        match notes.next() {
            Some(first) => {
                let id = self.waveform_of(first).id();
                notes.all(|n| self.waveform_of(n).id() == id)
            }
            None => true,
        }
    }
}

fn clamp_unit(v: f64) -> f64 {
    if v.is_finite() {
        v.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceState {
    Idle,
    Playing,
    Looping,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceEvent {
    /// The device rendered the current pass to its end
    PassExhausted,
    StopRequested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// A new pass started where the last one ended
    Cycled,
    /// A one-shot pass completed; the sequence is now stopped
    Finished,
    Stopped,
    /// Nothing to do in the current state
    Ignored,
}

pub struct Sequence {
    device: Rc<dyn AudioDevice>,
    plan: SequencePlan,
    route: Route,
    fade: Option<f64>,
    poll_interval: f64,
    state: SequenceState,
    voice: Option<VoiceId>,
    pass_start: f64,
    pass_end: f64,
    poller: Option<WaveformPoller>,
    waves: HashMap<String, WaveHandle>,
}

impl Sequence {
    pub fn new(device: Rc<dyn AudioDevice>, plan: SequencePlan) -> Self {
        Self {
            device,
            plan,
            route: Route::Output,
            fade: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            state: SequenceState::Idle,
            voice: None,
            pass_start: 0.0,
            pass_end: 0.0,
            poller: None,
            waves: HashMap::new(),
        }
    }

    pub fn with_route(mut self, route: Route) -> Self {
        self.route = route;
        self
    }

    /// Fade in over `seconds` on the first pass.
    pub fn with_fade(mut self, seconds: f64) -> Self {
        self.fade = (seconds.is_finite() && seconds > 0.0).then_some(seconds);
        self
    }

    pub fn with_poll_interval(mut self, seconds: f64) -> Self {
        self.poll_interval = seconds.max(0.0);
        self
    }

    /// A fresh sequence on the same device and route, for a follow-on part.
    pub fn successor(&self, plan: SequencePlan) -> Sequence {
        Sequence::new(self.device.clone(), plan)
            .with_route(self.route)
            .with_poll_interval(self.poll_interval)
    }

    pub fn plan(&self) -> &SequencePlan {
        &self.plan
    }

    pub fn state(&self) -> SequenceState {
        self.state
    }

    pub fn is_live(&self) -> bool {
        matches!(self.state, SequenceState::Playing | SequenceState::Looping)
    }

    pub fn voice(&self) -> Option<VoiceId> {
        self.voice
    }

    /// Whether `voice` is the voice of the current pass.
    pub fn owns(&self, voice: VoiceId) -> bool {
        self.voice == Some(voice)
    }

    pub fn pass_start(&self) -> f64 {
        self.pass_start
    }

    /// Absolute end time of the current pass.
    pub fn pass_end(&self) -> f64 {
        self.pass_end
    }

    /// Start playing at `start`, or now. Restarts a live sequence.
    pub fn play(&mut self, start: Option<f64>) -> Result<(), ScheduleError> {
        if self.is_live() {
            self.detach(true);
        }
        let start = start.unwrap_or_else(|| self.device.current_time());
        self.state = if self.plan.looping {
            SequenceState::Looping
        } else {
            SequenceState::Playing
        };
        self.schedule_or_stop(start, true)
    }

    /// Let a looping sequence finish its current pass and then stop.
    pub fn release(&mut self) -> bool {
        if self.state == SequenceState::Looping {
            self.state = SequenceState::Playing;
            true
        } else {
            false
        }
    }

    pub fn handle(&mut self, event: SequenceEvent) -> Result<Transition, ScheduleError> {
        match (event, self.state) {
            (SequenceEvent::StopRequested, SequenceState::Playing | SequenceState::Looping) => {
                self.detach(true);
                self.state = SequenceState::Stopped;
                Ok(Transition::Stopped)
            }
            (SequenceEvent::PassExhausted, SequenceState::Looping) => {
                let start = self.pass_end;
                self.detach(false);
                self.schedule_or_stop(start, false)?;
                Ok(Transition::Cycled)
            }
            (SequenceEvent::PassExhausted, SequenceState::Playing) => {
                self.detach(false);
                self.state = SequenceState::Stopped;
                Ok(Transition::Finished)
            }
            _ => Ok(Transition::Ignored),
        }
    }

    /// Apply a pending waveform swap, if one is due.
    pub fn poll(&mut self, now: f64) -> DeviceResult {
        let (Some(voice), Some(poller)) = (self.voice, self.poller.as_mut()) else {
            return Ok(());
        };
        let Some(waveform) = poller.poll(now).cloned() else {
            return Ok(());
        };
        log::trace!(target: "pipit::sequence", "voice {} -> {}", voice.0, waveform.id());
        let oscillator = self.oscillator_for(&waveform)?;
        self.device.set_oscillator(voice, oscillator)
    }

    fn schedule_or_stop(&mut self, start: f64, first: bool) -> Result<(), ScheduleError> {
        if let Err(e) = self.schedule_pass(start, first) {
            self.detach(true);
            self.state = SequenceState::Stopped;
            return Err(e);
        }
        Ok(())
    }

    fn oscillator_for(&mut self, waveform: &WaveformRef) -> DeviceResult<Oscillator> {
        match waveform {
            WaveformRef::Builtin(shape) => Ok(Oscillator::Shape(*shape)),
            WaveformRef::Custom(wave) => {
                if let Some(handle) = self.waves.get(&wave.id) {
                    return Ok(Oscillator::Periodic(*handle));
                }
                let handle = self.device.create_periodic_wave(&wave.real, wave.imag())?;
                self.waves.insert(wave.id.clone(), handle);
                Ok(Oscillator::Periodic(handle))
            }
        }
    }

    fn schedule_pass(&mut self, start: f64, first: bool) -> Result<(), ScheduleError> {
        let plan = self.plan.clone();
        let notes = plan.notes();
        let beat = plan.beat();

        let initial = notes
            .first()
            .map_or(&plan.waveform, |n| plan.waveform_of(n))
            .clone();
        let oscillator = self.oscillator_for(&initial)?;
        let device = self.device.clone();
        let voice = device.create_voice(oscillator, self.route)?;
        self.voice = Some(voice);

        log::debug!(
            target: "pipit::sequence",
            "pass on voice {}: {} notes from {:.4} at {} bpm",
            voice.0, notes.len(), start, plan.tempo
        );

        if let Some(fade) = self.fade.filter(|_| first) {
            device.automate(voice, VoiceParam::Level, Automation::SetValue { value: 0.0, time: start })?;
            device.automate(
                voice,
                VoiceParam::Level,
                Automation::LinearRamp { value: 1.0, end_time: start + fade },
            )?;
        }

        let homogeneous = plan.is_homogeneous();
        let mut markers = Vec::new();
        let source = ArpSource {
            notes: &plan.source,
            offset: plan.slice_offset(),
        };

        let mut t = start;
        for (i, note) in notes.iter().enumerate() {
            let length = beat * note.duration;
            let window = NoteWindow {
                index: i,
                start: t,
                duration: length,
                cutoff: length * (1.0 - plan.staccato),
            };
            let cutoff_at = window.cutoff_at();

            device.automate(
                voice,
                VoiceParam::Frequency,
                Automation::SetValue { value: note.frequency, time: t },
            )?;
            device.automate(
                voice,
                VoiceParam::Gain,
                Automation::SetValue { value: note.volume, time: t },
            )?;

            if plan.smoothing > 0.0 && !note.is_rest() {
                if let Some(next) = notes.get(i + 1).filter(|n| !n.is_rest()) {
                    let slide = window.cutoff.min(beat * plan.smoothing);
                    device.automate(
                        voice,
                        VoiceParam::Frequency,
                        Automation::SetValue { value: note.frequency, time: cutoff_at - slide },
                    )?;
                    device.automate(
                        voice,
                        VoiceParam::Frequency,
                        Automation::LinearRamp { value: next.frequency, end_time: cutoff_at },
                    )?;
                }
            }

            if apply_effects(device.as_ref(), voice, note, &window, &source)? {
                device.automate(
                    voice,
                    VoiceParam::Frequency,
                    Automation::SetValue { value: 0.0, time: cutoff_at },
                )?;
            }

            if !homogeneous {
                markers.push(WaveformMarker {
                    begin: t - start,
                    end: t + length - start,
                    waveform: plan.waveform_of(note).clone(),
                });
            }
            t += length;
        }

        device.start(voice, start)?;
        device.stop(voice, t)?;
        self.pass_start = start;
        self.pass_end = t;
        self.poller = (!markers.is_empty())
            .then(|| WaveformPoller::new(markers, start, self.poll_interval));
        Ok(())
    }

    /// Drop the current voice. `stop_now` silences a voice that has not
    /// ended yet; committed automation stays on the device but is
    /// disconnected.
    fn detach(&mut self, stop_now: bool) {
        self.poller = None;
        let Some(voice) = self.voice.take() else {
            return;
        };
        if stop_now {
            let now = self.device.current_time();
            if let Err(e) = self.device.stop(voice, now) {
                log::warn!(target: "pipit::sequence", "stop voice {}: {}", voice.0, e);
            }
        }
        if let Err(e) = self.device.disconnect(voice) {
            log::warn!(target: "pipit::sequence", "disconnect voice {}: {}", voice.0, e);
        }
    }
}

impl Drop for Sequence {
    fn drop(&mut self) {
        if self.is_live() {
            self.detach(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceOp, TestDevice};
    use pipit_types::{CustomWave, EffectDescriptor, Pattern, WaveShape};

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn setup(entries: &[&str]) -> (Rc<TestDevice>, SequencePlan) {
        let device = Rc::new(TestDevice::new());
        let pattern = Pattern::parse(entries);
        (device, SequencePlan::new(pattern.notes().clone()))
    }

    #[test]
    fn test_one_shot_schedule() {
        let (device, plan) = setup(&["C3 q", "D3 q"]);
        let beat = 60.0 / 132.0;
        let mut seq = Sequence::new(device.clone(), plan);
        seq.play(Some(0.0)).unwrap();
        assert_eq!(seq.state(), SequenceState::Playing);

        let voice = seq.voice().unwrap();
        let freq = device.automations(voice, VoiceParam::Frequency);
        // set + cutoff per note
        assert_eq!(freq.len(), 4);
        assert!(close(freq[2].time(), beat));
        assert!(close(freq[3].time(), 2.0 * beat));
        assert!(close(device.stop_time(voice).unwrap(), 2.0 * beat));
        assert!(close(seq.pass_end(), 2.0 * beat));
    }

    #[test]
    fn test_automation_in_time_order() {
        let (device, plan) = setup(&["C3 q", "D3 e", "- s", "E3 h"]);
        let mut seq = Sequence::new(device.clone(), plan.with_staccato(0.25));
        seq.play(Some(1.0)).unwrap();
        let freq = device.automations(seq.voice().unwrap(), VoiceParam::Frequency);
        assert!(freq.windows(2).all(|w| w[0].time() <= w[1].time()));
    }

    #[test]
    fn test_staccato_cutoff() {
        let (device, plan) = setup(&["A4 q"]);
        let mut seq = Sequence::new(device.clone(), plan.with_tempo(60.0).with_staccato(0.5));
        seq.play(Some(0.0)).unwrap();
        let freq = device.automations(seq.voice().unwrap(), VoiceParam::Frequency);
        assert_eq!(freq[1], Automation::SetValue { value: 0.0, time: 0.5 });
        assert_eq!(seq.pass_end(), 1.0);
    }

    #[test]
    fn test_smoothing_slides_to_next() {
        let (device, plan) = setup(&["A4 q", "A5 q", "- q"]);
        let mut seq = Sequence::new(device.clone(), plan.with_tempo(60.0).with_smoothing(0.25));
        seq.play(Some(0.0)).unwrap();
        let freq = device.automations(seq.voice().unwrap(), VoiceParam::Frequency);
        assert!(freq.contains(&Automation::SetValue { value: 440.0, time: 0.75 }));
        assert!(freq.contains(&Automation::LinearRamp { value: 880.0, end_time: 1.0 }));
        // no slide into a rest
        let ramps = freq
            .iter()
            .filter(|a| matches!(a, Automation::LinearRamp { .. }))
            .count();
        assert_eq!(ramps, 1);
    }

    #[test]
    fn test_looping_rewinds_without_gap() {
        let (device, plan) = setup(&["C3 q", "D3 q"]);
        let mut seq = Sequence::new(device.clone(), plan.looping(true));
        seq.play(Some(0.0)).unwrap();
        assert_eq!(seq.state(), SequenceState::Looping);
        let first = seq.voice().unwrap();
        let end = seq.pass_end();

        assert_eq!(seq.handle(SequenceEvent::PassExhausted), Ok(Transition::Cycled));
        let second = seq.voice().unwrap();
        assert_ne!(first, second);
        assert_eq!(seq.pass_start(), end);
        assert!(device.operations().contains(&DeviceOp::Start { voice: second, time: end }));
    }

    #[test]
    fn test_one_shot_finishes() {
        let (device, plan) = setup(&["C3 q"]);
        let mut seq = Sequence::new(device.clone(), plan);
        seq.play(Some(0.0)).unwrap();
        assert_eq!(seq.handle(SequenceEvent::PassExhausted), Ok(Transition::Finished));
        assert_eq!(seq.state(), SequenceState::Stopped);
        assert!(seq.voice().is_none());
        assert_eq!(seq.handle(SequenceEvent::PassExhausted), Ok(Transition::Ignored));
    }

    #[test]
    fn test_release_finishes_after_pass() {
        let (device, plan) = setup(&["C3 q"]);
        let mut seq = Sequence::new(device, plan.looping(true));
        seq.play(Some(0.0)).unwrap();
        assert!(seq.release());
        assert!(!seq.release());
        assert_eq!(seq.handle(SequenceEvent::PassExhausted), Ok(Transition::Finished));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (device, plan) = setup(&["C3 q", "D3 q"]);
        let mut seq = Sequence::new(device.clone(), plan);
        device.advance_to(0.1);
        seq.play(None).unwrap();
        let voice = seq.voice().unwrap();

        assert_eq!(seq.handle(SequenceEvent::StopRequested), Ok(Transition::Stopped));
        assert_eq!(seq.handle(SequenceEvent::StopRequested), Ok(Transition::Ignored));
        assert_eq!(seq.handle(SequenceEvent::PassExhausted), Ok(Transition::Ignored));
        assert_eq!(device.stop_time(voice), Some(0.1));
        assert_eq!(device.count(|op| *op == DeviceOp::Disconnect(voice)), 1);
    }

    #[test]
    fn test_stopped_sequence_replays() {
        let (device, plan) = setup(&["C3 q"]);
        let mut seq = Sequence::new(device, plan);
        seq.play(Some(0.0)).unwrap();
        seq.handle(SequenceEvent::StopRequested).unwrap();
        seq.play(Some(1.0)).unwrap();
        assert_eq!(seq.state(), SequenceState::Playing);
    }

    #[test]
    fn test_failed_pass_stops_sequence() {
        let (device, plan) = setup(&["C3 q"]);
        let bad = Note::parse("C3 q").with_effects(vec![EffectDescriptor::new(
            pipit_types::EffectMethod::Unknown("bogus".into()),
            pipit_types::EffectField::Any,
            0.0,
        )]);
        let plan = SequencePlan::new(vec![bad].into()).with_tempo(plan.tempo);
        let mut seq = Sequence::new(device.clone(), plan);
        assert!(seq.play(Some(0.0)).is_err());
        assert_eq!(seq.state(), SequenceState::Stopped);
        assert!(seq.voice().is_none());
        assert_eq!(device.count(|op| matches!(op, DeviceOp::Disconnect(_))), 1);
    }

    #[test]
    fn test_fade_on_first_pass_only() {
        let (device, plan) = setup(&["C3 q"]);
        let mut seq = Sequence::new(device.clone(), plan.looping(true)).with_fade(2.0);
        seq.play(Some(0.0)).unwrap();
        let first = seq.voice().unwrap();
        assert_eq!(
            device.automations(first, VoiceParam::Level),
            vec![
                Automation::SetValue { value: 0.0, time: 0.0 },
                Automation::LinearRamp { value: 1.0, end_time: 2.0 },
            ]
        );
        seq.handle(SequenceEvent::PassExhausted).unwrap();
        assert!(device.automations(seq.voice().unwrap(), VoiceParam::Level).is_empty());
    }

    #[test]
    fn test_homogeneous_waveform_has_no_poller() {
        let (device, plan) = setup(&["C3 q", "D3 q"]);
        let mut seq = Sequence::new(device.clone(), plan.with_waveform(WaveShape::Triangle.into()));
        seq.play(Some(0.0)).unwrap();
        assert!(device.operations().contains(&DeviceOp::CreateVoice {
            voice: seq.voice().unwrap(),
            oscillator: Oscillator::Shape(WaveShape::Triangle),
            route: Route::Output,
        }));
        seq.poll(0.5).unwrap();
        assert_eq!(device.count(|op| matches!(op, DeviceOp::SetOscillator { .. })), 0);
    }

    #[test]
    fn test_mixed_waveforms_swap_by_poll() {
        let organ = CustomWave { id: "organ".into(), real: vec![0.0, 1.0], imag: None };
        let notes: Vec<Note> = vec![
            Note::parse("C3 q"),
            Note::parse("D3 q").with_waveform(WaveformRef::Custom(organ.clone())),
            Note::parse("E3 q").with_waveform(WaveformRef::Custom(organ)),
        ];
        let device = Rc::new(TestDevice::new());
        let plan = SequencePlan::new(notes.into()).with_tempo(60.0);
        let mut seq = Sequence::new(device.clone(), plan.looping(true)).with_poll_interval(0.0);
        seq.play(Some(0.0)).unwrap();
        let voice = seq.voice().unwrap();

        seq.poll(0.5).unwrap();
        assert!(device.oscillator_swaps(voice).is_empty());
        seq.poll(1.5).unwrap();
        seq.poll(2.5).unwrap();
        assert_eq!(device.oscillator_swaps(voice).len(), 1);

        // wave is created once and reused on the next pass
        seq.handle(SequenceEvent::PassExhausted).unwrap();
        seq.poll(4.5).unwrap();
        assert_eq!(device.count(|op| matches!(op, DeviceOp::CreatePeriodicWave { .. })), 1);
    }

    #[test]
    fn test_arp_uses_absolute_block() {
        let pattern = Pattern::parse(&["C4 q", "D4 q", "E4 q", "F4 q", "G4 q", "A4 q"]);
        let mut notes: Vec<Note> = pattern.notes().to_vec();
        notes[5] = notes[5].clone().with_effects(vec![EffectDescriptor::arp(4.0)]);
        let source: Rc<[Note]> = notes.into();
        let device = Rc::new(TestDevice::new());
        let plan = SequencePlan::new(source.clone()).with_range(5..6).with_tempo(60.0);
        let mut seq = Sequence::new(device.clone(), plan);
        seq.play(Some(0.0)).unwrap();

        let freq = device.automations(seq.voice().unwrap(), VoiceParam::Frequency);
        let values: Vec<f64> = freq
            .iter()
            .skip(1)
            .map(|a| match a {
                Automation::SetValue { value, .. } => *value,
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        let g = source[4].frequency;
        let a = source[5].frequency;
        assert_eq!(values, vec![g, a, g, g]);
    }

    #[test]
    fn test_range_is_clamped() {
        let (_, plan) = setup(&["C3 q", "D3 q"]);
        let plan = plan.with_range(1..9);
        assert_eq!(plan.range, 1..2);
        assert_eq!(plan.slice_offset(), 1);
        assert_eq!(plan.with_range(5..9).notes().len(), 0);
    }
}
