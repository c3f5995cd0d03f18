//! Audio device trait: the rendering backend as seen by the scheduler.
//!
//! `AudioDevice` captures what the sequencer *means* to do (create a voice,
//! automate its frequency, stop it at a time) independently of how a backend
//! renders it. This keeps every scheduling rule testable without sound
//! hardware: [`TestDevice`] records each operation and runs a virtual clock.
//!
//! Every voice is wired through a fixed chain owned by the device:
//! oscillator → gain → level → three peaking filters ([`EQ_BANDS`]) → either
//! the default output or an external `[entry, exit]` processor pair.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;

use pipit_types::WaveShape;

/// Result type for device operations.
pub type DeviceResult<T = ()> = Result<T, DeviceError>;

/// Error from a device operation.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceError(pub String);

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for DeviceError {}

impl From<String> for DeviceError {
    fn from(s: String) -> Self {
        DeviceError(s)
    }
}

/// Handle to one oscillator voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceId(pub u64);

/// Handle to a periodic wave created on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WaveHandle(pub u64);

/// Handle to an externally owned processing node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

/// Peaking filter bands in the fixed voice chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterBand {
    Bass,
    Mid,
    Treble,
}

/// Center frequencies of the chain's peaking filters, in chain order.
pub const EQ_BANDS: [(FilterBand, f64); 3] = [
    (FilterBand::Bass, 100.0),
    (FilterBand::Mid, 1000.0),
    (FilterBand::Treble, 2500.0),
];

/// Automatable voice parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoiceParam {
    /// Oscillator frequency (Hz)
    Frequency,
    /// Per-note gain stage
    Gain,
    /// Post-gain level stage, used for fades
    Level,
}

/// Oscillator source for a voice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Oscillator {
    Shape(WaveShape),
    Periodic(WaveHandle),
}

/// `[entry, exit]` pair of an external processor chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessorPair {
    pub entry: NodeId,
    pub exit: NodeId,
}

impl ProcessorPair {
    /// Build a pair from a raw node list; anything other than exactly two
    /// nodes is malformed.
    pub fn from_nodes(nodes: &[NodeId]) -> Option<Self> {
        match nodes {
            [entry, exit] => Some(Self {
                entry: *entry,
                exit: *exit,
            }),
            _ => None,
        }
    }
}

/// Where the voice chain ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Route {
    #[default]
    Output,
    Processor(ProcessorPair),
}

/// A single automation primitive, with absolute device times.
#[derive(Debug, Clone, PartialEq)]
pub enum Automation {
    SetValue {
        value: f64,
        time: f64,
    },
    LinearRamp {
        value: f64,
        end_time: f64,
    },
    ExponentialRamp {
        value: f64,
        end_time: f64,
    },
    SetTarget {
        target: f64,
        start_time: f64,
        time_constant: f64,
    },
    ValueCurve {
        values: Vec<f64>,
        start_time: f64,
        duration: f64,
    },
}

impl Automation {
    /// The time this primitive is anchored on.
    pub fn time(&self) -> f64 {
        match self {
            Automation::SetValue { time, .. } => *time,
            Automation::LinearRamp { end_time, .. } => *end_time,
            Automation::ExponentialRamp { end_time, .. } => *end_time,
            Automation::SetTarget { start_time, .. } => *start_time,
            Automation::ValueCurve { start_time, .. } => *start_time,
        }
    }
}

/// Capability surface of a rendering backend.
///
/// Methods take `&self`; implementations use interior mutability. The
/// engine is single-threaded, so a shared `Rc<dyn AudioDevice>` is handed to
/// the arbiter and every sequence it creates.
pub trait AudioDevice {
    /// Monotonic device clock, in seconds.
    fn current_time(&self) -> f64;

    /// Platform unlock negotiation (e.g. a user-gesture requirement).
    fn unlock(&self) -> DeviceResult {
        Ok(())
    }

    /// Allocate a voice wired through the fixed chain.
    fn create_voice(&self, oscillator: Oscillator, route: Route) -> DeviceResult<VoiceId>;

    /// Register a periodic wave from Fourier coefficients.
    fn create_periodic_wave(&self, real: &[f64], imag: &[f64]) -> DeviceResult<WaveHandle>;

    /// Swap the oscillator of a live voice.
    fn set_oscillator(&self, voice: VoiceId, oscillator: Oscillator) -> DeviceResult;

    /// Commit one automation primitive on a voice parameter.
    fn automate(&self, voice: VoiceId, param: VoiceParam, automation: Automation) -> DeviceResult;

    /// Start the voice at an absolute time.
    fn start(&self, voice: VoiceId, time: f64) -> DeviceResult;

    /// Stop the voice at an absolute time. The device reports the voice
    /// through [`AudioDevice::drain_ended`] once that time has been rendered.
    fn stop(&self, voice: VoiceId, time: f64) -> DeviceResult;

    /// Disconnect the voice from its chain so committed automation is
    /// inaudible.
    fn disconnect(&self, voice: VoiceId) -> DeviceResult;

    /// Voices whose stop time has been reached since the last call, in
    /// stop-time order.
    fn drain_ended(&self) -> Vec<VoiceId>;
}

// ─── Test Device ────────────────────────────────────────────────────

/// An operation recorded by `TestDevice` for assertion in tests.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceOp {
    Unlock,
    CreateVoice {
        voice: VoiceId,
        oscillator: Oscillator,
        route: Route,
    },
    CreatePeriodicWave {
        wave: WaveHandle,
        real: Vec<f64>,
        imag: Vec<f64>,
    },
    SetOscillator {
        voice: VoiceId,
        oscillator: Oscillator,
    },
    Automate {
        voice: VoiceId,
        param: VoiceParam,
        automation: Automation,
    },
    Start {
        voice: VoiceId,
        time: f64,
    },
    Stop {
        voice: VoiceId,
        time: f64,
    },
    Disconnect(VoiceId),
}

#[derive(Debug, Default)]
struct VoiceRecord {
    stop_at: Option<f64>,
    ended: bool,
}

#[derive(Debug, Default)]
struct TestState {
    now: f64,
    ops: Vec<DeviceOp>,
    voices: HashMap<VoiceId, VoiceRecord>,
    ended: Vec<VoiceId>,
    next_voice: u64,
    next_wave: u64,
    fail_automation: bool,
}

/// A device that records every operation and renders a virtual clock.
/// All operations succeed unless failure injection is switched on.
#[derive(Debug, Default)]
pub struct TestDevice {
    state: RefCell<TestState>,
}

impl TestDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward and report every voice whose stop time is now
    /// in the past.
    pub fn advance_to(&self, time: f64) {
        let mut state = self.state.borrow_mut();
        state.now = state.now.max(time);
        let now = state.now;
        let mut due: Vec<(f64, VoiceId)> = state
            .voices
            .iter()
            .filter(|(_, v)| !v.ended)
            .filter_map(|(id, v)| v.stop_at.filter(|&t| t <= now).map(|t| (t, *id)))
            .collect();
        due.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        for (_, id) in due {
            if let Some(record) = state.voices.get_mut(&id) {
                record.ended = true;
            }
            state.ended.push(id);
        }
    }

    /// Make every subsequent `automate` call fail.
    pub fn fail_automation(&self, fail: bool) {
        self.state.borrow_mut().fail_automation = fail;
    }

    /// Return all recorded operations.
    pub fn operations(&self) -> Vec<DeviceOp> {
        self.state.borrow().ops.clone()
    }

    /// Clear recorded operations.
    pub fn clear(&self) {
        self.state.borrow_mut().ops.clear();
    }

    /// Count operations matching a predicate.
    pub fn count<F: Fn(&DeviceOp) -> bool>(&self, f: F) -> usize {
        self.state.borrow().ops.iter().filter(|op| f(op)).count()
    }

    /// Voices created so far, in creation order.
    pub fn voices_created(&self) -> Vec<VoiceId> {
        self.state
            .borrow()
            .ops
            .iter()
            .filter_map(|op| match op {
                DeviceOp::CreateVoice { voice, .. } => Some(*voice),
                _ => None,
            })
            .collect()
    }

    /// Automation committed on one parameter of one voice, in call order.
    pub fn automations(&self, voice: VoiceId, param: VoiceParam) -> Vec<Automation> {
        self.state
            .borrow()
            .ops
            .iter()
            .filter_map(|op| match op {
                DeviceOp::Automate {
                    voice: v,
                    param: p,
                    automation,
                } if *v == voice && *p == param => Some(automation.clone()),
                _ => None,
            })
            .collect()
    }

    /// Oscillator swaps on a voice, in call order.
    pub fn oscillator_swaps(&self, voice: VoiceId) -> Vec<Oscillator> {
        self.state
            .borrow()
            .ops
            .iter()
            .filter_map(|op| match op {
                DeviceOp::SetOscillator { voice: v, oscillator } if *v == voice => {
                    Some(*oscillator)
                }
                _ => None,
            })
            .collect()
    }

    /// Last stop time requested for a voice.
    pub fn stop_time(&self, voice: VoiceId) -> Option<f64> {
        self.state
            .borrow()
            .voices
            .get(&voice)
            .and_then(|v| v.stop_at)
    }

    fn record(&self, op: DeviceOp) {
        self.state.borrow_mut().ops.push(op);
    }
}

impl AudioDevice for TestDevice {
    fn current_time(&self) -> f64 {
        self.state.borrow().now
    }

    fn unlock(&self) -> DeviceResult {
        self.record(DeviceOp::Unlock);
        Ok(())
    }

    fn create_voice(&self, oscillator: Oscillator, route: Route) -> DeviceResult<VoiceId> {
        let mut state = self.state.borrow_mut();
        let voice = VoiceId(state.next_voice);
        state.next_voice += 1;
        state.voices.insert(voice, VoiceRecord::default());
        state.ops.push(DeviceOp::CreateVoice {
            voice,
            oscillator,
            route,
        });
        Ok(voice)
    }

    fn create_periodic_wave(&self, real: &[f64], imag: &[f64]) -> DeviceResult<WaveHandle> {
        let mut state = self.state.borrow_mut();
        let wave = WaveHandle(state.next_wave);
        state.next_wave += 1;
        state.ops.push(DeviceOp::CreatePeriodicWave {
            wave,
            real: real.to_vec(),
            imag: imag.to_vec(),
        });
        Ok(wave)
    }

    fn set_oscillator(&self, voice: VoiceId, oscillator: Oscillator) -> DeviceResult {
        self.record(DeviceOp::SetOscillator { voice, oscillator });
        Ok(())
    }

    fn automate(&self, voice: VoiceId, param: VoiceParam, automation: Automation) -> DeviceResult {
        if self.state.borrow().fail_automation {
            return Err(DeviceError(format!("automation rejected on voice {}", voice.0)));
        }
        self.record(DeviceOp::Automate {
            voice,
            param,
            automation,
        });
        Ok(())
    }

    fn start(&self, voice: VoiceId, time: f64) -> DeviceResult {
        self.record(DeviceOp::Start { voice, time });
        Ok(())
    }

    fn stop(&self, voice: VoiceId, time: f64) -> DeviceResult {
        let mut state = self.state.borrow_mut();
        match state.voices.get_mut(&voice) {
            Some(record) => record.stop_at = Some(time),
            None => return Err(DeviceError(format!("unknown voice {}", voice.0))),
        }
        state.ops.push(DeviceOp::Stop { voice, time });
        Ok(())
    }

    fn disconnect(&self, voice: VoiceId) -> DeviceResult {
        self.record(DeviceOp::Disconnect(voice));
        Ok(())
    }

    fn drain_ended(&self) -> Vec<VoiceId> {
        std::mem::take(&mut self.state.borrow_mut().ended)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voices_end_in_stop_order() {
        let device = TestDevice::new();
        let a = device.create_voice(Oscillator::Shape(WaveShape::Sine), Route::Output).unwrap();
        let b = device.create_voice(Oscillator::Shape(WaveShape::Sine), Route::Output).unwrap();
        device.stop(a, 2.0).unwrap();
        device.stop(b, 1.0).unwrap();

        device.advance_to(0.5);
        assert!(device.drain_ended().is_empty());

        device.advance_to(3.0);
        assert_eq!(device.drain_ended(), vec![b, a]);
        // Reported once only
        device.advance_to(4.0);
        assert!(device.drain_ended().is_empty());
    }

    #[test]
    fn test_clock_is_monotonic() {
        let device = TestDevice::new();
        device.advance_to(2.0);
        device.advance_to(1.0);
        assert_eq!(device.current_time(), 2.0);
    }

    #[test]
    fn test_processor_pair_shape() {
        assert!(ProcessorPair::from_nodes(&[NodeId(1), NodeId(2)]).is_some());
        assert!(ProcessorPair::from_nodes(&[NodeId(1)]).is_none());
        assert!(ProcessorPair::from_nodes(&[NodeId(1), NodeId(2), NodeId(3)]).is_none());
    }

    #[test]
    fn test_failure_injection() {
        let device = TestDevice::new();
        let v = device.create_voice(Oscillator::Shape(WaveShape::Square), Route::Output).unwrap();
        device.fail_automation(true);
        let result = device.automate(v, VoiceParam::Gain, Automation::SetValue { value: 1.0, time: 0.0 });
        assert!(result.is_err());
        assert_eq!(device.count(|op| matches!(op, DeviceOp::Automate { .. })), 0);
    }
}
