pub mod arpeggio;
pub mod automation;
pub mod device;
pub mod poller;
pub mod sequence;

pub use automation::{apply_effects, ArpSource, NoteWindow, ScheduleError};
pub use device::{
    AudioDevice, Automation, DeviceError, DeviceOp, DeviceResult, NodeId, Oscillator,
    ProcessorPair, Route, TestDevice, VoiceId, VoiceParam, WaveHandle,
};
pub use poller::{WaveformMarker, WaveformPoller, DEFAULT_POLL_INTERVAL};
pub use sequence::{Sequence, SequenceEvent, SequencePlan, SequenceState, Transition};
