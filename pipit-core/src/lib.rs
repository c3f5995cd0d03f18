pub mod config;
pub mod error;
pub mod event;
pub mod tuner;

pub use config::{Config, PlaybackDefaults, TunerConfig};
pub use error::{TunerError, TunerResult};
pub use event::TunerEvent;
pub use tuner::{
    plan_slice, Callback, Channel, ChannelSelect, Controllers, SequenceKind, SfxCommand, SlicePlan,
    Tuner, AUTO, RELEASE, STOP, STOP_ALL,
};

// Re-export so hosts need only this crate.
pub use pipit_audio as audio;
pub use pipit_types as types;
