//! # pipit-types
//!
//! Shared data model for the pipit sequencing engine: notes, effect
//! descriptors, waveform references and the pattern wire format.
//!
//! Everything here is created once when a pattern is registered and never
//! mutated afterwards. Scheduling lives in `pipit-audio`, channel arbitration
//! in `pipit-core`.

pub mod effect;
pub mod note;
pub mod pattern;
pub mod waveform;

pub use effect::{EffectCall, EffectCallback, EffectDescriptor, EffectField, EffectMethod};
pub use note::{
    parse_duration, parse_volume, tone_frequency, Note, NoteInput, Tone, DEFAULT_OCTAVE,
    DEFAULT_VOLUME, STANDARD_A4,
};
pub use pattern::{MusicPattern, Pattern, PatternOptions};
pub use waveform::{CustomWave, WaveShape, WaveformRef};
