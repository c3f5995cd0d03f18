//! Effect engine: turns a note's effect descriptors into automation on its
//! voice, relative to the note's scheduled window.

use std::fmt;

use pipit_types::{EffectCall, EffectDescriptor, EffectField, EffectMethod, Note};

use crate::arpeggio;
use crate::device::{AudioDevice, Automation, DeviceError, VoiceId, VoiceParam};

/// Exponential ramps cannot reach zero.
const EXP_FLOOR: f64 = 1e-4;

/// Configuration error raised while scheduling a note's effects. Aborts the
/// current pass of the sequence only.
#[derive(Debug, Clone, PartialEq)]
pub enum ScheduleError {
    UnknownMethod(String),
    UnknownField(String),
    /// `function` descriptor without a callback
    MissingCallback { note_index: usize },
    /// Method-specific argument absent or empty (`constant`, `values`, `duration`)
    MissingArgument {
        method: &'static str,
        argument: &'static str,
    },
    Device(DeviceError),
}

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleError::UnknownMethod(m) => write!(f, "unknown effect method '{}'", m),
            ScheduleError::UnknownField(field) => write!(f, "unknown effect field '{}'", field),
            ScheduleError::MissingCallback { note_index } => {
                write!(f, "function effect on note {} has no callback", note_index)
            }
            ScheduleError::MissingArgument { method, argument } => {
                write!(f, "{} effect requires '{}'", method, argument)
            }
            ScheduleError::Device(e) => write!(f, "device error: {}", e),
        }
    }
}

impl std::error::Error for ScheduleError {}

impl From<DeviceError> for ScheduleError {
    fn from(e: DeviceError) -> Self {
        ScheduleError::Device(e)
    }
}

/// Where a note sits in time. `duration` and `cutoff` are lengths in
/// seconds, measured from `start`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteWindow {
    /// Position of the note inside the playing sequence
    pub index: usize,
    pub start: f64,
    pub duration: f64,
    /// Staccato-adjusted sounding length
    pub cutoff: f64,
}

impl NoteWindow {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    pub fn cutoff_at(&self) -> f64 {
        self.start + self.cutoff
    }

    /// Length of the window a descriptor measures `when` against.
    fn span(&self, fx: &EffectDescriptor) -> f64 {
        if fx.cutoff {
            self.cutoff
        } else {
            self.duration
        }
    }

    fn moment(&self, fx: &EffectDescriptor) -> f64 {
        self.start + fx.fraction() * self.span(fx)
    }
}

/// The unsliced note list plus the absolute index of the playing range's
/// first note. Arpeggios read block members from here.
#[derive(Debug, Clone, Copy)]
pub struct ArpSource<'a> {
    pub notes: &'a [Note],
    pub offset: usize,
}

fn resolve_field(fx: &EffectDescriptor, note: &Note) -> Result<Option<(VoiceParam, f64)>, ScheduleError> {
    match &fx.field {
        EffectField::Any => Ok(None),
        EffectField::Volume => Ok(Some((VoiceParam::Gain, fx.value * note.volume))),
        EffectField::Freq => Ok(Some((VoiceParam::Frequency, fx.value * note.frequency))),
        EffectField::Unknown(name) => Err(ScheduleError::UnknownField(name.clone())),
    }
}

fn physical(
    target: Option<(VoiceParam, f64)>,
    fx: &EffectDescriptor,
) -> Result<(VoiceParam, f64), ScheduleError> {
    target.ok_or_else(|| ScheduleError::UnknownField(fx.field.name().to_string()))
}

/// Apply every effect of `note`. Returns whether the automatic
/// cutoff-to-silence should still be scheduled (false once an arpeggio
/// owns the note's frequency envelope).
pub fn apply_effects(
    device: &dyn AudioDevice,
    voice: VoiceId,
    note: &Note,
    window: &NoteWindow,
    source: &ArpSource<'_>,
) -> Result<bool, ScheduleError> {
    let mut keep_cutoff = true;

    for fx in &note.effects {
        let target = resolve_field(fx, note)?;
        let moment = window.moment(fx);

        match &fx.method {
            EffectMethod::Arp => {
                arpeggio::schedule_arpeggio(
                    device,
                    voice,
                    source.notes,
                    source.offset + window.index,
                    fx.value,
                    moment,
                    window.start + window.span(fx),
                )?;
                keep_cutoff = false;
            }
            EffectMethod::Function => {
                let callback = fx.callback.as_ref().ok_or(ScheduleError::MissingCallback {
                    note_index: window.index,
                })?;
                callback.call(EffectCall {
                    note_index: window.index,
                    value: target.map_or(fx.value, |(_, v)| v),
                    moment,
                    cutoff: window.cutoff_at(),
                });
            }
            EffectMethod::Assign => {
                let (param, value) = physical(target, fx)?;
                device.automate(voice, param, Automation::SetValue { value, time: moment })?;
            }
            EffectMethod::Linear => {
                let (param, value) = physical(target, fx)?;
                device.automate(voice, param, Automation::LinearRamp { value, end_time: moment })?;
            }
            EffectMethod::Exp => {
                let (param, value) = physical(target, fx)?;
                device.automate(
                    voice,
                    param,
                    Automation::ExponentialRamp {
                        value: value.max(EXP_FLOOR),
                        end_time: moment,
                    },
                )?;
            }
            EffectMethod::Target => {
                let (param, value) = physical(target, fx)?;
                let time_constant = fx.constant.ok_or(ScheduleError::MissingArgument {
                    method: "target",
                    argument: "constant",
                })?;
                device.automate(
                    voice,
                    param,
                    Automation::SetTarget {
                        target: value,
                        start_time: moment,
                        time_constant,
                    },
                )?;
            }
            EffectMethod::Curve => {
                let (param, _) = physical(target, fx)?;
                if fx.values.is_empty() {
                    return Err(ScheduleError::MissingArgument {
                        method: "curve",
                        argument: "values",
                    });
                }
                let fraction = fx.duration.ok_or(ScheduleError::MissingArgument {
                    method: "curve",
                    argument: "duration",
                })?;
                let scale = match param {
                    VoiceParam::Frequency => note.frequency,
                    _ => note.volume,
                };
                device.automate(
                    voice,
                    param,
                    Automation::ValueCurve {
                        values: fx.values.iter().map(|v| v * scale).collect(),
                        start_time: moment,
                        duration: fraction.max(0.0) * window.span(fx),
                    },
                )?;
            }
            EffectMethod::Unknown(name) => {
                return Err(ScheduleError::UnknownMethod(name.clone()));
            }
        }
    }

    Ok(keep_cutoff)
}
