//! Effect descriptors: declarative, timed parameter instructions attached
//! to a note.

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

/// How a descriptor drives its field.
///
/// Unrecognized method names deserialize into [`EffectMethod::Unknown`] so a
/// bad pattern can still be registered; the effect engine rejects it when the
/// note is scheduled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EffectMethod {
    /// Arpeggio over the note's block of four
    Arp,
    /// Invoke the attached callback
    Function,
    /// Instant set
    Assign,
    /// Linear ramp arriving at `when`
    Linear,
    /// Exponential ramp arriving at `when`
    Exp,
    /// Exponential approach starting at `when`
    Target,
    /// Explicit value curve starting at `when`
    Curve,
    Unknown(String),
}

impl EffectMethod {
    pub fn name(&self) -> &str {
        match self {
            EffectMethod::Arp => "arp",
            EffectMethod::Function => "function",
            EffectMethod::Assign => "assign",
            EffectMethod::Linear => "linear",
            EffectMethod::Exp => "exp",
            EffectMethod::Target => "target",
            EffectMethod::Curve => "curve",
            EffectMethod::Unknown(name) => name,
        }
    }
}

impl From<String> for EffectMethod {
    fn from(s: String) -> Self {
        match s.as_str() {
            "arp" => EffectMethod::Arp,
            "function" => EffectMethod::Function,
            "assign" => EffectMethod::Assign,
            "linear" => EffectMethod::Linear,
            "exp" => EffectMethod::Exp,
            "target" => EffectMethod::Target,
            "curve" => EffectMethod::Curve,
            _ => EffectMethod::Unknown(s),
        }
    }
}

impl From<EffectMethod> for String {
    fn from(method: EffectMethod) -> Self {
        method.name().to_string()
    }
}

/// Which voice parameter a descriptor automates.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EffectField {
    /// No physical target; only meaningful for `arp` and `function`
    #[default]
    Any,
    /// Gain stage, scaled by the note's volume
    Volume,
    /// Oscillator frequency, scaled by the note's frequency
    Freq,
    Unknown(String),
}

impl EffectField {
    pub fn name(&self) -> &str {
        match self {
            EffectField::Any => "any",
            EffectField::Volume => "volume",
            EffectField::Freq => "freq",
            EffectField::Unknown(name) => name,
        }
    }
}

impl From<String> for EffectField {
    fn from(s: String) -> Self {
        match s.as_str() {
            "any" => EffectField::Any,
            "volume" => EffectField::Volume,
            "freq" => EffectField::Freq,
            _ => EffectField::Unknown(s),
        }
    }
}

impl From<EffectField> for String {
    fn from(field: EffectField) -> Self {
        field.name().to_string()
    }
}

/// Arguments handed to a `function` effect.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectCall {
    /// Position of the note inside the playing sequence
    pub note_index: usize,
    /// Descriptor value after field scaling
    pub value: f64,
    /// Absolute time the effect fires
    pub moment: f64,
    /// Absolute time the note is cut off
    pub cutoff: f64,
}

/// User callback for `function` effects. Compared by identity.
#[derive(Clone)]
pub struct EffectCallback(Rc<dyn Fn(EffectCall)>);

impl EffectCallback {
    pub fn new(f: impl Fn(EffectCall) + 'static) -> Self {
        Self(Rc::new(f))
    }

    pub fn call(&self, args: EffectCall) {
        (self.0)(args)
    }
}

impl fmt::Debug for EffectCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EffectCallback")
    }
}

impl PartialEq for EffectCallback {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

/// One timed parameter instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectDescriptor {
    pub method: EffectMethod,
    #[serde(default)]
    pub field: EffectField,
    /// Target value, or the stroke count for `arp`
    #[serde(default)]
    pub value: f64,
    /// Measure `when` against the staccato-adjusted cutoff instead of the
    /// full note duration
    #[serde(default)]
    pub cutoff: bool,
    /// Fraction in `[0, 1]` of the selected window
    #[serde(default)]
    pub when: f64,
    /// Time constant for `target`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constant: Option<f64>,
    /// Curve points for `curve`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<f64>,
    /// Curve length for `curve`, as a fraction of the selected window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip)]
    pub callback: Option<EffectCallback>,
}

impl EffectDescriptor {
    pub fn new(method: EffectMethod, field: EffectField, value: f64) -> Self {
        Self {
            method,
            field,
            value,
            cutoff: false,
            when: 0.0,
            constant: None,
            values: Vec::new(),
            duration: None,
            callback: None,
        }
    }

    pub fn arp(strokes: f64) -> Self {
        Self::new(EffectMethod::Arp, EffectField::Any, strokes)
    }

    pub fn function(value: f64, callback: impl Fn(EffectCall) + 'static) -> Self {
        let mut fx = Self::new(EffectMethod::Function, EffectField::Any, value);
        fx.callback = Some(EffectCallback::new(callback));
        fx
    }

    pub fn at(mut self, when: f64) -> Self {
        self.when = when;
        self
    }

    pub fn on_cutoff(mut self) -> Self {
        self.cutoff = true;
        self
    }

    pub fn with_constant(mut self, constant: f64) -> Self {
        self.constant = Some(constant);
        self
    }

    pub fn with_curve(mut self, values: Vec<f64>, duration: f64) -> Self {
        self.values = values;
        self.duration = Some(duration);
        self
    }

    /// `when`, clamped into `[0, 1]`
    pub fn fraction(&self) -> f64 {
        if self.when.is_finite() {
            self.when.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_descriptor() {
        let fx: EffectDescriptor = serde_json::from_str(
            r#"{ "method": "linear", "field": "volume", "value": 0.0, "when": 1.0, "cutoff": true }"#,
        )
        .unwrap();
        assert_eq!(fx.method, EffectMethod::Linear);
        assert_eq!(fx.field, EffectField::Volume);
        assert!(fx.cutoff);
        assert_eq!(fx.fraction(), 1.0);
    }

    #[test]
    fn test_unknown_names_survive_parsing() {
        let fx: EffectDescriptor =
            serde_json::from_str(r#"{ "method": "wobble", "field": "pan" }"#).unwrap();
        assert_eq!(fx.method, EffectMethod::Unknown("wobble".into()));
        assert_eq!(fx.field, EffectField::Unknown("pan".into()));
    }

    #[test]
    fn test_field_defaults_to_any() {
        let fx: EffectDescriptor = serde_json::from_str(r#"{ "method": "arp", "value": 8 }"#).unwrap();
        assert_eq!(fx.field, EffectField::Any);
        assert_eq!(fx.value, 8.0);
    }

    #[test]
    fn test_when_is_clamped() {
        assert_eq!(EffectDescriptor::arp(4.0).at(1.5).fraction(), 1.0);
        assert_eq!(EffectDescriptor::arp(4.0).at(-0.5).fraction(), 0.0);
    }

    #[test]
    fn test_callback_identity() {
        let a = EffectDescriptor::function(1.0, |_| {});
        let b = a.clone();
        let c = EffectDescriptor::function(1.0, |_| {});
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
