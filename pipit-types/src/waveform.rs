use serde::{Deserialize, Serialize};

/// Builtin oscillator shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaveShape {
    Sine,
    Triangle,
    Sawtooth,
    Square,
}

impl WaveShape {
    pub fn name(&self) -> &'static str {
        match self {
            WaveShape::Sine => "sine",
            WaveShape::Triangle => "triangle",
            WaveShape::Sawtooth => "sawtooth",
            WaveShape::Square => "square",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "sine" => Some(WaveShape::Sine),
            "triangle" => Some(WaveShape::Triangle),
            "sawtooth" | "saw" => Some(WaveShape::Sawtooth),
            "square" => Some(WaveShape::Square),
            _ => None,
        }
    }
}

/// Periodic wave given by its Fourier coefficients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomWave {
    pub id: String,
    pub real: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imag: Option<Vec<f64>>,
}

impl CustomWave {
    /// Imaginary coefficients; defaults to the real ones when omitted.
    pub fn imag(&self) -> &[f64] {
        self.imag.as_deref().unwrap_or(&self.real)
    }
}

/// Waveform attached to a note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WaveformRef {
    Builtin(WaveShape),
    Custom(CustomWave),
}

impl WaveformRef {
    /// Identity used for change detection: the shape name or the custom id.
    pub fn id(&self) -> &str {
        match self {
            WaveformRef::Builtin(shape) => shape.name(),
            WaveformRef::Custom(wave) => &wave.id,
        }
    }
}

impl Default for WaveformRef {
    fn default() -> Self {
        WaveformRef::Builtin(WaveShape::Square)
    }
}

impl From<WaveShape> for WaveformRef {
    fn from(shape: WaveShape) -> Self {
        WaveformRef::Builtin(shape)
    }
}
