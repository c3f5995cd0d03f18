use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use pipit_types::{WaveShape, WaveformRef, STANDARD_A4};

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    defaults: DefaultsConfig,
    #[serde(default)]
    tuner: TunerSection,
}

#[derive(Deserialize, Default)]
struct DefaultsConfig {
    tempo: Option<f64>,
    staccato: Option<f64>,
    smoothing: Option<f64>,
    waveform: Option<String>,
    tuning_a4: Option<f64>,
}

#[derive(Deserialize, Default)]
struct TunerSection {
    channels: Option<usize>,
    sfx_slots: Option<usize>,
    music_slots: Option<usize>,
    poll_interval_ms: Option<u64>,
}

/// Playback settings applied to patterns that do not set their own.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackDefaults {
    pub tempo: f64,
    pub staccato: f64,
    pub smoothing: f64,
    pub waveform: WaveformRef,
    pub tuning_a4: f64,
}

impl Default for PlaybackDefaults {
    fn default() -> Self {
        Self {
            tempo: 132.0,
            staccato: 0.0,
            smoothing: 0.0,
            waveform: WaveformRef::Builtin(WaveShape::Square),
            tuning_a4: STANDARD_A4,
        }
    }
}

/// Pool sizes and timing for a [`crate::Tuner`]. Fixed at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct TunerConfig {
    pub channels: usize,
    pub sfx_slots: usize,
    pub music_slots: usize,
    pub poll_interval: Duration,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            channels: 4,
            sfx_slots: 64,
            music_slots: 64,
            poll_interval: Duration::from_millis(10),
        }
    }
}

pub struct Config {
    defaults: DefaultsConfig,
    tuner: TunerSection,
}

impl Config {
    /// Embedded defaults merged with `~/.config/pipit/config.toml`.
    pub fn load() -> Self {
        Self::load_with(user_config_path())
    }

    /// Embedded defaults merged with an explicit override file.
    pub fn load_from(path: &Path) -> Self {
        Self::load_with(Some(path.to_path_buf()))
    }

    fn load_with(path: Option<PathBuf>) -> Self {
        let mut base: ConfigFile =
            toml::from_str(DEFAULT_CONFIG).expect("Failed to parse embedded config.toml");

        if let Some(path) = path {
            if path.exists() {
                match std::fs::read_to_string(&path) {
                    Ok(contents) => match toml::from_str::<ConfigFile>(&contents) {
                        Ok(user) => {
                            merge_defaults(&mut base.defaults, user.defaults);
                            merge_tuner(&mut base.tuner, user.tuner);
                        }
                        Err(e) => {
                            log::warn!(target: "pipit::config", "ignoring malformed config {}: {}", path.display(), e)
                        }
                    },
                    Err(e) => {
                        log::warn!(target: "pipit::config", "could not read config {}: {}", path.display(), e)
                    }
                }
            }
        }

        Config {
            defaults: base.defaults,
            tuner: base.tuner,
        }
    }

    pub fn defaults(&self) -> PlaybackDefaults {
        let fallback = PlaybackDefaults::default();
        PlaybackDefaults {
            tempo: self
                .defaults
                .tempo
                .filter(|t| t.is_finite())
                .map_or(fallback.tempo, |t| t.clamp(1.0, 1000.0)),
            staccato: unit(self.defaults.staccato).unwrap_or(fallback.staccato),
            smoothing: unit(self.defaults.smoothing).unwrap_or(fallback.smoothing),
            waveform: self
                .defaults
                .waveform
                .as_deref()
                .and_then(parse_waveform)
                .unwrap_or(fallback.waveform),
            tuning_a4: self
                .defaults
                .tuning_a4
                .filter(|a| a.is_finite() && *a > 0.0)
                .unwrap_or(fallback.tuning_a4),
        }
    }

    pub fn tuner(&self) -> TunerConfig {
        let fallback = TunerConfig::default();
        TunerConfig {
            channels: self.tuner.channels.unwrap_or(fallback.channels).max(1),
            sfx_slots: self.tuner.sfx_slots.unwrap_or(fallback.sfx_slots).max(1),
            music_slots: self.tuner.music_slots.unwrap_or(fallback.music_slots).max(1),
            poll_interval: self
                .tuner
                .poll_interval_ms
                .map(|ms| Duration::from_millis(ms.clamp(1, 1000)))
                .unwrap_or(fallback.poll_interval),
        }
    }
}

fn unit(v: Option<f64>) -> Option<f64> {
    v.filter(|v| v.is_finite()).map(|v| v.clamp(0.0, 1.0))
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("pipit").join("config.toml"))
}

fn merge_defaults(base: &mut DefaultsConfig, user: DefaultsConfig) {
    if user.tempo.is_some() {
        base.tempo = user.tempo;
    }
    if user.staccato.is_some() {
        base.staccato = user.staccato;
    }
    if user.smoothing.is_some() {
        base.smoothing = user.smoothing;
    }
    if user.waveform.is_some() {
        base.waveform = user.waveform;
    }
    if user.tuning_a4.is_some() {
        base.tuning_a4 = user.tuning_a4;
    }
}

fn merge_tuner(base: &mut TunerSection, user: TunerSection) {
    if user.channels.is_some() {
        base.channels = user.channels;
    }
    if user.sfx_slots.is_some() {
        base.sfx_slots = user.sfx_slots;
    }
    if user.music_slots.is_some() {
        base.music_slots = user.music_slots;
    }
    if user.poll_interval_ms.is_some() {
        base.poll_interval_ms = user.poll_interval_ms;
    }
}

fn parse_waveform(s: &str) -> Option<WaveformRef> {
    WaveShape::from_name(s).map(WaveformRef::Builtin)
}
