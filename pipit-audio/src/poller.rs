//! Best-effort waveform switching.
//!
//! No sample-accurate primitive for swapping a live oscillator's waveform is
//! assumed, so a sequence with mixed waveforms records one marker per note
//! and the host's tick polls them at a fixed interval. A backend with exact
//! mid-voice switching could schedule the swaps directly instead.

use pipit_types::WaveformRef;

/// Default poll interval, in seconds.
pub const DEFAULT_POLL_INTERVAL: f64 = 0.010;

/// `[begin, end)` relative to the pass start.
#[derive(Debug, Clone, PartialEq)]
pub struct WaveformMarker {
    pub begin: f64,
    pub end: f64,
    pub waveform: WaveformRef,
}

#[derive(Debug, Clone)]
pub struct WaveformPoller {
    markers: Vec<WaveformMarker>,
    pass_start: f64,
    interval: f64,
    next_due: f64,
    last_applied: Option<String>,
}

impl WaveformPoller {
    pub fn new(markers: Vec<WaveformMarker>, pass_start: f64, interval: f64) -> Self {
        let last_applied = markers.first().map(|m| m.waveform.id().to_string());
        Self {
            markers,
            pass_start,
            interval: interval.max(0.0),
            next_due: pass_start,
            last_applied,
        }
    }

    pub fn markers(&self) -> &[WaveformMarker] {
        &self.markers
    }

    /// Check the marker under `now`. Returns the waveform to apply only when
    /// it differs from the last one applied; calls before the next due time
    /// are skipped.
    pub fn poll(&mut self, now: f64) -> Option<&WaveformRef> {
        if now < self.next_due {
            return None;
        }
        self.next_due = now + self.interval;

        let elapsed = now - self.pass_start;
        let marker = self
            .markers
            .iter()
            .find(|m| m.begin <= elapsed && elapsed < m.end)?;
        let id = marker.waveform.id();
        if self.last_applied.as_deref() == Some(id) {
            return None;
        }
        self.last_applied = Some(id.to_string());
        Some(&marker.waveform)
    }
}
