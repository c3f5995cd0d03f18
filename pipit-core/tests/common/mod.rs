#![allow(dead_code)]
//! Test harness utilities for pipit-core integration tests.

use std::cell::Cell;
use std::rc::Rc;

use pipit_audio::TestDevice;
use pipit_core::{Controllers, PlaybackDefaults, Tuner, TunerConfig, TunerEvent};
use pipit_types::Pattern;

/// Seconds per beat at the default tempo.
pub const BEAT: f64 = 60.0 / 132.0;

/// Small step past a scheduled boundary.
pub const EPS: f64 = 1e-6;

/// Build a tuner on a fresh recording device.
pub fn make_tuner(channels: usize) -> (Rc<TestDevice>, Tuner) {
    let device = Rc::new(TestDevice::new());
    let config = TunerConfig {
        channels,
        sfx_slots: 16,
        music_slots: 4,
        ..TunerConfig::default()
    };
    let tuner = Tuner::new(device.clone(), config, PlaybackDefaults::default());
    (device, tuner)
}

/// Register `entries` as sfx pattern `slot`.
pub fn load(tuner: &mut Tuner, slot: usize, entries: &[&str]) {
    tuner.set_sfx_pattern(slot, Pattern::parse(entries)).unwrap();
}

/// Render up to `time` and let the tuner react.
pub fn advance(device: &TestDevice, tuner: &mut Tuner, time: f64) {
    device.advance_to(time);
    tuner.tick();
}

/// Step through time in small increments so chained passes are observed
/// one at a time.
pub fn run_until(device: &TestDevice, tuner: &mut Tuner, time: f64, step: f64) {
    let mut t = device_time(device);
    while t < time {
        t = (t + step).min(time);
        advance(device, tuner, t);
    }
}

fn device_time(device: &TestDevice) -> f64 {
    use pipit_audio::AudioDevice;
    device.current_time()
}

/// Counter plus a controller callback that bumps it.
pub fn counter() -> (Rc<Cell<usize>>, Rc<dyn Fn()>) {
    let count = Rc::new(Cell::new(0));
    let bump = count.clone();
    (count, Rc::new(move || bump.set(bump.get() + 1)))
}

pub fn with_on_finished(controllers: Controllers, callback: Rc<dyn Fn()>) -> Controllers {
    Controllers {
        on_finished: Some(callback),
        ..controllers
    }
}

pub fn with_on_all_finished(controllers: Controllers, callback: Rc<dyn Fn()>) -> Controllers {
    Controllers {
        on_all_finished: Some(callback),
        ..controllers
    }
}

/// Drain pending events.
pub fn drain(rx: &crossbeam_channel::Receiver<TunerEvent>) -> Vec<TunerEvent> {
    rx.try_iter().collect()
}
