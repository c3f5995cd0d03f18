//! Channel arbiter.
//!
//! The tuner owns fixed pools of sfx patterns, sfx options, music patterns
//! and channels. It is the only thing that mutates channel state: sequences
//! report transitions and the tuner decides what happens to the channel.
//! Time advances through [`Tuner::tick`], which consumes the device's
//! ended-voice reports and drives waveform polling.

mod channel;
mod command;
mod music;
mod slice;

pub use channel::Channel;
pub use command::{
    Callback, ChannelSelect, Controllers, SequenceKind, SfxCommand, AUTO, RELEASE, STOP, STOP_ALL,
};
pub use slice::{plan_slice, SlicePlan};

use std::collections::HashMap;
use std::ops::Range;
use std::rc::Rc;

use crossbeam_channel::Receiver;
use pipit_audio::{
    AudioDevice, DeviceResult, NodeId, ProcessorPair, Route, Sequence, SequenceEvent, SequencePlan, Transition,
    VoiceId,
};
use pipit_types::{MusicPattern, Pattern, PatternOptions};

use crate::config::{Config, PlaybackDefaults, TunerConfig};
use crate::error::{check_index, TunerError, TunerResult};
use crate::event::{EventSink, TunerEvent};
use channel::{select_auto, Occupant};
use music::MusicSession;

const SFX_POOL: &str = "sfx pattern";
const MUSIC_POOL: &str = "music pattern";
const CHANNEL_POOL: &str = "channel";

/// How one part should be installed on a channel.
struct PartRequest {
    slot: usize,
    offset: Option<usize>,
    length: Option<usize>,
    route: Route,
    fade: Option<f64>,
    when: f64,
    kind: SequenceKind,
    monopolized: bool,
    looping: bool,
    on_finished: Option<Callback>,
    music: Option<u64>,
}

pub struct Tuner {
    device: Rc<dyn AudioDevice>,
    defaults: PlaybackDefaults,
    poll_interval: f64,
    sfx_patterns: Vec<Option<Pattern>>,
    sfx_options: Vec<PatternOptions>,
    music_patterns: Vec<Option<MusicPattern>>,
    channels: Vec<Channel>,
    sessions: HashMap<u64, MusicSession>,
    next_session: u64,
    events: EventSink,
}

impl Tuner {
    pub fn new(device: Rc<dyn AudioDevice>, config: TunerConfig, defaults: PlaybackDefaults) -> Self {
        let channels = config.channels.max(1);
        Self {
            device,
            defaults,
            poll_interval: config.poll_interval.as_secs_f64(),
            sfx_patterns: vec![None; config.sfx_slots],
            sfx_options: vec![PatternOptions::default(); config.sfx_slots],
            music_patterns: vec![None; config.music_slots],
            channels: (0..channels).map(Channel::new).collect(),
            sessions: HashMap::new(),
            next_session: 0,
            events: EventSink::new(),
        }
    }

    pub fn from_config(device: Rc<dyn AudioDevice>, config: &Config) -> Self {
        Self::new(device, config.tuner(), config.defaults())
    }

    /// Receiver for channel events. Every receiver shares one queue.
    pub fn events(&self) -> Receiver<TunerEvent> {
        self.events.subscribe()
    }

    pub fn defaults(&self) -> &PlaybackDefaults {
        &self.defaults
    }

    /// Platform unlock negotiation, forwarded to the device.
    pub fn unlock(&self) -> DeviceResult {
        self.device.unlock()
    }

    // ─── Pools ──────────────────────────────────────────────────────

    pub fn set_sfx_pattern(&mut self, slot: usize, pattern: Pattern) -> TunerResult {
        check_index(SFX_POOL, slot, self.sfx_patterns.len())?;
        self.sfx_patterns[slot] = Some(pattern);
        Ok(())
    }

    pub fn set_sfx_options(&mut self, slot: usize, options: PatternOptions) -> TunerResult {
        check_index(SFX_POOL, slot, self.sfx_options.len())?;
        self.sfx_options[slot] = options;
        Ok(())
    }

    pub fn set_music_pattern(&mut self, slot: usize, pattern: MusicPattern) -> TunerResult {
        check_index(MUSIC_POOL, slot, self.music_patterns.len())?;
        self.music_patterns[slot] = Some(pattern);
        Ok(())
    }

    /// Parse and register an sfx pattern (and optionally its options) from JSON.
    pub fn load_sfx_json(&mut self, slot: usize, notes: &str, options: Option<&str>) -> TunerResult {
        check_index(SFX_POOL, slot, self.sfx_patterns.len())?;
        let pattern = Pattern::from_json(notes, self.defaults.tuning_a4)?;
        let options = options.map(PatternOptions::from_json).transpose()?;
        self.set_sfx_pattern(slot, pattern)?;
        if let Some(options) = options {
            self.set_sfx_options(slot, options)?;
        }
        Ok(())
    }

    pub fn sfx_pattern(&self, slot: usize) -> Option<&Pattern> {
        self.sfx_patterns.get(slot).and_then(Option::as_ref)
    }

    // ─── Introspection ─────────────────────────────────────────────

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channel(&self, index: usize) -> Option<&Channel> {
        self.channels.get(index)
    }

    pub fn is_idle(&self, index: usize) -> bool {
        self.channels.get(index).is_some_and(Channel::is_idle)
    }

    /// Indices of occupied channels.
    pub fn active_channels(&self) -> Vec<usize> {
        self.channels
            .iter()
            .filter(|c| !c.is_idle())
            .map(Channel::index)
            .collect()
    }

    // ─── Sfx ───────────────────────────────────────────────────────

    /// Play, stop or release an sfx pattern. Returns the channel a pattern
    /// started on, or `None` when nothing was played.
    pub fn sfx(
        &mut self,
        command: SfxCommand,
        channel: ChannelSelect,
        offset: Option<usize>,
        length: Option<usize>,
        controllers: Controllers,
    ) -> TunerResult<Option<usize>> {
        let slot = match command {
            SfxCommand::Stop => {
                self.stop(channel)?;
                return Ok(None);
            }
            SfxCommand::Release => {
                self.release(channel)?;
                return Ok(None);
            }
            SfxCommand::Play(slot) => slot,
        };

        let target = match channel {
            ChannelSelect::StopAll => {
                self.stop_all();
                return Ok(None);
            }
            ChannelSelect::Index(index) => {
                check_index(CHANNEL_POOL, index, self.channels.len())?;
                Some(index)
            }
            ChannelSelect::Auto => None,
        };
        check_index(SFX_POOL, slot, self.sfx_patterns.len())?;
        let route = resolve_route(controllers.processor.as_deref())?;

        if self.sfx_patterns[slot].is_none() {
            log::warn!(target: "pipit::tuner", "sfx slot {} is empty, nothing to play", slot);
            self.events.emit(TunerEvent::MissingPattern { pool: SFX_POOL, slot });
            return Ok(None);
        }

        let Some(target) = target.or_else(|| select_auto(&self.channels)) else {
            log::warn!(target: "pipit::tuner", "all channels monopolized, dropping sfx {}", slot);
            return Ok(None);
        };

        let request = PartRequest {
            slot,
            offset,
            length,
            route,
            fade: None,
            when: controllers.when.unwrap_or_else(|| self.device.current_time()),
            kind: controllers.kind,
            monopolized: controllers.monopolized,
            looping: controllers.looping,
            on_finished: controllers.on_finished,
            music: None,
        };
        self.install(target, request)?;
        self.prune_sessions();
        Ok(Some(target))
    }

    // ─── Music ─────────────────────────────────────────────────────

    /// Play a multi-part piece: part `i` of the music pattern plays its sfx
    /// pattern on channel `i`. Bits of `channel_mask` monopolize the
    /// matching channels. `Stop` and `Release` act on music channels only.
    pub fn music(
        &mut self,
        command: SfxCommand,
        channel_mask: u64,
        fade: Option<f64>,
        processors: &[Option<Vec<NodeId>>],
        controllers: Controllers,
    ) -> TunerResult {
        let index = match command {
            SfxCommand::Stop => {
                self.stop_music();
                return Ok(());
            }
            SfxCommand::Release => {
                for channel in &mut self.channels {
                    if let Some(occupant) = channel.occupant.as_mut() {
                        if occupant.kind == SequenceKind::Music {
                            occupant.release();
                        }
                    }
                }
                return Ok(());
            }
            SfxCommand::Play(index) => index,
        };

        check_index(MUSIC_POOL, index, self.music_patterns.len())?;
        let Some(pattern) = self.music_patterns[index].clone() else {
            log::warn!(target: "pipit::tuner", "music slot {} is empty, nothing to play", index);
            self.events.emit(TunerEvent::MissingPattern { pool: MUSIC_POOL, slot: index });
            return Ok(());
        };

        let parts: Vec<Option<usize>> = pattern.parts().collect();
        if parts.len() > self.channels.len() {
            return Err(TunerError::Index {
                pool: CHANNEL_POOL,
                index: parts.len() - 1,
                len: self.channels.len(),
            });
        }
        for slot in parts.iter().flatten() {
            check_index(SFX_POOL, *slot, self.sfx_patterns.len())?;
        }
        let routes = (0..parts.len())
            .map(|i| resolve_route(processors.get(i).and_then(|p| p.as_deref())))
            .collect::<TunerResult<Vec<Route>>>()?;

        // Parts without a registered pattern count as holes.
        let playable: Vec<(usize, usize)> = parts
            .iter()
            .enumerate()
            .filter_map(|(pos, part)| part.map(|slot| (pos, slot)))
            .filter(|&(_, slot)| {
                let present = self.sfx_patterns[slot].is_some();
                if !present {
                    log::warn!(target: "pipit::tuner", "music {} references empty sfx slot {}", index, slot);
                }
                present
            })
            .collect();

        let holes = parts.len() - playable.len();
        let session = MusicSession::new(index, parts.len(), holes, controllers.on_all_finished.clone());
        if session.is_done() {
            log::info!(target: "pipit::tuner", "music {} has no playable parts", index);
            self.events.emit(TunerEvent::MusicFinished { pattern: index });
            if let Some(callback) = session.on_all_finished {
                callback();
            }
            return Ok(());
        }

        let id = self.next_session;
        self.next_session += 1;
        self.sessions.insert(id, session);
        log::info!(
            target: "pipit::tuner",
            "music {}: {} parts, {} holes",
            index, parts.len(), holes
        );

        let when = controllers.when.unwrap_or_else(|| self.device.current_time());
        for (pos, slot) in playable {
            let request = PartRequest {
                slot,
                offset: None,
                length: None,
                route: routes[pos],
                fade,
                when,
                kind: SequenceKind::Music,
                monopolized: pos < 64 && channel_mask & (1 << pos) != 0,
                looping: controllers.looping,
                on_finished: controllers.on_finished.clone(),
                music: Some(id),
            };
            if let Err(e) = self.install(pos, request) {
                self.stop_session(id);
                return Err(e);
            }
        }
        self.prune_sessions();
        Ok(())
    }

    // ─── Stop / release ────────────────────────────────────────────

    /// Stop one channel or all of them. Idempotent on idle channels.
    pub fn stop(&mut self, channel: ChannelSelect) -> TunerResult {
        match channel {
            ChannelSelect::Index(index) => {
                check_index(CHANNEL_POOL, index, self.channels.len())?;
                self.stop_channel(index);
            }
            ChannelSelect::StopAll => self.stop_all(),
            ChannelSelect::Auto => {
                log::debug!(target: "pipit::tuner", "stop without a channel, ignoring");
            }
        }
        self.prune_sessions();
        Ok(())
    }

    /// Let the addressed channel finish its current pass and then stop.
    pub fn release(&mut self, channel: ChannelSelect) -> TunerResult {
        let targets: Vec<usize> = match channel {
            ChannelSelect::Index(index) => {
                check_index(CHANNEL_POOL, index, self.channels.len())?;
                vec![index]
            }
            ChannelSelect::StopAll => (0..self.channels.len()).collect(),
            ChannelSelect::Auto => Vec::new(),
        };
        for index in targets {
            if let Some(occupant) = self.channels[index].occupant.as_mut() {
                if occupant.release() {
                    log::debug!(target: "pipit::tuner", "channel {} released", index);
                }
            }
        }
        Ok(())
    }

    fn stop_all(&mut self) {
        for index in 0..self.channels.len() {
            self.stop_channel(index);
        }
        self.prune_sessions();
    }

    fn stop_music(&mut self) {
        for index in 0..self.channels.len() {
            if self.channels[index].kind() == Some(SequenceKind::Music) {
                self.stop_channel(index);
            }
        }
        self.prune_sessions();
    }

    fn stop_session(&mut self, id: u64) {
        for index in 0..self.channels.len() {
            let in_session = self.channels[index]
                .occupant
                .as_ref()
                .is_some_and(|o| o.music == Some(id));
            if in_session {
                self.stop_channel(index);
            }
        }
        self.sessions.remove(&id);
    }

    fn stop_channel(&mut self, index: usize) {
        if let Some(occupant) = self.channels[index].occupant.take() {
            occupant.stop();
            log::debug!(target: "pipit::tuner", "channel {} stopped", index);
            self.events.emit(TunerEvent::Stopped { channel: index });
        }
    }

    /// Forget music sessions with no part left on any channel.
    fn prune_sessions(&mut self) {
        let channels = &self.channels;
        self.sessions.retain(|id, session| {
            let live = channels
                .iter()
                .any(|c| c.occupant.as_ref().is_some_and(|o| o.music == Some(*id)));
            if !live {
                log::debug!(target: "pipit::tuner", "music {} abandoned", session.pattern);
            }
            live
        });
    }

    // ─── Installing ────────────────────────────────────────────────

    fn plan(&self, slot: usize, range: Range<usize>) -> Option<SequencePlan> {
        let pattern = self.sfx_patterns.get(slot)?.as_ref()?;
        let options = &self.sfx_options[slot];
        Some(
            SequencePlan::new(pattern.notes().clone())
                .with_range(range)
                .with_tempo(options.tempo.unwrap_or(self.defaults.tempo))
                .with_staccato(options.staccato.unwrap_or(self.defaults.staccato))
                .with_smoothing(options.smoothing.unwrap_or(self.defaults.smoothing))
                .with_waveform(self.defaults.waveform.clone()),
        )
    }

    /// Replace whatever occupies `index` with a new sequence for `request`.
    fn install(&mut self, index: usize, request: PartRequest) -> TunerResult {
        let len = self.sfx_patterns[request.slot].as_ref().map_or(0, Pattern::len);
        let split = plan_slice(
            len,
            request.offset,
            request.length,
            self.sfx_options[request.slot].loop_window,
        );

        let (first, pending_loop) = match split.looped {
            Some(looped) => {
                let looped = self.plan(request.slot, looped).map(|p| p.looping(true));
                if split.prelude.is_empty() {
                    (looped, None)
                } else {
                    (self.plan(request.slot, split.prelude), looped)
                }
            }
            None => (
                self.plan(request.slot, split.prelude)
                    .map(|p| p.looping(request.looping)),
                None,
            ),
        };
        let Some(first) = first else {
            return Ok(());
        };

        self.stop_channel(index);

        let mut sequence = Sequence::new(self.device.clone(), first)
            .with_route(request.route)
            .with_poll_interval(self.poll_interval);
        if let Some(fade) = request.fade {
            sequence = sequence.with_fade(fade);
        }
        sequence.play(Some(request.when))?;

        log::debug!(
            target: "pipit::tuner",
            "channel {} <- sfx {} ({:?}{})",
            index, request.slot, request.kind,
            if pending_loop.is_some() { ", loop queued" } else { "" }
        );
        self.channels[index].occupant = Some(Occupant {
            sequence,
            pending_loop,
            kind: request.kind,
            monopolized: request.monopolized,
            on_finished: request.on_finished,
            music: request.music,
        });
        self.events.emit(TunerEvent::Started {
            channel: index,
            kind: request.kind,
        });
        Ok(())
    }

    // ─── Time ──────────────────────────────────────────────────────

    /// Advance: consume ended voices, then poll waveform swaps. Callbacks
    /// run after all channel state has been updated.
    pub fn tick(&mut self) {
        let mut deferred: Vec<Callback> = Vec::new();

        for voice in self.device.drain_ended() {
            match self.channels.iter().position(|c| c.owns(voice)) {
                Some(index) => self.pass_exhausted(index, &mut deferred),
                None => log::trace!(target: "pipit::tuner", "stale voice {} ended", voice.0),
            }
        }
        self.prune_sessions();

        let now = self.device.current_time();
        for channel in &mut self.channels {
            if let Some(occupant) = channel.occupant.as_mut() {
                if let Err(e) = occupant.sequence.poll(now) {
                    log::warn!(target: "pipit::tuner", "waveform swap on channel {}: {}", channel.index(), e);
                }
            }
        }

        for callback in deferred {
            callback();
        }
    }

    fn pass_exhausted(&mut self, index: usize, deferred: &mut Vec<Callback>) {
        let Some(occupant) = self.channels[index].occupant.as_mut() else {
            return;
        };
        match occupant.sequence.handle(SequenceEvent::PassExhausted) {
            Ok(Transition::Cycled) => {
                self.events.emit(TunerEvent::Cycled { channel: index });
            }
            Ok(Transition::Finished) => {
                self.events.emit(TunerEvent::Cycled { channel: index });
                match occupant.pending_loop.take() {
                    Some(plan) => {
                        let start = occupant.sequence.pass_end();
                        let mut next = occupant.sequence.successor(plan);
                        match next.play(Some(start)) {
                            Ok(()) => {
                                log::debug!(target: "pipit::tuner", "channel {} entering loop", index);
                                occupant.sequence = next;
                            }
                            Err(e) => self.pass_failed(index, e.to_string()),
                        }
                    }
                    None => self.finish(index, deferred),
                }
            }
            Ok(Transition::Stopped | Transition::Ignored) => {}
            Err(e) => self.pass_failed(index, e.to_string()),
        }
    }

    fn finish(&mut self, index: usize, deferred: &mut Vec<Callback>) {
        let Some(occupant) = self.channels[index].occupant.take() else {
            return;
        };
        log::debug!(target: "pipit::tuner", "channel {} finished", index);
        self.events.emit(TunerEvent::Finished { channel: index });
        if let Some(callback) = occupant.on_finished.clone() {
            deferred.push(callback);
        }
        let Some(id) = occupant.music else {
            return;
        };
        let done = self
            .sessions
            .get_mut(&id)
            .is_some_and(MusicSession::complete_part);
        if done {
            if let Some(session) = self.sessions.remove(&id) {
                log::info!(target: "pipit::tuner", "music {} finished", session.pattern);
                self.events.emit(TunerEvent::MusicFinished {
                    pattern: session.pattern,
                });
                if let Some(callback) = session.on_all_finished {
                    deferred.push(callback);
                }
            }
        }
    }

    fn pass_failed(&mut self, index: usize, reason: String) {
        log::error!(target: "pipit::tuner", "channel {} pass failed: {}", index, reason);
        self.stop_channel(index);
        self.events.emit(TunerEvent::PassFailed {
            channel: index,
            reason,
        });
        self.prune_sessions();
    }

    /// Look up which channel currently plays `voice`.
    pub fn channel_of(&self, voice: VoiceId) -> Option<usize> {
        self.channels.iter().position(|c| c.owns(voice))
    }
}

fn resolve_route(processor: Option<&[NodeId]>) -> TunerResult<Route> {
    match processor {
        None => Ok(Route::Output),
        Some(nodes) => ProcessorPair::from_nodes(nodes)
            .map(Route::Processor)
            .ok_or_else(|| {
                TunerError::Config(format!(
                    "processor must be an [entry, exit] pair, got {} nodes",
                    nodes.len()
                ))
            }),
    }
}
