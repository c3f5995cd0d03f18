use pipit_audio::{Sequence, SequenceEvent, SequencePlan, SequenceState, VoiceId};

use super::command::{Callback, SequenceKind};

/// What currently plays on a channel.
pub(crate) struct Occupant {
    pub sequence: Sequence,
    /// Loop part waiting for the prelude to finish
    pub pending_loop: Option<SequencePlan>,
    pub kind: SequenceKind,
    pub monopolized: bool,
    pub on_finished: Option<Callback>,
    /// Music session this part belongs to
    pub music: Option<u64>,
}

impl Occupant {
    /// Stop now. No further cycle or finish is reported for this occupant.
    pub fn stop(mut self) {
        if let Err(e) = self.sequence.handle(SequenceEvent::StopRequested) {
            log::warn!(target: "pipit::tuner", "stop request failed: {}", e);
        }
    }

    /// Clear looping so the occupant ends after its current pass.
    pub fn release(&mut self) -> bool {
        let dropped = self.pending_loop.take().is_some();
        self.sequence.release() || dropped
    }
}

/// One slot of the fixed channel pool.
pub struct Channel {
    index: usize,
    pub(crate) occupant: Option<Occupant>,
}

impl Channel {
    pub(crate) fn new(index: usize) -> Self {
        Self {
            index,
            occupant: None,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_idle(&self) -> bool {
        self.occupant.is_none()
    }

    pub fn kind(&self) -> Option<SequenceKind> {
        self.occupant.as_ref().map(|o| o.kind)
    }

    pub fn is_monopolized(&self) -> bool {
        self.occupant.as_ref().is_some_and(|o| o.monopolized)
    }

    /// Whether the occupant will keep repeating (looping now, or a loop part
    /// is queued behind its prelude).
    pub fn is_looping(&self) -> bool {
        self.occupant.as_ref().is_some_and(|o| {
            o.pending_loop.is_some() || o.sequence.state() == SequenceState::Looping
        })
    }

    pub fn voice(&self) -> Option<VoiceId> {
        self.occupant.as_ref().and_then(|o| o.sequence.voice())
    }

    pub(crate) fn owns(&self, voice: VoiceId) -> bool {
        self.occupant
            .as_ref()
            .is_some_and(|o| o.sequence.owns(voice))
    }
}

/// First idle channel, else the first one whose occupant may be preempted.
pub(crate) fn select_auto(channels: &[Channel]) -> Option<usize> {
    channels
        .iter()
        .position(Channel::is_idle)
        .or_else(|| channels.iter().position(|c| !c.is_monopolized()))
}
