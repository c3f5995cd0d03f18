//! Tuner event stream.
//!
//! The tuner publishes what happened on its channels to a bounded crossbeam
//! channel. Events emitted while the queue is full are dropped; nothing in
//! the tuner depends on delivery.

use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::tuner::SequenceKind;

const EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq)]
pub enum TunerEvent {
    Started { channel: usize, kind: SequenceKind },
    /// A pass of the channel's sequence completed
    Cycled { channel: usize },
    /// The channel finished on its own and is idle again
    Finished { channel: usize },
    /// The channel was stopped or preempted
    Stopped { channel: usize },
    MusicFinished { pattern: usize },
    MissingPattern { pool: &'static str, slot: usize },
    /// A rescheduled pass failed; the channel was cleared
    PassFailed { channel: usize, reason: String },
}

pub(crate) struct EventSink {
    tx: Sender<TunerEvent>,
    rx: Receiver<TunerEvent>,
}

impl EventSink {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::bounded(EVENT_CAPACITY);
        Self { tx, rx }
    }

    pub fn subscribe(&self) -> Receiver<TunerEvent> {
        self.rx.clone()
    }

    pub fn emit(&self, event: TunerEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                log::debug!(target: "pipit::tuner", "event queue full, dropping {:?}", event);
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_queue_drops() {
        let sink = EventSink::new();
        let rx = sink.subscribe();
        for i in 0..EVENT_CAPACITY + 10 {
            sink.emit(TunerEvent::Cycled { channel: i });
        }
        let drained: Vec<TunerEvent> = rx.try_iter().collect();
        assert_eq!(drained.len(), EVENT_CAPACITY);
        assert_eq!(drained[0], TunerEvent::Cycled { channel: 0 });
    }
}
