//! Per-session event accumulation and draining.
//!
//! # Design
//! - Appends are strictly ordered; the accumulator never reorders or drops.
//! - `drain` swaps the pending vector for an empty one, so every event is
//!   delivered exactly once.
//! - Sequence numbers keep counting across drains, letting callers detect gaps.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::EventEncodeError;
use crate::payloads::{Event, EventEnvelope, EventId};

/// Ordered buffer of events raised since the previous drain.
#[derive(Debug, Default)]
pub struct EventAccumulator {
    next_seq: EventId,
    pending: Vec<EventEnvelope>,
}

impl EventAccumulator {
    /// Create an empty accumulator whose first event receives sequence 0.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next_seq: 0,
            pending: Vec::new(),
        }
    }

    /// Append an event, returning the sequence number it was assigned.
    pub fn push(&mut self, event: Event) -> EventId {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.push(EventEnvelope {
            seq,
            timestamp: Utc::now(),
            event,
        });
        seq
    }

    /// Number of events waiting to be drained.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is waiting to be drained.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Sequence number the next appended event will receive.
    #[must_use]
    pub const fn next_seq(&self) -> EventId {
        self.next_seq
    }

    /// Take every pending event, leaving the accumulator empty.
    pub fn drain(&mut self) -> EventBatch {
        EventBatch {
            events: std::mem::take(&mut self.pending),
        }
    }
}

/// Events returned by one drain, in callback order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventBatch {
    /// Drained envelopes.
    pub events: Vec<EventEnvelope>,
}

impl EventBatch {
    /// Number of events in the batch.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the drain returned nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Iterate over the wrapped events without their envelopes.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().map(|envelope| &envelope.event)
    }

    /// Consume the batch, yielding the bare events.
    #[must_use]
    pub fn into_events(self) -> Vec<Event> {
        self.events
            .into_iter()
            .map(|envelope| envelope.event)
            .collect()
    }

    /// Encode the batch as one JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`EventEncodeError::Json`] when serialisation fails.
    pub fn encode(&self) -> Result<Vec<u8>, EventEncodeError> {
        serde_json::to_vec(self).map_err(|source| EventEncodeError::Json {
            batch_len: self.len(),
            source,
        })
    }
}

impl IntoIterator for EventBatch {
    type Item = EventEnvelope;
    type IntoIter = std::vec::IntoIter<EventEnvelope>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payloads::ConnectionStatus;

    fn typing(friend_number: u32) -> Event {
        Event::FriendTyping {
            friend_number,
            is_typing: true,
        }
    }

    #[test]
    fn drain_returns_events_in_append_order() {
        let mut accumulator = EventAccumulator::new();
        for friend in 0..4 {
            accumulator.push(typing(friend));
        }
        let batch = accumulator.drain();
        let friends: Vec<u32> = batch
            .iter()
            .filter_map(|event| match event {
                Event::FriendTyping { friend_number, .. } => Some(*friend_number),
                _ => None,
            })
            .collect();
        assert_eq!(friends, vec![0, 1, 2, 3]);
    }

    #[test]
    fn drain_empties_and_sequence_continues() {
        let mut accumulator = EventAccumulator::new();
        accumulator.push(typing(1));
        accumulator.push(typing(2));
        let first = accumulator.drain();
        assert!(accumulator.is_empty());
        assert!(accumulator.drain().is_empty());

        accumulator.push(typing(3));
        let second = accumulator.drain();
        let seqs: Vec<EventId> = first
            .into_iter()
            .chain(second)
            .map(|envelope| envelope.seq)
            .collect();
        assert_eq!(seqs, vec![0, 1, 2]);
        assert_eq!(accumulator.next_seq(), 3);
    }

    #[test]
    fn encoded_batch_is_tagged_json() -> anyhow::Result<()> {
        let mut accumulator = EventAccumulator::new();
        accumulator.push(Event::SelfConnectionStatus {
            connection_status: ConnectionStatus::Tcp,
        });
        let bytes = accumulator.drain().encode()?;
        let value: serde_json::Value = serde_json::from_slice(&bytes)?;
        assert_eq!(value["events"][0]["event"]["type"], "self_connection_status");
        assert_eq!(value["events"][0]["event"]["connection_status"], "tcp");
        assert_eq!(value["events"][0]["seq"], 0);
        Ok(())
    }
}
