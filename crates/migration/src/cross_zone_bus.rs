//! Ordered, at-least-once delivery of migration and aura messages
//! between zones, with FIFO-per-channel and duplicate-suppression
//! guarantees. `InMemoryCrossZoneBus` is the in-process implementation
//! used by a single server hosting multiple zones and by tests; a
//! distributed deployment swaps in a different `CrossZoneBus`
//! implementation over the same trait.

use std::collections::{HashMap, HashSet, VecDeque};

use meridian_wire::MigrationEnvelope;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CrossZoneBusError {
    #[error("channel {source_zone_id} -> {dest_zone_id} is over capacity")]
    Overflow { source_zone_id: u32, dest_zone_id: u32 },
}

/// Required guarantees: FIFO per `(source_zone, dest_zone)` channel,
/// non-blocking send, duplicate suppression by `(sourceZone, seq)`.
/// Overflow is backpressure, never a panic — callers surface it as a
/// degraded-channel event and mark affected migrations as timed out.
pub trait CrossZoneBus {
    fn send(&mut self, dest_zone_id: u32, envelope: MigrationEnvelope) -> Result<(), CrossZoneBusError>;
    fn drain(&mut self, dest_zone_id: u32) -> Vec<MigrationEnvelope>;
}

type ChannelKey = (u32, u32);

pub struct InMemoryCrossZoneBus {
    capacity: usize,
    queues: HashMap<ChannelKey, VecDeque<MigrationEnvelope>>,
    seen: HashMap<ChannelKey, HashSet<u64>>,
}

impl InMemoryCrossZoneBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            queues: HashMap::new(),
            seen: HashMap::new(),
        }
    }

    #[must_use]
    pub fn pending_len(&self, source_zone_id: u32, dest_zone_id: u32) -> usize {
        self.queues
            .get(&(source_zone_id, dest_zone_id))
            .map_or(0, VecDeque::len)
    }
}

impl Default for InMemoryCrossZoneBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl CrossZoneBus for InMemoryCrossZoneBus {
    fn send(&mut self, dest_zone_id: u32, envelope: MigrationEnvelope) -> Result<(), CrossZoneBusError> {
        let key = (envelope.source_zone_id, dest_zone_id);

        let seen = self.seen.entry(key).or_default();
        if seen.contains(&envelope.channel_seq) {
            return Ok(());
        }

        let queue = self.queues.entry(key).or_default();
        if queue.len() >= self.capacity {
            return Err(CrossZoneBusError::Overflow {
                source_zone_id: envelope.source_zone_id,
                dest_zone_id,
            });
        }

        seen.insert(envelope.channel_seq);
        if seen.len() > self.capacity * 4 {
            if let Some(&oldest) = seen.iter().min() {
                seen.remove(&oldest);
            }
        }
        queue.push_back(envelope);
        Ok(())
    }

    fn drain(&mut self, dest_zone_id: u32) -> Vec<MigrationEnvelope> {
        let mut out = Vec::new();
        let keys: Vec<ChannelKey> = self
            .queues
            .keys()
            .filter(|(_, dest)| *dest == dest_zone_id)
            .copied()
            .collect();
        for key in keys {
            if let Some(queue) = self.queues.get_mut(&key) {
                out.extend(queue.drain(..));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_wire::{EntityHandle, MigrationMessage};

    fn envelope(source_zone_id: u32, channel_seq: u64) -> MigrationEnvelope {
        MigrationEnvelope {
            source_zone_id,
            channel_seq,
            message: MigrationMessage::MigrateAck {
                handle: EntityHandle { index: 1, generation: 0 },
                epoch: 1,
            },
        }
    }

    #[test]
    fn fifo_per_channel() {
        let mut bus = InMemoryCrossZoneBus::default();
        bus.send(2, envelope(1, 1)).unwrap();
        bus.send(2, envelope(1, 2)).unwrap();
        bus.send(2, envelope(1, 3)).unwrap();

        let drained = bus.drain(2);
        let seqs: Vec<u64> = drained.iter().map(|e| e.channel_seq).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
    }

    #[test]
    fn duplicate_seq_is_suppressed() {
        let mut bus = InMemoryCrossZoneBus::default();
        bus.send(2, envelope(1, 1)).unwrap();
        bus.send(2, envelope(1, 1)).unwrap();

        assert_eq!(bus.drain(2).len(), 1);
    }

    #[test]
    fn drain_only_returns_messages_for_the_requested_destination() {
        let mut bus = InMemoryCrossZoneBus::default();
        bus.send(2, envelope(1, 1)).unwrap();
        bus.send(3, envelope(1, 2)).unwrap();

        assert_eq!(bus.drain(2).len(), 1);
        assert_eq!(bus.drain(3).len(), 1);
    }

    #[test]
    fn overflow_is_reported_as_backpressure_not_a_panic() {
        let mut bus = InMemoryCrossZoneBus::new(2);
        bus.send(2, envelope(1, 1)).unwrap();
        bus.send(2, envelope(1, 2)).unwrap();
        let result = bus.send(2, envelope(1, 3));
        assert_eq!(
            result,
            Err(CrossZoneBusError::Overflow { source_zone_id: 1, dest_zone_id: 2 })
        );
    }

    #[test]
    fn drain_empties_the_channel() {
        let mut bus = InMemoryCrossZoneBus::default();
        bus.send(2, envelope(1, 1)).unwrap();
        bus.drain(2);
        assert_eq!(bus.pending_len(1, 2), 0);
    }
}
