//! The network boundary: connection identity, the reliable/unreliable
//! channel split of spec §4.10, and the trait the tick thread drains
//! inbound packets through. No concrete transport lives in this crate —
//! sockets, QUIC streams, whatever a real deployment picks, are a
//! collaborator represented here only by [`NetworkAdapter`], the way
//! [`crate::store::ZoneStore`] represents persistence.
//!
//! The tick thread never blocks on this trait: [`NetworkAdapter::drain_inputs`]
//! returns whatever is already buffered and nothing more, matching §5's
//! "tick thread never blocks on I/O."

use std::collections::VecDeque;

/// Identifies one network connection for the lifetime of its session.
/// Not reused after [`NetworkAdapter::disconnect`] — a reconnecting client
/// gets a fresh id and a fresh handshake.
pub type ConnectionId = u64;

/// Why a connection was (or is about to be) dropped. Carried to the client
/// on the reliable channel where possible (`ProtocolMismatch`, `Banned`,
/// `AntiCheat`) and recorded locally otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    ProtocolMismatch,
    Unauthenticated,
    Banned,
    ServerFull,
    AntiCheat,
    RttTimeout,
    MigrationHandoff,
    ClientClosed,
}

impl DisconnectReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ProtocolMismatch => "protocol_mismatch",
            Self::Unauthenticated => "unauthenticated",
            Self::Banned => "banned",
            Self::ServerFull => "server_full",
            Self::AntiCheat => "anti_cheat",
            Self::RttTimeout => "rtt_timeout",
            Self::MigrationHandoff => "migration_handoff",
            Self::ClientClosed => "client_closed",
        }
    }
}

/// One inbound packet as handed from the I/O thread to the tick thread,
/// already tagged with the tick it was received on (§5: inputs are
/// partitioned into `thisTick`/`nextTick` relative to the drain cutoff).
#[derive(Debug, Clone)]
pub struct InboundPacket {
    pub connection: ConnectionId,
    pub bytes: Vec<u8>,
    pub receive_tick: u32,
}

/// Connection lifecycle plus the two logical channels of §4.10. A real
/// implementation runs socket I/O on its own thread and exchanges data
/// with the tick thread through bounded queues; this trait is the seam
/// between them.
pub trait NetworkAdapter {
    /// Currently live connection ids, in no particular order.
    fn connections(&self) -> Vec<ConnectionId>;

    /// Drain every inbound packet buffered since the last call. Never
    /// blocks; returns an empty vec if nothing has arrived.
    fn drain_inputs(&mut self) -> Vec<InboundPacket>;

    /// Reliable-ordered channel: handshake, `ServerCorrection`,
    /// `ReliableEvent`, migration-initiated disconnect.
    fn send_reliable(&mut self, connection: ConnectionId, bytes: Vec<u8>);

    /// Unreliable channel: snapshots and pings. Loss is tolerated; the
    /// delta-compression protocol in `meridian-replication` is built to
    /// recover from a dropped snapshot via `BaselineMismatch` handling.
    fn send_unreliable(&mut self, connection: ConnectionId, bytes: Vec<u8>);

    fn disconnect(&mut self, connection: ConnectionId, reason: DisconnectReason);
}

/// In-memory loopback adapter: inbound packets are pushed directly by the
/// test or embedding harness rather than arriving off a socket, and
/// outbound sends are recorded for assertions instead of transmitted.
/// This is the adapter the integration tests and the `meridian-server`
/// binary's own unit tests drive `Zone::tick` through; a production
/// deployment swaps in a real transport behind the same trait.
#[derive(Debug, Default)]
pub struct LoopbackAdapter {
    connections: Vec<ConnectionId>,
    inbound: VecDeque<InboundPacket>,
    pub reliable_sent: Vec<(ConnectionId, Vec<u8>)>,
    pub unreliable_sent: Vec<(ConnectionId, Vec<u8>)>,
    pub disconnects: Vec<(ConnectionId, DisconnectReason)>,
}

impl LoopbackAdapter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_connection(&mut self, connection: ConnectionId) {
        if !self.connections.contains(&connection) {
            self.connections.push(connection);
        }
    }

    pub fn push_inbound(&mut self, packet: InboundPacket) {
        self.inbound.push_back(packet);
    }
}

impl NetworkAdapter for LoopbackAdapter {
    fn connections(&self) -> Vec<ConnectionId> {
        self.connections.clone()
    }

    fn drain_inputs(&mut self) -> Vec<InboundPacket> {
        self.inbound.drain(..).collect()
    }

    fn send_reliable(&mut self, connection: ConnectionId, bytes: Vec<u8>) {
        self.reliable_sent.push((connection, bytes));
    }

    fn send_unreliable(&mut self, connection: ConnectionId, bytes: Vec<u8>) {
        self.unreliable_sent.push((connection, bytes));
    }

    fn disconnect(&mut self, connection: ConnectionId, reason: DisconnectReason) {
        self.connections.retain(|&c| c != connection);
        self.disconnects.push((connection, reason));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_drain_returns_everything_pushed_since_last_drain() {
        let mut adapter = LoopbackAdapter::new();
        adapter.push_inbound(InboundPacket {
            connection: 1,
            bytes: vec![1, 2, 3],
            receive_tick: 10,
        });
        adapter.push_inbound(InboundPacket {
            connection: 1,
            bytes: vec![4],
            receive_tick: 10,
        });

        let drained = adapter.drain_inputs();
        assert_eq!(drained.len(), 2);
        assert!(adapter.drain_inputs().is_empty());
    }

    #[test]
    fn disconnect_removes_connection_and_records_reason() {
        let mut adapter = LoopbackAdapter::new();
        adapter.add_connection(1);
        adapter.disconnect(1, DisconnectReason::AntiCheat);

        assert!(adapter.connections().is_empty());
        assert_eq!(adapter.disconnects, vec![(1, DisconnectReason::AntiCheat)]);
    }
}
