//! End-to-end tick-pipeline scenarios driven only through `Zone`'s public
//! surface (handshake bytes in, reliable/unreliable bytes out), the way a
//! real client would see the server. Anything that needs to reach inside
//! `Zone` (direct component mutation, calling a private resolver method
//! directly) belongs in `zone.rs`'s own `#[cfg(test)]` module instead —
//! these are the scenarios a black-box client-side integration test can
//! actually observe.

use std::cell::RefCell;
use std::rc::Rc;

use meridian_migration::{CrossZoneBus, InMemoryCrossZoneBus};
use meridian_server::{
    InboundPacket, LoggingMetrics, LoopbackAdapter, NullStore, Zone, ZoneConfig, PROTOCOL_VERSION,
};
use meridian_sim::components::InputFlags;
use meridian_wire::{ClientInput, HandshakeRequest};

type TestZone = Zone<LoopbackAdapter, NullStore, LoggingMetrics>;

fn new_zone(neighbor_zones: Vec<u32>) -> TestZone {
    let config = ZoneConfig::standard(1, neighbor_zones);
    let bus: Rc<RefCell<dyn CrossZoneBus>> = Rc::new(RefCell::new(InMemoryCrossZoneBus::new(1024)));
    Zone::new(config, LoopbackAdapter::new(), NullStore, LoggingMetrics, bus)
}

fn handshake(protocol_version: u32, username: &str) -> Vec<u8> {
    HandshakeRequest {
        protocol_version,
        client_version: 1,
        token: bytes::Bytes::new(),
        username: bytes::Bytes::copy_from_slice(username.as_bytes()),
    }
    .encode()
    .expect("handshake within length limits always encodes")
}

fn forward_input(seq: u32) -> Vec<u8> {
    ClientInput {
        seq,
        client_tick_ms: 0,
        input_flags: InputFlags::FORWARD,
        yaw: 0.0,
        pitch: 0.0,
        target_entity: 0,
        ack_baseline_tick: 0,
    }
    .encode()
}

/// §8: a connecting client that speaks the right protocol version gets a
/// handshake accept on the reliable channel and, once it starts sending
/// movement input, unreliable snapshot traffic.
#[test]
fn client_handshake_and_movement_integration() {
    let mut zone = new_zone(Vec::new());
    zone.net_mut().push_inbound(InboundPacket { connection: 1, bytes: handshake(PROTOCOL_VERSION, "alice"), receive_tick: 0 });
    zone.tick(0);

    assert_eq!(zone.net().reliable_sent.len(), 1, "handshake accept should be sent reliably");
    assert!(zone.net().disconnects.is_empty());

    zone.net_mut().push_inbound(InboundPacket { connection: 1, bytes: forward_input(1), receive_tick: 1 });
    for tick in 1..6u32 {
        zone.tick(u64::from(tick) * 16);
    }

    assert!(!zone.net().unreliable_sent.is_empty(), "a moving, connected client should receive snapshots");
}

/// §6/§7: a client speaking a protocol version the server doesn't know is
/// rejected during admission, never gets a session, and is disconnected
/// with `ProtocolMismatch` rather than silently dropped.
#[test]
fn protocol_mismatch_is_rejected_not_silently_dropped() {
    let mut zone = new_zone(Vec::new());
    zone.net_mut().push_inbound(InboundPacket {
        connection: 1,
        bytes: handshake(PROTOCOL_VERSION + 1, "eve"),
        receive_tick: 0,
    });
    zone.tick(0);

    assert_eq!(zone.net().reliable_sent.len(), 1, "a handshake reject is still sent on the reliable channel");
    assert_eq!(zone.net().disconnects.len(), 1);
}

/// §4.10/§8: the zone keeps ticking and keeps serving already-connected
/// clients while a second, independent client goes through its own
/// handshake — connections don't interfere with each other's pipeline.
#[test]
fn two_independent_clients_each_get_their_own_session_and_snapshots() {
    let mut zone = new_zone(Vec::new());
    zone.net_mut().push_inbound(InboundPacket { connection: 1, bytes: handshake(PROTOCOL_VERSION, "alice"), receive_tick: 0 });
    zone.net_mut().push_inbound(InboundPacket { connection: 2, bytes: handshake(PROTOCOL_VERSION, "bob"), receive_tick: 0 });
    zone.tick(0);

    assert_eq!(zone.net().reliable_sent.len(), 2);

    zone.net_mut().push_inbound(InboundPacket { connection: 1, bytes: forward_input(1), receive_tick: 1 });
    zone.net_mut().push_inbound(InboundPacket { connection: 2, bytes: forward_input(1), receive_tick: 1 });
    for tick in 1..6u32 {
        zone.tick(u64::from(tick) * 16);
    }

    let recipients: std::collections::HashSet<_> = zone.net().unreliable_sent.iter().map(|(c, _)| *c).collect();
    assert!(recipients.contains(&1) && recipients.contains(&2), "both sessions should have received at least one snapshot");
}

/// §2/§5: the tick counter advances exactly once per `tick()` call
/// regardless of connection activity, the invariant every other timing
/// system (`TickScheduler`, `AoiManager` cadence, lag compensation replay
/// window) is built on.
#[test]
fn tick_counter_advances_monotonically_with_no_clients() {
    let mut zone = new_zone(Vec::new());
    assert_eq!(zone.tick_number(), 0);
    for i in 0..10 {
        zone.tick(u64::from(i) * 16);
    }
    assert_eq!(zone.tick_number(), 10);
}

/// Scenario 2: a connection whose controlled entity's position jumps
/// farther than `max_teleport_distance_m` in a single tick gets kicked
/// with `DisconnectReason::AntiCheat` through the ordinary `Zone::tick`
/// pipeline, the same path a real cheat-engine speedhack would hit.
/// `ClientInput` carries no position field — a compliant client can never
/// report one directly — so the forged jump is written straight onto the
/// entity's `Position` the way a bug elsewhere in the pipeline (or a
/// future transport that does trust client coordinates) would surface it;
/// `reconcile_anticheat` doesn't care where the anomaly came from.
#[test]
fn teleporting_entity_is_disconnected_by_anticheat() {
    let mut zone = new_zone(Vec::new());
    zone.net_mut().push_inbound(InboundPacket { connection: 1, bytes: handshake(PROTOCOL_VERSION, "mallory"), receive_tick: 0 });
    zone.tick(0);
    assert!(zone.net().disconnects.is_empty());

    let entity = zone
        .world()
        .network_states
        .iter()
        .find(|(_, state)| state.connection_id == 1)
        .map(|(id, _)| id)
        .expect("handshake should have spawned a controlled entity for connection 1");

    let forged = zone.world().positions.get(entity).unwrap().pos;
    zone.world_mut().positions.get_mut(entity).unwrap().pos.z = forged.z + meridian_geom::Fixed::from_meters_f64(200.0);

    zone.tick(16);

    assert_eq!(
        zone.net().disconnects,
        vec![(1, meridian_server::DisconnectReason::AntiCheat)],
        "a 200m single-tick jump exceeds max_teleport_distance_m and must be caught immediately"
    );
}
