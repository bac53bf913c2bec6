//! Zone orchestration: wires every system in §2's per-tick data flow
//! together behind one `Zone::tick` call. This is the only place in the
//! workspace that owns a `World` alongside network, admission, and
//! migration state — everything it calls into is otherwise a pure
//! function of its own inputs.

use std::cell::RefCell;
use std::collections::HashMap;
use std::f64::consts::FRAC_1_SQRT_2;
use std::net::{IpAddr, Ipv4Addr};
use std::rc::Rc;
use std::time::Duration;

use meridian_geom::{Fixed, Vec3Fixed};
use meridian_migration::{
    AuraProjector, CrossZoneBus, DestinationLedger, Edge, MigrationEffect, MigrationStateMachine,
    NeighborEdge, ZoneBounds,
};
use meridian_replication::{AoiConfig, AoiManager, AoiTier, BaselineCache, SnapshotBuilder};
use meridian_sim::components::{
    BoundingVolume, CombatState, EntityType, InputFlags, MigrationPhase, MigrationState,
    NetworkState, PlayerInfo, Rotation,
};
use meridian_sim::{
    AntiCheatConfig, AntiCheatValidator, AttackDescriptor, AttackMode, CombatEvent,
    CombatEventKind, CombatResolver, EntityId, LagCompensator, MovementConfig, MovementSystem,
    MovementVerdict, World, WorldBounds,
};
use meridian_wire::{
    EntityHandle, EventType, HandshakeRequest, HandshakeResponse, MigrationEnvelope,
    MigrationMessage, ProjectedState, ReliableEvent, ServerCorrection,
};

use crate::admission::{AdmissionControl, AdmissionFailure, DdosGuardConfig};
use crate::config::ZoneConfig;
use crate::net::{ConnectionId, DisconnectReason, InboundPacket, NetworkAdapter};
use crate::scheduler::TickScheduler;
use crate::session::{validate_and_apply_input, Session, SessionId, ValidationResult};
use crate::store::{PlayerRecord, StoreError, ZoneStore};
use crate::telemetry::{Event, Metrics, TickTimer};

/// Handshake protocol version this build speaks. Bumping the wire format
/// means bumping this too.
pub const PROTOCOL_VERSION: u32 = 1;

const MELEE_RANGE_M: f64 = 2.5;
const MELEE_BASE_DAMAGE: i32 = 20;
/// cos(45°): attacker's forward cone half-angle for auto-targeted melee.
const MELEE_COS_HALF_ANGLE: f64 = FRAC_1_SQRT_2;

/// A neighbour zone this zone exchanges migration/aura traffic with,
/// paired with the zone edge it sits across. Spec §6 doesn't say how a
/// `neighbor_zones` list maps to edges, so `Zone::new` cycles the four
/// canonical edges across the configured neighbours in declaration order
/// (documented in DESIGN.md).
fn edge_for_index(index: usize) -> Edge {
    match index % 4 {
        0 => Edge::MinX,
        1 => Edge::MaxX,
        2 => Edge::MinZ,
        _ => Edge::MaxZ,
    }
}

/// A read-only replica projected in from a neighbour zone via
/// `AURA_UPDATE`. Not stored in `World` (it never participates in
/// Movement/Combat) — kept alongside the zone purely for AOI visibility
/// and snapshot delivery to local observers.
#[derive(Debug, Clone, Copy)]
struct ShadowEntity {
    position: Vec3Fixed,
    entity_type: u8,
    health_percent: u8,
    last_update_tick: u32,
}

/// Everything about a remote-owned migrating entity the destination side
/// needs while it holds a shadow copy (Notifying/Migrating) and after
/// handoff, before it starts ticking the entity itself.
struct InboundMigration {
    handle: EntityHandle,
    epoch: u32,
}

/// The authoritative state of one zone: entity/component world, network
/// session table, and every per-connection protocol bookkeeping structure
/// (AOI tiering, snapshot baselines, anti-cheat, migration). `tick` drives
/// exactly the pipeline order spec §2 specifies.
pub struct Zone<N, S, M> {
    config: ZoneConfig,
    world: World,
    net: N,
    store: S,
    metrics: M,
    bus: Rc<RefCell<dyn CrossZoneBus>>,

    movement: MovementSystem,
    anticheat: AntiCheatValidator,
    lag: LagCompensator,
    combat: CombatResolver,
    aoi: AoiManager,
    snapshots: SnapshotBuilder,
    baselines: BaselineCache,
    admission: AdmissionControl,
    migration: MigrationStateMachine,
    aura: AuraProjector,
    destination_ledger: DestinationLedger,
    scheduler: TickScheduler,

    sessions: HashMap<ConnectionId, Session>,
    entity_to_connection: HashMap<EntityId, ConnectionId>,
    next_session_id: SessionId,
    neighbor_edges: Vec<NeighborEdge>,
    bounds: ZoneBounds,
    pending_inbound_migration: HashMap<EntityId, InboundMigration>,
    shadow_entities: HashMap<u32, ShadowEntity>,
    pending_melee: Vec<AttackDescriptor>,
    aura_channel_seq: u64,
    qos_degraded: bool,
    skip_far_slot: bool,
    last_player_save_ms: u64,
}

impl<N, S, M> Zone<N, S, M>
where
    N: NetworkAdapter,
    S: ZoneStore,
    M: Metrics,
{
    #[must_use]
    pub fn new(config: ZoneConfig, net: N, store: S, metrics: M, bus: Rc<RefCell<dyn CrossZoneBus>>) -> Self {
        let extent = Fixed::from_meters_f64(config.zone_extent_m);
        let world_bounds = WorldBounds {
            min: Vec3Fixed::ZERO,
            max: Vec3Fixed::new(extent, Fixed::from_meters_f64(200.0), extent),
        };
        let zone_bounds = ZoneBounds {
            min_x: Fixed::ZERO,
            max_x: extent,
            min_z: Fixed::ZERO,
            max_z: extent,
        };
        let neighbor_edges = config
            .neighbor_zones
            .iter()
            .enumerate()
            .map(|(index, &zone_id)| NeighborEdge {
                neighbor_zone_id: zone_id,
                edge: edge_for_index(index),
            })
            .collect();

        let cell_size = Fixed::from_meters_f64(config.spatial_cell_size_m);
        let world = World::new(config.zone_id, cell_size);

        let anticheat_config = AntiCheatConfig {
            max_teleport_distance: Fixed::from_meters_f64(config.max_teleport_distance_m),
            max_inputs_per_second: config.max_inputs_per_second,
            strike_threshold: config.suspicious_movement_threshold,
            ..AntiCheatConfig::standard(config.tick_rate_hz)
        };

        Self {
            movement: MovementSystem::new(MovementConfig::standard(config.tick_rate_hz, world_bounds)),
            anticheat: AntiCheatValidator::new(anticheat_config),
            lag: LagCompensator::new(config.tick_rate_hz, u32::try_from(config.max_rewind_ms).unwrap_or(u32::MAX)),
            combat: CombatResolver::new(),
            aoi: AoiManager::new(AoiConfig::standard(), config.tick_rate_hz),
            snapshots: SnapshotBuilder::new(),
            baselines: BaselineCache::new(),
            admission: AdmissionControl::new(DdosGuardConfig::standard(), PROTOCOL_VERSION, config.max_players),
            migration: MigrationStateMachine::standard(),
            aura: AuraProjector::new(Fixed::from_meters_f64(config.aura_buffer_m)),
            destination_ledger: DestinationLedger::new(),
            scheduler: TickScheduler::new(config.tick_budget_micros),
            sessions: HashMap::new(),
            entity_to_connection: HashMap::new(),
            next_session_id: 1,
            neighbor_edges,
            bounds: zone_bounds,
            pending_inbound_migration: HashMap::new(),
            shadow_entities: HashMap::new(),
            pending_melee: Vec::new(),
            aura_channel_seq: 0,
            qos_degraded: false,
            skip_far_slot: false,
            last_player_save_ms: 0,
            world,
            net,
            store,
            metrics,
            bus,
        }
    }

    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Mutable world access for test harnesses that need to force a state
    /// a real client can't reach through the wire protocol (e.g. a forged
    /// position) to exercise the anti-cheat path that guards against it.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    #[must_use]
    pub fn tick_number(&self) -> u32 {
        self.world.tick
    }

    /// Exposes the network adapter so a test harness (or a `main.rs` that
    /// needs to push inbound bytes before the first tick) can drive and
    /// inspect it. `Zone` never reads from this outside of `drain_inbound`.
    pub fn net(&self) -> &N {
        &self.net
    }

    pub fn net_mut(&mut self) -> &mut N {
        &mut self.net
    }

    /// Derives a pseudo source address from a connection id for
    /// `AdmissionControl`, which is specified against a real socket peer
    /// address. This workspace carries no concrete transport (§1
    /// Non-goals), so `NetworkAdapter` never hands us one — see
    /// DESIGN.md for the reasoning.
    fn pseudo_source(connection: ConnectionId) -> IpAddr {
        IpAddr::V4(Ipv4Addr::from(connection as u32))
    }

    /// Runs one full tick in spec §2's literal pipeline order: drain
    /// input → movement (+ anti-cheat) → combat (via lag compensation) →
    /// spatial hash rebuild → aura projection → migration → snapshots.
    /// `now_ms` is the caller-supplied wall clock (the tick thread never
    /// reads it itself, per §9).
    pub fn tick(&mut self, now_ms: u64) {
        let tick = self.world.tick;
        let mut elapsed = Duration::ZERO;
        {
            let _timer = TickTimer::start_capturing(tick, &self.metrics, &mut elapsed);

            self.drain_inbound(now_ms);
            self.movement.step(&mut self.world);
            self.reconcile_anticheat(now_ms);
            self.record_lag_compensation();
            self.resolve_melee_attacks(tick);
            self.world.rebuild_spatial_hash();
            self.project_aura();
            self.drive_migration(now_ms);
            self.save_due_players(now_ms);
            self.send_snapshots(tick);
        }

        let decision = self.scheduler.record_tick(tick, self.config.zone_id, elapsed, &self.metrics);
        if let Some(degraded) = decision.qos_degraded {
            self.qos_degraded = degraded;
        }
        self.skip_far_slot = decision.skip_far_slot;

        self.world.tick = self.world.tick.wrapping_add(1);
    }

    fn drain_inbound(&mut self, now_ms: u64) {
        let packets = self.net.drain_inputs();
        for packet in packets {
            self.handle_packet(packet, now_ms);
        }
    }

    fn handle_packet(&mut self, packet: InboundPacket, now_ms: u64) {
        if let Some(mut session) = self.sessions.get(&packet.connection).copied() {
            self.handle_client_input(&mut session, &packet);
            self.sessions.insert(packet.connection, session);
        } else {
            self.handle_handshake(packet, now_ms);
        }
    }

    fn handle_handshake(&mut self, packet: InboundPacket, now_ms: u64) {
        let Ok(request) = HandshakeRequest::decode(&packet.bytes) else {
            self.net.disconnect(packet.connection, DisconnectReason::ProtocolMismatch);
            return;
        };

        let source = Self::pseudo_source(packet.connection);
        let current_players = self.sessions.len();
        match self.admission.evaluate(source, now_ms, request.protocol_version, current_players) {
            Ok(()) => self.accept_connection(packet.connection, &request),
            Err(failure) => self.reject_connection(packet.connection, failure),
        }
    }

    fn accept_connection(&mut self, connection: ConnectionId, request: &HandshakeRequest) {
        let spawn_pos = Vec3Fixed::from_meters(
            self.config.zone_extent_m / 2.0,
            0.0,
            self.config.zone_extent_m / 2.0,
        );
        let bounding = BoundingVolume {
            radius: Fixed::from_meters_f64(0.5),
            height: Fixed::from_meters_f64(1.8),
        };
        let entity = self.world.spawn(EntityType::Player, spawn_pos, bounding);
        self.world.rotations.insert(entity, Rotation { yaw: 0.0, pitch: 0.0 });
        self.world.combat_states.insert(entity, CombatState::full_health(100, 0));
        self.world.network_states.insert(
            entity,
            NetworkState {
                connection_id: connection,
                last_acked_baseline_tick: 0,
                rtt_ms: 0,
                loss_permille: 0,
            },
        );
        let username = String::from_utf8_lossy(&request.username).into_owned();
        self.world.player_infos.insert(
            entity,
            PlayerInfo {
                player_id: connection,
                connection_id: connection,
                username,
            },
        );
        self.world.migration_states.insert(entity, MigrationState::default());

        match self.store.load_player(connection) {
            Ok(Some(record)) => self.apply_state_blob_to_existing(entity, &record.state_blob),
            Ok(None) => {}
            Err(StoreError::Unreachable(reason)) => {
                tracing::warn!(connection, reason, "player store unreachable on load, spawning fresh");
            }
        }

        let session_id = self.next_session_id;
        self.next_session_id += 1;
        let session = Session::new(session_id, connection, connection, entity);
        self.sessions.insert(connection, session);
        self.entity_to_connection.insert(entity, connection);

        let response = HandshakeResponse {
            accepted: true,
            server_tick: self.world.tick,
            your_entity_id: entity.0,
            spawn_pos: {
                let (x, y, z) = spawn_pos.to_meters_f64();
                [x as f32, y as f32, z as f32]
            },
            reason: bytes::Bytes::new(),
        };
        match response.encode() {
            Ok(bytes) => self.net.send_reliable(connection, bytes),
            Err(error) => tracing::error!(connection, %error, "failed to encode handshake accept response"),
        }
    }

    fn reject_connection(&mut self, connection: ConnectionId, failure: AdmissionFailure) {
        let reason = match failure {
            AdmissionFailure::ProtocolMismatch => "protocol mismatch",
            AdmissionFailure::Unauthenticated => "unauthenticated",
            AdmissionFailure::Banned => "banned",
            AdmissionFailure::ServerFull => "server full",
            AdmissionFailure::RateLimited => "rate limited",
        };
        let response = HandshakeResponse {
            accepted: false,
            server_tick: self.world.tick,
            your_entity_id: 0,
            spawn_pos: [0.0, 0.0, 0.0],
            reason: bytes::Bytes::from_static(reason.as_bytes()),
        };
        match response.encode() {
            Ok(bytes) => self.net.send_reliable(connection, bytes),
            Err(error) => tracing::error!(connection, %error, "failed to encode handshake reject response"),
        }
        let disconnect_reason = match failure {
            AdmissionFailure::ProtocolMismatch => DisconnectReason::ProtocolMismatch,
            AdmissionFailure::Unauthenticated => DisconnectReason::Unauthenticated,
            AdmissionFailure::Banned => DisconnectReason::Banned,
            AdmissionFailure::ServerFull => DisconnectReason::ServerFull,
            AdmissionFailure::RateLimited => DisconnectReason::ServerFull,
        };
        self.net.disconnect(connection, disconnect_reason);
    }

    fn handle_client_input(&mut self, session: &mut Session, packet: &InboundPacket) {
        let Ok(input) = meridian_wire::ClientInput::decode(&packet.bytes) else {
            return;
        };

        let verdict = validate_and_apply_input(
            session,
            &input,
            &mut self.world.input_states,
            &mut self.world.anticheat_states,
            &self.anticheat,
            packet.receive_tick,
        );

        match verdict {
            ValidationResult::Accepted => {
                if let Some(state) = self.world.input_states.get(session.controlled_entity) {
                    self.world.rotations.insert(
                        session.controlled_entity,
                        Rotation {
                            yaw: state.yaw,
                            pitch: state.pitch,
                        },
                    );
                }
                self.acknowledge_baseline(session.connection, input.ack_baseline_tick);
                if InputFlags(input.input_flags).contains(InputFlags::ATTACK) {
                    self.synthesize_melee_attack(session.controlled_entity, packet.receive_tick);
                }
            }
            ValidationResult::DroppedRateLimit { strikes_after } => {
                self.metrics.record_event(Event::RateLimited { connection: session.connection });
                self.metrics.record_event(Event::AntiCheatStrike {
                    connection: session.connection,
                    entity: session.controlled_entity,
                    strikes: strikes_after,
                });
            }
            ValidationResult::DroppedNanInf
            | ValidationResult::DroppedStaleSequence
            | ValidationResult::DroppedUnknownSession => {}
        }
    }

    fn acknowledge_baseline(&mut self, connection: ConnectionId, ack_baseline_tick: u32) {
        if ack_baseline_tick == 0 {
            return;
        }
        if !self.baselines.ack(connection, ack_baseline_tick) {
            self.baselines.reset(connection);
            self.metrics.record_event(Event::BaselineDowngrade {
                connection,
                acked_tick: ack_baseline_tick,
            });
        }
    }

    /// Pending melee attacks synthesized from `ATTACK`-flagged inputs this
    /// tick, resolved after movement integrates the attacker's position.
    fn resolve_melee_attacks(&mut self, now_tick: u32) {
        let pending = std::mem::take(&mut self.pending_melee);
        for descriptor in pending {
            match self.combat.resolve(&mut self.world, &self.lag, &descriptor, now_tick) {
                Ok(events) => self.dispatch_combat_events(&events),
                Err(_) => {}
            }
        }
    }

    fn synthesize_melee_attack(&mut self, attacker: EntityId, attack_tick: u32) {
        let Some(position) = self.world.positions.get(attacker) else {
            return;
        };
        let Some(rotation) = self.world.rotations.get(attacker) else {
            return;
        };
        self.pending_melee.push(AttackDescriptor {
            attacker,
            attack_tick,
            mode: AttackMode::Melee {
                attacker_pos: position.pos,
                attacker_yaw: rotation.yaw,
                range: Fixed::from_meters_f64(MELEE_RANGE_M),
                cone_half_angle_cos: MELEE_COS_HALF_ANGLE,
            },
            base_damage: MELEE_BASE_DAMAGE,
            allow_friendly_fire: false,
        });
    }

    fn dispatch_combat_events(&mut self, events: &[CombatEvent]) {
        for event in events {
            let event_type = match event.kind {
                CombatEventKind::Damage => EventType::Damage,
                CombatEventKind::Death => EventType::Death,
            };
            let reliable = ReliableEvent {
                event_type,
                timestamp_tick: event.tick,
                source_entity: event.source.0,
                target_entity: event.target.0,
                payload: bytes::Bytes::copy_from_slice(&event.amount.to_le_bytes()),
            };
            let bytes = match reliable.encode() {
                Ok(bytes) => bytes,
                Err(error) => {
                    tracing::error!(%error, "failed to encode combat event");
                    continue;
                }
            };
            for entity in [event.source, event.target] {
                if let Some(&connection) = self.entity_to_connection.get(&entity) {
                    self.net.send_reliable(connection, bytes.clone());
                }
            }
        }
    }

    fn record_lag_compensation(&mut self) {
        let tick = self.world.tick;
        let entries: Vec<(EntityId, Vec3Fixed, Fixed)> = self
            .world
            .positions
            .iter()
            .filter_map(|(id, position)| {
                self.world.bounding_volumes.get(id).map(|bounding| (id, position.pos, bounding.radius))
            })
            .collect();
        for (id, pos, radius) in entries {
            self.lag.record(id, tick, pos, radius);
        }
    }

    /// Post-movement anti-cheat safety net (§4.3): speed/teleport checks
    /// against each controlled entity's freshly-integrated position.
    fn reconcile_anticheat(&mut self, _now_ms: u64) {
        let tick = self.world.tick;
        let controlled: Vec<Session> = self.sessions.values().copied().collect();

        for session in controlled {
            let connection = session.connection;
            let entity = session.controlled_entity;
            let Some(position) = self.world.positions.get(entity).map(|p| p.pos) else {
                continue;
            };
            let sprinting = self
                .world
                .input_states
                .get(entity)
                .is_some_and(|input| input.flags.contains(InputFlags::SPRINT));
            let Some(anticheat) = self.world.anticheat_states.get_mut(entity) else {
                continue;
            };

            match self.anticheat.validate_movement(anticheat, position, tick, sprinting) {
                MovementVerdict::Accepted => {}
                MovementVerdict::SpeedViolation { strikes_after } => {
                    let snap_back = anticheat.last_valid_pos;
                    if let Some(pos_component) = self.world.positions.get_mut(entity) {
                        pos_component.pos = snap_back;
                    }
                    let velocity = self.world.velocities.get(entity).map(|v| v.v).unwrap_or(Vec3Fixed::ZERO);
                    let correction = ServerCorrection {
                        server_tick: tick,
                        last_processed_input_seq: session.last_accepted_seq,
                        position: (snap_back.x.raw(), snap_back.y.raw(), snap_back.z.raw()),
                        velocity: (velocity.x.raw(), velocity.y.raw(), velocity.z.raw()),
                    };
                    self.net.send_reliable(connection, correction.encode());
                    self.metrics.record_event(Event::AntiCheatStrike {
                        connection,
                        entity,
                        strikes: strikes_after,
                    });
                }
                MovementVerdict::Teleport => {
                    self.metrics.record_event(Event::AntiCheatKick { connection, entity });
                    self.net.disconnect(connection, DisconnectReason::AntiCheat);
                    self.disconnect_session(connection);
                }
                MovementVerdict::StrikeThresholdExceeded => {
                    self.metrics.record_event(Event::AntiCheatKick { connection, entity });
                    self.net.disconnect(connection, DisconnectReason::AntiCheat);
                    self.disconnect_session(connection);
                }
            }
        }
    }

    fn disconnect_session(&mut self, connection: ConnectionId) {
        if let Some(session) = self.sessions.remove(&connection) {
            self.entity_to_connection.remove(&session.controlled_entity);
            self.lag.forget(session.controlled_entity);
            self.world.despawn(session.controlled_entity);
        }
        self.baselines.remove_connection(connection);
        self.metrics.record_event(Event::ConnectionDisconnected {
            connection,
            reason: DisconnectReason::AntiCheat.as_str(),
        });
    }

    /// Persists every connected player's state once per `PlayerSaveIntervalMs`
    /// (§6), rather than on every tick — `ZoneStore` is a trait boundary
    /// only in this workspace (see `store.rs`), but the cadence is real.
    fn save_due_players(&mut self, now_ms: u64) {
        if now_ms.saturating_sub(self.last_player_save_ms) < self.config.player_save_interval_ms {
            return;
        }
        self.last_player_save_ms = now_ms;

        let players: Vec<(ConnectionId, EntityId)> = self
            .sessions
            .values()
            .map(|session| (session.connection, session.controlled_entity))
            .collect();
        for (connection, entity) in players {
            let record = PlayerRecord {
                player_id: connection,
                entity,
                state_blob: self.encode_full_state(entity),
            };
            if let Err(StoreError::Unreachable(reason)) = self.store.save_player(record) {
                tracing::warn!(connection, reason, "player store unreachable on save");
            }
        }
    }

    /// Restores a previously-saved state blob onto an already-spawned
    /// entity (the handshake-accept path), as opposed to
    /// [`Self::apply_full_state`] which spawns a fresh entity for an
    /// inbound migration.
    fn apply_state_blob_to_existing(&mut self, id: EntityId, bytes: &[u8]) {
        use byteorder::{LittleEndian, ReadBytesExt};
        let mut cursor = std::io::Cursor::new(bytes);
        let Ok(px) = cursor.read_i64::<LittleEndian>() else { return };
        let Ok(py) = cursor.read_i64::<LittleEndian>() else { return };
        let Ok(pz) = cursor.read_i64::<LittleEndian>() else { return };
        let Ok(vx) = cursor.read_i64::<LittleEndian>() else { return };
        let Ok(vy) = cursor.read_i64::<LittleEndian>() else { return };
        let Ok(vz) = cursor.read_i64::<LittleEndian>() else { return };
        let Ok(yaw) = cursor.read_f64::<LittleEndian>() else { return };
        let Ok(pitch) = cursor.read_f64::<LittleEndian>() else { return };
        let Ok(hp) = cursor.read_i32::<LittleEndian>() else { return };
        let Ok(max_hp) = cursor.read_i32::<LittleEndian>() else { return };
        let Ok(team) = cursor.read_u8() else { return };
        let Ok(_entity_type_byte) = cursor.read_u8() else { return };

        if let Some(position) = self.world.positions.get_mut(id) {
            position.pos = Vec3Fixed { x: Fixed::from_raw(px), y: Fixed::from_raw(py), z: Fixed::from_raw(pz) };
        }
        if let Some(velocity) = self.world.velocities.get_mut(id) {
            velocity.v = Vec3Fixed { x: Fixed::from_raw(vx), y: Fixed::from_raw(vy), z: Fixed::from_raw(vz) };
        }
        self.world.rotations.insert(id, Rotation { yaw, pitch });
        self.world.combat_states.insert(
            id,
            CombatState { hp, max_hp, team, last_attacker: None, last_attack_tick: 0, is_dead: hp <= 0 },
        );
    }

    // --- Migration --------------------------------------------------

    fn drive_migration(&mut self, now_ms: u64) {
        self.begin_outbound_migrations(now_ms);
        self.poll_migration_deadlines(now_ms);
        self.drain_migration_bus(now_ms);
    }

    fn begin_outbound_migrations(&mut self, now_ms: u64) {
        let candidates: Vec<(EntityId, Vec3Fixed)> = self
            .world
            .positions
            .iter()
            .filter(|(id, _)| {
                self.world
                    .migration_states
                    .get(*id)
                    .is_some_and(|state| state.phase == MigrationPhase::Normal)
            })
            .map(|(id, position)| (id, position.pos))
            .collect();

        for (id, pos) in candidates {
            let Some(neighbor) = self.crossing_neighbor(pos) else {
                continue;
            };
            let Some(state) = self.world.migration_states.get_mut(id) else {
                continue;
            };
            if !self.migration.can_begin(state, now_ms) {
                continue;
            }
            let Some(effect) = self.migration.begin(state, neighbor.neighbor_zone_id, now_ms) else {
                continue;
            };
            self.apply_migration_effect(id, effect);
        }
    }

    fn crossing_neighbor(&self, pos: Vec3Fixed) -> Option<&NeighborEdge> {
        self.neighbor_edges
            .iter()
            .find(|neighbor| self.bounds.distance_to_edge(neighbor.edge, pos) <= Fixed::ZERO)
    }

    fn poll_migration_deadlines(&mut self, now_ms: u64) {
        let ids: Vec<EntityId> = self
            .world
            .migration_states
            .iter()
            .filter(|(_, state)| state.phase != MigrationPhase::Normal)
            .map(|(id, _)| id)
            .collect();

        for id in ids {
            let Some(state) = self.world.migration_states.get_mut(id) else {
                continue;
            };
            if let Some(effect) = self.migration.poll_deadline(state, now_ms) {
                self.apply_migration_effect(id, effect);
            }
        }
    }

    fn apply_migration_effect(&mut self, id: EntityId, effect: MigrationEffect) {
        match effect {
            MigrationEffect::SendMigrateReq { peer_zone, epoch } => {
                let full_state = bytes::Bytes::from(self.encode_full_state(id));
                self.send_migration_message(
                    peer_zone,
                    MigrationMessage::MigrateReq {
                        handle: self.handle_of(id),
                        epoch,
                        full_state,
                    },
                );
            }
            MigrationEffect::SendMigrateState { epoch } => {
                let Some(state) = self.world.migration_states.get(id) else { return };
                let Some(peer_zone) = state.peer_zone else { return };
                let full_state = bytes::Bytes::from(self.encode_full_state(id));
                self.send_migration_message(
                    peer_zone,
                    MigrationMessage::MigrateState {
                        handle: self.handle_of(id),
                        epoch,
                        full_state,
                    },
                );
            }
            MigrationEffect::RollbackToNormal => {}
            MigrationEffect::StopSimulatingKeepShadow => {
                self.world.input_states.remove(id);
                if let Some(velocity) = self.world.velocities.get_mut(id) {
                    velocity.v = Vec3Fixed::ZERO;
                }
            }
            MigrationEffect::DropShadow => {
                self.lag.forget(id);
                self.world.despawn(id);
            }
        }
    }

    fn handle_of(&self, id: EntityId) -> EntityHandle {
        let generation = self.world.reference_of(id).map_or(0, |reference| reference.generation);
        EntityHandle { index: id.0, generation }
    }

    fn send_migration_message(&mut self, dest_zone_id: u32, message: MigrationMessage) {
        self.aura_channel_seq += 1;
        let envelope = MigrationEnvelope {
            source_zone_id: self.config.zone_id,
            channel_seq: self.aura_channel_seq,
            message,
        };
        if self.bus.borrow_mut().send(dest_zone_id, envelope).is_err() {
            self.metrics.record_event(Event::CrossZoneOverflow {
                source_zone_id: self.config.zone_id,
                dest_zone_id,
            });
        }
    }

    fn drain_migration_bus(&mut self, now_ms: u64) {
        let envelopes = self.bus.borrow_mut().drain(self.config.zone_id);
        for envelope in envelopes {
            self.handle_migration_envelope(envelope, now_ms);
        }
    }

    fn handle_migration_envelope(&mut self, envelope: MigrationEnvelope, now_ms: u64) {
        let source_zone_id = envelope.source_zone_id;
        match envelope.message {
            MigrationMessage::MigrateReq { handle, epoch, full_state: _ } => {
                self.pending_inbound_migration.insert(
                    EntityId(handle.index),
                    InboundMigration { handle, epoch },
                );
                self.send_migration_message(source_zone_id, MigrationMessage::MigrateAck { handle, epoch });
            }
            MigrationMessage::MigrateAck { handle, epoch } => {
                let id = EntityId(handle.index);
                if let Some(state) = self.world.migration_states.get_mut(id) {
                    if let Some(effect) = self.migration.on_peer_ack(state, epoch, now_ms) {
                        self.apply_migration_effect(id, effect);
                    }
                }
            }
            MigrationMessage::MigrateState { handle, epoch, full_state } => {
                if self.ledger_record_applied(handle, epoch) {
                    self.apply_full_state(handle, &full_state);
                }
                self.send_migration_message(source_zone_id, MigrationMessage::MigrateApplied { handle, epoch });
            }
            MigrationMessage::MigrateApplied { handle, epoch } => {
                let id = EntityId(handle.index);
                if let Some(state) = self.world.migration_states.get_mut(id) {
                    if let Some(effect) = self.migration.on_peer_applied(state, epoch, now_ms) {
                        self.apply_migration_effect(id, effect);
                    }
                }
            }
            MigrationMessage::AuraUpdate { projected, source_tick: _ } => {
                for state in projected {
                    self.shadow_entities.insert(
                        state.entity_id,
                        ShadowEntity {
                            position: Vec3Fixed {
                                x: Fixed::from_raw(state.position.0),
                                y: Fixed::from_raw(state.position.1),
                                z: Fixed::from_raw(state.position.2),
                            },
                            entity_type: state.entity_type,
                            health_percent: state.health_percent,
                            last_update_tick: self.world.tick,
                        },
                    );
                }
            }
        }
    }

    /// Idempotent-apply gate for an inbound `MIGRATE_STATE`; duplicates
    /// (same handle+epoch already applied) are discarded per §4.7's
    /// "MIGRATE_APPLIED must be idempotent" invariant.
    fn ledger_record_applied(&mut self, handle: EntityHandle, epoch: u32) -> bool {
        self.destination_ledger.record_applied(handle, epoch)
    }

    /// Minimal zone-local encoding of an entity's full state for
    /// migration handoff: not part of the wire crate, since no other
    /// consumer needs this byte layout — see DESIGN.md.
    fn encode_full_state(&self, id: EntityId) -> Vec<u8> {
        use byteorder::{LittleEndian, WriteBytesExt};
        let mut out = Vec::new();
        let pos = self.world.positions.get(id).map(|p| p.pos).unwrap_or(Vec3Fixed::ZERO);
        let vel = self.world.velocities.get(id).map(|v| v.v).unwrap_or(Vec3Fixed::ZERO);
        let rotation = self.world.rotations.get(id).copied().unwrap_or(Rotation { yaw: 0.0, pitch: 0.0 });
        let combat = self.world.combat_states.get(id).copied();
        let entity_type = self.world.entity_types.get(id).copied().unwrap_or(EntityType::Npc);

        let _ = out.write_i64::<LittleEndian>(pos.x.raw());
        let _ = out.write_i64::<LittleEndian>(pos.y.raw());
        let _ = out.write_i64::<LittleEndian>(pos.z.raw());
        let _ = out.write_i64::<LittleEndian>(vel.x.raw());
        let _ = out.write_i64::<LittleEndian>(vel.y.raw());
        let _ = out.write_i64::<LittleEndian>(vel.z.raw());
        let _ = out.write_f64::<LittleEndian>(rotation.yaw);
        let _ = out.write_f64::<LittleEndian>(rotation.pitch);
        let _ = out.write_i32::<LittleEndian>(combat.map_or(0, |c| c.hp));
        let _ = out.write_i32::<LittleEndian>(combat.map_or(0, |c| c.max_hp));
        let _ = out.write_u8(combat.map_or(0, |c| c.team));
        let _ = out.write_u8(entity_type_to_byte(entity_type));
        out
    }

    fn apply_full_state(&mut self, handle: EntityHandle, bytes: &[u8]) {
        use byteorder::{LittleEndian, ReadBytesExt};
        let mut cursor = std::io::Cursor::new(bytes);
        let Ok(px) = cursor.read_i64::<LittleEndian>() else { return };
        let Ok(py) = cursor.read_i64::<LittleEndian>() else { return };
        let Ok(pz) = cursor.read_i64::<LittleEndian>() else { return };
        let Ok(vx) = cursor.read_i64::<LittleEndian>() else { return };
        let Ok(vy) = cursor.read_i64::<LittleEndian>() else { return };
        let Ok(vz) = cursor.read_i64::<LittleEndian>() else { return };
        let Ok(yaw) = cursor.read_f64::<LittleEndian>() else { return };
        let Ok(pitch) = cursor.read_f64::<LittleEndian>() else { return };
        let Ok(hp) = cursor.read_i32::<LittleEndian>() else { return };
        let Ok(max_hp) = cursor.read_i32::<LittleEndian>() else { return };
        let Ok(team) = cursor.read_u8() else { return };
        let Ok(entity_type_byte) = cursor.read_u8() else { return };

        let position = Vec3Fixed { x: Fixed::from_raw(px), y: Fixed::from_raw(py), z: Fixed::from_raw(pz) };
        let bounding = BoundingVolume {
            radius: Fixed::from_meters_f64(0.5),
            height: Fixed::from_meters_f64(1.8),
        };
        let entity_type = entity_type_from_byte(entity_type_byte);
        let id = self.world.spawn(entity_type, position, bounding);
        if let Some(velocity) = self.world.velocities.get_mut(id) {
            velocity.v = Vec3Fixed { x: Fixed::from_raw(vx), y: Fixed::from_raw(vy), z: Fixed::from_raw(vz) };
        }
        self.world.rotations.insert(id, Rotation { yaw, pitch });
        self.world.combat_states.insert(
            id,
            CombatState {
                hp,
                max_hp,
                team,
                last_attacker: None,
                last_attack_tick: 0,
                is_dead: hp <= 0,
            },
        );
        self.world.migration_states.insert(id, MigrationState::default());
        self.pending_inbound_migration.insert(id, InboundMigration { handle, epoch: 0 });
    }

    // --- Aura ---------------------------------------------------------

    fn project_aura(&mut self) {
        let neighbors = self.neighbor_edges.clone();
        for neighbor in &neighbors {
            let projected: Vec<ProjectedState> = self.aura.project_for_neighbor(&self.world, &self.bounds, neighbor);
            if projected.is_empty() {
                continue;
            }
            self.send_migration_message(
                neighbor.neighbor_zone_id,
                MigrationMessage::AuraUpdate {
                    projected,
                    source_tick: self.world.tick,
                },
            );
        }
    }

    // --- Snapshots ------------------------------------------------------

    fn send_snapshots(&mut self, tick: u32) {
        self.aoi.set_degraded(self.qos_degraded);
        let sessions: Vec<Session> = self.sessions.values().copied().collect();
        for session in sessions {
            let Some(position) = self.world.positions.get(session.controlled_entity).map(|p| p.pos) else {
                continue;
            };
            let visible = self.visible_entities_for(session.controlled_entity, position, tick);

            let baseline_tick = self.baselines.baseline_tick(session.connection);
            let baseline = self.baselines.baseline_records(session.connection).cloned();
            let (snapshot, records) = self.snapshots.build(
                &self.world,
                &visible,
                baseline.as_ref(),
                tick,
                baseline_tick,
            );
            self.baselines.record_sent(session.connection, tick, records);
            match snapshot.encode() {
                Ok(bytes) => self.net.send_unreliable(session.connection, bytes),
                Err(error) => tracing::error!(connection = session.connection, %error, "failed to encode snapshot"),
            }
        }
    }

    fn visible_entities_for(&self, subject: EntityId, subject_pos: Vec3Fixed, tick: u32) -> Vec<EntityId> {
        let tiered = self.aoi.visible_from(&self.world, subject, subject_pos);
        let mut out = vec![subject];
        for (id, tier) in tiered {
            if tier == AoiTier::Far && self.skip_far_slot {
                continue;
            }
            if self.aoi.is_due(tier, tick) || tier == AoiTier::Near {
                out.push(id);
            }
        }
        out
    }
}

fn entity_type_to_byte(entity_type: EntityType) -> u8 {
    match entity_type {
        EntityType::Player => 0,
        EntityType::Npc => 1,
        EntityType::Projectile => 2,
        EntityType::Projected => 3,
    }
}

fn entity_type_from_byte(byte: u8) -> EntityType {
    match byte {
        0 => EntityType::Player,
        2 => EntityType::Projectile,
        3 => EntityType::Projected,
        _ => EntityType::Npc,
    }
}
