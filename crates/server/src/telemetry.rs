//! Observability: the `TickTimer` RAII scoped-timing guard (§9 "RAII
//! scoped tracing") and a typed [`Event`] enum standing in for the ad hoc
//! "logged as an observability event" language scattered through spec
//! §4.3/§7. The `Metrics` trait is the seam a real exporter (Prometheus,
//! statsd, whatever) plugs into; this workspace ships only a log-only
//! implementation, per §1's Non-goal on the metrics exporter.

use std::time::{Duration, Instant};

use meridian_sim::EntityId;

use crate::net::ConnectionId;

/// A structured observability event. Every AntiCheat strike/kick decision
/// and every scheduler/migration/cross-zone anomaly is logged through one
/// of these variants rather than an ad hoc format string, per §9's
/// "polymorphism over messages: tagged variants."
#[derive(Debug, Clone)]
pub enum Event {
    AntiCheatStrike {
        connection: ConnectionId,
        entity: EntityId,
        strikes: u32,
    },
    AntiCheatKick {
        connection: ConnectionId,
        entity: EntityId,
    },
    RateLimited {
        connection: ConnectionId,
    },
    BaselineDowngrade {
        connection: ConnectionId,
        acked_tick: u32,
    },
    TickOverrun {
        tick: u32,
        actual_micros: u64,
        budget_micros: u64,
    },
    QosDegraded {
        zone_id: u32,
        tick: u32,
    },
    QosRestored {
        zone_id: u32,
        tick: u32,
    },
    MigrationTimeout {
        entity: EntityId,
        peer_zone: u32,
        attempt: u32,
    },
    CrossZoneOverflow {
        source_zone_id: u32,
        dest_zone_id: u32,
    },
    ConnectionDisconnected {
        connection: ConnectionId,
        reason: &'static str,
    },
}

/// Sink for [`Event`]s and tick-timing samples. A trait boundary so a real
/// deployment can swap in a Prometheus/statsd exporter without touching
/// zone logic; see §10.5.
pub trait Metrics {
    fn record_event(&self, event: Event);
    fn record_tick_micros(&self, tick: u32, micros: u64);
}

/// Log-only implementation: every event and tick sample becomes one
/// structured `tracing` record. Sufficient for the included binary and
/// for tests asserting on emitted events is not needed — tests assert on
/// `Zone` state directly instead, the way the teacher's own tests do.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingMetrics;

impl Metrics for LoggingMetrics {
    fn record_event(&self, event: Event) {
        match event {
            Event::AntiCheatStrike { connection, entity, strikes } => {
                tracing::warn!(connection, %entity, strikes, "anti-cheat strike recorded");
            }
            Event::AntiCheatKick { connection, entity } => {
                tracing::warn!(connection, %entity, "anti-cheat threshold exceeded, kicking connection");
            }
            Event::RateLimited { connection } => {
                tracing::debug!(connection, "input dropped: rate limit exceeded");
            }
            Event::BaselineDowngrade { connection, acked_tick } => {
                tracing::info!(connection, acked_tick, "baseline mismatch, downgrading next snapshot to full state");
            }
            Event::TickOverrun { tick, actual_micros, budget_micros } => {
                tracing::warn!(tick, actual_micros, budget_micros, "tick overran its budget");
            }
            Event::QosDegraded { zone_id, tick } => {
                tracing::warn!(zone_id, tick, "entering degraded QoS: Mid/Far snapshot rate halved");
            }
            Event::QosRestored { zone_id, tick } => {
                tracing::info!(zone_id, tick, "restored to full QoS");
            }
            Event::MigrationTimeout { entity, peer_zone, attempt } => {
                tracing::warn!(%entity, peer_zone, attempt, "migration attempt timed out, rolled back to Normal");
            }
            Event::CrossZoneOverflow { source_zone_id, dest_zone_id } => {
                tracing::error!(source_zone_id, dest_zone_id, "cross-zone channel overflowed, non-migration traffic suppressed");
            }
            Event::ConnectionDisconnected { connection, reason } => {
                tracing::info!(connection, reason, "connection disconnected");
            }
        }
    }

    fn record_tick_micros(&self, tick: u32, micros: u64) {
        tracing::trace!(tick, micros, "tick completed");
    }
}

/// RAII scoped-timing guard: starts a clock on construction, and on drop
/// reports the elapsed wall-clock duration to a [`Metrics`] sink. This is
/// the measurement `TickScheduler` consumes for §4.11 budget enforcement.
pub struct TickTimer<'a, M: Metrics> {
    tick: u32,
    started: Instant,
    metrics: &'a M,
    elapsed: Option<&'a mut Duration>,
}

impl<'a, M: Metrics> TickTimer<'a, M> {
    #[must_use]
    pub fn start(tick: u32, metrics: &'a M) -> Self {
        Self {
            tick,
            started: Instant::now(),
            metrics,
            elapsed: None,
        }
    }

    /// Like [`Self::start`], but also writes the elapsed duration into
    /// `out` on drop, so the scheduler can read it back for budget
    /// enforcement without a second clock read.
    #[must_use]
    pub fn start_capturing(tick: u32, metrics: &'a M, out: &'a mut Duration) -> Self {
        Self {
            tick,
            started: Instant::now(),
            metrics,
            elapsed: Some(out),
        }
    }
}

impl<M: Metrics> Drop for TickTimer<'_, M> {
    fn drop(&mut self) {
        let elapsed = self.started.elapsed();
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.metrics.record_tick_micros(self.tick, micros);
        if let Some(out) = self.elapsed.as_deref_mut() {
            *out = elapsed;
        }
    }
}
