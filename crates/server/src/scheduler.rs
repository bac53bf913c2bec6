//! Fixed 60 Hz tick cadence, budget enforcement, and QoS degradation
//! (§4.11). Owns no simulation state — it only tracks consecutive
//! overrun/in-budget streaks and reports what the zone should do about
//! them. Physics ticks are never skipped; only send cadence degrades.

use std::time::Duration;

use crate::telemetry::{Event, Metrics};

/// Ticks of sustained overrun before entering degraded QoS.
const DEGRADE_AFTER_CONSECUTIVE_OVERRUNS: u32 = 10;
/// Ticks of sustained in-budget performance before restoring full QoS.
const RESTORE_AFTER_CONSECUTIVE_IN_BUDGET: u32 = 60;
/// A single tick beyond this duration is a "severe" overrun (§4.11: "If
/// duration > 20 ms, emit a severe-overrun event and skip one AOI-Far
/// scheduler slot").
const SEVERE_OVERRUN: Duration = Duration::from_millis(20);

/// What the zone must do in response to this tick's measured duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerDecision {
    /// Whether `AoiManager::set_degraded` should now read `true`/`false`,
    /// if this tick changed it (`None` if unchanged).
    pub qos_degraded: Option<bool>,
    /// Skip the next scheduled AOI-Far send slot to catch up.
    pub skip_far_slot: bool,
}

/// Fixed-cadence scheduler. `budget_micros` is `TickBudgetMicros` (16,666
/// at 60 Hz); never derived from measurements, only compared against them.
pub struct TickScheduler {
    budget: Duration,
    consecutive_overruns: u32,
    consecutive_in_budget: u32,
    degraded: bool,
}

impl TickScheduler {
    #[must_use]
    pub fn new(budget_micros: u64) -> Self {
        Self {
            budget: Duration::from_micros(budget_micros),
            consecutive_overruns: 0,
            consecutive_in_budget: 0,
            degraded: false,
        }
    }

    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Feed this tick's measured wall-clock duration and get back what the
    /// zone should do about it. Call exactly once per tick, after the
    /// pipeline has finished running.
    pub fn record_tick<M: Metrics>(&mut self, tick: u32, zone_id: u32, elapsed: Duration, metrics: &M) -> SchedulerDecision {
        let mut decision = SchedulerDecision {
            qos_degraded: None,
            skip_far_slot: false,
        };

        if elapsed > self.budget {
            self.consecutive_overruns += 1;
            self.consecutive_in_budget = 0;
            metrics.record_event(Event::TickOverrun {
                tick,
                actual_micros: u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX),
                budget_micros: u64::try_from(self.budget.as_micros()).unwrap_or(u64::MAX),
            });

            if !self.degraded && self.consecutive_overruns >= DEGRADE_AFTER_CONSECUTIVE_OVERRUNS {
                self.degraded = true;
                decision.qos_degraded = Some(true);
                metrics.record_event(Event::QosDegraded { zone_id, tick });
            }
        } else {
            self.consecutive_overruns = 0;
            self.consecutive_in_budget += 1;

            if self.degraded && self.consecutive_in_budget >= RESTORE_AFTER_CONSECUTIVE_IN_BUDGET {
                self.degraded = false;
                decision.qos_degraded = Some(false);
                metrics.record_event(Event::QosRestored { zone_id, tick });
            }
        }

        if elapsed > SEVERE_OVERRUN {
            decision.skip_far_slot = true;
        }

        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::LoggingMetrics;

    #[test]
    fn ten_consecutive_overruns_trigger_degradation() {
        let mut scheduler = TickScheduler::new(16_666);
        let metrics = LoggingMetrics;
        let mut last_decision = SchedulerDecision {
            qos_degraded: None,
            skip_far_slot: false,
        };
        for tick in 0..10 {
            last_decision = scheduler.record_tick(tick, 1, Duration::from_millis(17), &metrics);
        }
        assert_eq!(last_decision.qos_degraded, Some(true));
        assert!(scheduler.is_degraded());
    }

    #[test]
    fn sixty_consecutive_in_budget_ticks_restore_qos() {
        let mut scheduler = TickScheduler::new(16_666);
        let metrics = LoggingMetrics;
        for tick in 0..10 {
            scheduler.record_tick(tick, 1, Duration::from_millis(17), &metrics);
        }
        assert!(scheduler.is_degraded());

        let mut restored = false;
        for tick in 10..70 {
            let decision = scheduler.record_tick(tick, 1, Duration::from_micros(1000), &metrics);
            if decision.qos_degraded == Some(false) {
                restored = true;
            }
        }
        assert!(restored);
        assert!(!scheduler.is_degraded());
    }

    #[test]
    fn severe_overrun_requests_far_slot_skip() {
        let mut scheduler = TickScheduler::new(16_666);
        let metrics = LoggingMetrics;
        let decision = scheduler.record_tick(0, 1, Duration::from_millis(25), &metrics);
        assert!(decision.skip_far_slot);
    }

    #[test]
    fn in_budget_tick_resets_overrun_streak() {
        let mut scheduler = TickScheduler::new(16_666);
        let metrics = LoggingMetrics;
        for tick in 0..5 {
            scheduler.record_tick(tick, 1, Duration::from_millis(17), &metrics);
        }
        scheduler.record_tick(5, 1, Duration::from_micros(1000), &metrics);
        assert_eq!(scheduler.consecutive_overruns, 0);
    }
}
