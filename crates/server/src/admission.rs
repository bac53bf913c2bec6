//! Connection admission: the DDoS guard (token bucket per source address)
//! and handshake protocol-version check named in §4.10, gating whether a
//! new connection is ever handed a [`crate::session::Session`].

use std::collections::HashMap;
use std::net::IpAddr;

/// Why admission was refused, mirroring §4.10's failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionFailure {
    ProtocolMismatch,
    Unauthenticated,
    Banned,
    ServerFull,
    RateLimited,
}

#[derive(Debug, Clone, Copy)]
pub struct DdosGuardConfig {
    /// Tokens refilled per second per source address.
    pub refill_per_sec: f64,
    /// Maximum tokens a bucket can hold (burst allowance).
    pub burst_capacity: f64,
    /// Tokens a single handshake attempt consumes.
    pub cost_per_attempt: f64,
}

impl DdosGuardConfig {
    #[must_use]
    pub fn standard() -> Self {
        Self {
            refill_per_sec: 5.0,
            burst_capacity: 10.0,
            cost_per_attempt: 1.0,
        }
    }
}

struct Bucket {
    tokens: f64,
    last_refill: u64,
}

/// Per-source-address token bucket. `now_ms` is supplied by the caller
/// (the I/O thread owns the wall clock; this type stays clock-agnostic so
/// tests can drive it deterministically) rather than read internally.
pub struct DdosGuard {
    config: DdosGuardConfig,
    buckets: HashMap<IpAddr, Bucket>,
}

impl DdosGuard {
    #[must_use]
    pub fn new(config: DdosGuardConfig) -> Self {
        Self {
            config,
            buckets: HashMap::new(),
        }
    }

    /// Attempt to admit one handshake from `source` at `now_ms`. Returns
    /// `true` if the bucket had enough tokens (and debits them), `false`
    /// if the source must be refused with [`AdmissionFailure::RateLimited`].
    pub fn try_admit(&mut self, source: IpAddr, now_ms: u64) -> bool {
        let bucket = self.buckets.entry(source).or_insert_with(|| Bucket {
            tokens: self.config.burst_capacity,
            last_refill: now_ms,
        });

        let elapsed_ms = now_ms.saturating_sub(bucket.last_refill);
        if elapsed_ms > 0 {
            let refill = (elapsed_ms as f64 / 1000.0) * self.config.refill_per_sec;
            bucket.tokens = (bucket.tokens + refill).min(self.config.burst_capacity);
            bucket.last_refill = now_ms;
        }

        if bucket.tokens >= self.config.cost_per_attempt {
            bucket.tokens -= self.config.cost_per_attempt;
            true
        } else {
            false
        }
    }
}

/// Gate applied to every new connection before a [`crate::session::Session`]
/// is created: DDoS guard, then protocol version, then ban list, then
/// capacity. Order matches §4.10 ("accepted only if DDoS guard permits and
/// handshake protocol version matches").
pub struct AdmissionControl {
    guard: DdosGuard,
    banned: std::collections::HashSet<IpAddr>,
    expected_protocol_version: u32,
    max_players: usize,
}

impl AdmissionControl {
    #[must_use]
    pub fn new(guard_config: DdosGuardConfig, expected_protocol_version: u32, max_players: usize) -> Self {
        Self {
            guard: DdosGuard::new(guard_config),
            banned: std::collections::HashSet::new(),
            expected_protocol_version,
            max_players,
        }
    }

    pub fn ban(&mut self, source: IpAddr) {
        self.banned.insert(source);
    }

    pub fn evaluate(
        &mut self,
        source: IpAddr,
        now_ms: u64,
        protocol_version: u32,
        current_player_count: usize,
    ) -> Result<(), AdmissionFailure> {
        if self.banned.contains(&source) {
            return Err(AdmissionFailure::Banned);
        }
        if !self.guard.try_admit(source, now_ms) {
            return Err(AdmissionFailure::RateLimited);
        }
        if protocol_version != self.expected_protocol_version {
            return Err(AdmissionFailure::ProtocolMismatch);
        }
        if current_player_count >= self.max_players {
            return Err(AdmissionFailure::ServerFull);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> IpAddr {
        "127.0.0.1".parse().unwrap()
    }

    #[test]
    fn bucket_admits_up_to_burst_capacity_then_refuses() {
        let mut guard = DdosGuard::new(DdosGuardConfig {
            refill_per_sec: 1.0,
            burst_capacity: 3.0,
            cost_per_attempt: 1.0,
        });
        assert!(guard.try_admit(source(), 0));
        assert!(guard.try_admit(source(), 0));
        assert!(guard.try_admit(source(), 0));
        assert!(!guard.try_admit(source(), 0));
    }

    #[test]
    fn bucket_refills_over_time() {
        let mut guard = DdosGuard::new(DdosGuardConfig {
            refill_per_sec: 10.0,
            burst_capacity: 1.0,
            cost_per_attempt: 1.0,
        });
        assert!(guard.try_admit(source(), 0));
        assert!(!guard.try_admit(source(), 0));
        // 500ms later, ~5 tokens would refill but capped at burst=1.
        assert!(guard.try_admit(source(), 500));
    }

    #[test]
    fn admission_checks_ban_before_protocol_version() {
        let mut control = AdmissionControl::new(DdosGuardConfig::standard(), 1, 400);
        control.ban(source());
        assert_eq!(
            control.evaluate(source(), 0, 99, 0),
            Err(AdmissionFailure::Banned)
        );
    }

    #[test]
    fn admission_rejects_protocol_mismatch_after_guard_passes() {
        let mut control = AdmissionControl::new(DdosGuardConfig::standard(), 1, 400);
        assert_eq!(
            control.evaluate(source(), 0, 2, 0),
            Err(AdmissionFailure::ProtocolMismatch)
        );
    }

    #[test]
    fn admission_rejects_when_zone_full() {
        let mut control = AdmissionControl::new(DdosGuardConfig::standard(), 1, 1);
        assert_eq!(
            control.evaluate(source(), 0, 1, 1),
            Err(AdmissionFailure::ServerFull)
        );
    }

    #[test]
    fn admission_accepts_when_all_checks_pass() {
        let mut control = AdmissionControl::new(DdosGuardConfig::standard(), 1, 400);
        assert_eq!(control.evaluate(source(), 0, 1, 0), Ok(()));
    }
}
