//! Zone orchestration: wires `meridian-sim`, `meridian-replication`, and
//! `meridian-migration` together behind one authoritative per-tick loop,
//! plus the connection, admission, and persistence boundaries that loop
//! needs. See `zone.rs` for the tick pipeline itself.

pub mod admission;
pub mod config;
pub mod error;
pub mod net;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod telemetry;
pub mod zone;

pub use admission::{AdmissionControl, AdmissionFailure, DdosGuard, DdosGuardConfig};
pub use config::{Cli, ZoneConfig};
pub use error::ZoneError;
pub use net::{ConnectionId, DisconnectReason, InboundPacket, LoopbackAdapter, NetworkAdapter};
pub use scheduler::{SchedulerDecision, TickScheduler};
pub use session::{Session, SessionId, ValidationResult};
pub use store::{NullStore, PlayerRecord, StoreError, ZoneStore};
pub use telemetry::{Event, LoggingMetrics, Metrics, TickTimer};
pub use zone::{Zone, PROTOCOL_VERSION};
