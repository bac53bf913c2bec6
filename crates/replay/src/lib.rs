//! Deterministic replay recording and offline verification for a zone's
//! tick history.
//!
//! `ReplayRecorder` accumulates spawn events, the initial state digest,
//! and every applied input as a zone runs live. `ReplayArtifact` is the
//! resulting record, serializable with `prost` the same way
//! `meridian-wire`'s message types are. `verify_replay` re-simulates an
//! artifact from its recorded spawn state and checks the result against
//! the digests recorded live, so a dispute over what happened in a match
//! can be settled by re-running it rather than trusting a log line.

pub mod artifact;
pub mod config;
pub mod recorder;
pub mod verify;

pub use artifact::{AppliedInputProto, BuildFingerprintProto, EntitySpawnProto, ReplayArtifact, REPLAY_FORMAT_VERSION};
pub use config::ReplayConfig;
pub use recorder::{AppliedInput, BuildFingerprintData, EntitySpawn, ReplayRecorder};
pub use verify::{verify_replay, VerifyError, VerifyOptions};
