//! Binary wire framing for the zone server's external interfaces.
//!
//! Every message type here has a hand-specified byte layout — little
//! endian throughout, length-prefixed where a field is variable-size —
//! rather than a general-purpose serialization format, because the
//! `Snapshot` path runs at up to 60 Hz per connection and its `Position`
//! field needs a narrower encoding than any TLV scheme gives for free.
//! Framing (the length prefix around a whole message) is the caller's
//! job; this crate only encodes/decodes one message body at a time.

pub mod client_input;
pub mod correction;
pub mod error;
pub mod event;
pub mod handshake;
pub mod migration;
pub mod snapshot;
mod varint;

pub use client_input::{ClientInput, CLIENT_INPUT_WIRE_LEN};
pub use correction::ServerCorrection;
pub use error::{WireError, WireResult};
pub use event::{EventType, ReliableEvent};
pub use handshake::{HandshakeRequest, HandshakeResponse};
pub use migration::{EntityHandle, MigrationEnvelope, MigrationMessage, ProjectedState};
pub use snapshot::{changed_bit, EntityDelta, Snapshot};
pub use varint::{decode_position_delta, decode_rotation, encode_position_delta, encode_rotation};
