//! Decode-time failures. Every variant here is a reason to drop the frame
//! and treat the sender as malformed — `meridian-server` maps this onto
//! its own `Malformed` error kind rather than ever panicking on bad bytes.

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum WireError {
    #[error("frame truncated: need {needed} more byte(s)")]
    Truncated { needed: usize },
    #[error("{0} trailing byte(s) after a complete frame")]
    TrailingBytes(usize),
    #[error("unknown changed-field bit(s) {0:#06x}")]
    UnknownChangedBit(u16),
    #[error("invalid position-delta width tag {0}")]
    InvalidDeltaTag(u8),
    #[error("invalid event type byte {0}")]
    InvalidEventType(u8),
    #[error("invalid entity type byte {0}")]
    InvalidEntityType(u8),
    #[error("declared payload length {declared} exceeds remaining buffer ({remaining})")]
    PayloadLengthMismatch { declared: usize, remaining: usize },
    #[error("string field is not valid UTF-8")]
    InvalidUtf8,
    #[error("{0} entities exceeds the u16 entity-count field")]
    TooManyEntities(usize),
    #[error("{0} removed entities exceeds the u16 removed-count field")]
    TooManyRemoved(usize),
}

pub type WireResult<T> = Result<T, WireError>;
