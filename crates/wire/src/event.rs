//! `ReliableEvent`: opaque-payload notifications delivered on the
//! reliable channel — combat outcomes, anti-cheat/migration initiated
//! disconnects. The payload itself is not interpreted by this crate;
//! callers encode/decode it per `event_type` (e.g. a `CombatEvent` for
//! `Damage`/`Death`).

use std::io::Cursor;

use bytes::Bytes;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{WireError, WireResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Damage,
    Death,
    /// Connection is being closed; payload is a UTF-8 reason string.
    Disconnect,
    /// Entity handed off to a peer zone; payload is empty.
    MigrationHandoff,
}

impl EventType {
    #[must_use]
    pub fn to_byte(self) -> u8 {
        match self {
            Self::Damage => 0,
            Self::Death => 1,
            Self::Disconnect => 2,
            Self::MigrationHandoff => 3,
        }
    }

    pub fn from_byte(byte: u8) -> WireResult<Self> {
        match byte {
            0 => Ok(Self::Damage),
            1 => Ok(Self::Death),
            2 => Ok(Self::Disconnect),
            3 => Ok(Self::MigrationHandoff),
            other => Err(WireError::InvalidEventType(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReliableEvent {
    pub event_type: EventType,
    pub timestamp_tick: u32,
    pub source_entity: u32,
    pub target_entity: u32,
    pub payload: Bytes,
}

impl ReliableEvent {
    pub fn encode(&self) -> WireResult<Vec<u8>> {
        let payload_len = u16::try_from(self.payload.len())
            .map_err(|_| WireError::PayloadLengthMismatch {
                declared: self.payload.len(),
                remaining: u16::MAX as usize,
            })?;

        let mut out = Vec::with_capacity(1 + 4 + 4 + 4 + 2 + self.payload.len());
        out.push(self.event_type.to_byte());
        out.write_u32::<LittleEndian>(self.timestamp_tick).unwrap();
        out.write_u32::<LittleEndian>(self.source_entity).unwrap();
        out.write_u32::<LittleEndian>(self.target_entity).unwrap();
        out.write_u16::<LittleEndian>(payload_len).unwrap();
        out.extend_from_slice(&self.payload);
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> WireResult<Self> {
        let mut cursor = Cursor::new(bytes);
        let event_type = EventType::from_byte(
            cursor.read_u8().map_err(|_| WireError::Truncated { needed: 1 })?,
        )?;
        let timestamp_tick = cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| WireError::Truncated { needed: 4 })?;
        let source_entity = cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| WireError::Truncated { needed: 4 })?;
        let target_entity = cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| WireError::Truncated { needed: 4 })?;
        let payload_len = cursor
            .read_u16::<LittleEndian>()
            .map_err(|_| WireError::Truncated { needed: 2 })? as usize;

        let start = cursor.position() as usize;
        let remaining = bytes.len().saturating_sub(start);
        if payload_len > remaining {
            return Err(WireError::PayloadLengthMismatch {
                declared: payload_len,
                remaining,
            });
        }
        let payload = Bytes::copy_from_slice(&bytes[start..start + payload_len]);

        let consumed = start + payload_len;
        if consumed != bytes.len() {
            return Err(WireError::TrailingBytes(bytes.len() - consumed));
        }

        Ok(Self {
            event_type,
            timestamp_tick,
            source_entity,
            target_entity,
            payload,
        })
    }
}
