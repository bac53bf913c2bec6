//! Inter-zone messages carried over the `CrossZoneBus`: migration
//! handoff and aura (shadow entity) projection. Every envelope carries
//! the sending zone id and a monotonic per-channel sequence number, the
//! pair a receiver uses for duplicate suppression.

use std::io::Cursor;

use bytes::Bytes;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{WireError, WireResult};

/// A migrating entity's weak reference, carried across zones instead of
/// a raw index so a stale duplicate can never resurrect a freed slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityHandle {
    pub index: u32,
    pub generation: u32,
}

/// A single entity's compact state as projected into a neighbouring
/// zone's aura shadow, or as carried in a migration's full-state payload
/// index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectedState {
    pub entity_id: u32,
    pub position: (i64, i64, i64),
    pub entity_type: u8,
    pub health_percent: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MigrationMessage {
    /// Source zone asks the destination to accept a crossing entity.
    /// `full_state` is an opaque, `meridian-migration`-encoded component
    /// snapshot — this crate never interprets it.
    MigrateReq { handle: EntityHandle, epoch: u32, full_state: Bytes },
    /// Destination confirms it will accept the handoff.
    MigrateAck { handle: EntityHandle, epoch: u32 },
    /// Source hands over the authoritative state once acked.
    MigrateState { handle: EntityHandle, epoch: u32, full_state: Bytes },
    /// Destination confirms the state was applied; idempotent on the
    /// source side, keyed by `(handle, epoch)`.
    MigrateApplied { handle: EntityHandle, epoch: u32 },
    /// Batched shadow-entity projection for the aura buffer.
    AuraUpdate { projected: Vec<ProjectedState>, source_tick: u32 },
}

impl MigrationMessage {
    fn tag(&self) -> u8 {
        match self {
            Self::MigrateReq { .. } => 0,
            Self::MigrateAck { .. } => 1,
            Self::MigrateState { .. } => 2,
            Self::MigrateApplied { .. } => 3,
            Self::AuraUpdate { .. } => 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MigrationEnvelope {
    pub source_zone_id: u32,
    pub channel_seq: u64,
    pub message: MigrationMessage,
}

fn write_handle(handle: EntityHandle, out: &mut Vec<u8>) {
    out.write_u32::<LittleEndian>(handle.index).unwrap();
    out.write_u32::<LittleEndian>(handle.generation).unwrap();
}

fn read_handle(cursor: &mut Cursor<&[u8]>) -> WireResult<EntityHandle> {
    Ok(EntityHandle {
        index: read_u32(cursor)?,
        generation: read_u32(cursor)?,
    })
}

fn write_full_state(full_state: &Bytes, out: &mut Vec<u8>) -> WireResult<()> {
    let len = u32::try_from(full_state.len())
        .map_err(|_| WireError::PayloadLengthMismatch { declared: full_state.len(), remaining: u32::MAX as usize })?;
    out.write_u32::<LittleEndian>(len).unwrap();
    out.extend_from_slice(full_state);
    Ok(())
}

fn read_full_state(cursor: &mut Cursor<&[u8]>, bytes: &[u8]) -> WireResult<Bytes> {
    let len = read_u32(cursor)? as usize;
    let start = cursor.position() as usize;
    let remaining = bytes.len().saturating_sub(start);
    if len > remaining {
        return Err(WireError::PayloadLengthMismatch { declared: len, remaining });
    }
    cursor.set_position((start + len) as u64);
    Ok(Bytes::copy_from_slice(&bytes[start..start + len]))
}

fn write_projected(state: &ProjectedState, out: &mut Vec<u8>) {
    out.write_u32::<LittleEndian>(state.entity_id).unwrap();
    out.write_i64::<LittleEndian>(state.position.0).unwrap();
    out.write_i64::<LittleEndian>(state.position.1).unwrap();
    out.write_i64::<LittleEndian>(state.position.2).unwrap();
    out.push(state.entity_type);
    out.push(state.health_percent);
}

fn read_projected(cursor: &mut Cursor<&[u8]>) -> WireResult<ProjectedState> {
    Ok(ProjectedState {
        entity_id: read_u32(cursor)?,
        position: (read_i64(cursor)?, read_i64(cursor)?, read_i64(cursor)?),
        entity_type: cursor.read_u8().map_err(|_| WireError::Truncated { needed: 1 })?,
        health_percent: cursor.read_u8().map_err(|_| WireError::Truncated { needed: 1 })?,
    })
}

fn read_u32(cursor: &mut Cursor<&[u8]>) -> WireResult<u32> {
    cursor.read_u32::<LittleEndian>().map_err(|_| WireError::Truncated { needed: 4 })
}

fn read_i64(cursor: &mut Cursor<&[u8]>) -> WireResult<i64> {
    cursor.read_i64::<LittleEndian>().map_err(|_| WireError::Truncated { needed: 8 })
}

impl MigrationEnvelope {
    pub fn encode(&self) -> WireResult<Vec<u8>> {
        let mut out = Vec::new();
        out.push(self.message.tag());
        out.write_u32::<LittleEndian>(self.source_zone_id).unwrap();
        out.write_u64::<LittleEndian>(self.channel_seq).unwrap();

        match &self.message {
            MigrationMessage::MigrateReq { handle, epoch, full_state } => {
                write_handle(*handle, &mut out);
                out.write_u32::<LittleEndian>(*epoch).unwrap();
                write_full_state(full_state, &mut out)?;
            }
            MigrationMessage::MigrateAck { handle, epoch } => {
                write_handle(*handle, &mut out);
                out.write_u32::<LittleEndian>(*epoch).unwrap();
            }
            MigrationMessage::MigrateState { handle, epoch, full_state } => {
                write_handle(*handle, &mut out);
                out.write_u32::<LittleEndian>(*epoch).unwrap();
                write_full_state(full_state, &mut out)?;
            }
            MigrationMessage::MigrateApplied { handle, epoch } => {
                write_handle(*handle, &mut out);
                out.write_u32::<LittleEndian>(*epoch).unwrap();
            }
            MigrationMessage::AuraUpdate { projected, source_tick } => {
                let count = u16::try_from(projected.len())
                    .map_err(|_| WireError::TooManyEntities(projected.len()))?;
                out.write_u16::<LittleEndian>(count).unwrap();
                for state in projected {
                    write_projected(state, &mut out);
                }
                out.write_u32::<LittleEndian>(*source_tick).unwrap();
            }
        }
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> WireResult<Self> {
        let mut cursor = Cursor::new(bytes);
        let tag = cursor.read_u8().map_err(|_| WireError::Truncated { needed: 1 })?;
        let source_zone_id = read_u32(&mut cursor)?;
        let channel_seq = cursor
            .read_u64::<LittleEndian>()
            .map_err(|_| WireError::Truncated { needed: 8 })?;

        let message = match tag {
            0 => {
                let handle = read_handle(&mut cursor)?;
                let epoch = read_u32(&mut cursor)?;
                let full_state = read_full_state(&mut cursor, bytes)?;
                MigrationMessage::MigrateReq { handle, epoch, full_state }
            }
            1 => MigrationMessage::MigrateAck {
                handle: read_handle(&mut cursor)?,
                epoch: read_u32(&mut cursor)?,
            },
            2 => {
                let handle = read_handle(&mut cursor)?;
                let epoch = read_u32(&mut cursor)?;
                let full_state = read_full_state(&mut cursor, bytes)?;
                MigrationMessage::MigrateState { handle, epoch, full_state }
            }
            3 => MigrationMessage::MigrateApplied {
                handle: read_handle(&mut cursor)?,
                epoch: read_u32(&mut cursor)?,
            },
            4 => {
                let count = cursor
                    .read_u16::<LittleEndian>()
                    .map_err(|_| WireError::Truncated { needed: 2 })?;
                let mut projected = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    projected.push(read_projected(&mut cursor)?);
                }
                let source_tick = read_u32(&mut cursor)?;
                MigrationMessage::AuraUpdate { projected, source_tick }
            }
            other => return Err(WireError::InvalidEventType(other)),
        };

        let consumed = cursor.position() as usize;
        if consumed != bytes.len() {
            return Err(WireError::TrailingBytes(bytes.len() - consumed));
        }

        Ok(Self {
            source_zone_id,
            channel_seq,
            message,
        })
    }
}
