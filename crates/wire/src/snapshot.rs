//! `Snapshot`: the per-tier, per-connection delta frame sent on the
//! unreliable channel. Every `EntityDelta` carries only the fields that
//! changed since the connection's acknowledged baseline, flagged by a
//! bitmask so the decoder knows which optional fields follow and in
//! which order.

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{WireError, WireResult};
use crate::varint::{decode_position_delta, decode_rotation, encode_position_delta, encode_rotation};

/// Bits of `EntityDelta::changed_mask`, in field order — the order fields
/// are written/read in is exactly this bit order, low to high.
pub mod changed_bit {
    pub const POSITION: u16 = 1 << 0;
    pub const ROTATION: u16 = 1 << 1;
    pub const VELOCITY: u16 = 1 << 2;
    pub const HEALTH: u16 = 1 << 3;
    pub const ANIM: u16 = 1 << 4;
    /// No prior baseline held this entity: a full record follows and
    /// `entity_type` is appended after the usual fields.
    pub const NEW_ENTITY: u16 = 1 << 5;

    pub const ALL_KNOWN: u16 = POSITION | ROTATION | VELOCITY | HEALTH | ANIM | NEW_ENTITY;
}

/// One entity's changed fields within a `Snapshot`. `position_delta` and
/// `velocity_delta` are raw fixed-point deltas (post `Fixed::raw`), not
/// absolute positions — the receiver reconstructs absolute state by
/// applying the delta to its stored baseline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntityDelta {
    pub entity_id: u32,
    pub position_delta: Option<(i64, i64, i64)>,
    pub rotation: Option<(f64, f64)>,
    pub velocity_delta: Option<(i64, i64, i64)>,
    pub health_percent: Option<u8>,
    pub anim_state: Option<u8>,
    /// Present only when the baseline held nothing for this entity.
    pub entity_type: Option<u8>,
}

impl EntityDelta {
    /// A full record for an entity the connection's baseline has never
    /// seen: every field present, `entity_type` included.
    #[must_use]
    pub fn new_entity(
        entity_id: u32,
        position: (i64, i64, i64),
        rotation: (f64, f64),
        velocity: (i64, i64, i64),
        health_percent: u8,
        anim_state: u8,
        entity_type: u8,
    ) -> Self {
        Self {
            entity_id,
            position_delta: Some(position),
            rotation: Some(rotation),
            velocity_delta: Some(velocity),
            health_percent: Some(health_percent),
            anim_state: Some(anim_state),
            entity_type: Some(entity_type),
        }
    }

    /// A delta against an already-known baseline: any subset of fields,
    /// never `entity_type`.
    #[must_use]
    pub fn changed(
        entity_id: u32,
        position_delta: Option<(i64, i64, i64)>,
        rotation: Option<(f64, f64)>,
        velocity_delta: Option<(i64, i64, i64)>,
        health_percent: Option<u8>,
        anim_state: Option<u8>,
    ) -> Self {
        Self {
            entity_id,
            position_delta,
            rotation,
            velocity_delta,
            health_percent,
            anim_state,
            entity_type: None,
        }
    }

    #[must_use]
    pub fn changed_mask(&self) -> u16 {
        let mut mask = 0u16;
        if self.position_delta.is_some() {
            mask |= changed_bit::POSITION;
        }
        if self.rotation.is_some() {
            mask |= changed_bit::ROTATION;
        }
        if self.velocity_delta.is_some() {
            mask |= changed_bit::VELOCITY;
        }
        if self.health_percent.is_some() {
            mask |= changed_bit::HEALTH;
        }
        if self.anim_state.is_some() {
            mask |= changed_bit::ANIM;
        }
        if self.entity_type.is_some() {
            mask |= changed_bit::NEW_ENTITY;
        }
        mask
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.write_u32::<LittleEndian>(self.entity_id).unwrap();
        out.write_u16::<LittleEndian>(self.changed_mask()).unwrap();
        if let Some((dx, dy, dz)) = self.position_delta {
            encode_position_delta(dx, dy, dz, out);
        }
        if let Some((yaw, pitch)) = self.rotation {
            encode_rotation(yaw, pitch, out);
        }
        if let Some((dx, dy, dz)) = self.velocity_delta {
            encode_position_delta(dx, dy, dz, out);
        }
        if let Some(hp) = self.health_percent {
            out.push(hp);
        }
        if let Some(anim) = self.anim_state {
            out.push(anim);
        }
        if let Some(entity_type) = self.entity_type {
            out.push(entity_type);
        }
    }

    fn decode(cursor: &mut Cursor<&[u8]>) -> WireResult<Self> {
        let entity_id = cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| WireError::Truncated { needed: 4 })?;
        let mask = cursor
            .read_u16::<LittleEndian>()
            .map_err(|_| WireError::Truncated { needed: 2 })?;
        if mask & !changed_bit::ALL_KNOWN != 0 {
            return Err(WireError::UnknownChangedBit(mask));
        }

        let position_delta = if mask & changed_bit::POSITION != 0 {
            Some(decode_position_delta(cursor)?)
        } else {
            None
        };
        let rotation = if mask & changed_bit::ROTATION != 0 {
            Some(decode_rotation(cursor)?)
        } else {
            None
        };
        let velocity_delta = if mask & changed_bit::VELOCITY != 0 {
            Some(decode_position_delta(cursor)?)
        } else {
            None
        };
        let health_percent = if mask & changed_bit::HEALTH != 0 {
            Some(
                cursor
                    .read_u8()
                    .map_err(|_| WireError::Truncated { needed: 1 })?,
            )
        } else {
            None
        };
        let anim_state = if mask & changed_bit::ANIM != 0 {
            Some(
                cursor
                    .read_u8()
                    .map_err(|_| WireError::Truncated { needed: 1 })?,
            )
        } else {
            None
        };
        let entity_type = if mask & changed_bit::NEW_ENTITY != 0 {
            Some(
                cursor
                    .read_u8()
                    .map_err(|_| WireError::Truncated { needed: 1 })?,
            )
        } else {
            None
        };

        Ok(Self {
            entity_id,
            position_delta,
            rotation,
            velocity_delta,
            health_percent,
            anim_state,
            entity_type,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub server_tick: u32,
    pub baseline_tick: u32,
    pub entities: Vec<EntityDelta>,
    pub removed: Vec<u32>,
}

impl Snapshot {
    pub fn encode(&self) -> WireResult<Vec<u8>> {
        let entity_count = u16::try_from(self.entities.len())
            .map_err(|_| WireError::TooManyEntities(self.entities.len()))?;
        let removed_count = u16::try_from(self.removed.len())
            .map_err(|_| WireError::TooManyRemoved(self.removed.len()))?;

        let mut out = Vec::new();
        out.write_u32::<LittleEndian>(self.server_tick).unwrap();
        out.write_u32::<LittleEndian>(self.baseline_tick).unwrap();
        out.write_u16::<LittleEndian>(entity_count).unwrap();
        for delta in &self.entities {
            delta.encode(&mut out);
        }
        out.write_u16::<LittleEndian>(removed_count).unwrap();
        for &removed in &self.removed {
            out.write_u32::<LittleEndian>(removed).unwrap();
        }
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> WireResult<Self> {
        let mut cursor = Cursor::new(bytes);
        let server_tick = cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| WireError::Truncated { needed: 4 })?;
        let baseline_tick = cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| WireError::Truncated { needed: 4 })?;
        let entity_count = cursor
            .read_u16::<LittleEndian>()
            .map_err(|_| WireError::Truncated { needed: 2 })?;

        let mut entities = Vec::with_capacity(entity_count as usize);
        for _ in 0..entity_count {
            entities.push(EntityDelta::decode(&mut cursor)?);
        }

        let removed_count = cursor
            .read_u16::<LittleEndian>()
            .map_err(|_| WireError::Truncated { needed: 2 })?;
        let mut removed = Vec::with_capacity(removed_count as usize);
        for _ in 0..removed_count {
            removed.push(
                cursor
                    .read_u32::<LittleEndian>()
                    .map_err(|_| WireError::Truncated { needed: 4 })?,
            );
        }

        let consumed = cursor.position() as usize;
        if consumed != bytes.len() {
            return Err(WireError::TrailingBytes(bytes.len() - consumed));
        }

        Ok(Self {
            server_tick,
            baseline_tick,
            entities,
            removed,
        })
    }
}
