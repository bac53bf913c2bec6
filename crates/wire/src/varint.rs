//! Variable-length field codecs shared by [`crate::snapshot`]: position
//! deltas (a shared header byte packing one 2-bit width tag per axis,
//! followed by each axis's signed value at that width) and rotation
//! half-floats.

use std::io::Cursor;

use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use half::f16;

use crate::error::{WireError, WireResult};

const TAG_I8: u8 = 0b00;
const TAG_I24: u8 = 0b01;
const TAG_I48: u8 = 0b10;

fn tag_and_width(delta: i64) -> (u8, usize) {
    if (-128..=127).contains(&delta) {
        (TAG_I8, 1)
    } else if (-32_768..=32_767).contains(&delta) {
        (TAG_I24, 3)
    } else {
        (TAG_I48, 6)
    }
}

fn width_of_tag(tag: u8) -> WireResult<usize> {
    match tag {
        TAG_I8 => Ok(1),
        TAG_I24 => Ok(3),
        TAG_I48 => Ok(6),
        other => Err(WireError::InvalidDeltaTag(other)),
    }
}

/// Encode a `(dx, dy, dz)` delta in raw fixed-point units: one byte of
/// packed 2-bit-per-axis width tags, then each axis's value at the
/// narrowest width (1, 3, or 6 bytes) that holds it.
pub fn encode_position_delta(dx: i64, dy: i64, dz: i64, out: &mut Vec<u8>) {
    let (tag_x, width_x) = tag_and_width(dx);
    let (tag_y, width_y) = tag_and_width(dy);
    let (tag_z, width_z) = tag_and_width(dz);
    out.push(tag_x | (tag_y << 2) | (tag_z << 4));
    out.write_int::<BigEndian>(dx, width_x)
        .expect("writes into a Vec<u8> never fail");
    out.write_int::<BigEndian>(dy, width_y)
        .expect("writes into a Vec<u8> never fail");
    out.write_int::<BigEndian>(dz, width_z)
        .expect("writes into a Vec<u8> never fail");
}

/// Decode a delta previously written by [`encode_position_delta`].
pub fn decode_position_delta(cursor: &mut Cursor<&[u8]>) -> WireResult<(i64, i64, i64)> {
    let header = cursor
        .read_u8()
        .map_err(|_| WireError::Truncated { needed: 1 })?;
    let width_x = width_of_tag(header & 0b11)?;
    let width_y = width_of_tag((header >> 2) & 0b11)?;
    let width_z = width_of_tag((header >> 4) & 0b11)?;
    let dx = cursor
        .read_int::<BigEndian>(width_x)
        .map_err(|_| WireError::Truncated { needed: width_x })?;
    let dy = cursor
        .read_int::<BigEndian>(width_y)
        .map_err(|_| WireError::Truncated { needed: width_y })?;
    let dz = cursor
        .read_int::<BigEndian>(width_z)
        .map_err(|_| WireError::Truncated { needed: width_z })?;
    Ok((dx, dy, dz))
}

/// Rotation is carried at half precision (yaw, pitch in radians): a
/// snapshot's rotation field is cosmetic, never an input to physics.
pub fn encode_rotation(yaw: f64, pitch: f64, out: &mut Vec<u8>) {
    out.extend_from_slice(&f16::from_f64(yaw).to_bits().to_le_bytes());
    out.extend_from_slice(&f16::from_f64(pitch).to_bits().to_le_bytes());
}

pub fn decode_rotation(cursor: &mut Cursor<&[u8]>) -> WireResult<(f64, f64)> {
    let yaw_bits = cursor
        .read_u16::<LittleEndian>()
        .map_err(|_| WireError::Truncated { needed: 2 })?;
    let pitch_bits = cursor
        .read_u16::<LittleEndian>()
        .map_err(|_| WireError::Truncated { needed: 2 })?;
    Ok((
        f16::from_bits(yaw_bits).to_f64(),
        f16::from_bits(pitch_bits).to_f64(),
    ))
}
