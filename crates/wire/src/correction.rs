//! `ServerCorrection`: sent on the reliable channel when an anti-cheat
//! snap-back must be guaranteed delivered, so it always carries the
//! entity's full absolute position and velocity rather than a delta
//! against a baseline the client's misbehaviour may have invalidated.

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{WireError, WireResult};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServerCorrection {
    pub server_tick: u32,
    pub last_processed_input_seq: u32,
    pub position: (i64, i64, i64),
    pub velocity: (i64, i64, i64),
}

impl ServerCorrection {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + 4 + 8 * 6);
        out.write_u32::<LittleEndian>(self.server_tick).unwrap();
        out.write_u32::<LittleEndian>(self.last_processed_input_seq).unwrap();
        for component in [self.position.0, self.position.1, self.position.2] {
            out.write_i64::<LittleEndian>(component).unwrap();
        }
        for component in [self.velocity.0, self.velocity.1, self.velocity.2] {
            out.write_i64::<LittleEndian>(component).unwrap();
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> WireResult<Self> {
        let mut cursor = Cursor::new(bytes);
        let server_tick = read_u32(&mut cursor)?;
        let last_processed_input_seq = read_u32(&mut cursor)?;
        let position = (read_i64(&mut cursor)?, read_i64(&mut cursor)?, read_i64(&mut cursor)?);
        let velocity = (read_i64(&mut cursor)?, read_i64(&mut cursor)?, read_i64(&mut cursor)?);

        let consumed = cursor.position() as usize;
        if consumed != bytes.len() {
            return Err(WireError::TrailingBytes(bytes.len() - consumed));
        }

        Ok(Self {
            server_tick,
            last_processed_input_seq,
            position,
            velocity,
        })
    }
}

fn read_u32(cursor: &mut Cursor<&[u8]>) -> WireResult<u32> {
    cursor
        .read_u32::<LittleEndian>()
        .map_err(|_| WireError::Truncated { needed: 4 })
}

fn read_i64(cursor: &mut Cursor<&[u8]>) -> WireResult<i64> {
    cursor
        .read_i64::<LittleEndian>()
        .map_err(|_| WireError::Truncated { needed: 8 })
}
