//! `ClientInput`: the one packet type a client ever sends on the
//! unreliable channel. Carries the acked baseline tick piggy-backed in
//! the last field, per the per-connection baseline advance protocol.

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{WireError, WireResult};

pub const CLIENT_INPUT_WIRE_LEN: usize = 4 + 4 + 1 + 4 + 4 + 4 + 4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClientInput {
    pub seq: u32,
    pub client_tick_ms: u32,
    pub input_flags: u8,
    pub yaw: f32,
    pub pitch: f32,
    pub target_entity: u32,
    pub ack_baseline_tick: u32,
}

impl ClientInput {
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(CLIENT_INPUT_WIRE_LEN);
        out.write_u32::<LittleEndian>(self.seq).unwrap();
        out.write_u32::<LittleEndian>(self.client_tick_ms).unwrap();
        out.write_u8(self.input_flags).unwrap();
        out.write_f32::<LittleEndian>(self.yaw).unwrap();
        out.write_f32::<LittleEndian>(self.pitch).unwrap();
        out.write_u32::<LittleEndian>(self.target_entity).unwrap();
        out.write_u32::<LittleEndian>(self.ack_baseline_tick).unwrap();
        out
    }

    pub fn decode(bytes: &[u8]) -> WireResult<Self> {
        if bytes.len() < CLIENT_INPUT_WIRE_LEN {
            return Err(WireError::Truncated {
                needed: CLIENT_INPUT_WIRE_LEN - bytes.len(),
            });
        }
        let mut cursor = Cursor::new(bytes);
        let input = Self {
            seq: cursor.read_u32::<LittleEndian>().unwrap(),
            client_tick_ms: cursor.read_u32::<LittleEndian>().unwrap(),
            input_flags: cursor.read_u8().unwrap(),
            yaw: cursor.read_f32::<LittleEndian>().unwrap(),
            pitch: cursor.read_f32::<LittleEndian>().unwrap(),
            target_entity: cursor.read_u32::<LittleEndian>().unwrap(),
            ack_baseline_tick: cursor.read_u32::<LittleEndian>().unwrap(),
        };
        let consumed = cursor.position() as usize;
        if consumed != bytes.len() {
            return Err(WireError::TrailingBytes(bytes.len() - consumed));
        }
        Ok(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ClientInput {
        ClientInput {
            seq: 42,
            client_tick_ms: 16_683,
            input_flags: 0b0000_0101,
            yaw: 1.25,
            pitch: -0.5,
            target_entity: 7,
            ack_baseline_tick: 99,
        }
    }

    #[test]
    fn roundtrips() {
        let input = sample();
        let bytes = input.encode();
        assert_eq!(bytes.len(), CLIENT_INPUT_WIRE_LEN);
        assert_eq!(ClientInput::decode(&bytes).unwrap(), input);
    }

    #[test]
    fn truncated_frame_is_rejected() {
        let bytes = sample().encode();
        assert!(ClientInput::decode(&bytes[..CLIENT_INPUT_WIRE_LEN - 1]).is_err());
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut bytes = sample().encode();
        bytes.push(0xFF);
        assert!(matches!(
            ClientInput::decode(&bytes),
            Err(WireError::TrailingBytes(1))
        ));
    }
}
