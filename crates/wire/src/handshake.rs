//! Connection handshake, carried on the reliable channel before any
//! other frame type is accepted from a connection.

use std::io::Cursor;

use bytes::Bytes;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{WireError, WireResult};

#[derive(Debug, Clone, PartialEq)]
pub struct HandshakeRequest {
    pub protocol_version: u32,
    pub client_version: u32,
    pub token: Bytes,
    pub username: Bytes,
}

impl HandshakeRequest {
    pub fn encode(&self) -> WireResult<Vec<u8>> {
        let token_len = u16::try_from(self.token.len())
            .map_err(|_| WireError::PayloadLengthMismatch { declared: self.token.len(), remaining: u16::MAX as usize })?;
        let username_len = u16::try_from(self.username.len())
            .map_err(|_| WireError::PayloadLengthMismatch { declared: self.username.len(), remaining: u16::MAX as usize })?;

        let mut out = Vec::with_capacity(4 + 4 + 2 + self.token.len() + 2 + self.username.len());
        out.write_u32::<LittleEndian>(self.protocol_version).unwrap();
        out.write_u32::<LittleEndian>(self.client_version).unwrap();
        out.write_u16::<LittleEndian>(token_len).unwrap();
        out.extend_from_slice(&self.token);
        out.write_u16::<LittleEndian>(username_len).unwrap();
        out.extend_from_slice(&self.username);
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> WireResult<Self> {
        let mut cursor = Cursor::new(bytes);
        let protocol_version = read_u32(&mut cursor)?;
        let client_version = read_u32(&mut cursor)?;
        let token = read_length_prefixed(&mut cursor, bytes)?;
        let username = read_length_prefixed(&mut cursor, bytes)?;

        let consumed = cursor.position() as usize;
        if consumed != bytes.len() {
            return Err(WireError::TrailingBytes(bytes.len() - consumed));
        }

        Ok(Self {
            protocol_version,
            client_version,
            token,
            username,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HandshakeResponse {
    pub accepted: bool,
    pub server_tick: u32,
    pub your_entity_id: u32,
    pub spawn_pos: [f32; 3],
    pub reason: Bytes,
}

impl HandshakeResponse {
    pub fn encode(&self) -> WireResult<Vec<u8>> {
        let reason_len = u16::try_from(self.reason.len())
            .map_err(|_| WireError::PayloadLengthMismatch { declared: self.reason.len(), remaining: u16::MAX as usize })?;

        let mut out = Vec::with_capacity(1 + 4 + 4 + 12 + 2 + self.reason.len());
        out.push(u8::from(self.accepted));
        out.write_u32::<LittleEndian>(self.server_tick).unwrap();
        out.write_u32::<LittleEndian>(self.your_entity_id).unwrap();
        for component in self.spawn_pos {
            out.write_f32::<LittleEndian>(component).unwrap();
        }
        out.write_u16::<LittleEndian>(reason_len).unwrap();
        out.extend_from_slice(&self.reason);
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> WireResult<Self> {
        let mut cursor = Cursor::new(bytes);
        let accepted = cursor.read_u8().map_err(|_| WireError::Truncated { needed: 1 })? != 0;
        let server_tick = read_u32(&mut cursor)?;
        let your_entity_id = read_u32(&mut cursor)?;
        let spawn_pos = [
            cursor.read_f32::<LittleEndian>().map_err(|_| WireError::Truncated { needed: 4 })?,
            cursor.read_f32::<LittleEndian>().map_err(|_| WireError::Truncated { needed: 4 })?,
            cursor.read_f32::<LittleEndian>().map_err(|_| WireError::Truncated { needed: 4 })?,
        ];
        let reason = read_length_prefixed(&mut cursor, bytes)?;

        let consumed = cursor.position() as usize;
        if consumed != bytes.len() {
            return Err(WireError::TrailingBytes(bytes.len() - consumed));
        }

        Ok(Self {
            accepted,
            server_tick,
            your_entity_id,
            spawn_pos,
            reason,
        })
    }
}

fn read_u32(cursor: &mut Cursor<&[u8]>) -> WireResult<u32> {
    cursor.read_u32::<LittleEndian>().map_err(|_| WireError::Truncated { needed: 4 })
}

fn read_length_prefixed(cursor: &mut Cursor<&[u8]>, bytes: &[u8]) -> WireResult<Bytes> {
    let len = cursor
        .read_u16::<LittleEndian>()
        .map_err(|_| WireError::Truncated { needed: 2 })? as usize;
    let start = cursor.position() as usize;
    let remaining = bytes.len().saturating_sub(start);
    if len > remaining {
        return Err(WireError::PayloadLengthMismatch { declared: len, remaining });
    }
    cursor.set_position((start + len) as u64);
    Ok(Bytes::copy_from_slice(&bytes[start..start + len]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_roundtrips() {
        let request = HandshakeRequest {
            protocol_version: 3,
            client_version: 101,
            token: Bytes::from_static(b"session-token"),
            username: Bytes::from_static(b"astra"),
        };
        let bytes = request.encode().unwrap();
        assert_eq!(HandshakeRequest::decode(&bytes).unwrap(), request);
    }

    #[test]
    fn accepted_response_roundtrips() {
        let response = HandshakeResponse {
            accepted: true,
            server_tick: 900,
            your_entity_id: 12,
            spawn_pos: [0.0, 1.8, 0.0],
            reason: Bytes::new(),
        };
        let bytes = response.encode().unwrap();
        assert_eq!(HandshakeResponse::decode(&bytes).unwrap(), response);
    }

    #[test]
    fn rejected_response_carries_reason() {
        let response = HandshakeResponse {
            accepted: false,
            server_tick: 0,
            your_entity_id: 0,
            spawn_pos: [0.0, 0.0, 0.0],
            reason: Bytes::from_static(b"ProtocolMismatch"),
        };
        let bytes = response.encode().unwrap();
        let decoded = HandshakeResponse::decode(&bytes).unwrap();
        assert!(!decoded.accepted);
        assert_eq!(decoded.reason, Bytes::from_static(b"ProtocolMismatch"));
    }

    #[test]
    fn length_prefix_longer_than_buffer_is_rejected() {
        let mut bytes = Vec::new();
        bytes.write_u32::<LittleEndian>(1).unwrap();
        bytes.write_u32::<LittleEndian>(1).unwrap();
        bytes.write_u16::<LittleEndian>(50).unwrap();
        assert!(matches!(
            HandshakeRequest::decode(&bytes),
            Err(WireError::PayloadLengthMismatch { .. })
        ));
    }
}
