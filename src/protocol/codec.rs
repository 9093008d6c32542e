//! Protocol codec
//!
//! Encoding and decoding functions for dispatch frames.
//!
//! ## Wire Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │ Kind (1) │ Len (4)  │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//! The length is big-endian and counts payload bytes only.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Result, TableError};

use super::{Message, MessageKind};

/// Header size: 1 byte kind + 4 bytes length
pub const HEADER_SIZE: usize = 5;

/// Maximum payload size (64 MB, matches the block frame limit)
pub const MAX_PAYLOAD_SIZE: u32 = 64 * 1024 * 1024;

/// Encode a message to a frame
pub fn encode_message(message: &Message) -> Bytes {
    let mut frame = BytesMut::with_capacity(HEADER_SIZE + message.payload.len());
    frame.put_u8(message.kind as u8);
    frame.put_u32(message.payload.len() as u32);
    frame.extend_from_slice(&message.payload);
    frame.freeze()
}

/// Decode one complete frame
pub fn decode_message(bytes: &[u8]) -> Result<Message> {
    if bytes.len() < HEADER_SIZE {
        return Err(TableError::Protocol(format!(
            "Incomplete header: expected {} bytes, got {}",
            HEADER_SIZE,
            bytes.len()
        )));
    }

    let kind = MessageKind::from_byte(bytes[0])?;
    let payload_len = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]) as usize;

    if payload_len > MAX_PAYLOAD_SIZE as usize {
        return Err(TableError::Protocol(format!(
            "Payload too large: {} bytes (max {})",
            payload_len, MAX_PAYLOAD_SIZE
        )));
    }

    let total_len = HEADER_SIZE + payload_len;
    if bytes.len() < total_len {
        return Err(TableError::Protocol(format!(
            "Incomplete payload: expected {} bytes, got {}",
            total_len,
            bytes.len()
        )));
    }
    if bytes.len() > total_len {
        return Err(TableError::Protocol(format!(
            "Trailing bytes after frame: {} extra",
            bytes.len() - total_len
        )));
    }

    Ok(Message::new(
        kind,
        Bytes::copy_from_slice(&bytes[HEADER_SIZE..total_len]),
    ))
}
