//! Block file format
//!
//! Frame encoding shared by the block reader and block writer.
//!
//! ## Frame Layout
//! ```text
//! ┌──────────────┬──────────────┬──────────────────────────┐
//! │ PayloadLen(4)│   CRC32 (4)  │   bincode(Batch) payload │
//! └──────────────┴──────────────┴──────────────────────────┘
//! ```
//! Both integers are little-endian. The CRC covers the payload only.

use std::io::{ErrorKind, Read, Write};

use crate::error::{Result, TableError};
use crate::record::Batch;

/// Frame header size: PayloadLen (4) + CRC32 (4) = 8 bytes
pub const FRAME_HEADER_SIZE: usize = 8;

/// Largest payload a frame may declare (64 MB)
pub const MAX_FRAME_PAYLOAD: u32 = 64 * 1024 * 1024;

// =============================================================================
// Payload Encoding
// =============================================================================

/// Encode a batch to its bare payload (no frame header)
pub fn encode_batch(batch: &Batch) -> Result<Vec<u8>> {
    Ok(bincode::serialize(batch)?)
}

/// Decode a batch from a bare payload
pub fn decode_batch(payload: &[u8]) -> Result<Batch> {
    bincode::deserialize(payload).map_err(|e| {
        TableError::Corruption(format!("undecodable batch payload: {}", e))
    })
}

// =============================================================================
// Framed I/O
// =============================================================================

/// Append one framed batch to a writer
///
/// Returns the number of bytes written.
pub fn write_batch<W: Write>(writer: &mut W, batch: &Batch) -> Result<u64> {
    let payload = encode_batch(batch)?;
    if payload.len() > MAX_FRAME_PAYLOAD as usize {
        return Err(TableError::Serialization(format!(
            "batch payload too large: {} bytes (max {})",
            payload.len(),
            MAX_FRAME_PAYLOAD
        )));
    }

    let crc = crc32fast::hash(&payload);
    writer.write_all(&(payload.len() as u32).to_le_bytes())?;
    writer.write_all(&crc.to_le_bytes())?;
    writer.write_all(&payload)?;

    Ok((FRAME_HEADER_SIZE + payload.len()) as u64)
}

/// Read the next framed batch
///
/// Returns:
/// - `Ok(Some(batch))`: a complete, checksummed batch
/// - `Ok(None)`: clean end of file at a frame boundary
/// - `Err(Corruption)`: truncated frame, bad checksum, or undecodable payload
pub fn read_batch<R: Read>(reader: &mut R) -> Result<Option<Batch>> {
    let mut header = [0u8; FRAME_HEADER_SIZE];
    let filled = read_full(reader, &mut header)?;
    if filled == 0 {
        return Ok(None);
    }
    if filled < FRAME_HEADER_SIZE {
        return Err(TableError::Corruption(format!(
            "truncated frame header: {} of {} bytes",
            filled, FRAME_HEADER_SIZE
        )));
    }

    let payload_len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

    if payload_len > MAX_FRAME_PAYLOAD {
        return Err(TableError::Corruption(format!(
            "frame declares {} bytes (max {})",
            payload_len, MAX_FRAME_PAYLOAD
        )));
    }

    let mut payload = vec![0u8; payload_len as usize];
    let filled = read_full(reader, &mut payload)?;
    if filled < payload.len() {
        return Err(TableError::Corruption(format!(
            "truncated frame payload: {} of {} bytes",
            filled, payload_len
        )));
    }

    let actual_crc = crc32fast::hash(&payload);
    if actual_crc != expected_crc {
        return Err(TableError::Corruption(format!(
            "checksum mismatch: expected {:#010x}, got {:#010x}",
            expected_crc, actual_crc
        )));
    }

    decode_batch(&payload).map(Some)
}

/// Fill `buf` as far as the reader allows; returns bytes read (short only at EOF)
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(TableError::Io(e)),
        }
    }
    Ok(filled)
}
