//! Message definitions
//!
//! Represents frames sent to and acknowledged by table servers.

use bytes::Bytes;

use crate::error::{Result, TableError};

/// Message kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    /// A batch of records to store
    DataPutRequest = 0x01,

    /// The sender has dispatched all of its batches
    DataPutRequestFinish = 0x02,

    /// A server has stored everything it received before the finish request
    DataPutRequestDone = 0x03,
}

impl MessageKind {
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0x01 => Ok(MessageKind::DataPutRequest),
            0x02 => Ok(MessageKind::DataPutRequestFinish),
            0x03 => Ok(MessageKind::DataPutRequestDone),
            _ => Err(TableError::Protocol(format!(
                "Unknown message kind: 0x{:02x}",
                byte
            ))),
        }
    }
}

/// A framed message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageKind,
    pub payload: Bytes,
}

impl Message {
    pub fn new(kind: MessageKind, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    /// Finish request for one table
    pub fn finish(table: u32) -> Self {
        Self::new(
            MessageKind::DataPutRequestFinish,
            Bytes::copy_from_slice(&table.to_be_bytes()),
        )
    }

    /// Acknowledgement from a peer; an empty reason means success
    pub fn done(peer: u32, failure: Option<&str>) -> Self {
        let reason = failure.unwrap_or("");
        let mut payload = Vec::with_capacity(5 + reason.len());
        payload.extend_from_slice(&peer.to_be_bytes());
        payload.push(u8::from(failure.is_some()));
        payload.extend_from_slice(reason.as_bytes());
        Self::new(MessageKind::DataPutRequestDone, payload)
    }

    /// Parse a `done` payload into (peer, failure reason)
    pub fn parse_done(&self) -> Result<(u32, Option<String>)> {
        if self.kind != MessageKind::DataPutRequestDone {
            return Err(TableError::Protocol(format!(
                "Expected DATA_PUT_REQUEST_DONE, got {:?}",
                self.kind
            )));
        }
        if self.payload.len() < 5 {
            return Err(TableError::Protocol(
                "DONE message: payload shorter than 5 bytes".to_string(),
            ));
        }
        let p = &self.payload;
        let peer = u32::from_be_bytes([p[0], p[1], p[2], p[3]]);
        let failure = match p[4] {
            0 => None,
            _ => Some(String::from_utf8_lossy(&p[5..]).into_owned()),
        };
        Ok((peer, failure))
    }
}
