//! Protocol Module
//!
//! Frames exchanged between a disk table and remote table servers.
//!
//! ## Frame Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │ Kind (1) │ Len (4)  │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Message Kinds
//! - 0x01: DATA_PUT_REQUEST        - Payload: encoded batch
//! - 0x02: DATA_PUT_REQUEST_FINISH - Payload: table id (4, big-endian)
//! - 0x03: DATA_PUT_REQUEST_DONE   - Payload: peer id (4) + status (1) + reason

mod codec;
mod message;

pub use codec::{decode_message, encode_message, HEADER_SIZE, MAX_PAYLOAD_SIZE};
pub use message::{Message, MessageKind};
