//! Storage Module
//!
//! On-disk blocks: discovery, sequential reads, and appends.
//!
//! ## Responsibilities
//! - Discover a table's block files and their sizes
//! - Replay one block's batches in file order
//! - Append received batches to the block they belong to
//!
//! ## Block File Format
//! ```text
//! {data_dir}/{prefix}_{block_number}
//! ┌────────────────────────────────────────┐
//! │ Frame 1                                │
//! │ ┌──────────┬─────────┬───────────────┐ │
//! │ │ Len (4)  │ CRC (4) │ Batch payload │ │
//! │ └──────────┴─────────┴───────────────┘ │
//! ├────────────────────────────────────────┤
//! │ Frame 2 ...                            │
//! └────────────────────────────────────────┘
//! ```
//! No header and no index: a sequential scan is the only access method.

mod catalog;
mod format;
mod reader;
mod writer;

pub use catalog::{Block, BlockCatalog};
pub use format::{
    decode_batch, encode_batch, read_batch, write_batch, FRAME_HEADER_SIZE, MAX_FRAME_PAYLOAD,
};
pub use reader::{BlockReader, ReadEnd};
pub use writer::BlockWriter;
