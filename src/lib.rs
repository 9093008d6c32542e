//! # disktable
//!
//! The data-loading layer of a distributed learning platform: a partitioned,
//! disk-resident key-value table that streams record batches between local
//! block files and a cluster of table servers, with:
//! - Bounded memory through a fixed-size prefetch buffer
//! - Order-preserving replay of every block of a table
//! - Batched, block-rotating writes routed to owning peers
//! - A drain-then-barrier close protocol
//!
//! ## Architecture Overview
//!
//! ```text
//!            read path                           write path
//! ┌─────────────────────────┐        ┌─────────────────────────┐
//! │  BlockCatalog           │        │  DiskTable::put         │
//! │  {dir}/{prefix}_{n}     │        │  (pending Batch)        │
//! └───────────┬─────────────┘        └───────────┬─────────────┘
//!             ▼                                  ▼
//! ┌─────────────────────────┐        ┌─────────────────────────┐
//! │  BlockReader            │        │  PrefetchBuffer         │
//! │  (read thread)          │        │  (bounded FIFO)         │
//! └───────────┬─────────────┘        └───────────┬─────────────┘
//!             ▼                                  ▼
//! ┌─────────────────────────┐        ┌─────────────────────────┐
//! │  PrefetchBuffer         │        │  Dispatcher::send       │
//! │  (bounded FIFO)         │        │  (write thread)         │
//! └───────────┬─────────────┘        └───────────┬─────────────┘
//!             ▼                                  ▼
//! ┌─────────────────────────┐        ┌─────────────────────────┐
//! │  DiskTable::get /       │        │  table servers →        │
//! │  advance_record         │        │  BlockWriter            │
//! └─────────────────────────┘        └─────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod record;

pub mod buffer;
pub mod storage;
pub mod protocol;
pub mod dispatch;
pub mod table;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, TableError};
pub use config::{Sharding, TableConfig};
pub use record::{Batch, PeerId, Record, TableId};
pub use buffer::PrefetchBuffer;
pub use dispatch::{Dispatcher, LoopbackDispatcher};
pub use table::{DiskTable, ReadStats, WriteSummary};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of disktable
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
