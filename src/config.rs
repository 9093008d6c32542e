//! Configuration for disktable
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, TableError};
use crate::record::{PeerId, TableId};

/// Configuration for one disk table
#[derive(Debug, Clone)]
pub struct TableConfig {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Directory holding block files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── {prefix}_0
    ///     ├── {prefix}_1
    ///     └── ...
    pub data_dir: PathBuf,

    /// Per-table file name prefix
    pub name_prefix: String,

    /// Identifier stamped on every batch this table produces
    pub table_id: TableId,

    // -------------------------------------------------------------------------
    // Write Path Configuration
    // -------------------------------------------------------------------------
    /// Records accumulated before a batch is handed to the prefetch buffer
    pub flush_threshold: usize,

    /// Records written to one block before rotating to the next block number
    pub block_capacity: usize,

    /// Which peer receives a batch
    pub sharding: Sharding,

    // -------------------------------------------------------------------------
    // Pipeline Configuration
    // -------------------------------------------------------------------------
    /// Prefetch buffer capacity (in batches)
    pub buffer_capacity: usize,

    /// Upper bound on any single wait inside the pipelines
    pub poll_interval: Duration,

    /// Fail reads on corrupt block data instead of ending that block
    pub strict_reads: bool,
}

/// Batch routing policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sharding {
    /// Every batch goes to the same peer
    Fixed(PeerId),

    /// Batch for block `b` goes to peer `b mod peer_count`
    ByBlockNumber,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./tmp"),
            name_prefix: "table".to_string(),
            table_id: 0,
            flush_threshold: 1,
            block_capacity: 100_000,
            sharding: Sharding::ByBlockNumber,
            buffer_capacity: 5,
            poll_interval: Duration::from_millis(10),
            strict_reads: false,
        }
    }
}

impl TableConfig {
    /// Create a new config builder
    pub fn builder() -> TableConfigBuilder {
        TableConfigBuilder::default()
    }

    /// Check the values a table cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.name_prefix.is_empty() {
            return Err(TableError::Config("name prefix must not be empty".into()));
        }
        if self.name_prefix.contains(std::path::is_separator) {
            return Err(TableError::Config(format!(
                "name prefix {:?} must not contain a path separator",
                self.name_prefix
            )));
        }
        if self.flush_threshold == 0 {
            return Err(TableError::Config(
                "flush threshold must be at least 1".into(),
            ));
        }
        if self.block_capacity == 0 {
            return Err(TableError::Config(
                "block capacity must be at least 1".into(),
            ));
        }
        if self.buffer_capacity == 0 {
            return Err(TableError::Config(
                "buffer capacity must be at least 1".into(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(TableError::Config("poll interval must be non-zero".into()));
        }
        Ok(())
    }
}

/// Builder for TableConfig
#[derive(Default)]
pub struct TableConfigBuilder {
    config: TableConfig,
}

impl TableConfigBuilder {
    /// Set the data directory
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the block file name prefix
    pub fn name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.name_prefix = prefix.into();
        self
    }

    /// Set the table identifier
    pub fn table_id(mut self, id: TableId) -> Self {
        self.config.table_id = id;
        self
    }

    /// Set the per-batch record threshold
    pub fn flush_threshold(mut self, records: usize) -> Self {
        self.config.flush_threshold = records;
        self
    }

    /// Set the per-block record capacity
    pub fn block_capacity(mut self, records: usize) -> Self {
        self.config.block_capacity = records;
        self
    }

    /// Set the sharding policy
    pub fn sharding(mut self, sharding: Sharding) -> Self {
        self.config.sharding = sharding;
        self
    }

    /// Route every batch to one peer
    pub fn fixed_peer(self, peer: PeerId) -> Self {
        self.sharding(Sharding::Fixed(peer))
    }

    /// Set the prefetch buffer capacity (in batches)
    pub fn buffer_capacity(mut self, batches: usize) -> Self {
        self.config.buffer_capacity = batches;
        self
    }

    /// Set the pipeline poll interval
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Set the poll interval (in milliseconds)
    pub fn poll_interval_ms(self, ms: u64) -> Self {
        self.poll_interval(Duration::from_millis(ms))
    }

    /// Fail reads on corrupt block data
    pub fn strict_reads(mut self, strict: bool) -> Self {
        self.config.strict_reads = strict;
        self
    }

    pub fn build(self) -> TableConfig {
        self.config
    }
}
