//! Block Writer
//!
//! Appends received batches to block files, rotating files as the block
//! number changes. This is the table-server end of the write path.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{Result, TableError};
use crate::record::Batch;

use super::catalog::BlockCatalog;
use super::format::write_batch;

/// Writes batches for one table into `<dir>/<prefix>_<block_number>`
pub struct BlockWriter {
    /// Directory holding the block files
    dir: PathBuf,
    /// Table file prefix
    prefix: String,
    /// Currently open block, if any
    current: Option<OpenBlock>,
    /// Blocks this writer has already created (later opens append)
    created: HashSet<u64>,
}

struct OpenBlock {
    block_number: u64,
    writer: BufWriter<File>,
}

impl BlockWriter {
    /// Create a writer; the directory is created if missing
    pub fn new(dir: &Path, prefix: impl Into<String>) -> Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            prefix: prefix.into(),
            current: None,
            created: HashSet::new(),
        })
    }

    /// Append a batch to the file of its block
    pub fn write(&mut self, batch: &Batch) -> Result<()> {
        let needs_rotation = match &self.current {
            Some(open) => open.block_number != batch.block_number,
            None => true,
        };
        if needs_rotation {
            self.rotate(batch.block_number)?;
        }

        let open = self
            .current
            .as_mut()
            .ok_or_else(|| TableError::InvalidState("no open block after rotation".into()))?;
        write_batch(&mut open.writer, batch)?;

        tracing::trace!(
            "Wrote batch of {} records to {}_{}",
            batch.len(),
            self.prefix,
            batch.block_number
        );
        Ok(())
    }

    /// Flush and fsync the open block
    pub fn sync(&mut self) -> Result<()> {
        if let Some(open) = self.current.as_mut() {
            open.writer.flush()?;
            open.writer.get_ref().sync_all()?;
        }
        Ok(())
    }

    /// Close the open block and switch to `block_number`
    ///
    /// The first open of a block truncates it; reopening appends.
    fn rotate(&mut self, block_number: u64) -> Result<()> {
        self.sync()?;
        self.current = None;

        let path = BlockCatalog::block_path(&self.dir, &self.prefix, block_number);
        let first_open = self.created.insert(block_number);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(first_open)
            .append(!first_open)
            .open(&path)?;

        tracing::debug!(
            "Opened block {} ({})",
            path.display(),
            if first_open { "new" } else { "append" }
        );

        self.current = Some(OpenBlock {
            block_number,
            writer: BufWriter::new(file),
        });
        Ok(())
    }

    /// Block number of the open file
    pub fn current_block(&self) -> Option<u64> {
        self.current.as_ref().map(|open| open.block_number)
    }
}

impl Drop for BlockWriter {
    fn drop(&mut self) {
        if let Err(e) = self.sync() {
            tracing::warn!("Failed to sync block on close: {}", e);
        }
    }
}
