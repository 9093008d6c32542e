//! Block Reader
//!
//! Single-pass sequential reader over the batches of one block file.

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use crate::error::{Result, TableError};
use crate::record::Batch;

use super::catalog::Block;
use super::format::read_batch;

/// Why (or whether) a reader stopped producing batches
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadEnd {
    /// A batch is available
    Pending,

    /// Clean end of file at a frame boundary
    Eof,

    /// Malformed data; reading stopped at this point
    Corrupt(String),
}

/// Reads one block batch by batch
///
/// The first batch is read on open. Once exhausted, a reader stays
/// exhausted; open a new one to reread the block.
pub struct BlockReader {
    /// Buffered handle, kept open across batches
    file: BufReader<File>,
    /// Path for logging
    path: PathBuf,
    /// Batch at the current position
    current: Option<Batch>,
    /// How the reader ended, if it has
    end: ReadEnd,
    /// Batches successfully parsed so far
    batches_read: u64,
}

impl BlockReader {
    /// Open a block and read its first batch
    pub fn open(block: &Block) -> Result<Self> {
        let file = File::open(&block.path)?;
        let mut reader = Self {
            file: BufReader::new(file),
            path: block.path.clone(),
            current: None,
            end: ReadEnd::Pending,
            batches_read: 0,
        };
        reader.advance();
        Ok(reader)
    }

    /// Move to the next batch in the file
    ///
    /// No-op once exhausted.
    pub fn advance(&mut self) {
        if self.end != ReadEnd::Pending {
            return;
        }

        match read_batch(&mut self.file) {
            Ok(Some(batch)) => {
                self.batches_read += 1;
                self.current = Some(batch);
            }
            Ok(None) => {
                tracing::debug!(
                    "Block {} exhausted after {} batches",
                    self.path.display(),
                    self.batches_read
                );
                self.finish(ReadEnd::Eof);
            }
            Err(TableError::Corruption(reason)) => {
                tracing::warn!(
                    "Block {} corrupt after {} batches: {}",
                    self.path.display(),
                    self.batches_read,
                    reason
                );
                self.finish(ReadEnd::Corrupt(reason));
            }
            Err(e) => {
                tracing::warn!("Block {} read failed: {}", self.path.display(), e);
                self.finish(ReadEnd::Corrupt(e.to_string()));
            }
        }
    }

    fn finish(&mut self, end: ReadEnd) {
        self.current = None;
        self.end = end;
    }

    /// True once no further batch can be produced
    pub fn is_exhausted(&self) -> bool {
        self.current.is_none()
    }

    /// Batch at the current position
    pub fn current(&self) -> Option<&Batch> {
        self.current.as_ref()
    }

    /// How the reader ended (`Pending` while a batch is available)
    pub fn end_state(&self) -> &ReadEnd {
        &self.end
    }

    /// Batches successfully parsed so far
    pub fn batches_read(&self) -> u64 {
        self.batches_read
    }
}
