//! Disk Table
//!
//! Record-at-a-time access to a block-partitioned table, backed by one
//! background pipeline at a time.
//!
//! ## Read path
//! ```text
//! BlockCatalog → BlockReader → PrefetchBuffer → load() / advance_record()
//!                (read thread)
//! ```
//!
//! ## Write path
//! ```text
//! put() → pending Batch → PrefetchBuffer → Dispatcher::send
//!                                          (write thread)
//! finish_put() → drain buffer → send pending → broadcast barrier
//! ```
//!
//! A table is either reading or writing, never both. The buffer is the only
//! state shared with the background thread; the cursor, block numbers and
//! the pending batch belong to the caller's thread.

mod read;
mod write;

use std::sync::Arc;

use crate::buffer::PrefetchBuffer;
use crate::config::TableConfig;
use crate::dispatch::{dispatch_batch, route, Dispatcher};
use crate::error::{Result, TableError};
use crate::protocol::{Message, MessageKind};
use crate::record::{Batch, Record};
use crate::storage::BlockCatalog;

pub use read::ReadStats;

use read::ReadPipeline;
use write::WritePipeline;

/// Outcome of a completed write session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    /// Records accepted by `put`
    pub records: u64,
    /// Batches dispatched to peers
    pub batches: u64,
    /// Distinct block numbers the records were spread over
    pub blocks: u64,
}

/// A partitioned, disk-resident key-value table
pub struct DiskTable {
    config: TableConfig,
    dispatcher: Arc<dyn Dispatcher>,
    /// Discovered on first load, then reused
    catalog: Option<Arc<BlockCatalog>>,
    /// Block number the next write session starts at
    next_write_block: u64,
    mode: Mode,
}

enum Mode {
    Idle,
    Reading(ReadSession),
    Writing(WriteSession),
}

struct ReadSession {
    pipeline: ReadPipeline,
    /// Batch holding the current record; `None` once the table is done
    cursor: Option<Batch>,
    index: usize,
}

struct WriteSession {
    pipeline: WritePipeline,
    /// Records accumulated since the last flush
    pending: Batch,
    first_block: u64,
    block_number: u64,
    /// Records written since the last rotation
    since_rotation: usize,
    records: u64,
    batches: u64,
}

impl DiskTable {
    /// Create a table; nothing is read or started until `load` or `put`
    pub fn new(config: TableConfig, dispatcher: Arc<dyn Dispatcher>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            dispatcher,
            catalog: None,
            next_write_block: 0,
            mode: Mode::Idle,
        })
    }

    // =========================================================================
    // Read Path
    // =========================================================================

    /// Start the read pipeline and wait for the first batch
    ///
    /// Blocks are discovered on the first load only; loading again restarts
    /// from the first block of the same catalog. Returns with `done()` true
    /// when the table has no data.
    pub fn load(&mut self) -> Result<()> {
        if matches!(self.mode, Mode::Writing(_)) {
            return Err(TableError::InvalidState(
                "cannot load while writing; call finish_put first".into(),
            ));
        }
        // Stops a previous read pipeline, if any
        self.mode = Mode::Idle;

        let catalog = match &self.catalog {
            Some(catalog) => Arc::clone(catalog),
            None => self.discover()?,
        };

        let buffer = Arc::new(PrefetchBuffer::new(self.config.buffer_capacity));
        let pipeline = ReadPipeline::start(
            &self.thread_name(),
            Arc::clone(&catalog),
            buffer,
            self.config.poll_interval,
            self.config.strict_reads,
        )?;

        let cursor = pipeline.next_batch()?;
        tracing::debug!(
            "Loaded table {:?}: {} blocks, first batch {}",
            self.config.name_prefix,
            catalog.len(),
            if cursor.is_some() { "ready" } else { "absent" }
        );

        self.mode = Mode::Reading(ReadSession {
            pipeline,
            cursor,
            index: 0,
        });
        Ok(())
    }

    /// Copy the current record into `key` and `value`
    ///
    /// Does not move the cursor.
    pub fn get(&self, key: &mut Vec<u8>, value: &mut Vec<u8>) -> Result<()> {
        let record = self
            .current_record()
            .ok_or_else(|| TableError::InvalidState("no current record".into()))?;
        key.clear();
        key.extend_from_slice(&record.key);
        value.clear();
        value.extend_from_slice(&record.value);
        Ok(())
    }

    /// Record under the cursor, if any
    pub fn current_record(&self) -> Option<&Record> {
        match &self.mode {
            Mode::Reading(session) => session.cursor.as_ref()?.get(session.index),
            _ => None,
        }
    }

    /// Move the cursor to the next record
    ///
    /// Waits for the read pipeline when the current batch is used up. At the
    /// end of the data the table becomes done and this is a no-op.
    pub fn advance_record(&mut self) -> Result<()> {
        let Mode::Reading(session) = &mut self.mode else {
            return Err(TableError::InvalidState("table is not loaded".into()));
        };
        let len = match &session.cursor {
            Some(batch) => batch.len(),
            None => return Ok(()),
        };

        session.index += 1;
        if session.index >= len {
            session.index = 0;
            session.cursor = None;
            session.cursor = session.pipeline.next_batch()?;
        }
        Ok(())
    }

    /// True when no record remains: the cursor is used up, every block has
    /// been read, and the buffer is empty
    ///
    /// A table that is not loaded has nothing to read and reports done.
    pub fn done(&self) -> bool {
        match &self.mode {
            Mode::Reading(session) => {
                session.cursor.is_none()
                    && session.pipeline.is_finished()
                    && session.pipeline.buffer().is_empty()
            }
            _ => true,
        }
    }

    /// Iterate the remaining records, advancing the cursor
    pub fn records(&mut self) -> Records<'_> {
        Records { table: self }
    }

    // =========================================================================
    // Write Path
    // =========================================================================

    /// Start the write pipeline
    ///
    /// Called by the first `put`; calling it while already writing is a no-op.
    pub fn begin_put(&mut self) -> Result<()> {
        match self.mode {
            Mode::Writing(_) => return Ok(()),
            Mode::Reading(_) => {
                return Err(TableError::InvalidState(
                    "table is loaded for reading".into(),
                ))
            }
            Mode::Idle => {}
        }

        // Reject an unusable sharding setup before any record is accepted
        route(self.config.sharding, 0, self.dispatcher.peer_count())?;

        let buffer = Arc::new(PrefetchBuffer::new(self.config.buffer_capacity));
        let pipeline = WritePipeline::start(
            &self.thread_name(),
            buffer,
            Arc::clone(&self.dispatcher),
            self.config.sharding,
            self.config.poll_interval,
        )?;

        let block_number = self.next_write_block;
        self.mode = Mode::Writing(WriteSession {
            pipeline,
            pending: Batch::new(self.config.table_id, block_number),
            first_block: block_number,
            block_number,
            since_rotation: 0,
            records: 0,
            batches: 0,
        });
        Ok(())
    }

    /// Append a record
    ///
    /// A full pending batch is handed to the write pipeline, waiting for room
    /// in the buffer. A dispatch failure in the pipeline aborts the write
    /// session and is returned here.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if matches!(self.mode, Mode::Idle) {
            self.begin_put()?;
        }
        let Mode::Writing(session) = &mut self.mode else {
            return Err(TableError::InvalidState(
                "table is loaded for reading".into(),
            ));
        };

        session.pending.push(key, value);
        session.records += 1;
        session.since_rotation += 1;

        if session.pending.len() >= self.config.flush_threshold {
            if let Err(e) = session.flush_pending(&self.config) {
                self.mode = Mode::Idle;
                return Err(e);
            }
        }
        Ok(())
    }

    /// Dispatch everything written and wait for every peer to confirm
    ///
    /// Stops the write pipeline, sends what is left in the buffer and the
    /// partially filled batch from this thread, then broadcasts the finish
    /// request. Returns only after every peer has acknowledged.
    pub fn finish_put(&mut self) -> Result<WriteSummary> {
        let mut session = match std::mem::replace(&mut self.mode, Mode::Idle) {
            Mode::Writing(session) => session,
            other => {
                self.mode = other;
                return Err(TableError::InvalidState("no write in progress".into()));
            }
        };

        let sent_in_background = session.pipeline.finish()?;

        let dispatcher = self.dispatcher.as_ref();
        let mut drained = 0u64;
        while let Some(batch) = session.pipeline.buffer().try_dequeue() {
            dispatch_batch(dispatcher, self.config.sharding, &batch)?;
            drained += 1;
        }
        if !session.pending.is_empty() {
            dispatch_batch(dispatcher, self.config.sharding, &session.pending)?;
            session.batches += 1;
        }
        tracing::debug!(
            "Flushed table {:?}: {} batches sent in background, {} drained",
            self.config.name_prefix,
            sent_in_background,
            drained
        );

        let finish = Message::finish(self.config.table_id);
        dispatcher.broadcast(finish.kind, MessageKind::DataPutRequestDone, &finish.payload)?;

        let next_block = if session.since_rotation > 0 {
            session.block_number + 1
        } else {
            session.block_number
        };
        self.next_write_block = next_block;

        let summary = WriteSummary {
            records: session.records,
            batches: session.batches,
            blocks: next_block - session.first_block,
        };
        tracing::info!(
            "Finished writing table {:?}: {} records in {} batches over {} blocks",
            self.config.name_prefix,
            summary.records,
            summary.batches,
            summary.blocks
        );
        Ok(summary)
    }

    // =========================================================================
    // Catalog & Accessors
    // =========================================================================

    /// Blocks discovered by the first load, if it has happened
    pub fn catalog(&self) -> Option<&BlockCatalog> {
        self.catalog.as_deref()
    }

    /// Forget the catalog and discover blocks again
    ///
    /// A running read keeps the catalog it started with.
    pub fn refresh_catalog(&mut self) -> Result<&BlockCatalog> {
        self.discover()?;
        self.catalog.as_deref().ok_or_else(|| {
            TableError::InvalidState("catalog missing after discovery".into())
        })
    }

    /// Block being read (catalog index) or written (block number)
    pub fn current_block(&self) -> u64 {
        match &self.mode {
            Mode::Reading(session) => session.pipeline.block_number() as u64,
            Mode::Writing(session) => session.block_number,
            Mode::Idle => self.next_write_block,
        }
    }

    /// Read pipeline counters, while loaded
    pub fn read_stats(&self) -> Option<ReadStats> {
        match &self.mode {
            Mode::Reading(session) => Some(session.pipeline.stats()),
            _ => None,
        }
    }

    pub fn is_writing(&self) -> bool {
        matches!(self.mode, Mode::Writing(_))
    }

    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    fn discover(&mut self) -> Result<Arc<BlockCatalog>> {
        let catalog = Arc::new(BlockCatalog::discover(
            &self.config.data_dir,
            &self.config.name_prefix,
        )?);
        self.catalog = Some(Arc::clone(&catalog));
        Ok(catalog)
    }

    fn thread_name(&self) -> String {
        format!("disktable-{}", self.config.name_prefix)
    }
}

impl Drop for DiskTable {
    fn drop(&mut self) {
        if let Mode::Writing(session) = &self.mode {
            if !session.pending.is_empty() || !session.pipeline.buffer().is_empty() {
                tracing::warn!(
                    "Table {:?} dropped with unfinished writes; call finish_put",
                    self.config.name_prefix
                );
            }
        }
    }
}

impl WriteSession {
    /// Hand the pending batch to the write pipeline and start a new one
    fn flush_pending(&mut self, config: &TableConfig) -> Result<()> {
        loop {
            if self.pipeline.has_failed() {
                return Err(match self.pipeline.finish() {
                    Err(e) => e,
                    Ok(_) => TableError::Pipeline("write pipeline stopped".into()),
                });
            }
            if self
                .pipeline
                .buffer()
                .enqueue_timeout(&self.pending, config.poll_interval)
            {
                break;
            }
        }
        self.batches += 1;

        if self.since_rotation >= config.block_capacity {
            self.block_number += 1;
            self.since_rotation = 0;
            tracing::debug!(
                "Table {:?} rotated to block {}",
                config.name_prefix,
                self.block_number
            );
        }
        self.pending = Batch::new(config.table_id, self.block_number);
        Ok(())
    }
}

/// Iterator over the remaining records of a loaded table
pub struct Records<'a> {
    table: &'a mut DiskTable,
}

impl Iterator for Records<'_> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.table.done() {
            return None;
        }
        let record = self.table.current_record()?.clone();
        if let Err(e) = self.table.advance_record() {
            return Some(Err(e));
        }
        Some(Ok(record))
    }
}
