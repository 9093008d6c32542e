//! Read pipeline
//!
//! Background thread replaying every block of a catalog, in order, into a
//! prefetch buffer.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use crate::buffer::PrefetchBuffer;
use crate::error::{Result, TableError};
use crate::record::Batch;
use crate::storage::{BlockCatalog, BlockReader, ReadEnd};

/// Counters published by the read thread
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadStats {
    /// Blocks opened so far
    pub blocks_opened: usize,
    /// Batches handed to the buffer
    pub batches_enqueued: u64,
    /// Blocks that ended on malformed data rather than a clean EOF
    pub corrupt_blocks: usize,
}

/// State shared between the read thread and the table
#[derive(Default)]
struct ReadShared {
    /// Set by the table to abandon the read (re-load or drop)
    stop: AtomicBool,
    /// Set by the read thread when it will enqueue nothing more, including
    /// when it panics
    finished: AtomicBool,
    /// Index of the block being read; equals the catalog length at the end
    block_number: AtomicUsize,
    blocks_opened: AtomicUsize,
    batches_enqueued: AtomicU64,
    corrupt_blocks: AtomicUsize,
    /// Failure that ended the read early
    error: Mutex<Option<TableError>>,
}

/// Handle to a running read thread
pub(crate) struct ReadPipeline {
    buffer: Arc<PrefetchBuffer>,
    shared: Arc<ReadShared>,
    poll_interval: Duration,
    handle: Option<JoinHandle<()>>,
}

impl ReadPipeline {
    /// Start replaying `catalog` into `buffer`
    pub(crate) fn start(
        name: &str,
        catalog: Arc<BlockCatalog>,
        buffer: Arc<PrefetchBuffer>,
        poll_interval: Duration,
        strict: bool,
    ) -> Result<Self> {
        let shared = Arc::new(ReadShared::default());

        let worker = ReadWorker {
            catalog,
            buffer: Arc::clone(&buffer),
            shared: Arc::clone(&shared),
            poll_interval,
            strict,
        };
        let handle = thread::Builder::new()
            .name(format!("{}-read", name))
            .spawn(move || worker.run())?;

        Ok(Self {
            buffer,
            shared,
            poll_interval,
            handle: Some(handle),
        })
    }

    /// Next non-empty batch, waiting while the read thread may produce one
    ///
    /// Returns `Ok(None)` once the thread has finished and the buffer is
    /// drained. A failure recorded by the thread is returned once.
    pub(crate) fn next_batch(&self) -> Result<Option<Batch>> {
        loop {
            if let Some(batch) = self.buffer.dequeue_timeout(self.poll_interval) {
                if batch.is_empty() {
                    continue;
                }
                return Ok(Some(batch));
            }

            if self.shared.finished.load(Ordering::Acquire) {
                // Everything enqueued before `finished` is visible now
                match self.buffer.try_dequeue() {
                    Some(batch) if batch.is_empty() => continue,
                    Some(batch) => return Ok(Some(batch)),
                    None => {}
                }
                if let Some(err) = self.shared.error.lock().take() {
                    return Err(err);
                }
                return Ok(None);
            }
        }
    }

    /// True when the read thread has nothing left to enqueue
    pub(crate) fn is_finished(&self) -> bool {
        self.shared.finished.load(Ordering::Acquire)
    }

    pub(crate) fn buffer(&self) -> &PrefetchBuffer {
        &self.buffer
    }

    /// Index of the block being read
    pub(crate) fn block_number(&self) -> usize {
        self.shared.block_number.load(Ordering::Acquire)
    }

    pub(crate) fn stats(&self) -> ReadStats {
        ReadStats {
            blocks_opened: self.shared.blocks_opened.load(Ordering::Relaxed),
            batches_enqueued: self.shared.batches_enqueued.load(Ordering::Relaxed),
            corrupt_blocks: self.shared.corrupt_blocks.load(Ordering::Relaxed),
        }
    }

    /// Ask the thread to stop and wait for it
    pub(crate) fn shutdown(&mut self) {
        self.shared.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("Read pipeline thread panicked");
            }
        }
    }
}

impl Drop for ReadPipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// =============================================================================
// Worker
// =============================================================================

struct ReadWorker {
    catalog: Arc<BlockCatalog>,
    buffer: Arc<PrefetchBuffer>,
    shared: Arc<ReadShared>,
    poll_interval: Duration,
    strict: bool,
}

/// Marks the read finished, with a pipeline error, if the thread unwinds
struct PanicGuard(Arc<ReadShared>);

impl Drop for PanicGuard {
    fn drop(&mut self) {
        if thread::panicking() {
            *self.0.error.lock() =
                Some(TableError::Pipeline("read pipeline thread panicked".into()));
            self.0.finished.store(true, Ordering::Release);
        }
    }
}

impl ReadWorker {
    fn run(self) {
        let _guard = PanicGuard(Arc::clone(&self.shared));
        tracing::debug!("Read pipeline started over {} blocks", self.catalog.len());

        if let Err(e) = self.replay() {
            tracing::warn!("Read pipeline stopped: {}", e);
            *self.shared.error.lock() = Some(e);
        }

        self.shared.finished.store(true, Ordering::Release);
        tracing::debug!(
            "Read pipeline finished: {} batches enqueued",
            self.shared.batches_enqueued.load(Ordering::Relaxed)
        );
    }

    fn replay(&self) -> Result<()> {
        for (index, block) in self.catalog.iter().enumerate() {
            self.shared.block_number.store(index, Ordering::Release);
            let mut reader = BlockReader::open(block)?;
            self.shared.blocks_opened.fetch_add(1, Ordering::Relaxed);

            while let Some(batch) = reader.current() {
                if !self.enqueue(batch) {
                    return Ok(());
                }
                reader.advance();
            }

            if let ReadEnd::Corrupt(reason) = reader.end_state() {
                self.shared.corrupt_blocks.fetch_add(1, Ordering::Relaxed);
                if self.strict {
                    return Err(TableError::Corruption(format!(
                        "{}: {}",
                        block.path.display(),
                        reason
                    )));
                }
            }
        }

        self.shared
            .block_number
            .store(self.catalog.len(), Ordering::Release);
        Ok(())
    }

    /// Enqueue with bounded waits until accepted; false if asked to stop
    fn enqueue(&self, batch: &Batch) -> bool {
        loop {
            if self.shared.stop.load(Ordering::Acquire) {
                return false;
            }
            if self.buffer.enqueue_timeout(batch, self.poll_interval) {
                self.shared.batches_enqueued.fetch_add(1, Ordering::Relaxed);
                return true;
            }
        }
    }
}
