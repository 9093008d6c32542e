//! Write pipeline
//!
//! Background thread shipping batches from the prefetch buffer to their
//! owning peers until the table starts finishing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::buffer::PrefetchBuffer;
use crate::config::Sharding;
use crate::dispatch::{dispatch_batch, Dispatcher};
use crate::error::{Result, TableError};

/// Handle to a running sender thread
pub(crate) struct WritePipeline {
    buffer: Arc<PrefetchBuffer>,
    /// Set by `finish`; the thread exits within one poll interval
    finishing: Arc<AtomicBool>,
    /// Set by the thread when a dispatch fails or the thread panics
    failed: Arc<AtomicBool>,
    /// Joined once; yields the number of batches the thread sent
    handle: Option<JoinHandle<Result<u64>>>,
}

impl WritePipeline {
    pub(crate) fn start(
        name: &str,
        buffer: Arc<PrefetchBuffer>,
        dispatcher: Arc<dyn Dispatcher>,
        sharding: Sharding,
        poll_interval: Duration,
    ) -> Result<Self> {
        let finishing = Arc::new(AtomicBool::new(false));
        let failed = Arc::new(AtomicBool::new(false));

        let worker = WriteWorker {
            buffer: Arc::clone(&buffer),
            dispatcher,
            sharding,
            poll_interval,
            finishing: Arc::clone(&finishing),
            failed: Arc::clone(&failed),
        };
        let handle = thread::Builder::new()
            .name(format!("{}-write", name))
            .spawn(move || worker.run())?;

        tracing::debug!("Write pipeline started for {}", name);

        Ok(Self {
            buffer,
            finishing,
            failed,
            handle: Some(handle),
        })
    }

    pub(crate) fn buffer(&self) -> &PrefetchBuffer {
        &self.buffer
    }

    /// True once the sender thread has hit a dispatch failure or panicked
    pub(crate) fn has_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    /// Set the finishing flag and wait for the sender to exit
    ///
    /// Batches still queued stay in the buffer for the caller to drain.
    pub(crate) fn finish(&mut self) -> Result<u64> {
        self.finishing.store(true, Ordering::Release);
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| TableError::Pipeline("write pipeline thread panicked".into()))?,
            None => Ok(0),
        }
    }
}

impl Drop for WritePipeline {
    fn drop(&mut self) {
        if self.handle.is_some() {
            if let Err(e) = self.finish() {
                tracing::warn!("Write pipeline ended with error: {}", e);
            }
        }
    }
}

// =============================================================================
// Worker
// =============================================================================

struct WriteWorker {
    buffer: Arc<PrefetchBuffer>,
    dispatcher: Arc<dyn Dispatcher>,
    sharding: Sharding,
    poll_interval: Duration,
    finishing: Arc<AtomicBool>,
    failed: Arc<AtomicBool>,
}

/// Raises `failed` if the sender thread unwinds
struct PanicGuard(Arc<AtomicBool>);

impl Drop for PanicGuard {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.store(true, Ordering::Release);
        }
    }
}

impl WriteWorker {
    fn run(self) -> Result<u64> {
        let _guard = PanicGuard(Arc::clone(&self.failed));
        let mut sent = 0u64;
        while !self.finishing.load(Ordering::Acquire) {
            let Some(batch) = self.buffer.dequeue_timeout(self.poll_interval) else {
                continue;
            };
            if let Err(e) = dispatch_batch(self.dispatcher.as_ref(), self.sharding, &batch) {
                tracing::warn!("Write pipeline dispatch failed: {}", e);
                self.failed.store(true, Ordering::Release);
                return Err(e);
            }
            sent += 1;
        }

        tracing::debug!("Write pipeline stopped after {} batches", sent);
        Ok(sent)
    }
}
