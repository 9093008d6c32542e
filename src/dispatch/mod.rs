//! Dispatch Module
//!
//! Delivery of batches to the table servers that own them.
//!
//! ## Responsibilities
//! - `Dispatcher`: the narrow send/broadcast surface of the messaging layer
//! - `route`: which peer owns a block
//! - `LoopbackDispatcher`: in-process table servers writing real block files
//! - `ReadOnlyDispatcher`: no peers, for tables that are only loaded
//!
//! Blocks are assigned to peers by `block_number mod peer_count` unless a
//! fixed peer is configured. There is no consistent hashing: changing the
//! peer count moves almost every block, so a table must be written and
//! read back against the same peer count.

mod loopback;

use crate::config::Sharding;
use crate::error::{Result, TableError};
use crate::protocol::MessageKind;
use crate::record::{Batch, PeerId};

pub use loopback::{DispatchRecord, LoopbackDispatcher};

/// Messaging layer used by the write path
///
/// Implementations are shared with the background sender thread.
pub trait Dispatcher: Send + Sync {
    /// Number of table servers
    fn peer_count(&self) -> usize;

    /// Deliver one batch to one peer (single attempt, no retry)
    fn send(&self, peer: PeerId, kind: MessageKind, batch: &Batch) -> Result<()>;

    /// Send `request` to every peer and block until each answers with `ack`
    fn broadcast(&self, request: MessageKind, ack: MessageKind, payload: &[u8]) -> Result<()>;
}

/// Dispatcher for tables that are only read
///
/// Has no peers, so a table built on it rejects `put` before accepting any
/// record. Creates no threads and touches no files.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadOnlyDispatcher;

impl Dispatcher for ReadOnlyDispatcher {
    fn peer_count(&self) -> usize {
        0
    }

    fn send(&self, peer: PeerId, _kind: MessageKind, _batch: &Batch) -> Result<()> {
        Err(TableError::Dispatch {
            peer,
            reason: "read-only dispatcher".into(),
        })
    }

    fn broadcast(&self, _request: MessageKind, _ack: MessageKind, _payload: &[u8]) -> Result<()> {
        Err(TableError::Broadcast("read-only dispatcher".into()))
    }
}

/// Owning peer of a block
pub fn route(sharding: Sharding, block_number: u64, peer_count: usize) -> Result<PeerId> {
    if peer_count == 0 {
        return Err(TableError::Config("dispatcher has no peers".into()));
    }
    match sharding {
        Sharding::Fixed(peer) if peer < peer_count => Ok(peer),
        Sharding::Fixed(peer) => Err(TableError::Config(format!(
            "fixed peer {} out of range (peer count {})",
            peer, peer_count
        ))),
        Sharding::ByBlockNumber => Ok((block_number % peer_count as u64) as PeerId),
    }
}

/// Route and send one batch as a put request
pub(crate) fn dispatch_batch(
    dispatcher: &dyn Dispatcher,
    sharding: Sharding,
    batch: &Batch,
) -> Result<PeerId> {
    let peer = route(sharding, batch.block_number, dispatcher.peer_count())?;
    tracing::trace!(
        "Dispatching {} records of block {} to peer {}",
        batch.len(),
        batch.block_number,
        peer
    );
    dispatcher.send(peer, MessageKind::DataPutRequest, batch)?;
    Ok(peer)
}
