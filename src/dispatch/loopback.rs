//! Loopback Dispatcher
//!
//! A cluster of in-process table servers. Each peer runs on its own thread,
//! receives encoded frames over a channel, and appends the batches it owns
//! to block files in a shared data directory, the same files a later
//! `DiskTable::load` discovers.
//!
//! Every broadcast is a numbered round. Peers echo the round in their
//! acknowledgement, so a late ack from an abandoned round never counts
//! toward a newer barrier.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Mutex, RwLock};

use crate::error::{Result, TableError};
use crate::protocol::{decode_message, encode_message, Message, MessageKind};
use crate::record::{Batch, PeerId, TableId};
use crate::storage::{decode_batch, encode_batch, BlockWriter};

use super::Dispatcher;

/// Default bound on how long a broadcast waits for acknowledgements
const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(30);

/// Round number carried by data frames
const DATA_ROUND: u64 = 0;

/// One delivered message, for inspection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchRecord {
    pub peer: PeerId,
    pub kind: MessageKind,
    pub table: TableId,
    pub block_number: u64,
    pub records: usize,
}

/// Table name registry shared by every peer
type TableRegistry = Arc<RwLock<HashMap<TableId, String>>>;

/// A frame tagged with the broadcast round it belongs to
type Envelope = (u64, Bytes);

/// In-process cluster implementing `Dispatcher`
pub struct LoopbackDispatcher {
    /// One inbox per peer
    peers: Vec<PeerHandle>,
    /// Acknowledgements from every peer
    acks: Receiver<Envelope>,
    /// Bound on a broadcast's wait
    ack_timeout: Duration,
    /// Table id → block file prefix
    tables: TableRegistry,
    /// Messages accepted by `send`, in order; only kept when enabled
    log: Option<Mutex<Vec<DispatchRecord>>>,
    /// Last broadcast round issued
    round: AtomicU64,
    /// One broadcast at a time
    broadcast_lock: Mutex<()>,
}

struct PeerHandle {
    inbox: Mutex<Option<Sender<Envelope>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl LoopbackDispatcher {
    /// Start `peer_count` table servers writing into `data_dir`
    pub fn new(peer_count: usize, data_dir: &Path) -> Result<Self> {
        if peer_count == 0 {
            return Err(TableError::Config(
                "loopback cluster needs at least one peer".into(),
            ));
        }
        std::fs::create_dir_all(data_dir)?;

        let tables: TableRegistry = Arc::new(RwLock::new(HashMap::new()));
        let (ack_tx, ack_rx) = channel::unbounded();

        let mut peers = Vec::with_capacity(peer_count);
        for peer in 0..peer_count {
            let (inbox_tx, inbox_rx) = channel::unbounded::<Envelope>();
            let server = TableServer {
                peer,
                data_dir: data_dir.to_path_buf(),
                tables: Arc::clone(&tables),
                writers: HashMap::new(),
                failure: None,
                acks: ack_tx.clone(),
            };
            let thread = thread::Builder::new()
                .name(format!("loopback-peer-{}", peer))
                .spawn(move || server.run(inbox_rx))?;
            peers.push(PeerHandle {
                inbox: Mutex::new(Some(inbox_tx)),
                thread: Mutex::new(Some(thread)),
            });
        }

        tracing::debug!(
            "Started loopback cluster of {} peers in {}",
            peer_count,
            data_dir.display()
        );

        Ok(Self {
            peers,
            acks: ack_rx,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            tables,
            log: None,
            round: AtomicU64::new(DATA_ROUND),
            broadcast_lock: Mutex::new(()),
        })
    }

    /// Set the broadcast acknowledgement timeout
    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    /// Keep a record of every message accepted by `send`
    pub fn with_dispatch_log(mut self) -> Self {
        self.log = Some(Mutex::new(Vec::new()));
        self
    }

    /// Tell every peer which file prefix a table's blocks use
    pub fn register_table(&self, table: TableId, prefix: impl Into<String>) {
        self.tables.write().insert(table, prefix.into());
    }

    /// Stop one peer, as if its server had gone away
    pub fn disconnect(&self, peer: PeerId) {
        let Some(handle) = self.peers.get(peer) else {
            return;
        };
        handle.inbox.lock().take();
        if let Some(thread) = handle.thread.lock().take() {
            let _ = thread.join();
        }
        tracing::debug!("Loopback peer {} disconnected", peer);
    }

    /// Messages accepted by `send` so far; empty unless the log is enabled
    pub fn dispatched(&self) -> Vec<DispatchRecord> {
        match &self.log {
            Some(log) => log.lock().clone(),
            None => Vec::new(),
        }
    }

    fn deliver(&self, peer: PeerId, envelope: Envelope) -> Result<()> {
        let handle = self.peers.get(peer).ok_or_else(|| TableError::Dispatch {
            peer,
            reason: format!("unknown peer (cluster has {})", self.peers.len()),
        })?;
        let inbox = handle.inbox.lock();
        let sender = inbox.as_ref().ok_or_else(|| TableError::Dispatch {
            peer,
            reason: "peer is disconnected".into(),
        })?;
        sender.send(envelope).map_err(|_| TableError::Dispatch {
            peer,
            reason: "peer inbox closed".into(),
        })
    }
}

impl Dispatcher for LoopbackDispatcher {
    fn peer_count(&self) -> usize {
        self.peers.len()
    }

    fn send(&self, peer: PeerId, kind: MessageKind, batch: &Batch) -> Result<()> {
        let payload = encode_batch(batch)?;
        let frame = encode_message(&Message::new(kind, payload));
        self.deliver(peer, (DATA_ROUND, frame))?;

        if let Some(log) = &self.log {
            log.lock().push(DispatchRecord {
                peer,
                kind,
                table: batch.table,
                block_number: batch.block_number,
                records: batch.len(),
            });
        }
        Ok(())
    }

    fn broadcast(&self, request: MessageKind, ack: MessageKind, payload: &[u8]) -> Result<()> {
        let _guard = self.broadcast_lock.lock();
        let round = self.round.fetch_add(1, Ordering::AcqRel) + 1;

        let frame = encode_message(&Message::new(request, Bytes::copy_from_slice(payload)));
        for peer in 0..self.peers.len() {
            self.deliver(peer, (round, frame.clone()))
                .map_err(|e| TableError::Broadcast(e.to_string()))?;
        }

        let deadline = Instant::now() + self.ack_timeout;
        collect_acks(&self.acks, round, ack, self.peers.len(), deadline)?;

        tracing::debug!(
            "Broadcast {:?} round {} acknowledged by {} peers",
            request,
            round,
            self.peers.len()
        );
        Ok(())
    }
}

impl Drop for LoopbackDispatcher {
    fn drop(&mut self) {
        for handle in &self.peers {
            handle.inbox.lock().take();
        }
        for handle in &self.peers {
            if let Some(thread) = handle.thread.lock().take() {
                let _ = thread.join();
            }
        }
    }
}

/// Wait until `peer_count` distinct peers acknowledge `round`
///
/// Acks from other rounds and repeated acks from one peer are ignored.
/// Failures reported by peers are joined into one broadcast error.
fn collect_acks(
    acks: &Receiver<Envelope>,
    round: u64,
    ack: MessageKind,
    peer_count: usize,
    deadline: Instant,
) -> Result<()> {
    let mut acked = HashSet::with_capacity(peer_count);
    let mut failures = Vec::new();

    while acked.len() < peer_count {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let (ack_round, frame) = match acks.recv_timeout(remaining) {
            Ok(envelope) => envelope,
            Err(RecvTimeoutError::Timeout) => {
                return Err(TableError::Broadcast(format!(
                    "timed out after {} of {} acknowledgements",
                    acked.len(),
                    peer_count
                )))
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(TableError::Broadcast(
                    "acknowledgement channel closed".into(),
                ))
            }
        };

        if ack_round != round {
            tracing::debug!("Ignoring acknowledgement from round {}", ack_round);
            continue;
        }

        let message = decode_message(&frame)?;
        if message.kind != ack {
            return Err(TableError::Protocol(format!(
                "Expected {:?} acknowledgement, got {:?}",
                ack, message.kind
            )));
        }
        let (peer, failure) = message.parse_done()?;
        if !acked.insert(peer) {
            tracing::debug!("Ignoring repeated acknowledgement from peer {}", peer);
            continue;
        }
        if let Some(reason) = failure {
            failures.push(format!("peer {}: {}", peer, reason));
        }
    }

    if !failures.is_empty() {
        return Err(TableError::Broadcast(failures.join("; ")));
    }
    Ok(())
}

// =============================================================================
// Peer Side
// =============================================================================

/// Receiving end of one loopback peer
struct TableServer {
    peer: PeerId,
    data_dir: PathBuf,
    tables: TableRegistry,
    /// One block writer per table this peer has received data for
    writers: HashMap<TableId, BlockWriter>,
    /// First failure since the last acknowledgement
    failure: Option<String>,
    acks: Sender<Envelope>,
}

impl TableServer {
    fn run(mut self, inbox: Receiver<Envelope>) {
        for (round, frame) in inbox.iter() {
            self.handle(round, &frame);
        }
        if let Err(e) = self.sync_all() {
            tracing::warn!("Peer {} failed to sync on shutdown: {}", self.peer, e);
        }
    }

    fn handle(&mut self, round: u64, frame: &[u8]) {
        let message = match decode_message(frame) {
            Ok(message) => message,
            Err(e) => return self.record_failure(e),
        };

        match message.kind {
            MessageKind::DataPutRequest => {
                if let Err(e) = self.store(&message.payload) {
                    self.record_failure(e);
                }
            }
            MessageKind::DataPutRequestFinish => {
                if let Err(e) = self.sync_all() {
                    self.record_failure(e);
                }
                let failure = self.failure.take();
                let ack = Message::done(self.peer as u32, failure.as_deref());
                // The broadcaster may have given up already
                let _ = self.acks.send((round, encode_message(&ack)));
            }
            MessageKind::DataPutRequestDone => self.record_failure(TableError::Protocol(
                "table server received an acknowledgement".into(),
            )),
        }
    }

    fn store(&mut self, payload: &[u8]) -> Result<()> {
        let batch = decode_batch(payload)?;
        if !self.writers.contains_key(&batch.table) {
            let prefix = self.tables.read().get(&batch.table).cloned().ok_or_else(|| {
                TableError::InvalidState(format!("table {} is not registered", batch.table))
            })?;
            let writer = BlockWriter::new(&self.data_dir, prefix)?;
            self.writers.insert(batch.table, writer);
        }

        match self.writers.get_mut(&batch.table) {
            Some(writer) => writer.write(&batch),
            None => Err(TableError::InvalidState("block writer missing".into())),
        }
    }

    fn sync_all(&mut self) -> Result<()> {
        for writer in self.writers.values_mut() {
            writer.sync()?;
        }
        Ok(())
    }

    fn record_failure(&mut self, err: TableError) {
        tracing::warn!("Peer {} failed to handle message: {}", self.peer, err);
        if self.failure.is_none() {
            self.failure = Some(err.to_string());
        }
    }
}
