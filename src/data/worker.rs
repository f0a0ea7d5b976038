use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use sha1::{Digest, Sha1};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::config::Config;
use crate::piece::PieceLayout;
use crate::protocol::BlockRequest;
use crate::storage::{Storage, StorageError};

/// Result of a block write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The block was persisted; the piece still has blocks outstanding.
    BlockWritten,
    /// The block completed its piece and the piece hash matched.
    Verified(u32),
    /// The block completed its piece but the piece hash did not match.
    /// Recoverable: the written record is discarded so the piece can be
    /// fetched again from scratch.
    VerificationFailed(u32),
}

enum Task {
    Read {
        request: BlockRequest,
        tx: oneshot::Sender<Result<Bytes, StorageError>>,
    },
    Write {
        piece: u32,
        offset: u32,
        data: Bytes,
        tx: oneshot::Sender<Result<WriteOutcome, StorageError>>,
    },
}

struct Shared<S> {
    storage: Arc<S>,
    layout: PieceLayout,
    /// Block offsets persisted per incomplete piece. Cleared when the piece
    /// verifies or fails verification.
    written: Mutex<HashMap<u32, HashSet<u32>>>,
}

/// A bounded pool of tasks that performs all storage access for one torrent.
///
/// Tasks are routed to a worker by piece index, so operations on the same
/// piece are processed in submission order while different pieces proceed in
/// parallel. When a write completes the last outstanding block of a piece,
/// the worker reads the piece back, hashes it, and reports `Verified` or
/// `VerificationFailed` through the submitter's completion channel.
pub struct DataWorker<S: Storage> {
    shared: Arc<Shared<S>>,
    queues: Mutex<Vec<mpsc::Sender<Task>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl<S: Storage> DataWorker<S> {
    pub fn new(storage: Arc<S>, layout: PieceLayout, config: &Config) -> Self {
        let shared = Arc::new(Shared {
            storage,
            layout,
            written: Mutex::new(HashMap::new()),
        });

        let workers = config.io_workers.max(1);
        let mut queues = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let (tx, rx) = mpsc::channel(config.io_queue_depth);
            queues.push(tx);
            handles.push(tokio::spawn(worker_loop(shared.clone(), rx)));
        }

        Self {
            shared,
            queues: Mutex::new(queues),
            handles: Mutex::new(handles),
        }
    }

    /// Queues a block read, e.g. to answer a peer's request. The receiver
    /// resolves when the read completes; a closed queue resolves to
    /// [`StorageError::QueueClosed`].
    pub async fn submit_read(
        &self,
        request: BlockRequest,
    ) -> oneshot::Receiver<Result<Bytes, StorageError>> {
        let (tx, rx) = oneshot::channel();
        let Some(queue) = self.queue_for(request.piece) else {
            let _ = tx.send(Err(StorageError::QueueClosed));
            return rx;
        };
        if let Err(rejected) = queue.send(Task::Read { request, tx }).await {
            if let Task::Read { tx, .. } = rejected.0 {
                let _ = tx.send(Err(StorageError::QueueClosed));
            }
        }
        rx
    }

    /// Queues a block write from a received piece message. The receiver
    /// resolves to the write outcome, including the verification result when
    /// this block completes its piece.
    pub async fn submit_write(
        &self,
        piece: u32,
        offset: u32,
        data: Bytes,
    ) -> oneshot::Receiver<Result<WriteOutcome, StorageError>> {
        let (tx, rx) = oneshot::channel();
        let Some(queue) = self.queue_for(piece) else {
            let _ = tx.send(Err(StorageError::QueueClosed));
            return rx;
        };
        if let Err(rejected) = queue.send(Task::Write {
            piece,
            offset,
            data,
            tx,
        }).await
        {
            if let Task::Write { tx, .. } = rejected.0 {
                let _ = tx.send(Err(StorageError::QueueClosed));
            }
        }
        rx
    }

    /// Forgets any partially written blocks for a piece, so a future
    /// download starts from an empty record.
    pub fn discard_partial(&self, piece: u32) {
        self.shared.written.lock().remove(&piece);
    }

    /// Closes the queues and waits for in-flight tasks to drain. Callable
    /// through a shared handle; later submissions resolve to
    /// [`StorageError::QueueClosed`].
    pub async fn shutdown(&self) {
        self.queues.lock().clear();
        let handles = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            let _ = handle.await;
        }
    }

    fn queue_for(&self, piece: u32) -> Option<mpsc::Sender<Task>> {
        let queues = self.queues.lock();
        if queues.is_empty() {
            return None;
        }
        Some(queues[piece as usize % queues.len()].clone())
    }
}

async fn worker_loop<S: Storage>(shared: Arc<Shared<S>>, mut rx: mpsc::Receiver<Task>) {
    while let Some(task) = rx.recv().await {
        match task {
            Task::Read { request, tx } => {
                let result = shared
                    .storage
                    .read(request.piece, request.offset, request.length)
                    .await;
                let _ = tx.send(result);
            }
            Task::Write {
                piece,
                offset,
                data,
                tx,
            } => {
                let result = handle_write(&shared, piece, offset, data).await;
                let _ = tx.send(result);
            }
        }
    }
}

async fn handle_write<S: Storage>(
    shared: &Shared<S>,
    piece: u32,
    offset: u32,
    data: Bytes,
) -> Result<WriteOutcome, StorageError> {
    shared.storage.write(piece, offset, data).await?;

    let complete = {
        let mut written = shared.written.lock();
        let record = written.entry(piece).or_default();
        record.insert(offset);
        record.len() as u32 >= shared.layout.block_count(piece)
    };
    if !complete {
        trace!(piece, offset, "block written");
        return Ok(WriteOutcome::BlockWritten);
    }

    let length = shared.layout.piece_length_of(piece) as u32;
    let content = shared.storage.read(piece, 0, length).await?;
    let expected = shared.storage.piece_hash(piece)?;
    let digest = Sha1::digest(&content);

    // Whichever way verification goes, the piece's write record is done.
    shared.written.lock().remove(&piece);

    if digest.as_slice() == expected {
        debug!(piece, "piece verified");
        Ok(WriteOutcome::Verified(piece))
    } else {
        warn!(piece, "piece failed verification, discarding");
        Ok(WriteOutcome::VerificationFailed(piece))
    }
}
