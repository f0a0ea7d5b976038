use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use super::error::ProtocolError;
use crate::data::{DataWorker, WriteOutcome};
use crate::peer::PeerContext;
use crate::piece::{Assignments, Bitfield, OwnBitfield, PieceStatistics};
use crate::protocol::{Block, BlockRequest, Message};
use crate::storage::Storage;

/// Protocol-level housekeeping: choke and interest flags, keepalives.
/// Touches no piece state.
#[derive(Debug, Default)]
pub struct GenericConsumer;

impl GenericConsumer {
    pub fn consume(&self, ctx: &mut PeerContext, message: &Message) {
        match message {
            Message::KeepAlive => {}
            Message::Choke => ctx.choking.peer_choking = true,
            Message::Unchoke => ctx.choking.peer_choking = false,
            Message::Interested => ctx.choking.peer_interested = true,
            Message::NotInterested => ctx.choking.peer_interested = false,
            _ => {}
        }
    }
}

/// Ingests peers' bitfield and have messages into the rarity statistics.
pub struct BitfieldConsumer {
    statistics: Arc<PieceStatistics>,
}

impl BitfieldConsumer {
    pub fn new(statistics: Arc<PieceStatistics>) -> Self {
        Self { statistics }
    }

    pub fn consume_bitfield(&self, ctx: &PeerContext, bits: bytes::Bytes) {
        let bitfield = Bitfield::from_bytes(bits, self.statistics.piece_count() as usize);
        trace!(peer = %ctx.peer_id, pieces = bitfield.count(), "peer bitfield absorbed");
        self.statistics.add_peer_bitfield(ctx.peer_id, bitfield);
    }

    pub fn consume_have(&self, ctx: &PeerContext, piece: u32) -> Result<(), ProtocolError> {
        self.statistics
            .add_peer_have(ctx.peer_id, piece)
            .map_err(|err| {
                warn!(peer = %ctx.peer_id, piece, "have for out-of-range piece");
                err.into()
            })
    }
}

/// Ingests received blocks: validates them against the assignment ledger,
/// dispatches the write, and applies the verification outcome when it
/// arrives.
pub struct PieceConsumer<S: Storage> {
    own: Arc<OwnBitfield>,
    assignments: Arc<Assignments>,
    worker: Arc<DataWorker<S>>,
}

impl<S: Storage> PieceConsumer<S> {
    pub fn new(
        own: Arc<OwnBitfield>,
        assignments: Arc<Assignments>,
        worker: Arc<DataWorker<S>>,
    ) -> Self {
        Self {
            own,
            assignments,
            worker,
        }
    }

    pub async fn consume(
        &self,
        ctx: &PeerContext,
        block: Block,
        outbound: &mpsc::Sender<Message>,
    ) -> Result<(), ProtocolError> {
        let remaining = self
            .assignments
            .record_block_received(ctx.peer_id, block.piece, block.offset)
            .map_err(|err| {
                warn!(peer = %ctx.peer_id, %err, "rejected block");
                err
            })?;
        trace!(
            piece = block.piece,
            offset = block.offset,
            remaining,
            "block accepted"
        );

        let piece = block.piece;
        let rx = self
            .worker
            .submit_write(block.piece, block.offset, block.data)
            .await;

        // The completion runs on its own task so this peer's message loop is
        // never suspended on disk latency. State updates stay valid even if
        // the peer disconnects before the write lands.
        let own = Arc::clone(&self.own);
        let assignments = Arc::clone(&self.assignments);
        let worker = Arc::clone(&self.worker);
        let outbound = outbound.clone();
        tokio::spawn(async move {
            match rx.await {
                Ok(Ok(WriteOutcome::BlockWritten)) => {}
                Ok(Ok(WriteOutcome::Verified(piece))) => {
                    if let Err(err) = own.mark_verified(piece) {
                        warn!(piece, %err, "could not mark verified piece");
                    }
                    assignments.release(piece);
                    let _ = outbound.send(Message::Have { piece }).await;
                }
                Ok(Ok(WriteOutcome::VerificationFailed(piece))) => {
                    // Expected with corrupt or malicious peers: the piece
                    // goes back to the candidate pool.
                    assignments.release(piece);
                }
                Ok(Err(err)) => {
                    warn!(piece, %err, "block write failed, releasing assignment");
                    worker.discard_partial(piece);
                    assignments.release(piece);
                }
                Err(_) => {}
            }
        });

        Ok(())
    }
}

/// Serves peers' block requests from verified local pieces.
pub struct PeerRequestConsumer<S: Storage> {
    own: Arc<OwnBitfield>,
    worker: Arc<DataWorker<S>>,
    max_request_length: u32,
}

impl<S: Storage> PeerRequestConsumer<S> {
    pub fn new(own: Arc<OwnBitfield>, worker: Arc<DataWorker<S>>, max_request_length: u32) -> Self {
        Self {
            own,
            worker,
            max_request_length,
        }
    }

    pub async fn consume(
        &self,
        ctx: &PeerContext,
        request: BlockRequest,
        outbound: &mpsc::Sender<Message>,
    ) -> Result<(), ProtocolError> {
        if request.length > self.max_request_length {
            warn!(peer = %ctx.peer_id, length = request.length, "oversized request");
            return Err(ProtocolError::RequestTooLarge(request.length));
        }
        if !self.own.is_verified(request.piece) {
            warn!(peer = %ctx.peer_id, piece = request.piece, "request for unavailable piece");
            return Err(ProtocolError::PieceNotAvailable(request.piece));
        }

        let rx = self.worker.submit_read(request).await;
        let outbound = outbound.clone();
        tokio::spawn(async move {
            match rx.await {
                Ok(Ok(data)) => {
                    let _ = outbound
                        .send(Message::Piece {
                            piece: request.piece,
                            offset: request.offset,
                            data,
                        })
                        .await;
                }
                Ok(Err(err)) => {
                    // No response: the peer will re-request or time out.
                    debug!(piece = request.piece, %err, "read failed, dropping response");
                }
                Err(_) => {}
            }
        });

        Ok(())
    }
}
