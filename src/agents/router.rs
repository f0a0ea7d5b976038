use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::consumers::{BitfieldConsumer, GenericConsumer, PeerRequestConsumer, PieceConsumer};
use super::error::ProtocolError;
use super::producers::{MetadataProducer, RequestProducer};
use crate::config::Config;
use crate::data::DataWorker;
use crate::peer::{PeerContext, PeerId};
use crate::piece::{Assignments, OwnBitfield, PieceStatistics, ValidatingSelector};
use crate::protocol::{Block, BlockRequest, Message};
use crate::storage::Storage;

/// Binds the full agent set to one torrent's shared state and dispatches
/// messages by kind.
///
/// One router per torrent, shared by all of its peer-processing tasks;
/// per-peer state travels in the [`PeerContext`] each call.
pub struct MessageRouter<S: Storage> {
    generic: GenericConsumer,
    bitfield: BitfieldConsumer,
    piece: PieceConsumer<S>,
    request: PeerRequestConsumer<S>,
    producer: RequestProducer,
    metadata: MetadataProducer,
    statistics: Arc<PieceStatistics>,
    assignments: Arc<Assignments>,
    worker: Arc<DataWorker<S>>,
}

impl<S: Storage> MessageRouter<S> {
    pub fn new(
        own: Arc<OwnBitfield>,
        statistics: Arc<PieceStatistics>,
        assignments: Arc<Assignments>,
        selector: ValidatingSelector,
        worker: Arc<DataWorker<S>>,
        metadata: Option<Bytes>,
        config: &Config,
    ) -> Self {
        Self {
            generic: GenericConsumer,
            bitfield: BitfieldConsumer::new(Arc::clone(&statistics)),
            piece: PieceConsumer::new(
                Arc::clone(&own),
                Arc::clone(&assignments),
                Arc::clone(&worker),
            ),
            request: PeerRequestConsumer::new(own, Arc::clone(&worker), config.max_request_length),
            producer: RequestProducer::new(
                selector,
                Arc::clone(&statistics),
                Arc::clone(&assignments),
                config.request_pipeline_depth,
            ),
            metadata: MetadataProducer::new(metadata),
            statistics,
            assignments,
            worker,
        }
    }

    /// Routes one inbound message to its consumer.
    pub async fn consume(
        &self,
        ctx: &mut PeerContext,
        message: Message,
        outbound: &mpsc::Sender<Message>,
    ) -> Result<(), ProtocolError> {
        ctx.last_message_at = Instant::now();
        match message {
            Message::KeepAlive
            | Message::Choke
            | Message::Unchoke
            | Message::Interested
            | Message::NotInterested => {
                self.generic.consume(ctx, &message);
                Ok(())
            }
            Message::Bitfield(bits) => {
                self.bitfield.consume_bitfield(ctx, bits);
                Ok(())
            }
            Message::Have { piece } => self.bitfield.consume_have(ctx, piece),
            Message::Piece {
                piece,
                offset,
                data,
            } => {
                self.piece
                    .consume(ctx, Block::new(piece, offset, data), outbound)
                    .await
            }
            Message::Request {
                piece,
                offset,
                length,
            } => {
                self.request
                    .consume(ctx, BlockRequest::new(piece, offset, length), outbound)
                    .await
            }
            Message::Cancel { piece, offset, .. } => {
                // Queued reads are not cancelled; the response is cheap and
                // the peer simply drops it.
                trace!(piece, offset, "cancel ignored");
                Ok(())
            }
            Message::Metadata(message) => {
                self.metadata.consume(&message, outbound).await;
                Ok(())
            }
        }
    }

    /// One produce pass for a peer: emits interest and block requests.
    pub async fn produce(&self, ctx: &mut PeerContext, outbound: &mpsc::Sender<Message>) {
        self.producer.produce(ctx, outbound).await;
    }

    /// Cancellation on disconnect: the peer's rarity contribution is
    /// removed, its assignments are released for reselection, and the
    /// released pieces' partial-write records are dropped so a replacement
    /// peer's worklist and the worker agree on what is outstanding.
    pub fn disconnect(&self, peer: PeerId) {
        self.statistics.remove_peer(peer);
        let released = self.assignments.remove_peer(peer);
        for &piece in &released {
            self.worker.discard_partial(piece);
        }
        if !released.is_empty() {
            debug!(%peer, ?released, "released assignments on disconnect");
        }
    }

    /// Periodic liveness tick: releases assignments without recent block
    /// progress, dropping their partial-write records. Returns the pieces
    /// that became reselectable.
    pub fn release_stalled(&self) -> Vec<u32> {
        let released = self.assignments.release_stalled();
        for &piece in &released {
            self.worker.discard_partial(piece);
        }
        released
    }
}
