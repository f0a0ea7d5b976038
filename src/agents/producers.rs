use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::trace;

use crate::constants::METADATA_PIECE_SIZE;
use crate::peer::PeerContext;
use crate::piece::{AssignRejected, Assignments, PieceSelector, PieceStatistics, ValidatingSelector};
use crate::protocol::{metadata_piece_count, metadata_piece_size, Message, MetadataMessage};

/// Emits outgoing block requests by consulting the selector and reserving
/// pieces in the assignment ledger against the peer's advertised bitfield.
pub struct RequestProducer {
    selector: ValidatingSelector,
    statistics: Arc<PieceStatistics>,
    assignments: Arc<Assignments>,
    pipeline_depth: usize,
}

impl RequestProducer {
    pub fn new(
        selector: ValidatingSelector,
        statistics: Arc<PieceStatistics>,
        assignments: Arc<Assignments>,
        pipeline_depth: usize,
    ) -> Self {
        Self {
            selector,
            statistics,
            assignments,
            pipeline_depth,
        }
    }

    /// One produce pass for a peer: express interest if it has pieces we
    /// want, top up its assignments, and emit requests for outstanding
    /// blocks.
    pub async fn produce(&self, ctx: &mut PeerContext, outbound: &mpsc::Sender<Message>) {
        let candidates: Vec<u32> = self
            .selector
            .select(&self.statistics)
            .into_iter()
            .filter(|&piece| self.statistics.peer_has(ctx.peer_id, piece))
            .collect();

        let held = self.assignments.pieces_for(ctx.peer_id);
        if candidates.is_empty() && held.is_empty() {
            return;
        }

        if !ctx.choking.am_interested {
            ctx.choking.am_interested = true;
            let _ = outbound.send(Message::Interested).await;
        }
        if ctx.choking.peer_choking {
            return;
        }

        for piece in candidates {
            match self.assignments.assign(ctx.peer_id, piece) {
                Ok(assignment) => {
                    trace!(peer = %ctx.peer_id, piece = assignment.piece, "piece assigned");
                }
                Err(AssignRejected::PeerAtCapacity(_)) => break,
                Err(_) => continue,
            }
        }

        for piece in self.assignments.pieces_for(ctx.peer_id) {
            for request in self
                .assignments
                .take_blocks(ctx.peer_id, piece, self.pipeline_depth)
            {
                let _ = outbound
                    .send(Message::Request {
                        piece: request.piece,
                        offset: request.offset,
                        length: request.length,
                    })
                    .await;
            }
        }
    }
}

/// Serves metadata-extension piece requests from the torrent's metadata
/// bytes. A no-op while metadata is not yet known.
pub struct MetadataProducer {
    metadata: Option<Bytes>,
}

impl MetadataProducer {
    pub fn new(metadata: Option<Bytes>) -> Self {
        Self { metadata }
    }

    pub async fn consume(&self, message: &MetadataMessage, outbound: &mpsc::Sender<Message>) {
        let MetadataMessage::Request { piece } = *message else {
            // Data/Reject are the fetching side's concern, not ours.
            return;
        };
        let Some(metadata) = &self.metadata else {
            trace!(piece, "metadata requested but not yet known");
            return;
        };

        let total = metadata.len();
        let reply = if piece as usize >= metadata_piece_count(total) {
            MetadataMessage::Reject { piece }
        } else {
            let start = piece as usize * METADATA_PIECE_SIZE;
            let size = metadata_piece_size(piece, total);
            MetadataMessage::Data {
                piece,
                total_size: total as u32,
                data: metadata.slice(start..start + size),
            }
        };
        let _ = outbound.send(Message::Metadata(reply)).await;
    }
}
