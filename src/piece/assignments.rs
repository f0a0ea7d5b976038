use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

use super::bitfield::OwnBitfield;
use super::error::PieceError;
use super::layout::PieceLayout;
use crate::config::Config;
use crate::peer::PeerId;
use crate::protocol::BlockRequest;

/// Why an assignment attempt was turned down. Not a session error: the
/// caller simply moves on to the next candidate piece.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AssignRejected {
    #[error("invalid piece index: {0}")]
    InvalidPiece(u32),

    #[error("piece {0} is already verified locally")]
    AlreadyVerified(u32),

    #[error("piece {0} is assigned to another peer")]
    AssignedElsewhere(u32),

    #[error("peer {0} is at its assignment capacity")]
    PeerAtCapacity(PeerId),
}

/// A successful reservation of a piece for a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignment {
    pub piece: u32,
    pub peer: PeerId,
    /// Blocks of the piece not yet received.
    pub remaining_blocks: usize,
}

#[derive(Debug)]
struct PieceAssignment {
    /// Peers fetching this piece. More than one only under endgame
    /// duplication.
    peers: Vec<PeerId>,
    /// Block offsets not yet received.
    remaining: BTreeSet<u32>,
    /// Per peer, the offsets already handed out as wire requests.
    requested: HashMap<PeerId, BTreeSet<u32>>,
    last_progress: Instant,
}

/// The work-distribution ledger: single source of truth for which peer is
/// fetching which piece, and which of its blocks are still outstanding.
///
/// All operations take one short internal lock, so concurrent assignment
/// attempts are first-committer-wins: two peers racing for the same piece
/// see exactly one success.
pub struct Assignments {
    own: Arc<OwnBitfield>,
    layout: PieceLayout,
    timeout: Duration,
    endgame_enabled: bool,
    endgame_threshold: usize,
    max_pieces_per_peer: usize,
    pieces: Mutex<HashMap<u32, PieceAssignment>>,
}

impl Assignments {
    pub fn new(own: Arc<OwnBitfield>, layout: PieceLayout, config: &Config) -> Self {
        Self {
            own,
            layout,
            timeout: config.assignment_timeout,
            endgame_enabled: config.endgame_enabled,
            endgame_threshold: config.endgame_threshold,
            max_pieces_per_peer: config.max_assigned_pieces_per_peer,
            pieces: Mutex::new(HashMap::new()),
        }
    }

    /// Reserves a piece for a peer and builds its block worklist.
    ///
    /// A piece already held by the same peer is returned as-is. A piece held
    /// by a different peer is rejected unless endgame duplication applies,
    /// in which case the peer joins the existing worklist.
    pub fn assign(&self, peer: PeerId, piece: u32) -> Result<Assignment, AssignRejected> {
        if !self.layout.is_valid_piece(piece) {
            return Err(AssignRejected::InvalidPiece(piece));
        }

        let mut pieces = self.pieces.lock();

        // Checked under the lock: a concurrent verification marks the piece
        // before releasing its entry, so an insert can never outlive it.
        if self.own.is_verified(piece) {
            return Err(AssignRejected::AlreadyVerified(piece));
        }

        match pieces.get(&piece) {
            Some(entry) if entry.peers.contains(&peer) => {
                return Ok(Assignment {
                    piece,
                    peer,
                    remaining_blocks: entry.remaining.len(),
                });
            }
            Some(_) if !self.endgame_active() => {
                return Err(AssignRejected::AssignedElsewhere(piece));
            }
            _ => {}
        }

        if held_by(&pieces, peer) >= self.max_pieces_per_peer {
            return Err(AssignRejected::PeerAtCapacity(peer));
        }

        if let Some(entry) = pieces.get_mut(&piece) {
            entry.peers.push(peer);
            debug!(piece, %peer, "endgame: duplicated assignment");
            return Ok(Assignment {
                piece,
                peer,
                remaining_blocks: entry.remaining.len(),
            });
        }

        let remaining: BTreeSet<u32> = self.layout.block_offsets(piece).collect();
        let remaining_blocks = remaining.len();
        pieces.insert(
            piece,
            PieceAssignment {
                peers: vec![peer],
                remaining,
                requested: HashMap::new(),
                last_progress: Instant::now(),
            },
        );
        Ok(Assignment {
            piece,
            peer,
            remaining_blocks,
        })
    }

    /// Hands out up to `max` block offsets the given peer has not yet been
    /// asked to request. Under endgame duplication the same offset may be
    /// handed to several peers; within one peer offsets are never repeated.
    pub fn take_blocks(&self, peer: PeerId, piece: u32, max: usize) -> Vec<BlockRequest> {
        let mut pieces = self.pieces.lock();
        let Some(entry) = pieces.get_mut(&piece) else {
            return Vec::new();
        };
        if !entry.peers.contains(&peer) {
            return Vec::new();
        }

        let already = entry.requested.entry(peer).or_default();
        let offsets: Vec<u32> = entry
            .remaining
            .iter()
            .copied()
            .filter(|offset| !already.contains(offset))
            .take(max)
            .collect();
        already.extend(offsets.iter().copied());

        offsets
            .into_iter()
            .map(|offset| BlockRequest {
                piece,
                offset,
                length: self.layout.block_length(piece, offset),
            })
            .collect()
    }

    /// Records a received block, returning the number of blocks still
    /// outstanding for the piece. Blocks for pieces not assigned to the
    /// sending peer, or offsets we never asked it for, are protocol
    /// violations.
    pub fn record_block_received(
        &self,
        peer: PeerId,
        piece: u32,
        offset: u32,
    ) -> Result<usize, PieceError> {
        let mut pieces = self.pieces.lock();
        let entry = pieces
            .get_mut(&piece)
            .filter(|entry| entry.peers.contains(&peer))
            .ok_or(PieceError::NotAssigned { piece, peer })?;

        let asked = entry
            .requested
            .get(&peer)
            .is_some_and(|set| set.contains(&offset));
        if !asked || !entry.remaining.remove(&offset) {
            return Err(PieceError::UnexpectedBlock { piece, offset });
        }

        for requested in entry.requested.values_mut() {
            requested.remove(&offset);
        }
        entry.last_progress = Instant::now();
        Ok(entry.remaining.len())
    }

    /// Drops the entry for a piece, making it reselectable.
    pub fn release(&self, piece: u32) {
        self.pieces.lock().remove(&piece);
    }

    /// Releases everything held by a disconnecting peer. Returns the pieces
    /// that became reselectable. Under endgame duplication a piece survives
    /// as long as another peer still holds it.
    pub fn remove_peer(&self, peer: PeerId) -> Vec<u32> {
        let mut pieces = self.pieces.lock();
        let mut released = Vec::new();
        pieces.retain(|&piece, entry| {
            entry.peers.retain(|p| *p != peer);
            entry.requested.remove(&peer);
            if entry.peers.is_empty() {
                released.push(piece);
                false
            } else {
                true
            }
        });
        released
    }

    /// Releases assignments with no block progress for the configured
    /// timeout. A liveness measure, not an error: the pieces simply re-enter
    /// the candidate pool.
    pub fn release_stalled(&self) -> Vec<u32> {
        let now = Instant::now();
        let mut pieces = self.pieces.lock();
        let mut released = Vec::new();
        pieces.retain(|&piece, entry| {
            if now.duration_since(entry.last_progress) >= self.timeout {
                released.push(piece);
                false
            } else {
                true
            }
        });
        if !released.is_empty() {
            debug!(?released, "released stalled assignments");
        }
        released
    }

    pub fn is_assigned(&self, piece: u32) -> bool {
        self.pieces.lock().contains_key(&piece)
    }

    /// Peers currently fetching the given piece.
    pub fn assigned_to(&self, piece: u32) -> Vec<PeerId> {
        self.pieces
            .lock()
            .get(&piece)
            .map(|entry| entry.peers.clone())
            .unwrap_or_default()
    }

    /// Pieces currently assigned to the given peer.
    pub fn pieces_for(&self, peer: PeerId) -> Vec<u32> {
        let pieces = self.pieces.lock();
        let mut held: Vec<u32> = pieces
            .iter()
            .filter(|(_, entry)| entry.peers.contains(&peer))
            .map(|(&piece, _)| piece)
            .collect();
        held.sort_unstable();
        held
    }

    pub fn assigned_count(&self) -> usize {
        self.pieces.lock().len()
    }

    /// Endgame duplication is allowed once at most `endgame_threshold`
    /// pieces are still missing locally.
    fn endgame_active(&self) -> bool {
        if !self.endgame_enabled {
            return false;
        }
        let missing = self.own.piece_count() - self.own.possessed_count();
        missing as usize <= self.endgame_threshold
    }
}

fn held_by(pieces: &HashMap<u32, PieceAssignment>, peer: PeerId) -> usize {
    pieces
        .values()
        .filter(|entry| entry.peers.contains(&peer))
        .count()
}
