use std::collections::HashMap;

use parking_lot::RwLock;

use super::bitfield::Bitfield;
use super::error::PieceError;
use crate::peer::PeerId;

/// Aggregate piece rarity derived from the remote bitfields of all currently
/// tracked peers.
///
/// For every piece the counter equals the number of tracked peers whose
/// last-known bitfield marks it possessed. The per-peer bitfields are
/// retained so a disconnect decrements exactly what that peer contributed.
#[derive(Debug)]
pub struct PieceStatistics {
    piece_count: u32,
    inner: RwLock<Inner>,
}

#[derive(Debug)]
struct Inner {
    counts: Vec<u32>,
    peers: HashMap<PeerId, Bitfield>,
}

impl PieceStatistics {
    pub fn new(piece_count: u32) -> Self {
        Self {
            piece_count,
            inner: RwLock::new(Inner {
                counts: vec![0; piece_count as usize],
                peers: HashMap::new(),
            }),
        }
    }

    pub fn piece_count(&self) -> u32 {
        self.piece_count
    }

    /// Absorbs a peer's full bitfield. A previous bitfield from the same
    /// peer is subtracted first, so re-announcing never double counts.
    pub fn add_peer_bitfield(&self, peer: PeerId, bitfield: Bitfield) {
        let mut inner = self.inner.write();
        if let Some(old) = inner.peers.remove(&peer) {
            subtract(&mut inner.counts, &old);
        }
        add(&mut inner.counts, &bitfield);
        inner.peers.insert(peer, bitfield);
    }

    /// Records a single have-message from a peer. A peer seen for the first
    /// time through a have starts from an empty bitfield.
    pub fn add_peer_have(&self, peer: PeerId, piece: u32) -> Result<(), PieceError> {
        if piece >= self.piece_count {
            return Err(PieceError::InvalidPieceIndex(piece));
        }
        let piece_count = self.piece_count as usize;
        let mut inner = self.inner.write();
        let inner = &mut *inner;
        let bitfield = inner
            .peers
            .entry(peer)
            .or_insert_with(|| Bitfield::new(piece_count));
        if !bitfield.has_piece(piece) {
            bitfield.set_piece(piece);
            inner.counts[piece as usize] += 1;
        }
        Ok(())
    }

    /// Removes a disconnected peer's contribution from every counter.
    pub fn remove_peer(&self, peer: PeerId) {
        let mut inner = self.inner.write();
        if let Some(bitfield) = inner.peers.remove(&peer) {
            subtract(&mut inner.counts, &bitfield);
        }
    }

    /// Number of tracked peers known to possess the given piece.
    pub fn peer_count_for(&self, piece: u32) -> u32 {
        self.inner
            .read()
            .counts
            .get(piece as usize)
            .copied()
            .unwrap_or(0)
    }

    /// Whether the given peer's last-known bitfield marks the piece possessed.
    pub fn peer_has(&self, peer: PeerId, piece: u32) -> bool {
        self.inner
            .read()
            .peers
            .get(&peer)
            .is_some_and(|bf| bf.has_piece(piece))
    }

    pub fn tracked_peers(&self) -> usize {
        self.inner.read().peers.len()
    }

    /// A point-in-time copy of all rarity counters, indexed by piece.
    pub fn rarity_snapshot(&self) -> Vec<u32> {
        self.inner.read().counts.clone()
    }
}

fn add(counts: &mut [u32], bitfield: &Bitfield) {
    for piece in 0..counts.len() as u32 {
        if bitfield.has_piece(piece) {
            counts[piece as usize] += 1;
        }
    }
}

fn subtract(counts: &mut [u32], bitfield: &Bitfield) {
    for piece in 0..counts.len() as u32 {
        if bitfield.has_piece(piece) {
            counts[piece as usize] -= 1;
        }
    }
}
