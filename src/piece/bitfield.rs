use bytes::Bytes;
use parking_lot::RwLock;

use super::error::PieceError;

/// A bitfield representing which pieces a holder possesses.
///
/// Each bit represents whether a piece is available (1) or not (0).
/// Bits are numbered from the high bit of the first byte.
#[derive(Debug, Clone)]
pub struct Bitfield {
    bits: Vec<u8>,
    piece_count: usize,
}

impl Bitfield {
    /// Creates a new empty bitfield for the given number of pieces.
    pub fn new(piece_count: usize) -> Self {
        let byte_count = piece_count.div_ceil(8);
        Self {
            bits: vec![0; byte_count],
            piece_count,
        }
    }

    /// Creates a bitfield from raw bytes, as received in a peer's bitfield
    /// message. Short payloads are padded with zeros; spare bits beyond the
    /// piece count are cleared.
    pub fn from_bytes(bytes: Bytes, piece_count: usize) -> Self {
        let mut bits = bytes.to_vec();
        let expected_bytes = piece_count.div_ceil(8);

        if bits.len() < expected_bytes {
            bits.resize(expected_bytes, 0);
        }
        bits.truncate(expected_bytes);

        let mut bf = Self { bits, piece_count };
        bf.clear_spare_bits();
        bf
    }

    /// Creates a full bitfield (all pieces possessed).
    pub fn full(piece_count: usize) -> Self {
        let byte_count = piece_count.div_ceil(8);
        let mut bf = Self {
            bits: vec![0xFF; byte_count],
            piece_count,
        };
        bf.clear_spare_bits();
        bf
    }

    /// Returns true if the piece at the given index is possessed.
    pub fn has_piece(&self, index: u32) -> bool {
        let index = index as usize;
        if index >= self.piece_count {
            return false;
        }
        let byte_index = index / 8;
        let bit_index = 7 - (index % 8);
        (self.bits[byte_index] >> bit_index) & 1 == 1
    }

    /// Sets the bit for the piece at the given index.
    pub fn set_piece(&mut self, index: u32) {
        let index = index as usize;
        if index >= self.piece_count {
            return;
        }
        let byte_index = index / 8;
        let bit_index = 7 - (index % 8);
        self.bits[byte_index] |= 1 << bit_index;
    }

    /// Returns the number of possessed pieces.
    pub fn count(&self) -> u32 {
        self.bits.iter().map(|b| b.count_ones()).sum()
    }

    /// Returns true if all pieces are possessed.
    pub fn is_complete(&self) -> bool {
        self.count() as usize == self.piece_count
    }

    /// Returns true if no pieces are possessed.
    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|&b| b == 0)
    }

    /// Returns the total number of pieces.
    pub fn piece_count(&self) -> usize {
        self.piece_count
    }

    /// Returns the raw bytes of the bitfield.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }

    /// Converts the bitfield to owned bytes suitable for a bitfield message.
    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.bits)
    }

    /// Clears any spare bits in the last byte that don't correspond to pieces.
    fn clear_spare_bits(&mut self) {
        let spare = (self.bits.len() * 8) - self.piece_count;
        if spare > 0 && spare < 8 && !self.bits.is_empty() {
            let mask = 0xFFu8 << spare;
            let last = self.bits.len() - 1;
            self.bits[last] &= mask;
        }
    }
}

/// The local session's bitfield, with verified-only semantics.
///
/// Unlike a remote peer's [`Bitfield`], local possession is monotone: a bit
/// is set only after a piece passed hash verification and is never cleared.
/// The structure is shared across peer-processing tasks, so mutation goes
/// through a short internal lock.
#[derive(Debug)]
pub struct OwnBitfield {
    bits: RwLock<Bitfield>,
}

impl OwnBitfield {
    pub fn new(piece_count: u32) -> Self {
        Self {
            bits: RwLock::new(Bitfield::new(piece_count as usize)),
        }
    }

    /// Marks a piece as verified. Idempotent: returns `true` if the piece
    /// was newly marked, `false` if it was already verified.
    pub fn mark_verified(&self, piece: u32) -> Result<bool, PieceError> {
        let mut bits = self.bits.write();
        if piece as usize >= bits.piece_count() {
            return Err(PieceError::InvalidPieceIndex(piece));
        }
        if bits.has_piece(piece) {
            return Ok(false);
        }
        bits.set_piece(piece);
        Ok(true)
    }

    pub fn is_verified(&self, piece: u32) -> bool {
        self.bits.read().has_piece(piece)
    }

    /// Number of locally verified pieces.
    pub fn possessed_count(&self) -> u32 {
        self.bits.read().count()
    }

    pub fn piece_count(&self) -> u32 {
        self.bits.read().piece_count() as u32
    }

    pub fn is_complete(&self) -> bool {
        self.bits.read().is_complete()
    }

    /// A point-in-time copy, e.g. for announcing our bitfield to a peer.
    pub fn snapshot(&self) -> Bitfield {
        self.bits.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitfield_set_and_count() {
        let mut bf = Bitfield::new(100);
        assert!(!bf.has_piece(0));

        bf.set_piece(0);
        bf.set_piece(99);
        assert!(bf.has_piece(0));
        assert!(bf.has_piece(99));
        assert_eq!(bf.count(), 2);
        assert!(!bf.is_complete());
    }

    #[test]
    fn test_bitfield_from_bytes_clears_spare_bits() {
        // 10 pieces need 2 bytes; the low 6 bits of the second byte are spare
        let bf = Bitfield::from_bytes(Bytes::from_static(&[0xFF, 0xFF]), 10);
        assert_eq!(bf.count(), 10);
        assert!(bf.is_complete());
        assert_eq!(bf.as_bytes(), &[0xFF, 0xC0]);
    }

    #[test]
    fn test_bitfield_from_short_bytes() {
        let bf = Bitfield::from_bytes(Bytes::from_static(&[0x80]), 16);
        assert!(bf.has_piece(0));
        assert!(!bf.has_piece(8));
        assert_eq!(bf.count(), 1);
    }

    #[test]
    fn test_own_bitfield_mark_verified_is_idempotent() {
        let own = OwnBitfield::new(8);
        assert_eq!(own.mark_verified(3), Ok(true));
        assert_eq!(own.mark_verified(3), Ok(false));
        assert!(own.is_verified(3));
        assert_eq!(own.possessed_count(), 1);
    }

    #[test]
    fn test_own_bitfield_rejects_out_of_range() {
        let own = OwnBitfield::new(8);
        assert_eq!(own.mark_verified(8), Err(PieceError::InvalidPieceIndex(8)));
        assert!(!own.is_verified(8));
    }
}
