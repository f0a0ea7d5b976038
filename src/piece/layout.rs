use super::error::PieceError;

/// Geometry of a torrent's piece space.
///
/// Knows how the content splits into pieces and how each piece splits into
/// blocks. The last piece (and the last block of any piece) may be shorter
/// than the nominal size.
#[derive(Debug, Clone)]
pub struct PieceLayout {
    total_length: u64,
    piece_length: u64,
    piece_count: u32,
    block_size: u32,
}

impl PieceLayout {
    pub fn new(total_length: u64, piece_length: u64, block_size: u32) -> Self {
        assert!(piece_length > 0, "piece length must be positive");
        assert!(block_size > 0, "block size must be positive");
        let piece_count = total_length.div_ceil(piece_length) as u32;
        Self {
            total_length,
            piece_length,
            piece_count,
            block_size,
        }
    }

    pub fn total_length(&self) -> u64 {
        self.total_length
    }

    pub fn piece_count(&self) -> u32 {
        self.piece_count
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn is_valid_piece(&self, piece: u32) -> bool {
        piece < self.piece_count
    }

    /// Length in bytes of the given piece; the last piece may be shorter.
    pub fn piece_length_of(&self, piece: u32) -> u64 {
        if !self.is_valid_piece(piece) {
            return 0;
        }
        let offset = piece as u64 * self.piece_length;
        (self.total_length - offset).min(self.piece_length)
    }

    /// Number of blocks in the given piece.
    pub fn block_count(&self, piece: u32) -> u32 {
        self.piece_length_of(piece).div_ceil(self.block_size as u64) as u32
    }

    /// Length of the block starting at `offset` within `piece`.
    pub fn block_length(&self, piece: u32, offset: u32) -> u32 {
        let piece_length = self.piece_length_of(piece);
        let remaining = piece_length.saturating_sub(offset as u64);
        remaining.min(self.block_size as u64) as u32
    }

    /// Byte offsets of every block in the given piece, in ascending order.
    pub fn block_offsets(&self, piece: u32) -> impl Iterator<Item = u32> + '_ {
        let count = self.block_count(piece);
        let step = self.block_size;
        (0..count).map(move |i| i * step)
    }

    /// Validates that a block lies within the given piece.
    pub fn validate_block(&self, piece: u32, offset: u32, length: u32) -> Result<(), PieceError> {
        if !self.is_valid_piece(piece) {
            return Err(PieceError::InvalidPieceIndex(piece));
        }
        if offset as u64 + length as u64 > self.piece_length_of(piece) {
            return Err(PieceError::InvalidBlockOffset { piece, offset });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_last_piece() {
        let layout = PieceLayout::new(40000, 16384, 16384);
        assert_eq!(layout.piece_count(), 3);
        assert_eq!(layout.piece_length_of(0), 16384);
        assert_eq!(layout.piece_length_of(1), 16384);
        assert_eq!(layout.piece_length_of(2), 40000 - 2 * 16384);
        assert_eq!(layout.piece_length_of(3), 0);
    }

    #[test]
    fn test_block_math() {
        let layout = PieceLayout::new(100000, 32768, 16384);
        assert_eq!(layout.block_count(0), 2);
        assert_eq!(layout.block_length(0, 0), 16384);
        assert_eq!(layout.block_length(0, 16384), 16384);

        // last piece: 100000 - 3 * 32768 = 1696 bytes, a single short block
        assert_eq!(layout.piece_count(), 4);
        assert_eq!(layout.block_count(3), 1);
        assert_eq!(layout.block_length(3, 0), 1696);

        let offsets: Vec<u32> = layout.block_offsets(0).collect();
        assert_eq!(offsets, vec![0, 16384]);
    }

    #[test]
    fn test_validate_block() {
        let layout = PieceLayout::new(32768, 16384, 16384);
        assert!(layout.validate_block(0, 0, 16384).is_ok());
        assert_eq!(
            layout.validate_block(5, 0, 1),
            Err(PieceError::InvalidPieceIndex(5))
        );
        assert_eq!(
            layout.validate_block(0, 16384, 1),
            Err(PieceError::InvalidBlockOffset {
                piece: 0,
                offset: 16384
            })
        );
    }
}
