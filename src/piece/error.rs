use thiserror::Error;

use crate::peer::PeerId;

/// Errors raised by piece tracking and assignment state.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PieceError {
    #[error("invalid piece index: {0}")]
    InvalidPieceIndex(u32),

    #[error("invalid block offset: piece {piece}, offset {offset}")]
    InvalidBlockOffset { piece: u32, offset: u32 },

    #[error("piece {piece} is not assigned to peer {peer}")]
    NotAssigned { piece: u32, peer: PeerId },

    #[error("unexpected block: piece {piece}, offset {offset}")]
    UnexpectedBlock { piece: u32, offset: u32 },
}
