use thiserror::Error;

use crate::piece::PieceError;

/// A locally rejected peer message.
///
/// Protocol violations never tear down the engine; they are logged,
/// rejected, and reported to the caller so an external peer-penalty policy
/// can act on them.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Piece(#[from] PieceError),

    #[error("request too large: {0} bytes")]
    RequestTooLarge(u32),

    #[error("requested piece {0} is not available locally")]
    PieceNotAvailable(u32),
}
