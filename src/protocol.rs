//! Typed peer-protocol messages exchanged with the transport collaborator.
//!
//! Wire encoding and decoding live outside the engine: the transport hands
//! the engine decoded [`Message`] values and accepts them back on an
//! outbound channel.

use bytes::Bytes;

use crate::constants::METADATA_PIECE_SIZE;

/// A request for one block of a piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockRequest {
    pub piece: u32,
    pub offset: u32,
    pub length: u32,
}

impl BlockRequest {
    pub fn new(piece: u32, offset: u32, length: u32) -> Self {
        Self {
            piece,
            offset,
            length,
        }
    }
}

/// A block of piece data received from or sent to a peer.
#[derive(Debug, Clone)]
pub struct Block {
    pub piece: u32,
    pub offset: u32,
    pub data: Bytes,
}

impl Block {
    pub fn new(piece: u32, offset: u32, data: Bytes) -> Self {
        Self {
            piece,
            offset,
            data,
        }
    }
}

/// A decoded peer wire message.
#[derive(Debug, Clone)]
pub enum Message {
    KeepAlive,
    Choke,
    Unchoke,
    Interested,
    NotInterested,
    Have { piece: u32 },
    Bitfield(Bytes),
    Request { piece: u32, offset: u32, length: u32 },
    Piece { piece: u32, offset: u32, data: Bytes },
    Cancel { piece: u32, offset: u32, length: u32 },
    Metadata(MetadataMessage),
}

/// A metadata exchange message (ut_metadata, BEP-9).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataMessage {
    /// Request a piece of metadata.
    Request { piece: u32 },
    /// Provide a piece of metadata.
    Data {
        piece: u32,
        total_size: u32,
        data: Bytes,
    },
    /// Reject a metadata request.
    Reject { piece: u32 },
}

/// Calculates the number of metadata pieces for a given metadata size.
pub fn metadata_piece_count(metadata_size: usize) -> usize {
    metadata_size.div_ceil(METADATA_PIECE_SIZE)
}

/// Calculates the size of a specific metadata piece.
pub fn metadata_piece_size(piece: u32, total_size: usize) -> usize {
    let offset = piece as usize * METADATA_PIECE_SIZE;
    if offset >= total_size {
        0
    } else {
        (total_size - offset).min(METADATA_PIECE_SIZE)
    }
}
