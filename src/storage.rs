//! The storage collaborator boundary.
//!
//! The engine never touches files itself: it dispatches reads, writes, and
//! hash lookups through the [`Storage`] trait, always from data-worker
//! tasks. Backends (plain files, caches, network-backed stores) are
//! supplied by the embedding application. [`MemoryStorage`] is a simple
//! in-memory backend used by tests and for seeding small payloads.

use std::future::Future;

use bytes::Bytes;
use parking_lot::Mutex;
use sha1::{Digest, Sha1};
use thiserror::Error;

use crate::piece::PieceLayout;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid piece index: {0}")]
    InvalidPieceIndex(u32),

    #[error("invalid block offset: piece {piece}, offset {offset}")]
    InvalidBlockOffset { piece: u32, offset: u32 },

    #[error("no expected hash for piece {0}")]
    MissingHash(u32),

    #[error("data worker queue closed")]
    QueueClosed,
}

/// Random-access piece storage for one torrent.
///
/// Offsets and lengths are relative to the piece, not the content; mapping
/// pieces onto files is the backend's concern.
pub trait Storage: Send + Sync + 'static {
    /// Reads `length` bytes starting at `offset` within `piece`.
    fn read(
        &self,
        piece: u32,
        offset: u32,
        length: u32,
    ) -> impl Future<Output = Result<Bytes, StorageError>> + Send;

    /// Writes `data` starting at `offset` within `piece`.
    fn write(
        &self,
        piece: u32,
        offset: u32,
        data: Bytes,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// The expected content hash of `piece`.
    fn piece_hash(&self, piece: u32) -> Result<[u8; 20], StorageError>;
}

/// In-memory [`Storage`] backend.
///
/// Holds one buffer per piece, sized from the layout. Expected hashes are
/// supplied up front, or derived from the content when seeding.
pub struct MemoryStorage {
    layout: PieceLayout,
    hashes: Vec<[u8; 20]>,
    pieces: Mutex<Vec<Vec<u8>>>,
}

impl MemoryStorage {
    /// Empty storage for a download in progress.
    pub fn empty(layout: PieceLayout, hashes: Vec<[u8; 20]>) -> Self {
        let pieces = (0..layout.piece_count())
            .map(|piece| vec![0u8; layout.piece_length_of(piece) as usize])
            .collect();
        Self {
            layout,
            hashes,
            pieces: Mutex::new(pieces),
        }
    }

    /// Storage pre-filled with `content`, hashes computed from it. Useful
    /// for the seeding side of tests.
    pub fn seeded(layout: PieceLayout, content: &[u8]) -> Self {
        assert_eq!(content.len() as u64, layout.total_length());
        let mut pieces = Vec::with_capacity(layout.piece_count() as usize);
        let mut hashes = Vec::with_capacity(layout.piece_count() as usize);
        let mut cursor = 0usize;
        for piece in 0..layout.piece_count() {
            let len = layout.piece_length_of(piece) as usize;
            let chunk = &content[cursor..cursor + len];
            hashes.push(Sha1::digest(chunk).into());
            pieces.push(chunk.to_vec());
            cursor += len;
        }
        Self {
            layout,
            hashes,
            pieces: Mutex::new(pieces),
        }
    }

    /// The expected hashes for all pieces of `content` under `layout`.
    pub fn hashes_for(layout: &PieceLayout, content: &[u8]) -> Vec<[u8; 20]> {
        let mut hashes = Vec::with_capacity(layout.piece_count() as usize);
        let mut cursor = 0usize;
        for piece in 0..layout.piece_count() {
            let len = layout.piece_length_of(piece) as usize;
            hashes.push(Sha1::digest(&content[cursor..cursor + len]).into());
            cursor += len;
        }
        hashes
    }

    pub fn layout(&self) -> &PieceLayout {
        &self.layout
    }

    fn check_bounds(&self, piece: u32, offset: u32, length: u32) -> Result<(), StorageError> {
        if !self.layout.is_valid_piece(piece) {
            return Err(StorageError::InvalidPieceIndex(piece));
        }
        if offset as u64 + length as u64 > self.layout.piece_length_of(piece) {
            return Err(StorageError::InvalidBlockOffset { piece, offset });
        }
        Ok(())
    }
}

impl Storage for MemoryStorage {
    fn read(
        &self,
        piece: u32,
        offset: u32,
        length: u32,
    ) -> impl Future<Output = Result<Bytes, StorageError>> + Send {
        async move {
            self.check_bounds(piece, offset, length)?;
            let pieces = self.pieces.lock();
            let buf = &pieces[piece as usize];
            Ok(Bytes::copy_from_slice(
                &buf[offset as usize..offset as usize + length as usize],
            ))
        }
    }

    fn write(
        &self,
        piece: u32,
        offset: u32,
        data: Bytes,
    ) -> impl Future<Output = Result<(), StorageError>> + Send {
        async move {
            self.check_bounds(piece, offset, data.len() as u32)?;
            let mut pieces = self.pieces.lock();
            let buf = &mut pieces[piece as usize];
            buf[offset as usize..offset as usize + data.len()].copy_from_slice(&data);
            Ok(())
        }
    }

    fn piece_hash(&self, piece: u32) -> Result<[u8; 20], StorageError> {
        self.hashes
            .get(piece as usize)
            .copied()
            .ok_or(StorageError::MissingHash(piece))
    }
}
