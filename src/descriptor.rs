//! Torrent lifecycle: registration, startup storage scan, and state.

use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::RwLock;
use sha1::{Digest, Sha1};
use tracing::debug;

use crate::constants::SCAN_BATCH_SIZE;
use crate::piece::{OwnBitfield, PieceLayout};
use crate::storage::Storage;

/// Lifecycle state of a registered torrent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TorrentState {
    Registered,
    Started,
    Stopped,
    Complete,
}

/// Binds one torrent's metadata, storage, and active state.
///
/// Created on registration; [`start`](Self::start) scans existing storage
/// to pre-populate the local bitfield before any peer messaging begins.
/// All engine components are scoped to the lifetime of one started
/// descriptor.
pub struct TorrentDescriptor<S: Storage> {
    info_hash: [u8; 20],
    layout: PieceLayout,
    metadata: Option<Bytes>,
    storage: Arc<S>,
    bitfield: Arc<OwnBitfield>,
    state: RwLock<TorrentState>,
}

impl<S: Storage> TorrentDescriptor<S> {
    pub fn new(
        info_hash: [u8; 20],
        layout: PieceLayout,
        metadata: Option<Bytes>,
        storage: Arc<S>,
    ) -> Self {
        let bitfield = Arc::new(OwnBitfield::new(layout.piece_count()));
        Self {
            info_hash,
            layout,
            metadata,
            storage,
            bitfield,
            state: RwLock::new(TorrentState::Registered),
        }
    }

    /// Scans storage and marks every readable, hash-valid piece verified,
    /// then transitions to `Started` (or straight to `Complete`). Returns
    /// the number of pieces found on disk. Unreadable pieces simply count
    /// as missing.
    pub async fn start(&self) -> u32 {
        let piece_count = self.layout.piece_count();
        let mut found = 0u32;

        let mut piece = 0u32;
        while piece < piece_count {
            let batch_end = (piece + SCAN_BATCH_SIZE as u32).min(piece_count);
            let checks = (piece..batch_end).map(|p| self.scan_piece(p));
            for (p, valid) in (piece..batch_end).zip(join_all(checks).await) {
                if valid {
                    // In-range by construction, and marking twice is harmless.
                    let _ = self.bitfield.mark_verified(p);
                    found += 1;
                }
            }
            piece = batch_end;
        }

        let state = if self.bitfield.is_complete() {
            TorrentState::Complete
        } else {
            TorrentState::Started
        };
        *self.state.write() = state;
        debug!(
            found,
            piece_count,
            ?state,
            "startup scan finished"
        );
        found
    }

    async fn scan_piece(&self, piece: u32) -> bool {
        let length = self.layout.piece_length_of(piece) as u32;
        let Ok(content) = self.storage.read(piece, 0, length).await else {
            return false;
        };
        let Ok(expected) = self.storage.piece_hash(piece) else {
            return false;
        };
        Sha1::digest(&content).as_slice() == expected
    }

    pub fn stop(&self) {
        *self.state.write() = TorrentState::Stopped;
    }

    /// Transitions to `Complete` if every piece is verified. Returns the
    /// resulting completeness.
    pub fn mark_complete_if_done(&self) -> bool {
        if self.bitfield.is_complete() {
            *self.state.write() = TorrentState::Complete;
            true
        } else {
            false
        }
    }

    pub fn state(&self) -> TorrentState {
        *self.state.read()
    }

    pub fn info_hash(&self) -> [u8; 20] {
        self.info_hash
    }

    pub fn layout(&self) -> &PieceLayout {
        &self.layout
    }

    pub fn metadata(&self) -> Option<Bytes> {
        self.metadata.clone()
    }

    pub fn storage(&self) -> Arc<S> {
        Arc::clone(&self.storage)
    }

    pub fn bitfield(&self) -> Arc<OwnBitfield> {
        Arc::clone(&self.bitfield)
    }
}

/// Registry of active torrents, keyed by info hash.
pub struct TorrentRegistry<S: Storage> {
    torrents: DashMap<[u8; 20], Arc<TorrentDescriptor<S>>>,
}

impl<S: Storage> TorrentRegistry<S> {
    pub fn new() -> Self {
        Self {
            torrents: DashMap::new(),
        }
    }

    pub fn register(&self, descriptor: TorrentDescriptor<S>) -> Arc<TorrentDescriptor<S>> {
        let descriptor = Arc::new(descriptor);
        self.torrents
            .insert(descriptor.info_hash(), Arc::clone(&descriptor));
        descriptor
    }

    pub fn get(&self, info_hash: &[u8; 20]) -> Option<Arc<TorrentDescriptor<S>>> {
        self.torrents.get(info_hash).map(|entry| Arc::clone(&entry))
    }

    pub fn unregister(&self, info_hash: &[u8; 20]) -> Option<Arc<TorrentDescriptor<S>>> {
        self.torrents.remove(info_hash).map(|(_, descriptor)| {
            descriptor.stop();
            descriptor
        })
    }

    pub fn len(&self) -> usize {
        self.torrents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.torrents.is_empty()
    }
}

impl<S: Storage> Default for TorrentRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}
