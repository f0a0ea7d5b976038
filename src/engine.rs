//! Wires one torrent's piece tracking, assignment ledger, disk worker,
//! and message routing into a ready-to-serve unit.

use std::sync::Arc;

use crate::agents::MessageRouter;
use crate::config::Config;
use crate::data::DataWorker;
use crate::descriptor::TorrentDescriptor;
use crate::piece::{Assignments, PieceSelector, PieceStatistics, ValidatingSelector};
use crate::storage::Storage;

/// Per-torrent processing engine.
///
/// Built from a started [`TorrentDescriptor`]; the caller supplies the
/// selection strategy and drives the [`MessageRouter`] from its peer
/// connection loops. Must be constructed inside a tokio runtime as it
/// spawns the disk worker pool.
pub struct Engine<S: Storage> {
    descriptor: Arc<TorrentDescriptor<S>>,
    statistics: Arc<PieceStatistics>,
    assignments: Arc<Assignments>,
    worker: Arc<DataWorker<S>>,
    router: MessageRouter<S>,
}

impl<S: Storage> Engine<S> {
    pub fn initialize(
        descriptor: Arc<TorrentDescriptor<S>>,
        selector: Box<dyn PieceSelector>,
        config: &Config,
    ) -> Self {
        let layout = descriptor.layout().clone();
        let bitfield = descriptor.bitfield();

        let statistics = Arc::new(PieceStatistics::new(layout.piece_count()));
        let assignments = Arc::new(Assignments::new(
            Arc::clone(&bitfield),
            layout.clone(),
            config,
        ));
        let worker = Arc::new(DataWorker::new(descriptor.storage(), layout, config));
        let selector = ValidatingSelector::new(Arc::clone(&bitfield), selector);
        let router = MessageRouter::new(
            bitfield,
            Arc::clone(&statistics),
            Arc::clone(&assignments),
            selector,
            Arc::clone(&worker),
            descriptor.metadata(),
            config,
        );

        Self {
            descriptor,
            statistics,
            assignments,
            worker,
            router,
        }
    }

    pub fn descriptor(&self) -> &Arc<TorrentDescriptor<S>> {
        &self.descriptor
    }

    pub fn statistics(&self) -> &Arc<PieceStatistics> {
        &self.statistics
    }

    pub fn assignments(&self) -> &Arc<Assignments> {
        &self.assignments
    }

    pub fn worker(&self) -> &Arc<DataWorker<S>> {
        &self.worker
    }

    pub fn router(&self) -> &MessageRouter<S> {
        &self.router
    }

    /// Releases assignments that have made no progress within the
    /// configured timeout. Intended to run on a periodic tick.
    pub fn reap_stalled(&self) -> Vec<u32> {
        self.router.release_stalled()
    }

    /// Stops the disk worker pool after draining in-flight tasks.
    pub async fn shutdown(&self) {
        self.worker.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::piece::RarestFirstSelector;
    use crate::storage::MemoryStorage;

    #[tokio::test]
    async fn test_initialize_reflects_scanned_pieces() {
        let layout = crate::piece::PieceLayout::new(96, 32, 16);
        let data: Vec<u8> = (0..96).map(|i| i as u8).collect();
        let storage = Arc::new(MemoryStorage::seeded(layout.clone(), &data));
        let descriptor = Arc::new(TorrentDescriptor::new([7u8; 20], layout, None, storage));
        descriptor.start().await;

        let engine = Engine::initialize(
            Arc::clone(&descriptor),
            Box::new(RarestFirstSelector),
            &Config::default(),
        );
        assert!(engine.descriptor().bitfield().is_complete());
        assert_eq!(engine.statistics().tracked_peers(), 0);
        assert_eq!(engine.assignments().assigned_count(), 0);

        engine.shutdown().await;
    }
}
