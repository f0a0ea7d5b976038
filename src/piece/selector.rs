use std::sync::Arc;

use rand::seq::SliceRandom;

use super::bitfield::OwnBitfield;
use super::statistics::PieceStatistics;

/// A piece-selection strategy.
///
/// Given the current rarity statistics, produces an ordering over candidate
/// piece indices. Only pieces at least one tracked peer possesses are
/// candidates. Selection is read-only: recommending a piece does not reserve
/// it, reservation happens in [`Assignments`](super::Assignments).
pub trait PieceSelector: Send + Sync {
    fn select(&self, statistics: &PieceStatistics) -> Vec<u32>;
}

/// Rarest-first: ascending peer count, ties broken by ascending index so the
/// ordering is reproducible.
#[derive(Debug, Default)]
pub struct RarestFirstSelector;

impl PieceSelector for RarestFirstSelector {
    fn select(&self, statistics: &PieceStatistics) -> Vec<u32> {
        let counts = statistics.rarity_snapshot();
        let mut candidates: Vec<(u32, u32)> = counts
            .iter()
            .enumerate()
            .filter(|(_, &count)| count > 0)
            .map(|(piece, &count)| (count, piece as u32))
            .collect();
        candidates.sort_unstable();
        candidates.into_iter().map(|(_, piece)| piece).collect()
    }
}

/// Sequential: ascending piece index, useful for streaming-style consumption.
#[derive(Debug, Default)]
pub struct SequentialSelector;

impl PieceSelector for SequentialSelector {
    fn select(&self, statistics: &PieceStatistics) -> Vec<u32> {
        statistics
            .rarity_snapshot()
            .iter()
            .enumerate()
            .filter(|(_, &count)| count > 0)
            .map(|(piece, _)| piece as u32)
            .collect()
    }
}

/// Uniformly random ordering over available pieces.
#[derive(Debug, Default)]
pub struct RandomSelector;

impl PieceSelector for RandomSelector {
    fn select(&self, statistics: &PieceStatistics) -> Vec<u32> {
        let mut candidates: Vec<u32> = statistics
            .rarity_snapshot()
            .iter()
            .enumerate()
            .filter(|(_, &count)| count > 0)
            .map(|(piece, _)| piece as u32)
            .collect();
        candidates.shuffle(&mut rand::rng());
        candidates
    }
}

/// Decorates a selector so callers never receive a piece the local bitfield
/// already reports verified, regardless of what the delegate returns.
pub struct ValidatingSelector {
    own: Arc<OwnBitfield>,
    delegate: Box<dyn PieceSelector>,
}

impl ValidatingSelector {
    pub fn new(own: Arc<OwnBitfield>, delegate: Box<dyn PieceSelector>) -> Self {
        Self { own, delegate }
    }
}

impl PieceSelector for ValidatingSelector {
    fn select(&self, statistics: &PieceStatistics) -> Vec<u32> {
        self.delegate
            .select(statistics)
            .into_iter()
            .filter(|&piece| !self.own.is_verified(piece))
            .collect()
    }
}
