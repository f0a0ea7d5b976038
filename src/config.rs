use std::time::Duration;

use crate::constants;

/// Engine configuration consumed by the piece-exchange core.
///
/// Loading configuration from files or the command line is left to the
/// embedding application; this struct only carries the knobs the engine
/// itself consumes.
#[derive(Debug, Clone)]
pub struct Config {
    /// Size of a block, the unit of network transfer within a piece.
    pub block_size: u32,
    /// Requests above this length are rejected as protocol violations.
    pub max_request_length: u32,
    /// An assignment with no block progress for this long is released.
    pub assignment_timeout: Duration,
    /// Maximum pieces concurrently assigned to one peer.
    pub max_assigned_pieces_per_peer: usize,
    /// Whether nearly-complete pieces may be assigned to multiple peers.
    pub endgame_enabled: bool,
    /// Endgame duplication kicks in when at most this many pieces are
    /// still missing.
    pub endgame_threshold: usize,
    /// Maximum block requests emitted towards a peer per produce pass.
    pub request_pipeline_depth: usize,
    /// Number of data-worker tasks processing disk I/O.
    pub io_workers: usize,
    /// Depth of each data-worker task queue.
    pub io_queue_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            block_size: constants::BLOCK_SIZE,
            max_request_length: constants::MAX_REQUEST_LENGTH,
            assignment_timeout: constants::ASSIGNMENT_TIMEOUT,
            max_assigned_pieces_per_peer: constants::MAX_ASSIGNED_PIECES_PER_PEER,
            endgame_enabled: true,
            endgame_threshold: constants::ENDGAME_PIECES_THRESHOLD,
            request_pipeline_depth: constants::REQUEST_PIPELINE_DEPTH,
            io_workers: constants::IO_WORKERS,
            io_queue_depth: constants::IO_QUEUE_DEPTH,
        }
    }
}
