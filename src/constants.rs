//! Tuning parameters for the piece-exchange engine.
//!
//! These values are based on defaults from popular clients like qBittorrent,
//! Transmission, and libtorrent.

use std::time::Duration;

// ============================================================================
// Block and piece sizes
// ============================================================================

/// Standard block size (16KB)
pub const BLOCK_SIZE: u32 = 16384;

/// Maximum request length per BEP 3 (128KB). Requests larger than this are suspicious.
pub const MAX_REQUEST_LENGTH: u32 = 131072;

/// Metadata piece size (BEP-9)
pub const METADATA_PIECE_SIZE: usize = 16384;

// ============================================================================
// Assignment policy
// ============================================================================

/// Time without block progress before an assignment is released back to the
/// candidate pool.
pub const ASSIGNMENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum pieces assigned to a single peer at once.
pub const MAX_ASSIGNED_PIECES_PER_PEER: usize = 5;

/// Remaining pieces threshold for endgame mode
pub const ENDGAME_PIECES_THRESHOLD: usize = 10;

/// Maximum block requests handed to a peer per produce pass.
pub const REQUEST_PIPELINE_DEPTH: usize = 16;

// ============================================================================
// Disk I/O
// ============================================================================

/// Number of I/O worker tasks
pub const IO_WORKERS: usize = 4;

/// Depth of each I/O worker's task queue
pub const IO_QUEUE_DEPTH: usize = 256;

/// Pieces verified concurrently during the startup storage scan
pub const SCAN_BATCH_SIZE: usize = 32;
