//! rswarm - A BitTorrent piece-exchange engine
//!
//! This library implements the data-plane core of a BitTorrent client: piece
//! bookkeeping, rarity-driven selection, work assignment across peers, and
//! asynchronous verified disk I/O. Transport, trackers, and peer discovery
//! are the embedding application's concern; the engine consumes decoded
//! wire messages and produces outgoing ones.
//!
//! # Modules
//!
//! - [`piece`] - Bitfields, rarity statistics, selectors, assignment ledger
//! - [`data`] - Disk worker pool with piece hash verification
//! - [`agents`] - Message consumers/producers and the per-torrent router
//! - [`protocol`] - Decoded peer wire messages, BEP-9 metadata exchange
//! - [`storage`] - Block storage abstraction
//! - [`descriptor`] - Torrent registration, startup scan, lifecycle state
//! - [`engine`] - Per-torrent wiring of all of the above
//! - [`peer`] - Peer identity and per-connection protocol state

pub mod agents;
pub mod config;
pub mod constants;
pub mod data;
pub mod descriptor;
pub mod engine;
pub mod peer;
pub mod piece;
pub mod protocol;
pub mod storage;

pub use agents::{MessageRouter, ProtocolError};
pub use config::Config;
pub use data::{DataWorker, WriteOutcome};
pub use descriptor::{TorrentDescriptor, TorrentRegistry, TorrentState};
pub use engine::Engine;
pub use peer::{ChokingState, PeerContext, PeerId};
pub use piece::{
    AssignRejected, Assignment, Assignments, Bitfield, OwnBitfield, PieceError, PieceLayout,
    PieceSelector, PieceStatistics, RandomSelector, RarestFirstSelector, SequentialSelector,
    ValidatingSelector,
};
pub use protocol::{Block, BlockRequest, Message, MetadataMessage};
pub use storage::{MemoryStorage, Storage, StorageError};
