//! Piece tracking, rarity statistics, selection, and assignment.
//!
//! This module is the bookkeeping heart of the engine: which pieces we have
//! ([`OwnBitfield`]), which pieces each peer has ([`Bitfield`],
//! [`PieceStatistics`]), which missing piece to pursue next
//! ([`PieceSelector`], [`ValidatingSelector`]), and which peer is currently
//! responsible for fetching what ([`Assignments`]).

mod assignments;
mod bitfield;
mod error;
mod layout;
mod selector;
mod statistics;

pub use assignments::{AssignRejected, Assignment, Assignments};
pub use bitfield::{Bitfield, OwnBitfield};
pub use error::PieceError;
pub use layout::PieceLayout;
pub use selector::{
    PieceSelector, RandomSelector, RarestFirstSelector, SequentialSelector, ValidatingSelector,
};
pub use statistics::PieceStatistics;

#[cfg(test)]
mod tests;
