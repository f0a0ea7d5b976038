//! Asynchronous disk dispatch.
//!
//! Peer-processing tasks never touch storage directly: blocks to read or
//! write are queued to the [`DataWorker`] pool and completions come back
//! over oneshot channels. Piece verification happens here too, as soon as
//! the last outstanding block of a piece lands.

mod worker;

pub use worker::{DataWorker, WriteOutcome};

#[cfg(test)]
mod tests;
