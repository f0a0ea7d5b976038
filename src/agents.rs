//! Messaging agents: the handlers that translate peer wire messages into
//! engine state changes and produce outgoing messages from that state.
//!
//! Each agent reacts to one class of message. The [`MessageRouter`] binds
//! them to a torrent's shared state and dispatches by message kind; the
//! message set is closed, so dispatch is a plain match rather than
//! open-ended virtual dispatch.

mod consumers;
mod error;
mod producers;
mod router;

pub use consumers::{BitfieldConsumer, GenericConsumer, PeerRequestConsumer, PieceConsumer};
pub use error::ProtocolError;
pub use producers::{MetadataProducer, RequestProducer};
pub use router::MessageRouter;
