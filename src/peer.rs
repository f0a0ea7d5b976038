//! Peer identity and per-connection protocol state.

use std::fmt;
use std::time::Instant;

use rand::Rng as _;

const PEER_ID_PREFIX: &[u8] = b"-RS0001-";

/// A 20-byte peer identifier.
///
/// Peer IDs identify BitTorrent clients in the swarm. They follow the
/// Azureus-style format: `-XX0000-<random>` where XX is the client ID
/// and 0000 is the version number.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId(pub [u8; 20]);

impl PeerId {
    /// Generates a new random peer ID with the rswarm client prefix.
    pub fn generate() -> Self {
        let mut id = [0u8; 20];
        id[..8].copy_from_slice(PEER_ID_PREFIX);
        rand::rng().fill(&mut id[8..]);
        Self(id)
    }

    /// Creates a peer ID from a 20-byte slice.
    ///
    /// Returns `None` if the slice is not exactly 20 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != 20 {
            return None;
        }
        let mut id = [0u8; 20];
        id.copy_from_slice(bytes);
        Some(Self(id))
    }

    /// Returns the raw 20-byte peer ID.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Extracts the client identifier if using Azureus-style format.
    pub fn client_id(&self) -> Option<&str> {
        if self.0[0] == b'-' && self.0[7] == b'-' {
            std::str::from_utf8(&self.0[1..7]).ok()
        } else {
            None
        }
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(client) = self.client_id() {
            write!(f, "PeerId({})", client)
        } else {
            write!(f, "PeerId({:02x?})", &self.0[..8])
        }
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            if byte.is_ascii_alphanumeric() || *byte == b'-' {
                write!(f, "{}", *byte as char)?;
            } else {
                write!(f, "%{:02x}", byte)?;
            }
        }
        Ok(())
    }
}

/// Choke and interest flags for one connection.
///
/// The engine only tracks these flags; the choking algorithm deciding when
/// to flip our side lives outside the piece-exchange core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChokingState {
    pub am_choking: bool,
    pub am_interested: bool,
    pub peer_choking: bool,
    pub peer_interested: bool,
}

impl Default for ChokingState {
    fn default() -> Self {
        Self {
            am_choking: true,
            am_interested: false,
            peer_choking: true,
            peer_interested: false,
        }
    }
}

/// Per-connection view the messaging agents operate on.
///
/// One context per connected peer, owned by that peer's processing task.
/// Shared piece state lives elsewhere; this only carries what is private to
/// the connection.
#[derive(Debug)]
pub struct PeerContext {
    pub peer_id: PeerId,
    pub choking: ChokingState,
    /// When the last message was received.
    pub last_message_at: Instant,
}

impl PeerContext {
    pub fn new(peer_id: PeerId) -> Self {
        Self {
            peer_id,
            choking: ChokingState::default(),
            last_message_at: Instant::now(),
        }
    }

    /// True when block requests may be sent to this peer.
    pub fn can_request(&self) -> bool {
        self.choking.am_interested && !self.choking.peer_choking
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_id_generate() {
        let id1 = PeerId::generate();
        let id2 = PeerId::generate();
        assert_ne!(id1.0, id2.0);
        assert_eq!(id1.client_id(), Some("RS0001"));
    }

    #[test]
    fn test_peer_id_from_bytes() {
        assert!(PeerId::from_bytes(&[0u8; 19]).is_none());
        let id = PeerId::from_bytes(&[7u8; 20]).unwrap();
        assert_eq!(id.as_bytes(), &[7u8; 20]);
    }

    #[test]
    fn test_context_can_request() {
        let mut ctx = PeerContext::new(PeerId::generate());
        assert!(!ctx.can_request());

        ctx.choking.am_interested = true;
        assert!(!ctx.can_request());

        ctx.choking.peer_choking = false;
        assert!(ctx.can_request());
    }
}
