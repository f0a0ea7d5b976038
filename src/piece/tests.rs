use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::config::Config;
use crate::peer::PeerId;

fn layout() -> PieceLayout {
    // 5 pieces of 32 bytes, 2 blocks each.
    PieceLayout::new(160, 32, 16)
}

fn no_endgame() -> Config {
    Config {
        endgame_enabled: false,
        ..Config::default()
    }
}

fn assignments(config: &Config) -> Assignments {
    let own = Arc::new(OwnBitfield::new(layout().piece_count()));
    Assignments::new(own, layout(), config)
}

#[test]
fn test_statistics_disconnect_restores_counts() {
    let stats = PieceStatistics::new(5);
    let (alice, bob) = (PeerId::generate(), PeerId::generate());

    let mut bf = Bitfield::new(5);
    bf.set_piece(0);
    bf.set_piece(2);
    stats.add_peer_bitfield(alice, bf.clone());
    stats.add_peer_bitfield(bob, bf);
    stats.add_peer_have(bob, 4).unwrap();

    assert_eq!(stats.rarity_snapshot(), vec![2, 0, 2, 0, 1]);

    stats.remove_peer(bob);
    assert_eq!(stats.rarity_snapshot(), vec![1, 0, 1, 0, 0]);
    assert_eq!(stats.tracked_peers(), 1);
}

#[test]
fn test_statistics_reannounce_does_not_double_count() {
    let stats = PieceStatistics::new(3);
    let peer = PeerId::generate();

    let mut first = Bitfield::new(3);
    first.set_piece(0);
    stats.add_peer_bitfield(peer, first);

    let mut second = Bitfield::new(3);
    second.set_piece(1);
    second.set_piece(2);
    stats.add_peer_bitfield(peer, second);

    assert_eq!(stats.rarity_snapshot(), vec![0, 1, 1]);
    assert_eq!(stats.tracked_peers(), 1);
}

#[test]
fn test_assign_is_exclusive_across_racing_peers() {
    let assignments = Arc::new(assignments(&no_endgame()));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let assignments = Arc::clone(&assignments);
            std::thread::spawn(move || assignments.assign(PeerId::generate(), 3).is_ok())
        })
        .collect();

    let successes = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|&ok| ok)
        .count();
    assert_eq!(successes, 1);
    assert_eq!(assignments.assigned_to(3).len(), 1);
}

#[test]
fn test_verified_piece_never_gains_assignment() {
    // Race an assign against the verify-then-release sequence that runs on
    // piece completion; the ledger must never keep an entry for a piece the
    // local bitfield reports verified.
    for _ in 0..100 {
        let own = Arc::new(OwnBitfield::new(layout().piece_count()));
        let assignments = Arc::new(Assignments::new(Arc::clone(&own), layout(), &no_endgame()));
        let peer = PeerId::generate();

        let assigner = {
            let assignments = Arc::clone(&assignments);
            std::thread::spawn(move || {
                let _ = assignments.assign(peer, 0);
            })
        };
        let verifier = {
            let own = Arc::clone(&own);
            let assignments = Arc::clone(&assignments);
            std::thread::spawn(move || {
                own.mark_verified(0).unwrap();
                assignments.release(0);
            })
        };
        assigner.join().unwrap();
        verifier.join().unwrap();

        assert!(!assignments.is_assigned(0));
    }
}

#[test]
fn test_assign_rejections() {
    let config = no_endgame();
    let own = Arc::new(OwnBitfield::new(layout().piece_count()));
    let assignments = Assignments::new(Arc::clone(&own), layout(), &config);
    let (alice, bob) = (PeerId::generate(), PeerId::generate());

    assert_eq!(
        assignments.assign(alice, 99),
        Err(AssignRejected::InvalidPiece(99))
    );

    own.mark_verified(0).unwrap();
    assert_eq!(
        assignments.assign(alice, 0),
        Err(AssignRejected::AlreadyVerified(0))
    );

    assignments.assign(alice, 1).unwrap();
    assert_eq!(
        assignments.assign(bob, 1),
        Err(AssignRejected::AssignedElsewhere(1))
    );
    // Re-assigning to the holder is a no-op success.
    assert!(assignments.assign(alice, 1).is_ok());
}

#[test]
fn test_assign_respects_per_peer_capacity() {
    let config = Config {
        max_assigned_pieces_per_peer: 2,
        ..no_endgame()
    };
    let assignments = assignments(&config);
    let peer = PeerId::generate();

    assignments.assign(peer, 0).unwrap();
    assignments.assign(peer, 1).unwrap();
    assert_eq!(
        assignments.assign(peer, 2),
        Err(AssignRejected::PeerAtCapacity(peer))
    );
}

#[test]
fn test_block_lifecycle_drains_remaining() {
    let assignments = assignments(&no_endgame());
    let peer = PeerId::generate();

    let assignment = assignments.assign(peer, 2).unwrap();
    assert_eq!(assignment.remaining_blocks, 2);

    let requests = assignments.take_blocks(peer, 2, 16);
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].offset, 0);
    assert_eq!(requests[1].offset, 16);
    // Offsets already handed out are not repeated.
    assert!(assignments.take_blocks(peer, 2, 16).is_empty());

    assert_eq!(assignments.record_block_received(peer, 2, 0).unwrap(), 1);
    assert_eq!(assignments.record_block_received(peer, 2, 16).unwrap(), 0);

    assignments.release(2);
    assert!(!assignments.is_assigned(2));
}

#[test]
fn test_unexpected_blocks_are_violations() {
    let assignments = assignments(&no_endgame());
    let (alice, bob) = (PeerId::generate(), PeerId::generate());

    assignments.assign(alice, 0).unwrap();
    assignments.take_blocks(alice, 0, 16);

    // Piece never assigned to bob.
    assert_eq!(
        assignments.record_block_received(bob, 0, 0),
        Err(PieceError::NotAssigned { piece: 0, peer: bob })
    );
    // Offset never requested.
    assert_eq!(
        assignments.record_block_received(alice, 0, 48),
        Err(PieceError::UnexpectedBlock {
            piece: 0,
            offset: 48
        })
    );
    // Same block twice.
    assignments.record_block_received(alice, 0, 0).unwrap();
    assert_eq!(
        assignments.record_block_received(alice, 0, 0),
        Err(PieceError::UnexpectedBlock {
            piece: 0,
            offset: 0
        })
    );
}

#[test]
fn test_remove_peer_releases_its_pieces() {
    let assignments = assignments(&no_endgame());
    let peer = PeerId::generate();

    assignments.assign(peer, 1).unwrap();
    assignments.assign(peer, 4).unwrap();

    let mut released = assignments.remove_peer(peer);
    released.sort_unstable();
    assert_eq!(released, vec![1, 4]);
    assert_eq!(assignments.assigned_count(), 0);
}

#[test]
fn test_stalled_assignments_are_released() {
    let config = Config {
        assignment_timeout: Duration::ZERO,
        ..no_endgame()
    };
    let assignments = assignments(&config);
    let peer = PeerId::generate();

    assignments.assign(peer, 0).unwrap();
    assert_eq!(assignments.release_stalled(), vec![0]);
    assert!(!assignments.is_assigned(0));
}

#[test]
fn test_endgame_duplicates_assignments() {
    // 5 pieces missing, threshold 5: endgame from the start.
    let config = Config {
        endgame_threshold: 5,
        ..Config::default()
    };
    let assignments = assignments(&config);
    let (alice, bob) = (PeerId::generate(), PeerId::generate());

    assignments.assign(alice, 0).unwrap();
    assignments.assign(bob, 0).unwrap();
    assert_eq!(assignments.assigned_to(0).len(), 2);

    // Both peers get the outstanding offsets, each at most once.
    let first = assignments.take_blocks(alice, 0, 16);
    let second = assignments.take_blocks(bob, 0, 16);
    assert_eq!(first.len(), 2);
    assert_eq!(second.len(), 2);
    assert!(assignments.take_blocks(alice, 0, 16).is_empty());

    // Losing one duplicate keeps the piece assigned.
    assert!(assignments.remove_peer(alice).is_empty());
    assert_eq!(assignments.assigned_to(0), vec![bob]);

    // A block from the survivor retires the offset for everyone.
    assert_eq!(assignments.record_block_received(bob, 0, 0).unwrap(), 1);
}

#[test]
fn test_endgame_not_active_while_many_pieces_missing() {
    let config = Config {
        endgame_threshold: 2,
        ..Config::default()
    };
    let assignments = assignments(&config);
    let (alice, bob) = (PeerId::generate(), PeerId::generate());

    assignments.assign(alice, 0).unwrap();
    assert_eq!(
        assignments.assign(bob, 0),
        Err(AssignRejected::AssignedElsewhere(0))
    );
}
