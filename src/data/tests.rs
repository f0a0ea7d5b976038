use std::sync::Arc;

use bytes::Bytes;

use super::*;
use crate::config::Config;
use crate::piece::PieceLayout;
use crate::protocol::BlockRequest;
use crate::storage::{MemoryStorage, StorageError};

fn test_content(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// 3 pieces of 32 bytes (2 blocks each), last piece 16 bytes (1 block).
fn test_layout() -> PieceLayout {
    PieceLayout::new(80, 32, 16)
}

fn small_config() -> Config {
    Config {
        io_workers: 2,
        io_queue_depth: 8,
        ..Config::default()
    }
}

#[tokio::test]
async fn test_write_all_blocks_verifies_piece() {
    let layout = test_layout();
    let content = test_content(80);
    let hashes = MemoryStorage::hashes_for(&layout, &content);
    let storage = Arc::new(MemoryStorage::empty(layout.clone(), hashes));
    let worker = DataWorker::new(storage, layout, &small_config());

    let rx = worker
        .submit_write(0, 0, Bytes::copy_from_slice(&content[0..16]))
        .await;
    assert_eq!(rx.await.unwrap().unwrap(), WriteOutcome::BlockWritten);

    let rx = worker
        .submit_write(0, 16, Bytes::copy_from_slice(&content[16..32]))
        .await;
    assert_eq!(rx.await.unwrap().unwrap(), WriteOutcome::Verified(0));
}

#[tokio::test]
async fn test_corrupt_block_fails_verification_then_recovers() {
    let layout = test_layout();
    let content = test_content(80);
    let hashes = MemoryStorage::hashes_for(&layout, &content);
    let storage = Arc::new(MemoryStorage::empty(layout.clone(), hashes));
    let worker = DataWorker::new(storage, layout, &small_config());

    let mut corrupted = content[0..16].to_vec();
    corrupted[7] ^= 0xFF;

    let rx = worker.submit_write(0, 0, Bytes::from(corrupted)).await;
    assert_eq!(rx.await.unwrap().unwrap(), WriteOutcome::BlockWritten);

    let rx = worker
        .submit_write(0, 16, Bytes::copy_from_slice(&content[16..32]))
        .await;
    assert_eq!(
        rx.await.unwrap().unwrap(),
        WriteOutcome::VerificationFailed(0)
    );

    // the record was discarded, so a clean re-download verifies
    let rx = worker
        .submit_write(0, 0, Bytes::copy_from_slice(&content[0..16]))
        .await;
    assert_eq!(rx.await.unwrap().unwrap(), WriteOutcome::BlockWritten);
    let rx = worker
        .submit_write(0, 16, Bytes::copy_from_slice(&content[16..32]))
        .await;
    assert_eq!(rx.await.unwrap().unwrap(), WriteOutcome::Verified(0));
}

#[tokio::test]
async fn test_single_block_piece_verifies_immediately() {
    let layout = test_layout();
    let content = test_content(80);
    let hashes = MemoryStorage::hashes_for(&layout, &content);
    let storage = Arc::new(MemoryStorage::empty(layout.clone(), hashes));
    let worker = DataWorker::new(storage, layout, &small_config());

    let rx = worker
        .submit_write(2, 0, Bytes::copy_from_slice(&content[64..80]))
        .await;
    assert_eq!(rx.await.unwrap().unwrap(), WriteOutcome::Verified(2));
}

#[tokio::test]
async fn test_read_serves_seeded_data() {
    let layout = test_layout();
    let content = test_content(80);
    let storage = Arc::new(MemoryStorage::seeded(layout.clone(), &content));
    let worker = DataWorker::new(storage, layout, &small_config());

    let rx = worker.submit_read(BlockRequest::new(1, 16, 16)).await;
    let bytes = rx.await.unwrap().unwrap();
    assert_eq!(bytes.as_ref(), &content[48..64]);
}

#[tokio::test]
async fn test_read_error_surfaces_to_submitter() {
    let layout = test_layout();
    let storage = Arc::new(MemoryStorage::empty(layout.clone(), vec![[0u8; 20]; 3]));
    let worker = DataWorker::new(storage, layout, &small_config());

    let rx = worker.submit_read(BlockRequest::new(9, 0, 16)).await;
    assert!(matches!(
        rx.await.unwrap(),
        Err(StorageError::InvalidPieceIndex(9))
    ));
}

#[tokio::test]
async fn test_pieces_verify_independently() {
    let layout = test_layout();
    let content = test_content(80);
    let hashes = MemoryStorage::hashes_for(&layout, &content);
    let storage = Arc::new(MemoryStorage::empty(layout.clone(), hashes));
    let worker = DataWorker::new(storage, layout, &small_config());

    // interleave blocks of pieces 0 and 1; each verifies on its own last block
    let rx0a = worker
        .submit_write(0, 0, Bytes::copy_from_slice(&content[0..16]))
        .await;
    let rx1a = worker
        .submit_write(1, 0, Bytes::copy_from_slice(&content[32..48]))
        .await;
    let rx1b = worker
        .submit_write(1, 16, Bytes::copy_from_slice(&content[48..64]))
        .await;
    let rx0b = worker
        .submit_write(0, 16, Bytes::copy_from_slice(&content[16..32]))
        .await;

    assert_eq!(rx0a.await.unwrap().unwrap(), WriteOutcome::BlockWritten);
    assert_eq!(rx1a.await.unwrap().unwrap(), WriteOutcome::BlockWritten);
    assert_eq!(rx1b.await.unwrap().unwrap(), WriteOutcome::Verified(1));
    assert_eq!(rx0b.await.unwrap().unwrap(), WriteOutcome::Verified(0));

    worker.shutdown().await;
}

#[tokio::test]
async fn test_submit_after_shutdown_reports_closed() {
    let layout = test_layout();
    let storage = Arc::new(MemoryStorage::empty(layout.clone(), vec![[0u8; 20]; 3]));
    let worker = DataWorker::new(storage, layout, &small_config());

    worker.shutdown().await;

    let rx = worker.submit_read(BlockRequest::new(0, 0, 16)).await;
    assert!(matches!(rx.await.unwrap(), Err(StorageError::QueueClosed)));

    let rx = worker.submit_write(0, 0, Bytes::from(vec![0u8; 16])).await;
    assert!(matches!(rx.await.unwrap(), Err(StorageError::QueueClosed)));
}
