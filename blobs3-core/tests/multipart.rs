// Copyright 2026 Blobs3 Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Multipart upload integration tests: assembly order, part set
//! validation, abort/reclaim, and expiry sweeping.

use std::sync::Arc;
use std::time::Duration;

use blobs3_core::{
    collect_stream, stream_from, MemoryContentStore, MetadataIndex, MultipartCoordinator,
    ObjectManager, PutOptions, StorageError,
};
use sha2::{Digest, Sha256};
use tempfile::TempDir;

fn engine() -> (TempDir, Arc<MemoryContentStore>, Arc<ObjectManager>, MultipartCoordinator) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let index = Arc::new(MetadataIndex::open(&dir.path().join("index.redb")).expect("Failed to open index"));
    let store = Arc::new(MemoryContentStore::new());
    let manager = Arc::new(ObjectManager::new(store.clone(), index, false));
    let coordinator = MultipartCoordinator::new(manager.clone());
    (dir, store, manager, coordinator)
}

#[tokio::test]
async fn test_complete_assembles_parts_in_order() {
    let (_dir, store, manager, coordinator) = engine();
    manager.create_bucket("data").await.unwrap();

    let upload_id = coordinator
        .initiate("data", "big.bin", PutOptions::default())
        .await
        .unwrap();
    coordinator.stage_part(&upload_id, 1, stream_from("aaa")).await.unwrap();
    coordinator.stage_part(&upload_id, 2, stream_from("bb")).await.unwrap();
    coordinator.stage_part(&upload_id, 3, stream_from("c")).await.unwrap();
    assert_eq!(coordinator.part_count(&upload_id).await.unwrap(), 3);

    let descriptor = coordinator.complete(&upload_id, &[1, 2, 3]).await.unwrap();
    assert_eq!(descriptor.size, 6);
    let expected: [u8; 32] = Sha256::digest(b"aaabbc").into();
    assert_eq!(descriptor.etag, format!("\"{}\"", hex::encode(expected)));

    let (_, stream) = manager.get_object("data", "big.bin", None, None).await.unwrap();
    assert_eq!(collect_stream(stream).await.unwrap(), b"aaabbc");

    // part blobs reclaimed, only the assembled object remains
    assert_eq!(store.blob_count(), 1);
}

#[tokio::test]
async fn test_completion_respects_given_order() {
    let (_dir, _store, manager, coordinator) = engine();
    manager.create_bucket("data").await.unwrap();

    let upload_id = coordinator.initiate("data", "k", PutOptions::default()).await.unwrap();
    coordinator.stage_part(&upload_id, 1, stream_from("B")).await.unwrap();
    coordinator.stage_part(&upload_id, 2, stream_from("A")).await.unwrap();

    coordinator.complete(&upload_id, &[2, 1]).await.unwrap();
    let (_, stream) = manager.get_object("data", "k", None, None).await.unwrap();
    assert_eq!(collect_stream(stream).await.unwrap(), b"AB");
}

#[tokio::test]
async fn test_part_set_must_match_exactly() {
    let (_dir, _store, manager, coordinator) = engine();
    manager.create_bucket("data").await.unwrap();

    let upload_id = coordinator.initiate("data", "k", PutOptions::default()).await.unwrap();
    coordinator.stage_part(&upload_id, 1, stream_from("x")).await.unwrap();
    coordinator.stage_part(&upload_id, 2, stream_from("y")).await.unwrap();

    for bad in [&[][..], &[1][..], &[1, 2, 3][..], &[1, 1, 2][..]] {
        let err = coordinator.complete(&upload_id, bad).await.unwrap_err();
        assert!(matches!(err, StorageError::IncompletePartSet { .. }), "parts {:?}", bad);
    }

    // session stays open after a rejected completion
    coordinator.complete(&upload_id, &[1, 2]).await.unwrap();
}

#[tokio::test]
async fn test_restage_part_is_last_write_wins() {
    let (_dir, store, manager, coordinator) = engine();
    manager.create_bucket("data").await.unwrap();

    let upload_id = coordinator.initiate("data", "k", PutOptions::default()).await.unwrap();
    coordinator.stage_part(&upload_id, 1, stream_from("old")).await.unwrap();
    coordinator.stage_part(&upload_id, 1, stream_from("new")).await.unwrap();
    // replaced blob reclaimed right away
    assert_eq!(store.blob_count(), 1);

    coordinator.complete(&upload_id, &[1]).await.unwrap();
    let (_, stream) = manager.get_object("data", "k", None, None).await.unwrap();
    assert_eq!(collect_stream(stream).await.unwrap(), b"new");
}

#[tokio::test]
async fn test_abort_reclaims_and_is_idempotent() {
    let (_dir, store, manager, coordinator) = engine();
    manager.create_bucket("data").await.unwrap();

    let upload_id = coordinator.initiate("data", "k", PutOptions::default()).await.unwrap();
    coordinator.stage_part(&upload_id, 1, stream_from("x")).await.unwrap();
    coordinator.stage_part(&upload_id, 2, stream_from("y")).await.unwrap();

    coordinator.abort(&upload_id).await.unwrap();
    assert_eq!(store.blob_count(), 0);
    coordinator.abort(&upload_id).await.unwrap();

    let err = coordinator
        .stage_part(&upload_id, 3, stream_from("z"))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::SessionClosed { .. }));
    let err = coordinator.complete(&upload_id, &[1]).await.unwrap_err();
    assert!(matches!(err, StorageError::SessionClosed { .. }));

    assert!(matches!(
        manager.head_object("data", "k", None).await.unwrap_err(),
        StorageError::NotFound { .. }
    ));
}

#[tokio::test]
async fn test_completed_session_rejects_further_calls() {
    let (_dir, _store, manager, coordinator) = engine();
    manager.create_bucket("data").await.unwrap();

    let upload_id = coordinator.initiate("data", "k", PutOptions::default()).await.unwrap();
    coordinator.stage_part(&upload_id, 1, stream_from("x")).await.unwrap();
    coordinator.complete(&upload_id, &[1]).await.unwrap();

    assert!(matches!(
        coordinator.complete(&upload_id, &[1]).await.unwrap_err(),
        StorageError::Conflict { .. }
    ));
    assert!(matches!(
        coordinator.abort(&upload_id).await.unwrap_err(),
        StorageError::Conflict { .. }
    ));
}

#[tokio::test]
async fn test_unknown_session() {
    let (_dir, _store, _manager, coordinator) = engine();
    assert!(matches!(
        coordinator.stage_part("nope", 1, stream_from("x")).await.unwrap_err(),
        StorageError::SessionNotFound { .. }
    ));
    assert!(matches!(
        coordinator.complete("nope", &[1]).await.unwrap_err(),
        StorageError::SessionNotFound { .. }
    ));
    assert!(matches!(
        coordinator.abort("nope").await.unwrap_err(),
        StorageError::SessionNotFound { .. }
    ));
}

#[tokio::test]
async fn test_initiate_requires_bucket_and_valid_part_numbers() {
    let (_dir, _store, manager, coordinator) = engine();
    assert!(matches!(
        coordinator.initiate("nope", "k", PutOptions::default()).await.unwrap_err(),
        StorageError::BucketNotFound { .. }
    ));

    manager.create_bucket("data").await.unwrap();
    let upload_id = coordinator.initiate("data", "k", PutOptions::default()).await.unwrap();
    for bad in [0u32, 10_001] {
        let err = coordinator
            .stage_part(&upload_id, bad, stream_from("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey { .. }));
    }
}

#[tokio::test]
async fn test_sweep_aborts_idle_sessions() {
    let (_dir, store, manager, coordinator) = engine();
    manager.create_bucket("data").await.unwrap();

    let upload_id = coordinator.initiate("data", "k", PutOptions::default()).await.unwrap();
    coordinator.stage_part(&upload_id, 1, stream_from("x")).await.unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    let aborted = coordinator.sweep_expired(Duration::from_millis(5)).await;
    assert_eq!(aborted, 1);
    assert_eq!(store.blob_count(), 0);

    // the aborted session stays around for a grace period, then is dropped
    coordinator.abort(&upload_id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(coordinator.sweep_expired(Duration::from_millis(5)).await, 0);
    assert!(matches!(
        coordinator.abort(&upload_id).await.unwrap_err(),
        StorageError::SessionNotFound { .. }
    ));
}
