use std::time::Duration;

use super::*;
use crate::RagError;
use crate::chunking::Chunk;
use tempfile::TempDir;

fn profile() -> EmbeddingProfile {
    EmbeddingProfile {
        model: "test-embedder".to_string(),
        normalize: true,
    }
}

fn sample_index() -> VectorIndex {
    let chunks = vec![
        Chunk {
            content: "aortic stenosis".to_string(),
            source: "cardiology.txt".to_string(),
            sequence: 0,
        },
        Chunk {
            content: "atrial fibrillation".to_string(),
            source: "cardiology.txt".to_string(),
            sequence: 1,
        },
    ];
    let vectors = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
    VectorIndex::build(chunks, vectors, &profile()).expect("index should build")
}

#[tokio::test]
async fn snapshot_is_none_before_any_load() {
    let dir = TempDir::new().expect("should create TempDir successfully");
    let service = IndexService::new(dir.path().join("index.json"), profile());

    assert!(service.snapshot().await.is_none());
    assert!(!service.is_loaded().await);
    assert_eq!(service.index_path(), dir.path().join("index.json"));
}

#[tokio::test]
async fn ensure_loaded_without_file_is_index_not_found() {
    let dir = TempDir::new().expect("should create TempDir successfully");
    let service = IndexService::new(dir.path().join("index.json"), profile());

    let result = service.ensure_loaded().await;
    assert!(matches!(result, Err(RagError::IndexNotFound)));
    assert!(!service.is_loaded().await);
}

#[tokio::test]
async fn ensure_loaded_reads_persisted_file() {
    let dir = TempDir::new().expect("should create TempDir successfully");
    let path = dir.path().join("index.json");
    sample_index().persist(&path).expect("index should persist");

    let service = IndexService::new(path, profile());
    let index = service.ensure_loaded().await.expect("index should load");

    assert_eq!(index.len(), 2);
    assert!(service.is_loaded().await);
}

#[tokio::test]
async fn repeated_loads_return_the_same_snapshot() {
    let dir = TempDir::new().expect("should create TempDir successfully");
    let path = dir.path().join("index.json");
    sample_index().persist(&path).expect("index should persist");

    let service = IndexService::new(path, profile());
    let first = service.ensure_loaded().await.expect("index should load");
    let second = service.ensure_loaded().await.expect("index should load");

    assert!(Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn concurrent_callers_share_one_load() {
    let dir = TempDir::new().expect("should create TempDir successfully");
    let path = dir.path().join("index.json");
    sample_index().persist(&path).expect("index should persist");

    let service = IndexService::new(path, profile());
    let (a, b) = tokio::join!(service.ensure_loaded(), service.ensure_loaded());
    let a = a.expect("index should load");
    let b = b.expect("index should load");

    assert!(Arc::ptr_eq(&a, &b));
}

#[tokio::test]
async fn install_replaces_the_active_index() {
    let dir = TempDir::new().expect("should create TempDir successfully");
    let service = IndexService::new(dir.path().join("index.json"), profile());

    let installed = service.install(sample_index()).await;
    assert!(service.is_loaded().await);

    let snapshot = service.snapshot().await.expect("snapshot should exist");
    assert!(Arc::ptr_eq(&installed, &snapshot));

    let replacement = service.install(sample_index()).await;
    let snapshot = service.snapshot().await.expect("snapshot should exist");
    assert!(Arc::ptr_eq(&replacement, &snapshot));
    assert!(!Arc::ptr_eq(&installed, &replacement));
}

#[tokio::test(flavor = "multi_thread")]
async fn install_during_a_slow_load_is_not_overwritten() {
    let dir = TempDir::new().expect("should create TempDir successfully");
    let path = dir.path().join("index.json");

    // Wide enough that parsing the file takes a while.
    let entries = 20_000;
    let chunks: Vec<Chunk> = (0..entries)
        .map(|sequence| Chunk {
            content: format!("superseded chunk {sequence}"),
            source: "cardiology.txt".to_string(),
            sequence,
        })
        .collect();
    let vectors = vec![vec![0.25_f32; 64]; entries];
    let persisted = VectorIndex::build(chunks, vectors, &profile()).expect("index should build");
    persisted.persist(&path).expect("index should persist");

    let service = Arc::new(IndexService::new(path, profile()));
    let load = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.ensure_loaded().await })
    };

    // Let the load get past its empty-state checks and into the file read.
    tokio::time::sleep(Duration::from_millis(20)).await;
    let fresh = service.install(sample_index()).await;

    load.await
        .expect("load task should not panic")
        .expect("load should succeed");

    let snapshot = service.snapshot().await.expect("snapshot should exist");
    assert!(Arc::ptr_eq(&fresh, &snapshot));
    assert_eq!(snapshot.len(), 2);
}

#[tokio::test]
async fn mismatched_profile_is_rejected_on_load() {
    let dir = TempDir::new().expect("should create TempDir successfully");
    let path = dir.path().join("index.json");
    sample_index().persist(&path).expect("index should persist");

    let other = EmbeddingProfile {
        model: "another-embedder".to_string(),
        normalize: true,
    };
    let service = IndexService::new(path, other);

    let result = service.ensure_loaded().await;
    assert!(matches!(result, Err(RagError::IndexMismatch(_))));
}
