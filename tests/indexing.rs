mod common;

use std::collections::HashSet;
use std::sync::Arc;

use common::{corpus, index_config, HashEmbedding};
use pgdocs_rag::application::IndexService;
use pgdocs_rag::domain::{ports::VectorIndex, Chunk, DomainError, Embedding, IndexEntry, SearchParams};
use pgdocs_rag::infrastructure::{FlatIndex, HnswIndex, IndexConfig, LiveIndex, SnapshotStore};

fn service(dir: &std::path::Path) -> (IndexService, Arc<LiveIndex>) {
    let live = Arc::new(LiveIndex::new(
        HnswIndex::empty(index_config("postgresql_docs")).unwrap(),
    ));
    let service = IndexService::new(
        HashEmbedding::new(),
        live.clone(),
        SnapshotStore::new(dir),
        index_config("postgresql_docs"),
    )
    .with_batching(2, 3)
    .with_chunking(1000, 200);
    (service, live)
}

#[tokio::test]
async fn test_rebuild_twice_yields_identical_stats() {
    let dir = tempfile::tempdir().unwrap();
    let (service, live) = service(dir.path());

    let first = service.rebuild(corpus()).await.unwrap();
    let second = service.rebuild(corpus()).await.unwrap();

    assert_eq!(first.entry_count, corpus().len());
    assert_eq!(first.entry_count, second.entry_count);
    assert_eq!(first.dimension, second.dimension);
    assert_eq!(first.index_type, second.index_type);
    assert_eq!(second.embedding_model.as_deref(), Some("hash-bow"));
    assert_eq!(live.current().len(), corpus().len());
}

#[tokio::test]
async fn test_embedding_keeps_chunk_order_across_batches() {
    let dir = tempfile::tempdir().unwrap();
    let (service, _) = service(dir.path());

    let entries = service.embed_chunks(corpus()).await.unwrap();
    let ids: Vec<&str> = entries.iter().map(IndexEntry::id).collect();
    let expected: Vec<String> = corpus().into_iter().map(|c| c.id).collect();
    assert_eq!(ids, expected);
    for entry in &entries {
        assert_eq!(entry.embedding, HashEmbedding::vector(&entry.chunk.text));
    }
}

#[tokio::test]
async fn test_failed_rebuild_keeps_serving_previous_index() {
    let dir = tempfile::tempdir().unwrap();
    let (service, live) = service(dir.path());
    service.rebuild(corpus()).await.unwrap();

    let mut broken = corpus();
    let duplicate = broken[0].clone();
    broken.push(duplicate);
    let err = service.rebuild(broken).await.unwrap_err();
    assert!(matches!(err, DomainError::IndexBuild(_)));

    assert_eq!(live.current().len(), corpus().len());
    let snapshot = SnapshotStore::new(dir.path())
        .load("postgresql_docs")
        .await
        .unwrap();
    assert_eq!(snapshot.len(), corpus().len());
}

#[tokio::test]
async fn test_reload_swaps_in_persisted_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let (builder, _) = service(dir.path());
    builder.rebuild(corpus()).await.unwrap();

    let (server, live) = service(dir.path());
    assert!(live.current().is_empty());
    assert!(server.snapshot_exists().await);

    let stats = server.reload().await.unwrap();
    assert_eq!(stats.entry_count, corpus().len());

    let query = HashEmbedding::vector("dead tuples vacuum storage");
    let hits = live.search(&query, &SearchParams::top_k(1)).await.unwrap();
    assert_eq!(hits.chunk_ids(), vec!["sql-vacuum-0"]);
}

#[tokio::test]
async fn test_reload_without_snapshot_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let (service, _) = service(dir.path());
    assert!(matches!(service.reload().await, Err(DomainError::NotFound(_))));
}

/// Deterministic pseudo-random unit-ish vectors.
fn random_entries(n: usize, dim: usize, seed: u64) -> Vec<IndexEntry> {
    let mut state = seed;
    let mut next = move || {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((state >> 33) as f32 / (1u64 << 31) as f32) * 2.0 - 1.0
    };
    (0..n)
        .map(|i| {
            let v: Vec<f32> = (0..dim).map(|_| next()).collect();
            IndexEntry::new(
                Chunk::new(format!("r{i}"), "", "", "https://e.org/r.html", i),
                Embedding::new(v),
            )
        })
        .collect()
}

async fn recall_against_flat(
    hnsw: &HnswIndex,
    flat: &FlatIndex,
    queries: &[IndexEntry],
    k: usize,
    ef: usize,
) -> f64 {
    let mut total = 0.0;
    for q in queries {
        let exact: HashSet<String> = flat
            .search(&q.embedding, &SearchParams::top_k(k))
            .await
            .unwrap()
            .chunk_ids()
            .into_iter()
            .map(String::from)
            .collect();
        let approx = hnsw
            .search(&q.embedding, &SearchParams::top_k(k).with_ef(ef))
            .unwrap();
        let found = approx
            .chunk_ids()
            .into_iter()
            .filter(|id| exact.contains(*id))
            .count();
        total += found as f64 / k as f64;
    }
    total / queries.len() as f64
}

#[tokio::test]
async fn test_hnsw_recall_against_flat_baseline() {
    let dim = 24;
    let entries = random_entries(600, dim, 7);
    let queries = random_entries(40, dim, 99);

    let hnsw = HnswIndex::build(
        entries.clone(),
        IndexConfig::new("recall", dim).with_graph_params(16, 128, 64),
    )
    .unwrap();
    let flat = FlatIndex::from_entries("recall", dim, entries).unwrap();

    let recall = recall_against_flat(&hnsw, &flat, &queries, 10, 64).await;
    assert!(recall >= 0.9, "recall@10 = {recall}");
}

#[tokio::test]
async fn test_larger_ef_does_not_reduce_recall() {
    let dim = 24;
    let entries = random_entries(600, dim, 11);
    let queries = random_entries(40, dim, 123);

    let hnsw = HnswIndex::build(
        entries.clone(),
        IndexConfig::new("ef", dim).with_graph_params(8, 64, 10),
    )
    .unwrap();
    let flat = FlatIndex::from_entries("ef", dim, entries).unwrap();

    let narrow = recall_against_flat(&hnsw, &flat, &queries, 10, 10).await;
    let wide = recall_against_flat(&hnsw, &flat, &queries, 10, 300).await;
    assert!(wide >= narrow, "ef=300 recall {wide} < ef=10 recall {narrow}");
    assert!(wide >= 0.9);
}

#[tokio::test]
async fn test_search_is_deterministic_for_fixed_build() {
    let entries = random_entries(200, 16, 3);
    let config = IndexConfig::new("det", 16).with_graph_params(8, 64, 32);
    let a = HnswIndex::build(entries.clone(), config.clone()).unwrap();
    let b = HnswIndex::build(entries, config).unwrap();

    let query = random_entries(1, 16, 42).remove(0).embedding;
    let params = SearchParams::top_k(8);
    assert_eq!(
        a.search(&query, &params).unwrap().chunk_ids(),
        b.search(&query, &params).unwrap().chunk_ids()
    );
}
