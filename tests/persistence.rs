//! Persistence: SQLite round trips, the debounced ticker, failure retry
//!
//! Run with: `cargo test --test persistence`

mod common;

use common::{sample_messages, FlakyStore};
use idiolect::engine::{
    CONFIDENCE_FACTORS_KEY, CONTEXT_SCORES_KEY, DOMAIN_SCORES_KEY, FUSION_WEIGHTS_KEY,
    SIGNAL_SCORES_KEY, TOPICS_KEY, TRIPLES_KEY,
};
use idiolect::{
    AnalysisEngine, ConfidenceFactor, DomainId, EngineConfig, IdiolectError, KeyValueStore,
    MockModel, OpenStore, SignalType, SqliteStore, StorageError,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

fn sqlite_engine(path: &Path, config: EngineConfig) -> AnalysisEngine {
    let store = SqliteStore::open(path).unwrap();
    let engine = AnalysisEngine::new(config).with_store(Arc::new(store));
    engine.load().unwrap();
    engine
}

fn fast_flush() -> EngineConfig {
    EngineConfig {
        flush_interval_ms: 40,
        ..EngineConfig::default()
    }
}

// === Scenario: SQLite round trip ===

#[test]
fn state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("idiolect.db");

    let before = {
        let engine = sqlite_engine(&path, EngineConfig::default());
        for m in sample_messages() {
            engine.process_message(m);
        }
        engine.set_fusion_weight(SignalType::Embedding, 10);
        engine.build_relationship_graph(&["music".to_string()]);
        engine.flush().unwrap();
        engine.snapshot()
    };

    let engine = sqlite_engine(&path, EngineConfig::default());
    let after = engine.snapshot();

    assert_eq!(after.fusion_weights, before.fusion_weights);
    assert_eq!(engine.fusion_weights().embedding, 10);
    assert_eq!(after.domain_scores.len(), before.domain_scores.len());
    for (a, b) in after.domain_scores.iter().zip(&before.domain_scores) {
        assert_eq!(a.domain_id, b.domain_id);
        assert_eq!(a.data_points_count, b.data_points_count);
        assert!((a.score - b.score).abs() < 1e-12);
        assert!((a.confidence - b.confidence).abs() < 1e-12);
    }
    assert_eq!(
        after.context_domain_scores.len(),
        before.context_domain_scores.len()
    );
    assert_eq!(
        after.hybrid_signal_scores.len(),
        before.hybrid_signal_scores.len()
    );
    assert_eq!(
        after.confidence_factors.len(),
        before.confidence_factors.len()
    );
    let ids = |s: &idiolect::Snapshot| s.relationship_triples.iter().map(|t| t.id).collect::<Vec<_>>();
    assert_eq!(ids(&after), ids(&before));
    assert!(!engine.is_dirty());
}

#[test]
fn fresh_database_loads_neutral_state() {
    let dir = tempfile::tempdir().unwrap();
    let engine = sqlite_engine(&dir.path().join("empty.db"), EngineConfig::default());
    assert!(engine.domain_scores().is_empty());
    assert!(engine.relationship_triples().is_empty());
    assert_eq!(engine.context_scores("openness").len(), 10);
    assert!(engine
        .context_scores("openness")
        .iter()
        .all(|r| r.data_points_count == 0 && r.score == 0.5));
}

#[test]
fn every_table_has_its_own_key() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let engine = AnalysisEngine::new(EngineConfig::default()).with_store(store.clone());
    engine.process_message("I plan and organize everything carefully");
    engine.flush().unwrap();

    let keys = store.keys().unwrap();
    for key in [
        DOMAIN_SCORES_KEY,
        CONTEXT_SCORES_KEY,
        SIGNAL_SCORES_KEY,
        TRIPLES_KEY,
        CONFIDENCE_FACTORS_KEY,
        FUSION_WEIGHTS_KEY,
        TOPICS_KEY,
    ] {
        assert!(keys.iter().any(|k| k == key), "missing key {}", key);
    }
}

#[test]
fn corrupt_row_fails_load() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    store.set(DOMAIN_SCORES_KEY, b"not json").unwrap();
    let engine = AnalysisEngine::new(EngineConfig::default()).with_store(store);
    assert!(matches!(
        engine.load(),
        Err(IdiolectError::Storage(StorageError::Serialization(_)))
    ));
}

#[test]
fn reset_is_persisted_immediately() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("idiolect.db");
    {
        let engine = sqlite_engine(&path, EngineConfig::default())
            .with_model(Arc::new(MockModel::available().with_response("{}")));
        engine.set_fusion_weight(SignalType::Lexicon, 60);
        for m in sample_messages() {
            engine.process_message(m);
        }
        engine.flush().unwrap();
        assert!(engine.deep_queue_len() > 0);

        engine.reset().unwrap();
        assert_eq!(engine.deep_queue_len(), 0);
        assert!(tokio_test::block_on(engine.flush_deep_batch())
            .unwrap()
            .is_none());
    }

    let engine = sqlite_engine(&path, EngineConfig::default());
    assert!(engine.domain_scores().is_empty());
    assert!(engine.signal_records().is_empty());
    assert_eq!(engine.fusion_weights().lexicon, 60);
}

#[test]
fn temporal_stability_moves_confidence_and_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("idiolect.db");
    let optimism = DomainId::from("optimism");

    let confidence = {
        let engine = sqlite_engine(&path, EngineConfig::default());
        engine.process_message("I feel happy and grateful today with my friends");
        // data_volume and cross_validation are set after the first message
        let before = engine.domain_score("optimism").unwrap().confidence;
        assert!(before < 1.0);

        let after =
            engine.set_confidence_factor(&optimism, ConfidenceFactor::TemporalStability, 1.0);
        assert!((after - (2.0 * before + 1.0) / 3.0).abs() < 1e-12);
        assert_eq!(engine.domain_score("optimism").unwrap().confidence, after);
        assert!(engine.is_dirty());
        engine.flush().unwrap();
        after
    };

    let engine = sqlite_engine(&path, EngineConfig::default());
    let restored = engine.domain_score("optimism").unwrap();
    assert!((restored.confidence - confidence).abs() < 1e-12);
    let temporal = engine
        .snapshot()
        .confidence_factors
        .into_iter()
        .find(|r| r.domain_id == optimism && r.factor == ConfidenceFactor::TemporalStability)
        .unwrap();
    assert_eq!(temporal.value, 1.0);
    assert_eq!(temporal.weight, 0.25);

    // Later updates still average in the restored factor
    let lowered = engine.set_confidence_factor(&optimism, ConfidenceFactor::TemporalStability, 0.0);
    assert!(lowered < confidence);
}

// === Scenario: debounced writes ===

#[test]
fn failed_write_is_retried() {
    let store = Arc::new(FlakyStore::new());
    let engine = AnalysisEngine::new(EngineConfig::default()).with_store(store.clone());
    engine.process_message("I feel happy and grateful today");

    store.fail_next(1);
    assert!(engine.persist_if_dirty().is_err());
    assert!(engine.is_dirty());
    assert_eq!(engine.persistence_writes(), 0);

    assert!(engine.persist_if_dirty().unwrap());
    assert!(!engine.is_dirty());
    assert!(!engine.persist_if_dirty().unwrap());
    assert_eq!(engine.persistence_writes(), 1);
}

#[tokio::test]
async fn burst_of_updates_coalesces_into_one_write() {
    let store = Arc::new(FlakyStore::new());
    let engine = Arc::new(AnalysisEngine::new(fast_flush()).with_store(store.clone()));
    let ticker = engine.start_persistence();

    for _ in 0..25 {
        for m in sample_messages() {
            engine.process_message(m);
        }
    }
    assert_eq!(store.sets(), 0);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(engine.persistence_writes(), 1);
    assert!(!engine.is_dirty());

    engine.process_message("one more thing to think about");
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(engine.persistence_writes(), 2);

    ticker.shutdown().await;
    engine.process_message("after shutdown");
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(engine.persistence_writes(), 2);
    assert!(engine.is_dirty());
    engine.flush().unwrap();
    assert!(!engine.is_dirty());
}

#[tokio::test]
async fn ticker_retries_after_failure() {
    let store = Arc::new(FlakyStore::new());
    let engine = Arc::new(AnalysisEngine::new(fast_flush()).with_store(store.clone()));
    let ticker = engine.start_persistence();

    store.fail_next(1);
    engine.process_message("I wonder about new ideas and art");

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(engine.persistence_writes(), 1);
    assert!(!engine.is_dirty());
    ticker.shutdown().await;

    let reloaded = AnalysisEngine::new(EngineConfig::default()).with_store(store);
    reloaded.load().unwrap();
    assert_eq!(reloaded.domain_scores().len(), engine.domain_scores().len());
}
