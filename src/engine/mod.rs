//! AnalysisEngine: the owner of all analysis state
//!
//! Holds the extractors, the fusion weights, both score stores, the signal
//! records, the triple log and the persistence handle. Nothing lives in
//! module-level statics; `load` and `reset` define the lifecycle.

mod persistence;

pub use persistence::{
    Persistence, Snapshot, CONFIDENCE_FACTORS_KEY, CONTEXT_SCORES_KEY, DOMAIN_SCORES_KEY,
    FUSION_WEIGHTS_KEY, SIGNAL_SCORES_KEY, TOPICS_KEY, TRIPLES_KEY,
};

use crate::config::EngineConfig;
use crate::context::{ContextClassification, ContextClassifier, ContextVariation, ContextVarianceAnalyzer};
use crate::domain::{ContextDomainScore, ContextType, DomainId, DomainScore};
use crate::error::IdiolectResult;
use crate::model::GenerativeModel;
use crate::relationship::{RelationshipGraphBuilder, RelationshipTriple, TripleStore};
use crate::scores::confidence::{consistency, data_volume};
use crate::scores::{ConfidenceFactor, ContextScoreStore, DomainScoreStore};
use crate::signal::{
    DeepAnalyzer, DeepBatch, DeepSignalAdapter, Embedder, EmbeddingSimilarityScorer, FusedScore,
    FusionWeights, LexiconSignalExtractor, LlmDeepAnalyzer, SignalFusionEngine, SignalObservation,
    SignalRecord, SignalType,
};
use crate::storage::{KeyValueStore, MemoryStore, StorageResult};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// What one fused update did to one domain.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainUpdate {
    pub domain_id: DomainId,
    pub fused: FusedScore,
    /// Aggregate score after the update
    pub score: f64,
    pub confidence: f64,
    pub data_points_count: u64,
}

#[derive(Debug, Clone)]
pub struct MessageReport {
    pub context: ContextClassification,
    pub updates: Vec<DomainUpdate>,
    /// Whether a deep batch is now due
    pub deep_due: bool,
}

#[derive(Debug, Clone)]
pub struct DeepReport {
    pub messages: usize,
    pub context: ContextClassification,
    pub updates: Vec<DomainUpdate>,
    pub topics: Vec<String>,
    pub rejected: usize,
}

pub struct AnalysisEngine {
    config: EngineConfig,
    lexicon: LexiconSignalExtractor,
    embedding: Option<EmbeddingSimilarityScorer>,
    deep: Option<DeepSignalAdapter>,
    fusion: RwLock<SignalFusionEngine>,
    classifier: ContextClassifier,
    variance: ContextVarianceAnalyzer,
    relationships: RelationshipGraphBuilder,
    domain_scores: DomainScoreStore,
    context_scores: ContextScoreStore,
    signals: DashMap<(DomainId, SignalType), SignalRecord>,
    triples: TripleStore,
    topics: RwLock<Vec<String>>,
    persistence: Persistence,
}

impl AnalysisEngine {
    /// Engine with lexicon signal only, persisting to memory.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            lexicon: LexiconSignalExtractor::new(),
            embedding: None,
            deep: None,
            fusion: RwLock::new(SignalFusionEngine::new(config.fusion_weights)),
            classifier: ContextClassifier::new(),
            variance: ContextVarianceAnalyzer::new(config.significance_threshold),
            relationships: RelationshipGraphBuilder::new(config.relationships),
            domain_scores: DomainScoreStore::new(),
            context_scores: ContextScoreStore::new(),
            signals: DashMap::new(),
            triples: TripleStore::new(),
            topics: RwLock::new(Vec::new()),
            persistence: Persistence::new(Arc::new(MemoryStore::new())),
            config,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.persistence = Persistence::new(store);
        self
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedding = Some(EmbeddingSimilarityScorer::with_prototypes(
            embedder,
            self.config.prototype_set(),
        ));
        self
    }

    pub fn with_deep_analyzer(mut self, analyzer: Arc<dyn DeepAnalyzer>) -> Self {
        self.deep = Some(DeepSignalAdapter::new(analyzer, self.config.batch_trigger()));
        self
    }

    pub fn with_model(self, model: Arc<dyn GenerativeModel>) -> Self {
        self.with_deep_analyzer(Arc::new(LlmDeepAnalyzer::new(model)))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // === Lifecycle ===

    /// Replace in-memory state with what the store holds.
    pub fn load(&self) -> IdiolectResult<()> {
        let snapshot = self.persistence.load()?;
        info!(
            domains = snapshot.domain_scores.len(),
            triples = snapshot.relationship_triples.len(),
            "loading persisted state"
        );

        self.domain_scores
            .restore(snapshot.domain_scores, snapshot.confidence_factors);
        self.context_scores.restore(snapshot.context_domain_scores);
        self.signals.clear();
        for record in snapshot.hybrid_signal_scores {
            self.signals
                .insert((record.domain_id.clone(), record.signal_type), record);
        }
        self.triples.restore(snapshot.relationship_triples);
        *self.topics.write().unwrap_or_else(|e| e.into_inner()) = snapshot.topics;
        if let Some(w) = snapshot.fusion_weights {
            self.fusion_engine_mut()
                .set_weights(FusionWeights::from_parts(w.lexicon, w.embedding, w.llm));
        }
        if let Some(embedding) = &self.embedding {
            embedding.reset();
        }
        Ok(())
    }

    /// Explicit full reset: every score back to the neutral prior, signal
    /// records, triples and queued messages dropped. Fusion weights are
    /// settings and survive. The cleared state is flushed immediately.
    pub fn reset(&self) -> IdiolectResult<()> {
        self.domain_scores.reset();
        self.context_scores.reset();
        self.signals.clear();
        self.triples.clear();
        self.topics.write().unwrap_or_else(|e| e.into_inner()).clear();
        if let Some(deep) = &self.deep {
            deep.reset();
        }
        if let Some(embedding) = &self.embedding {
            embedding.reset();
        }
        info!("engine reset");
        self.flush()
    }

    /// Write the full snapshot and make it durable.
    pub fn flush(&self) -> IdiolectResult<()> {
        self.persistence.flush(self.snapshot())?;
        Ok(())
    }

    /// Write the snapshot only if something changed since the last write.
    pub fn persist_if_dirty(&self) -> StorageResult<bool> {
        self.persistence.write_if_dirty(|| self.snapshot())
    }

    pub fn is_dirty(&self) -> bool {
        self.persistence.is_dirty()
    }

    pub fn persistence_writes(&self) -> u64 {
        self.persistence.writes()
    }

    pub fn snapshot(&self) -> Snapshot {
        let mut signals: Vec<SignalRecord> = self.signals.iter().map(|r| r.value().clone()).collect();
        signals.sort_by(|a, b| {
            a.domain_id
                .cmp(&b.domain_id)
                .then(a.signal_type.cmp(&b.signal_type))
        });
        Snapshot {
            domain_scores: self.domain_scores.all(),
            context_domain_scores: self.context_scores.all(),
            hybrid_signal_scores: signals,
            relationship_triples: self.triples.all(),
            confidence_factors: self.domain_scores.factor_records(),
            fusion_weights: Some(self.fusion_weights()),
            topics: self.topics(),
        }
    }

    /// Start the debounced persistence ticker.
    pub fn start_persistence(self: &Arc<Self>) -> Ticker {
        let engine = Arc::clone(self);
        spawn_ticker("persistence", self.config.flush_interval(), move || {
            let engine = engine.clone();
            async move {
                if let Err(e) = engine.persist_if_dirty() {
                    warn!(error = %e, "persistence tick failed, retrying next tick");
                }
            }
        })
    }

    /// Start the ticker that runs a deep batch whenever one is due, so the
    /// interval trigger fires even when no further messages arrive. `None`
    /// when the engine has no deep signal.
    pub fn start_deep_signal(self: &Arc<Self>) -> Option<Ticker> {
        self.deep.as_ref()?;
        let engine = Arc::clone(self);
        Some(spawn_ticker("deep", self.config.deep_poll_interval(), move || {
            let engine = engine.clone();
            async move {
                match engine.run_deep_batch().await {
                    Ok(Some(report)) => info!(
                        messages = report.messages,
                        updated = report.updates.len(),
                        "deep batch applied"
                    ),
                    Ok(None) => {}
                    Err(e) => warn!(error = %e, "deep signal omitted for this batch"),
                }
            }
        }))
    }

    // === Signals ===

    /// Run the per-message signals and fold the fused result into both stores.
    pub fn process_message(&self, text: &str) -> MessageReport {
        let context = self.classifier.classify(text);
        if text.trim().is_empty() {
            return MessageReport {
                context,
                updates: Vec::new(),
                deep_due: false,
            };
        }

        let analysis = self.lexicon.analyze(text);
        let mut observations = self.lexicon.observations(&analysis);
        if let Some(embedding) = &self.embedding {
            observations.extend(embedding.observations(text));
        }
        if let Some(deep) = &self.deep {
            deep.enqueue(text);
        }

        debug!(
            context = %context.primary,
            tokens = analysis.token_count,
            observations = observations.len(),
            "message processed"
        );
        let updates = self.fuse_and_apply(observations, context.primary, 1);
        MessageReport {
            context,
            updates,
            deep_due: self.deep.as_ref().map_or(false, |d| d.is_due()),
        }
    }

    fn fuse_and_apply(
        &self,
        observations: Vec<SignalObservation>,
        context: ContextType,
        points: u64,
    ) -> Vec<DomainUpdate> {
        if observations.is_empty() {
            return Vec::new();
        }
        let weighed = self.fusion_engine().weigh(observations);

        let mut by_domain: BTreeMap<DomainId, Vec<SignalObservation>> = BTreeMap::new();
        for obs in weighed {
            self.signals.insert(
                (obs.domain_id.clone(), obs.signal_type),
                SignalRecord::from(&obs),
            );
            by_domain.entry(obs.domain_id.clone()).or_default().push(obs);
        }

        let mut updates = Vec::new();
        for (domain_id, observations) in by_domain {
            let fused = SignalFusionEngine::fuse(&observations);
            if fused.is_prior() {
                continue;
            }
            let prior = self.domain_scores.get_or_create(&domain_id);
            let Some(updated) = self
                .domain_scores
                .update_domain_score(&domain_id, fused.score, points)
            else {
                continue;
            };

            self.domain_scores.set_factor(
                &domain_id,
                ConfidenceFactor::DataVolume,
                data_volume(updated.data_points_count),
            );
            if prior.has_data() {
                self.domain_scores.set_factor(
                    &domain_id,
                    ConfidenceFactor::Consistency,
                    consistency(prior.score, fused.score),
                );
            }
            let confidence = self.domain_scores.set_factor(
                &domain_id,
                ConfidenceFactor::CrossValidation,
                fused.confidence,
            );
            self.context_scores
                .update(&domain_id, context, fused.score, fused.confidence, points);

            updates.push(DomainUpdate {
                domain_id,
                fused,
                score: updated.score,
                confidence,
                data_points_count: updated.data_points_count,
            });
        }

        self.persistence.mark_dirty();
        updates
    }

    // === Deep signal ===

    pub fn deep_queue_len(&self) -> usize {
        self.deep.as_ref().map_or(0, |d| d.queued())
    }

    /// Run a deep batch if one is due.
    pub async fn run_deep_batch(&self) -> IdiolectResult<Option<DeepReport>> {
        let Some(deep) = &self.deep else {
            return Ok(None);
        };
        match deep.run_if_due().await? {
            Some(batch) => Ok(Some(self.apply_deep_batch(batch))),
            None => Ok(None),
        }
    }

    /// Run a deep batch over whatever is queued, due or not.
    pub async fn flush_deep_batch(&self) -> IdiolectResult<Option<DeepReport>> {
        let Some(deep) = &self.deep else {
            return Ok(None);
        };
        match deep.run_now().await? {
            Some(batch) => Ok(Some(self.apply_deep_batch(batch))),
            None => Ok(None),
        }
    }

    /// Only the llm observations are fused here; the messages' lexicon and
    /// embedding signals were already counted when they arrived.
    fn apply_deep_batch(&self, batch: DeepBatch) -> DeepReport {
        let texts: Vec<&str> = batch.messages.iter().map(|m| m.text.as_str()).collect();
        let context = self.classifier.classify_many(&texts);
        let updates = self.fuse_and_apply(
            batch.analysis.observations(),
            context.primary,
            self.config.deep_data_points,
        );
        self.add_topics(&batch.analysis.topics);
        DeepReport {
            messages: batch.messages.len(),
            context,
            updates,
            topics: batch.analysis.topics.clone(),
            rejected: batch.analysis.rejected(),
        }
    }

    // === Settings ===

    fn fusion_engine(&self) -> std::sync::RwLockReadGuard<'_, SignalFusionEngine> {
        self.fusion.read().unwrap_or_else(|e| e.into_inner())
    }

    fn fusion_engine_mut(&self) -> std::sync::RwLockWriteGuard<'_, SignalFusionEngine> {
        self.fusion.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn fusion_weights(&self) -> FusionWeights {
        self.fusion_engine().weights()
    }

    /// Move one weight slider; the others rescale to keep the sum at 100.
    pub fn set_fusion_weight(&self, signal: SignalType, value: u32) -> FusionWeights {
        let weights = {
            let mut fusion = self.fusion_engine_mut();
            let mut weights = fusion.weights();
            weights.set_weight(signal, value);
            fusion.set_weights(weights);
            weights
        };
        self.persistence.mark_dirty();
        weights
    }

    /// Replace all weights; an invalid sum is redistributed.
    pub fn set_fusion_weights(&self, weights: FusionWeights) -> FusionWeights {
        let corrected = FusionWeights::from_parts(weights.lexicon, weights.embedding, weights.llm);
        self.fusion_engine_mut().set_weights(corrected);
        self.persistence.mark_dirty();
        corrected
    }

    /// Set a confidence factor from outside the engine (e.g. temporal
    /// stability). Returns the domain's new confidence.
    pub fn set_confidence_factor(
        &self,
        domain_id: &DomainId,
        factor: ConfidenceFactor,
        value: f64,
    ) -> f64 {
        let confidence = self.domain_scores.set_factor(domain_id, factor, value);
        self.persistence.mark_dirty();
        confidence
    }

    // === Reads ===

    pub fn domain_scores(&self) -> Vec<DomainScore> {
        self.domain_scores.all()
    }

    pub fn domain_score(&self, domain_id: &str) -> Option<DomainScore> {
        self.domain_scores.get(&DomainId::from(domain_id))
    }

    pub fn context_scores(&self, domain_id: &str) -> Vec<ContextDomainScore> {
        self.context_scores.for_domain(&DomainId::from(domain_id))
    }

    pub fn signal_records(&self) -> Vec<SignalRecord> {
        self.snapshot().hybrid_signal_scores
    }

    pub fn signal_record(&self, domain_id: &str, signal: SignalType) -> Option<SignalRecord> {
        self.signals
            .get(&(DomainId::from(domain_id), signal))
            .map(|r| r.clone())
    }

    pub fn context_variations(&self, significant_only: bool) -> Vec<ContextVariation> {
        let variations = self.variance.analyze(&self.context_scores);
        if significant_only {
            ContextVarianceAnalyzer::significant_only(variations)
        } else {
            variations
        }
    }

    pub fn topics(&self) -> Vec<String> {
        self.topics.read().map(|t| t.clone()).unwrap_or_default()
    }

    fn add_topics(&self, topics: &[String]) {
        if topics.is_empty() {
            return;
        }
        let mut known = self.topics.write().unwrap_or_else(|e| e.into_inner());
        for topic in topics {
            if !known.contains(topic) {
                known.push(topic.clone());
            }
        }
        self.persistence.mark_dirty();
    }

    // === Relationships ===

    /// Derive triples from the current aggregate scores and append them to
    /// the log. Topics seen by the deep signal are included with `topics`.
    pub fn build_relationship_graph(&self, topics: &[String]) -> Vec<RelationshipTriple> {
        let scores: Vec<DomainScore> = self
            .domain_scores
            .all()
            .into_iter()
            .filter(DomainScore::has_data)
            .collect();
        let mut all_topics = self.topics();
        for topic in topics {
            if !all_topics.contains(topic) {
                all_topics.push(topic.clone());
            }
        }

        let triples = self
            .relationships
            .build(&self.config.user_id, &scores, &all_topics);
        let added = self.triples.insert_batch(triples.clone());
        info!(added, total = self.triples.len(), "relationship triples derived");
        self.persistence.mark_dirty();
        triples
    }

    pub fn relationship_triples(&self) -> Vec<RelationshipTriple> {
        self.triples.all()
    }

    /// Bulk delete of the triple log.
    pub fn clear_relationships(&self) {
        self.triples.clear();
        self.persistence.mark_dirty();
    }
}

/// Handle to a background ticker task.
pub struct Ticker {
    stop: Arc<Notify>,
    task: JoinHandle<()>,
}

impl Ticker {
    /// Stop ticking, waiting for a tick in progress to finish. For the
    /// persistence ticker, call `AnalysisEngine::flush` afterwards to
    /// persist anything written since the last tick.
    pub async fn shutdown(self) {
        self.stop.notify_one();
        if let Err(e) = self.task.await {
            warn!(error = %e, "ticker did not stop cleanly");
        }
    }
}

/// Run `tick` every `period` until stopped. The first tick comes one
/// period after the start.
fn spawn_ticker<F, Fut>(name: &'static str, period: Duration, mut tick: F) -> Ticker
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let stop = Arc::new(Notify::new());
    let stopped = stop.clone();
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => tick().await,
                _ = stopped.notified() => break,
            }
        }
        debug!(ticker = name, "ticker stopped");
    });
    Ticker { stop, task }
}
