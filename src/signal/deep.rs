//! DeepSignalAdapter — batched generative-model assessment
//!
//! Messages queue until a batch is due (enough queued messages, or enough
//! time since the last batch with at least one queued). Exactly one batch
//! runs at a time; messages arriving meanwhile wait for the next one. Each
//! batch gets a single attempt: on failure its window is discarded.

use super::types::{SignalObservation, SignalType};
use crate::domain::{DomainId, DOMAINS};
use crate::model::{extract_json, GenerativeModel, ModelError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Errors from a deep batch.
#[derive(Debug, thiserror::Error)]
pub enum DeepSignalError {
    #[error("model unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("response parse error: {0}")]
    Parse(String),
}

/// Why one domain entry in a model response was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssessmentErrorKind {
    NotAnObject,
    MissingDomain,
    MissingScore,
    MissingConfidence,
    OutOfRange,
}

impl AssessmentErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotAnObject => "not_an_object",
            Self::MissingDomain => "missing_domain",
            Self::MissingScore => "missing_score",
            Self::MissingConfidence => "missing_confidence",
            Self::OutOfRange => "out_of_range",
        }
    }
}

/// Parse outcome for one domain.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainAssessment {
    Ok {
        domain_id: DomainId,
        score: f64,
        confidence: f64,
        evidence: Option<String>,
    },
    Err {
        domain_id: Option<DomainId>,
        kind: AssessmentErrorKind,
    },
}

/// Parsed result of one deep batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeepAnalysis {
    pub assessments: Vec<DomainAssessment>,
    /// Topics the model identified in the window
    pub topics: Vec<String>,
}

impl DeepAnalysis {
    /// llm observations for every accepted assessment.
    pub fn observations(&self) -> Vec<SignalObservation> {
        self.assessments
            .iter()
            .filter_map(|a| match a {
                DomainAssessment::Ok {
                    domain_id,
                    score,
                    confidence,
                    evidence,
                } => {
                    let obs =
                        SignalObservation::new(domain_id.clone(), SignalType::Llm, *score, *confidence);
                    Some(match evidence {
                        Some(e) => obs.with_evidence(e.clone()),
                        None => obs,
                    })
                }
                DomainAssessment::Err { .. } => None,
            })
            .collect()
    }

    pub fn rejected(&self) -> usize {
        self.assessments
            .iter()
            .filter(|a| matches!(a, DomainAssessment::Err { .. }))
            .count()
    }
}

/// A message waiting for the deep signal.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedMessage {
    pub text: String,
    pub received_at: DateTime<Utc>,
}

impl QueuedMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            received_at: Utc::now(),
        }
    }
}

/// Produces a per-domain assessment for a window of messages.
#[async_trait]
pub trait DeepAnalyzer: Send + Sync {
    async fn analyze(&self, window: &[QueuedMessage]) -> Result<DeepAnalysis, DeepSignalError>;
}

/// Deep analyzer over a [`GenerativeModel`].
pub struct LlmDeepAnalyzer {
    model: Arc<dyn GenerativeModel>,
    domains: Vec<DomainId>,
}

impl LlmDeepAnalyzer {
    /// Analyzer asking about every catalog domain.
    pub fn new(model: Arc<dyn GenerativeModel>) -> Self {
        Self {
            model,
            domains: DOMAINS.iter().map(|d| DomainId::from(d.id)).collect(),
        }
    }

    pub fn with_domains(mut self, domains: Vec<DomainId>) -> Self {
        self.domains = domains;
        self
    }

    pub fn build_prompt(&self, window: &[QueuedMessage]) -> String {
        let domains: Vec<&str> = self.domains.iter().map(DomainId::as_str).collect();
        let messages: Vec<&str> = window.iter().map(|m| m.text.as_str()).collect();
        format!(
            "Assess the author of the messages below on these psychological domains: {}.\n\
             Respond with a single JSON object of the form\n\
             {{\"domains\": {{\"<domain>\": {{\"score\": 0.0-1.0, \"confidence\": 0.0-1.0, \"evidence\": \"...\"}}}}, \"topics\": [\"...\"]}}\n\
             Only include domains the messages give evidence for.\n\n\
             Messages:\n{}",
            domains.join(", "),
            messages.join("\n---\n"),
        )
    }
}

#[async_trait]
impl DeepAnalyzer for LlmDeepAnalyzer {
    async fn analyze(&self, window: &[QueuedMessage]) -> Result<DeepAnalysis, DeepSignalError> {
        if !self.model.is_available().await {
            return Err(DeepSignalError::Unavailable(
                "generative model is not reachable".to_string(),
            ));
        }
        let prompt = self.build_prompt(window);
        let response = self.model.complete(&prompt).await?;
        parse_response(&response)
    }
}

/// Parse a model response into tagged per-domain assessments.
///
/// Accepts `"domains"` as either an object keyed by domain id or an array
/// of objects carrying a `"domain"` field.
pub fn parse_response(text: &str) -> Result<DeepAnalysis, DeepSignalError> {
    let value = extract_json(text)
        .ok_or_else(|| DeepSignalError::Parse("no JSON object in response".to_string()))?;
    let domains = value
        .get("domains")
        .ok_or_else(|| DeepSignalError::Parse("missing 'domains' field".to_string()))?;

    let assessments = match domains {
        serde_json::Value::Object(map) => map
            .iter()
            .map(|(id, v)| parse_assessment(Some(DomainId::from(id.as_str())), v))
            .collect(),
        serde_json::Value::Array(items) => items
            .iter()
            .map(|v| {
                let id = v
                    .get("domain")
                    .and_then(|d| d.as_str())
                    .map(DomainId::from);
                parse_assessment(id, v)
            })
            .collect(),
        _ => {
            return Err(DeepSignalError::Parse(
                "'domains' must be an object or array".to_string(),
            ))
        }
    };

    let topics = value
        .get("topics")
        .and_then(|t| t.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|t| t.as_str())
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect()
        })
        .unwrap_or_default();

    Ok(DeepAnalysis {
        assessments,
        topics,
    })
}

fn unit(value: Option<&serde_json::Value>) -> Result<f64, bool> {
    // Err(true) = present but out of range, Err(false) = missing
    match value.and_then(|v| v.as_f64()) {
        Some(x) if (0.0..=1.0).contains(&x) => Ok(x),
        Some(_) => Err(true),
        None => Err(false),
    }
}

fn parse_assessment(domain_id: Option<DomainId>, value: &serde_json::Value) -> DomainAssessment {
    let reject = |domain_id, kind| DomainAssessment::Err { domain_id, kind };

    let Some(obj) = value.as_object() else {
        return reject(domain_id, AssessmentErrorKind::NotAnObject);
    };
    let Some(id) = domain_id.clone() else {
        return reject(None, AssessmentErrorKind::MissingDomain);
    };
    let score = match unit(obj.get("score")) {
        Ok(s) => s,
        Err(true) => return reject(domain_id, AssessmentErrorKind::OutOfRange),
        Err(false) => return reject(domain_id, AssessmentErrorKind::MissingScore),
    };
    let confidence = match unit(obj.get("confidence")) {
        Ok(c) => c,
        Err(true) => return reject(domain_id, AssessmentErrorKind::OutOfRange),
        Err(false) => return reject(domain_id, AssessmentErrorKind::MissingConfidence),
    };
    let evidence = obj
        .get("evidence")
        .and_then(|e| e.as_str())
        .map(str::to_string)
        .filter(|e| !e.is_empty());

    DomainAssessment::Ok {
        domain_id: id,
        score,
        confidence,
        evidence,
    }
}

/// When a batch is due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchTrigger {
    pub batch_size: usize,
    pub interval: Duration,
}

impl Default for BatchTrigger {
    fn default() -> Self {
        Self {
            batch_size: 5,
            interval: Duration::from_secs(300),
        }
    }
}

/// A completed deep batch.
#[derive(Debug, Clone)]
pub struct DeepBatch {
    pub messages: Vec<QueuedMessage>,
    pub analysis: DeepAnalysis,
}

/// Clears the in-flight flag when the batch ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct DeepSignalAdapter {
    analyzer: Arc<dyn DeepAnalyzer>,
    trigger: BatchTrigger,
    queue: Mutex<Vec<QueuedMessage>>,
    in_flight: AtomicBool,
    last_batch: Mutex<Instant>,
}

impl DeepSignalAdapter {
    pub fn new(analyzer: Arc<dyn DeepAnalyzer>, trigger: BatchTrigger) -> Self {
        Self {
            analyzer,
            trigger,
            queue: Mutex::new(Vec::new()),
            in_flight: AtomicBool::new(false),
            last_batch: Mutex::new(Instant::now()),
        }
    }

    pub fn trigger(&self) -> BatchTrigger {
        self.trigger
    }

    /// Queue a message; returns the queue length.
    pub fn enqueue(&self, text: impl Into<String>) -> usize {
        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        queue.push(QueuedMessage::new(text));
        queue.len()
    }

    pub fn queued(&self) -> usize {
        self.queue.lock().map(|q| q.len()).unwrap_or(0)
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn is_due(&self) -> bool {
        self.is_due_at(Instant::now())
    }

    /// Whether a batch should start at `now`.
    pub fn is_due_at(&self, now: Instant) -> bool {
        if self.is_in_flight() {
            return false;
        }
        let queued = self.queued();
        if queued == 0 {
            return false;
        }
        if queued >= self.trigger.batch_size {
            return true;
        }
        let last = *self.last_batch.lock().unwrap_or_else(|e| e.into_inner());
        now.saturating_duration_since(last) >= self.trigger.interval
    }

    /// Drop queued messages and restart the interval clock.
    pub fn reset(&self) {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).clear();
        *self.last_batch.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
    }

    /// Run a batch if one is due.
    pub async fn run_if_due(&self) -> Result<Option<DeepBatch>, DeepSignalError> {
        if !self.is_due() {
            return Ok(None);
        }
        self.run(false).await
    }

    /// Run a batch over whatever is queued, ignoring the trigger.
    pub async fn run_now(&self) -> Result<Option<DeepBatch>, DeepSignalError> {
        self.run(true).await
    }

    async fn run(&self, force: bool) -> Result<Option<DeepBatch>, DeepSignalError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("deep batch already in flight");
            return Ok(None);
        }
        let _guard = InFlight(&self.in_flight);

        let window: Vec<QueuedMessage> = {
            let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
            let premature = !force
                && queue.len() < self.trigger.batch_size
                && !self.interval_elapsed();
            if queue.is_empty() || premature {
                return Ok(None);
            }
            queue.drain(..).collect()
        };
        *self.last_batch.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();

        info!(messages = window.len(), "deep batch started");
        match self.analyzer.analyze(&window).await {
            Ok(analysis) => {
                info!(
                    accepted = analysis.assessments.len() - analysis.rejected(),
                    rejected = analysis.rejected(),
                    "deep batch completed"
                );
                Ok(Some(DeepBatch {
                    messages: window,
                    analysis,
                }))
            }
            Err(e) => {
                warn!(error = %e, discarded = window.len(), "deep batch failed, window discarded");
                Err(e)
            }
        }
    }

    fn interval_elapsed(&self) -> bool {
        let last = *self.last_batch.lock().unwrap_or_else(|e| e.into_inner());
        last.elapsed() >= self.trigger.interval
    }
}
