//! Agent base (C6), provider specializations' consumers, and the five
//! concrete agents (C8). Grounded in the teacher's `Agent` trait
//! (`src/agent/agent.rs`) but recast from an inheritance tree into
//! composition, per spec.md section 9: a concrete agent *has* a provider
//! binding, a retry policy, a rate limiter, a meter, and a worker pool
//! behind one `process(task) -> result` interface.

pub mod base;
pub mod citation_verifier;
pub mod concept_explainer;
pub mod fallback;
pub mod metadata_enhancer;
pub mod paper_structure;
pub mod summarizer;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::config::ProviderKind;
use crate::resilience::LoadStatus;

/// Discriminator for what an agent does. Shared between a primary agent
/// and its local-provider fallback twin -- C9 looks fallbacks up by kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentKind {
    PaperStructureExtractor,
    ConceptExplainer,
    CitationVerifier,
    MetadataEnhancer,
    Summarizer,
}

impl AgentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentKind::PaperStructureExtractor => "paper_structure_extractor",
            AgentKind::ConceptExplainer => "concept_explainer",
            AgentKind::CitationVerifier => "citation_verifier",
            AgentKind::MetadataEnhancer => "metadata_enhancer",
            AgentKind::Summarizer => "summarizer",
        }
    }
}

/// Immutable request handed to a dispatch. Never mutated once created;
/// discarded by the caller after the matching [`AgentResult`] arrives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTask {
    pub id: String,
    pub agent_kind: AgentKind,
    pub input: Value,
    pub submitted_at: DateTime<Utc>,
}

impl AgentTask {
    pub fn new(agent_kind: AgentKind, input: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            agent_kind,
            input,
            submitted_at: Utc::now(),
        }
    }

    pub fn text_field(&self, key: &str) -> Option<&str> {
        self.input.get(key).and_then(Value::as_str)
    }
}

/// Diagnostic snapshot attached to every [`AgentResult`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingMetrics {
    pub agent_kind: AgentKind,
    pub provider: &'static str,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub load_status: LoadStatusLabel,
}

/// Serializable mirror of [`LoadStatus`] (the resilience type has no
/// serde impl of its own since it's an internal pool signal, not wire
/// data).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadStatusLabel {
    Low,
    Medium,
    High,
}

impl From<LoadStatus> for LoadStatusLabel {
    fn from(status: LoadStatus) -> Self {
        match status {
            LoadStatus::Low => LoadStatusLabel::Low,
            LoadStatus::Medium => LoadStatusLabel::Medium,
            LoadStatus::High => LoadStatusLabel::High,
        }
    }
}

/// Outcome of a dispatch. Always produced -- the substrate never raises
/// out of `process`, per spec.md section 7's uniform-envelope contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    pub task_id: String,
    pub success: bool,
    pub result: Option<Value>,
    pub error_message: Option<String>,
    pub duration: Duration,
    pub metrics: Option<ProcessingMetrics>,
    pub used_fallback: bool,
    pub primary_failure_reason: Option<String>,
}

impl AgentResult {
    pub fn invalid_input(task_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            success: false,
            result: None,
            error_message: Some(message.into()),
            duration: Duration::ZERO,
            metrics: None,
            used_fallback: false,
            primary_failure_reason: None,
        }
    }
}

/// The one interface every agent implements, whatever its internal
/// composition (spec.md section 4.6).
#[async_trait]
pub trait Agent: Send + Sync {
    fn agent_kind(&self) -> AgentKind;

    fn provider(&self) -> ProviderKind;

    fn can_handle(&self, task: &AgentTask) -> bool;

    fn estimate_processing_time(&self, task: &AgentTask) -> Duration;

    fn load_status(&self) -> LoadStatus;

    async fn process(&self, task: AgentTask) -> AgentResult;

    /// `false` for fallback (local-twin) agents: they execute directly,
    /// never re-entering C3 (spec.md section 4.9). Defaults to `true`,
    /// the shape of every primary agent; concrete agents report their
    /// actual `AgentBase::retry` presence instead of relying on this.
    fn has_retry_policy(&self) -> bool {
        true
    }
}
