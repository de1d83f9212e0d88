use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::ProviderKind;
use crate::error::{AgentError, Result};
use crate::external::{DiscoveredPaper, SearchConfig};
use crate::providers::{ChatMessage, ChatPrompt};
use crate::resilience::LoadStatus;

use super::base::AgentBase;
use super::{Agent, AgentKind, AgentResult, AgentTask};

const CONFIDENCE_THRESHOLD: f64 = 0.7;

#[derive(Debug, Clone, Deserialize)]
pub struct CitationInput {
    pub raw_text: String,
    #[serde(default)]
    pub doi: Option<String>,
    #[serde(default)]
    pub arxiv_id: Option<String>,
}

/// Parses a `0.0`-`1.0` confidence score out of a free-text model reply,
/// looking for the first decimal number on its own or after "confidence".
/// Falls back to `0.0` when nothing parses -- never panics on bad model
/// output.
fn parse_confidence(text: &str) -> f64 {
    for token in text.split(|c: char| !c.is_ascii_digit() && c != '.') {
        if let Ok(value) = token.parse::<f64>() {
            if (0.0..=1.0).contains(&value) {
                return value;
            }
            if (0.0..=100.0).contains(&value) {
                return value / 100.0;
            }
        }
    }
    0.0
}

pub struct CitationVerifierAgent {
    base: Arc<AgentBase>,
}

impl CitationVerifierAgent {
    pub fn new(base: AgentBase) -> Self {
        Self {
            base: Arc::new(base),
        }
    }

    async fn resolve(&self, citation: &CitationInput) -> Option<DiscoveredPaper> {
        if let Some(doi) = &citation.doi {
            if let Ok(Some(paper)) = self.base.external.resolve_doi(doi).await {
                return Some(paper);
            }
        }
        if let Some(arxiv_id) = &citation.arxiv_id {
            if let Ok(Some(paper)) = self.base.external.resolve_arxiv(arxiv_id).await {
                return Some(paper);
            }
        }
        match self
            .base
            .external
            .search_by_title(&citation.raw_text, &SearchConfig::default(), 1)
            .await
        {
            Ok(mut candidates) if !candidates.is_empty() => Some(candidates.remove(0)),
            _ => None,
        }
    }

    async fn process_with_config(&self, task: AgentTask) -> Result<Value> {
        let citations: Vec<CitationInput> = serde_json::from_value(
            task.input
                .get("citations")
                .cloned()
                .unwrap_or(Value::Array(Vec::new())),
        )?;
        if citations.is_empty() {
            return Err(AgentError::invalid_input("citations is empty"));
        }

        let mut verified_citations = Vec::with_capacity(citations.len());

        for citation in &citations {
            let candidate = self.resolve(citation).await;

            let (matched, confidence) = match &candidate {
                Some(paper) => {
                    let prompt = ChatPrompt::new(vec![
                        ChatMessage::system(
                            "Compare the cited text against the candidate paper record and \
                             respond with a single confidence number between 0.0 and 1.0 that \
                             they refer to the same work.",
                        ),
                        ChatMessage::user(format!(
                            "Cited text: {}\nCandidate: {} by {}",
                            citation.raw_text,
                            paper.title,
                            paper.authors.join(", ")
                        )),
                    ]);
                    let response = self.base.execute_prompt("verify_citation", prompt).await?;
                    (true, parse_confidence(&response.text))
                }
                None => (false, 0.0),
            };

            verified_citations.push(json!({
                "rawText": citation.raw_text,
                "matchedPaperId": candidate.as_ref().map(|p| p.id.clone()),
                "confidence": confidence,
                "verified": matched && confidence >= CONFIDENCE_THRESHOLD,
            }));
        }

        Ok(json!({
            "paperId": task.text_field("paperId"),
            "citations": verified_citations,
        }))
    }
}

#[async_trait]
impl Agent for CitationVerifierAgent {
    fn agent_kind(&self) -> AgentKind {
        AgentKind::CitationVerifier
    }

    fn provider(&self) -> ProviderKind {
        self.base.provider_kind
    }

    fn can_handle(&self, task: &AgentTask) -> bool {
        task.agent_kind == AgentKind::CitationVerifier
            && task
                .input
                .get("citations")
                .and_then(Value::as_array)
                .map(|a| !a.is_empty())
                .unwrap_or(false)
    }

    fn estimate_processing_time(&self, task: &AgentTask) -> Duration {
        let count = task
            .input
            .get("citations")
            .and_then(Value::as_array)
            .map(|a| a.len())
            .unwrap_or(0);
        Duration::from_millis(300 * count as u64 + 200)
    }

    fn load_status(&self) -> LoadStatus {
        self.base.load_status()
    }

    fn has_retry_policy(&self) -> bool {
        self.base.retry.is_some()
    }

    async fn process(&self, task: AgentTask) -> AgentResult {
        let can_handle = self.can_handle(&task);
        self.base
            .dispatch(task, can_handle, |t| self.process_with_config(t))
            .await
    }
}
