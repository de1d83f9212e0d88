use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::ProviderKind;
use crate::error::{AgentError, Result};
use crate::providers::{ChatMessage, ChatPrompt};
use crate::resilience::LoadStatus;

use super::base::{require_non_blank, AgentBase};
use super::{Agent, AgentKind, AgentResult, AgentTask};

const BATCH_SIZE: usize = 5;
const MAX_TERMS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    HighSchool,
    Undergraduate,
    Graduate,
    Expert,
}

const LEVELS: [Level; 4] = [
    Level::HighSchool,
    Level::Undergraduate,
    Level::Graduate,
    Level::Expert,
];

impl Level {
    fn as_str(self) -> &'static str {
        match self {
            Level::HighSchool => "HIGH_SCHOOL",
            Level::Undergraduate => "UNDERGRADUATE",
            Level::Graduate => "GRADUATE",
            Level::Expert => "EXPERT",
        }
    }
}

/// One sub-prompt's outcome. The relationship-graph branch and the four
/// level branches all resolve to this so they can share one
/// [`WorkerPool::join_all`] call (spec.md section 4.8's "all five join").
enum Branch {
    Explanations {
        level: Level,
        terms: Vec<String>,
        text: String,
    },
    Graph(String),
}

/// Parses a newline- or comma-separated list of terms out of a model
/// response, capped at [`MAX_TERMS`]. Pure so it's testable without a
/// provider.
fn parse_terms(text: &str) -> Vec<String> {
    text.lines()
        .flat_map(|line| line.split(','))
        .map(|t| t.trim().trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c == '-' || c == ' '))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .take(MAX_TERMS)
        .map(str::to_string)
        .collect()
}

pub struct ConceptExplainerAgent {
    base: Arc<AgentBase>,
}

impl ConceptExplainerAgent {
    pub fn new(base: AgentBase) -> Self {
        Self {
            base: Arc::new(base),
        }
    }

    async fn process_with_config(&self, task: AgentTask) -> Result<Value> {
        let text = require_non_blank("textContent", task.text_field("textContent"))?;

        let extract_prompt = ChatPrompt::new(vec![
            ChatMessage::system(
                "List the 20 most conceptually complex technical terms in this text, \
                 one per line, ordered from most to least complex.",
            ),
            ChatMessage::user(text),
        ]);
        let extracted = self.base.execute_prompt("extract_terms", extract_prompt).await?;
        let terms = parse_terms(&extracted.text);
        if terms.is_empty() {
            return Err(AgentError::invalid_input(
                "no technical terms could be extracted from textContent",
            ));
        }

        let batches: Vec<Vec<String>> = terms.chunks(BATCH_SIZE).map(|c| c.to_vec()).collect();

        type BranchOutcome = std::result::Result<Branch, AgentError>;
        let mut works: Vec<
            Box<dyn FnOnce() -> std::pin::Pin<Box<dyn std::future::Future<Output = BranchOutcome> + Send>> + Send>,
        > = Vec::new();

        for level in LEVELS {
            for batch in &batches {
                let base = self.base.clone();
                let batch = batch.clone();
                works.push(Box::new(move || {
                    Box::pin(async move {
                        let text = explain_batch(&base, level, &batch).await?;
                        Ok(Branch::Explanations {
                            level,
                            terms: batch,
                            text,
                        })
                    })
                }));
            }
        }

        {
            let base = self.base.clone();
            let all_terms = terms.clone();
            works.push(Box::new(move || {
                Box::pin(async move { Ok(Branch::Graph(synthesize_graph(&base, &all_terms).await?)) })
            }));
        }

        let results = self.base.pool.join_all(works).await;

        let mut explanations: std::collections::HashMap<&'static str, Vec<Value>> =
            std::collections::HashMap::new();
        let mut graph = Value::Null;

        for result in results {
            // The outer `Result` is the pool's own (panicked/cancelled
            // task); the inner one is the branch's provider call. Either
            // must propagate so the retry/breaker layer sees the failure.
            match result? {
                Ok(Branch::Explanations { level, terms, text }) => {
                    explanations.entry(level.as_str()).or_default().push(json!({
                        "terms": terms,
                        "explanation": text,
                    }));
                }
                Ok(Branch::Graph(text)) => graph = json!({ "description": text }),
                Err(e) => return Err(e),
            }
        }

        Ok(json!({
            "paperId": task.text_field("paperId"),
            "terms": terms,
            "explanationsByLevel": explanations,
            "relationshipGraph": graph,
        }))
    }
}

async fn explain_batch(base: &AgentBase, level: Level, batch: &[String]) -> Result<String> {
    let prompt = ChatPrompt::new(vec![
        ChatMessage::system(format!(
            "Explain the following terms at a {} comprehension level, one \
             short paragraph each.",
            level.as_str()
        )),
        ChatMessage::user(batch.join(", ")),
    ]);
    Ok(base.execute_prompt("explain_terms", prompt).await?.text)
}

async fn synthesize_graph(base: &AgentBase, terms: &[String]) -> Result<String> {
    let prompt = ChatPrompt::new(vec![
        ChatMessage::system(
            "Describe how the following terms relate to one another as a \
             concise relationship graph in prose.",
        ),
        ChatMessage::user(terms.join(", ")),
    ]);
    Ok(base.execute_prompt("synthesize_graph", prompt).await?.text)
}

#[async_trait]
impl Agent for ConceptExplainerAgent {
    fn agent_kind(&self) -> AgentKind {
        AgentKind::ConceptExplainer
    }

    fn provider(&self) -> ProviderKind {
        self.base.provider_kind
    }

    fn can_handle(&self, task: &AgentTask) -> bool {
        task.agent_kind == AgentKind::ConceptExplainer
            && task
                .text_field("textContent")
                .map(|s| !s.trim().is_empty())
                .unwrap_or(false)
    }

    fn estimate_processing_time(&self, task: &AgentTask) -> Duration {
        let chars = task.text_field("textContent").map(str::len).unwrap_or(0);
        Duration::from_millis(1_000 + (chars as u64) / 2)
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_numbered_newline_separated_terms() {
        let text = "1. gradient descent\n2. backpropagation\n3. attention mechanism\n";
        let terms = parse_terms(text);
        assert_eq!(terms, vec!["gradient descent", "backpropagation", "attention mechanism"]);
    }

    #[test]
    fn caps_at_twenty_terms() {
        let text = (1..=30).map(|i| format!("term{i}")).collect::<Vec<_>>().join("\n");
        assert_eq!(parse_terms(&text).len(), MAX_TERMS);
    }

    #[test]
    fn batch_count_matches_scenario_five_for_twelve_terms() {
        let terms: Vec<String> = (0..12).map(|i| format!("t{i}")).collect();
        let batches: Vec<_> = terms.chunks(BATCH_SIZE).collect();
        assert_eq!(batches.len(), 3);
        assert_eq!(LEVELS.len() * batches.len(), 12);
    }
}
