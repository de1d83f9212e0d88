use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::ProviderKind;
use crate::error::Result;
use crate::providers::{ChatMessage, ChatPrompt};
use crate::resilience::LoadStatus;

use super::base::{require_non_blank, AgentBase};
use super::{Agent, AgentKind, AgentResult, AgentTask};

const MAX_INPUT_CHARS: usize = 8_000;

const CANONICAL_SECTIONS: &[&str] = &[
    "abstract",
    "introduction",
    "methods",
    "results",
    "discussion",
    "conclusion",
    "references",
];

/// Splits a paper's text into canonical sections by scanning for
/// line-start headings that match a section name, its pluralized form, or
/// a colon-suffixed variant (spec.md section 4.8). Deterministic and
/// prompt-independent so it can be unit-tested without a provider.
pub fn locate_sections(text: &str) -> HashMap<&'static str, String> {
    let mut boundaries: Vec<(usize, &'static str)> = Vec::new();

    for (offset, line) in line_starts(text) {
        let normalized = line.trim().trim_end_matches(':').to_lowercase();
        for &section in CANONICAL_SECTIONS {
            if normalized == section || normalized == format!("{section}s") {
                boundaries.push((offset, section));
                break;
            }
        }
    }

    boundaries.sort_by_key(|(offset, _)| *offset);

    let mut sections = HashMap::new();
    for (i, (offset, name)) in boundaries.iter().enumerate() {
        let start = offset + text[*offset..].find('\n').map(|n| n + 1).unwrap_or(0);
        let end = boundaries
            .get(i + 1)
            .map(|(next_offset, _)| *next_offset)
            .unwrap_or(text.len());
        if start < end {
            sections.insert(*name, text[start..end].trim().to_string());
        }
    }
    sections
}

fn line_starts(text: &str) -> impl Iterator<Item = (usize, &str)> {
    let mut offset = 0;
    let mut result = Vec::new();
    for line in text.split('\n') {
        result.push((offset, line));
        offset += line.len() + 1;
    }
    result.into_iter()
}

/// 0-100 score from presence of canonical sections (spec.md section 4.8).
pub fn score_structure_quality(sections: &HashMap<&'static str, String>) -> u8 {
    let found = CANONICAL_SECTIONS
        .iter()
        .filter(|s| sections.contains_key(*s))
        .count();
    ((found * 100) / CANONICAL_SECTIONS.len()) as u8
}

pub struct PaperStructureAgent {
    base: std::sync::Arc<AgentBase>,
}

impl PaperStructureAgent {
    pub fn new(base: AgentBase) -> Self {
        Self {
            base: std::sync::Arc::new(base),
        }
    }

    async fn process_with_config(&self, task: AgentTask) -> Result<Value> {
        let text = require_non_blank("textContent", task.text_field("textContent"))?;
        let truncated: String = text.chars().take(MAX_INPUT_CHARS).collect();

        let prompt = ChatPrompt::new(vec![
            ChatMessage::system(
                "You extract the structure of an academic paper. Identify each \
                 canonical section and restate its heading exactly as it appears \
                 in the source text.",
            ),
            ChatMessage::user(truncated),
        ]);

        let response = self.base.execute_prompt("extract_structure", prompt).await?;
        let sections = locate_sections(&response.text);
        let quality = score_structure_quality(&sections);

        Ok(json!({
            "paperId": task.text_field("paperId"),
            "sections": sections,
            "structureQuality": quality,
        }))
    }
}

#[async_trait]
impl Agent for PaperStructureAgent {
    fn agent_kind(&self) -> AgentKind {
        AgentKind::PaperStructureExtractor
    }

    fn provider(&self) -> ProviderKind {
        self.base.provider_kind
    }

    fn can_handle(&self, task: &AgentTask) -> bool {
        task.agent_kind == AgentKind::PaperStructureExtractor
            && task
                .text_field("textContent")
                .map(|s| !s.trim().is_empty())
                .unwrap_or(false)
    }

    fn estimate_processing_time(&self, task: &AgentTask) -> Duration {
        let chars = task.text_field("textContent").map(str::len).unwrap_or(0);
        Duration::from_millis(500 + (chars.min(MAX_INPUT_CHARS) as u64) / 4)
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
