use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::ProviderKind;
use crate::error::Result;
use crate::providers::{ChatMessage, ChatPrompt};
use crate::resilience::LoadStatus;

use super::base::{require_non_blank, AgentBase};
use super::{Agent, AgentKind, AgentResult, AgentTask};

const ACADEMIC_KEYWORDS: &[&str] = &[
    "method", "result", "hypothesis", "analysis", "findings", "significant", "data", "experiment",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryType {
    Brief,
    Standard,
    Detailed,
}

impl SummaryType {
    fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "brief" => Some(SummaryType::Brief),
            "standard" => Some(SummaryType::Standard),
            "detailed" => Some(SummaryType::Detailed),
            _ => None,
        }
    }

    fn word_band(self) -> (usize, usize) {
        match self {
            SummaryType::Brief => (20, 50),
            SummaryType::Standard => (50, 100),
            SummaryType::Detailed => (100, 250),
        }
    }
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Quality score: 60 points for landing within the configured word band
/// (scaled down linearly for how far outside it falls), 40 points spread
/// across presence of academic-register keywords (spec.md section 4.8).
fn score_summary_quality(text: &str, summary_type: SummaryType) -> u8 {
    let (min, max) = summary_type.word_band();
    let words = word_count(text);

    let band_score = if words >= min && words <= max {
        60.0
    } else {
        let distance = if words < min { min - words } else { words - max } as f64;
        let span = min.max(1) as f64;
        (60.0 - (distance / span) * 60.0).max(0.0)
    };

    let lower = text.to_lowercase();
    let hits = ACADEMIC_KEYWORDS.iter().filter(|k| lower.contains(*k)).count();
    let keyword_score = (hits.min(4) as f64 / 4.0) * 40.0;

    (band_score + keyword_score).round().clamp(0.0, 100.0) as u8
}

pub struct SummarizerAgent {
    base: Arc<AgentBase>,
}

impl SummarizerAgent {
    pub fn new(base: AgentBase) -> Self {
        Self {
            base: Arc::new(base),
        }
    }

    async fn process_with_config(&self, task: AgentTask) -> Result<Value> {
        let text = require_non_blank("textContent", task.text_field("textContent"))?;
        let summary_type = task
            .text_field("summaryType")
            .and_then(SummaryType::parse)
            .unwrap_or(SummaryType::Standard);
        let (min_words, max_words) = summary_type.word_band();

        let prompt = ChatPrompt::new(vec![
            ChatMessage::system(format!(
                "Summarize the following paper in {min_words}-{max_words} words, using an \
                 academic register."
            )),
            ChatMessage::user(text),
        ]);

        let response = self.base.execute_prompt("summarize", prompt).await?;
        let quality = score_summary_quality(&response.text, summary_type);

        Ok(json!({
            "paperId": task.text_field("paperId"),
            "summaryType": summary_type,
            "summary": {
                "text": response.text,
                "wordCount": word_count(&response.text),
            },
            "qualityScore": quality,
        }))
    }
}

#[async_trait]
impl Agent for SummarizerAgent {
    fn agent_kind(&self) -> AgentKind {
        AgentKind::Summarizer
    }

    fn provider(&self) -> ProviderKind {
        self.base.provider_kind
    }

    fn can_handle(&self, task: &AgentTask) -> bool {
        task.agent_kind == AgentKind::Summarizer
            && task
                .text_field("textContent")
                .map(|s| !s.trim().is_empty())
                .unwrap_or(false)
    }

    fn estimate_processing_time(&self, task: &AgentTask) -> Duration {
        let chars = task.text_field("textContent").map(str::len).unwrap_or(0);
        Duration::from_millis(400 + (chars as u64) / 10)
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
    fn in_band_summary_scores_at_least_sixty() {
        let text = "word ".repeat(75) + "method result analysis significant";
        assert!(score_summary_quality(&text, SummaryType::Standard) >= 60);
    }

    #[test]
    fn far_outside_band_scores_low_on_band_component() {
        let text = "word ".repeat(5);
        let score = score_summary_quality(&text, SummaryType::Standard);
        assert!(score < 30);
    }

    #[test]
    fn summary_type_parses_case_insensitively() {
        assert_eq!(SummaryType::parse("BRIEF"), Some(SummaryType::Brief));
        assert_eq!(SummaryType::parse("unknown"), None);
    }

    #[test]
    fn word_bands_match_spec_scenario_one() {
        assert_eq!(SummaryType::Standard.word_band(), (50, 100));
    }
}
