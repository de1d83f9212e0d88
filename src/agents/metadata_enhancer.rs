use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::ProviderKind;
use crate::error::Result;
use crate::external::{DiscoveredPaper, SearchConfig};
use crate::providers::{ChatMessage, ChatPrompt};
use crate::resilience::LoadStatus;

use super::base::{require_non_blank, AgentBase};
use super::{Agent, AgentKind, AgentResult, AgentTask};

struct SourceResult {
    source: &'static str,
    paper: Option<DiscoveredPaper>,
}

/// Four independent lookups against the same external-search capability,
/// standing in for the DOI resolver / cross-reference index /
/// semantic-scholar-like index / author-disambiguation sources spec.md
/// section 4.8 names -- the crate only defines one `ExternalSearch`
/// interface, so each branch queries it a different way.
async fn query_source(
    base: &AgentBase,
    source: &'static str,
    title: &str,
    doi: Option<&str>,
) -> SourceResult {
    let paper = match source {
        "doi_resolver" => match doi {
            Some(doi) => base.external.resolve_doi(doi).await.ok().flatten(),
            None => None,
        },
        _ => base
            .external
            .search_by_title(title, &SearchConfig::default(), 1)
            .await
            .ok()
            .and_then(|mut v| if v.is_empty() { None } else { Some(v.remove(0)) }),
    };
    SourceResult { source, paper }
}

/// Detects a disagreement among the sources that returned a record:
/// different non-empty titles for the same lookup. Recorded, not
/// resolved by majority vote (spec.md section 4.8).
fn find_conflicts(results: &[SourceResult]) -> Vec<Value> {
    let mut titles: Vec<(&'static str, &str)> = results
        .iter()
        .filter_map(|r| r.paper.as_ref().map(|p| (r.source, p.title.as_str())))
        .collect();
    titles.sort_by_key(|(_, title)| *title);

    let distinct: std::collections::HashSet<&str> = titles.iter().map(|(_, t)| *t).collect();
    if distinct.len() <= 1 {
        return Vec::new();
    }

    vec![json!({
        "field": "title",
        "values": titles.iter().map(|(source, title)| json!({"source": source, "value": title})).collect::<Vec<_>>(),
    })]
}

pub struct MetadataEnhancerAgent {
    base: Arc<AgentBase>,
}

impl MetadataEnhancerAgent {
    pub fn new(base: AgentBase) -> Self {
        Self {
            base: Arc::new(base),
        }
    }

    async fn process_with_config(&self, task: AgentTask) -> Result<Value> {
        let title = require_non_blank("title", task.text_field("title"))?;
        let doi = task.text_field("doi").map(str::to_string);

        let sources: [&'static str; 4] = [
            "doi_resolver",
            "cross_reference_index",
            "semantic_index",
            "author_disambiguation",
        ];

        let mut works: Vec<
            Box<dyn FnOnce() -> std::pin::Pin<Box<dyn std::future::Future<Output = SourceResult> + Send>> + Send>,
        > = Vec::new();

        for source in sources {
            let base = self.base.clone();
            let title = title.clone();
            let doi = doi.clone();
            works.push(Box::new(move || {
                Box::pin(async move { query_source(&base, source, &title, doi.as_deref()).await })
            }));
        }

        let joined = self.base.pool.join_all(works).await;
        let results: Vec<SourceResult> = joined.into_iter().filter_map(Result::ok).collect();
        let conflicts = find_conflicts(&results);

        let found: Vec<&DiscoveredPaper> = results.iter().filter_map(|r| r.paper.as_ref()).collect();

        let synthesis_prompt = ChatPrompt::new(vec![
            ChatMessage::system(
                "Merge the following candidate metadata records for the same paper into \
                 one canonical record. Prefer the most complete fields; note any \
                 remaining disagreement briefly.",
            ),
            ChatMessage::user(
                found
                    .iter()
                    .map(|p| format!("{}: {} ({})", p.id, p.title, p.authors.join(", ")))
                    .collect::<Vec<_>>()
                    .join("\n"),
            ),
        ]);

        let synthesis = if found.is_empty() {
            None
        } else {
            Some(
                self.base
                    .execute_prompt("synthesize_metadata", synthesis_prompt)
                    .await?
                    .text,
            )
        };

        if let Some(paper) = found.first() {
            self.base.save_artifact((*paper).clone()).await;
        }

        Ok(json!({
            "title": title,
            "sourcesQueried": sources.len(),
            "sourcesFound": found.len(),
            "synthesis": synthesis,
            "conflicts": conflicts,
        }))
    }
}

#[async_trait]
impl Agent for MetadataEnhancerAgent {
    fn agent_kind(&self) -> AgentKind {
        AgentKind::MetadataEnhancer
    }

    fn provider(&self) -> ProviderKind {
        self.base.provider_kind
    }

    fn can_handle(&self, task: &AgentTask) -> bool {
        task.agent_kind == AgentKind::MetadataEnhancer
            && task
                .text_field("title")
                .map(|s| !s.trim().is_empty())
                .unwrap_or(false)
    }

    fn estimate_processing_time(&self, _task: &AgentTask) -> Duration {
        Duration::from_millis(1_500)
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

    fn paper(id: &str, title: &str) -> DiscoveredPaper {
        DiscoveredPaper {
            id: id.to_string(),
            title: title.to_string(),
            authors: vec!["A. Author".to_string()],
            year: None,
            journal: None,
            venue: None,
            citation_count: None,
            doi: None,
            arxiv_id: None,
            abstract_text: None,
            url: None,
        }
    }

    #[test]
    fn no_conflict_when_all_sources_agree() {
        let results = vec![
            SourceResult { source: "doi_resolver", paper: Some(paper("1", "Same Title")) },
            SourceResult { source: "cross_reference_index", paper: Some(paper("1", "Same Title")) },
        ];
        assert!(find_conflicts(&results).is_empty());
    }

    #[test]
    fn conflict_recorded_when_titles_disagree() {
        let results = vec![
            SourceResult { source: "doi_resolver", paper: Some(paper("1", "Title A")) },
            SourceResult { source: "semantic_index", paper: Some(paper("2", "Title B")) },
        ];
        let conflicts = find_conflicts(&results);
        assert_eq!(conflicts.len(), 1);
    }

    #[test]
    fn missing_sources_do_not_count_as_conflicts() {
        let results = vec![
            SourceResult { source: "doi_resolver", paper: Some(paper("1", "Title A")) },
            SourceResult { source: "author_disambiguation", paper: None },
        ];
        assert!(find_conflicts(&results).is_empty());
    }
}
