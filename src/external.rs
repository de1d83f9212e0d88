//! External capability interfaces (spec.md section 6): discovery lookups
//! and persistence are out of scope to implement for real, but agents
//! still depend on *some* shape for them, so the substrate defines traits
//! and ships in-memory fakes good enough for tests and local demos.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A normalized record of a paper discovered through an external search
/// (by title, DOI, or arXiv id). Field shape only -- the lookup itself
/// lives behind [`ExternalSearch`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredPaper {
    pub id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub year: Option<i32>,
    pub journal: Option<String>,
    pub venue: Option<String>,
    pub citation_count: Option<u64>,
    pub doi: Option<String>,
    pub arxiv_id: Option<String>,
    pub abstract_text: Option<String>,
    pub url: Option<String>,
}

/// Scopes a title search: how many candidates the caller wants back and
/// an optional minimum-year floor so old namesake papers don't drown out
/// a recent one. Callers that don't care leave both at their defaults.
#[derive(Debug, Clone, Default)]
pub struct SearchConfig {
    pub min_year: Option<i32>,
}

#[async_trait]
pub trait ExternalSearch: Send + Sync {
    async fn search_by_title(
        &self,
        title: &str,
        config: &SearchConfig,
        limit: usize,
    ) -> Result<Vec<DiscoveredPaper>>;
    async fn resolve_doi(&self, doi: &str) -> Result<Option<DiscoveredPaper>>;
    async fn resolve_arxiv(&self, arxiv_id: &str) -> Result<Option<DiscoveredPaper>>;
}

#[async_trait]
pub trait Persistence: Send + Sync {
    async fn find_by_id(&self, paper_id: &str) -> Result<Option<DiscoveredPaper>>;
    async fn save(&self, paper: DiscoveredPaper) -> Result<()>;
    async fn delete_by_paper_id(&self, paper_id: &str) -> Result<()>;
}

/// In-memory stand-in for a real discovery backend (crossref/arXiv
/// clients are an explicit Non-goal). Returns nothing for any query --
/// agents that depend on discovery degrade to their non-discovery path,
/// which is the only behavior worth exercising in this crate's tests.
pub struct NullExternalSearch;

#[async_trait]
impl ExternalSearch for NullExternalSearch {
    async fn search_by_title(
        &self,
        _title: &str,
        _config: &SearchConfig,
        _limit: usize,
    ) -> Result<Vec<DiscoveredPaper>> {
        Ok(Vec::new())
    }

    async fn resolve_doi(&self, _doi: &str) -> Result<Option<DiscoveredPaper>> {
        Ok(None)
    }

    async fn resolve_arxiv(&self, _arxiv_id: &str) -> Result<Option<DiscoveredPaper>> {
        Ok(None)
    }
}

/// In-memory persistence fake. Good enough for tests; a real deployment
/// swaps in a database-backed implementation without touching any agent
/// code, since every agent depends on the trait, not this type.
pub struct InMemoryPersistence {
    papers: std::sync::Mutex<std::collections::HashMap<String, DiscoveredPaper>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self {
            papers: std::sync::Mutex::new(std::collections::HashMap::new()),
        }
    }
}

impl Default for InMemoryPersistence {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Persistence for InMemoryPersistence {
    async fn find_by_id(&self, paper_id: &str) -> Result<Option<DiscoveredPaper>> {
        Ok(self.papers.lock().unwrap().get(paper_id).cloned())
    }

    async fn save(&self, paper: DiscoveredPaper) -> Result<()> {
        self.papers.lock().unwrap().insert(paper.id.clone(), paper);
        Ok(())
    }

    async fn delete_by_paper_id(&self, paper_id: &str) -> Result<()> {
        self.papers.lock().unwrap().remove(paper_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_persistence_round_trips_a_record() {
        let store = InMemoryPersistence::new();
        let paper = DiscoveredPaper {
            id: "p1".into(),
            title: "Attention is All You Need".into(),
            authors: vec!["Vaswani".into()],
            year: Some(2017),
            journal: None,
            venue: Some("NeurIPS".into()),
            citation_count: Some(100_000),
            doi: None,
            arxiv_id: Some("1706.03762".into()),
            abstract_text: None,
            url: None,
        };
        store.save(paper.clone()).await.unwrap();
        assert_eq!(store.find_by_id("p1").await.unwrap().unwrap().title, paper.title);

        store.delete_by_paper_id("p1").await.unwrap();
        assert!(store.find_by_id("p1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn null_external_search_finds_nothing() {
        let search = NullExternalSearch;
        assert!(search
            .search_by_title("anything", &SearchConfig::default(), 5)
            .await
            .unwrap()
            .is_empty());
        assert!(search.resolve_doi("10.1/x").await.unwrap().is_none());
        assert!(search.resolve_arxiv("1234.5678").await.unwrap().is_none());
    }
}
