pub mod duckduckgo;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::ballot::{Candidate, Race};
use crate::error::RetrievalError;

pub use duckduckgo::DuckDuckGo;

/// One hit from a web search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub snippet: String,
    pub url: String,
}

/// A web search backend. Best effort: any number of results, including none.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, RetrievalError>;
}

/// Retrieval knobs.
#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    pub max_results: usize,
    pub timeout: Duration,
    pub retry_backoff: Duration,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            max_results: 5,
            timeout: Duration::from_secs(20),
            retry_backoff: Duration::from_millis(750),
        }
    }
}

/// Turns a candidate into a bounded set of search results.
pub struct Retriever {
    provider: Arc<dyn SearchProvider>,
    config: RetrieverConfig,
}

impl Retriever {
    pub fn new(provider: Arc<dyn SearchProvider>, config: RetrieverConfig) -> Self {
        Self { provider, config }
    }

    /// Query text for a candidate, disambiguated by jurisdiction and office.
    pub fn build_query(candidate: &Candidate, race: &Race) -> String {
        let mut parts = Vec::new();
        if let Some(j) = race.jurisdiction.as_deref().filter(|j| !j.trim().is_empty()) {
            parts.push(j.trim());
        }
        parts.push(candidate.name.trim());
        parts.push(race.name.trim());
        parts.push("politician positions views");
        parts.join(" ")
    }

    pub async fn retrieve(
        &self,
        candidate: &Candidate,
        race: &Race,
    ) -> Result<Vec<SearchResult>, RetrievalError> {
        let query = Self::build_query(candidate, race);
        debug!(candidate = %candidate.name, query = %query, "Searching");

        let results = match self.search_once(&query).await {
            Err(e) if e.is_transient() => {
                warn!(candidate = %candidate.name, "Search failed ({}), retrying once", e);
                tokio::time::sleep(self.config.retry_backoff).await;
                self.search_once(&query).await?
            }
            other => other?,
        };

        let results = self.clean(results);
        debug!(candidate = %candidate.name, results = results.len(), "Search complete");
        Ok(results)
    }

    async fn search_once(&self, query: &str) -> Result<Vec<SearchResult>, RetrievalError> {
        tokio::time::timeout(
            self.config.timeout,
            self.provider.search(query, self.config.max_results),
        )
        .await
        .map_err(|_| RetrievalError::Timeout(self.config.timeout.as_secs()))?
    }

    /// Drop empty snippets and repeated URLs, then cap.
    fn clean(&self, results: Vec<SearchResult>) -> Vec<SearchResult> {
        let mut seen = HashSet::new();
        results
            .into_iter()
            .filter(|r| !r.snippet.trim().is_empty())
            .filter(|r| seen.insert(r.url.clone()))
            .take(self.config.max_results)
            .collect()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeSearch;
    use super::*;

    fn race() -> Race {
        Race::new("Mayor", vec![Candidate::new("Alice", None)]).with_jurisdiction("Raleigh, NC")
    }

    fn fast_config(max_results: usize) -> RetrieverConfig {
        RetrieverConfig {
            max_results,
            timeout: Duration::from_millis(200),
            retry_backoff: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_query_includes_context() {
        let race = race();
        let q = Retriever::build_query(&race.candidates[0], &race);
        assert_eq!(q, "Raleigh, NC Alice Mayor politician positions views");
    }

    #[test]
    fn test_query_without_jurisdiction() {
        let race = Race::new("Mayor", vec![Candidate::new("Bob", None)]);
        let q = Retriever::build_query(&race.candidates[0], &race);
        assert_eq!(q, "Bob Mayor politician positions views");
    }

    #[tokio::test]
    async fn test_results_are_capped_and_cleaned() {
        let provider = FakeSearch::default().with("Alice", &["a", "", "c", "d", "e"]);
        let retriever = Retriever::new(Arc::new(provider), fast_config(2));
        let race = race();

        let results = retriever.retrieve(&race.candidates[0], &race).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].snippet, "a");
        assert_eq!(results[1].snippet, "c");
    }

    #[tokio::test]
    async fn test_zero_results_is_not_an_error() {
        let retriever = Retriever::new(Arc::new(FakeSearch::default()), fast_config(5));
        let race = race();
        let results = retriever.retrieve(&race.candidates[0], &race).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_transient_failure_retried_once() {
        let provider = Arc::new(
            FakeSearch::default().failing("Alice", || RetrievalError::Status(503)),
        );
        let retriever = Retriever::new(provider.clone(), fast_config(5));
        let race = race();

        let err = retriever.retrieve(&race.candidates[0], &race).await.unwrap_err();
        assert!(matches!(err, RetrievalError::Status(503)));
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_permanent_failure_not_retried() {
        let provider = Arc::new(
            FakeSearch::default().failing("Alice", || RetrievalError::Malformed("x".into())),
        );
        let retriever = Retriever::new(provider.clone(), fast_config(5));
        let race = race();

        assert!(retriever.retrieve(&race.candidates[0], &race).await.is_err());
        assert_eq!(provider.call_count(), 1);
    }

    struct Hang;

    #[async_trait]
    impl SearchProvider for Hang {
        async fn search(&self, _: &str, _: usize) -> Result<Vec<SearchResult>, RetrievalError> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn test_hanging_provider_times_out() {
        let retriever = Retriever::new(Arc::new(Hang), fast_config(5));
        let race = race();
        let err = retriever.retrieve(&race.candidates[0], &race).await.unwrap_err();
        assert!(matches!(err, RetrievalError::Timeout(_)));
    }
}
