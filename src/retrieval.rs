//! Relevance-filtered retrieval over a [`SimilaritySearch`] backend.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument};

use crate::providers::retry::{RetryConfig, with_retry};
use crate::providers::traits::SimilaritySearch;
use crate::types::RetrievedPassage;
use crate::{MimirError, Result};

/// Configuration for the retriever.
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// Maximum passages returned. Default: 5.
    pub k: usize,
    /// Relevance floor; passages scoring below it are dropped. Default: 0.25.
    pub min_score: f32,
    /// Timeout per search attempt. Default: 5s.
    pub timeout: Duration,
    /// Retry policy for failed searches. Default: one retry.
    pub retry: RetryConfig,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: 5,
            min_score: 0.25,
            timeout: Duration::from_secs(5),
            retry: RetryConfig::new().initial_delay(Duration::from_millis(100)),
        }
    }
}

impl RetrievalConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// Text sent to the similarity search: apostrophes (straight and curly)
/// removed, whitespace collapsed.
///
/// Embedding models treat "Cory's" and "Corys" differently enough to
/// miss matches, so possessives are flattened before searching.
pub fn search_text(query: &str) -> String {
    query
        .replace(['\'', '\u{2019}', '\u{2018}'], "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Wraps a similarity search with ranking, a relevance floor, top-k
/// limiting, a per-attempt timeout and bounded retry.
///
/// Stateless across calls.
#[derive(Clone)]
pub struct Retriever {
    search: Arc<dyn SimilaritySearch>,
    config: RetrievalConfig,
}

impl Retriever {
    pub fn new(search: Arc<dyn SimilaritySearch>, config: RetrievalConfig) -> Self {
        Self { search, config }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Retrieve with the configured `k` and relevance floor.
    pub async fn retrieve_default(&self, query_text: &str) -> Result<Vec<RetrievedPassage>> {
        self.retrieve(query_text, self.config.k, self.config.min_score)
            .await
    }

    /// Passages scoring at least `min_score`, best first, at most `k`.
    ///
    /// Zero qualifying passages is `Ok(vec![])`. Any search failure,
    /// including a timeout, is `RetrievalUnavailable` once retries are
    /// exhausted.
    #[instrument(name = "retriever.retrieve", skip(self, query_text), fields(search = %self.search.name()))]
    pub async fn retrieve(
        &self,
        query_text: &str,
        k: usize,
        min_score: f32,
    ) -> Result<Vec<RetrievedPassage>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let text = search_text(query_text);
        let raw = with_retry(&self.config.retry, "retrieve", || self.search_once(&text, k)).await?;
        let total = raw.len();
        let passages = rank(raw, k, min_score);
        debug!(total, kept = passages.len(), min_score, "retrieved passages");
        Ok(passages)
    }

    async fn search_once(&self, text: &str, k: usize) -> Result<Vec<RetrievedPassage>> {
        match tokio::time::timeout(self.config.timeout, self.search.search(text, k)).await {
            Ok(Ok(passages)) => Ok(passages),
            Ok(Err(e @ MimirError::RetrievalUnavailable(_))) => Err(e),
            Ok(Err(e)) => Err(MimirError::RetrievalUnavailable(e.to_string())),
            Err(_) => Err(MimirError::RetrievalUnavailable(format!(
                "search timed out after {:?}",
                self.config.timeout
            ))),
        }
    }
}

/// Drop passages below the floor (and NaN scores), sort best first, keep `k`.
fn rank(passages: Vec<RetrievedPassage>, k: usize, min_score: f32) -> Vec<RetrievedPassage> {
    let mut kept: Vec<_> = passages
        .into_iter()
        .filter(|p| p.score >= min_score)
        .collect();
    kept.sort_by(|a, b| b.score.total_cmp(&a.score));
    kept.truncate(k);
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(score: f32, id: &str) -> RetrievedPassage {
        RetrievedPassage::new(format!("text {id}"), score, id)
    }

    #[test]
    fn search_text_strips_apostrophes() {
        assert_eq!(search_text("What is Cory's role?"), "What is Corys role?");
        assert_eq!(search_text("Cory\u{2019}s   skills "), "Corys skills");
    }

    #[test]
    fn rank_filters_sorts_and_truncates() {
        let ranked = rank(vec![p(0.3, "a"), p(0.9, "b"), p(0.5, "c"), p(0.7, "d")], 2, 0.5);
        let ids: Vec<_> = ranked.iter().map(|p| p.source_id.as_str()).collect();
        assert_eq!(ids, ["b", "d"]);
    }

    #[test]
    fn rank_keeps_score_equal_to_floor() {
        let ranked = rank(vec![p(0.5, "a")], 5, 0.5);
        assert_eq!(ranked.len(), 1);
    }

    #[test]
    fn rank_drops_nan() {
        let ranked = rank(vec![p(f32::NAN, "a"), p(0.6, "b")], 5, 0.0);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].source_id, "b");
    }

    #[test]
    fn rank_may_return_nothing() {
        assert!(rank(vec![p(0.1, "a")], 5, 0.5).is_empty());
    }
}
