//! Evidence retrieval.
//!
//! A [`SearchProvider`] performs the outbound literature search and returns
//! loosely-typed [`RawHit`]s. The [`EvidenceRetriever`] clamps the requested
//! limit, bounds the call with a timeout, and normalizes hits into an
//! [`EvidenceSet`]. Zero hits is a valid, empty result.

pub mod exa;

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::RetrievalError;
use crate::types::{EvidenceItem, EvidenceLink, EvidenceSet, Question};

pub use exa::ExaSearchProvider;

/// A single provider result before normalization. Every field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawHit {
    pub title: Option<String>,
    pub summary: Option<String>,
    pub url: Option<String>,
    pub author: Option<String>,
    pub published_date: Option<String>,
}

/// Trait for literature-search backends.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Search for `query`, returning at most `limit` hits in relevance order.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<RawHit>, RetrievalError>;

    /// Short provider name for logs.
    fn name(&self) -> &str;
}

/// Turns a question into a bounded, normalized evidence set.
pub struct EvidenceRetriever {
    provider: std::sync::Arc<dyn SearchProvider>,
    max_limit: usize,
    timeout: Duration,
}

impl EvidenceRetriever {
    pub fn new(
        provider: std::sync::Arc<dyn SearchProvider>,
        max_limit: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            max_limit: max_limit.max(1),
            timeout,
        }
    }

    /// Clamp a requested limit into `1..=max_limit`.
    pub fn clamp_limit(&self, limit: usize) -> usize {
        limit.clamp(1, self.max_limit)
    }

    pub async fn retrieve(
        &self,
        question: &Question,
        limit: usize,
    ) -> Result<EvidenceSet, RetrievalError> {
        let limit = self.clamp_limit(limit);
        debug!(
            provider = self.provider.name(),
            limit,
            "Searching for related literature"
        );

        let hits = match tokio::time::timeout(
            self.timeout,
            self.provider.search(question.as_str(), limit),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    provider = self.provider.name(),
                    timeout_secs = self.timeout.as_secs(),
                    "Literature search timed out"
                );
                return Err(RetrievalError::Timeout {
                    timeout_secs: self.timeout.as_secs(),
                });
            }
        };

        let evidence = normalize_hits(hits, limit);
        info!(
            evidence_count = evidence.len(),
            question = %question.preview(),
            "Found papers for question"
        );
        Ok(evidence)
    }
}

/// Map raw hits into evidence items, keeping order and truncating to `limit`.
///
/// Missing text becomes an empty string and a missing or malformed link
/// becomes the "unavailable" sentinel; a bad field never fails the batch.
pub fn normalize_hits(hits: Vec<RawHit>, limit: usize) -> EvidenceSet {
    let items = hits.into_iter().take(limit).map(|hit| EvidenceItem {
        title: clean_text(hit.title),
        summary: clean_text(hit.summary),
        link: EvidenceLink::parse(hit.url.as_deref()),
        rank: 0,
        author: hit.author.map(|a| a.trim().to_string()).filter(|a| !a.is_empty()),
        published_date: hit.published_date.and_then(normalize_date),
    });
    EvidenceSet::from_items(items)
}

fn clean_text(value: Option<String>) -> String {
    value.map(|v| v.trim().to_string()).unwrap_or_default()
}

/// Keep the `YYYY-MM-DD` prefix of an ISO timestamp; drop anything unparseable.
fn normalize_date(raw: String) -> Option<String> {
    let raw = raw.trim();
    let prefix = raw.get(..10)?;
    chrono::NaiveDate::parse_from_str(prefix, "%Y-%m-%d")
        .ok()
        .map(|d| d.format("%Y-%m-%d").to_string())
}

/// Scripted in-process search provider for tests and offline runs.
///
/// Responses are returned in the order they were queued; once the queue is
/// empty every search returns no hits.
pub struct MockSearchProvider {
    responses: Mutex<VecDeque<Result<Vec<RawHit>, RetrievalError>>>,
    calls: AtomicUsize,
    last_limit: AtomicUsize,
}

impl MockSearchProvider {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            last_limit: AtomicUsize::new(0),
        }
    }

    /// A provider that answers the first search with `hits`.
    pub fn with_hits(hits: Vec<RawHit>) -> Self {
        let provider = Self::new();
        provider.queue(Ok(hits));
        provider
    }

    /// A provider whose first search fails with `err`.
    pub fn failing(err: RetrievalError) -> Self {
        let provider = Self::new();
        provider.queue(Err(err));
        provider
    }

    pub fn queue(&self, response: Result<Vec<RawHit>, RetrievalError>) {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(response);
    }

    /// Number of searches performed.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Limit passed to the most recent search.
    pub fn last_limit(&self) -> usize {
        self.last_limit.load(Ordering::SeqCst)
    }

    /// Convenience constructor for a complete hit.
    pub fn hit(title: &str, summary: &str, url: &str) -> RawHit {
        RawHit {
            title: Some(title.to_string()),
            summary: Some(summary.to_string()),
            url: Some(url.to_string()),
            author: None,
            published_date: None,
        }
    }
}

impl Default for MockSearchProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchProvider for MockSearchProvider {
    async fn search(&self, _query: &str, limit: usize) -> Result<Vec<RawHit>, RetrievalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.last_limit.store(limit, Ordering::SeqCst);
        let next = self
            .responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        next.unwrap_or_else(|| Ok(Vec::new()))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn question() -> Question {
        Question::parse("Does caffeine improve chess performance?").unwrap()
    }

    fn retriever(provider: Arc<MockSearchProvider>) -> EvidenceRetriever {
        EvidenceRetriever::new(provider, 20, Duration::from_secs(5))
    }

    #[test]
    fn test_clamp_limit() {
        let r = retriever(Arc::new(MockSearchProvider::new()));
        assert_eq!(r.clamp_limit(0), 1);
        assert_eq!(r.clamp_limit(5), 5);
        assert_eq!(r.clamp_limit(500), 20);
    }

    #[test]
    fn test_normalize_defaults_missing_fields() {
        let hits = vec![RawHit {
            title: None,
            summary: None,
            url: Some("::not a url::".into()),
            author: Some("   ".into()),
            published_date: Some("sometime".into()),
        }];
        let set = normalize_hits(hits, 5);
        let item = &set.items()[0];
        assert_eq!(item.title, "");
        assert_eq!(item.summary, "");
        assert_eq!(item.link, EvidenceLink::Unavailable);
        assert_eq!(item.author, None);
        assert_eq!(item.published_date, None);
    }

    #[test]
    fn test_normalize_dates() {
        assert_eq!(
            normalize_date("2023-06-01T00:00:00.000Z".into()),
            Some("2023-06-01".into())
        );
        assert_eq!(normalize_date("2023-13-01".into()), None);
        assert_eq!(normalize_date("".into()), None);
    }

    #[test]
    fn test_normalize_truncates_and_ranks() {
        let hits = (0..8)
            .map(|i| MockSearchProvider::hit(&format!("P{i}"), "", &format!("https://x.org/{i}")))
            .collect();
        let set = normalize_hits(hits, 3);
        assert_eq!(set.len(), 3);
        let ranks: Vec<usize> = set.items().iter().map(|i| i.rank).collect();
        assert_eq!(ranks, vec![0, 1, 2]);
        assert_eq!(set.items()[2].title, "P2");
    }

    #[tokio::test]
    async fn test_retrieve_zero_hits_is_valid() {
        let provider = Arc::new(MockSearchProvider::with_hits(vec![]));
        let set = retriever(provider.clone())
            .retrieve(&question(), 5)
            .await
            .unwrap();
        assert!(set.is_empty());
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_retrieve_passes_clamped_limit() {
        let provider = Arc::new(MockSearchProvider::with_hits(vec![]));
        retriever(provider.clone())
            .retrieve(&question(), 99)
            .await
            .unwrap();
        assert_eq!(provider.last_limit(), 20);
    }

    #[tokio::test]
    async fn test_retrieve_propagates_provider_error() {
        let provider = Arc::new(MockSearchProvider::failing(RetrievalError::Network {
            message: "connection refused".into(),
        }));
        let err = retriever(provider).retrieve(&question(), 5).await.unwrap_err();
        assert!(matches!(err, RetrievalError::Network { .. }));
    }

    struct StalledProvider;

    #[async_trait]
    impl SearchProvider for StalledProvider {
        async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<RawHit>, RetrievalError> {
            std::future::pending().await
        }

        fn name(&self) -> &str {
            "stalled"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retrieve_times_out() {
        let r = EvidenceRetriever::new(Arc::new(StalledProvider), 20, Duration::from_secs(3));
        let err = r.retrieve(&question(), 5).await.unwrap_err();
        match err {
            RetrievalError::Timeout { timeout_secs } => assert_eq!(timeout_secs, 3),
            other => panic!("Expected Timeout, got {:?}", other),
        }
    }
}
