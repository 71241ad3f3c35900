//! Context retrieval
//!
//! Wraps the similarity-search collaborator. Ranking belongs to the
//! collaborator; this layer bounds the call in time, enforces the metadata
//! filter and the `k` limit on whatever comes back, and classifies failures.

use crate::types::RetrievalError;
use ragguard_core::{with_timeout, ContextChunk, MetadataFilter, SimilaritySearch};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Default number of chunks to retrieve
pub const DEFAULT_TOP_K: usize = 3;

pub struct Retriever {
    search: Arc<dyn SimilaritySearch>,
    timeout_ms: u64,
}

impl Retriever {
    pub fn new(search: Arc<dyn SimilaritySearch>, timeout_ms: u64) -> Self {
        Self { search, timeout_ms }
    }

    /// Retrieve at most `k` chunks for `question`, rank order preserved
    ///
    /// An empty result is a valid outcome, not an error.
    pub async fn retrieve(
        &self,
        question: &str,
        filter: Option<&MetadataFilter>,
        k: usize,
    ) -> Result<Vec<ContextChunk>, RetrievalError> {
        let start_time = Instant::now();
        debug!(k, filtered = filter.is_some(), "Retrieving context");

        let chunks = with_timeout(
            self.search.search(question, k, filter),
            self.timeout_ms,
            "similarity_search",
        )
        .await
        .and_then(|result| result)
        .map_err(|e| {
            warn!(error = %e, "Similarity search failed");
            RetrievalError::UpstreamUnavailable(e)
        })?;

        let returned = chunks.len();
        let chunks: Vec<ContextChunk> = chunks
            .into_iter()
            .filter(|chunk| filter.map_or(true, |f| chunk.matches(f)))
            .take(k)
            .collect();

        if chunks.len() < returned {
            warn!(
                returned,
                kept = chunks.len(),
                "Similarity search returned chunks outside the filter or limit"
            );
        }

        info!(
            "Retrieved {} chunks in {:?}",
            chunks.len(),
            start_time.elapsed()
        );

        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ragguard_core::{network_error, RagGuardResult};
    use serde_json::json;

    /// Returns a fixed list regardless of query, ignoring filter and k
    struct SloppySearch(Vec<ContextChunk>);

    #[async_trait]
    impl SimilaritySearch for SloppySearch {
        async fn search(
            &self,
            _query: &str,
            _k: usize,
            _filter: Option<&MetadataFilter>,
        ) -> RagGuardResult<Vec<ContextChunk>> {
            Ok(self.0.clone())
        }
    }

    struct DownSearch;

    #[async_trait]
    impl SimilaritySearch for DownSearch {
        async fn search(
            &self,
            _query: &str,
            _k: usize,
            _filter: Option<&MetadataFilter>,
        ) -> RagGuardResult<Vec<ContextChunk>> {
            Err(network_error!("connection refused", "vector_store"))
        }
    }

    struct SlowSearch;

    #[async_trait]
    impl SimilaritySearch for SlowSearch {
        async fn search(
            &self,
            _query: &str,
            _k: usize,
            _filter: Option<&MetadataFilter>,
        ) -> RagGuardResult<Vec<ContextChunk>> {
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            Ok(Vec::new())
        }
    }

    fn corpus() -> Vec<ContextChunk> {
        vec![
            ContextChunk::new("a").with_metadata("category", "policy"),
            ContextChunk::new("b").with_metadata("category", "faq"),
            ContextChunk::new("c").with_metadata("category", "policy"),
            ContextChunk::new("d").with_metadata("category", "policy"),
            ContextChunk::new("e").with_metadata("category", "policy"),
        ]
    }

    #[tokio::test]
    async fn test_enforces_limit_and_order() {
        let retriever = Retriever::new(Arc::new(SloppySearch(corpus())), 1000);
        let chunks = retriever.retrieve("q", None, DEFAULT_TOP_K).await.unwrap();
        let texts: Vec<_> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_enforces_filter() {
        let retriever = Retriever::new(Arc::new(SloppySearch(corpus())), 1000);
        let mut filter = MetadataFilter::new();
        filter.insert("category".into(), json!("policy"));

        let chunks = retriever.retrieve("q", Some(&filter), 3).await.unwrap();
        let texts: Vec<_> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "c", "d"]);
    }

    #[tokio::test]
    async fn test_empty_result_is_not_an_error() {
        let retriever = Retriever::new(Arc::new(SloppySearch(Vec::new())), 1000);
        assert!(retriever.retrieve("q", None, 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upstream_failure_and_timeout() {
        let retriever = Retriever::new(Arc::new(DownSearch), 1000);
        assert!(matches!(
            retriever.retrieve("q", None, 3).await,
            Err(RetrievalError::UpstreamUnavailable(_))
        ));

        let retriever = Retriever::new(Arc::new(SlowSearch), 10);
        assert!(matches!(
            retriever.retrieve("q", None, 3).await,
            Err(RetrievalError::UpstreamUnavailable(
                ragguard_core::RagGuardError::Timeout { .. }
            ))
        ));
    }
}
