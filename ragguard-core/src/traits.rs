//! Collaborator interfaces
//!
//! The pipeline depends on three external services it does not own. Each is
//! injected as a trait object, constructed once and shared read-only across
//! concurrent requests.

use crate::error::RagGuardResult;
use crate::types::{ContextChunk, MetadataFilter, SpanHandle, SpanLevel};
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Lazy, finite, non-restartable sequence of completion fragments
pub type TextStream = BoxStream<'static, RagGuardResult<String>>;

/// Similarity-search service over the knowledge corpus
///
/// Ranking is owned by the implementation. Implementations must return at
/// most `k` chunks, rank order first, and only chunks satisfying `filter`.
#[async_trait]
pub trait SimilaritySearch: Send + Sync {
    async fn search(
        &self,
        query: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> RagGuardResult<Vec<ContextChunk>>;
}

/// Language-model completion service
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Generate a complete response for the prompt
    async fn generate(&self, prompt: &str) -> RagGuardResult<String>;

    /// Generate a response as a stream of text fragments
    async fn generate_stream(&self, prompt: &str) -> RagGuardResult<TextStream>;

    /// Human-readable model identifier for traces
    fn model_name(&self) -> String;
}

/// Observability sink recording one span per stage invocation
///
/// Span bookkeeping is synchronous so a span can be closed from `Drop`.
/// Delivery happens on [`TraceSink::flush`]; its failures must never fail a
/// user-facing response.
#[async_trait]
pub trait TraceSink: Send + Sync {
    fn begin_span(
        &self,
        name: &str,
        input: serde_json::Value,
        metadata: serde_json::Value,
    ) -> SpanHandle {
        SpanHandle::open(name, input, metadata)
    }

    fn close_span(&self, handle: SpanHandle, output: serde_json::Value, level: SpanLevel);

    async fn flush(&self) -> RagGuardResult<()>;
}
