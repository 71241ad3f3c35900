//! Guarded RAG pipeline
//!
//! Sequences input validation, retrieval, prompt composition, completion,
//! output parsing and output filtering for one request at a time. Each run
//! is independent: the pipeline holds only read-only collaborators, so one
//! instance serves any number of concurrent requests.
//!
//! Every stage is recorded as a child span of a `chat_request` root span.
//! All spans of a run are closed before the run returns, and the sink is
//! flushed once per run; a flush failure is logged and never changes the
//! response.

use crate::input_guard::InputGuard;
use crate::knowledge::KnowledgeIndex;
use crate::llm_client::{CompletionClient, SiumaiBackend};
use crate::observability::{build_trace_sink, SpanGuard};
use crate::output_guard::OutputGuard;
use crate::output_parser;
use crate::prompt::PromptComposer;
use crate::retriever::Retriever;
use crate::types::{PipelineError, PipelineState, RagResult};
use ragguard_core::{
    log_operation_error, log_operation_start, log_operation_success, ChatRequest,
    CompletionBackend, RagGuardConfig, RagGuardError, SimilaritySearch, StructuredResponse, TraceSink,
};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Name of the root span of one request
pub const ROOT_SPAN: &str = "chat_request";

pub struct GuardedPipeline {
    input_guard: InputGuard,
    retriever: Retriever,
    composer: PromptComposer,
    completion: CompletionClient,
    output_guard: OutputGuard,
    sink: Arc<dyn TraceSink>,
    top_k: usize,
}

/// Bookkeeping for one request
struct RequestRun {
    request_id: String,
    state: PipelineState,
    /// Metadata attached to every stage span
    stage_metadata: Value,
}

impl RequestRun {
    fn advance(&mut self, next: PipelineState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!(request_id = %self.request_id, from = ?self.state, to = ?next, "Pipeline transition");
        self.state = next;
    }
}

impl GuardedPipeline {
    /// Assemble a pipeline from injected collaborators
    pub fn new(
        search: Arc<dyn SimilaritySearch>,
        backend: Arc<dyn CompletionBackend>,
        sink: Arc<dyn TraceSink>,
        config: &RagGuardConfig,
    ) -> Self {
        Self {
            input_guard: InputGuard::new(config.guards.max_input_length),
            retriever: Retriever::new(search, config.retrieval.timeout_ms),
            composer: PromptComposer::default(),
            completion: CompletionClient::new(backend, config.llm.timeout_ms),
            output_guard: OutputGuard::new(),
            sink,
            top_k: config.retrieval.top_k,
        }
    }

    /// Build the production pipeline: siumai backend, corpus file index and
    /// the configured trace sink
    pub async fn from_config(config: &RagGuardConfig) -> RagResult<Self> {
        log_operation_start!("pipeline_init", provider = %config.llm.provider);

        let backend = SiumaiBackend::new(config.llm.clone()).await?;

        let index = match &config.retrieval.corpus_path {
            Some(path) => KnowledgeIndex::from_path(path, &config.retrieval)?,
            None => {
                warn!("No retrieval.corpus_path configured, answering without context");
                KnowledgeIndex::new(Vec::new())
            }
        };

        let pipeline = Self::new(
            Arc::new(index),
            Arc::new(backend),
            build_trace_sink(&config.tracing),
            config,
        );

        log_operation_success!("pipeline_init", model = %pipeline.completion.model_name());
        Ok(pipeline)
    }

    pub fn completion(&self) -> &CompletionClient {
        &self.completion
    }

    pub fn sink(&self) -> Arc<dyn TraceSink> {
        self.sink.clone()
    }

    /// Handle one chat request
    pub async fn handle(&self, request: &ChatRequest) -> Result<StructuredResponse, PipelineError> {
        self.handle_with_metadata(request, Map::new()).await
    }

    /// Handle one chat request, merging `extra` into the root span metadata
    ///
    /// A `trace_id` or `parent_span_id` in `extra` attaches the request to an
    /// enclosing trace, such as a dataset run.
    pub async fn handle_with_metadata(
        &self,
        request: &ChatRequest,
        extra: Map<String, Value>,
    ) -> Result<StructuredResponse, PipelineError> {
        let start_time = Instant::now();
        let request_id = uuid::Uuid::new_v4().to_string();

        let mut root_metadata = Map::new();
        root_metadata.insert("request_id".into(), json!(request_id));
        root_metadata.insert("history_turns".into(), json!(request.history.len()));
        root_metadata.insert(
            "metadata_filter".into(),
            json!(request.metadata_filter),
        );
        root_metadata.extend(extra);

        let root = SpanGuard::begin(
            self.sink.clone(),
            ROOT_SPAN,
            json!({ "message": request.message }),
            Value::Object(root_metadata.clone()),
        )
        .flush_when_abandoned();

        let mut stage_metadata = Map::new();
        stage_metadata.insert("request_id".into(), json!(request_id));
        if let Some(trace_id) = root_metadata.get("trace_id") {
            stage_metadata.insert("trace_id".into(), trace_id.clone());
        }
        stage_metadata.insert("parent_span_id".into(), json!(root.id()));

        let mut run = RequestRun {
            request_id,
            state: PipelineState::Received,
            stage_metadata: Value::Object(stage_metadata),
        };

        let result = self.run(&mut run, request).await;

        match &result {
            Ok(response) => {
                root.ok(json!(response));
                info!(
                    request_id = %run.request_id,
                    duration_ms = start_time.elapsed().as_millis() as u64,
                    sources = response.sources.len(),
                    "Request responded"
                );
            }
            Err(err) => root.error(json!({
                "state": run.state,
                "code": err.code(),
                "error": error_detail(err),
                "error_id": err.upstream_cause().map(RagGuardError::error_id),
            })),
        }

        if let Err(e) = self.sink.flush().await {
            warn!(request_id = %run.request_id, error = %e, "Trace flush failed");
        }

        result
    }

    fn stage(&self, run: &RequestRun, name: &str, input: Value) -> SpanGuard {
        SpanGuard::begin(self.sink.clone(), name, input, run.stage_metadata.clone())
    }

    /// Close `span` as an error, move to the error's terminal state and
    /// return the error
    fn halt(
        &self,
        run: &mut RequestRun,
        span: SpanGuard,
        output: Value,
        err: impl Into<PipelineError>,
    ) -> PipelineError {
        let err = err.into();
        span.error(output);
        run.advance(err.terminal_state());

        if err.status_code() < 500 {
            warn!(request_id = %run.request_id, code = err.code(), "Request rejected: {}", err);
        } else {
            log_operation_error!(
                "guarded_chat",
                error_detail(&err),
                request_id = %run.request_id,
                code = err.code(),
                error_id = ?err.upstream_cause().map(RagGuardError::error_id)
            );
        }
        err
    }

    async fn run(
        &self,
        run: &mut RequestRun,
        request: &ChatRequest,
    ) -> Result<StructuredResponse, PipelineError> {
        let message = request.message.as_str();

        let span = self.stage(
            run,
            "input_validation",
            json!({ "message_chars": message.chars().count() }),
        );
        if let Err(e) = self.input_guard.validate(message) {
            let output = json!({ "accepted": false, "reason": e.kind() });
            return Err(self.halt(run, span, output, e));
        }
        span.ok(json!({ "accepted": true }));
        run.advance(PipelineState::InputChecked);

        let span = self.stage(
            run,
            "retrieval",
            json!({ "query": message, "k": self.top_k, "filter": request.metadata_filter }),
        );
        let chunks = match self
            .retriever
            .retrieve(message, request.metadata_filter.as_ref(), self.top_k)
            .await
        {
            Ok(chunks) => chunks,
            Err(e) => {
                let output = json!({ "error": error_detail(&e) });
                return Err(self.halt(run, span, output, e));
            }
        };
        span.ok(json!({
            "count": chunks.len(),
            "sources": chunks.iter().map(|c| c.source()).collect::<Vec<_>>(),
        }));
        run.advance(PipelineState::Retrieved);

        let span = self.stage(run, "prompt_composition", json!({ "chunks": chunks.len() }));
        let prompt = self.composer.compose(message, &chunks);
        span.ok(json!({ "prompt": prompt }));
        run.advance(PipelineState::Composed);

        let span = self.stage(
            run,
            "completion",
            json!({ "model": self.completion.model_name(), "prompt_chars": prompt.chars().count() }),
        );
        let raw = match self.completion.complete(&prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                let output = json!({ "error": error_detail(&e) });
                return Err(self.halt(run, span, output, e));
            }
        };
        span.ok(json!({ "raw": raw }));
        run.advance(PipelineState::Completed);

        let span = self.stage(run, "output_parsing", json!({ "raw_chars": raw.chars().count() }));
        let response = match output_parser::parse(&raw) {
            Ok(response) => response,
            Err(e) => {
                let output = json!({ "error": e.to_string() });
                return Err(self.halt(run, span, output, e));
            }
        };
        span.ok(json!({ "confidence": response.confidence, "sources": response.sources }));
        run.advance(PipelineState::Parsed);

        let span = self.stage(
            run,
            "output_filter",
            json!({
                "answer_chars": response.answer.chars().count(),
                "sources": response.sources.len(),
                "follow_up_questions": response.follow_up_questions.len(),
            }),
        );
        if let Err((field, e)) = self.output_guard.filter_response(&response) {
            // The rejected response goes to the trace for audit, never to the caller
            let output = json!({
                "clean": false,
                "reason": e.kind(),
                "field": field,
                "detail": e,
                "rejected_answer": response.answer,
                "rejected_response": response,
            });
            return Err(self.halt(run, span, output, e));
        }
        span.ok(json!({ "clean": true }));
        run.advance(PipelineState::OutputChecked);
        run.advance(PipelineState::Responded);

        Ok(response)
    }
}

/// Error message with its full source chain, for traces and logs only
pub fn error_detail(err: &dyn std::error::Error) -> String {
    let mut detail = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        detail.push_str(": ");
        detail.push_str(&cause.to_string());
        source = cause.source();
    }
    detail
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::MemoryTraceSink;
    use async_trait::async_trait;
    use ragguard_core::{
        network_error, ContextChunk, MetadataFilter, RagGuardResult, SpanLevel, TextStream,
    };

    struct FixedSearch(Vec<ContextChunk>);

    #[async_trait]
    impl SimilaritySearch for FixedSearch {
        async fn search(
            &self,
            _query: &str,
            k: usize,
            _filter: Option<&MetadataFilter>,
        ) -> RagGuardResult<Vec<ContextChunk>> {
            Ok(self.0.iter().take(k).cloned().collect())
        }
    }

    struct FixedBackend(Result<String, ()>);

    #[async_trait]
    impl CompletionBackend for FixedBackend {
        async fn generate(&self, _prompt: &str) -> RagGuardResult<String> {
            self.0
                .clone()
                .map_err(|_| network_error!("model overloaded", "test_backend"))
        }

        async fn generate_stream(&self, _prompt: &str) -> RagGuardResult<TextStream> {
            Err(network_error!("streaming unsupported", "test_backend"))
        }

        fn model_name(&self) -> String {
            "fixed".to_string()
        }
    }

    fn pipeline(raw: Result<&str, ()>) -> (GuardedPipeline, Arc<MemoryTraceSink>) {
        let sink = Arc::new(MemoryTraceSink::new());
        let pipeline = GuardedPipeline::new(
            Arc::new(FixedSearch(vec![
                ContextChunk::new("Returns within 30 days.").with_metadata("source", "returns.md"),
            ])),
            Arc::new(FixedBackend(raw.map(str::to_string))),
            sink.clone(),
            &RagGuardConfig::default(),
        );
        (pipeline, sink)
    }

    #[tokio::test]
    async fn test_happy_path_closes_every_span() {
        let (pipeline, sink) = pipeline(Ok(
            r#"{"answer":"30 days","confidence":0.9,"sources":["returns.md"],"follow_up_questions":[]}"#,
        ));

        let response = pipeline
            .handle(&ChatRequest::new("What is the return policy?"))
            .await
            .unwrap();
        assert_eq!(response.sources, vec!["returns.md"]);

        let names: Vec<String> = sink.spans().into_iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec![
                "input_validation",
                "retrieval",
                "prompt_composition",
                "completion",
                "output_parsing",
                "output_filter",
                ROOT_SPAN
            ]
        );
        assert!(sink.spans().iter().all(|s| s.level == SpanLevel::Default));
        assert_eq!(sink.flush_count(), 1);
    }

    #[tokio::test]
    async fn test_stage_spans_link_to_root() {
        let (pipeline, sink) = pipeline(Ok(r#"{"answer":"a","confidence":0.5}"#));
        pipeline.handle(&ChatRequest::new("hello")).await.unwrap();

        let root = sink.span_named(ROOT_SPAN).unwrap();
        let retrieval = sink.span_named("retrieval").unwrap();
        assert_eq!(retrieval.metadata["parent_span_id"], json!(root.id));
        assert_eq!(
            retrieval.metadata["request_id"],
            root.metadata["request_id"]
        );
    }

    #[tokio::test]
    async fn test_upstream_failure_records_cause_in_trace_only() {
        let (pipeline, sink) = pipeline(Err(()));
        let err = pipeline
            .handle(&ChatRequest::new("What is the return policy?"))
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), 500);
        assert!(!err.public_message().contains("overloaded"));

        let completion = sink.span_named("completion").unwrap();
        assert_eq!(completion.level, SpanLevel::Error);
        assert!(completion.output["error"]
            .as_str()
            .unwrap()
            .contains("model overloaded"));

        let root = sink.span_named(ROOT_SPAN).unwrap();
        assert_eq!(root.output["state"]["state"], "failed");
        assert_eq!(root.output["state"]["reason"], "upstream");
        assert_eq!(
            root.output["error_id"],
            json!(err.upstream_cause().unwrap().error_id())
        );
    }

    #[tokio::test]
    async fn test_parse_failure() {
        let (pipeline, sink) = pipeline(Ok(r#"{"answer":"a","confidence":1.5}"#));
        let err = pipeline.handle(&ChatRequest::new("q")).await.unwrap_err();
        assert!(matches!(err, PipelineError::Parse(_)));
        assert!(sink.span_named("output_filter").is_none());
    }

    #[tokio::test]
    async fn test_history_is_recorded_not_used() {
        let (pipeline, sink) = pipeline(Ok(r#"{"answer":"a","confidence":0.5}"#));
        let request: ChatRequest = serde_json::from_value(json!({
            "message": "and shipping?",
            "history": [
                { "type": "human", "content": "return policy?" },
                { "type": "ai", "content": "30 days" }
            ]
        }))
        .unwrap();

        pipeline.handle(&request).await.unwrap();

        let root = sink.span_named(ROOT_SPAN).unwrap();
        assert_eq!(root.metadata["history_turns"], json!(2));
        let prompt = sink.span_named("prompt_composition").unwrap().output["prompt"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(!prompt.contains("return policy?"));
    }

    #[test]
    fn test_error_detail_walks_sources() {
        let err = PipelineError::from(crate::types::CompletionError::UpstreamUnavailable(
            network_error!("timeout talking to provider", "llm_client"),
        ));
        let detail = error_detail(&err);
        assert!(detail.starts_with("Completion service unavailable"));
        assert!(detail.contains("timeout talking to provider"));
    }
}
