//! ragguard RAG - the guarded retrieval-augmented chat pipeline
//!
//! A request flows through [`InputGuard`], [`Retriever`], [`PromptComposer`],
//! [`CompletionClient`], [`output_parser`] and [`OutputGuard`], sequenced by
//! [`GuardedPipeline`]. Language models are reached through siumai; the
//! knowledge corpus and trace delivery sit behind the collaborator traits in
//! `ragguard-core`.

pub mod evaluation;
pub mod input_guard;
pub mod knowledge;
pub mod llm_client;
pub mod observability;
pub mod output_guard;
pub mod output_parser;
pub mod prompt;
pub mod rag_pipeline;
pub mod retriever;
pub mod types;

pub use evaluation::{load_dataset, run_dataset, EvalItem, EvalOutcome, EvalReport};
pub use input_guard::{InputGuard, MAX_INPUT_LENGTH};
pub use knowledge::KnowledgeIndex;
pub use llm_client::{configs, create_auto_backend, CompletionClient, ModelInfo, SiumaiBackend};
pub use observability::{
    build_trace_sink, LangfuseConfig, LangfuseTraceSink, LogTraceSink, MemoryTraceSink, SpanGuard,
};
pub use output_guard::OutputGuard;
pub use prompt::PromptComposer;
pub use rag_pipeline::{GuardedPipeline, ROOT_SPAN};
pub use retriever::{Retriever, DEFAULT_TOP_K};
pub use types::*;

// Re-export commonly used types from siumai
pub use siumai::prelude::{LlmClient, Provider as LlmProvider};
