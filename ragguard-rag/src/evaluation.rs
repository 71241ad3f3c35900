//! Dataset evaluation runs
//!
//! Runs every item of an evaluation dataset through the guarded pipeline
//! under one `dataset_run` span, so a whole run can be inspected as a single
//! trace.

use crate::observability::SpanGuard;
use crate::rag_pipeline::GuardedPipeline;
use crate::types::{PipelineError, PipelineState, RagResult};
use ragguard_core::{log_operation_start, log_operation_success, ChatRequest};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map};
use std::path::Path;
use tracing::{info, warn};

/// Characters of each answer kept in a report
pub const ANSWER_PREVIEW_CHARS: usize = 80;

/// One evaluation question with its reference answer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalItem {
    pub question: String,
    pub expected_answer: String,
    #[serde(default)]
    pub evaluation_criteria: serde_json::Value,
}

/// Load a dataset file: a JSON array of [`EvalItem`]
pub fn load_dataset<P: AsRef<Path>>(path: P) -> RagResult<Vec<EvalItem>> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EvalOutcome {
    Responded { answer_preview: String, confidence: f64 },
    Rejected { code: String },
    Failed { code: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct EvalItemResult {
    pub question: String,
    pub outcome: EvalOutcome,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EvalReport {
    pub dataset_name: String,
    pub run_name: String,
    pub items: Vec<EvalItemResult>,
    pub responded: usize,
    pub rejected: usize,
    pub failed: usize,
}

impl EvalReport {
    fn record(&mut self, question: String, result: Result<ragguard_core::StructuredResponse, PipelineError>) {
        let outcome = match result {
            Ok(response) => {
                self.responded += 1;
                EvalOutcome::Responded {
                    answer_preview: response.answer.chars().take(ANSWER_PREVIEW_CHARS).collect(),
                    confidence: response.confidence,
                }
            }
            Err(err) => match err.terminal_state() {
                PipelineState::Rejected(_) => {
                    self.rejected += 1;
                    EvalOutcome::Rejected {
                        code: err.code().to_string(),
                    }
                }
                _ => {
                    self.failed += 1;
                    EvalOutcome::Failed {
                        code: err.code().to_string(),
                    }
                }
            },
        };

        self.items.push(EvalItemResult { question, outcome });
    }
}

/// Run every item sequentially and flush the sink once at the end
pub async fn run_dataset(
    pipeline: &GuardedPipeline,
    dataset_name: &str,
    run_name: &str,
    items: &[EvalItem],
) -> EvalReport {
    log_operation_start!("dataset_run", dataset = dataset_name, items = items.len());

    let sink = pipeline.sink();
    let root = SpanGuard::begin(
        sink.clone(),
        "dataset_run",
        json!({ "items": items.len() }),
        json!({ "dataset_name": dataset_name, "run_name": run_name }),
    )
    .flush_when_abandoned();
    let trace_id = root.id().to_string();

    let mut report = EvalReport {
        dataset_name: dataset_name.to_string(),
        run_name: run_name.to_string(),
        ..EvalReport::default()
    };

    for item in items {
        info!(question = %item.question, "Evaluating item");

        let mut extra = Map::new();
        extra.insert("trace_id".into(), json!(trace_id));
        extra.insert("parent_span_id".into(), json!(trace_id));
        extra.insert("dataset_name".into(), json!(dataset_name));
        extra.insert("run_name".into(), json!(run_name));
        extra.insert("expected_answer".into(), json!(item.expected_answer));
        extra.insert("evaluation_criteria".into(), item.evaluation_criteria.clone());

        let result = pipeline
            .handle_with_metadata(&ChatRequest::new(item.question.clone()), extra)
            .await;
        report.record(item.question.clone(), result);
    }

    root.ok(json!({
        "responded": report.responded,
        "rejected": report.rejected,
        "failed": report.failed,
    }));

    if let Err(e) = sink.flush().await {
        warn!(error = %e, "Trace flush failed after dataset run");
    }

    log_operation_success!(
        "dataset_run",
        responded = report.responded,
        rejected = report.rejected,
        failed = report.failed
    );

    report
}
