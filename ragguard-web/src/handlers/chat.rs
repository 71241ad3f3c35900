//! Guarded chat handler

use super::types::{ApiError, ErrorBody};
use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    response::Json,
};
use ragguard_core::{ChatRequest, StructuredResponse};
use tracing::{info, warn};

/// Answer one question through the guarded pipeline
#[utoipa::path(
    post,
    path = "/api/chat",
    tag = "Chat",
    summary = "Ask a question",
    description = "Validate the question, retrieve context, generate a structured answer and filter it before returning",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Question answered", body = StructuredResponse),
        (status = 400, description = "Request rejected by input validation", body = ErrorBody),
        (status = 500, description = "No answer could be produced", body = ErrorBody)
    )
)]
pub async fn chat_query(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<StructuredResponse>, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        warn!(error = %rejection, "Malformed chat request body");
        ApiError::from(rejection)
    })?;

    info!(
        history_turns = request.history.len(),
        filtered = request.metadata_filter.is_some(),
        "Processing chat query"
    );

    match state.pipeline.handle(&request).await {
        Ok(response) => Ok(Json(response)),
        Err(err) => Err(ApiError::from(&err)),
    }
}
