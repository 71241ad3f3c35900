//! OpenAPI document for the HTTP surface

use crate::handlers::{ErrorBody, ErrorDetail, HealthResponse};
use axum::response::Json;
use ragguard_core::{ChatRequest, HistoryTurn, StructuredResponse, TurnRole};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "ragguard API",
        version = "0.1.0",
        description = "Guarded retrieval-augmented chat",
        license(name = "MIT OR Apache-2.0")
    ),
    paths(
        crate::handlers::health_check,
        crate::handlers::chat_query,
    ),
    components(
        schemas(
            ChatRequest,
            HistoryTurn,
            TurnRole,
            StructuredResponse,
            HealthResponse,
            ErrorBody,
            ErrorDetail,
        )
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Chat", description = "Guarded question answering")
    )
)]
pub struct ApiDoc;

/// Serve the OpenAPI document
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_routes() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/chat"));
        assert!(doc.paths.paths.contains_key("/api/health"));
    }

    #[test]
    fn test_openapi_serializes() {
        let json = ApiDoc::openapi().to_pretty_json().unwrap();
        assert!(json.contains("StructuredResponse"));
    }
}
