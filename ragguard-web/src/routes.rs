//! Route definitions

use crate::{handlers, openapi, AppState};
use axum::{
    routing::{get, post},
    Router,
};

/// Create API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/chat", post(handlers::chat_query))
        .route("/openapi.json", get(openapi::openapi_json))
}
