//! ragguard Web Server
//!
//! Exposes the guarded chat pipeline over HTTP.

pub mod handlers;
pub mod openapi;
pub mod routes;
pub mod server;
pub mod state;

pub use server::{RagGuardServer, RagGuardServerBuilder};
pub use state::AppState;

use axum::{
    extract::DefaultBodyLimit,
    http::{header::CONTENT_TYPE, Method},
    Router,
};
use ragguard_core::ServerConfig;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Largest accepted request body
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Create the main application router
pub fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE]);

    Router::new()
        .nest("/api", routes::api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

/// Configuration for the web server
#[derive(Debug, Clone)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        let server = ServerConfig::default();
        Self {
            host: server.host,
            port: server.port,
        }
    }
}

impl From<&ServerConfig> for WebConfig {
    fn from(server: &ServerConfig) -> Self {
        Self {
            host: server.host.clone(),
            port: server.port,
        }
    }
}

impl WebConfig {
    /// Apply `RAGGUARD_HOST` and `RAGGUARD_PORT` over `self`
    pub fn with_env(mut self) -> Self {
        if let Ok(host) = std::env::var("RAGGUARD_HOST") {
            self.host = host;
        }
        if let Some(port) = std::env::var("RAGGUARD_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
        {
            self.port = port;
        }
        self
    }

    /// Load configuration from environment variables over the defaults
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Get the server address
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Error types for the web server
#[derive(thiserror::Error, Debug)]
pub enum WebError {
    #[error("Server error: {0}")]
    Server(#[from] std::io::Error),

    #[error("Pipeline setup error: {0}")]
    Pipeline(#[from] ragguard_rag::RagError),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for web operations
pub type WebResult<T> = Result<T, WebError>;
