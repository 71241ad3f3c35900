//! ragguard web server
//!
//! Binds the axum application and serves until Ctrl-C.

use crate::{create_app, AppState, WebConfig, WebError, WebResult};
use axum::serve;
use ragguard_core::RagGuardConfig;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

pub struct RagGuardServer {
    config: WebConfig,
    state: AppState,
}

impl RagGuardServer {
    /// Create a server around an already-built state
    pub fn new(config: WebConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Start the web server
    pub async fn start(self) -> WebResult<()> {
        let address = self.config.address();
        info!(address = %address, "Starting ragguard web server");

        let app = create_app(self.state.clone());

        let listener = TcpListener::bind(&address)
            .await
            .map_err(WebError::Server)?;

        info!("Server listening on http://{}", address);

        if let Err(e) = serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
        {
            error!(error = %e, "Server error");
            return Err(WebError::Server(e));
        }

        if let Err(e) = self.state.pipeline.sink().flush().await {
            warn!(error = %e, "Trace flush failed during shutdown");
        }

        info!("Server shut down gracefully");
        Ok(())
    }

    pub fn config(&self) -> &WebConfig {
        &self.config
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

/// Builder for [`RagGuardServer`]
pub struct RagGuardServerBuilder {
    config: RagGuardConfig,
    web: WebConfig,
}

impl RagGuardServerBuilder {
    pub fn new(config: RagGuardConfig) -> Self {
        let web = WebConfig::from(&config.server);
        Self { config, web }
    }

    pub fn host<S: Into<String>>(mut self, host: S) -> Self {
        self.web.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.web.port = port;
        self
    }

    /// Build the pipeline and the server
    pub async fn build(self) -> WebResult<RagGuardServer> {
        self.config
            .validate()
            .map_err(|e| WebError::Config(e.to_string()))?;
        let state = AppState::from_config(self.config).await?;
        Ok(RagGuardServer::new(self.web, state))
    }
}
