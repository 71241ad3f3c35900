//! Shared application state

use ragguard_core::RagGuardConfig;
use ragguard_rag::GuardedPipeline;
use std::sync::Arc;

/// State shared by every handler
///
/// The pipeline holds no per-request data, so one instance serves all
/// concurrent requests.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<GuardedPipeline>,
    pub config: Arc<RagGuardConfig>,
}

impl AppState {
    pub fn new(pipeline: GuardedPipeline, config: RagGuardConfig) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            config: Arc::new(config),
        }
    }

    /// Build the production pipeline from configuration
    pub async fn from_config(config: RagGuardConfig) -> ragguard_rag::RagResult<Self> {
        let pipeline = GuardedPipeline::from_config(&config).await?;
        Ok(Self::new(pipeline, config))
    }
}
