//! LLM client integration using siumai
//!
//! [`SiumaiBackend`] adapts a siumai provider client to the
//! [`CompletionBackend`] collaborator interface. [`CompletionClient`] is the
//! pipeline stage on top of any backend: it passes the composed prompt
//! through unmodified, bounds the call in time and classifies failures.

use crate::types::{CompletionError, RagError, RagResult};
use async_trait::async_trait;
use futures::StreamExt;
use ragguard_core::{
    network_error, with_timeout, CompletionBackend, LlmConfig, RagGuardResult, TextStream,
};
use siumai::models;
use siumai::prelude::*;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Completion backend over any siumai-supported provider
pub struct SiumaiBackend {
    client: Box<dyn LlmClient>,
    config: LlmConfig,
}

impl SiumaiBackend {
    /// Create a new backend for the configured provider
    pub async fn new(config: LlmConfig) -> RagResult<Self> {
        let client = Self::build_client(&config).await?;

        info!(
            "Created LLM client for provider: {} with model: {}",
            config.provider, config.model
        );

        Ok(Self { client, config })
    }

    fn api_key(config: &LlmConfig, env_vars: &[&str], provider: &str) -> RagResult<String> {
        config
            .api_key
            .clone()
            .or_else(|| env_vars.iter().find_map(|var| std::env::var(var).ok()))
            .ok_or_else(|| RagError::Config(format!("{} API key not found", provider)))
    }

    async fn build_client(config: &LlmConfig) -> RagResult<Box<dyn LlmClient>> {
        match config.provider.as_str() {
            "gemini" => {
                let api_key =
                    Self::api_key(config, &["GEMINI_API_KEY", "GOOGLE_API_KEY"], "Gemini")?;

                let mut builder = LlmBuilder::new()
                    .gemini()
                    .api_key(&api_key)
                    .model(&config.model)
                    .temperature(config.temperature);

                // The Gemini builder takes a signed token count
                if let Some(max_tokens) = config.max_tokens {
                    builder = builder.max_tokens(gemini_max_tokens(max_tokens)?);
                }

                let client = builder
                    .build()
                    .await
                    .map_err(|e| RagError::Llm(format!("Failed to build Gemini client: {}", e)))?;

                Ok(Box::new(client))
            }
            "openai" => {
                let api_key = Self::api_key(config, &["OPENAI_API_KEY"], "OpenAI")?;

                let mut builder = LlmBuilder::new()
                    .openai()
                    .api_key(&api_key)
                    .model(&config.model)
                    .temperature(config.temperature);

                if let Some(max_tokens) = config.max_tokens {
                    builder = builder.max_tokens(max_tokens);
                }

                if let Some(base_url) = &config.base_url {
                    builder = builder.base_url(base_url);
                }

                let client = builder
                    .build()
                    .await
                    .map_err(|e| RagError::Llm(format!("Failed to build OpenAI client: {}", e)))?;

                Ok(Box::new(client))
            }
            "anthropic" => {
                let api_key = Self::api_key(config, &["ANTHROPIC_API_KEY"], "Anthropic")?;

                let mut builder = LlmBuilder::new()
                    .anthropic()
                    .api_key(&api_key)
                    .model(&config.model)
                    .temperature(config.temperature);

                if let Some(max_tokens) = config.max_tokens {
                    builder = builder.max_tokens(max_tokens);
                }

                let client = builder.build().await.map_err(|e| {
                    RagError::Llm(format!("Failed to build Anthropic client: {}", e))
                })?;

                Ok(Box::new(client))
            }
            "ollama" => {
                let base_url = config
                    .base_url
                    .clone()
                    .unwrap_or_else(|| "http://localhost:11434".to_string());

                let mut builder = LlmBuilder::new()
                    .ollama()
                    .model(&config.model)
                    .base_url(&base_url)
                    .temperature(config.temperature);

                if let Some(max_tokens) = config.max_tokens {
                    builder = builder.max_tokens(max_tokens);
                }

                let client = builder
                    .build()
                    .await
                    .map_err(|e| RagError::Llm(format!("Failed to build Ollama client: {}", e)))?;

                Ok(Box::new(client))
            }
            "groq" => {
                let api_key = Self::api_key(config, &["GROQ_API_KEY"], "Groq")?;

                let mut builder = LlmBuilder::new()
                    .groq()
                    .api_key(&api_key)
                    .model(&config.model)
                    .temperature(config.temperature);

                if let Some(max_tokens) = config.max_tokens {
                    builder = builder.max_tokens(max_tokens);
                }

                let client = builder
                    .build()
                    .await
                    .map_err(|e| RagError::Llm(format!("Failed to build Groq client: {}", e)))?;

                Ok(Box::new(client))
            }
            provider => Err(RagError::Config(format!(
                "Unsupported LLM provider: {}",
                provider
            ))),
        }
    }

    fn messages(&self, prompt: &str) -> Vec<ChatMessage> {
        match &self.config.system_prompt {
            Some(system_prompt) => vec![system!(system_prompt.as_str()), user!(prompt)],
            None => vec![user!(prompt)],
        }
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    pub fn model_info(&self) -> ModelInfo {
        ModelInfo {
            provider: self.config.provider.clone(),
            model: self.config.model.clone(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        }
    }
}

#[async_trait]
impl CompletionBackend for SiumaiBackend {
    async fn generate(&self, prompt: &str) -> RagGuardResult<String> {
        let start_time = Instant::now();

        let response = self
            .client
            .chat(self.messages(prompt))
            .await
            .map_err(|e| network_error!(format!("LLM generation failed: {}", e), "llm_client", e))?;

        match response.content_text() {
            Some(content) => {
                info!(
                    "Generated response in {:?} ({} chars)",
                    start_time.elapsed(),
                    content.len()
                );
                Ok(content.to_string())
            }
            None => Err(network_error!(
                "No text content in LLM response",
                "llm_client"
            )),
        }
    }

    async fn generate_stream(&self, prompt: &str) -> RagGuardResult<TextStream> {
        let stream = self
            .client
            .chat_stream(self.messages(prompt), None)
            .await
            .map_err(|e| network_error!(format!("LLM stream failed to start: {}", e), "llm_client", e))?;

        let fragments = stream.filter_map(|event| async move {
            match event {
                Ok(ChatStreamEvent::ContentDelta { delta, .. }) => Some(Ok(delta)),
                Ok(_) => None,
                Err(e) => Some(Err(network_error!(
                    format!("LLM stream interrupted: {}", e),
                    "llm_client",
                    e
                ))),
            }
        });

        Ok(fragments.boxed())
    }

    fn model_name(&self) -> String {
        self.model_info().summary()
    }
}

/// Information about the current model
#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub provider: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl ModelInfo {
    pub fn summary(&self) -> String {
        format!(
            "{}/{} (temp: {:.1})",
            self.provider, self.model, self.temperature
        )
    }
}

/// The completion stage of the pipeline
#[derive(Clone)]
pub struct CompletionClient {
    backend: Arc<dyn CompletionBackend>,
    timeout_ms: u64,
}

impl CompletionClient {
    pub fn new(backend: Arc<dyn CompletionBackend>, timeout_ms: u64) -> Self {
        Self {
            backend,
            timeout_ms,
        }
    }

    pub fn model_name(&self) -> String {
        self.backend.model_name()
    }

    /// Complete `prompt` in one call. No retry is attempted.
    pub async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        debug!(prompt_chars = prompt.len(), "Requesting completion");

        with_timeout(self.backend.generate(prompt), self.timeout_ms, "completion")
            .await
            .and_then(|result| result)
            .map_err(|e| {
                warn!(error = %e, "Completion failed");
                CompletionError::UpstreamUnavailable(e)
            })
    }

    /// Stream a completion as text fragments
    ///
    /// The timeout bounds stream setup only. Each call owns its stream, so
    /// dropping it early releases the connection without touching any other
    /// request.
    pub async fn stream_complete(&self, prompt: &str) -> Result<TextStream, CompletionError> {
        with_timeout(
            self.backend.generate_stream(prompt),
            self.timeout_ms,
            "completion_stream",
        )
        .await
        .and_then(|result| result)
        .map_err(|e| {
            warn!(error = %e, "Completion stream failed to start");
            CompletionError::UpstreamUnavailable(e)
        })
    }
}

/// Helper functions for creating common LLM configurations
pub mod configs {
    use super::*;

    fn base(provider: &str, model: &str) -> LlmConfig {
        LlmConfig {
            provider: provider.to_string(),
            model: model.to_string(),
            ..LlmConfig::default()
        }
    }

    /// Gemini 2.5 Flash at temperature 0.7
    pub fn gemini_flash() -> LlmConfig {
        base("gemini", "gemini-2.5-flash")
    }

    pub fn openai_gpt4o_mini() -> LlmConfig {
        base("openai", models::openai::GPT_4O_MINI)
    }

    pub fn anthropic_claude_haiku() -> LlmConfig {
        base("anthropic", models::anthropic::CLAUDE_HAIKU_3_5)
    }

    pub fn ollama_llama3(base_url: Option<String>) -> LlmConfig {
        LlmConfig {
            base_url: base_url.or_else(|| Some("http://localhost:11434".to_string())),
            ..base("ollama", "llama3.2")
        }
    }

    pub fn groq_llama3() -> LlmConfig {
        base("groq", "llama-3.1-8b-instant")
    }
}

/// Create a backend from the first provider whose API key is set, falling
/// back to a local Ollama
pub async fn create_auto_backend() -> RagResult<SiumaiBackend> {
    let providers = vec![
        ("gemini", "GEMINI_API_KEY", configs::gemini_flash()),
        ("gemini", "GOOGLE_API_KEY", configs::gemini_flash()),
        ("openai", "OPENAI_API_KEY", configs::openai_gpt4o_mini()),
        (
            "anthropic",
            "ANTHROPIC_API_KEY",
            configs::anthropic_claude_haiku(),
        ),
        ("groq", "GROQ_API_KEY", configs::groq_llama3()),
    ];

    for (provider_name, env_var, config) in providers {
        if std::env::var(env_var).is_ok() {
            info!("Auto-detected {} provider", provider_name);
            match SiumaiBackend::new(config).await {
                Ok(backend) => return Ok(backend),
                Err(e) => {
                    warn!("Failed to create {} client: {}", provider_name, e);
                    continue;
                }
            }
        }
    }

    info!("Trying Ollama as fallback");
    SiumaiBackend::new(configs::ollama_llama3(None)).await
}

fn gemini_max_tokens(max_tokens: u32) -> RagResult<i32> {
    i32::try_from(max_tokens).map_err(|_| {
        RagError::Config(format!(
            "llm.max_tokens {} is too large for Gemini (maximum {})",
            max_tokens,
            i32::MAX
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use ragguard_core::RagGuardError;

    #[test]
    fn test_gemini_max_tokens_is_signed() {
        assert_eq!(gemini_max_tokens(2000).unwrap(), 2000i32);
        assert!(matches!(
            gemini_max_tokens(u32::MAX),
            Err(RagError::Config(_))
        ));
    }

    struct ScriptedBackend {
        fragments: Vec<&'static str>,
        delay_ms: u64,
    }

    #[async_trait]
    impl CompletionBackend for ScriptedBackend {
        async fn generate(&self, _prompt: &str) -> RagGuardResult<String> {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
            Ok(self.fragments.concat())
        }

        async fn generate_stream(&self, _prompt: &str) -> RagGuardResult<TextStream> {
            let items: Vec<RagGuardResult<String>> =
                self.fragments.iter().map(|f| Ok(f.to_string())).collect();
            Ok(stream::iter(items).boxed())
        }

        fn model_name(&self) -> String {
            "scripted".to_string()
        }
    }

    #[tokio::test]
    async fn test_stream_concatenation_matches_complete() {
        let client = CompletionClient::new(
            Arc::new(ScriptedBackend {
                fragments: vec!["Gen", "AI", "Ops"],
                delay_ms: 0,
            }),
            1000,
        );

        let full = client.complete("p").await.unwrap();
        let streamed: Vec<String> = client
            .stream_complete("p")
            .await
            .unwrap()
            .map(|f| f.unwrap())
            .collect()
            .await;

        assert_eq!(streamed.concat(), full);
    }

    #[tokio::test]
    async fn test_dropped_stream_does_not_affect_next_call() {
        let client = CompletionClient::new(
            Arc::new(ScriptedBackend {
                fragments: vec!["a", "b", "c"],
                delay_ms: 0,
            }),
            1000,
        );

        let mut first = client.stream_complete("p").await.unwrap();
        assert_eq!(first.next().await.unwrap().unwrap(), "a");
        drop(first);

        let second: Vec<String> = client
            .stream_complete("p")
            .await
            .unwrap()
            .map(|f| f.unwrap())
            .collect()
            .await;
        assert_eq!(second, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_timeout_is_upstream_unavailable() {
        let client = CompletionClient::new(
            Arc::new(ScriptedBackend {
                fragments: vec!["late"],
                delay_ms: 200,
            }),
            10,
        );

        match client.complete("p").await {
            Err(CompletionError::UpstreamUnavailable(RagGuardError::Timeout { .. })) => {}
            other => panic!("Expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unsupported_provider() {
        let config = LlmConfig {
            provider: "nonexistent".to_string(),
            ..LlmConfig::default()
        };
        assert!(matches!(
            SiumaiBackend::new(config).await,
            Err(RagError::Config(_))
        ));
    }

    #[test]
    fn test_config_presets() {
        assert_eq!(configs::gemini_flash().model, "gemini-2.5-flash");
        assert_eq!(configs::gemini_flash().temperature, 0.7);
        assert_eq!(
            configs::ollama_llama3(None).base_url.as_deref(),
            Some("http://localhost:11434")
        );
    }
}
