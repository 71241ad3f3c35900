//! Configuration management

use crate::error::{ErrorContext, RagGuardError, RagGuardResult};
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration, loaded from TOML
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RagGuardConfig {
    pub llm: LlmConfig,
    pub retrieval: RetrievalConfig,
    pub guards: GuardConfig,
    pub tracing: TracingConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider type (gemini, openai, anthropic, ollama, groq)
    pub provider: String,
    /// Model name
    pub model: String,
    /// API key (optional, can be set via environment)
    pub api_key: Option<String>,
    /// Base URL for custom providers
    pub base_url: Option<String>,
    /// Temperature for generation
    pub temperature: f32,
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
    /// Optional system message sent ahead of the composed prompt
    pub system_prompt: Option<String>,
    /// Upper bound on a single completion call
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: "gemini-2.5-flash".to_string(),
            api_key: None,
            base_url: None,
            temperature: 0.7,
            max_tokens: Some(2000),
            system_prompt: None,
            timeout_ms: 60_000,
        }
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of chunks to retrieve
    pub top_k: usize,
    /// Upper bound on a single similarity search
    pub timeout_ms: u64,
    /// Knowledge corpus: a JSON array of chunks or a plain-text file
    pub corpus_path: Option<PathBuf>,
    /// Characters per chunk when splitting plain-text corpora
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks
    pub chunk_overlap: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            timeout_ms: 10_000,
            corpus_path: None,
            chunk_size: 500,
            chunk_overlap: 50,
        }
    }
}

/// Input/output guard configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Maximum message length in characters
    pub max_input_length: usize,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            max_input_length: 2000,
        }
    }
}

/// Where closed trace spans go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceSinkKind {
    /// Emit spans as tracing events
    Log,
    /// Batch spans to a Langfuse ingestion endpoint
    Langfuse,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TracingConfig {
    pub sink: TraceSinkKind,
    /// Langfuse host; falls back to `LANGFUSE_HOST`
    pub langfuse_host: Option<String>,
    pub langfuse_public_key: Option<String>,
    pub langfuse_secret_key: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            sink: TraceSinkKind::Log,
            langfuse_host: None,
            langfuse_public_key: None,
            langfuse_secret_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

impl RagGuardConfig {
    /// Load configuration from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> RagGuardResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| RagGuardError::Config {
            message: format!("Failed to read config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("read_file")
                .with_suggestion("Check if the config file exists and is readable"),
        })?;

        let config: RagGuardConfig = toml::from_str(&content).map_err(|e| RagGuardError::Config {
            message: format!("Failed to parse config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("parse_toml")
                .with_suggestion("Check TOML syntax in config file"),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> RagGuardResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| RagGuardError::Config {
            message: format!("Failed to serialize config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config").with_operation("serialize_toml"),
        })?;

        std::fs::write(path, content).map_err(|e| RagGuardError::Config {
            message: format!("Failed to write config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("write_file")
                .with_suggestion("Check if the directory exists and is writable"),
        })?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> RagGuardResult<()> {
        let invalid = |message: &str, suggestion: &str| RagGuardError::Config {
            message: message.to_string(),
            source: None,
            context: ErrorContext::new("config")
                .with_operation("validate")
                .with_suggestion(suggestion),
        };

        if self.retrieval.top_k == 0 {
            return Err(invalid(
                "retrieval.top_k must be greater than 0",
                "Set retrieval.top_k to a positive value",
            ));
        }

        if self.retrieval.chunk_size == 0 || self.retrieval.chunk_overlap >= self.retrieval.chunk_size
        {
            return Err(invalid(
                "retrieval.chunk_overlap must be smaller than a non-zero retrieval.chunk_size",
                "Use e.g. chunk_size = 500 and chunk_overlap = 50",
            ));
        }

        if self.guards.max_input_length == 0 {
            return Err(invalid(
                "guards.max_input_length must be greater than 0",
                "Set guards.max_input_length to a positive value",
            ));
        }

        if self.llm.timeout_ms == 0 || self.retrieval.timeout_ms == 0 {
            return Err(invalid(
                "llm.timeout_ms and retrieval.timeout_ms must be greater than 0",
                "Set both timeouts to a positive number of milliseconds",
            ));
        }

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(invalid(
                "llm.temperature must be in [0.0, 2.0]",
                "Set llm.temperature between 0.0 and 2.0",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = RagGuardConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.guards.max_input_length, 2000);
        assert_eq!(config.tracing.sink, TraceSinkKind::Log);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: RagGuardConfig = toml::from_str(
            r#"
            [llm]
            provider = "openai"
            model = "gpt-4o-mini"

            [retrieval]
            top_k = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.llm.timeout_ms, 60_000);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.retrieval.chunk_size, 500);
        assert_eq!(config.server.port, 8000);
    }

    #[test]
    fn test_validate_rejects_zero_top_k() {
        let mut config = RagGuardConfig::default();
        config.retrieval.top_k = 0;
        assert!(matches!(
            config.validate(),
            Err(RagGuardError::Config { .. })
        ));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ragguard.toml");

        let mut config = RagGuardConfig::default();
        config.tracing.sink = TraceSinkKind::Langfuse;
        config.save_to_file(&path).unwrap();

        let loaded = RagGuardConfig::from_file(&path).unwrap();
        assert_eq!(loaded.tracing.sink, TraceSinkKind::Langfuse);
        assert_eq!(loaded.llm.model, "gemini-2.5-flash");
    }
}
