//! Type definitions for the guarded pipeline
//!
//! The error kinds here are the only failures allowed to cross the
//! orchestrator boundary. Their `Display` output is safe to show to callers:
//! it never contains the offending input, pattern or leaked token.

use ragguard_core::RagGuardError;
use serde::Serialize;
use thiserror::Error;

/// Result of input validation: accepted, or a rejection reason
pub type ValidationOutcome = Result<(), ValidationError>;

/// Result of output filtering: clean, or a rejection reason
pub type FilterOutcome = Result<(), FilterError>;

/// Setup-time failures (client construction, corpus loading, configuration)
#[derive(Error, Debug)]
pub enum RagError {
    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Corpus error: {0}")]
    Corpus(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Core error: {0}")]
    Core(Box<RagGuardError>),
}

impl From<RagGuardError> for RagError {
    fn from(err: RagGuardError) -> Self {
        RagError::Core(Box::new(err))
    }
}

pub type RagResult<T> = Result<T, RagError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Message must not be empty")]
    EmptyInput,

    #[error("Message is too long (maximum {max} characters)")]
    TooLong { length: usize, max: usize },

    /// `pattern_index` is the position in the injection table, for audit only
    #[error("Message contains a disallowed pattern")]
    InjectionSuspected { pattern_index: usize },
}

impl ValidationError {
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationError::EmptyInput => "empty_input",
            ValidationError::TooLong { .. } => "too_long",
            ValidationError::InjectionSuspected { .. } => "injection_suspected",
        }
    }
}

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("Retrieval service unavailable")]
    UpstreamUnavailable(#[source] RagGuardError),
}

#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("Completion service unavailable")]
    UpstreamUnavailable(#[source] RagGuardError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Model output does not match the response schema: {reason}")]
    SchemaViolation { reason: String },
}

/// Category of secret-like token detected in an answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretKind {
    ApiKey,
    LangfusePublicKey,
    LangfuseSecretKey,
    GoogleApiKey,
    Email,
}

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FilterError {
    #[error("Answer contains a secret-like token")]
    SecretLeak { kind: SecretKind },

    /// `keyword` is an entry of the fixed keyword table, never model text
    #[error("Answer contains harmful content")]
    HarmfulContent { keyword: &'static str },
}

impl FilterError {
    pub fn kind(&self) -> &'static str {
        match self {
            FilterError::SecretLeak { .. } => "secret_leak",
            FilterError::HarmfulContent { .. } => "harmful_content",
        }
    }
}

/// Generic message returned for every 5xx outcome
pub const GENERIC_APOLOGY: &str =
    "Sorry, we could not produce an answer to your question. Please try again later.";

/// The single failure a pipeline run may surface
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Filter(#[from] FilterError),
}

impl PipelineError {
    /// HTTP status for this outcome
    pub fn status_code(&self) -> u16 {
        match self {
            PipelineError::Validation(_) => 400,
            _ => 500,
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::Validation(_) => "validation_error",
            PipelineError::Retrieval(_) => "retrieval_error",
            PipelineError::Completion(_) => "completion_error",
            PipelineError::Parse(_) => "parse_error",
            PipelineError::Filter(_) => "output_filtered",
        }
    }

    /// Message safe to return to the caller
    pub fn public_message(&self) -> String {
        match self {
            PipelineError::Validation(err) => err.to_string(),
            _ => GENERIC_APOLOGY.to_string(),
        }
    }

    /// The collaborator failure behind a retrieval or completion error
    pub fn upstream_cause(&self) -> Option<&RagGuardError> {
        match self {
            PipelineError::Retrieval(RetrievalError::UpstreamUnavailable(cause))
            | PipelineError::Completion(CompletionError::UpstreamUnavailable(cause)) => Some(cause),
            _ => None,
        }
    }

    /// Terminal state the orchestrator ends in for this error
    pub fn terminal_state(&self) -> PipelineState {
        match self {
            PipelineError::Validation(_) => PipelineState::Rejected(RejectReason::Validation),
            PipelineError::Filter(_) => PipelineState::Rejected(RejectReason::OutputFilter),
            PipelineError::Retrieval(_) | PipelineError::Completion(_) => {
                PipelineState::Failed(FailReason::Upstream)
            }
            PipelineError::Parse(_) => PipelineState::Failed(FailReason::Parse),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    Validation,
    OutputFilter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailReason {
    Upstream,
    Parse,
}

/// Per-request pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "reason")]
pub enum PipelineState {
    Received,
    InputChecked,
    Retrieved,
    Composed,
    Completed,
    Parsed,
    OutputChecked,
    Responded,
    Rejected(RejectReason),
    Failed(FailReason),
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineState::Responded | PipelineState::Rejected(_) | PipelineState::Failed(_)
        )
    }

    /// Whether `next` is a legal successor of `self`
    pub fn can_transition_to(&self, next: PipelineState) -> bool {
        use PipelineState::*;
        match (self, next) {
            (Received, InputChecked)
            | (InputChecked, Retrieved)
            | (Retrieved, Composed)
            | (Composed, Completed)
            | (Completed, Parsed)
            | (Parsed, OutputChecked)
            | (OutputChecked, Responded) => true,
            (Received, Rejected(RejectReason::Validation)) => true,
            (Parsed, Rejected(RejectReason::OutputFilter)) => true,
            (InputChecked | Composed, Failed(FailReason::Upstream)) => true,
            (Completed, Failed(FailReason::Parse)) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragguard_core::network_error;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            PipelineError::from(ValidationError::EmptyInput).status_code(),
            400
        );
        assert_eq!(
            PipelineError::from(FilterError::SecretLeak {
                kind: SecretKind::Email
            })
            .status_code(),
            500
        );
        let upstream = CompletionError::UpstreamUnavailable(network_error!("down", "llm"));
        let err = PipelineError::from(upstream);
        assert_eq!(err.status_code(), 500);
        assert!(err.upstream_cause().is_some());
        assert!(PipelineError::from(ValidationError::EmptyInput)
            .upstream_cause()
            .is_none());
    }

    #[test]
    fn test_public_message_hides_internal_causes() {
        let err = PipelineError::from(ParseError::SchemaViolation {
            reason: "confidence 7 is outside [0.0, 1.0]".into(),
        });
        assert_eq!(err.public_message(), GENERIC_APOLOGY);
        assert_eq!(err.code(), "parse_error");

        let err = PipelineError::from(ValidationError::TooLong {
            length: 2001,
            max: 2000,
        });
        assert!(err.public_message().contains("2000"));
    }

    #[test]
    fn test_terminal_states() {
        let err = PipelineError::from(FilterError::HarmfulContent { keyword: "violence" });
        assert_eq!(
            err.terminal_state(),
            PipelineState::Rejected(RejectReason::OutputFilter)
        );
        assert!(err.terminal_state().is_terminal());
        assert!(!PipelineState::Composed.is_terminal());
    }

    #[test]
    fn test_transitions() {
        use PipelineState::*;
        assert!(Received.can_transition_to(InputChecked));
        assert!(Received.can_transition_to(Rejected(RejectReason::Validation)));
        assert!(!Received.can_transition_to(Retrieved));
        assert!(Composed.can_transition_to(Failed(FailReason::Upstream)));
        assert!(!Responded.can_transition_to(Received));
    }
}
