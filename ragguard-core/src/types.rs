//! Core data type definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// Maximum number of follow-up questions a structured response may carry
pub const MAX_FOLLOW_UP_QUESTIONS: usize = 3;

/// Attribute name to required value, applied at retrieval time
pub type MetadataFilter = HashMap<String, serde_json::Value>;

/// Inbound chat request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct ChatRequest {
    /// The user's current message
    #[cfg_attr(feature = "openapi", schema(example = "What is the return policy?"))]
    pub message: String,
    /// Prior turns, oldest first. Accepted but not consumed by retrieval.
    #[serde(default)]
    pub history: Vec<HistoryTurn>,
    /// Optional equality constraints over chunk metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub metadata_filter: Option<MetadataFilter>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            history: Vec::new(),
            metadata_filter: None,
        }
    }

    pub fn with_filter(mut self, filter: MetadataFilter) -> Self {
        self.metadata_filter = Some(filter);
        self
    }
}

/// One prior conversation turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct HistoryTurn {
    #[serde(rename = "type")]
    pub role: TurnRole,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    Human,
    Ai,
}

/// A span of a source document, read-only to the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextChunk {
    /// Text content
    pub text: String,
    /// Ingestion-time metadata (`source`, `category`, `language`,
    /// `last_updated`, `version`, ...)
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ContextChunk {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Identifier of the source document, if recorded at ingestion
    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").and_then(|v| v.as_str())
    }

    /// Whether every filter key is present with a structurally equal value
    pub fn matches(&self, filter: &MetadataFilter) -> bool {
        filter
            .iter()
            .all(|(key, expected)| self.metadata.get(key) == Some(expected))
    }
}

/// Schema-validated answer returned to callers
///
/// Deserialization goes through [`RawStructuredResponse`] and fails rather
/// than clamping when a field is out of range, so every value of this type
/// satisfies `0.0 <= confidence <= 1.0` and carries at most
/// [`MAX_FOLLOW_UP_QUESTIONS`] follow-ups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(try_from = "RawStructuredResponse")]
pub struct StructuredResponse {
    #[cfg_attr(feature = "openapi", schema(example = "Items can be returned within 30 days."))]
    pub answer: String,
    #[cfg_attr(feature = "openapi", schema(minimum = 0.0, maximum = 1.0, example = 0.9))]
    pub confidence: f64,
    pub sources: Vec<String>,
    #[cfg_attr(feature = "openapi", schema(max_items = 3))]
    pub follow_up_questions: Vec<String>,
}

/// Wire shape of a structured response before range checks
#[derive(Debug, Clone, Deserialize)]
pub struct RawStructuredResponse {
    pub answer: String,
    pub confidence: f64,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub follow_up_questions: Vec<String>,
}

impl TryFrom<RawStructuredResponse> for StructuredResponse {
    type Error = String;

    fn try_from(raw: RawStructuredResponse) -> Result<Self, Self::Error> {
        if !(0.0..=1.0).contains(&raw.confidence) {
            return Err(format!(
                "confidence {} is outside [0.0, 1.0]",
                raw.confidence
            ));
        }
        if raw.follow_up_questions.len() > MAX_FOLLOW_UP_QUESTIONS {
            return Err(format!(
                "{} follow_up_questions exceed the maximum of {}",
                raw.follow_up_questions.len(),
                MAX_FOLLOW_UP_QUESTIONS
            ));
        }

        Ok(Self {
            answer: raw.answer,
            confidence: raw.confidence,
            sources: raw.sources,
            follow_up_questions: raw.follow_up_questions,
        })
    }
}

/// Severity of a closed trace span
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SpanLevel {
    Default,
    Error,
}

/// An open span, owned by whoever began it until it is closed
#[derive(Debug, Clone)]
pub struct SpanHandle {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
    pub metadata: serde_json::Value,
    pub started_at: DateTime<Utc>,
}

impl SpanHandle {
    pub fn open(name: &str, input: serde_json::Value, metadata: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            input,
            metadata,
            started_at: Utc::now(),
        }
    }

    /// Finish the span. The returned record is never mutated afterwards.
    pub fn close(self, output: serde_json::Value, level: SpanLevel) -> TraceSpan {
        TraceSpan {
            id: self.id,
            name: self.name,
            input: self.input,
            output,
            metadata: self.metadata,
            level,
            started_at: self.started_at,
            ended_at: Utc::now(),
        }
    }
}

/// A closed observability record for one pipeline stage
#[derive(Debug, Clone, Serialize)]
pub struct TraceSpan {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
    pub output: serde_json::Value,
    pub metadata: serde_json::Value,
    pub level: SpanLevel,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl TraceSpan {
    pub fn duration_ms(&self) -> i64 {
        (self.ended_at - self.started_at).num_milliseconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chat_request_defaults() {
        let request: ChatRequest =
            serde_json::from_value(json!({ "message": "hello" })).unwrap();
        assert!(request.history.is_empty());
        assert!(request.metadata_filter.is_none());
    }

    #[test]
    fn test_history_turn_tags() {
        let request: ChatRequest = serde_json::from_value(json!({
            "message": "and shipping?",
            "history": [
                { "type": "human", "content": "What is the return policy?" },
                { "type": "ai", "content": "30 days." }
            ]
        }))
        .unwrap();
        assert_eq!(request.history[0].role, TurnRole::Human);
        assert_eq!(request.history[1].role, TurnRole::Ai);

        let bad = serde_json::from_value::<ChatRequest>(json!({
            "message": "x",
            "history": [{ "type": "system", "content": "y" }]
        }));
        assert!(bad.is_err());
    }

    #[test]
    fn test_chunk_filter_is_structural_equality() {
        let chunk = ContextChunk::new("Returns are accepted within 30 days.")
            .with_metadata("source", "returns.md")
            .with_metadata("category", "policy")
            .with_metadata("version", 2);

        let mut filter = MetadataFilter::new();
        assert!(chunk.matches(&filter));

        filter.insert("category".into(), json!("policy"));
        assert!(chunk.matches(&filter));

        filter.insert("version".into(), json!("2"));
        assert!(!chunk.matches(&filter));

        let mut missing = MetadataFilter::new();
        missing.insert("language".into(), json!("en"));
        assert!(!chunk.matches(&missing));
    }

    #[test]
    fn test_structured_response_rejects_out_of_range_confidence() {
        let err = serde_json::from_value::<StructuredResponse>(json!({
            "answer": "a",
            "confidence": 1.2,
            "sources": [],
            "follow_up_questions": []
        }))
        .unwrap_err();
        assert!(err.to_string().contains("confidence"));

        let ok: StructuredResponse = serde_json::from_value(json!({
            "answer": "a",
            "confidence": 1.0
        }))
        .unwrap();
        assert_eq!(ok.confidence, 1.0);
        assert!(ok.sources.is_empty());
    }

    #[test]
    fn test_structured_response_rejects_too_many_follow_ups() {
        let result = serde_json::from_value::<StructuredResponse>(json!({
            "answer": "a",
            "confidence": 0.5,
            "follow_up_questions": ["1", "2", "3", "4"]
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_span_close_keeps_identity() {
        let handle = SpanHandle::open("retrieval", json!({"q": "x"}), json!({}));
        let id = handle.id.clone();
        let span = handle.close(json!({"chunks": 0}), SpanLevel::Default);
        assert_eq!(span.id, id);
        assert_eq!(span.name, "retrieval");
        assert!(span.duration_ms() >= 0);
    }
}
