//! Structured output decoding
//!
//! Decoding never coerces: an out-of-range `confidence` or an overlong
//! follow-up list fails the parse instead of being clamped or truncated.

use crate::types::ParseError;
use ragguard_core::StructuredResponse;

/// Decode a raw completion into a [`StructuredResponse`]
pub fn parse(raw: &str) -> Result<StructuredResponse, ParseError> {
    serde_json::from_str(strip_code_fence(raw)).map_err(|e| ParseError::SchemaViolation {
        reason: e.to_string(),
    })
}

/// Models often wrap JSON in a Markdown fence; accept that and nothing else
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}
