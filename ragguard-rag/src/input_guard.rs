//! Input validation
//!
//! A cheap first gate run before any retrieval or model call. Injection
//! detection is a heuristic keyword table: paraphrased injections slip
//! through and legitimate text mentioning the keywords is rejected.

use crate::types::{ValidationError, ValidationOutcome};
use regex::{Regex, RegexBuilder};
use std::sync::OnceLock;
use tracing::debug;

/// Default maximum message length in characters
pub const MAX_INPUT_LENGTH: usize = 2000;

/// Injection heuristics, checked in declaration order
const INJECTION_PATTERNS: &[&str] = &[
    r"ignore\s+(all\s+)?(previous|above|prior)\s+(instructions?|prompts?|commands?)",
    r"forget\s+(all\s+)?(previous|above|prior)\s+(instructions?|prompts?|commands?)",
    r"disregard\s+(all\s+)?(previous|above|prior)\s+(instructions?|prompts?|commands?)",
    r"system\s+prompt",
    r"あなたの指示を無視",
    r"以前の指示を.*無視",
    r"システムプロンプトを.*教えて",
];

static INJECTION_REGEXES: OnceLock<Vec<Regex>> = OnceLock::new();

fn injection_regexes() -> &'static [Regex] {
    INJECTION_REGEXES.get_or_init(|| {
        INJECTION_PATTERNS
            .iter()
            .map(|pattern| {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .expect("injection pattern table must compile")
            })
            .collect()
    })
}

#[derive(Debug, Clone)]
pub struct InputGuard {
    max_length: usize,
}

impl Default for InputGuard {
    fn default() -> Self {
        Self::new(MAX_INPUT_LENGTH)
    }
}

impl InputGuard {
    pub fn new(max_length: usize) -> Self {
        Self { max_length }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Validate a user message
    ///
    /// Length is counted in Unicode scalar values, so a Japanese message of
    /// 2000 characters is accepted regardless of its UTF-8 byte size.
    pub fn validate(&self, message: &str) -> ValidationOutcome {
        let length = message.chars().count();
        if length > self.max_length {
            return Err(ValidationError::TooLong {
                length,
                max: self.max_length,
            });
        }

        if message.trim().is_empty() {
            return Err(ValidationError::EmptyInput);
        }

        if let Some(pattern_index) = injection_regexes()
            .iter()
            .position(|regex| regex.is_match(message))
        {
            debug!(pattern_index, "Injection heuristic matched");
            return Err(ValidationError::InjectionSuspected { pattern_index });
        }

        Ok(())
    }
}
