//! Output filtering
//!
//! Scans every text field of a decoded response for secret-shaped tokens,
//! then for harmful keywords. Keyword matching is plain substring containment with no
//! handling of negation: "avoid violent language" is rejected too.

use crate::types::{FilterError, FilterOutcome, SecretKind};
use ragguard_core::StructuredResponse;
use regex::Regex;
use std::sync::OnceLock;
use tracing::warn;

/// Secret-token shapes, checked in declaration order. Case-sensitive.
const SECRET_PATTERNS: &[(SecretKind, &str)] = &[
    (SecretKind::ApiKey, r"sk-[a-zA-Z0-9]{32,}"),
    (SecretKind::LangfusePublicKey, r"pk-lf-[a-zA-Z0-9-]+"),
    (SecretKind::LangfuseSecretKey, r"sk-lf-[a-zA-Z0-9-]+"),
    (SecretKind::GoogleApiKey, r"AIza[0-9A-Za-z_-]{35}"),
    (
        SecretKind::Email,
        r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}",
    ),
];

/// Harmful-content keywords
const HARMFUL_KEYWORDS: &[&str] = &[
    "暴力",
    "差別",
    "誹謗中傷",
    "violent",
    "violence",
    "discrimination",
    "defamation",
];

static SECRET_REGEXES: OnceLock<Vec<(SecretKind, Regex)>> = OnceLock::new();

fn secret_regexes() -> &'static [(SecretKind, Regex)] {
    SECRET_REGEXES.get_or_init(|| {
        SECRET_PATTERNS
            .iter()
            .map(|(kind, pattern)| {
                (
                    *kind,
                    Regex::new(pattern).expect("secret pattern table must compile"),
                )
            })
            .collect()
    })
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OutputGuard;

impl OutputGuard {
    pub fn new() -> Self {
        Self
    }

    /// Check an answer; the text itself is never modified
    pub fn filter(&self, answer: &str) -> FilterOutcome {
        if let Some((kind, _)) = secret_regexes()
            .iter()
            .find(|(_, regex)| regex.is_match(answer))
        {
            warn!(kind = ?kind, "Secret-like token detected in answer");
            return Err(FilterError::SecretLeak { kind: *kind });
        }

        if let Some(keyword) = HARMFUL_KEYWORDS
            .iter()
            .copied()
            .find(|keyword| answer.contains(keyword))
        {
            warn!(keyword, "Harmful keyword detected in answer");
            return Err(FilterError::HarmfulContent { keyword });
        }

        Ok(())
    }

    /// Check the answer, each source and each follow-up question, in that
    /// order. A rejection names the first field that tripped, such as
    /// `sources[1]`.
    pub fn filter_response(
        &self,
        response: &StructuredResponse,
    ) -> Result<(), (String, FilterError)> {
        let fields = std::iter::once(("answer".to_string(), response.answer.as_str()))
            .chain(
                response
                    .sources
                    .iter()
                    .enumerate()
                    .map(|(i, s)| (format!("sources[{}]", i), s.as_str())),
            )
            .chain(
                response
                    .follow_up_questions
                    .iter()
                    .enumerate()
                    .map(|(i, q)| (format!("follow_up_questions[{}]", i), q.as_str())),
            );

        for (field, text) in fields {
            if let Err(e) = self.filter(text) {
                return Err((field, e));
            }
        }
        Ok(())
    }
}
