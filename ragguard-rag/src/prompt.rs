//! Grounding prompt composition

use ragguard_core::{ContextChunk, MAX_FOLLOW_UP_QUESTIONS};

/// Machine-readable description of the structured response schema
pub fn format_directive() -> String {
    format!(
        "Respond with a single JSON object and nothing else, using exactly these fields:\n\
         {{\n  \
         \"answer\": string,\n  \
         \"confidence\": number between 0.0 and 1.0,\n  \
         \"sources\": array of source identifiers copied from the CONTEXT labels,\n  \
         \"follow_up_questions\": array of at most {} strings\n\
         }}\n\
         If the CONTEXT does not contain the answer, say so in \"answer\" and use a low confidence.",
        MAX_FOLLOW_UP_QUESTIONS
    )
}

/// Builds the prompt sent to the completion backend
///
/// Composition is a pure function of its inputs: the same question and
/// context always produce byte-identical text.
#[derive(Debug, Clone)]
pub struct PromptComposer {
    format_directive: String,
}

impl Default for PromptComposer {
    fn default() -> Self {
        Self::new(format_directive())
    }
}

impl PromptComposer {
    pub fn new(format_directive: impl Into<String>) -> Self {
        Self {
            format_directive: format_directive.into(),
        }
    }

    pub fn compose(&self, question: &str, context: &[ContextChunk]) -> String {
        compose(question, context, &self.format_directive)
    }
}

/// Join chunk texts in rank order, labelled with their source
pub fn context_block(context: &[ContextChunk]) -> String {
    context
        .iter()
        .enumerate()
        .map(|(i, chunk)| match chunk.source() {
            Some(source) => format!("[source: {}]\n{}", source, chunk.text),
            None => format!("[Source {}]\n{}", i + 1, chunk.text),
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

pub fn compose(question: &str, context: &[ContextChunk], format_directive: &str) -> String {
    format!(
        "Answer the Question using only the CONTEXT below.\n\n\
         CONTEXT:\n{}\n\n\
         Question:\n{}\n\n\
         {}",
        context_block(context),
        question,
        format_directive
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks() -> Vec<ContextChunk> {
        vec![
            ContextChunk::new("Returns are accepted within 30 days.")
                .with_metadata("source", "returns.md"),
            ContextChunk::new("Refunds go to the original payment method."),
        ]
    }

    #[test]
    fn test_compose_is_deterministic() {
        let composer = PromptComposer::default();
        let a = composer.compose("What is the return policy?", &chunks());
        let b = composer.compose("What is the return policy?", &chunks());
        assert_eq!(a, b);
    }

    #[test]
    fn test_context_preserves_rank_order_and_labels() {
        let prompt = PromptComposer::default().compose("q", &chunks());
        let first = prompt.find("[source: returns.md]").unwrap();
        let second = prompt.find("[Source 2]").unwrap();
        assert!(first < second);
        assert!(prompt.contains("Question:\nq"));
        assert!(prompt.ends_with(&format_directive()));
    }

    #[test]
    fn test_empty_context_keeps_block() {
        let prompt = compose("q", &[], "FORMAT");
        assert!(prompt.contains("CONTEXT:\n\n\nQuestion:\nq"));
        assert!(prompt.ends_with("FORMAT"));
    }
}
