//! In-memory knowledge index
//!
//! A local stand-in for the vector store: chunks are held in memory and
//! ranked by keyword overlap with the query. This makes no claim of semantic
//! retrieval. The metadata filter is applied before ranking, so a filter
//! never pushes a matching chunk out of the top `k`.

use crate::types::{RagError, RagResult};
use async_trait::async_trait;
use ragguard_core::{ContextChunk, MetadataFilter, RagGuardResult, RetrievalConfig, SimilaritySearch};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

pub struct KnowledgeIndex {
    chunks: Vec<ContextChunk>,
}

impl KnowledgeIndex {
    pub fn new(chunks: Vec<ContextChunk>) -> Self {
        Self { chunks }
    }

    /// Load a corpus file
    ///
    /// `.json` files hold an array of `{text, metadata}` chunks. Anything
    /// else is read as plain text and split with the configured chunk size
    /// and overlap; each chunk's `source` is the file name.
    pub fn from_path<P: AsRef<Path>>(path: P, config: &RetrievalConfig) -> RagResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            RagError::Corpus(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let chunks = if is_json {
            serde_json::from_str::<Vec<ContextChunk>>(&content)?
        } else {
            let source = path
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or("knowledge")
                .to_string();
            split_text(&content, config.chunk_size, config.chunk_overlap)?
                .into_iter()
                .enumerate()
                .map(|(i, text)| {
                    ContextChunk::new(text)
                        .with_metadata("source", source.as_str())
                        .with_metadata("chunk_index", i)
                })
                .collect()
        };

        info!(
            "Loaded {} chunks from {}",
            chunks.len(),
            path.display()
        );

        Ok(Self::new(chunks))
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Rank chunks by the number of distinct query terms they contain
    pub fn rank(&self, query: &str, k: usize, filter: Option<&MetadataFilter>) -> Vec<ContextChunk> {
        let terms = query_terms(query);
        if terms.is_empty() || k == 0 {
            return Vec::new();
        }

        let mut scored: Vec<(usize, &ContextChunk)> = self
            .chunks
            .iter()
            .filter(|chunk| filter.map_or(true, |f| chunk.matches(f)))
            .filter_map(|chunk| {
                let score = overlap(&terms, &chunk.text);
                (score > 0).then_some((score, chunk))
            })
            .collect();

        // Stable sort keeps insertion order among equal scores
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        debug!(candidates = scored.len(), k, "Ranked knowledge chunks");

        scored
            .into_iter()
            .take(k)
            .map(|(_, chunk)| chunk.clone())
            .collect()
    }
}

#[async_trait]
impl SimilaritySearch for KnowledgeIndex {
    async fn search(
        &self,
        query: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> RagGuardResult<Vec<ContextChunk>> {
        Ok(self.rank(query, k, filter))
    }
}

fn tokens(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
}

/// Number of distinct query terms present in `text`
///
/// ASCII terms must equal a whole token of the text, so "a" does not match
/// "days". Bigrams of unspaced scripts are matched as substrings.
fn overlap(terms: &[String], text: &str) -> usize {
    let text = text.to_lowercase();
    let words: HashSet<&str> = tokens(&text).collect();

    terms
        .iter()
        .filter(|term| {
            if term.is_ascii() {
                words.contains(term.as_str())
            } else {
                text.contains(term.as_str())
            }
        })
        .count()
}

/// Lower-cased alphanumeric tokens. Words containing non-ASCII letters (for
/// example Japanese, which has no word spacing) are broken into character
/// bigrams.
fn query_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();

    for word in query.to_lowercase().split_whitespace() {
        if word.is_ascii() {
            terms.extend(tokens(word).map(str::to_string));
        } else {
            let chars: Vec<char> = word
                .chars()
                .filter(|c| c.is_alphanumeric())
                .collect();
            if chars.len() < 2 {
                terms.extend(chars.iter().map(|c| c.to_string()));
            } else {
                terms.extend(chars.windows(2).map(|pair| pair.iter().collect()));
            }
        }
    }

    terms.sort();
    terms.dedup();
    terms
}

/// Split text into windows of `chunk_size` characters, consecutive windows
/// sharing `chunk_overlap` characters
pub fn split_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> RagResult<Vec<String>> {
    if chunk_size == 0 || chunk_overlap >= chunk_size {
        return Err(RagError::Config(format!(
            "chunk_overlap ({}) must be smaller than chunk_size ({})",
            chunk_overlap, chunk_size
        )));
    }

    let chars: Vec<char> = text.chars().collect();
    let step = chunk_size - chunk_overlap;
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        let chunk: String = chars[start..end].iter().collect();
        if !chunk.trim().is_empty() {
            chunks.push(chunk.trim().to_string());
        }
        if end == chars.len() {
            break;
        }
        start += step;
    }

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn index() -> KnowledgeIndex {
        KnowledgeIndex::new(vec![
            ContextChunk::new("Shipping takes 3-5 business days.")
                .with_metadata("source", "shipping.md")
                .with_metadata("language", "en"),
            ContextChunk::new("The return policy allows returns within 30 days.")
                .with_metadata("source", "returns.md")
                .with_metadata("language", "en"),
            ContextChunk::new("Return shipping is free for defective items.")
                .with_metadata("source", "returns-shipping.md")
                .with_metadata("language", "en"),
            ContextChunk::new("返品ポリシー: 30日以内であれば返品できます。")
                .with_metadata("source", "returns-ja.md")
                .with_metadata("language", "ja"),
        ])
    }

    #[test]
    fn test_rank_by_term_overlap() {
        let results = index().rank("What is the return policy?", 3, None);
        assert_eq!(results[0].source(), Some("returns.md"));
        assert!(results.len() <= 3);
    }

    #[test]
    fn test_filter_applies_before_ranking() {
        let mut filter = MetadataFilter::new();
        filter.insert("language".into(), json!("ja"));
        let results = index().rank("返品ポリシーを教えて", 3, Some(&filter));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source(), Some("returns-ja.md"));
    }

    #[test]
    fn test_terms_match_whole_tokens() {
        let index = KnowledgeIndex::new(vec![
            ContextChunk::new("Deliveries arrive within days.").with_metadata("source", "a.md"),
            ContextChunk::new("This is a refund.").with_metadata("source", "b.md"),
        ]);

        let results = index.rank("a", 3, None);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source(), Some("b.md"));

        assert!(index.rank("day refunds", 3, None).is_empty());
        assert_eq!(index.rank("refund?", 3, None)[0].source(), Some("b.md"));
    }

    #[test]
    fn test_no_overlap_returns_empty() {
        assert!(index().rank("Llama model", 3, None).is_empty());
        assert!(index().rank("   ", 3, None).is_empty());
    }

    #[test]
    fn test_split_text_overlap() {
        let text: String = ('a'..='z').cycle().take(1000).collect();
        let chunks = split_text(&text, 500, 50).unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].chars().count(), 500);
        assert_eq!(&chunks[0][450..], &chunks[1][..50]);
        assert!(split_text("abc", 10, 10).is_err());
        assert!(split_text("", 500, 50).unwrap().is_empty());
    }

    #[test]
    fn test_load_text_and_json_corpora() {
        let dir = tempfile::tempdir().unwrap();
        let config = RetrievalConfig::default();

        let text_path = dir.path().join("knowledge.txt");
        let mut file = std::fs::File::create(&text_path).unwrap();
        writeln!(file, "Gemini CLI brings Gemini to the terminal.").unwrap();
        let index = KnowledgeIndex::from_path(&text_path, &config).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.chunks[0].source(), Some("knowledge.txt"));

        let json_path = dir.path().join("corpus.json");
        std::fs::write(
            &json_path,
            json!([{ "text": "a", "metadata": { "source": "a.md", "version": 2 } }]).to_string(),
        )
        .unwrap();
        let index = KnowledgeIndex::from_path(&json_path, &config).unwrap();
        assert_eq!(index.chunks[0].metadata["version"], json!(2));

        std::fs::write(&json_path, "{not json").unwrap();
        assert!(matches!(
            KnowledgeIndex::from_path(&json_path, &config),
            Err(RagError::Serialization(_))
        ));
    }
}
