//! Token counting and token-bounded splitting.
//!
//! Token counts come from `tiktoken-rs` when the requested encoding resolves, and from a
//! whitespace counter otherwise. Splitting is delegated to `semchunk-rs`, which keeps every
//! segment within the budget while preferring paragraph, sentence and word boundaries. Chunks do
//! not overlap.

use anyhow::Error as TokenizerError;
use semchunk_rs::Chunker;
use std::sync::Arc;
use tiktoken_rs::{CoreBPE, cl100k_base, get_bpe_from_model, o200k_base, p50k_base, r50k_base};

use super::ChunkingError;

/// Shared token counting function.
pub(crate) type TokenCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

/// Build a counter for `encoding`, which may be a model name or a tiktoken encoding name.
///
/// An unknown name falls back to the whitespace counter with a warning.
pub(crate) fn build_token_counter(encoding: &str) -> TokenCounter {
    match build_tiktoken_counter(encoding) {
        Ok(counter) => counter,
        Err(error) => {
            tracing::warn!(
                encoding,
                error = %error,
                "Tokenizer unavailable; falling back to whitespace counter"
            );
            whitespace_token_counter()
        }
    }
}

fn build_tiktoken_counter(encoding: &str) -> Result<TokenCounter, ChunkingError> {
    let normalized = encoding.trim();
    let target = if normalized.is_empty() {
        "cl100k_base"
    } else {
        normalized
    };
    let bpe = resolve_encoding(target).map_err(|source| ChunkingError::Tokenizer {
        model: target.to_string(),
        source,
    })?;
    let bpe = Arc::new(bpe);

    Ok(Arc::new(move |segment: &str| {
        bpe.encode_ordinary(segment).len()
    }))
}

fn resolve_encoding(name: &str) -> Result<CoreBPE, TokenizerError> {
    match name {
        "cl100k_base" => cl100k_base(),
        "o200k_base" => o200k_base(),
        "p50k_base" => p50k_base(),
        "r50k_base" | "gpt2" => r50k_base(),
        model => get_bpe_from_model(model),
    }
}

/// Counts whitespace-separated words; non-empty text without words counts as one token.
pub(crate) fn whitespace_token_counter() -> TokenCounter {
    Arc::new(|segment: &str| {
        let tokens = segment.split_whitespace().count();
        if tokens == 0 && !segment.is_empty() {
            1
        } else {
            tokens
        }
    })
}

/// Split `text` into segments of at most `chunk_size` tokens. Blank input yields no segments.
pub(crate) fn split_text(
    text: &str,
    chunk_size: usize,
    counter: &TokenCounter,
) -> Result<Vec<String>, ChunkingError> {
    if chunk_size == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let counter_for_chunker = counter.clone();
    let chunker = Chunker::new(
        chunk_size,
        Box::new(move |segment: &str| counter_for_chunker.as_ref()(segment)),
    );
    Ok(chunker
        .chunk(text)
        .into_iter()
        .map(|segment| segment.trim().to_string())
        .filter(|segment| !segment.is_empty())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_text_respects_budget_with_whitespace_counter() {
        let counter = whitespace_token_counter();
        let chunks = split_text("one two three four five", 2, &counter).expect("split");
        assert_eq!(chunks, vec!["one two", "three four", "five"]);
    }

    #[test]
    fn split_text_handles_blank_input() {
        let counter = whitespace_token_counter();
        assert!(split_text("  \n ", 4, &counter).expect("split").is_empty());
    }

    #[test]
    fn split_text_rejects_zero_budget() {
        let counter = whitespace_token_counter();
        assert!(matches!(
            split_text("hello", 0, &counter),
            Err(ChunkingError::InvalidChunkSize)
        ));
    }

    #[test]
    fn tiktoken_budget_is_respected_and_words_preserved() {
        let counter = build_token_counter("cl100k_base");
        let text = "The quick brown fox jumps over the lazy dog.";
        let chunks = split_text(text, 5, &counter).expect("split");
        for chunk in &chunks {
            assert!(counter.as_ref()(chunk) <= 5);
        }
        let rejoined: Vec<&str> = chunks.iter().flat_map(|c| c.split_whitespace()).collect();
        let original: Vec<&str> = text.split_whitespace().collect();
        assert_eq!(rejoined, original);
    }

    #[test]
    fn unknown_encoding_falls_back_to_whitespace() {
        let counter = build_token_counter("definitely-not-a-model");
        assert_eq!(counter.as_ref()("alpha beta gamma"), 3);
    }
}
