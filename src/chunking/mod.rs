//! Default chunk collaborator for markdown documents.
//!
//! Each markdown table becomes one `table` chunk of flattened rows, the remaining prose is split
//! into token-bounded `text` chunks, and the analysis executive summary (when present) becomes a
//! `summary` chunk. Chunks with identical content are emitted once.

mod tables;
mod tokens;

use anyhow::Error as TokenizerError;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use thiserror::Error;

use crate::workflow::{AnalysisRecord, ChunkKind, Chunker, TextChunk};
use tokens::TokenCounter;

/// Default token budget of a text chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 400;

/// Errors produced while turning a document into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Configured an impossible token budget.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Tokenizer resources were unavailable for the configured encoding.
    #[error("failed to initialize tokenizer '{model}': {source}")]
    Tokenizer {
        /// Encoding or model we attempted to load.
        model: String,
        /// Underlying error raised by the tokenizer library.
        #[source]
        source: TokenizerError,
    },
    /// The document produced no chunks.
    #[error("no chunks were produced")]
    NoChunks,
}

/// Compute a deterministic SHA-256 hash for chunk text.
pub fn compute_chunk_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Table-aware, token-bounded markdown chunker.
pub struct MarkdownChunker {
    chunk_size: usize,
    counter: TokenCounter,
}

impl MarkdownChunker {
    /// Chunker with a `chunk_size` token budget counted under `encoding`
    /// (e.g. `cl100k_base`, or a model name).
    pub fn new(chunk_size: usize, encoding: &str) -> Result<Self, ChunkingError> {
        if chunk_size == 0 {
            return Err(ChunkingError::InvalidChunkSize);
        }
        Ok(Self {
            chunk_size,
            counter: tokens::build_token_counter(encoding),
        })
    }

    /// Chunker that counts whitespace-separated words.
    pub fn with_whitespace_tokens(chunk_size: usize) -> Result<Self, ChunkingError> {
        if chunk_size == 0 {
            return Err(ChunkingError::InvalidChunkSize);
        }
        Ok(Self {
            chunk_size,
            counter: tokens::whitespace_token_counter(),
        })
    }

    /// Chunk `markdown`, appending the summary of `analysis` when it has one.
    pub fn chunk_markdown(
        &self,
        analysis: &AnalysisRecord,
        markdown: &str,
    ) -> Result<Vec<TextChunk>, ChunkingError> {
        let (flat_tables, prose) = tables::extract_tables(markdown);
        let mut candidates = Vec::new();

        for table in flat_tables {
            tracing::debug!(table = table.index, rows = table.row_count, "Flattened table");
            candidates.push((format!("table_{}", table.index), ChunkKind::Table, table.text));
        }

        for (index, segment) in tokens::split_text(&prose, self.chunk_size, &self.counter)?
            .into_iter()
            .enumerate()
        {
            candidates.push((format!("text_{index}"), ChunkKind::Text, segment));
        }

        if let Some(summary) = analysis
            .executive_summary
            .as_deref()
            .map(str::trim)
            .filter(|summary| !summary.is_empty())
        {
            candidates.push(("summary".to_string(), ChunkKind::Summary, summary.to_string()));
        }

        let mut seen = HashSet::new();
        let mut chunks = Vec::with_capacity(candidates.len());
        for (chunk_id, kind, content) in candidates {
            let chunk_hash = compute_chunk_hash(&content);
            if !seen.insert(chunk_hash.clone()) {
                tracing::debug!(chunk_id = %chunk_id, "Skipping duplicate chunk");
                continue;
            }
            chunks.push(TextChunk {
                token_count: self.counter.as_ref()(&content),
                char_count: content.chars().count(),
                chunk_id,
                kind,
                content,
                chunk_hash,
            });
        }

        if chunks.is_empty() {
            return Err(ChunkingError::NoChunks);
        }
        tracing::info!(
            chunks = chunks.len(),
            tokens = chunks.iter().map(|chunk| chunk.token_count).sum::<usize>(),
            "Chunking complete"
        );
        Ok(chunks)
    }
}

#[async_trait]
impl Chunker for MarkdownChunker {
    async fn chunk(
        &self,
        analysis: &AnalysisRecord,
        context: &str,
    ) -> Result<Vec<TextChunk>, ChunkingError> {
        self.chunk_markdown(analysis, context)
    }
}
