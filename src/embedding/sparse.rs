//! Term-frequency sparse vectors for keyword retrieval.
//!
//! Terms are hashed to `u32` indices so the index needs no vocabulary. Inverse document
//! frequency is applied by Qdrant (`modifier: idf`), so the encoder only counts terms.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "has", "have", "in",
    "is", "it", "its", "of", "on", "or", "that", "the", "their", "this", "to", "was", "were",
    "which", "with",
];

/// Sparse vector in Qdrant's wire shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SparseVector {
    /// Hashed term indices, ascending.
    pub indices: Vec<u32>,
    /// Term frequencies aligned with `indices`.
    pub values: Vec<f32>,
}

impl SparseVector {
    /// Whether no term survived tokenization.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Stateless term-frequency encoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct SparseEncoder;

impl SparseEncoder {
    /// Encode `text` into hashed term frequencies.
    pub fn encode(&self, text: &str) -> SparseVector {
        let mut counts: BTreeMap<u32, f32> = BTreeMap::new();
        for term in tokenize(text) {
            *counts.entry(term_index(&term)).or_insert(0.0) += 1.0;
        }
        let (indices, values) = counts.into_iter().unzip();
        SparseVector { indices, values }
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|term| term.chars().count() >= 2)
        .map(str::to_lowercase)
        .filter(|term| !STOPWORDS.contains(&term.as_str()))
}

fn term_index(term: &str) -> u32 {
    let digest = Sha256::digest(term.as_bytes());
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}
