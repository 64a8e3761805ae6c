//! Dense embedding clients and the sparse term-frequency encoder.

mod ollama;
pub mod sparse;

use crate::config::{Config, EmbeddingProvider};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

pub use ollama::OllamaEmbeddingClient;
pub use sparse::{SparseEncoder, SparseVector};

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
    /// Provider could not be reached.
    #[error("Embedding provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned vectors of the wrong size or count.
    #[error("Embedding shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch {
        /// Expected dimension or count.
        expected: usize,
        /// Dimension or count actually returned.
        actual: usize,
    },
}

/// Interface implemented by dense embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce an embedding vector for each supplied chunk of text, in order.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;

    /// Dimension of every vector this client returns.
    fn dimension(&self) -> usize;
}

/// Deterministic in-process encoder that hashes bytes into vector slots.
///
/// Similar strings land close together, which is enough for offline runs and tests.
pub struct LocalHashEmbedder {
    dimension: usize,
}

impl LocalHashEmbedder {
    /// Encoder producing `dimension`-sized unit vectors.
    pub const fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    /// Encode a single text.
    pub fn encode(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; self.dimension];
        if text.is_empty() || self.dimension == 0 {
            return embedding;
        }

        for (idx, byte) in text.to_lowercase().bytes().enumerate() {
            embedding[idx % self.dimension] += f32::from(byte) / 255.0;
        }

        let norm = embedding
            .iter()
            .map(|value| value * value)
            .sum::<f32>()
            .sqrt();
        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }
        embedding
    }
}

#[async_trait]
impl EmbeddingClient for LocalHashEmbedder {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if self.dimension == 0 {
            return Err(EmbeddingClientError::GenerationFailed(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }
        if texts.is_empty() {
            return Err(EmbeddingClientError::GenerationFailed(
                "no texts provided".to_string(),
            ));
        }
        tracing::debug!(count = texts.len(), dimension = self.dimension, "Hashing embeddings");
        Ok(texts.iter().map(|text| self.encode(text)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Build the dense embedding client selected by `config`.
pub fn build_embedding_client(
    config: &Config,
) -> Result<Arc<dyn EmbeddingClient>, EmbeddingClientError> {
    tracing::info!(
        provider = ?config.embedding_provider,
        model = %config.embedding_model,
        dimension = config.embedding_dimension,
        "Initializing embedding client"
    );
    match config.embedding_provider {
        EmbeddingProvider::Ollama => Ok(Arc::new(OllamaEmbeddingClient::new(
            &config.ollama_url,
            &config.embedding_model,
            config.embedding_dimension,
        )?)),
        EmbeddingProvider::Local => {
            Ok(Arc::new(LocalHashEmbedder::new(config.embedding_dimension)))
        }
    }
}
