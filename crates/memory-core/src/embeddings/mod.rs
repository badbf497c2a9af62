//! ============================================================================
//! Embeddings - Text to vector collaborators
//! ============================================================================
//! `Embedder` is the seam long-term memory calls through. Two backends ship:
//! - `EmbeddingService`: OpenAI-compatible `/embeddings` HTTP API
//! - `HashingEmbedder`: deterministic token hashing, no network
//!
//! `EmbedderProvider` turns a `(model, dimension)` binding into an embedder.
//! ============================================================================

mod hashing;
mod openai;

pub use hashing::HashingEmbedder;
pub use openai::EmbeddingService;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::config::{EmbeddingBackend, MemoryConfig};

/// Computes fixed-length vectors from text
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single text. Must be deterministic for a given model and text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Model identifier this embedder was bound with
    fn model(&self) -> &str;

    /// Declared output length
    fn dimension(&self) -> usize;
}

/// Builds embedders for `bind_embedder`
#[async_trait]
pub trait EmbedderProvider: Send + Sync {
    async fn build(&self, model: &str, dimension: usize) -> Result<Arc<dyn Embedder>>;
}

/// Provider driven by `MemoryConfig::embedding`
pub struct DefaultEmbedders {
    backend: EmbeddingBackend,
}

impl DefaultEmbedders {
    pub fn new(backend: EmbeddingBackend) -> Self {
        Self { backend }
    }

    pub fn from_config(config: &MemoryConfig) -> Self {
        Self::new(config.embedding.clone())
    }
}

#[async_trait]
impl EmbedderProvider for DefaultEmbedders {
    async fn build(&self, model: &str, dimension: usize) -> Result<Arc<dyn Embedder>> {
        match &self.backend {
            EmbeddingBackend::OpenAi { base_url, api_key } => {
                debug!("Building HTTP embedder {} at {}", model, base_url);
                Ok(Arc::new(EmbeddingService::new(
                    api_key.clone(),
                    base_url.clone(),
                    model.to_string(),
                    dimension,
                )))
            }
            EmbeddingBackend::Hashing => {
                debug!("Building hashing embedder {} ({} dims)", model, dimension);
                Ok(Arc::new(HashingEmbedder::new(model, dimension)?))
            }
        }
    }
}
