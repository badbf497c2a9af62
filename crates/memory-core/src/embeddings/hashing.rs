//! Offline embedder that hashes lowercase alphanumeric tokens into a fixed
//! number of signed buckets and L2-normalises the result. Texts sharing words
//! land close together under cosine distance, which is all dedup and recall
//! need when no model server is available.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::Embedder;

pub struct HashingEmbedder {
    model: String,
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(model: &str, dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(anyhow!("Embedding dimension must be positive"));
        }
        Ok(Self {
            model: model.to_string(),
            dimension,
        })
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        for token in tokens(text) {
            let mut hasher = Sha256::new();
            hasher.update(self.model.as_bytes());
            hasher.update([0u8]);
            hasher.update(token.as_bytes());
            let digest = hasher.finalize();

            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimension as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };

            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in vector.iter_mut() {
                *x /= norm;
            }
        }
        vector
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn test_zero_dimension_rejected() {
        assert!(HashingEmbedder::new("m", 0).is_err());
    }

    #[test]
    fn test_deterministic_and_normalised() {
        let embedder = HashingEmbedder::new("model-a", 64).unwrap();
        let a = embedder.embed_sync("Buy milk, then eggs");
        let b = embedder.embed_sync("buy MILK then eggs");

        assert_eq!(a, b);
        assert!((cosine(&a, &a) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_model_changes_vector() {
        let a = HashingEmbedder::new("model-a", 64).unwrap().embed_sync("milk");
        let b = HashingEmbedder::new("model-b", 64).unwrap().embed_sync("milk");
        assert_ne!(a, b);
    }

    #[test]
    fn test_shared_words_are_closer() {
        let embedder = HashingEmbedder::new("model-a", 256).unwrap();
        let base = embedder.embed_sync("buy milk at the store");
        let near = embedder.embed_sync("buy milk");
        let far = embedder.embed_sync("quarterly revenue forecast");

        assert!(cosine(&base, &near) > cosine(&base, &far));
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let embedder = HashingEmbedder::new("model-a", 8).unwrap();
        assert_eq!(embedder.embed_sync("  ,, "), vec![0.0; 8]);
    }
}
