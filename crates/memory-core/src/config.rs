//! ============================================================================
//! Memory Configuration
//! ============================================================================
//! Defaults mirror the long-standing behaviour of the service. `from_env`
//! layers environment overrides on top (call `dotenvy::dotenv()` first if a
//! `.env` file should be honoured).
//! ============================================================================

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

/// Records kept by `trim` when no explicit limit is given
pub const DEFAULT_SHORT_TERM_LIMIT: usize = 20;

/// Neighbours returned by a long-term search when no limit is given
pub const DEFAULT_SEARCH_LIMIT: usize = 5;

/// Embedding model bound when a caller omits one
pub const DEFAULT_EMBEDDING_MODEL: &str = "all-MiniLM-L6-v2";

/// Output length of `DEFAULT_EMBEDDING_MODEL`
pub const DEFAULT_EMBEDDING_DIM: usize = 384;

/// Which embedder implementation `bind_embedder` builds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum EmbeddingBackend {
    /// OpenAI-compatible `/embeddings` endpoint
    OpenAi {
        base_url: String,
        api_key: Option<String>,
    },
    /// Deterministic token hashing, no network
    #[default]
    Hashing,
}

/// Configuration for the session registry and its collaborators
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Limit used by `trim_short_default`
    pub short_term_limit: usize,
    /// Limit used when a search omits one
    pub search_limit: usize,
    /// Minimum similarity for a neighbour to count as a duplicate.
    ///
    /// `None` means any neighbour suppresses the insert. That matches the
    /// historical behaviour but is pending product confirmation: once a
    /// collection holds a point, a nearest-neighbour index returns it for
    /// every query, so every later insert is suppressed.
    pub dedup_threshold: Option<f32>,
    pub default_embedding_model: String,
    pub default_embedding_dim: usize,
    pub embedding: EmbeddingBackend,
    /// API key sent to Qdrant when binding a `qdrant` index without one
    pub qdrant_api_key: Option<String>,
    pub searxng_url: Option<String>,
    /// On-disk index location; `None` resolves to `~/.memctl/index.redb`
    pub index_path: Option<PathBuf>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            short_term_limit: DEFAULT_SHORT_TERM_LIMIT,
            search_limit: DEFAULT_SEARCH_LIMIT,
            dedup_threshold: None,
            default_embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            default_embedding_dim: DEFAULT_EMBEDDING_DIM,
            embedding: EmbeddingBackend::default(),
            qdrant_api_key: None,
            searxng_url: None,
            index_path: None,
        }
    }
}

impl MemoryConfig {
    /// Build a config from defaults plus environment overrides
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(limit) = parse_var(&lookup, "MEMORY_SHORT_TERM_LIMIT") {
            config.short_term_limit = limit;
        }
        if let Some(limit) = parse_var(&lookup, "MEMORY_SEARCH_LIMIT") {
            config.search_limit = limit;
        }
        config.dedup_threshold = parse_var(&lookup, "MEMORY_DEDUP_THRESHOLD");

        let api_key = non_empty(lookup("EMBEDDING_API_KEY"))
            .or_else(|| non_empty(lookup("OPENAI_API_KEY")));
        let backend = lookup("EMBEDDING_BACKEND").map(|b| b.to_lowercase());
        config.embedding = match backend.as_deref() {
            Some("hashing") => EmbeddingBackend::Hashing,
            Some("openai") => EmbeddingBackend::OpenAi {
                base_url: lookup("EMBEDDING_BASE_URL")
                    .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
                api_key,
            },
            Some(other) => {
                warn!("Unknown EMBEDDING_BACKEND '{}', using hashing embedder", other);
                EmbeddingBackend::Hashing
            }
            // An API key alone is enough to opt into the remote embedder
            None if api_key.is_some() => EmbeddingBackend::OpenAi {
                base_url: lookup("EMBEDDING_BASE_URL")
                    .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
                api_key,
            },
            None => EmbeddingBackend::Hashing,
        };

        config.qdrant_api_key = non_empty(lookup("QDRANT_API_KEY"));
        config.searxng_url = non_empty(lookup("SEARXNG_URL"));
        config.index_path = non_empty(lookup("MEMORY_INDEX_PATH")).map(PathBuf::from);

        config
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_var<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = non_empty(lookup(key))?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring {}: cannot parse '{}'", key, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = MemoryConfig::default();
        assert_eq!(config.short_term_limit, 20);
        assert_eq!(config.search_limit, 5);
        assert_eq!(config.dedup_threshold, None);
        assert_eq!(config.default_embedding_model, "all-MiniLM-L6-v2");
        assert_eq!(config.default_embedding_dim, 384);
        assert_eq!(config.embedding, EmbeddingBackend::Hashing);
        assert_eq!(EmbeddingBackend::default(), EmbeddingBackend::Hashing);
    }

    #[test]
    fn test_env_overrides() {
        let config = MemoryConfig::from_lookup(lookup_from(&[
            ("MEMORY_SHORT_TERM_LIMIT", "50"),
            ("MEMORY_DEDUP_THRESHOLD", "0.92"),
            ("SEARXNG_URL", "http://localhost:8080/search"),
            ("MEMORY_INDEX_PATH", "/tmp/index.redb"),
        ]));

        assert_eq!(config.short_term_limit, 50);
        assert_eq!(config.dedup_threshold, Some(0.92));
        assert_eq!(config.searxng_url.as_deref(), Some("http://localhost:8080/search"));
        assert_eq!(config.index_path, Some(PathBuf::from("/tmp/index.redb")));
    }

    #[test]
    fn test_api_key_selects_openai() {
        let config = MemoryConfig::from_lookup(lookup_from(&[("OPENAI_API_KEY", "sk-test")]));
        assert_eq!(
            config.embedding,
            EmbeddingBackend::OpenAi {
                base_url: "https://api.openai.com/v1".to_string(),
                api_key: Some("sk-test".to_string()),
            }
        );
    }

    #[test]
    fn test_explicit_hashing_wins_over_key() {
        let config = MemoryConfig::from_lookup(lookup_from(&[
            ("EMBEDDING_BACKEND", "hashing"),
            ("EMBEDDING_API_KEY", "sk-test"),
        ]));
        assert_eq!(config.embedding, EmbeddingBackend::Hashing);
    }

    #[test]
    fn test_bad_values_ignored() {
        let config = MemoryConfig::from_lookup(lookup_from(&[
            ("MEMORY_SHORT_TERM_LIMIT", "lots"),
            ("MEMORY_DEDUP_THRESHOLD", ""),
        ]));
        assert_eq!(config.short_term_limit, DEFAULT_SHORT_TERM_LIMIT);
        assert_eq!(config.dedup_threshold, None);
    }
}
