//! ============================================================================
//! Vector Index - Storage collaborators for long-term memory
//! ============================================================================
//! `VectorIndex` is the seam long-term memory stores points through.
//!
//! ## Backends
//! - `QdrantIndex`: remote Qdrant server (gRPC)
//! - `LocalIndex`: embedded redb file, brute-force scan
//! - `InMemoryIndex`: process memory, lost on exit
//!
//! ## Contract
//! - `recreate_collection` drops any existing collection of that name and
//!   creates it empty. Backends should make this a single atomic step where
//!   the storage allows it.
//! - `search` returns at most `limit` hits ordered by decreasing score.
//! - Every call on a collection that does not exist is an error.
//! ============================================================================

mod local;
mod memory;
mod qdrant;

pub use local::{LocalCollectionInfo, LocalIndex};
pub use memory::InMemoryIndex;
pub use qdrant::QdrantIndex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::MemoryConfig;
use crate::types::MemoryRecord;

/// Default Qdrant gRPC endpoint
pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";

/// Similarity metric of a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Distance {
    #[default]
    Cosine,
    Dot,
    Euclid,
}

impl Distance {
    /// Score where higher means closer. Euclidean distance is negated.
    pub fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Distance::Cosine => cosine_similarity(a, b),
            Distance::Dot => a.iter().zip(b).map(|(x, y)| x * y).sum(),
            Distance::Euclid => -a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt(),
        }
    }
}

/// Cosine similarity; zero when either vector has no magnitude
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// A point to upsert
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: MemoryRecord,
}

/// A search hit
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPoint {
    pub id: Uuid,
    pub score: f32,
    pub payload: MemoryRecord,
}

/// Sort hits closest first and keep `limit`
pub(crate) fn rank(mut hits: Vec<ScoredPoint>, limit: usize) -> Vec<ScoredPoint> {
    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    hits.truncate(limit);
    hits
}

/// Named collections of `{id, vector, payload}`
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Short backend name for logs
    fn backend_name(&self) -> &'static str;

    /// Drop `name` if present and create it empty
    async fn recreate_collection(&self, name: &str, dimension: usize, distance: Distance) -> Result<()>;

    /// Insert or replace points by id. Returns the number written.
    async fn upsert(&self, collection: &str, points: Vec<Point>) -> Result<usize>;

    /// Nearest neighbours of `vector`, closest first
    async fn search(&self, collection: &str, vector: &[f32], limit: usize) -> Result<Vec<ScoredPoint>>;

    /// Remove a collection and all of its points
    async fn delete_collection(&self, name: &str) -> Result<()>;

    /// Number of points in a collection
    async fn count(&self, collection: &str) -> Result<u64>;

    /// Whether the backend is reachable
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

/// Parameters accepted by `bind_index`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IndexConnection {
    Qdrant {
        #[serde(default = "default_qdrant_url")]
        url: String,
        #[serde(default)]
        api_key: Option<String>,
    },
    Local {
        #[serde(default)]
        path: Option<PathBuf>,
    },
    InMemory,
}

fn default_qdrant_url() -> String {
    DEFAULT_QDRANT_URL.to_string()
}

impl Default for IndexConnection {
    fn default() -> Self {
        IndexConnection::Qdrant {
            url: default_qdrant_url(),
            api_key: None,
        }
    }
}

/// Opens vector indexes for `bind_index`
#[async_trait]
pub trait IndexConnector: Send + Sync {
    async fn connect(&self, connection: &IndexConnection) -> Result<Arc<dyn VectorIndex>>;
}

/// Connector used by the registry unless one is injected.
///
/// In-memory and local indexes are shared per process (and per path), so
/// sessions binding the same parameters see the same collections, as they
/// would against one Qdrant server.
pub struct DefaultConnector {
    qdrant_api_key: Option<String>,
    default_local_path: Option<PathBuf>,
    in_memory: Arc<InMemoryIndex>,
    local: Mutex<HashMap<PathBuf, Arc<LocalIndex>>>,
}

impl DefaultConnector {
    pub fn from_config(config: &MemoryConfig) -> Self {
        Self {
            qdrant_api_key: config.qdrant_api_key.clone(),
            default_local_path: config.index_path.clone(),
            in_memory: Arc::new(InMemoryIndex::new()),
            local: Mutex::new(HashMap::new()),
        }
    }

    async fn open_local(&self, path: Option<&PathBuf>) -> Result<Arc<LocalIndex>> {
        let path = match path.or(self.default_local_path.as_ref()) {
            Some(p) => p.clone(),
            None => LocalIndex::default_path()?,
        };

        let mut opened = self.local.lock().await;
        if let Some(index) = opened.get(&path) {
            return Ok(Arc::clone(index));
        }

        let index = Arc::new(LocalIndex::open(&path)?);
        opened.insert(path, Arc::clone(&index));
        Ok(index)
    }
}

#[async_trait]
impl IndexConnector for DefaultConnector {
    async fn connect(&self, connection: &IndexConnection) -> Result<Arc<dyn VectorIndex>> {
        match connection {
            IndexConnection::Qdrant { url, api_key } => {
                let key = api_key.clone().or_else(|| self.qdrant_api_key.clone());
                info!("Connecting to Qdrant at {}", url);
                Ok(Arc::new(QdrantIndex::new(url, key)?))
            }
            IndexConnection::Local { path } => {
                let index: Arc<dyn VectorIndex> = self.open_local(path.as_ref()).await?;
                Ok(index)
            }
            IndexConnection::InMemory => {
                debug!("Using shared in-memory index");
                let index: Arc<dyn VectorIndex> = self.in_memory.clone();
                Ok(index)
            }
        }
    }
}

pub(crate) fn missing_collection(name: &str) -> anyhow::Error {
    anyhow!("Collection '{}' not found", name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 0.001);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 0.001);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 0.001);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_euclid_score_prefers_closer() {
        let d = Distance::Euclid;
        assert!(d.score(&[0.0, 0.0], &[1.0, 0.0]) > d.score(&[0.0, 0.0], &[3.0, 0.0]));
    }

    #[test]
    fn test_connection_deserialization() {
        let conn: IndexConnection = serde_json::from_str(r#"{"kind": "qdrant"}"#).unwrap();
        assert_eq!(conn, IndexConnection::default());

        let conn: IndexConnection =
            serde_json::from_str(r#"{"kind": "local", "path": "/tmp/x.redb"}"#).unwrap();
        assert_eq!(
            conn,
            IndexConnection::Local {
                path: Some(PathBuf::from("/tmp/x.redb"))
            }
        );

        let conn: IndexConnection = serde_json::from_str(r#"{"kind": "in_memory"}"#).unwrap();
        assert_eq!(conn, IndexConnection::InMemory);
    }

    #[tokio::test]
    async fn test_connector_shares_in_memory_index() {
        let connector = DefaultConnector::from_config(&MemoryConfig::default());
        let a = connector.connect(&IndexConnection::InMemory).await.unwrap();
        let b = connector.connect(&IndexConnection::InMemory).await.unwrap();

        a.recreate_collection("shared", 2, Distance::Cosine).await.unwrap();
        assert_eq!(b.count("shared").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_connector_reuses_local_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.redb");
        let connector = DefaultConnector::from_config(&MemoryConfig::default());
        let conn = IndexConnection::Local {
            path: Some(path.clone()),
        };

        // A second open of the same redb file would fail, so this proves reuse
        let a = connector.connect(&conn).await.unwrap();
        let b = connector.connect(&conn).await.unwrap();
        a.recreate_collection("notes", 2, Distance::Cosine).await.unwrap();
        assert_eq!(b.count("notes").await.unwrap(), 0);
    }
}
