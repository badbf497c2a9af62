// ============================================================================
// LocalIndex - Embedded vector index (redb)
// ============================================================================
// One `collections` table holds per-collection metadata; each collection's
// points live in their own `points:<name>` table. Recreate and delete touch
// both inside a single write transaction, so a crash or failure leaves the
// previous state intact. Search is a full scan.
// Default path: ~/.memctl/index.redb (override via MEMORY_INDEX_PATH)
// ============================================================================

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::{missing_collection, rank, Distance, Point, ScoredPoint, VectorIndex};
use crate::types::MemoryRecord;

const COLLECTIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("collections");

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CollectionMeta {
    dimension: usize,
    distance: Distance,
    created_at: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredPoint {
    vector: Vec<f32>,
    /// JSON text; bincode cannot round-trip `serde_json::Value`
    payload: String,
}

/// Summary row for `list_collections`
#[derive(Debug, Clone, Serialize)]
pub struct LocalCollectionInfo {
    pub name: String,
    pub dimension: usize,
    pub distance: Distance,
    pub points_count: u64,
    pub created_at: i64,
}

/// Embedded on-disk vector index
pub struct LocalIndex {
    db: Arc<Database>,
    path: PathBuf,
}

fn points_table_name(collection: &str) -> String {
    format!("points:{}", collection)
}

fn read_meta(db: &Database, name: &str) -> Result<Option<CollectionMeta>> {
    let read_txn = db
        .begin_read()
        .map_err(|e| anyhow!("Failed to begin read: {}", e))?;
    let table = read_txn
        .open_table(COLLECTIONS)
        .map_err(|e| anyhow!("Failed to open collections table: {}", e))?;

    match table
        .get(name)
        .map_err(|e| anyhow!("Failed to get collection: {}", e))?
    {
        Some(value) => {
            let meta: CollectionMeta = bincode::deserialize(value.value())
                .map_err(|e| anyhow!("Failed to deserialize collection meta: {}", e))?;
            Ok(Some(meta))
        }
        None => Ok(None),
    }
}

impl LocalIndex {
    /// Resolve `~/.memctl/index.redb`, creating the directory
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or_else(|| anyhow!("Cannot determine home directory"))?;
        let dir = home.join(".memctl");
        std::fs::create_dir_all(&dir)
            .map_err(|e| anyhow!("Failed to create .memctl directory: {}", e))?;
        Ok(dir.join("index.redb"))
    }

    /// Open (or create) the index file at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| anyhow!("Failed to create index directory: {}", e))?;
            }
        }

        info!("Opening local index at: {}", path.display());

        let db = Database::create(path).map_err(|e| anyhow!("Failed to open index: {}", e))?;

        let write_txn = db
            .begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        {
            let _ = write_txn
                .open_table(COLLECTIONS)
                .map_err(|e| anyhow!("Failed to create collections table: {}", e))?;
        }
        write_txn
            .commit()
            .map_err(|e| anyhow!("Failed to commit init: {}", e))?;

        Ok(Self {
            db: Arc::new(db),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run a redb closure off the async runtime
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| anyhow!("Local index task failed: {}", e))?
    }

    /// All collections with their point counts
    pub async fn list_collections(&self) -> Result<Vec<LocalCollectionInfo>> {
        self.blocking(|db| {
            let read_txn = db
                .begin_read()
                .map_err(|e| anyhow!("Failed to begin read: {}", e))?;
            let table = read_txn
                .open_table(COLLECTIONS)
                .map_err(|e| anyhow!("Failed to open collections table: {}", e))?;

            let mut results = Vec::new();
            let iter = table
                .range::<&str>(..)
                .map_err(|e| anyhow!("Failed to iterate collections: {}", e))?;
            for entry in iter {
                let (key, value) = entry.map_err(|e| anyhow!("Failed to read entry: {}", e))?;
                let name = key.value().to_string();
                let meta: CollectionMeta = bincode::deserialize(value.value())
                    .map_err(|e| anyhow!("Failed to deserialize collection meta: {}", e))?;

                let points_name = points_table_name(&name);
                let points_def: TableDefinition<&str, &[u8]> = TableDefinition::new(&points_name);
                let points = read_txn
                    .open_table(points_def)
                    .map_err(|e| anyhow!("Failed to open points table: {}", e))?;
                let points_count = points
                    .range::<&str>(..)
                    .map_err(|e| anyhow!("Failed to iterate points: {}", e))?
                    .count() as u64;

                results.push(LocalCollectionInfo {
                    name,
                    dimension: meta.dimension,
                    distance: meta.distance,
                    points_count,
                    created_at: meta.created_at,
                });
            }
            Ok(results)
        })
        .await
    }
}

#[async_trait]
impl VectorIndex for LocalIndex {
    fn backend_name(&self) -> &'static str {
        "local"
    }

    async fn recreate_collection(&self, name: &str, dimension: usize, distance: Distance) -> Result<()> {
        let name = name.to_string();
        self.blocking(move |db| {
            let meta = CollectionMeta {
                dimension,
                distance,
                created_at: chrono::Utc::now().timestamp(),
            };
            let value = bincode::serialize(&meta)
                .map_err(|e| anyhow!("Failed to serialize collection meta: {}", e))?;

            let points_name = points_table_name(&name);
            let points_def: TableDefinition<&str, &[u8]> = TableDefinition::new(&points_name);

            let write_txn = db
                .begin_write()
                .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
            {
                write_txn
                    .delete_table(points_def)
                    .map_err(|e| anyhow!("Failed to drop points table: {}", e))?;
                let _ = write_txn
                    .open_table(points_def)
                    .map_err(|e| anyhow!("Failed to create points table: {}", e))?;
                let mut table = write_txn
                    .open_table(COLLECTIONS)
                    .map_err(|e| anyhow!("Failed to open collections table: {}", e))?;
                table
                    .insert(name.as_str(), value.as_slice())
                    .map_err(|e| anyhow!("Failed to insert collection meta: {}", e))?;
            }
            write_txn
                .commit()
                .map_err(|e| anyhow!("Failed to commit: {}", e))?;

            debug!("Recreated local collection: {}", name);
            Ok(())
        })
        .await
    }

    async fn upsert(&self, collection: &str, points: Vec<Point>) -> Result<usize> {
        let collection = collection.to_string();
        self.blocking(move |db| {
            // Meta lookup and insert share one write txn so a concurrent
            // delete cannot leave a points table behind
            let write_txn = db
                .begin_write()
                .map_err(|e| anyhow!("Failed to begin write: {}", e))?;

            let meta: CollectionMeta = {
                let collections = write_txn
                    .open_table(COLLECTIONS)
                    .map_err(|e| anyhow!("Failed to open collections table: {}", e))?;
                let value = collections
                    .get(collection.as_str())
                    .map_err(|e| anyhow!("Failed to get collection: {}", e))?
                    .ok_or_else(|| missing_collection(&collection))?;
                bincode::deserialize(value.value())
                    .map_err(|e| anyhow!("Failed to deserialize collection meta: {}", e))?
            };

            let points_name = points_table_name(&collection);
            let points_def: TableDefinition<&str, &[u8]> = TableDefinition::new(&points_name);
            {
                let mut table = write_txn
                    .open_table(points_def)
                    .map_err(|e| anyhow!("Failed to open points table: {}", e))?;
                for point in &points {
                    if point.vector.len() != meta.dimension {
                        return Err(anyhow!(
                            "Point {} has {} dimensions, collection '{}' expects {}",
                            point.id,
                            point.vector.len(),
                            collection,
                            meta.dimension
                        ));
                    }
                    let stored = StoredPoint {
                        vector: point.vector.clone(),
                        payload: serde_json::to_string(&point.payload)?,
                    };
                    let value = bincode::serialize(&stored)
                        .map_err(|e| anyhow!("Failed to serialize point: {}", e))?;
                    table
                        .insert(point.id.to_string().as_str(), value.as_slice())
                        .map_err(|e| anyhow!("Failed to insert point: {}", e))?;
                }
            }
            write_txn
                .commit()
                .map_err(|e| anyhow!("Failed to commit: {}", e))?;

            Ok(points.len())
        })
        .await
    }

    async fn search(&self, collection: &str, vector: &[f32], limit: usize) -> Result<Vec<ScoredPoint>> {
        let collection = collection.to_string();
        let query = vector.to_vec();
        self.blocking(move |db| {
            let meta = read_meta(db, &collection)?.ok_or_else(|| missing_collection(&collection))?;

            let points_name = points_table_name(&collection);
            let points_def: TableDefinition<&str, &[u8]> = TableDefinition::new(&points_name);

            let read_txn = db
                .begin_read()
                .map_err(|e| anyhow!("Failed to begin read: {}", e))?;
            let table = read_txn
                .open_table(points_def)
                .map_err(|e| anyhow!("Failed to open points table: {}", e))?;

            let mut hits = Vec::new();
            let iter = table
                .range::<&str>(..)
                .map_err(|e| anyhow!("Failed to iterate points: {}", e))?;
            for entry in iter {
                let (key, value) = entry.map_err(|e| anyhow!("Failed to read entry: {}", e))?;
                let id = Uuid::parse_str(key.value())
                    .map_err(|e| anyhow!("Corrupt point id '{}': {}", key.value(), e))?;
                let stored: StoredPoint = bincode::deserialize(value.value())
                    .map_err(|e| anyhow!("Failed to deserialize point: {}", e))?;
                let payload: MemoryRecord = serde_json::from_str(&stored.payload)
                    .map_err(|e| anyhow!("Failed to parse point payload: {}", e))?;

                hits.push(ScoredPoint {
                    id,
                    score: meta.distance.score(&query, &stored.vector),
                    payload,
                });
            }

            Ok(rank(hits, limit))
        })
        .await
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let name = name.to_string();
        self.blocking(move |db| {
            let points_name = points_table_name(&name);
            let points_def: TableDefinition<&str, &[u8]> = TableDefinition::new(&points_name);

            let write_txn = db
                .begin_write()
                .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
            let removed;
            {
                let mut table = write_txn
                    .open_table(COLLECTIONS)
                    .map_err(|e| anyhow!("Failed to open collections table: {}", e))?;
                removed = table
                    .remove(name.as_str())
                    .map_err(|e| anyhow!("Failed to remove collection meta: {}", e))?
                    .is_some();
            }
            if !removed {
                // Dropping the transaction aborts it
                return Err(missing_collection(&name));
            }
            write_txn
                .delete_table(points_def)
                .map_err(|e| anyhow!("Failed to drop points table: {}", e))?;
            write_txn
                .commit()
                .map_err(|e| anyhow!("Failed to commit delete: {}", e))?;

            debug!("Deleted local collection: {}", name);
            Ok(())
        })
        .await
    }

    async fn count(&self, collection: &str) -> Result<u64> {
        let collection = collection.to_string();
        self.blocking(move |db| {
            read_meta(db, &collection)?.ok_or_else(|| missing_collection(&collection))?;

            let points_name = points_table_name(&collection);
            let points_def: TableDefinition<&str, &[u8]> = TableDefinition::new(&points_name);
            let read_txn = db
                .begin_read()
                .map_err(|e| anyhow!("Failed to begin read: {}", e))?;
            let table = read_txn
                .open_table(points_def)
                .map_err(|e| anyhow!("Failed to open points table: {}", e))?;
            let count = table
                .range::<&str>(..)
                .map_err(|e| anyhow!("Failed to iterate points: {}", e))?
                .count();
            Ok(count as u64)
        })
        .await
    }
}
