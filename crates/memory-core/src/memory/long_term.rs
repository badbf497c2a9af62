//! ============================================================================
//! Long-Term Memory - Deduplicated semantic store per session
//! ============================================================================
//! Insert protocol, per collection:
//! 1. embed the record's JSON text and check its length
//! 2. under the collection's insert lock, look up the single nearest point
//! 3. none (or one below the dedup threshold) → upsert under a fresh UUID
//! 4. otherwise report `DuplicateSuppressed`
//!
//! Reset and delete of one name are serialized by a per-name lifecycle lock
//! and run in a spawned task, so a dropped caller cannot leave the collection
//! half-changed. The current handle stays visible while the index call runs;
//! its insert lock is held throughout, and it is swapped (reset) or removed
//! (delete) only after the index call succeeds. Inserts parked on the old
//! handle then resolve again.
//!
//! Collections are private to the session: the index sees them as
//! `s<len>_<session>_<name>`, so sessions sharing one index never touch each
//! other's points.
//! ============================================================================

use anyhow::anyhow;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::embeddings::Embedder;
use crate::index::{Distance, Point, VectorIndex};
use crate::types::{
    Binding, CollectionStats, InsertOutcome, MemoryError, MemoryRecord, Result, ScoredRecord,
};

/// A collection this session created
struct CollectionHandle {
    dimension: usize,
    /// Held across dedup search + upsert. `true` once the handle was retired
    /// by a reset or delete.
    insert_lock: Mutex<bool>,
}

impl CollectionHandle {
    fn new(dimension: usize) -> Self {
        Self {
            dimension,
            insert_lock: Mutex::new(false),
        }
    }
}

enum Lifecycle {
    Reset { dimension: usize },
    Delete,
}

type CollectionMap = Arc<RwLock<HashMap<String, Arc<CollectionHandle>>>>;
type LifecycleLocks = Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>;

/// Index-side name of a session's collection. The length prefix keeps
/// `("a_b", "c")` and `("a", "b_c")` apart.
pub(crate) fn physical_name(session: &str, collection: &str) -> String {
    format!("s{}_{}_{}", session.len(), session, collection)
}

/// Long-term memory of one session
pub struct LongTermMemory {
    session: String,
    dedup_threshold: Option<f32>,
    index: RwLock<Option<Arc<dyn VectorIndex>>>,
    embedder: RwLock<Option<Arc<dyn Embedder>>>,
    collections: CollectionMap,
    lifecycle: LifecycleLocks,
}

impl LongTermMemory {
    pub fn new(session: &str, dedup_threshold: Option<f32>) -> Self {
        Self {
            session: session.to_string(),
            dedup_threshold,
            index: RwLock::new(None),
            embedder: RwLock::new(None),
            collections: Arc::new(RwLock::new(HashMap::new())),
            lifecycle: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    fn physical(&self, collection: &str) -> String {
        physical_name(&self.session, collection)
    }

    /// Attach a vector index, replacing any previous one
    pub async fn set_index(&self, index: Arc<dyn VectorIndex>) {
        info!(
            "Session {} bound to {} index",
            self.session,
            index.backend_name()
        );
        *self.index.write().await = Some(index);
    }

    /// Attach an embedder, replacing any previous one
    pub async fn set_embedder(&self, embedder: Arc<dyn Embedder>) {
        info!(
            "Session {} bound to embedder {} ({} dims)",
            self.session,
            embedder.model(),
            embedder.dimension()
        );
        *self.embedder.write().await = Some(embedder);
    }

    async fn index(&self) -> Result<Arc<dyn VectorIndex>> {
        self.index.read().await.clone().ok_or_else(|| MemoryError::NotBound {
            session: self.session.clone(),
            binding: Binding::Index,
        })
    }

    async fn embedder(&self) -> Result<Arc<dyn Embedder>> {
        self.embedder.read().await.clone().ok_or_else(|| MemoryError::NotBound {
            session: self.session.clone(),
            binding: Binding::Embedder,
        })
    }

    async fn collection(&self, name: &str) -> Result<Arc<CollectionHandle>> {
        self.collections
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| MemoryError::CollectionNotFound(name.to_string()))
    }

    fn check_dimension(collection: &str, handle: &CollectionHandle, vector: &[f32]) -> Result<()> {
        if vector.len() != handle.dimension {
            return Err(MemoryError::DimensionMismatch {
                collection: collection.to_string(),
                expected: handle.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    /// Names of the collections this session has created, sorted
    pub async fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Drop and recreate `name`, empty, sized for the bound embedder
    pub async fn reset_collection(&self, name: &str) -> Result<()> {
        let index = self.index().await?;
        let dimension = self.embedder().await?.dimension();

        info!(
            "Resetting collection {} for session {} ({} dims)",
            name, self.session, dimension
        );
        self.run_lifecycle(index, name, Lifecycle::Reset { dimension })
            .await
    }

    /// Remove `name` and all of its points
    pub async fn delete_collection(&self, name: &str) -> Result<()> {
        let index = self.index().await?;
        self.collection(name).await?;

        info!("Deleting collection {} for session {}", name, self.session);
        self.run_lifecycle(index, name, Lifecycle::Delete).await
    }

    async fn run_lifecycle(
        &self,
        index: Arc<dyn VectorIndex>,
        name: &str,
        op: Lifecycle,
    ) -> Result<()> {
        let collections = Arc::clone(&self.collections);
        let lifecycle = Arc::clone(&self.lifecycle);
        let physical = self.physical(name);
        let name = name.to_string();

        let handle = tokio::spawn(async move {
            let gate = {
                let mut gates = lifecycle.lock().await;
                Arc::clone(gates.entry(name.clone()).or_default())
            };
            let _serial = gate.lock().await;

            let current = collections.read().await.get(&name).cloned();
            if current.is_none() && matches!(op, Lifecycle::Delete) {
                return Err(MemoryError::CollectionNotFound(name));
            }

            // Inserts on the current handle finish first; later ones park here
            let mut drained = match current.as_ref() {
                Some(handle) => Some(handle.insert_lock.lock().await),
                None => None,
            };

            let installed = match op {
                Lifecycle::Reset { dimension } => index
                    .recreate_collection(&physical, dimension, Distance::Cosine)
                    .await
                    .map(|_| Some(dimension)),
                Lifecycle::Delete => index.delete_collection(&physical).await.map(|_| None),
            }
            .map_err(MemoryError::Collaborator)?;

            if let Some(retired) = drained.as_mut() {
                **retired = true;
            }
            let mut map = collections.write().await;
            match installed {
                Some(dimension) => {
                    map.insert(name, Arc::new(CollectionHandle::new(dimension)));
                }
                None => {
                    map.remove(&name);
                }
            }
            Ok(())
        });

        match handle.await {
            Ok(result) => result,
            Err(e) => Err(MemoryError::Collaborator(anyhow!(
                "Collection task failed: {}",
                e
            ))),
        }
    }

    /// Store `record` unless a near neighbour already exists
    pub async fn insert(&self, collection: &str, record: MemoryRecord) -> Result<InsertOutcome> {
        let index = self.index().await?;
        let embedder = self.embedder().await?;
        self.collection(collection).await?;
        let physical = self.physical(collection);

        let text = serde_json::to_string(&record)
            .map_err(|e| MemoryError::Collaborator(anyhow!("Failed to serialize record: {}", e)))?;
        let vector = embedder.embed(&text).await?;

        loop {
            let handle = self.collection(collection).await?;
            Self::check_dimension(collection, &handle, &vector)?;

            let retired = handle.insert_lock.lock().await;
            if *retired {
                // Replaced or deleted while we waited; resolve again
                continue;
            }

            let nearest = index.search(&physical, &vector, 1).await?;
            if let Some(neighbour) = nearest.into_iter().next() {
                let below_threshold = self
                    .dedup_threshold
                    .is_some_and(|threshold| neighbour.score < threshold);

                if !below_threshold {
                    debug!(
                        "Suppressed duplicate in {} (nearest {} at {:.4})",
                        collection, neighbour.id, neighbour.score
                    );
                    return Ok(InsertOutcome::DuplicateSuppressed {
                        existing_id: neighbour.id,
                        score: neighbour.score,
                    });
                }
            }

            let id = Uuid::new_v4();
            index
                .upsert(
                    &physical,
                    vec![Point {
                        id,
                        vector,
                        payload: record,
                    }],
                )
                .await?;

            debug!("Stored point {} in {}", id, collection);
            return Ok(InsertOutcome::Stored { id });
        }
    }

    /// Up to `limit` records closest to `query`, closest first
    pub async fn search(&self, collection: &str, query: &str, limit: usize) -> Result<Vec<ScoredRecord>> {
        let index = self.index().await?;
        let embedder = self.embedder().await?;
        let handle = self.collection(collection).await?;

        if limit == 0 {
            return Ok(vec![]);
        }

        let vector = embedder.embed(query).await?;
        Self::check_dimension(collection, &handle, &vector)?;

        let hits = index.search(&self.physical(collection), &vector, limit).await?;
        debug!(
            "Search in {} returned {} of at most {}",
            collection,
            hits.len(),
            limit
        );

        Ok(hits
            .into_iter()
            .take(limit)
            .map(|hit| ScoredRecord {
                id: hit.id,
                score: hit.score,
                record: hit.payload,
            })
            .collect())
    }

    pub async fn collection_stats(&self, name: &str) -> Result<CollectionStats> {
        let index = self.index().await?;
        let handle = self.collection(name).await?;
        let points_count = index.count(&self.physical(name)).await?;

        Ok(CollectionStats {
            name: name.to_string(),
            dimension: handle.dimension,
            points_count,
        })
    }

    /// Whether the bound index answers
    pub async fn health_check(&self) -> Result<bool> {
        Ok(self.index().await?.health_check().await?)
    }
}
