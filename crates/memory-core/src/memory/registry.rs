use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::long_term::LongTermMemory;
use super::short_term::ShortTermMemory;
use crate::config::MemoryConfig;
use crate::embeddings::{DefaultEmbedders, EmbedderProvider};
use crate::index::{DefaultConnector, IndexConnection, IndexConnector};
use crate::types::{CollectionStats, InsertOutcome, MemoryError, MemoryRecord, Result, ScoredRecord};

/// Session id → memory tiers.
///
/// Entries are created by `init_short` / `init_long` and live for the life of
/// the registry. Every other call on an unknown session fails with
/// `SessionNotFound`; nothing is created implicitly.
pub struct SessionRegistry {
    config: MemoryConfig,
    embedders: Arc<dyn EmbedderProvider>,
    indexes: Arc<dyn IndexConnector>,
    short_term: RwLock<HashMap<String, Arc<ShortTermMemory>>>,
    long_term: RwLock<HashMap<String, Arc<LongTermMemory>>>,
}

impl SessionRegistry {
    pub fn new(
        config: MemoryConfig,
        embedders: Arc<dyn EmbedderProvider>,
        indexes: Arc<dyn IndexConnector>,
    ) -> Self {
        match config.dedup_threshold {
            Some(threshold) => info!("Long-term dedup threshold: {}", threshold),
            None => warn!(
                "No dedup threshold set: any existing neighbour suppresses a long-term insert \
                 (set MEMORY_DEDUP_THRESHOLD to require a minimum similarity)"
            ),
        }

        Self {
            config,
            embedders,
            indexes,
            short_term: RwLock::new(HashMap::new()),
            long_term: RwLock::new(HashMap::new()),
        }
    }

    /// Registry with the default embedder provider and index connector
    pub fn from_config(config: MemoryConfig) -> Self {
        let embedders = Arc::new(DefaultEmbedders::from_config(&config));
        let indexes = Arc::new(DefaultConnector::from_config(&config));
        Self::new(config, embedders, indexes)
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    // ------------------------------------------------------------------------
    // Short-term
    // ------------------------------------------------------------------------

    /// Create an empty buffer for `id` if absent. Returns whether one was created.
    pub async fn init_short(&self, id: &str) -> bool {
        let mut sessions = self.short_term.write().await;
        if sessions.contains_key(id) {
            return false;
        }
        sessions.insert(id.to_string(), Arc::new(ShortTermMemory::new()));
        info!("Initialized short-term memory for session {}", id);
        true
    }

    async fn short(&self, id: &str) -> Result<Arc<ShortTermMemory>> {
        self.short_term
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| MemoryError::SessionNotFound(id.to_string()))
    }

    pub async fn add_short(&self, id: &str, record: MemoryRecord) -> Result<()> {
        self.short(id).await?.add(record).await;
        debug!("Added short-term record to session {}", id);
        Ok(())
    }

    pub async fn get_short(&self, id: &str) -> Result<Vec<MemoryRecord>> {
        Ok(self.short(id).await?.get().await)
    }

    pub async fn remove_short(&self, id: &str) -> Result<()> {
        self.short(id).await?.remove().await;
        debug!("Cleared short-term memory of session {}", id);
        Ok(())
    }

    /// Keep the newest `limit` records. Returns how many were dropped.
    pub async fn trim_short(&self, id: &str, limit: usize) -> Result<usize> {
        Ok(self.short(id).await?.trim(limit).await)
    }

    /// `trim_short` with the configured default limit
    pub async fn trim_short_default(&self, id: &str) -> Result<usize> {
        self.trim_short(id, self.config.short_term_limit).await
    }

    pub async fn len_short(&self, id: &str) -> Result<usize> {
        Ok(self.short(id).await?.len().await)
    }

    // ------------------------------------------------------------------------
    // Long-term
    // ------------------------------------------------------------------------

    /// Create an unbound long-term memory for `id` if absent
    pub async fn init_long(&self, id: &str) -> bool {
        let mut sessions = self.long_term.write().await;
        if sessions.contains_key(id) {
            return false;
        }
        sessions.insert(
            id.to_string(),
            Arc::new(LongTermMemory::new(id, self.config.dedup_threshold)),
        );
        info!("Initialized long-term memory for session {}", id);
        true
    }

    async fn long(&self, id: &str) -> Result<Arc<LongTermMemory>> {
        self.long_term
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| MemoryError::SessionNotFound(id.to_string()))
    }

    /// Connect and attach a vector index. Last call wins.
    pub async fn bind_index(&self, id: &str, connection: &IndexConnection) -> Result<()> {
        let long = self.long(id).await?;
        let index = self.indexes.connect(connection).await?;
        long.set_index(index).await;
        Ok(())
    }

    /// Build and attach an embedder. Last call wins.
    pub async fn bind_embedder(&self, id: &str, model: &str, dimension: usize) -> Result<()> {
        let long = self.long(id).await?;
        let embedder = self.embedders.build(model, dimension).await?;
        long.set_embedder(embedder).await;
        Ok(())
    }

    /// `bind_embedder` with the configured default model and dimension
    pub async fn bind_default_embedder(&self, id: &str) -> Result<()> {
        let model = self.config.default_embedding_model.clone();
        self.bind_embedder(id, &model, self.config.default_embedding_dim)
            .await
    }

    /// Destructively (re)create `collection`
    pub async fn reset_collection(&self, id: &str, collection: &str) -> Result<()> {
        self.long(id).await?.reset_collection(collection).await
    }

    pub async fn insert_long(
        &self,
        id: &str,
        collection: &str,
        record: MemoryRecord,
    ) -> Result<InsertOutcome> {
        self.long(id).await?.insert(collection, record).await
    }

    /// Similarity search; `None` uses the configured default limit
    pub async fn search_long(
        &self,
        id: &str,
        collection: &str,
        query: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ScoredRecord>> {
        let limit = limit.unwrap_or(self.config.search_limit);
        self.long(id).await?.search(collection, query, limit).await
    }

    /// Records nearest the empty query, default limit
    pub async fn browse_long(&self, id: &str, collection: &str) -> Result<Vec<ScoredRecord>> {
        self.search_long(id, collection, "", None).await
    }

    pub async fn delete_collection(&self, id: &str, collection: &str) -> Result<()> {
        self.long(id).await?.delete_collection(collection).await
    }

    pub async fn collection_stats(&self, id: &str, collection: &str) -> Result<CollectionStats> {
        self.long(id).await?.collection_stats(collection).await
    }

    pub async fn collection_names(&self, id: &str) -> Result<Vec<String>> {
        Ok(self.long(id).await?.collection_names().await)
    }

    pub async fn health_check(&self, id: &str) -> Result<bool> {
        self.long(id).await?.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> SessionRegistry {
        SessionRegistry::from_config(MemoryConfig::default())
    }

    fn record(value: i64) -> MemoryRecord {
        let mut r = MemoryRecord::new();
        r.insert("x".to_string(), json!(value));
        r
    }

    #[tokio::test]
    async fn test_init_is_idempotent() {
        let registry = registry();
        assert!(registry.init_short("a").await);
        registry.add_short("a", record(1)).await.unwrap();
        assert!(!registry.init_short("a").await);
        assert_eq!(registry.get_short("a").await.unwrap(), vec![record(1)]);

        assert!(registry.init_long("a").await);
        assert!(!registry.init_long("a").await);
    }

    #[tokio::test]
    async fn test_tiers_are_independent() {
        let registry = registry();
        registry.init_long("a").await;
        assert!(matches!(
            registry.get_short("a").await.unwrap_err(),
            MemoryError::SessionNotFound(_)
        ));

        registry.init_short("b").await;
        assert!(matches!(
            registry.reset_collection("b", "notes").await.unwrap_err(),
            MemoryError::SessionNotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_trim_short_default_uses_config() {
        let mut config = MemoryConfig::default();
        config.short_term_limit = 2;
        let registry = SessionRegistry::from_config(config);

        registry.init_short("a").await;
        for n in 0..5 {
            registry.add_short("a", record(n)).await.unwrap();
        }
        assert_eq!(registry.trim_short_default("a").await.unwrap(), 3);
        assert_eq!(
            registry.get_short("a").await.unwrap(),
            vec![record(3), record(4)]
        );
    }

    #[tokio::test]
    async fn test_default_embedder_binding() {
        let registry = registry();
        registry.init_long("a").await;
        registry.bind_default_embedder("a").await.unwrap();
        registry
            .bind_index("a", &IndexConnection::InMemory)
            .await
            .unwrap();
        registry.reset_collection("a", "registry_defaults").await.unwrap();

        let stats = registry
            .collection_stats("a", "registry_defaults")
            .await
            .unwrap();
        assert_eq!(stats.dimension, 384);
        assert_eq!(stats.points_count, 0);
        assert!(registry.health_check("a").await.unwrap());
    }
}
