use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{missing_collection, rank, Distance, Point, ScoredPoint, VectorIndex};
use crate::types::MemoryRecord;

/// Vector index held in process memory.
///
/// Every mutation happens under one write lock, so a recreate or delete is
/// never observed half-done.
pub struct InMemoryIndex {
    collections: RwLock<HashMap<String, InMemoryCollection>>,
}

struct InMemoryCollection {
    dimension: usize,
    distance: Distance,
    points: HashMap<Uuid, (Vec<f32>, MemoryRecord)>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Names of all collections, sorted
    pub async fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    fn backend_name(&self) -> &'static str {
        "in-memory"
    }

    async fn recreate_collection(&self, name: &str, dimension: usize, distance: Distance) -> Result<()> {
        let mut collections = self.collections.write().await;
        collections.insert(
            name.to_string(),
            InMemoryCollection {
                dimension,
                distance,
                points: HashMap::new(),
            },
        );
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: Vec<Point>) -> Result<usize> {
        let mut collections = self.collections.write().await;
        let col = collections
            .get_mut(collection)
            .ok_or_else(|| missing_collection(collection))?;

        // Validate the whole batch before touching the collection
        if let Some(bad) = points.iter().find(|p| p.vector.len() != col.dimension) {
            return Err(anyhow::anyhow!(
                "Point {} has {} dimensions, collection '{}' expects {}",
                bad.id,
                bad.vector.len(),
                collection,
                col.dimension
            ));
        }

        let count = points.len();
        for point in points {
            col.points.insert(point.id, (point.vector, point.payload));
        }
        Ok(count)
    }

    async fn search(&self, collection: &str, vector: &[f32], limit: usize) -> Result<Vec<ScoredPoint>> {
        let collections = self.collections.read().await;
        let col = collections
            .get(collection)
            .ok_or_else(|| missing_collection(collection))?;

        let hits = col
            .points
            .iter()
            .map(|(id, (stored, payload))| ScoredPoint {
                id: *id,
                score: col.distance.score(vector, stored),
                payload: payload.clone(),
            })
            .collect();

        Ok(rank(hits, limit))
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let mut collections = self.collections.write().await;
        collections
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| missing_collection(name))
    }

    async fn count(&self, collection: &str) -> Result<u64> {
        let collections = self.collections.read().await;
        let col = collections
            .get(collection)
            .ok_or_else(|| missing_collection(collection))?;
        Ok(col.points.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn point(text: &str, vector: Vec<f32>) -> Point {
        let mut payload = MemoryRecord::new();
        payload.insert("text".to_string(), json!(text));
        Point {
            id: Uuid::new_v4(),
            vector,
            payload,
        }
    }

    #[tokio::test]
    async fn test_upsert_and_search_ordering() {
        let index = InMemoryIndex::new();
        index.recreate_collection("test", 3, Distance::Cosine).await.unwrap();

        index
            .upsert(
                "test",
                vec![
                    point("hello world", vec![1.0, 0.0, 0.0]),
                    point("goodbye world", vec![0.0, 1.0, 0.0]),
                    point("hello again", vec![0.9, 0.1, 0.0]),
                ],
            )
            .await
            .unwrap();

        let results = index.search("test", &[1.0, 0.0, 0.0], 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].payload["text"], "hello world");
        assert_eq!(results[1].payload["text"], "hello again");
        assert!(results[0].score >= results[1].score);
    }

    #[tokio::test]
    async fn test_recreate_drops_points() {
        let index = InMemoryIndex::new();
        index.recreate_collection("test", 2, Distance::Cosine).await.unwrap();
        index.upsert("test", vec![point("a", vec![1.0, 0.0])]).await.unwrap();
        assert_eq!(index.count("test").await.unwrap(), 1);

        index.recreate_collection("test", 2, Distance::Cosine).await.unwrap();
        assert_eq!(index.count("test").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_missing_collection_errors() {
        let index = InMemoryIndex::new();
        assert!(index.search("nope", &[1.0], 1).await.is_err());
        assert!(index.count("nope").await.is_err());
        assert!(index.delete_collection("nope").await.is_err());
        assert!(index.upsert("nope", vec![]).await.is_err());
    }

    #[tokio::test]
    async fn test_wrong_dimension_rejected() {
        let index = InMemoryIndex::new();
        index.recreate_collection("test", 3, Distance::Cosine).await.unwrap();
        let result = index.upsert("test", vec![point("a", vec![1.0, 0.0])]).await;
        assert!(result.is_err());
        assert_eq!(index.count("test").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_and_names() {
        let index = InMemoryIndex::new();
        index.recreate_collection("b", 2, Distance::Cosine).await.unwrap();
        index.recreate_collection("a", 2, Distance::Cosine).await.unwrap();
        assert_eq!(index.collection_names().await, vec!["a", "b"]);

        index.delete_collection("a").await.unwrap();
        assert_eq!(index.collection_names().await, vec!["b"]);
    }
}
