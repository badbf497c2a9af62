//! ============================================================================
//! Qdrant Index - Remote vector database operations
//! ============================================================================
//! Qdrant has no atomic "replace collection", so `recreate_collection` is a
//! delete followed by a create. If the create fails the collection is gone;
//! long-term memory treats that as a failed reset and keeps its old handle.
//! ============================================================================

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use qdrant_client::qdrant::{
    point_id::PointIdOptions, CreateCollectionBuilder, Distance as QdrantDistance, PointId,
    PointStruct, SearchPointsBuilder, UpsertPointsBuilder, Value, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use std::collections::HashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{Distance, Point, ScoredPoint, VectorIndex};
use crate::types::MemoryRecord;

/// Vector index backed by a Qdrant server
pub struct QdrantIndex {
    client: Qdrant,
    url: String,
}

impl QdrantIndex {
    /// Build a client for `url`. No request is made until first use.
    pub fn new(url: &str, api_key: Option<String>) -> Result<Self> {
        debug!("Creating Qdrant client for {}", url);

        let client = match api_key {
            Some(key) => Qdrant::from_url(url).api_key(key).build(),
            None => Qdrant::from_url(url).build(),
        }
        .map_err(|e| anyhow!("Failed to create Qdrant client: {}", e))?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl From<Distance> for QdrantDistance {
    fn from(distance: Distance) -> Self {
        match distance {
            Distance::Cosine => QdrantDistance::Cosine,
            Distance::Dot => QdrantDistance::Dot,
            Distance::Euclid => QdrantDistance::Euclid,
        }
    }
}

fn to_payload(record: MemoryRecord) -> HashMap<String, Value> {
    record
        .into_iter()
        .map(|(key, value)| (key, Value::from(value)))
        .collect()
}

fn from_payload(payload: HashMap<String, Value>) -> MemoryRecord {
    payload
        .into_iter()
        .map(|(key, value)| (key, serde_json::Value::from(value)))
        .collect()
}

fn extract_uuid(point_id: PointId) -> Option<Uuid> {
    match point_id.point_id_options? {
        PointIdOptions::Uuid(uuid_str) => Uuid::parse_str(&uuid_str).ok(),
        PointIdOptions::Num(_) => None,
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    fn backend_name(&self) -> &'static str {
        "qdrant"
    }

    async fn recreate_collection(&self, name: &str, dimension: usize, distance: Distance) -> Result<()> {
        let exists = self
            .client
            .collection_exists(name)
            .await
            .map_err(|e| anyhow!("Failed to check collection existence: {}", e))?;

        if exists {
            debug!("Dropping existing collection: {}", name);
            self.client
                .delete_collection(name)
                .await
                .map_err(|e| anyhow!("Failed to delete collection: {}", e))?;
        }

        info!("Creating collection: {} ({} dims)", name, dimension);
        self.client
            .create_collection(
                CreateCollectionBuilder::new(name).vectors_config(VectorParamsBuilder::new(
                    dimension as u64,
                    QdrantDistance::from(distance),
                )),
            )
            .await
            .map_err(|e| anyhow!("Failed to create collection: {}", e))?;

        Ok(())
    }

    async fn upsert(&self, collection: &str, points: Vec<Point>) -> Result<usize> {
        if points.is_empty() {
            return Ok(0);
        }

        let count = points.len();
        let points: Vec<PointStruct> = points
            .into_iter()
            .map(|p| PointStruct::new(p.id.to_string(), p.vector, to_payload(p.payload)))
            .collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, points).wait(true))
            .await
            .map_err(|e| anyhow!("Failed to upsert points: {}", e))?;

        debug!("Upserted {} points into {}", count, collection);
        Ok(count)
    }

    async fn search(&self, collection: &str, vector: &[f32], limit: usize) -> Result<Vec<ScoredPoint>> {
        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(collection, vector.to_vec(), limit as u64).with_payload(true),
            )
            .await
            .map_err(|e| anyhow!("Failed to search collection: {}", e))?;

        let hits: Vec<ScoredPoint> = response
            .result
            .into_iter()
            .filter_map(|point| {
                let id = extract_uuid(point.id?)?;
                Some(ScoredPoint {
                    id,
                    score: point.score,
                    payload: from_payload(point.payload),
                })
            })
            .collect();

        debug!("Found {} hits in {}", hits.len(), collection);
        Ok(hits)
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        info!("Deleting collection: {}", name);
        self.client
            .delete_collection(name)
            .await
            .map_err(|e| anyhow!("Failed to delete collection: {}", e))?;
        Ok(())
    }

    async fn count(&self, collection: &str) -> Result<u64> {
        let info = self
            .client
            .collection_info(collection)
            .await
            .map_err(|e| anyhow!("Failed to get collection info: {}", e))?;

        Ok(info.result.and_then(|r| r.points_count).unwrap_or(0))
    }

    async fn health_check(&self) -> Result<bool> {
        match self.client.health_check().await {
            Ok(_) => Ok(true),
            Err(e) => {
                warn!("Qdrant health check failed: {}", e);
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_conversion() {
        let mut record = MemoryRecord::new();
        record.insert("text".to_string(), json!("buy milk"));
        record.insert("priority".to_string(), json!(2));
        record.insert("tags".to_string(), json!(["home", "errand"]));

        let back = from_payload(to_payload(record.clone()));
        assert_eq!(back, record);
    }

    #[test]
    fn test_extract_uuid() {
        let id = Uuid::new_v4();
        let point_id = PointId {
            point_id_options: Some(PointIdOptions::Uuid(id.to_string())),
        };
        assert_eq!(extract_uuid(point_id), Some(id));

        let numeric = PointId {
            point_id_options: Some(PointIdOptions::Num(7)),
        };
        assert_eq!(extract_uuid(numeric), None);
    }

    // Requires a running Qdrant instance
    #[tokio::test]
    #[ignore]
    async fn test_live_round_trip() {
        let index = QdrantIndex::new(super::super::DEFAULT_QDRANT_URL, None).unwrap();
        index.recreate_collection("memory_core_test", 3, Distance::Cosine).await.unwrap();

        let mut payload = MemoryRecord::new();
        payload.insert("text".to_string(), json!("hello"));
        index
            .upsert(
                "memory_core_test",
                vec![Point {
                    id: Uuid::new_v4(),
                    vector: vec![1.0, 0.0, 0.0],
                    payload,
                }],
            )
            .await
            .unwrap();

        let hits = index.search("memory_core_test", &[1.0, 0.0, 0.0], 1).await.unwrap();
        assert_eq!(hits[0].payload["text"], "hello");

        index.delete_collection("memory_core_test").await.unwrap();
    }
}
