use tokio::sync::RwLock;
use tracing::debug;

use crate::types::MemoryRecord;

/// Per-session recency buffer.
///
/// Grows without bound until `trim` is called. Every mutation takes the write
/// lock, so concurrent `add`s never lose records and `trim`/`remove` are
/// ordered against them.
#[derive(Debug, Default)]
pub struct ShortTermMemory {
    records: RwLock<Vec<MemoryRecord>>,
}

impl ShortTermMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record
    pub async fn add(&self, record: MemoryRecord) {
        self.records.write().await.push(record);
    }

    /// Snapshot of all records, oldest first
    pub async fn get(&self) -> Vec<MemoryRecord> {
        self.records.read().await.clone()
    }

    /// Drop every record. The session stays initialized.
    pub async fn remove(&self) {
        self.records.write().await.clear();
    }

    /// Keep only the newest `limit` records. Returns how many were dropped.
    pub async fn trim(&self, limit: usize) -> usize {
        let mut records = self.records.write().await;
        if records.len() <= limit {
            return 0;
        }

        let dropped = records.len() - limit;
        records.drain(..dropped);
        debug!("Trimmed {} short-term records (limit {})", dropped, limit);
        dropped
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(n: i64) -> MemoryRecord {
        let mut r = MemoryRecord::new();
        r.insert("n".to_string(), json!(n));
        r
    }

    #[tokio::test]
    async fn test_trim_keeps_newest() {
        let memory = ShortTermMemory::new();
        for n in 1..=5 {
            memory.add(record(n)).await;
        }

        assert_eq!(memory.trim(3).await, 2);
        assert_eq!(memory.get().await, vec![record(3), record(4), record(5)]);
    }

    #[tokio::test]
    async fn test_trim_under_limit_is_noop() {
        let memory = ShortTermMemory::new();
        memory.add(record(1)).await;
        memory.add(record(2)).await;

        assert_eq!(memory.trim(3).await, 0);
        assert_eq!(memory.len().await, 2);
    }

    #[tokio::test]
    async fn test_trim_to_zero() {
        let memory = ShortTermMemory::new();
        memory.add(record(1)).await;

        assert_eq!(memory.trim(0).await, 1);
        assert!(memory.is_empty().await);
    }

    #[tokio::test]
    async fn test_remove_clears() {
        let memory = ShortTermMemory::new();
        memory.add(record(1)).await;
        memory.remove().await;

        assert!(memory.get().await.is_empty());
        memory.add(record(2)).await;
        assert_eq!(memory.get().await, vec![record(2)]);
    }
}
