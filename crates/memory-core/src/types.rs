//! ============================================================================
//! Memory Types - Records, outcomes and errors shared by both memory tiers
//! ============================================================================

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An opaque JSON document. No schema is enforced by the memory layer.
pub type MemoryRecord = serde_json::Map<String, serde_json::Value>;

/// Result alias for memory operations
pub type Result<T> = std::result::Result<T, MemoryError>;

/// Outcome of a long-term insert.
///
/// A suppressed duplicate is not an error; it is reported here so callers can
/// tell it apart from a fresh point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum InsertOutcome {
    /// A new point was written under this id
    Stored { id: Uuid },
    /// The nearest existing point caused the insert to be skipped
    DuplicateSuppressed { existing_id: Uuid, score: f32 },
}

impl InsertOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, InsertOutcome::Stored { .. })
    }
}

/// A long-term search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRecord {
    pub id: Uuid,
    /// Similarity to the query (higher is closer)
    pub score: f32,
    pub record: MemoryRecord,
}

/// Per-collection statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionStats {
    pub name: String,
    pub dimension: usize,
    pub points_count: u64,
}

/// Which long-term binding an operation was missing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Binding {
    Index,
    Embedder,
}

impl std::fmt::Display for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Binding::Index => write!(f, "vector index"),
            Binding::Embedder => write!(f, "embedder"),
        }
    }
}

/// Error types for the memory layer
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Dimension mismatch in collection {collection}: expected {expected}, got {actual}")]
    DimensionMismatch {
        collection: String,
        expected: usize,
        actual: usize,
    },

    #[error("Session {session} has no {binding} bound")]
    NotBound { session: String, binding: Binding },

    #[error("Collaborator failure: {0:#}")]
    Collaborator(#[from] anyhow::Error),
}

impl MemoryError {
    /// Stable tag used by the command surface
    pub fn kind(&self) -> &'static str {
        match self {
            MemoryError::SessionNotFound(_) => "session_not_found",
            MemoryError::CollectionNotFound(_) => "collection_not_found",
            MemoryError::DimensionMismatch { .. } => "dimension_mismatch",
            MemoryError::NotBound { .. } => "not_bound",
            MemoryError::Collaborator(_) => "collaborator_failure",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            MemoryError::SessionNotFound("s1".into()).kind(),
            "session_not_found"
        );
        assert_eq!(
            MemoryError::Collaborator(anyhow::anyhow!("boom")).kind(),
            "collaborator_failure"
        );
    }

    #[test]
    fn test_error_messages() {
        let err = MemoryError::DimensionMismatch {
            collection: "notes".into(),
            expected: 4,
            actual: 8,
        };
        assert_eq!(
            err.to_string(),
            "Dimension mismatch in collection notes: expected 4, got 8"
        );

        let err = MemoryError::NotBound {
            session: "s1".into(),
            binding: Binding::Embedder,
        };
        assert_eq!(err.to_string(), "Session s1 has no embedder bound");
    }

    #[test]
    fn test_outcome_serialization() {
        let id = Uuid::new_v4();
        let json = serde_json::to_value(InsertOutcome::Stored { id }).unwrap();
        assert_eq!(json["outcome"], "stored");
        assert_eq!(json["id"], id.to_string());
    }
}
