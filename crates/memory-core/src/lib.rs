//! ============================================================================
//! MEMORY-CORE: Session memory for conversational agents
//! ============================================================================
//! This crate handles all memory logic behind `memctl`:
//! - Short-term recency buffers per session, trimmed on request
//! - Long-term semantic memory with dedup-on-insert
//! - Embedders (OpenAI-compatible HTTP, offline hashing)
//! - Vector indexes (Qdrant, embedded redb, in-memory)
//! - A serializable command surface and a SearxNG web-search client
//! ============================================================================

pub mod command;
pub mod config;
pub mod embeddings;
pub mod index;
pub mod memory;
pub mod search;
pub mod types;

// Re-export main types for convenience
pub use command::{CommandResponse, MemoryCommand};
pub use config::{EmbeddingBackend, MemoryConfig};
pub use embeddings::{DefaultEmbedders, Embedder, EmbedderProvider};
pub use index::{DefaultConnector, Distance, IndexConnection, IndexConnector, VectorIndex};
pub use memory::{LongTermMemory, SessionRegistry, ShortTermMemory};
pub use search::{SearchOptions, SearxngClient};
pub use types::*;
