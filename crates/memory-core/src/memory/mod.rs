//! ============================================================================
//! Memory Module - Session-scoped short- and long-term memory
//! ============================================================================
//! ## Architecture
//! ```text
//! caller ─► SessionRegistry ─┬─► ShortTermMemory   (ordered records)
//!                            └─► LongTermMemory ─┬─► Embedder
//!                                                └─► VectorIndex
//! ```
//!
//! ## Usage
//! ```rust,ignore
//! use memory_core::{IndexConnection, MemoryConfig, SessionRegistry};
//!
//! let registry = SessionRegistry::from_config(MemoryConfig::from_env());
//! registry.init_long("s1").await;
//! registry.bind_embedder("s1", "model-a", 4).await?;
//! registry.bind_index("s1", &IndexConnection::InMemory).await?;
//! registry.reset_collection("s1", "notes").await?;
//! registry.insert_long("s1", "notes", record).await?;
//! ```
//! ============================================================================

mod long_term;
mod registry;
mod short_term;

pub use long_term::LongTermMemory;
pub use registry::SessionRegistry;
pub use short_term::ShortTermMemory;
