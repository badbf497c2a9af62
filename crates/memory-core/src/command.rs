//! ============================================================================
//! Commands - One serializable request per registry operation
//! ============================================================================
//! Transports (the `memctl run` script runner, an HTTP layer) deserialize a
//! `MemoryCommand`, hand it to `SessionRegistry::dispatch`, and send back the
//! `CommandResponse` envelope.
//!
//! ```json
//! {"op": "insert_long", "session": "s1", "collection": "notes", "record": {"text": "buy milk"}}
//! ```
//! ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error};

use crate::index::IndexConnection;
use crate::memory::SessionRegistry;
use crate::types::{MemoryError, MemoryRecord, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MemoryCommand {
    InitShort {
        session: String,
    },
    AddShort {
        session: String,
        record: MemoryRecord,
    },
    GetShort {
        session: String,
    },
    RemoveShort {
        session: String,
    },
    /// Without `limit`, trims to the configured default
    TrimShort {
        session: String,
        #[serde(default)]
        limit: Option<usize>,
    },
    InitLong {
        session: String,
    },
    BindIndex {
        session: String,
        #[serde(default)]
        connection: IndexConnection,
    },
    BindEmbedder {
        session: String,
        #[serde(default)]
        model: Option<String>,
        #[serde(default)]
        dimension: Option<usize>,
    },
    #[serde(alias = "create_collection")]
    ResetCollection {
        session: String,
        collection: String,
    },
    InsertLong {
        session: String,
        collection: String,
        record: MemoryRecord,
    },
    SearchLong {
        session: String,
        collection: String,
        query: String,
        #[serde(default)]
        limit: Option<usize>,
    },
    BrowseLong {
        session: String,
        collection: String,
    },
    DeleteCollection {
        session: String,
        collection: String,
    },
    CollectionStats {
        session: String,
        collection: String,
    },
    HealthCheck {
        session: String,
    },
}

impl MemoryCommand {
    pub fn op(&self) -> &'static str {
        match self {
            MemoryCommand::InitShort { .. } => "init_short",
            MemoryCommand::AddShort { .. } => "add_short",
            MemoryCommand::GetShort { .. } => "get_short",
            MemoryCommand::RemoveShort { .. } => "remove_short",
            MemoryCommand::TrimShort { .. } => "trim_short",
            MemoryCommand::InitLong { .. } => "init_long",
            MemoryCommand::BindIndex { .. } => "bind_index",
            MemoryCommand::BindEmbedder { .. } => "bind_embedder",
            MemoryCommand::ResetCollection { .. } => "reset_collection",
            MemoryCommand::InsertLong { .. } => "insert_long",
            MemoryCommand::SearchLong { .. } => "search_long",
            MemoryCommand::BrowseLong { .. } => "browse_long",
            MemoryCommand::DeleteCollection { .. } => "delete_collection",
            MemoryCommand::CollectionStats { .. } => "collection_stats",
            MemoryCommand::HealthCheck { .. } => "health_check",
        }
    }
}

/// Result envelope for every command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub success: bool,
    pub data: Option<Value>,
    pub error: Option<String>,
    /// Stable tag from `MemoryError::kind`
    pub error_kind: Option<String>,
}

impl CommandResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            error_kind: None,
        }
    }

    pub fn err(error: &MemoryError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
            error_kind: Some(error.kind().to_string()),
        }
    }
}

fn respond<T: Serialize>(op: &str, result: Result<T>) -> CommandResponse {
    match result {
        Ok(data) => match serde_json::to_value(data) {
            Ok(value) => CommandResponse::ok(value),
            Err(e) => {
                let err = MemoryError::Collaborator(anyhow::anyhow!(
                    "Failed to serialize {} result: {}",
                    op,
                    e
                ));
                CommandResponse::err(&err)
            }
        },
        Err(e) => {
            error!("{} failed: {}", op, e);
            CommandResponse::err(&e)
        }
    }
}

impl SessionRegistry {
    /// Run one command and wrap its outcome
    pub async fn dispatch(&self, command: MemoryCommand) -> CommandResponse {
        let op = command.op();
        debug!("Dispatching {}", op);

        match command {
            MemoryCommand::InitShort { session } => {
                let created = self.init_short(&session).await;
                respond(op, Ok(json!({ "created": created })))
            }
            MemoryCommand::AddShort { session, record } => {
                respond(op, self.add_short(&session, record).await)
            }
            MemoryCommand::GetShort { session } => respond(op, self.get_short(&session).await),
            MemoryCommand::RemoveShort { session } => {
                respond(op, self.remove_short(&session).await)
            }
            MemoryCommand::TrimShort { session, limit } => {
                let result = match limit {
                    Some(limit) => self.trim_short(&session, limit).await,
                    None => self.trim_short_default(&session).await,
                };
                respond(op, result.map(|dropped| json!({ "dropped": dropped })))
            }
            MemoryCommand::InitLong { session } => {
                let created = self.init_long(&session).await;
                respond(op, Ok(json!({ "created": created })))
            }
            MemoryCommand::BindIndex {
                session,
                connection,
            } => respond(op, self.bind_index(&session, &connection).await),
            MemoryCommand::BindEmbedder {
                session,
                model,
                dimension,
            } => {
                let model = model.unwrap_or_else(|| self.config().default_embedding_model.clone());
                let dimension = dimension.unwrap_or(self.config().default_embedding_dim);
                respond(op, self.bind_embedder(&session, &model, dimension).await)
            }
            MemoryCommand::ResetCollection {
                session,
                collection,
            } => respond(op, self.reset_collection(&session, &collection).await),
            MemoryCommand::InsertLong {
                session,
                collection,
                record,
            } => respond(op, self.insert_long(&session, &collection, record).await),
            MemoryCommand::SearchLong {
                session,
                collection,
                query,
                limit,
            } => respond(
                op,
                self.search_long(&session, &collection, &query, limit).await,
            ),
            MemoryCommand::BrowseLong {
                session,
                collection,
            } => respond(op, self.browse_long(&session, &collection).await),
            MemoryCommand::DeleteCollection {
                session,
                collection,
            } => respond(op, self.delete_collection(&session, &collection).await),
            MemoryCommand::CollectionStats {
                session,
                collection,
            } => respond(op, self.collection_stats(&session, &collection).await),
            MemoryCommand::HealthCheck { session } => {
                respond(op, self.health_check(&session).await)
            }
        }
    }
}
