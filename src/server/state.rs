//! Application state shared across all request handlers.

use std::sync::Arc;

use tokio_rusqlite::Connection;

use crate::conversation::SqliteConversationStore;
use crate::core::config::StorageConfig;
use crate::core::errors::StoreResult;
use crate::document::{SqliteObjectStore, SqliteTemplateStore};

/// Shared application state.
///
/// One store connection is opened at startup and shared (read-only `Arc`)
/// by every request; teardown is process-exit-only.
pub struct AppState {
    /// Conversation step-log store.
    pub conversations: SqliteConversationStore,
    /// Raw template store.
    pub templates: SqliteTemplateStore,
    /// Raw object document store.
    pub objects: SqliteObjectStore,
}

impl AppState {
    /// Open the store and initialize all tables.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or initialized.
    pub async fn new(config: &StorageConfig) -> StoreResult<Arc<Self>> {
        let conn = Arc::new(Connection::open(&config.sqlite_path).await?);
        Self::with_connection(conn, config).await
    }

    /// Build state against an ephemeral in-memory store. Used by tests.
    ///
    /// # Errors
    /// Returns an error if store initialization fails.
    pub async fn in_memory() -> StoreResult<Arc<Self>> {
        let conn = Arc::new(Connection::open_in_memory().await?);
        Self::with_connection(conn, &StorageConfig::default()).await
    }

    async fn with_connection(conn: Arc<Connection>, config: &StorageConfig) -> StoreResult<Arc<Self>> {
        let conversations =
            SqliteConversationStore::with_table(conn.clone(), &config.conversation_table).await?;
        let templates =
            SqliteTemplateStore::with_table(conn.clone(), &config.template_table).await?;
        let objects = SqliteObjectStore::with_table(conn, &config.object_table).await?;

        Ok(Arc::new(Self {
            conversations,
            templates,
            objects,
        }))
    }
}
