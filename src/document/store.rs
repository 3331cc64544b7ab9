//! SQLite-backed template and object stores.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use rusqlite::OptionalExtension;
use serde_json::Value;
use tokio_rusqlite::Connection;

use crate::core::errors::{StoreError, StoreResult};
use crate::core::ids::{ObjectId, TemplateId};

use super::types::{ObjectRecord, TemplateRecord};

/// Boxed future type for store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Trait for raw template storage.
pub trait TemplateStore: Send + Sync {
    /// Insert a template and return the stored record.
    fn insert(
        &self,
        yaml: String,
        name: Option<String>,
    ) -> StoreFuture<'_, StoreResult<TemplateRecord>>;

    /// Fetch a template by ID.
    fn fetch(&self, id: TemplateId) -> StoreFuture<'_, StoreResult<Option<TemplateRecord>>>;
}

/// Trait for raw object document storage.
pub trait ObjectStore: Send + Sync {
    /// Insert a document and return its new ID.
    fn insert(&self, doc: Value) -> StoreFuture<'_, StoreResult<ObjectId>>;

    /// Fetch a document by ID.
    fn fetch(&self, id: ObjectId) -> StoreFuture<'_, StoreResult<Option<ObjectRecord>>>;

    /// Replace the document stored under `id`.
    fn update(&self, id: ObjectId, doc: Value) -> StoreFuture<'_, StoreResult<()>>;

    /// Check store reachability (backs the DB health endpoint).
    fn ping(&self) -> StoreFuture<'_, StoreResult<()>>;
}

/// SQLite implementation of the template store.
pub struct SqliteTemplateStore {
    conn: Arc<Connection>,
    table: String,
}

impl SqliteTemplateStore {
    /// Table name for templates.
    pub const DEFAULT_TABLE: &'static str = "templates";

    /// Initialize the store and create the table if it doesn't exist.
    ///
    /// # Errors
    /// Returns an error if database operations fail.
    pub async fn new(conn: Arc<Connection>) -> StoreResult<Self> {
        Self::with_table(conn, Self::DEFAULT_TABLE).await
    }

    /// Initialize the store against a specific table name.
    ///
    /// # Errors
    /// Returns an error if database operations fail.
    pub async fn with_table(conn: Arc<Connection>, table: &str) -> StoreResult<Self> {
        let table = table.to_string();
        let table_name = table.clone();

        conn.call(move |conn| {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table_name} (
                    id TEXT PRIMARY KEY,
                    yaml TEXT NOT NULL,
                    name TEXT
                )"
            ))?;
            Ok(())
        })
        .await?;

        Ok(Self { conn, table })
    }
}

impl TemplateStore for SqliteTemplateStore {
    fn insert(
        &self,
        yaml: String,
        name: Option<String>,
    ) -> StoreFuture<'_, StoreResult<TemplateRecord>> {
        Box::pin(async move {
            let record = TemplateRecord {
                id: TemplateId::new(),
                yaml,
                name,
            };

            let table = self.table.clone();
            let id = record.id;
            let yaml = record.yaml.clone();
            let name = record.name.clone();
            self.conn
                .call(move |conn| {
                    conn.execute(
                        &format!("INSERT INTO {table} (id, yaml, name) VALUES (?1, ?2, ?3)"),
                        rusqlite::params![id, yaml, name],
                    )?;
                    Ok(())
                })
                .await?;

            Ok(record)
        })
    }

    fn fetch(&self, id: TemplateId) -> StoreFuture<'_, StoreResult<Option<TemplateRecord>>> {
        Box::pin(async move {
            let table = self.table.clone();
            let row = self
                .conn
                .call(move |conn| {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT id, yaml, name FROM {table} WHERE id = ?1"
                    ))?;
                    let row = stmt
                        .query_row(rusqlite::params![id], |row| {
                            Ok(TemplateRecord {
                                id: row.get(0)?,
                                yaml: row.get(1)?,
                                name: row.get(2)?,
                            })
                        })
                        .optional()?;
                    Ok(row)
                })
                .await?;
            Ok(row)
        })
    }
}

/// SQLite implementation of the object store.
pub struct SqliteObjectStore {
    conn: Arc<Connection>,
    table: String,
}

impl SqliteObjectStore {
    /// Table name for object documents.
    pub const DEFAULT_TABLE: &'static str = "objects";

    /// Initialize the store and create the table if it doesn't exist.
    ///
    /// # Errors
    /// Returns an error if database operations fail.
    pub async fn new(conn: Arc<Connection>) -> StoreResult<Self> {
        Self::with_table(conn, Self::DEFAULT_TABLE).await
    }

    /// Initialize the store against a specific table name.
    ///
    /// # Errors
    /// Returns an error if database operations fail.
    pub async fn with_table(conn: Arc<Connection>, table: &str) -> StoreResult<Self> {
        let table = table.to_string();
        let table_name = table.clone();

        conn.call(move |conn| {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table_name} (
                    id TEXT PRIMARY KEY,
                    doc_json TEXT NOT NULL
                )"
            ))?;
            Ok(())
        })
        .await?;

        Ok(Self { conn, table })
    }
}

impl ObjectStore for SqliteObjectStore {
    fn insert(&self, doc: Value) -> StoreFuture<'_, StoreResult<ObjectId>> {
        Box::pin(async move {
            let id = ObjectId::new();
            let doc_json = serde_json::to_string(&doc)?;

            let table = self.table.clone();
            self.conn
                .call(move |conn| {
                    conn.execute(
                        &format!("INSERT INTO {table} (id, doc_json) VALUES (?1, ?2)"),
                        rusqlite::params![id, doc_json],
                    )?;
                    Ok(())
                })
                .await?;

            Ok(id)
        })
    }

    fn fetch(&self, id: ObjectId) -> StoreFuture<'_, StoreResult<Option<ObjectRecord>>> {
        Box::pin(async move {
            let table = self.table.clone();
            let doc_json = self
                .conn
                .call(move |conn| {
                    let doc_json: Option<String> = conn
                        .query_row(
                            &format!("SELECT doc_json FROM {table} WHERE id = ?1"),
                            rusqlite::params![id],
                            |row| row.get(0),
                        )
                        .optional()?;
                    Ok(doc_json)
                })
                .await?;

            match doc_json {
                Some(json) => {
                    let doc: Value = serde_json::from_str(&json)?;
                    Ok(Some(ObjectRecord { id, doc }))
                }
                None => Ok(None),
            }
        })
    }

    fn update(&self, id: ObjectId, doc: Value) -> StoreFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            let doc_json = serde_json::to_string(&doc)?;

            let table = self.table.clone();
            let affected = self
                .conn
                .call(move |conn| {
                    let affected = conn.execute(
                        &format!("UPDATE {table} SET doc_json = ?1 WHERE id = ?2"),
                        rusqlite::params![doc_json, id],
                    )?;
                    Ok(affected)
                })
                .await?;

            if affected == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
    }

    fn ping(&self) -> StoreFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            self.conn
                .call(|conn| {
                    let one: i64 = conn.query_row("SELECT 1", [], |row| row.get(0))?;
                    debug_assert_eq!(one, 1);
                    Ok(())
                })
                .await?;
            Ok(())
        })
    }
}
