//! Raw template/object document stores.
//!
//! Both are plain insert/fetch tables; the object store additionally
//! supports update-by-id so patched documents can be persisted back.

pub mod store;
pub mod types;

pub use store::{ObjectStore, SqliteObjectStore, SqliteTemplateStore, TemplateStore};
pub use types::{ObjectRecord, TemplateRecord};
