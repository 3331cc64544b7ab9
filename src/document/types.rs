//! Types for stored templates and object documents.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::ids::{ObjectId, TemplateId};

/// A stored template: raw yaml text plus an optional display name.
///
/// The yaml is opaque to this system; it is stored and returned verbatim.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TemplateRecord {
    /// Unique identifier.
    pub id: TemplateId,
    /// Raw yaml text.
    pub yaml: String,
    /// Optional display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// A stored object document.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ObjectRecord {
    /// Unique identifier.
    pub id: ObjectId,
    /// The document itself.
    pub doc: Value,
}
