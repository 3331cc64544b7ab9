//! Types for conversation management.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::ids::ConversationId;
use crate::patch::PatchOp;

/// How a step's template is applied by clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepMode {
    /// Template applied as a diff against current state.
    Diff,
    /// Template applied as an explicit replacement.
    Explicit,
}

/// One committed, immutable entry in a conversation's edit log.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    /// Target template path.
    pub template_path: String,
    /// Application mode.
    pub mode: StepMode,
    /// Patch operations recorded for this step. Stored as data, never
    /// executed by the conversation store.
    pub ops: Vec<PatchOp>,
    /// Commit timestamp.
    pub at: DateTime<Utc>,
}

/// Caller-supplied step content; the store stamps `at` on append.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStep {
    /// Target template path.
    pub template_path: String,
    /// Application mode.
    pub mode: StepMode,
    /// Patch operations to record.
    pub ops: Vec<PatchOp>,
}

/// Lightweight pointer to a template, no ops attached.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateRef {
    /// Target template path.
    pub template_path: String,
    /// Application mode.
    pub mode: StepMode,
}

/// A full conversation record.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// Unique identifier, assigned at creation.
    pub id: ConversationId,
    /// Display title.
    pub title: String,
    /// Initial document, immutable after creation.
    pub initial: Value,
    /// Committed step log, oldest first.
    pub steps: Vec<Step>,
    /// Client-side speculative steps, wholesale-replaced by update-state.
    pub pending_steps: Vec<TemplateRef>,
    /// Opaque client-scoped key-value data.
    pub session_state: Map<String, Value>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Listing entry for a conversation.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    /// Unique identifier.
    pub id: ConversationId,
    /// Display title.
    pub title: String,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}
