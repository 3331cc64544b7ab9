//! Conversation records and the append-only step-log store.

pub mod store;
pub mod types;

pub use store::{ConversationStore, SqliteConversationStore};
pub use types::{Conversation, ConversationSummary, NewStep, Step, StepMode, TemplateRef};
