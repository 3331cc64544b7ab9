//! HTTP route handlers for the patchlog API.

use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::conversation::{
    Conversation, ConversationStore, ConversationSummary, NewStep, TemplateRef,
};
use crate::core::ids::{ConversationId, ObjectId, TemplateId};
use crate::document::{ObjectRecord, ObjectStore, TemplateRecord, TemplateStore};
use crate::patch::PatchOp;

use super::error::ApiError;
use super::state::AppState;

/// Create the API router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/db", get(health_db))
        .route("/templates", post(create_template))
        .route("/templates/{id}", get(get_template))
        .route("/objects", post(create_object))
        .route("/objects/{id}", get(get_object))
        .route("/objects/{id}/applyPatch", post(apply_patch))
        .route(
            "/conversations",
            post(create_conversation).get(list_conversations),
        )
        .route("/conversations/{id}", get(get_conversation))
        .route("/conversations/{id}/title", patch(rename_conversation))
        .route("/conversations/{id}/appendStep", post(append_step))
        .route("/conversations/{id}/undo", post(undo_last))
        .route("/conversations/{id}/reset", post(reset_steps))
        .route("/conversations/{id}/state", patch(update_state))
        .with_state(state)
}

/// Parse a path id, mapping any failure to `invalid_id`.
fn parse_id<T: FromStr>(raw: &str) -> Result<T, ApiError> {
    raw.parse().map_err(|_| ApiError::InvalidId)
}

/// Acknowledgement body for mutations.
#[derive(Debug, Serialize)]
pub struct OkResponse {
    /// Always true; failures surface as [`ApiError`] instead.
    pub ok: bool,
}

const OK: OkResponse = OkResponse { ok: true };

/// Liveness endpoint.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "patchlog",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Store reachability endpoint.
async fn health_db(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    state.objects.ping().await?;
    Ok(Json(serde_json::json!({ "store": "ok" })))
}

/// Template creation request.
#[derive(Debug, Deserialize)]
pub struct TemplateIn {
    /// Raw yaml text, stored verbatim.
    pub yaml: String,
    /// Optional display name.
    pub name: Option<String>,
}

/// Store a raw template.
async fn create_template(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TemplateIn>,
) -> Result<Json<TemplateRecord>, ApiError> {
    let record = state.templates.insert(body.yaml, body.name).await?;
    Ok(Json(record))
}

/// Fetch a template by id.
async fn get_template(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TemplateRecord>, ApiError> {
    let id: TemplateId = parse_id(&id)?;
    let record = state.templates.fetch(id).await?.ok_or(ApiError::NotFound)?;
    Ok(Json(record))
}

/// Object creation request.
#[derive(Debug, Deserialize)]
pub struct ObjectIn {
    /// Arbitrary document to store.
    pub doc: Value,
}

/// Object creation response.
#[derive(Debug, Serialize)]
pub struct ObjectCreated {
    /// Identifier of the stored document.
    pub id: ObjectId,
}

/// Store an arbitrary document.
async fn create_object(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ObjectIn>,
) -> Result<Json<ObjectCreated>, ApiError> {
    let id = state.objects.insert(body.doc).await?;
    Ok(Json(ObjectCreated { id }))
}

/// Fetch a document by id.
async fn get_object(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ObjectRecord>, ApiError> {
    let id: ObjectId = parse_id(&id)?;
    let record = state.objects.fetch(id).await?.ok_or(ApiError::NotFound)?;
    Ok(Json(record))
}

/// Patch application request.
#[derive(Debug, Deserialize)]
pub struct PatchIn {
    /// Operations to apply, in order.
    pub patch: Vec<PatchOp>,
}

/// Apply a blind JSON patch to a stored document and persist the result.
///
/// The stored document is untouched if any op fails.
async fn apply_patch(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<PatchIn>,
) -> Result<Json<ObjectRecord>, ApiError> {
    let id: ObjectId = parse_id(&id)?;
    let record = state.objects.fetch(id).await?.ok_or(ApiError::NotFound)?;

    let updated = crate::patch::apply(&record.doc, &body.patch)?;

    state.objects.update(id, updated.clone()).await?;
    Ok(Json(ObjectRecord { id, doc: updated }))
}

/// Conversation creation request.
#[derive(Debug, Deserialize)]
pub struct ConversationCreate {
    /// Optional title; a unique one is generated when absent or empty.
    pub title: Option<String>,
    /// Optional initial document; defaults to `{}`.
    pub initial: Option<Value>,
}

/// Create a conversation.
async fn create_conversation(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ConversationCreate>,
) -> Result<Json<Conversation>, ApiError> {
    let initial = body
        .initial
        .unwrap_or_else(|| Value::Object(Map::new()));
    let conversation = state.conversations.create(body.title, initial).await?;
    Ok(Json(conversation))
}

/// Conversation listing response.
#[derive(Debug, Serialize)]
pub struct ConversationList {
    /// Summaries, most recently updated first.
    pub items: Vec<ConversationSummary>,
}

/// List conversation summaries.
async fn list_conversations(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ConversationList>, ApiError> {
    let items = state.conversations.list().await?;
    Ok(Json(ConversationList { items }))
}

/// Fetch a full conversation.
async fn get_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Conversation>, ApiError> {
    let id: ConversationId = parse_id(&id)?;
    let conversation = state
        .conversations
        .get(id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(conversation))
}

/// Rename request.
#[derive(Debug, Deserialize)]
pub struct ConversationUpdateTitle {
    /// New title; must be nonempty.
    pub title: String,
}

/// Rename a conversation.
async fn rename_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ConversationUpdateTitle>,
) -> Result<Json<OkResponse>, ApiError> {
    let id: ConversationId = parse_id(&id)?;
    state.conversations.rename(id, &body.title).await?;
    Ok(Json(OK))
}

/// Append a step to the conversation log.
async fn append_step(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<NewStep>,
) -> Result<Json<OkResponse>, ApiError> {
    let id: ConversationId = parse_id(&id)?;
    state.conversations.append_step(id, body).await?;
    Ok(Json(OK))
}

/// Remove the last step, if any.
async fn undo_last(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<OkResponse>, ApiError> {
    let id: ConversationId = parse_id(&id)?;
    state.conversations.undo(id).await?;
    Ok(Json(OK))
}

/// Clear the step log.
async fn reset_steps(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<OkResponse>, ApiError> {
    let id: ConversationId = parse_id(&id)?;
    state.conversations.reset(id).await?;
    Ok(Json(OK))
}

/// State replacement request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationStateIn {
    /// Replacement pending steps.
    #[serde(default)]
    pub pending_steps: Vec<TemplateRef>,
    /// Replacement session state.
    #[serde(default)]
    pub session_state: Map<String, Value>,
}

/// Wholesale-replace a conversation's pending steps and session state.
async fn update_state(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ConversationStateIn>,
) -> Result<Json<OkResponse>, ApiError> {
    let id: ConversationId = parse_id(&id)?;
    state
        .conversations
        .update_state(id, body.pending_steps, body.session_state)
        .await?;
    Ok(Json(OK))
}
