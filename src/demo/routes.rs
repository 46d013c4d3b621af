use super::note::Note;
use crate::error::EngineError;
use crate::identity::Principal;
use crate::pipeline::{BatchResult, ListParams, Manager, Owner, SearchParams};
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub notes: Arc<Manager<Note>>,
}

/// Resolves the caller's principal from a header. Token issuance and
/// verification are out of scope for this engine; transport layers are
/// expected to replace this with a real session/token lookup
/// before handing a `Principal` to the pipeline.
fn principal_from_headers(headers: &HeaderMap) -> Result<Principal, EngineError> {
    let raw = headers
        .get("x-principal-id")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| EngineError::Validation("missing x-principal-id header".into()))?;
    let id = Uuid::parse_str(raw).map_err(|_| EngineError::Validation("x-principal-id is not a UUID".into()))?;
    Ok(Principal(id))
}

#[derive(Debug, Deserialize)]
struct CreateNoteRequest {
    note: Note,
    #[serde(default)]
    parent_note: Option<Uuid>,
}

async fn create_note(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateNoteRequest>,
) -> Result<Json<Note>, EngineError> {
    let principal = principal_from_headers(&headers)?;
    let mut references = HashMap::new();
    if let Some(parent) = body.parent_note {
        references.insert("parent_note".to_string(), parent);
    }
    let owner = Owner { user_id: body.note.user_id, team_id: body.note.team_id };
    let note = state.notes.create(principal, body.note, references, owner, None).await?;
    Ok(Json(note))
}

async fn get_note(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Note>, EngineError> {
    let principal = principal_from_headers(&headers)?;
    let note = state.notes.get(principal, id, &ListParams::default()).await?;
    Ok(Json(note))
}

#[derive(Debug, Deserialize, Default)]
struct ListQuery {
    #[serde(default)]
    limit: Option<i64>,
    #[serde(default)]
    offset: Option<i64>,
}

async fn list_notes(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Note>>, EngineError> {
    let principal = principal_from_headers(&headers)?;
    let params = ListParams {
        limit: query.limit.unwrap_or(50),
        offset: query.offset.unwrap_or(0),
        ..ListParams::default()
    };
    let notes = state.notes.list(principal, &params).await?;
    Ok(Json(notes))
}

async fn search_notes(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(params): Json<SearchRequest>,
) -> Result<Json<Vec<Note>>, EngineError> {
    let principal = principal_from_headers(&headers)?;
    let mut clauses = HashMap::new();
    for (field, raw) in &params.note {
        clauses.insert(field.clone(), crate::pipeline::parse_clause(field, raw)?);
    }
    let search = SearchParams {
        clauses,
        transformer_params: params.transformers,
        list: ListParams::default(),
    };
    let notes = state.notes.search(principal, &search).await?;
    Ok(Json(notes))
}

#[derive(Debug, Deserialize, Default)]
struct SearchRequest {
    #[serde(default)]
    note: HashMap<String, serde_json::Value>,
    #[serde(default)]
    transformers: HashMap<String, serde_json::Value>,
}

async fn update_note(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(patch): Json<serde_json::Value>,
) -> Result<Json<Note>, EngineError> {
    let principal = principal_from_headers(&headers)?;
    let note = state.notes.update(principal, id, patch, None).await?;
    Ok(Json(note))
}

async fn delete_note(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<(), EngineError> {
    let principal = principal_from_headers(&headers)?;
    state.notes.delete(principal, id, None).await
}

#[derive(Debug, Deserialize)]
struct BatchUpdateRequest {
    note: serde_json::Value,
    target_ids: Vec<Uuid>,
}

async fn batch_update_notes(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<BatchUpdateRequest>,
) -> Result<Json<BatchSummary>, EngineError> {
    let principal = principal_from_headers(&headers)?;
    let items = body.target_ids.into_iter().map(|id| (id, body.note.clone())).collect();
    let result = state.notes.batch_update(principal, items).await;
    Ok(Json(BatchSummary::from(result)))
}

#[derive(Debug, Deserialize)]
struct BatchDeleteQuery {
    target_ids: String,
}

async fn batch_delete_notes(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<BatchDeleteQuery>,
) -> Result<Json<BatchSummary<Uuid>>, EngineError> {
    let principal = principal_from_headers(&headers)?;
    let ids: Vec<Uuid> = query
        .target_ids
        .split(',')
        .filter(|s| !s.is_empty())
        .filter_map(|s| Uuid::parse_str(s.trim()).ok())
        .collect();
    let result = state.notes.batch_delete(principal, ids).await;
    Ok(Json(BatchSummary::from(result)))
}

#[derive(Debug, serde::Serialize)]
struct BatchSummary<T = Note> {
    succeeded: Vec<T>,
    errors: Vec<BatchErrorItem>,
}

#[derive(Debug, serde::Serialize)]
struct BatchErrorItem {
    id: Uuid,
    error: String,
}

impl<T> From<BatchResult<T>> for BatchSummary<T> {
    fn from(result: BatchResult<T>) -> Self {
        BatchSummary {
            succeeded: result.succeeded,
            errors: result
                .failed
                .into_iter()
                .map(|item| BatchErrorItem { id: item.id, error: item.error })
                .collect(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/notes", post(create_note).get(list_notes))
        .route("/notes/search", post(search_notes))
        .route("/notes/batch_update", patch(batch_update_notes))
        .route("/notes/batch_delete", delete(batch_delete_notes))
        .route("/notes/:id", get(get_note).patch(update_note).delete(delete_note))
        .with_state(state)
}
