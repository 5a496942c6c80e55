use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::dto::{
    ChatRequest, ChatResponse, DeleteResponse, FileEntry, FileListResponse, QueryParams,
    QueryResponse, UploadResponse,
};
use super::retrieval::{self, compose_answer, extract_text, rank, DEFAULT_TOP_K};
use super::storage::is_safe_component;
use crate::{auth::extractors::AuthUser, error::AppError, state::AppState};

const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;
const MAX_TOP_K: usize = 50;

// --- public routers ---

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/files", get(list_files))
        .route("/files/:name", delete(delete_file))
        .route("/query", get(query_documents))
        .route("/chat", post(chat))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/upload", post(upload_file))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}

/// Storage prefix for a user; stable per email and free of path characters.
pub fn user_scope(email: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, email.as_bytes()).to_string()
}

// --- handlers ---

/// POST /upload (multipart, field `file`)
#[instrument(skip(state, mp))]
pub async fn upload_file(
    State(state): State<AppState>,
    user: AuthUser,
    mut mp: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), AppError> {
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field
            .file_name()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                AppError::BadRequest("Uploaded file must include a filename.".into())
            })?;
        if !is_safe_component(&filename) {
            return Err(AppError::BadRequest("Invalid filename.".into()));
        }

        let body = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        let content = extract_text(&filename, &body).map_err(|e| {
            warn!(%filename, "unsupported upload");
            AppError::BadRequest(e.to_string())
        })?;

        state
            .storage
            .put_object(&user_scope(&user.email), &filename, body)
            .await?;

        let content_length = content.chars().count();
        info!(email = %user.email, %filename, content_length, "document stored");
        return Ok((
            StatusCode::CREATED,
            Json(UploadResponse {
                message: "Document stored successfully".into(),
                filename,
                content_length,
            }),
        ));
    }

    Err(AppError::BadRequest("file is required".into()))
}

#[instrument(skip(state))]
pub async fn list_files(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<FileListResponse>, AppError> {
    let objects = state.storage.list_objects(&user_scope(&user.email)).await?;
    let files: Vec<FileEntry> = objects
        .into_iter()
        .map(|o| FileEntry {
            filename: o.name,
            size: o.size,
        })
        .collect();
    Ok(Json(FileListResponse {
        total_files: files.len(),
        files,
    }))
}

#[instrument(skip(state))]
pub async fn delete_file(
    State(state): State<AppState>,
    user: AuthUser,
    Path(name): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    if !is_safe_component(&name) {
        return Err(AppError::NotFound("File not found".into()));
    }
    let removed = state
        .storage
        .delete_object(&user_scope(&user.email), &name)
        .await?;
    if !removed {
        return Err(AppError::NotFound("File not found".into()));
    }
    info!(email = %user.email, filename = %name, "document deleted");
    Ok(Json(DeleteResponse {
        message: "File deleted successfully".into(),
        filename: name,
    }))
}

#[instrument(skip(state))]
pub async fn query_documents(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<QueryParams>,
) -> Result<Json<QueryResponse>, AppError> {
    let query = params.query.trim().to_string();
    if query.is_empty() {
        return Err(AppError::BadRequest("Query cannot be empty.".into()));
    }
    let sources = retrieve(&state, &user, &query, params.top_k).await?;
    Ok(Json(QueryResponse {
        response: compose_answer(&sources),
        query,
        sources,
    }))
}

#[instrument(skip(state, body))]
pub async fn chat(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let message = body.message.trim();
    if message.is_empty() {
        return Err(AppError::BadRequest("Message cannot be empty.".into()));
    }
    debug!(history = body.chat_history.len(), "chat request");
    let sources = retrieve(&state, &user, message, body.top_k).await?;
    Ok(Json(ChatResponse {
        response: compose_answer(&sources),
        sources,
    }))
}

async fn retrieve(
    state: &AppState,
    user: &AuthUser,
    query: &str,
    top_k: Option<usize>,
) -> Result<Vec<retrieval::Passage>, AppError> {
    let scope = user_scope(&user.email);
    let mut documents = Vec::new();
    for object in state.storage.list_objects(&scope).await? {
        let Some(body) = state.storage.get_object(&scope, &object.name).await? else {
            continue;
        };
        if let Ok(text) = extract_text(&object.name, &body) {
            documents.push((object.name, text));
        }
    }
    let top_k = top_k.unwrap_or(DEFAULT_TOP_K).clamp(1, MAX_TOP_K);
    Ok(rank(query, &documents, top_k))
}
