use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::async_trait;
use axum::extract::{FromRequestParts, Path, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, patch};
use axum::{Json, Router};
use pagemark_shared::{
    valid_id, NoteUpdate, ProgressPatch, ReadingEntry, ReadingProgress, StickyNote, Stroke,
};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::error::{AppError, Result};
use crate::logic;
use crate::state::AppState;

pub const USER_HEADER: &str = "x-user-id";

/// The reader on whose behalf a request is made, taken from `x-user-id`.
pub struct Reader(pub String);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Reader {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        let user_id = parts
            .headers
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| valid_id(value))
            .ok_or(AppError::Unauthorized)?;
        Ok(Reader(user_id.to_string()))
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

fn page_number(page: u32) -> Result<u32> {
    if page == 0 {
        return Err(AppError::BadRequest("pages start at 1".into()));
    }
    Ok(page)
}

pub async fn ping_handler() -> impl IntoResponse {
    StatusCode::NO_CONTENT
}

pub async fn list_strokes(
    State(state): State<AppState>,
    Path((document_id, page)): Path<(String, u32)>,
    Reader(user_id): Reader,
) -> Result<Json<Vec<Stroke>>> {
    let page = page_number(page)?;
    let document = state.document(&document_id).await?;
    let document = document.read().await;
    Ok(Json(logic::list_strokes(&document.snapshot, &user_id, page)))
}

pub async fn insert_stroke(
    State(state): State<AppState>,
    Path((document_id, page)): Path<(String, u32)>,
    Reader(user_id): Reader,
    Json(stroke): Json<Stroke>,
) -> Result<(StatusCode, Json<Stroke>)> {
    let page = page_number(page)?;
    let document = state.document(&document_id).await?;
    let mut document = document.write().await;
    let stroke = logic::insert_stroke(&mut document.snapshot, &user_id, page, stroke)?;
    document.dirty = true;
    tracing::debug!(%document_id, page, stroke = %stroke.id, "stroke stored");
    Ok((StatusCode::CREATED, Json(stroke)))
}

pub async fn clear_strokes(
    State(state): State<AppState>,
    Path((document_id, page)): Path<(String, u32)>,
    Reader(user_id): Reader,
) -> Result<StatusCode> {
    let page = page_number(page)?;
    let document = state.document(&document_id).await?;
    let mut document = document.write().await;
    if logic::clear_strokes(&mut document.snapshot, &user_id, page) > 0 {
        document.dirty = true;
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_notes(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
    Reader(user_id): Reader,
) -> Result<Json<Vec<StickyNote>>> {
    let document = state.document(&document_id).await?;
    let document = document.read().await;
    Ok(Json(logic::list_notes(&document.snapshot, &user_id)))
}

pub async fn insert_note(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
    Reader(user_id): Reader,
    Json(note): Json<StickyNote>,
) -> Result<(StatusCode, Json<StickyNote>)> {
    let document = state.document(&document_id).await?;
    let mut document = document.write().await;
    let note = logic::insert_note(&mut document.snapshot, &user_id, note)?;
    document.dirty = true;
    Ok((StatusCode::CREATED, Json(note)))
}

pub async fn update_note(
    State(state): State<AppState>,
    Path((document_id, note_id)): Path<(String, String)>,
    Reader(user_id): Reader,
    Json(update): Json<NoteUpdate>,
) -> Result<Json<StickyNote>> {
    let document = state.document(&document_id).await?;
    let mut document = document.write().await;
    let note = logic::update_note(&mut document.snapshot, &user_id, &note_id, &update)?;
    if !update.is_empty() {
        document.dirty = true;
    }
    Ok(Json(note))
}

pub async fn delete_note(
    State(state): State<AppState>,
    Path((document_id, note_id)): Path<(String, String)>,
    Reader(user_id): Reader,
) -> Result<StatusCode> {
    let document = state.document(&document_id).await?;
    let mut document = document.write().await;
    logic::delete_note(&mut document.snapshot, &user_id, &note_id)?;
    document.dirty = true;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn reading_entry(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
    Reader(user_id): Reader,
) -> Result<Json<ReadingEntry>> {
    let document = state.document(&document_id).await?;
    let document = document.read().await;
    logic::reading_entry(&document.snapshot, &user_id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("{document_id} is not in the reading list")))
}

pub async fn add_to_reading_list(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
    Reader(user_id): Reader,
) -> Result<StatusCode> {
    let document = state.document(&document_id).await?;
    let mut document = document.write().await;
    if logic::set_reading(&mut document.snapshot, &user_id, true) {
        document.dirty = true;
        return Ok(StatusCode::CREATED);
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn remove_from_reading_list(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
    Reader(user_id): Reader,
) -> Result<StatusCode> {
    let document = state.document(&document_id).await?;
    let mut document = document.write().await;
    if logic::set_reading(&mut document.snapshot, &user_id, false) {
        document.dirty = true;
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn record_progress(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
    Reader(user_id): Reader,
    Json(patch): Json<ProgressPatch>,
) -> Result<Json<ReadingProgress>> {
    let document = state.document(&document_id).await?;
    let mut document = document.write().await;
    let progress = logic::record_progress(&mut document.snapshot, &user_id, patch, now_ms())?;
    document.dirty = true;
    tracing::debug!(%document_id, page = progress.page, "progress recorded");
    Ok(Json(progress))
}

pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(ping_handler))
        .route(
            "/documents/:document_id/pages/:page/strokes",
            get(list_strokes).post(insert_stroke).delete(clear_strokes),
        )
        .route(
            "/documents/:document_id/notes",
            get(list_notes).post(insert_note),
        )
        .route(
            "/documents/:document_id/notes/:note_id",
            patch(update_note).delete(delete_note),
        )
        .route(
            "/reading-list/:document_id",
            get(reading_entry)
                .put(add_to_reading_list)
                .delete(remove_from_reading_list),
        )
        .route("/reading-list/:document_id/progress", patch(record_progress))
}

/// The persistence API under `/api`, with the viewer bundle served from `public_dir`.
pub fn app(state: AppState, public_dir: PathBuf) -> Router {
    Router::new()
        .nest("/api", api_router())
        .fallback_service(ServeDir::new(public_dir).append_index_html_on_directories(true))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
