//! HTTP surface: the extraction form endpoint, bookmark API and UI shell

use std::any::Any;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::rejection::{FormRejection, JsonRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Form, Json, Router};
use eyre::{Result, WrapErr};
use log::{debug, error, info, warn};
use serde::Deserialize;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::services::ServeDir;

use crate::Recipe;
use crate::bookmarks::BookmarkStore;
use crate::config::Config;
use crate::error::{AppError, INTERNAL_MESSAGE};
use crate::pipeline::Extractor;

const FALLBACK_INDEX: &str = r#"<!DOCTYPE html>
<html lang="ko">
<head>
    <meta charset="utf-8">
    <title>RecipeClip</title>
</head>
<body>
    <h1>RecipeClip</h1>
    <form method="post" action="/extract">
        <input type="url" name="url" placeholder="https://www.youtube.com/shorts/..." required>
        <button type="submit">레시피 추출</button>
    </form>
</body>
</html>
"#;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub extractor: Arc<Extractor>,
    pub bookmarks: Arc<BookmarkStore>,
    pub templates_dir: PathBuf,
    pub static_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
struct ExtractForm {
    #[serde(default)]
    url: String,
}

pub fn router(state: AppState) -> Router {
    let static_dir = state.static_dir.clone();
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/extract", post(extract))
        .route("/api/bookmarks", get(list_bookmarks).post(add_bookmark))
        .route("/api/bookmarks/:id", delete(delete_bookmark))
        .nest_service("/static", ServeDir::new(static_dir))
        .with_state(state)
        .layer(CatchPanicLayer::custom(panic_response))
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!("Handler panicked: {detail}");
    let body = serde_json::json!({ "error": INTERNAL_MESSAGE });
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}

/// Bind and serve until the process is stopped
pub async fn serve(config: &Config) -> Result<()> {
    let extractor = Extractor::from_config(config)?;
    if extractor.key_count() == 0 {
        warn!("No Gemini API keys configured; extraction requests will fail");
    }
    let state = AppState {
        extractor: Arc::new(extractor),
        bookmarks: Arc::new(BookmarkStore::new(&config.bookmarks_path)),
        templates_dir: config.templates_dir.clone(),
        static_dir: config.static_dir.clone(),
    };
    info!("Bookmarks stored at {}", state.bookmarks.path().display());

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .wrap_err_with(|| format!("failed to bind {addr}"))?;
    info!("Listening on http://{addr}");

    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn index(State(state): State<AppState>) -> Html<String> {
    let path = state.templates_dir.join("index.html");
    match tokio::fs::read_to_string(&path).await {
        Ok(html) => Html(html),
        Err(e) => {
            debug!("No template at {} ({e}), serving built-in page", path.display());
            Html(FALLBACK_INDEX.to_string())
        }
    }
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("GIT_DESCRIBE"),
        "keys": state.extractor.key_count(),
    }))
}

async fn extract(
    State(state): State<AppState>,
    payload: Result<Form<ExtractForm>, FormRejection>,
) -> Result<Json<Recipe>, AppError> {
    let Form(form) = payload.map_err(|rejection| {
        debug!("Rejected extract form: {}", rejection.body_text());
        AppError::InvalidUrl(String::new())
    })?;
    let recipe = state.extractor.extract(&form.url).await?;
    Ok(Json(recipe))
}

async fn list_bookmarks(State(state): State<AppState>) -> Json<Vec<crate::bookmarks::Bookmark>> {
    Json(state.bookmarks.list().await)
}

async fn add_bookmark(State(state): State<AppState>, payload: Result<Json<Recipe>, JsonRejection>) -> Response {
    let Json(recipe) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            debug!("Rejected bookmark payload: {}", rejection.body_text());
            let body = serde_json::json!({ "message": "레시피 형식이 올바르지 않습니다." });
            return (StatusCode::BAD_REQUEST, Json(body)).into_response();
        }
    };

    match state.bookmarks.add(recipe).await {
        Ok(id) => {
            let body = serde_json::json!({ "message": "레시피가 저장되었습니다.", "id": id });
            Json(body).into_response()
        }
        Err(e) => e.into_response_with_key("message"),
    }
}

async fn delete_bookmark(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.bookmarks.delete(&id).await {
        Ok(()) => Json(serde_json::json!({ "message": "북마크가 삭제되었습니다." })).into_response(),
        Err(e) => e.into_response_with_key("message"),
    }
}
