//! HTTP request handlers for the session pool's REST surface.

use std::path::Path;

use axum::extract::{Path as AxumPath, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use super::types::{
    AcquireRequest, PoolResetResponse, ReleaseResponse, SendRequest, SendResponse,
    ShutdownResponse, SlotResetResponse,
};
use super::AppState;
use crate::error::PoolError;
use crate::pool::AcquireResult;

const LEASE_TOKEN_HEADER: &str = "x-lease-token";

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/session/acquire", post(acquire))
        .route("/api/session/:slot_id/send", post(send))
        .route("/api/session/:slot_id/release", post(release))
        .route("/api/pool/status", get(pool_status))
        .route("/api/pool/reset", post(pool_reset))
        .route("/api/pool/slot/:slot_id/reset", post(slot_reset))
        .route("/api/health", get(health))
        .route("/api/shutdown", post(shutdown))
        .with_state(state)
}

fn lease_token(headers: &HeaderMap) -> Result<&str, PoolError> {
    headers
        .get(LEASE_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| PoolError::Validation("missing X-Lease-Token header".into()))
}

async fn acquire(
    State(state): State<AppState>,
    Json(req): Json<AcquireRequest>,
) -> impl IntoResponse {
    if req.owner.trim().is_empty() {
        return PoolError::Validation("owner must not be empty".into()).into_response();
    }

    let result = state.pool.acquire(req.owner).await;
    let status = match &result {
        AcquireResult::Acquired { .. } => StatusCode::OK,
        AcquireResult::Queued { .. } => StatusCode::ACCEPTED,
        AcquireResult::Rejected { .. } => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(result)).into_response()
}

async fn send(
    State(state): State<AppState>,
    AxumPath(slot_id): AxumPath<u32>,
    headers: HeaderMap,
    Json(req): Json<SendRequest>,
) -> Result<Json<SendResponse>, PoolError> {
    let token = lease_token(&headers)?;

    if req.file_paths.len() > state.config.browser.max_files_per_turn {
        return Err(PoolError::Validation(format!(
            "at most {} files may be attached per turn, got {}",
            state.config.browser.max_files_per_turn,
            req.file_paths.len()
        )));
    }

    for path in &req.file_paths {
        if !Path::new(path).exists() {
            return Err(PoolError::Validation(format!("file path does not exist: {path}")));
        }
    }

    let merged_text = merge_text_content(&req.message, &req.merge_paths)?;

    let started = tokio::time::Instant::now();
    let extracted = state
        .pool
        .send(slot_id, token, &merged_text, &req.file_paths)
        .await?;

    Ok(Json(SendResponse {
        response: extracted.text,
        duration_ms: started.elapsed().as_millis() as u64,
        format: extracted.format,
    }))
}

async fn release(
    State(state): State<AppState>,
    AxumPath(slot_id): AxumPath<u32>,
    headers: HeaderMap,
) -> Result<Json<ReleaseResponse>, PoolError> {
    let token = lease_token(&headers)?;
    state.pool.release(slot_id, token).await?;
    Ok(Json(ReleaseResponse { released: true }))
}

async fn pool_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.pool.get_status().await)
}

async fn pool_reset(State(state): State<AppState>) -> Result<Json<PoolResetResponse>, PoolError> {
    let slots_available = state.pool.reset_all().await?;
    Ok(Json(PoolResetResponse {
        reset: true,
        slots_available,
    }))
}

async fn slot_reset(
    State(state): State<AppState>,
    AxumPath(slot_id): AxumPath<u32>,
) -> Result<Json<SlotResetResponse>, PoolError> {
    let resulting_state = state.pool.reset_slot(slot_id).await?;
    Ok(Json(SlotResetResponse {
        slot_id,
        state: resulting_state.as_str(),
    }))
}

async fn health() -> Json<&'static str> {
    Json("ok")
}

/// Send `SIGINT` to this process after a short delay so in-flight requests
/// have a chance to finish, then let the normal shutdown path run.
async fn shutdown() -> Json<ShutdownResponse> {
    tokio::spawn(async {
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        if let Err(e) = nix::sys::signal::raise(nix::sys::signal::Signal::SIGINT) {
            tracing::error!(error = %e, "failed to deliver shutdown signal");
        }
    });
    Json(ShutdownResponse { shutting_down: true })
}

/// Read each `merge_paths` entry as text (UTF-8, falling back to a
/// single-byte Latin-1 decode for files that aren't valid UTF-8), format it
/// as `=== {basename} ===\n{content}`, join the results with a blank line,
/// and prepend the lot to `text` followed by two newlines.
fn merge_text_content(text: &str, merge_paths: &[String]) -> Result<String, PoolError> {
    if merge_paths.is_empty() {
        return Ok(text.to_string());
    }

    let mut sections = Vec::with_capacity(merge_paths.len());
    for path in merge_paths {
        let bytes = std::fs::read(path).map_err(|e| {
            PoolError::Validation(format!("could not read merge path {path}: {e}"))
        })?;
        let content = String::from_utf8(bytes.clone()).unwrap_or_else(|_| {
            bytes.iter().map(|&b| b as char).collect::<String>()
        });
        let basename = Path::new(path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.clone());
        sections.push(format!("=== {basename} ===\n{content}"));
    }

    Ok(format!("{}\n\n{}", sections.join("\n\n"), text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_with_no_paths_returns_text_unchanged() {
        assert_eq!(merge_text_content("hello", &[]).unwrap(), "hello");
    }

    #[test]
    fn merge_formats_and_prepends_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "line one\nline two").unwrap();

        let merged = merge_text_content("the question", &[path.to_string_lossy().into_owned()]).unwrap();
        assert!(merged.starts_with("=== notes.txt ===\nline one\nline two\n\nthe question"));
    }

    #[test]
    fn merge_joins_multiple_sections_with_blank_line() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        std::fs::write(&a, "A").unwrap();
        std::fs::write(&b, "B").unwrap();

        let merged = merge_text_content(
            "q",
            &[a.to_string_lossy().into_owned(), b.to_string_lossy().into_owned()],
        )
        .unwrap();
        assert_eq!(merged, "=== a.txt ===\nA\n\n=== b.txt ===\nB\n\nq");
    }
}
