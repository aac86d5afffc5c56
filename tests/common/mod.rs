//! Shared fixtures for HTTP-surface integration tests: a no-op `Driver` stub
//! and a router builder wired the way `main.rs` wires the real one.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use tower::ServiceExt;

use gem_pool::api::{create_router, AppState};
use gem_pool::clipboard::ClipboardExtractor;
use gem_pool::config::AppConfig;
use gem_pool::driver::{Driver, PageHandle};
use gem_pool::error::PoolError;
use gem_pool::pool::Pool;
use gem_pool::slot::Slot;

/// A `Driver` that never touches a real browser. Good enough for every
/// scenario that doesn't reach the clipboard-backed send protocol (lease
/// validation, queueing, rejection, and validation all fail before that
/// point).
pub struct StubDriver;

#[async_trait]
impl Driver for StubDriver {
    async fn start(&self) -> Result<(), PoolError> {
        Ok(())
    }
    async fn create_slot_page(&self) -> Result<PageHandle, PoolError> {
        Ok(PageHandle::default_for_test())
    }
    async fn open_blank_page(&self) -> Result<PageHandle, PoolError> {
        Ok(PageHandle::default_for_test())
    }
    async fn restart_slot_page(&self, _old: PageHandle) -> Result<PageHandle, PoolError> {
        Ok(PageHandle::default_for_test())
    }
    async fn navigate_to_new_chat(&self, _page: PageHandle) -> Result<(), PoolError> {
        Ok(())
    }
    async fn is_logged_in(&self, _page: PageHandle) -> bool {
        true
    }
    async fn is_enterprise(&self, _page: PageHandle) -> bool {
        false
    }
    async fn wait_for_login(&self, _page: PageHandle) -> bool {
        true
    }
    async fn detect_errors(&self, _page: PageHandle) -> Option<String> {
        None
    }
    async fn check_context_alive(&self) -> bool {
        true
    }
    async fn check_page_alive(&self, _page: PageHandle) -> bool {
        true
    }
    async fn restart_browser(&self) -> Result<(), PoolError> {
        Ok(())
    }
    async fn response_count(&self, _page: PageHandle) -> Result<usize, PoolError> {
        Ok(0)
    }
    async fn is_generating(&self, _page: PageHandle) -> Result<bool, PoolError> {
        Ok(false)
    }
    async fn last_response_text(&self, _page: PageHandle) -> Result<Option<String>, PoolError> {
        Ok(None)
    }
    async fn click_role(
        &self,
        _page: PageHandle,
        _role: &str,
        _force: bool,
    ) -> Result<bool, PoolError> {
        Ok(true)
    }
    async fn is_role_visible(&self, _page: PageHandle, _role: &str) -> Result<bool, PoolError> {
        Ok(false)
    }
    async fn focus_and_clear(&self, _page: PageHandle, _role: &str) -> Result<(), PoolError> {
        Ok(())
    }
    async fn press_enter(&self, _page: PageHandle) -> Result<(), PoolError> {
        Ok(())
    }
    async fn paste_shortcut(&self, _page: PageHandle, _role: &str) -> Result<(), PoolError> {
        Ok(())
    }
    async fn editor_text(&self, _page: PageHandle, _role: &str) -> Result<String, PoolError> {
        Ok(String::new())
    }
    async fn upload_files(&self, _page: PageHandle, _files: &[String]) -> Result<(), PoolError> {
        Ok(())
    }
    async fn send_affordance_disabled(&self, _page: PageHandle) -> Result<bool, PoolError> {
        Ok(false)
    }
    async fn click_copy_button(&self, _page: PageHandle) -> Result<bool, PoolError> {
        Ok(false)
    }
    async fn read_in_page_clipboard(&self, _page: PageHandle) -> Result<Option<String>, PoolError> {
        Ok(None)
    }
    async fn dom_scrape_response(&self, _page: PageHandle) -> Result<String, PoolError> {
        Ok(String::new())
    }
}

/// Build a router over an `N`-slot pool with the given queue depth and
/// inactivity timeout, all backed by [`StubDriver`].
pub fn test_app(pool_size: usize, max_queue_depth: usize, inactivity_timeout_s: u64) -> Router {
    let mut config = AppConfig::default();
    config.pool.size = pool_size;
    config.pool.max_queue_depth = max_queue_depth;
    config.pool.inactivity_timeout_s = inactivity_timeout_s;

    let slots: Vec<Slot> = (0..pool_size as u32)
        .map(|id| Slot::new(id, PageHandle::default_for_test()))
        .collect();

    let driver: Arc<dyn Driver> = Arc::new(StubDriver);
    let dir = tempfile::tempdir().expect("tempdir");
    let extractor = ClipboardExtractor::new(dir.path().join("lock"));
    // Leak the tempdir so it outlives the router; tests are short-lived
    // processes and this avoids threading a guard through every call site.
    std::mem::forget(dir);

    let pool = Pool::new(slots, driver, extractor, &config);
    let state = AppState::new(pool, Arc::new(config));
    create_router(state)
}

pub async fn send_json(
    app: &Router,
    method: &str,
    uri: &str,
    lease_token: Option<&str>,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = lease_token {
        builder = builder.header("x-lease-token", token);
    }
    let request = builder
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();

    let response: Response<Body> = app.clone().oneshot(request).await.unwrap();
    response_json(response).await
}

pub async fn send_empty(
    app: &Router,
    method: &str,
    uri: &str,
    lease_token: Option<&str>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = lease_token {
        builder = builder.header("x-lease-token", token);
    }
    let request = builder.body(Body::empty()).unwrap();

    let response: Response<Body> = app.clone().oneshot(request).await.unwrap();
    response_json(response).await
}

async fn response_json(response: Response<Body>) -> (StatusCode, serde_json::Value) {
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}
