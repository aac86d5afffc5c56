//! HTTP API for the session pool service.

mod handlers;
mod types;

pub use handlers::create_router;
#[allow(unused_imports)] // public API re-exports
pub use types::*;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::pool::Pool;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<Pool>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(pool: Arc<Pool>, config: Arc<AppConfig>) -> Self {
        Self { pool, config }
    }
}
