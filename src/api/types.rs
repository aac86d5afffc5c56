//! API request and response types

use serde::{Deserialize, Serialize};

/// Request to acquire (or reattach to) a slot.
#[derive(Debug, Deserialize)]
pub struct AcquireRequest {
    pub owner: String,
}

/// Request to send a message on a held slot, identified by the
/// `X-Lease-Token` header rather than a body field. `merge_paths` are read
/// as text and folded into the message before sending; `file_paths` are
/// uploaded as attachments. Validated against the configured per-turn file
/// limit by the handler, not here.
#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub message: String,
    #[serde(default)]
    pub merge_paths: Vec<String>,
    #[serde(default)]
    pub file_paths: Vec<String>,
}

/// Response body for a completed send.
#[derive(Debug, Serialize)]
pub struct SendResponse {
    pub response: String,
    pub duration_ms: u64,
    pub format: &'static str,
}

/// Response body for a successful release.
#[derive(Debug, Serialize)]
pub struct ReleaseResponse {
    pub released: bool,
}

/// Response body for `/api/pool/reset`.
#[derive(Debug, Serialize)]
pub struct PoolResetResponse {
    pub reset: bool,
    pub slots_available: usize,
}

/// Response body for `/api/pool/slot/:id/reset`.
#[derive(Debug, Serialize)]
pub struct SlotResetResponse {
    pub slot_id: u32,
    pub state: &'static str,
}

/// Response body for `/api/shutdown`.
#[derive(Debug, Serialize)]
pub struct ShutdownResponse {
    pub shutting_down: bool,
}
