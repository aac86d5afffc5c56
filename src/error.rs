//! Typed pool errors and their HTTP surface mapping.
//!
//! One enum owns every error kind named in the error-handling design: the
//! variant decides both the stable `code` string returned to clients and the
//! HTTP status, so the two can never drift apart.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("slot {0} is not currently leased (lease expired)")]
    LeaseExpired(u32),

    #[error("invalid lease token for slot {0}")]
    InvalidToken(u32),

    #[error("slot {0} does not exist")]
    NotFound(u32),

    #[error("pool exhausted: {total_slots} slots, queue depth {queue_depth}/{queue_max}")]
    PoolExhausted {
        total_slots: usize,
        queue_depth: usize,
        queue_max: usize,
    },

    #[error("send on slot {0} timed out")]
    SendTimeout(u32),

    #[error("response was stopped before completion on slot {0}")]
    ResponseStopped(u32),

    #[error("response was empty on slot {0}")]
    ResponseEmpty(u32),

    #[error("paste verification failed on slot {0} after {1} attempts")]
    PasteVerificationFailed(u32, u32),

    #[error("driver error: {0}")]
    Driver(String),

    #[error("browser context is dead")]
    ContextDead,

    #[error("validation error: {0}")]
    Validation(String),
}

impl PoolError {
    pub fn code(&self) -> &'static str {
        match self {
            PoolError::LeaseExpired(_) => "lease_expired",
            PoolError::InvalidToken(_) => "invalid_token",
            PoolError::NotFound(_) => "not_found",
            PoolError::PoolExhausted { .. } => "pool_exhausted",
            PoolError::SendTimeout(_) => "send_timeout",
            PoolError::ResponseStopped(_) => "response_stopped",
            PoolError::ResponseEmpty(_) => "response_empty",
            PoolError::PasteVerificationFailed(..) => "paste_verification_failed",
            PoolError::Driver(_) => "driver_error",
            PoolError::ContextDead => "context_dead",
            PoolError::Validation(_) => "validation",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            PoolError::LeaseExpired(_) => StatusCode::GONE,
            PoolError::InvalidToken(_) => StatusCode::FORBIDDEN,
            PoolError::NotFound(_) => StatusCode::NOT_FOUND,
            PoolError::PoolExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
            PoolError::Validation(_) => StatusCode::BAD_REQUEST,
            PoolError::SendTimeout(_)
            | PoolError::ResponseStopped(_)
            | PoolError::ResponseEmpty(_)
            | PoolError::PasteVerificationFailed(..)
            | PoolError::Driver(_)
            | PoolError::ContextDead => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

impl IntoResponse for PoolError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.code(), "request failed");
        } else {
            tracing::warn!(error = %self, code = self.code(), "request rejected");
        }
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.code(),
                message: self.to_string(),
            },
        };
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_matches_design() {
        assert_eq!(PoolError::LeaseExpired(0).status(), StatusCode::GONE);
        assert_eq!(PoolError::InvalidToken(0).status(), StatusCode::FORBIDDEN);
        assert_eq!(PoolError::NotFound(0).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            PoolError::PoolExhausted {
                total_slots: 1,
                queue_depth: 1,
                queue_max: 1
            }
            .status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            PoolError::Validation("bad".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            PoolError::Driver("boom".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn codes_are_stable_strings() {
        assert_eq!(PoolError::ContextDead.code(), "context_dead");
        assert_eq!(
            PoolError::PasteVerificationFailed(2, 3).code(),
            "paste_verification_failed"
        );
    }
}
