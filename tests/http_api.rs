//! HTTP-surface scenario tests, run against a stubbed driver so nothing
//! here ever touches a real browser or the OS clipboard.

mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::{send_empty, send_json, test_app};

/// Scenario: pool size 1. A acquires; B queues at position 1. Releasing A
/// hands the slot straight to B, and status reflects an empty queue with
/// slot 0 busy under B.
#[tokio::test]
async fn queued_request_is_assigned_on_release() {
    let app = test_app(1, 10, 300);

    let (status, body) = send_json(&app, "POST", "/api/session/acquire", None, json!({"owner": "A"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "acquired");
    let slot_id = body["slot_id"].as_u64().unwrap();
    let token_a = body["lease_token"].as_str().unwrap().to_string();

    let (status, body) = send_json(&app, "POST", "/api/session/acquire", None, json!({"owner": "B"})).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "queued");
    assert_eq!(body["queue_position"], 1);

    let (status, _) = send_empty(
        &app,
        "POST",
        &format!("/api/session/{slot_id}/release"),
        Some(&token_a),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send_empty(&app, "GET", "/api/pool/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["queue_depth"], 0);
    let slots = body["slots"].as_array().unwrap();
    assert_eq!(slots[0]["state"], "busy");
    assert_eq!(slots[0]["owner"], "B");
}

/// Scenario: pool size 1, queue max 1. A acquires, B queues, C is rejected
/// with the pool-exhausted details.
#[tokio::test]
async fn third_request_is_rejected_when_queue_is_full() {
    let app = test_app(1, 1, 300);

    send_json(&app, "POST", "/api/session/acquire", None, json!({"owner": "A"})).await;
    let (status, body) = send_json(&app, "POST", "/api/session/acquire", None, json!({"owner": "B"})).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "queued");

    let (status, body) = send_json(&app, "POST", "/api/session/acquire", None, json!({"owner": "C"})).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "rejected");
    assert_eq!(body["total_slots"], 1);
    assert_eq!(body["queue_depth"], 1);
    assert_eq!(body["queue_max"], 1);
}

/// Scenario: reattach is idempotent — acquiring again for an owner that
/// already holds a slot returns the same slot and token, flagged reattached.
#[tokio::test]
async fn reattach_returns_same_slot_and_token() {
    let app = test_app(2, 10, 300);

    let (_, first) = send_json(&app, "POST", "/api/session/acquire", None, json!({"owner": "A"})).await;
    let (status, second) = send_json(&app, "POST", "/api/session/acquire", None, json!({"owner": "A"})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["status"], "acquired");
    assert_eq!(second["reattached"], true);
    assert_eq!(second["slot_id"], first["slot_id"]);
    assert_eq!(second["lease_token"], first["lease_token"]);
}

/// Scenario: an invalid lease token on send is rejected with 403 before any
/// driver interaction, and an unknown slot id is rejected with 404.
#[tokio::test]
async fn invalid_token_is_forbidden_and_unknown_slot_is_not_found() {
    let app = test_app(1, 10, 300);

    send_json(&app, "POST", "/api/session/acquire", None, json!({"owner": "A"})).await;

    let (status, body) = send_json(
        &app,
        "POST",
        "/api/session/0/send",
        Some("not-the-real-token"),
        json!({"message": "ping", "merge_paths": [], "file_paths": []}),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "invalid_token");

    let (status, body) = send_json(
        &app,
        "POST",
        "/api/session/99/send",
        Some("whatever"),
        json!({"message": "ping", "merge_paths": [], "file_paths": []}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
}

/// Scenario: a released (no longer BUSY) slot reports lease-expired for an
/// otherwise well-formed token.
#[tokio::test]
async fn send_after_release_is_lease_expired() {
    let app = test_app(1, 10, 300);

    let (_, acquired) = send_json(&app, "POST", "/api/session/acquire", None, json!({"owner": "A"})).await;
    let token = acquired["lease_token"].as_str().unwrap().to_string();

    send_empty(&app, "POST", "/api/session/0/release", Some(&token)).await;

    let (status, body) = send_json(
        &app,
        "POST",
        "/api/session/0/send",
        Some(&token),
        json!({"message": "ping", "merge_paths": [], "file_paths": []}),
    )
    .await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(body["error"]["code"], "lease_expired");
}

/// Scenario: sending a header-less request is rejected with 400, distinctly
/// from an invalid-token 403 — a missing credential is a validation error,
/// not an authorization failure.
#[tokio::test]
async fn send_without_lease_header_is_a_validation_error() {
    let app = test_app(1, 10, 300);
    send_json(&app, "POST", "/api/session/acquire", None, json!({"owner": "A"})).await;

    let (status, body) = send_json(
        &app,
        "POST",
        "/api/session/0/send",
        None,
        json!({"message": "ping", "merge_paths": [], "file_paths": []}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation");
}

/// Scenario: 10 file_paths is rejected (max is 9 by default), 1 missing path
/// is rejected, and an empty owner on acquire is rejected the same way.
#[tokio::test]
async fn file_path_validation_rejects_too_many_and_missing_paths() {
    let app = test_app(1, 10, 300);
    let (_, acquired) = send_json(&app, "POST", "/api/session/acquire", None, json!({"owner": "A"})).await;
    let token = acquired["lease_token"].as_str().unwrap().to_string();

    let too_many: Vec<String> = (0..10).map(|i| format!("/tmp/does-not-exist-{i}")).collect();
    let (status, body) = send_json(
        &app,
        "POST",
        "/api/session/0/send",
        Some(&token),
        json!({"message": "hi", "merge_paths": [], "file_paths": too_many}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation");

    let (status, body) = send_json(
        &app,
        "POST",
        "/api/session/0/send",
        Some(&token),
        json!({"message": "hi", "merge_paths": [], "file_paths": ["/tmp/gem-pool-missing-file"]}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation");

    let (status, body) = send_json(&app, "POST", "/api/session/acquire", None, json!({"owner": "  "})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation");
}

/// Scenario: merge_paths content is read, formatted, and prepended before
/// being validated against the missing-merge-path check. A merge path that
/// doesn't exist is a validation error, same as a missing file_path.
#[tokio::test]
async fn missing_merge_path_is_a_validation_error() {
    let app = test_app(1, 10, 300);
    let (_, acquired) = send_json(&app, "POST", "/api/session/acquire", None, json!({"owner": "A"})).await;
    let token = acquired["lease_token"].as_str().unwrap().to_string();

    let (status, body) = send_json(
        &app,
        "POST",
        "/api/session/0/send",
        Some(&token),
        json!({"message": "hi", "merge_paths": ["/tmp/gem-pool-missing-merge-file"], "file_paths": []}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation");
}

#[tokio::test]
async fn health_and_status_report_ok_and_slot_counts() {
    let app = test_app(3, 10, 300);

    let (status, body) = send_empty(&app, "GET", "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("ok"));

    let (status, body) = send_empty(&app, "GET", "/api/pool/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_slots"], 3);
    assert_eq!(body["free_slots"], 3);
    assert_eq!(body["system"]["driver_up"], true);
}

#[tokio::test]
async fn pool_reset_reports_available_slots() {
    let app = test_app(2, 10, 300);
    send_json(&app, "POST", "/api/session/acquire", None, json!({"owner": "A"})).await;

    let (status, body) = send_empty(&app, "POST", "/api/pool/reset", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reset"], true);
    assert_eq!(body["slots_available"], 2);
}

#[tokio::test]
async fn slot_reset_reports_resulting_state() {
    let app = test_app(1, 10, 300);

    let (status, body) = send_empty(&app, "POST", "/api/pool/slot/0/reset", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["slot_id"], 0);
    assert_eq!(body["state"], "free");
}
