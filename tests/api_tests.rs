// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Tests for the JSON API used by the web client.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{active_request, authed, call, create_test_app, send};
use prayer_ledger::db::LedgerStore;
use prayer_ledger::models::{RequestStatus, User};
use serde_json::json;

#[tokio::test]
async fn health_is_public() {
    let app = create_test_app();

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["buildId"].is_string());
}

#[tokio::test]
async fn api_requires_authentication() {
    let app = create_test_app();

    for uri in ["/api/me", "/api/requests/next", "/api/requests/r1"] {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let (status, body) = send(&app.router, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
        assert_eq!(body["error"]["status"], "UNAUTHENTICATED");
    }
}

// ─── /api/me ─────────────────────────────────────────────────

#[tokio::test]
async fn me_without_document_is_zeroed() {
    let app = create_test_app();

    let (status, body) = authed(&app.router, "GET", "/api/me", "newcomer", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["userId"], "newcomer");
    assert_eq!(body["prayersCompleted"], 0);
    assert_eq!(body["requestsSubmitted"], 0);
    assert_eq!(body["personalRatio"], 0.0);
    assert_eq!(body["prayerRequestCredits"], 0);
    assert_eq!(body["isAnonymous"], true);
}

#[tokio::test]
async fn me_reports_stored_counters() {
    let app = create_test_app();
    app.db.insert_user(User {
        prayers_completed: 7,
        requests_submitted: 2,
        personal_ratio: 3.5,
        prayer_request_credits: 1,
        is_anonymous: Some(false),
        ..User::empty("bob")
    });

    let (status, body) = authed(&app.router, "GET", "/api/me", "bob", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["prayersCompleted"], 7);
    assert_eq!(body["requestsSubmitted"], 2);
    assert_eq!(body["personalRatio"], 3.5);
    assert_eq!(body["prayerRequestCredits"], 1);
    assert_eq!(body["isAnonymous"], false);
}

// ─── Requests ────────────────────────────────────────────────

#[tokio::test]
async fn next_request_is_oldest_not_yet_prayed() {
    let app = create_test_app();
    let mut older = active_request("old", "alice", 0, 10);
    older.created_at = "2026-01-01T00:00:00.000Z".to_string();
    let mut newer = active_request("new", "alice", 0, 10);
    newer.created_at = "2026-02-01T00:00:00.000Z".to_string();
    app.db.insert_request(newer);
    app.db.insert_request(older);

    let (status, body) = authed(&app.router, "GET", "/api/requests/next", "bob", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "old");
    assert_eq!(body["status"], "active");

    let (status, _) = call(
        &app.router,
        "/prayForRequest",
        "bob",
        json!({"requestId": "old", "prayerText": "amen"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = authed(&app.router, "GET", "/api/requests/next", "bob", None).await;
    assert_eq!(body["id"], "new");

    // Someone else still gets the oldest one
    let (_, body) = authed(&app.router, "GET", "/api/requests/next", "carol", None).await;
    assert_eq!(body["id"], "old");
}

#[tokio::test]
async fn next_request_skips_complete_and_reports_empty() {
    let app = create_test_app();
    let mut done = active_request("done", "alice", 10, 10);
    done.status = RequestStatus::Complete;
    app.db.insert_request(done);

    let (status, body) = authed(&app.router, "GET", "/api/requests/next", "bob", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["message"], "No prayer requests available");
}

#[tokio::test]
async fn get_request_by_id() {
    let app = create_test_app();
    app.db.insert_request(active_request("r1", "alice", 3, 12));

    let (status, body) = authed(&app.router, "GET", "/api/requests/r1", "bob", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "r1");
    assert_eq!(body["userId"], "alice");
    assert_eq!(body["prayerCount"], 3);
    assert_eq!(body["targetPrayerNum"], 12);

    let (status, body) = authed(&app.router, "GET", "/api/requests/missing", "bob", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["message"], "Prayer request not found");
}

// ─── Notification Token ──────────────────────────────────────

#[tokio::test]
async fn notification_token_is_stored() {
    let app = create_test_app();

    let (status, body) = authed(
        &app.router,
        "PUT",
        "/api/notification-token",
        "alice",
        Some(json!({"token": "device-abc"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let alice = app.db.get_user("alice").await.unwrap().unwrap();
    assert_eq!(alice.notification_token.as_deref(), Some("device-abc"));
}

#[tokio::test]
async fn blank_notification_token_is_rejected() {
    let app = create_test_app();

    let (status, body) = authed(
        &app.router,
        "PUT",
        "/api/notification-token",
        "alice",
        Some(json!({"token": "  "})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["status"], "INVALID_ARGUMENT");
    assert!(app.db.get_user("alice").await.unwrap().is_none());
}

// ─── Credits ─────────────────────────────────────────────────

#[tokio::test]
async fn credit_granted_on_tenth_session_prayer_only() {
    let app = create_test_app();

    for count in [9u64, 10, 11] {
        let (status, body) = authed(
            &app.router,
            "POST",
            "/api/credits/grant",
            "bob",
            Some(json!({"sessionCount": count})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sessionCount"], count);
        assert_eq!(body["granted"], count == 10);
    }

    let bob = app.db.get_user("bob").await.unwrap().unwrap();
    assert_eq!(bob.prayer_request_credits, 1);
}

#[tokio::test]
async fn credit_failure_reports_not_granted() {
    let app = create_test_app();
    app.db.set_offline(true);

    let (status, body) = authed(
        &app.router,
        "POST",
        "/api/credits/grant",
        "bob",
        Some(json!({"sessionCount": 20})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["granted"], false);
}

#[tokio::test]
async fn responses_carry_security_headers() {
    let app = create_test_app();

    let response = tower::ServiceExt::oneshot(
        app.router.clone(),
        Request::builder().uri("/health").body(Body::empty()).unwrap(),
    )
    .await
    .unwrap();

    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    assert_eq!(response.headers()["cache-control"], "no-store");
}
