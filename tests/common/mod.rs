// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use jsonwebtoken::{encode, Algorithm, DecodingKey, EncodingKey, Header};
use prayer_ledger::config::Config;
use prayer_ledger::db::{FirestoreDb, MemoryDb};
use prayer_ledger::models::{PrayerRequest, RequestStatus};
use prayer_ledger::routes::create_router;
use prayer_ledger::services::{
    AuthUser, FirebaseTokenVerifier, Notifier, NotifyError, PrayerNotification,
};
use prayer_ledger::AppState;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

pub const TEST_KID: &str = "test-kid";

const TEST_PRIVATE_KEY: &[u8] = include_bytes!("../fixtures/test_signing_key.pem");
const TEST_PUBLIC_KEY: &[u8] = include_bytes!("../fixtures/test_signing_key.pub.pem");

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

// ═══════════════════════════════════════════════════════════════════════════
// Notifications
// ═══════════════════════════════════════════════════════════════════════════

/// Notifier that records every notification instead of delivering it.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<PrayerNotification>>,
    reject_tokens: AtomicBool,
}

#[allow(dead_code)]
impl RecordingNotifier {
    pub fn sent(&self) -> Vec<PrayerNotification> {
        self.sent.lock().unwrap().clone()
    }

    /// Report every token as unregistered from now on.
    pub fn reject_tokens(&self) {
        self.reject_tokens.store(true, Ordering::Relaxed);
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: &PrayerNotification) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(notification.clone());
        if self.reject_tokens.load(Ordering::Relaxed) {
            return Err(NotifyError::InvalidToken("UNREGISTERED".to_string()));
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// App
// ═══════════════════════════════════════════════════════════════════════════

#[allow(dead_code)]
pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub db: Arc<MemoryDb>,
    pub notifier: Arc<RecordingNotifier>,
}

/// Token verifier that trusts the fixture signing key.
#[allow(dead_code)]
pub fn test_verifier(config: &Config) -> FirebaseTokenVerifier {
    let key = DecodingKey::from_rsa_pem(TEST_PUBLIC_KEY).expect("valid test public key");
    FirebaseTokenVerifier::new_with_static_key(config, TEST_KID, key)
        .expect("static verifier should build")
}

/// Create a test app backed by the in-memory store.
#[allow(dead_code)]
pub fn create_test_app() -> TestApp {
    let config = Config::test_default();
    let db = Arc::new(MemoryDb::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let verifier = Arc::new(test_verifier(&config));

    let state = Arc::new(AppState::new(
        config,
        db.clone(),
        notifier.clone(),
        verifier,
    ));

    TestApp {
        router: create_router(state.clone()),
        state,
        db,
        notifier,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Tokens & Callers
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Serialize)]
struct TestClaims<'a> {
    iss: String,
    aud: &'a str,
    sub: &'a str,
    iat: u64,
    exp: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<&'a str>,
}

/// Mint an ID token for `uid` signed with the fixture key.
#[allow(dead_code)]
pub fn mint_token(uid: &str, email: Option<&str>) -> String {
    mint_token_for_project(uid, email, "test-project")
}

/// Mint an ID token issued by another Firebase project.
#[allow(dead_code)]
pub fn mint_token_for_project(uid: &str, email: Option<&str>, project: &str) -> String {
    let now = chrono::Utc::now().timestamp() as u64;
    let claims = TestClaims {
        iss: format!("https://securetoken.google.com/{}", project),
        aud: project,
        sub: uid,
        iat: now,
        exp: now + 3600,
        email,
    };

    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(TEST_KID.to_string());
    let key = EncodingKey::from_rsa_pem(TEST_PRIVATE_KEY).expect("valid test private key");
    encode(&header, &claims, &key).expect("token should encode")
}

/// Caller identity as the ledger sees it, for calling it directly.
#[allow(dead_code)]
pub fn caller(uid: &str) -> AuthUser {
    AuthUser {
        uid: uid.to_string(),
        email: Some(format!("{}@example.com", uid)),
        phone_number: None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Fixtures
// ═══════════════════════════════════════════════════════════════════════════

#[allow(dead_code)]
pub fn active_request(id: &str, owner: &str, count: u32, target: u32) -> PrayerRequest {
    PrayerRequest {
        id: id.to_string(),
        user_id: owner.to_string(),
        text: format!("Please pray for {}", id),
        prayer_count: count,
        target_prayer_num: target,
        status: RequestStatus::Active,
        created_at: "2026-01-01T00:00:00.000Z".to_string(),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Requests
// ═══════════════════════════════════════════════════════════════════════════

/// POST a callable with `{"data": data}` as `uid`.
#[allow(dead_code)]
pub async fn call(app: &Router, path: &str, uid: &str, data: Value) -> (StatusCode, Value) {
    let body = serde_json::json!({ "data": data });
    let request = Request::builder()
        .method("POST")
        .uri(path)
        .header(header::AUTHORIZATION, format!("Bearer {}", mint_token(uid, None)))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

/// Authenticated request with an optional JSON body.
#[allow(dead_code)]
pub async fn authed(
    app: &Router,
    method: &str,
    path: &str,
    uid: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let builder = Request::builder()
        .method(method)
        .uri(path)
        .header(header::AUTHORIZATION, format!("Bearer {}", mint_token(uid, None)));
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    send(app, request).await
}

/// Run a request through the router and parse the JSON body (Null if empty).
#[allow(dead_code)]
pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}
