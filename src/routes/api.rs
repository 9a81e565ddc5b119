// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! JSON API routes for the web client.

use crate::error::{AppError, Result};
use crate::ledger::CreditGrant;
use crate::models::{PrayerRequest, RequestStatus};
use crate::services::AuthUser;
use crate::AppState;
use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Longest accepted device token.
const MAX_TOKEN_LEN: usize = 4096;

/// API routes (require authentication).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/me", get(get_me))
        .route("/api/requests/next", get(next_request))
        .route("/api/requests/{id}", get(get_request))
        .route("/api/notification-token", put(put_notification_token))
        .route("/api/credits/grant", post(grant_credit))
}

// ─── User Stats ──────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct MeResponse {
    pub user_id: String,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub prayers_completed: u64,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub requests_submitted: u64,
    pub personal_ratio: f64,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub prayer_request_credits: u64,
    pub is_anonymous: bool,
}

/// Caller's ledger counters; zeros if they have no user document yet.
async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<MeResponse>> {
    let stored = state.store().get_user(&user.uid).await?.unwrap_or_default();

    Ok(Json(MeResponse {
        is_anonymous: stored.is_anonymous.unwrap_or_else(|| user.is_anonymous()),
        user_id: user.uid,
        prayers_completed: stored.prayers_completed,
        requests_submitted: stored.requests_submitted,
        personal_ratio: stored.personal_ratio,
        prayer_request_credits: stored.prayer_request_credits,
    }))
}

// ─── Requests ────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct RequestResponse {
    pub id: String,
    pub user_id: String,
    pub text: String,
    pub prayer_count: u32,
    pub target_prayer_num: u32,
    pub status: String,
    pub created_at: String,
}

impl From<PrayerRequest> for RequestResponse {
    fn from(request: PrayerRequest) -> Self {
        let status = match request.status {
            RequestStatus::Active => "active",
            RequestStatus::Complete => "complete",
        };
        Self {
            id: request.id,
            user_id: request.user_id,
            text: request.text,
            prayer_count: request.prayer_count,
            target_prayer_num: request.target_prayer_num,
            status: status.to_string(),
            created_at: request.created_at,
        }
    }
}

/// Pick the oldest active request the caller has not prayed for yet.
pub fn pick_next_request(
    active_oldest_first: Vec<PrayerRequest>,
    prayed: &HashSet<String>,
) -> Option<PrayerRequest> {
    active_oldest_first
        .into_iter()
        .find(|r| !prayed.contains(&r.id))
}

async fn next_request(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<RequestResponse>> {
    let prayed: HashSet<String> = state
        .store()
        .prayed_request_ids(&user.uid)
        .await?
        .into_iter()
        .collect();
    let active = state.store().list_active_requests().await?;

    tracing::debug!(
        user_id = %user.uid,
        active = active.len(),
        prayed = prayed.len(),
        "Selecting next request"
    );

    pick_next_request(active, &prayed)
        .map(|r| Json(r.into()))
        .ok_or_else(|| AppError::NotFound("No prayer requests available".to_string()))
}

async fn get_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<RequestResponse>> {
    let mut request = state
        .store()
        .get_request(&id)
        .await?
        .ok_or_else(|| AppError::NotFound("Prayer request not found".to_string()))?;
    request.id = id;

    Ok(Json(request.into()))
}

// ─── Notification Token ──────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct NotificationTokenRequest {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

async fn put_notification_token(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<NotificationTokenRequest>,
) -> Result<Json<SuccessResponse>> {
    let token = body.token.trim();
    if token.is_empty() || token.len() > MAX_TOKEN_LEN {
        return Err(AppError::InvalidArgument(
            "token is required and must be a non-empty string".to_string(),
        ));
    }

    state.store().set_notification_token(&user.uid, token).await?;
    tracing::info!(user_id = %user.uid, "Notification token registered");

    Ok(Json(SuccessResponse { success: true }))
}

// ─── Credits ─────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantCreditRequest {
    pub session_count: u64,
}

/// Grant a credit if the client's session count has just reached a multiple of ten.
async fn grant_credit(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<GrantCreditRequest>,
) -> Json<CreditGrant> {
    Json(
        state
            .credits
            .grant_for_count(&user.uid, body.session_count)
            .await,
    )
}
