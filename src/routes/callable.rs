// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firebase callable endpoints.
//!
//! Requests are `{"data": {...}}`, responses `{"result": {...}}`. Errors use
//! the envelope rendered by [`AppError`].

use crate::error::{AppError, Result};
use crate::ledger::trigger::reset_all_prayer_requests;
use crate::ledger::{PrayerReceipt, RequestReceipt, ResetReceipt};
use crate::services::AuthUser;
use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Callable routes (require authentication).
/// The auth middleware is applied in routes/mod.rs.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/prayForRequest", post(pray_for_request))
        .route("/submitPrayerRequest", post(submit_prayer_request))
        .route("/resetAllPrayerRequests", post(reset_all))
}

#[derive(Debug, Deserialize)]
pub struct CallableRequest {
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Serialize)]
pub struct CallableResponse<T> {
    pub result: T,
}

fn callable_data(payload: std::result::Result<Json<CallableRequest>, JsonRejection>) -> Result<Value> {
    payload
        .map(|Json(request)| request.data)
        .map_err(|e| AppError::InvalidArgument(format!("Malformed callable request: {}", e.body_text())))
}

/// Required string argument; anything else is rejected with `message`.
fn string_arg<'a>(data: &'a Value, name: &str, message: &str) -> Result<&'a str> {
    data.get(name)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::InvalidArgument(message.to_string()))
}

async fn pray_for_request(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    payload: std::result::Result<Json<CallableRequest>, JsonRejection>,
) -> Result<Json<CallableResponse<PrayerReceipt>>> {
    let data = callable_data(payload)?;
    let request_id = string_arg(
        &data,
        "requestId",
        "requestId is required and must be a string",
    )?;
    let prayer_text = string_arg(
        &data,
        "prayerText",
        "prayerText is required and must be a non-empty string",
    )?;

    let committed = state
        .ledger
        .pray_for_request(&user, request_id, prayer_text)
        .await?;

    Ok(Json(CallableResponse {
        result: committed.receipt,
    }))
}

async fn submit_prayer_request(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    payload: std::result::Result<Json<CallableRequest>, JsonRejection>,
) -> Result<Json<CallableResponse<RequestReceipt>>> {
    let data = callable_data(payload)?;
    let text = string_arg(&data, "text", "text is required and must be a non-empty string")?;

    let committed = state.ledger.submit_prayer_request(&user, text).await?;

    Ok(Json(CallableResponse {
        result: committed.receipt,
    }))
}

async fn reset_all(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<CallableResponse<ResetReceipt>>> {
    tracing::warn!(user_id = %user.uid, "Resetting all prayer requests");

    let receipt = reset_all_prayer_requests(state.store().as_ref()).await?;

    Ok(Json(CallableResponse { result: receipt }))
}
