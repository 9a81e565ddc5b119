// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firebase ID token authentication middleware.

use crate::error::AppError;
use crate::services::AuthError;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use std::sync::Arc;

/// Cookie carrying the ID token for same-site web sessions.
pub const SESSION_COOKIE: &str = "__session";

/// Middleware that requires a valid Firebase ID token.
///
/// The token is read from `Authorization: Bearer` first, then from the
/// session cookie. On success the caller's [`crate::services::AuthUser`]
/// is stored in the request extensions.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let bearer = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::to_string);

    let token = bearer
        .or_else(|| jar.get(SESSION_COOKIE).map(|c| c.value().to_string()))
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Unauthenticated("User must be authenticated".to_string()))?;

    let auth_user = state
        .token_verifier
        .verify_id_token(&token)
        .await
        .map_err(|e| match e {
            AuthError::Rejected(reason) => {
                tracing::debug!(reason = %reason, "Rejected ID token");
                AppError::Unauthenticated("User must be authenticated".to_string())
            }
            AuthError::Transient(reason) => {
                AppError::Internal(anyhow::anyhow!("token verification unavailable: {reason}"))
            }
        })?;

    request.extensions_mut().insert(auth_user);

    Ok(next.run(request).await)
}
