// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Push notifications to request owners.
//!
//! Delivery goes through Firebase Cloud Messaging (HTTP v1 API). Failures
//! are classified so that dead device tokens can be removed from the
//! owner's user document.

use crate::db::LedgerStore;
use crate::error::AppError;
use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const FCM_BASE_URL: &str = "https://fcm.googleapis.com/v1";
const FCM_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

pub const NOTIFICATION_TITLE: &str = "Someone prayed for you 🙏";
/// Request text longer than this is cut and suffixed with `...`.
const PREVIEW_CHARS: usize = 50;
/// Preview used when the request document has disappeared.
const FALLBACK_PREVIEW: &str = "someone prayed for you";

/// A prayer notification addressed to one device.
#[derive(Debug, Clone, PartialEq)]
pub struct PrayerNotification {
    pub token: String,
    pub title: String,
    pub body: String,
    pub request_id: String,
    pub prayer_count: u32,
}

impl PrayerNotification {
    /// Build the notification for a request that has `prayer_count` prayers.
    pub fn for_request(
        token: impl Into<String>,
        request_id: impl Into<String>,
        request_text: Option<&str>,
        prayer_count: u32,
    ) -> Self {
        let preview = match request_text {
            Some(text) => preview_text(text),
            None => FALLBACK_PREVIEW.to_string(),
        };
        let noun = if prayer_count == 1 { "prayer" } else { "prayers" };

        Self {
            token: token.into(),
            title: NOTIFICATION_TITLE.to_string(),
            body: format!("{} {} received. \"{}\"", prayer_count, noun, preview),
            request_id: request_id.into(),
            prayer_count,
        }
    }
}

fn preview_text(text: &str) -> String {
    if text.chars().count() > PREVIEW_CHARS {
        let cut: String = text.chars().take(PREVIEW_CHARS).collect();
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}

/// Delivery failure categories.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// The device token is no longer valid; it should be forgotten.
    #[error("Invalid registration token: {0}")]
    InvalidToken(String),
    #[error("Notification delivery failed: {0}")]
    Other(String),
}

/// Notification dispatcher.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &PrayerNotification) -> Result<(), NotifyError>;
}

/// Notifier used when delivery is disabled: logs and reports success.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &PrayerNotification) -> Result<(), NotifyError> {
        tracing::info!(
            request_id = %notification.request_id,
            prayer_count = notification.prayer_count,
            body = %notification.body,
            "Notification delivery disabled, not sending"
        );
        Ok(())
    }
}

// ─── Firebase Cloud Messaging ────────────────────────────────────

#[derive(Serialize)]
struct FcmSendRequest<'a> {
    message: FcmMessage<'a>,
}

#[derive(Serialize)]
struct FcmMessage<'a> {
    token: &'a str,
    notification: FcmNotification<'a>,
    data: FcmData,
    apns: FcmApns,
}

#[derive(Serialize)]
struct FcmNotification<'a> {
    title: &'a str,
    body: &'a str,
}

/// FCM data payloads must be string-valued.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FcmData {
    #[serde(rename = "type")]
    kind: &'static str,
    request_id: String,
    prayer_count: String,
}

#[derive(Serialize)]
struct FcmApns {
    payload: FcmApnsPayload,
}

#[derive(Serialize)]
struct FcmApnsPayload {
    aps: FcmAps,
}

#[derive(Serialize)]
struct FcmAps {
    sound: &'static str,
    badge: u32,
}

fn fcm_request(notification: &PrayerNotification) -> FcmSendRequest<'_> {
    FcmSendRequest {
        message: FcmMessage {
            token: &notification.token,
            notification: FcmNotification {
                title: &notification.title,
                body: &notification.body,
            },
            data: FcmData {
                kind: "prayer",
                request_id: notification.request_id.clone(),
                prayer_count: notification.prayer_count.to_string(),
            },
            apns: FcmApns {
                payload: FcmApnsPayload {
                    aps: FcmAps {
                        sound: "notification.caf",
                        badge: notification.prayer_count,
                    },
                },
            },
        },
    }
}

#[derive(Debug, Deserialize)]
struct FcmErrorResponse {
    error: FcmErrorStatus,
}

#[derive(Debug, Deserialize)]
struct FcmErrorStatus {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    details: Vec<FcmErrorDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FcmErrorDetail {
    error_code: Option<String>,
}

/// Map an FCM error response body onto [`NotifyError`].
fn classify_fcm_error(http_status: u16, body: &str) -> NotifyError {
    let Ok(parsed) = serde_json::from_str::<FcmErrorResponse>(body) else {
        return NotifyError::Other(format!("HTTP {}: {}", http_status, body));
    };

    let code = parsed
        .error
        .details
        .iter()
        .find_map(|d| d.error_code.as_deref())
        .unwrap_or(parsed.error.status.as_str());

    match code {
        "UNREGISTERED" | "INVALID_ARGUMENT" => NotifyError::InvalidToken(parsed.error.message),
        _ => NotifyError::Other(format!("HTTP {} {}: {}", http_status, code, parsed.error.message)),
    }
}

/// Firebase Cloud Messaging client using Application Default Credentials.
pub struct FcmNotifier {
    http: reqwest::Client,
    send_url: String,
    token_generator: gcloud_sdk::GoogleAuthTokenGenerator,
}

impl FcmNotifier {
    pub async fn new(project_id: &str) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .context("failed building FCM HTTP client")?;

        let token_generator = gcloud_sdk::GoogleAuthTokenGenerator::new(
            gcloud_sdk::TokenSourceType::Default,
            vec![FCM_SCOPE.to_string()],
        )
        .await
        .context("failed initializing FCM credentials")?;

        tracing::info!(project = project_id, "FCM notifier initialized");

        Ok(Self {
            http,
            send_url: format!("{}/projects/{}/messages:send", FCM_BASE_URL, project_id),
            token_generator,
        })
    }
}

#[async_trait]
impl Notifier for FcmNotifier {
    async fn send(&self, notification: &PrayerNotification) -> Result<(), NotifyError> {
        let token = self
            .token_generator
            .create_token()
            .await
            .map_err(|e| NotifyError::Other(format!("failed to obtain access token: {e}")))?;

        let response = self
            .http
            .post(&self.send_url)
            .header(reqwest::header::AUTHORIZATION, token.header_value())
            .json(&fcm_request(notification))
            .send()
            .await
            .map_err(|e| NotifyError::Other(format!("FCM request failed: {e}")))?;

        if response.status().is_success() {
            return Ok(());
        }

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(classify_fcm_error(status, &body))
    }
}

// ─── Owner Notification ──────────────────────────────────────────

/// What happened when notifying a request owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOutcome {
    Sent,
    /// Owner has no user document
    NoOwner,
    /// Owner has not registered a device
    NoToken,
    /// Delivery reported a dead token, which was deleted
    TokenRemoved,
    Failed,
}

/// Tell the owner of `request_id` that it now has `prayer_count` prayers.
///
/// Never fails: every problem is logged and reported through the outcome.
pub async fn notify_request_owner(
    store: &dyn LedgerStore,
    notifier: &dyn Notifier,
    owner_id: &str,
    request_id: &str,
    prayer_count: u32,
) -> NotifyOutcome {
    match try_notify(store, notifier, owner_id, request_id, prayer_count).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!(
                owner_id,
                request_id,
                error = %e,
                "Failed to prepare prayer notification"
            );
            NotifyOutcome::Failed
        }
    }
}

async fn try_notify(
    store: &dyn LedgerStore,
    notifier: &dyn Notifier,
    owner_id: &str,
    request_id: &str,
    prayer_count: u32,
) -> Result<NotifyOutcome, AppError> {
    let Some(owner) = store.get_user(owner_id).await? else {
        tracing::debug!(owner_id, "Owner not found, skipping notification");
        return Ok(NotifyOutcome::NoOwner);
    };

    let Some(token) = owner.notification_token.filter(|t| !t.is_empty()) else {
        tracing::debug!(owner_id, "Owner has no notification token, skipping");
        return Ok(NotifyOutcome::NoToken);
    };

    let request = store.get_request(request_id).await?;
    let notification = PrayerNotification::for_request(
        token,
        request_id,
        request.as_ref().map(|r| r.text.as_str()),
        prayer_count,
    );

    match notifier.send(&notification).await {
        Ok(()) => {
            tracing::info!(owner_id, request_id, prayer_count, "Prayer notification sent");
            Ok(NotifyOutcome::Sent)
        }
        Err(NotifyError::InvalidToken(reason)) => {
            tracing::warn!(owner_id, reason = %reason, "Removing invalid notification token");
            store.delete_notification_token(owner_id).await?;
            Ok(NotifyOutcome::TokenRemoved)
        }
        Err(e) => {
            tracing::error!(owner_id, request_id, error = %e, "Prayer notification failed");
            Ok(NotifyOutcome::Failed)
        }
    }
}
