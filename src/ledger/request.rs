// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Request transaction: a user submits a new prayer request.

use super::ratio::target_prayer_num;
use super::{log_failure, Committed, Ledger};
use crate::db::{new_document_id, TxnKeys, TxnSnapshot, TxnWrites};
use crate::error::AppError;
use crate::models::{GlobalStats, PrayerRequest, RequestStatus, User};
use crate::services::AuthUser;
use crate::time_utils::format_utc_rfc3339;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(ts_rs::TS))]
#[cfg_attr(feature = "binding-generation", ts(export))]
pub struct RequestReceipt {
    pub request_id: String,
    pub target_prayer_num: u32,
}

#[derive(Debug, Clone)]
pub(crate) struct RequestDraft {
    pub request_id: String,
    pub user_id: String,
    pub is_anonymous: bool,
    pub text: String,
}

/// Compute the writes for a new request against a consistent snapshot.
///
/// The target is sized from the ratios as they were before this
/// transaction; the reconciler refreshes them afterwards.
pub(crate) fn plan_request(snap: &TxnSnapshot, draft: &RequestDraft) -> TxnWrites {
    let now = format_utc_rfc3339(snap.server_time);

    let personal_ratio = snap.user.as_ref().map_or(0.0, |u| u.personal_ratio);
    let global_ratio = snap.global.as_ref().map_or(0.0, |g| g.global_ratio);
    let target = target_prayer_num(personal_ratio, global_ratio);

    let user = match &snap.user {
        Some(existing) => User {
            requests_submitted: existing.requests_submitted + 1,
            // Submission is gated on credits by the client; never go below zero.
            prayer_request_credits: existing.prayer_request_credits.saturating_sub(1),
            ..existing.clone()
        },
        None => User {
            requests_submitted: 1,
            is_anonymous: Some(draft.is_anonymous),
            created_at: Some(now.clone()),
            ..User::empty(draft.user_id.as_str())
        },
    };

    let global = match &snap.global {
        Some(existing) => GlobalStats {
            requests_submitted: existing.requests_submitted + 1,
            ..existing.clone()
        },
        None => GlobalStats {
            requests_submitted: 1,
            ..GlobalStats::default()
        },
    };

    let request = PrayerRequest {
        id: draft.request_id.clone(),
        user_id: draft.user_id.clone(),
        text: draft.text.clone(),
        prayer_count: 0,
        target_prayer_num: target,
        status: RequestStatus::Active,
        created_at: now,
    };

    TxnWrites {
        user: Some(user),
        global: Some(global),
        request: Some(request),
        prayer: None,
    }
}

/// Trim and validate request text.
fn validate_text(text: &str) -> Result<&str, AppError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(AppError::InvalidArgument(
            "text is required and must be a non-empty string".to_string(),
        ));
    }
    Ok(text)
}

impl Ledger {
    /// Submit a new prayer request owned by `caller`, consuming one credit
    /// when the caller has any.
    pub async fn submit_prayer_request(
        &self,
        caller: &AuthUser,
        text: &str,
    ) -> Result<Committed<RequestReceipt>, AppError> {
        let text = validate_text(text)?;

        let draft = RequestDraft {
            request_id: new_document_id(),
            user_id: caller.uid.clone(),
            is_anonymous: caller.is_anonymous(),
            text: text.to_string(),
        };
        let keys = TxnKeys {
            user_id: caller.uid.clone(),
            request_id: None,
        };

        let plan = draft.clone();
        let writes = self
            .store
            .transact(
                keys,
                Arc::new(move |snap: &TxnSnapshot| Ok(plan_request(snap, &plan))),
            )
            .await
            .inspect_err(|e| log_failure("submitPrayerRequest", &caller.uid, e))?;

        let target_prayer_num = writes
            .request
            .as_ref()
            .map(|r| r.target_prayer_num)
            .ok_or_else(|| anyhow::anyhow!("request transaction committed without a request"))?;

        let receipt = RequestReceipt {
            request_id: draft.request_id,
            target_prayer_num,
        };

        tracing::info!(
            user_id = %caller.uid,
            request_id = %receipt.request_id,
            target_prayer_num,
            "Prayer request submitted"
        );

        let follow_up = self.reconciler.spawn(caller.uid.clone(), None);

        Ok(Committed { receipt, follow_up })
    }
}
