// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Prayer transaction: one user prays for one request.

use super::{log_failure, Committed, Ledger, OwnerNotice};
use crate::db::{new_document_id, TxnKeys, TxnSnapshot, TxnWrites};
use crate::error::AppError;
use crate::models::{GlobalStats, Prayer, RequestStatus, User};
use crate::services::AuthUser;
use crate::time_utils::format_utc_rfc3339;
use serde::Serialize;
use std::sync::Arc;

/// Returned to the caller once the prayer is committed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(ts_rs::TS))]
#[cfg_attr(feature = "binding-generation", ts(export))]
pub struct PrayerReceipt {
    pub success: bool,
    pub prayer_count: u32,
    pub is_complete: bool,
    pub prayer_id: String,
}

/// Everything the transaction body needs besides the snapshot. Fixed
/// before the first attempt so retries write the same prayer ID.
#[derive(Debug, Clone)]
pub(crate) struct PrayerDraft {
    pub prayer_id: String,
    pub user_id: String,
    pub is_anonymous: bool,
    pub request_id: String,
    pub prayer_text: String,
}

/// Compute the writes for a prayer against a consistent snapshot.
pub(crate) fn plan_prayer(snap: &TxnSnapshot, draft: &PrayerDraft) -> Result<TxnWrites, AppError> {
    let mut request = snap
        .request
        .clone()
        .ok_or_else(|| AppError::NotFound("Prayer request not found".to_string()))?;

    // Another prayer may have completed the request since the pre-check.
    if request.is_complete() {
        return Err(AppError::FailedPrecondition(
            "This prayer request is already complete".to_string(),
        ));
    }

    let now = format_utc_rfc3339(snap.server_time);

    request.id = draft.request_id.clone();
    request.prayer_count = request.prayer_count.saturating_add(1);
    if request.prayer_count >= request.target_prayer_num {
        request.status = RequestStatus::Complete;
    }

    let user = match &snap.user {
        Some(existing) => User {
            prayers_completed: existing.prayers_completed + 1,
            ..existing.clone()
        },
        None => User {
            prayers_completed: 1,
            is_anonymous: Some(draft.is_anonymous),
            created_at: Some(now.clone()),
            ..User::empty(draft.user_id.as_str())
        },
    };

    let global = match &snap.global {
        Some(existing) => GlobalStats {
            prayers_completed: existing.prayers_completed + 1,
            ..existing.clone()
        },
        None => GlobalStats {
            prayers_completed: 1,
            ..GlobalStats::default()
        },
    };

    let prayer = Prayer {
        id: draft.prayer_id.clone(),
        user_id: draft.user_id.clone(),
        request_id: draft.request_id.clone(),
        prayer_text: draft.prayer_text.clone(),
        created_at: now,
    };

    Ok(TxnWrites {
        user: Some(user),
        global: Some(global),
        request: Some(request),
        prayer: Some(prayer),
    })
}

impl Ledger {
    /// Record that `caller` prayed for `request_id`.
    pub async fn pray_for_request(
        &self,
        caller: &AuthUser,
        request_id: &str,
        prayer_text: &str,
    ) -> Result<Committed<PrayerReceipt>, AppError> {
        if request_id.is_empty() {
            return Err(AppError::InvalidArgument(
                "requestId is required and must be a string".to_string(),
            ));
        }
        let prayer_text = prayer_text.trim();
        if prayer_text.is_empty() {
            return Err(AppError::InvalidArgument(
                "prayerText is required and must be a non-empty string".to_string(),
            ));
        }

        let existing = self
            .store
            .get_request(request_id)
            .await
            .inspect_err(|e| log_failure("prayForRequest", &caller.uid, e))?
            .ok_or_else(|| AppError::NotFound("Prayer request not found".to_string()))?;
        if existing.is_complete() {
            return Err(AppError::FailedPrecondition(
                "This prayer request is already complete".to_string(),
            ));
        }

        let draft = PrayerDraft {
            prayer_id: new_document_id(),
            user_id: caller.uid.clone(),
            is_anonymous: caller.is_anonymous(),
            request_id: request_id.to_string(),
            prayer_text: prayer_text.to_string(),
        };
        let keys = TxnKeys {
            user_id: caller.uid.clone(),
            request_id: Some(request_id.to_string()),
        };

        let plan = draft.clone();
        let writes = self
            .store
            .transact(keys, Arc::new(move |snap: &TxnSnapshot| plan_prayer(snap, &plan)))
            .await
            .inspect_err(|e| log_failure("prayForRequest", &caller.uid, e))?;

        let request = writes
            .request
            .ok_or_else(|| anyhow::anyhow!("prayer transaction committed without a request write"))?;

        let receipt = PrayerReceipt {
            success: true,
            prayer_count: request.prayer_count,
            is_complete: request.prayer_count >= request.target_prayer_num,
            prayer_id: draft.prayer_id,
        };

        tracing::info!(
            user_id = %caller.uid,
            request_id,
            prayer_count = receipt.prayer_count,
            is_complete = receipt.is_complete,
            "Prayer recorded"
        );

        let notice = (request.user_id != caller.uid).then(|| OwnerNotice {
            owner_id: request.user_id.clone(),
            request_id: request_id.to_string(),
            prayer_count: receipt.prayer_count,
        });
        let follow_up = self.reconciler.spawn(caller.uid.clone(), notice);

        Ok(Committed { receipt, follow_up })
    }
}
