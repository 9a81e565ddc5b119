// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Store-driven request maintenance: the completion safety net and the
//! administrative reset.

use crate::db::LedgerStore;
use crate::error::AppError;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

/// Mark `request_id` complete if it is active and has reached its target.
///
/// The prayer transaction already does this; this catches documents
/// written by anything else.
pub async fn on_request_updated(store: &dyn LedgerStore, request_id: &str) -> Result<bool, AppError> {
    let changed = store.mark_complete_if_reached(request_id).await?;
    if changed {
        tracing::info!(request_id, "Request marked complete by change watcher");
    }
    Ok(changed)
}

/// Background task applying [`on_request_updated`] to every request change.
pub struct CompletionWatcher;

impl CompletionWatcher {
    /// Start watching. The task ends when the store's change feed closes.
    pub fn spawn(store: Arc<dyn LedgerStore>) -> JoinHandle<()> {
        let mut changes = store.request_changes();

        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(change) => {
                        if let Err(e) = on_request_updated(store.as_ref(), &change.request_id).await
                        {
                            tracing::warn!(
                                request_id = %change.request_id,
                                error = %e,
                                "Completion check failed"
                            );
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Completion watcher lagged behind change feed");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            tracing::debug!("Completion watcher stopped");
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(ts_rs::TS))]
#[cfg_attr(feature = "binding-generation", ts(export))]
pub struct ResetReceipt {
    pub success: bool,
    pub count: usize,
}

/// Reset every request to zero prayers and active status.
///
/// Any authenticated caller may do this; there is no role check.
pub async fn reset_all_prayer_requests(store: &dyn LedgerStore) -> Result<ResetReceipt, AppError> {
    let count = store.reset_all_requests().await.inspect_err(|e| {
        tracing::error!(error = %e, "Failed to reset prayer requests");
    })?;

    tracing::info!(count, "Reset prayer requests");
    Ok(ResetReceipt {
        success: true,
        count,
    })
}
