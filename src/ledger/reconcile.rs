// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Post-commit work: ratio refresh and owner notification.
//!
//! Runs outside the ledger transaction and races with other writers.
//! Only the ratio fields are written here, last writer wins.

use super::ratio::ratio;
use crate::db::LedgerStore;
use crate::error::AppError;
use crate::services::messaging::{notify_request_owner, Notifier};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// A request owner to notify after a prayer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerNotice {
    pub owner_id: String,
    pub request_id: String,
    pub prayer_count: u32,
}

#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn LedgerStore>,
    notifier: Arc<dyn Notifier>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn LedgerStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Rewrite the user's personal ratio from their current counters.
    /// A missing user gets a zero-valued document.
    pub async fn refresh_user(&self, user_id: &str) -> Result<f64, AppError> {
        let personal_ratio = match self.store.get_user(user_id).await? {
            Some(user) => ratio(user.prayers_completed, user.requests_submitted),
            None => 0.0,
        };
        self.store.set_personal_ratio(user_id, personal_ratio).await?;
        Ok(personal_ratio)
    }

    /// Rewrite the global ratio from the current global counters.
    pub async fn refresh_global(&self) -> Result<f64, AppError> {
        let global_ratio = match self.store.get_global_stats().await? {
            Some(stats) => ratio(stats.prayers_completed, stats.requests_submitted),
            None => 0.0,
        };
        self.store.set_global_ratio(global_ratio).await?;
        Ok(global_ratio)
    }

    /// Refresh both ratios. Both are attempted even if one fails.
    pub async fn refresh(&self, user_id: &str) -> Result<(), AppError> {
        let (user, global) = tokio::join!(self.refresh_user(user_id), self.refresh_global());
        user?;
        global?;
        Ok(())
    }

    /// Run the post-commit work on a background task. Failures are logged
    /// and dropped.
    pub fn spawn(&self, user_id: String, notice: Option<OwnerNotice>) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            if let Err(e) = this.refresh(&user_id).await {
                tracing::warn!(user_id = %user_id, error = %e, "Ratio refresh failed");
            }

            if let Some(notice) = notice {
                notify_request_owner(
                    this.store.as_ref(),
                    this.notifier.as_ref(),
                    &notice.owner_id,
                    &notice.request_id,
                    notice.prayer_count,
                )
                .await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryDb;
    use crate::models::{GlobalStats, User};
    use crate::services::LogNotifier;

    fn reconciler(store: Arc<MemoryDb>) -> Reconciler {
        Reconciler::new(store, Arc::new(LogNotifier))
    }

    #[tokio::test]
    async fn refresh_writes_both_ratios() {
        let store = Arc::new(MemoryDb::new());
        store.insert_user(User {
            prayers_completed: 7,
            requests_submitted: 2,
            ..User::empty("dave")
        });
        store.insert_global_stats(GlobalStats {
            prayers_completed: 10,
            requests_submitted: 3,
            global_ratio: 0.0,
        });

        reconciler(store.clone()).refresh("dave").await.unwrap();

        let user = store.get_user("dave").await.unwrap().unwrap();
        assert_eq!(user.personal_ratio, 3.5);
        assert_eq!(user.prayers_completed, 7);
        let global = store.get_global_stats().await.unwrap().unwrap();
        assert_eq!(global.global_ratio, 3.33);
    }

    #[tokio::test]
    async fn missing_documents_are_initialized_to_zero() {
        let store = Arc::new(MemoryDb::new());

        reconciler(store.clone()).refresh("ghost").await.unwrap();

        let user = store.get_user("ghost").await.unwrap().unwrap();
        assert_eq!(user, User::empty("ghost"));
        assert_eq!(user.is_anonymous, None);
        let global = store.get_global_stats().await.unwrap().unwrap();
        assert_eq!(global, GlobalStats::default());
    }

    #[tokio::test]
    async fn spawned_failure_is_swallowed() {
        let store = Arc::new(MemoryDb::new());
        store.set_fail_ratio_writes(true);

        let handle = reconciler(store.clone()).spawn("erin".to_string(), None);
        handle.await.expect("background task must not panic");

        assert!(store.get_user("erin").await.unwrap().is_none());
    }
}
