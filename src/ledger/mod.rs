// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! The prayer ledger: transactional bookkeeping of prayers, requests,
//! credits and the derived prayer ratios.
//!
//! Each write operation runs as one store transaction built from a pure
//! planning function, then hands best-effort follow-up work (ratio refresh,
//! owner notification) to a background task.

pub mod credit;
pub mod prayer;
pub mod ratio;
pub mod reconcile;
pub mod request;
pub mod trigger;

pub use credit::{should_grant_credit, CreditGrant, CreditGrantor, PrayerSession};
pub use prayer::PrayerReceipt;
pub use reconcile::{OwnerNotice, Reconciler};
pub use request::RequestReceipt;
pub use trigger::{CompletionWatcher, ResetReceipt};

use crate::db::LedgerStore;
use crate::error::AppError;
use crate::services::Notifier;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Result of a committed ledger operation.
///
/// `follow_up` is the background task doing post-commit work. Callers
/// normally drop it; tests await it to observe the reconciled state.
pub struct Committed<T> {
    pub receipt: T,
    pub follow_up: JoinHandle<()>,
}

/// Entry point for ledger transactions.
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn LedgerStore>,
    reconciler: Reconciler,
}

impl Ledger {
    pub fn new(store: Arc<dyn LedgerStore>, notifier: Arc<dyn Notifier>) -> Self {
        let reconciler = Reconciler::new(store.clone(), notifier);
        Self { store, reconciler }
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }
}

/// Log store failures with the operation that hit them. Business errors
/// pass through silently.
fn log_failure(operation: &'static str, user_id: &str, error: &AppError) {
    if error.is_internal() {
        tracing::error!(operation, user_id, error = %error, "Ledger transaction failed");
    } else {
        tracing::debug!(operation, user_id, error = %error, "Ledger operation rejected");
    }
}
