// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Database layer.
//!
//! The ledger talks to its document store through [`LedgerStore`]. Two
//! implementations exist: [`FirestoreDb`] for production and [`MemoryDb`]
//! for tests and local development.

pub mod firestore;
pub mod memory;

pub use firestore::{FirestoreDb, RequestListener};
pub use memory::MemoryDb;

use crate::error::AppError;
use crate::models::{GlobalStats, Prayer, PrayerRequest, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    pub const PRAYER_REQUESTS: &str = "prayerRequests";
    pub const PRAYERS: &str = "prayers";
    pub const STATS: &str = "stats";
    /// Document ID of the global stats singleton inside `stats`
    pub const GLOBAL_STATS_ID: &str = "global";
}

// Firestore limits batch/transaction writes to 500 operations.
// We use a safe limit of 400 to allow headroom.
pub const BATCH_SIZE: usize = 400;

/// Capacity of the request-change broadcast channel.
const CHANGE_CHANNEL_CAPACITY: usize = 1024;

/// Documents read at the start of a ledger transaction.
///
/// The global stats singleton is always part of the read set.
#[derive(Debug, Clone)]
pub struct TxnKeys {
    pub user_id: String,
    pub request_id: Option<String>,
}

/// Consistent view of the read set, handed to the transaction body.
#[derive(Debug, Clone)]
pub struct TxnSnapshot {
    pub user: Option<User>,
    pub request: Option<PrayerRequest>,
    pub global: Option<GlobalStats>,
    /// Server-assigned write time for this attempt
    pub server_time: DateTime<Utc>,
}

/// Documents to write when the transaction commits.
///
/// `user`, `global` and `request` are full documents; each store decides
/// whether that becomes a create or a field-masked update based on what
/// the snapshot contained. `prayer` is always a create.
#[derive(Debug, Clone, Default)]
pub struct TxnWrites {
    pub user: Option<User>,
    pub global: Option<GlobalStats>,
    pub request: Option<PrayerRequest>,
    pub prayer: Option<Prayer>,
}

/// Pure transaction body. May run more than once when the store retries
/// after a conflict, so it must not have side effects.
pub type TxnFn = Arc<dyn Fn(&TxnSnapshot) -> Result<TxnWrites, AppError> + Send + Sync>;

/// A request document was created or updated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestChange {
    pub request_id: String,
}

/// Transactional document store holding users, requests, prayers and the
/// global stats singleton.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    // ─── Point Reads ─────────────────────────────────────────────

    async fn get_user(&self, user_id: &str) -> Result<Option<User>, AppError>;

    async fn get_request(&self, request_id: &str) -> Result<Option<PrayerRequest>, AppError>;

    async fn get_global_stats(&self) -> Result<Option<GlobalStats>, AppError>;

    // ─── Transactions ────────────────────────────────────────────

    /// Read `keys`, run `apply` on the snapshot and commit its writes with
    /// serializable isolation. Conflicting commits are retried with fresh
    /// reads; errors returned by `apply` abort immediately.
    ///
    /// Returns the writes of the attempt that committed.
    async fn transact(&self, keys: TxnKeys, apply: TxnFn) -> Result<TxnWrites, AppError>;

    /// Mark a request complete if it is active and has reached its target.
    ///
    /// Returns `true` if the status was changed.
    async fn mark_complete_if_reached(&self, request_id: &str) -> Result<bool, AppError>;

    /// Reset every request to `prayerCount = 0, status = active`.
    ///
    /// Returns the number of requests reset.
    async fn reset_all_requests(&self) -> Result<usize, AppError>;

    // ─── Non-transactional Writes ────────────────────────────────

    /// Overwrite only the user's `personalRatio`. Creates a zero-valued user
    /// document if none exists.
    async fn set_personal_ratio(&self, user_id: &str, ratio: f64) -> Result<(), AppError>;

    /// Overwrite only `globalRatio`. Creates zero-valued stats if absent.
    async fn set_global_ratio(&self, ratio: f64) -> Result<(), AppError>;

    /// Atomically add `amount` to the user's credits, creating the user
    /// document if it does not exist. Returns the new balance.
    async fn increment_credits(&self, user_id: &str, amount: u64) -> Result<u64, AppError>;

    async fn set_notification_token(&self, user_id: &str, token: &str) -> Result<(), AppError>;

    /// Remove the stored notification token field. No-op if the user
    /// document does not exist.
    async fn delete_notification_token(&self, user_id: &str) -> Result<(), AppError>;

    // ─── Queries ─────────────────────────────────────────────────

    /// Active requests, oldest first.
    async fn list_active_requests(&self) -> Result<Vec<PrayerRequest>, AppError>;

    /// IDs of every request the user has prayed for.
    async fn prayed_request_ids(&self, user_id: &str) -> Result<Vec<String>, AppError>;

    // ─── Change Feed ─────────────────────────────────────────────

    /// Subscribe to request document changes.
    ///
    /// [`MemoryDb`] publishes its own writes. [`FirestoreDb`] forwards the
    /// collection listener started by
    /// [`FirestoreDb::listen_request_changes`], which includes writes made
    /// by other processes.
    fn request_changes(&self) -> broadcast::Receiver<RequestChange>;
}

/// Generate a new document ID.
pub fn new_document_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

pub(crate) fn change_channel() -> broadcast::Sender<RequestChange> {
    broadcast::channel(CHANGE_CHANNEL_CAPACITY).0
}
