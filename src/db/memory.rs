// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process ledger store.
//!
//! Mirrors Firestore's optimistic transactions: every document carries a
//! version, transaction reads happen without a lock, and the commit
//! re-validates the versions of the whole read set under a short commit
//! lock. A conflicting commit is retried from fresh reads.

use crate::db::{
    change_channel, LedgerStore, RequestChange, TxnFn, TxnKeys, TxnSnapshot, TxnWrites,
};
use crate::error::AppError;
use crate::models::{GlobalStats, Prayer, PrayerRequest, RequestStatus, User};
use async_trait::async_trait;
use dashmap::DashMap;
use rand::Rng;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, RwLock};
use std::time::Duration;
use tokio::sync::broadcast;

/// Attempts made for one transaction before giving up on contention.
///
/// Each conflict round lets at least one writer commit, so this bounds the
/// number of writers that can contend for one document.
pub const MAX_TRANSACTION_ATTEMPTS: u32 = 32;

/// Backoff before retry `attempt`: exponential up to 64ms, scaled by a
/// random factor in [0.5, 1.5) so conflicting writers spread out.
fn retry_delay(attempt: u32) -> Duration {
    let base_us = 1000u64 << attempt.min(6);
    let jitter_us = rand::thread_rng().gen_range(0..base_us);
    Duration::from_micros(base_us / 2 + jitter_us)
}

#[derive(Debug, Clone)]
struct Versioned<T> {
    version: u64,
    doc: T,
}

/// Versions observed for the read set; 0 means "document absent".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ReadVersions {
    user: u64,
    request: u64,
    global: u64,
}

/// In-memory implementation of [`LedgerStore`].
pub struct MemoryDb {
    users: DashMap<String, Versioned<User>>,
    requests: DashMap<String, Versioned<PrayerRequest>>,
    prayers: DashMap<String, Prayer>,
    global: RwLock<Option<Versioned<GlobalStats>>>,
    commit_lock: Mutex<()>,
    changes: broadcast::Sender<RequestChange>,
    conflicts: AtomicU64,
    offline: AtomicBool,
    fail_ratio_writes: AtomicBool,
}

impl Default for MemoryDb {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDb {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            requests: DashMap::new(),
            prayers: DashMap::new(),
            global: RwLock::new(None),
            commit_lock: Mutex::new(()),
            changes: change_channel(),
            conflicts: AtomicU64::new(0),
            offline: AtomicBool::new(false),
            fail_ratio_writes: AtomicBool::new(false),
        }
    }

    // ─── Seeding & Inspection ────────────────────────────────────

    /// Insert or replace a request document as-is (seeding, fixtures).
    pub fn insert_request(&self, request: PrayerRequest) {
        let _guard = self.lock_commits();
        let version = self.request_version(&request.id) + 1;
        self.requests.insert(
            request.id.clone(),
            Versioned {
                version,
                doc: request,
            },
        );
    }

    /// Insert or replace a user document as-is.
    pub fn insert_user(&self, user: User) {
        let _guard = self.lock_commits();
        let version = self.user_version(&user.id) + 1;
        self.users.insert(user.id.clone(), Versioned { version, doc: user });
    }

    /// Replace the global stats singleton as-is.
    pub fn insert_global_stats(&self, stats: GlobalStats) {
        let _guard = self.lock_commits();
        let mut global = self.global.write().unwrap_or_else(|e| e.into_inner());
        let version = global.as_ref().map_or(0, |g| g.version) + 1;
        *global = Some(Versioned {
            version,
            doc: stats,
        });
    }

    /// All recorded prayers, in no particular order.
    pub fn prayers(&self) -> Vec<Prayer> {
        self.prayers.iter().map(|p| p.value().clone()).collect()
    }

    /// Number of transaction commits rejected because of a conflict.
    pub fn conflict_count(&self) -> u64 {
        self.conflicts.load(Ordering::Relaxed)
    }

    /// Fail every operation with a database error (outage simulation).
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Relaxed);
    }

    /// Fail only the ratio writes made by the reconciler.
    pub fn set_fail_ratio_writes(&self, fail: bool) {
        self.fail_ratio_writes.store(fail, Ordering::Relaxed);
    }

    // ─── Internals ───────────────────────────────────────────────

    fn check_online(&self) -> Result<(), AppError> {
        if self.offline.load(Ordering::Relaxed) {
            return Err(AppError::Database(
                "Database not connected (offline mode)".to_string(),
            ));
        }
        Ok(())
    }

    fn check_ratio_writes(&self) -> Result<(), AppError> {
        self.check_online()?;
        if self.fail_ratio_writes.load(Ordering::Relaxed) {
            return Err(AppError::Database("Ratio write rejected".to_string()));
        }
        Ok(())
    }

    fn lock_commits(&self) -> MutexGuard<'_, ()> {
        self.commit_lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn user_version(&self, user_id: &str) -> u64 {
        self.users.get(user_id).map_or(0, |u| u.version)
    }

    fn request_version(&self, request_id: &str) -> u64 {
        self.requests.get(request_id).map_or(0, |r| r.version)
    }

    fn global_version(&self) -> u64 {
        self.global
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map_or(0, |g| g.version)
    }

    fn read_set(&self, keys: &TxnKeys) -> (TxnSnapshot, ReadVersions) {
        let (user, user_version) = match self.users.get(&keys.user_id) {
            Some(entry) => (Some(entry.doc.clone()), entry.version),
            None => (None, 0),
        };

        let (request, request_version) = match keys
            .request_id
            .as_deref()
            .and_then(|id| self.requests.get(id))
        {
            Some(entry) => (Some(entry.doc.clone()), entry.version),
            None => (None, 0),
        };

        let (global, global_version) = match self
            .global
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
        {
            Some(entry) => (Some(entry.doc.clone()), entry.version),
            None => (None, 0),
        };

        let snapshot = TxnSnapshot {
            user,
            request,
            global,
            server_time: chrono::Utc::now(),
        };
        let versions = ReadVersions {
            user: user_version,
            request: request_version,
            global: global_version,
        };
        (snapshot, versions)
    }

    /// Validate the read set and apply the writes. Returns `false` on conflict.
    fn try_commit(&self, keys: &TxnKeys, seen: ReadVersions, writes: &TxnWrites) -> bool {
        let _guard = self.lock_commits();

        let current = ReadVersions {
            user: self.user_version(&keys.user_id),
            request: keys
                .request_id
                .as_deref()
                .map_or(0, |id| self.request_version(id)),
            global: self.global_version(),
        };
        if current != seen {
            return false;
        }

        if let Some(user) = &writes.user {
            let mut doc = user.clone();
            doc.id = keys.user_id.clone();
            self.users.insert(
                keys.user_id.clone(),
                Versioned {
                    version: seen.user + 1,
                    doc,
                },
            );
        }

        if let Some(request) = &writes.request {
            let version = self.request_version(&request.id) + 1;
            self.requests.insert(
                request.id.clone(),
                Versioned {
                    version,
                    doc: request.clone(),
                },
            );
        }

        if let Some(prayer) = &writes.prayer {
            self.prayers.insert(prayer.id.clone(), prayer.clone());
        }

        if let Some(stats) = &writes.global {
            *self.global.write().unwrap_or_else(|e| e.into_inner()) = Some(Versioned {
                version: seen.global + 1,
                doc: stats.clone(),
            });
        }

        true
    }

    fn publish(&self, request_id: &str) {
        // No receivers is fine; the change feed is best-effort.
        let _ = self.changes.send(RequestChange {
            request_id: request_id.to_string(),
        });
    }

    /// Apply `update` to the user document (creating it if absent) under the
    /// commit lock. Returns the updated document.
    fn update_user<F>(&self, user_id: &str, update: F) -> User
    where
        F: FnOnce(&mut User),
    {
        let _guard = self.lock_commits();
        let mut entry = self
            .users
            .entry(user_id.to_string())
            .or_insert_with(|| Versioned {
                version: 0,
                doc: User::empty(user_id),
            });
        update(&mut entry.doc);
        entry.version += 1;
        entry.doc.clone()
    }
}

#[async_trait]
impl LedgerStore for MemoryDb {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>, AppError> {
        self.check_online()?;
        Ok(self.users.get(user_id).map(|u| u.doc.clone()))
    }

    async fn get_request(&self, request_id: &str) -> Result<Option<PrayerRequest>, AppError> {
        self.check_online()?;
        Ok(self.requests.get(request_id).map(|r| r.doc.clone()))
    }

    async fn get_global_stats(&self) -> Result<Option<GlobalStats>, AppError> {
        self.check_online()?;
        Ok(self
            .global
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|g| g.doc.clone()))
    }

    async fn transact(&self, keys: TxnKeys, apply: TxnFn) -> Result<TxnWrites, AppError> {
        for attempt in 1..=MAX_TRANSACTION_ATTEMPTS {
            self.check_online()?;

            let (snapshot, seen) = self.read_set(&keys);

            // Let concurrent transactions interleave between read and commit.
            tokio::task::yield_now().await;

            let writes = apply(&snapshot)?;

            if self.try_commit(&keys, seen, &writes) {
                if seen.request > 0 {
                    if let Some(request) = &writes.request {
                        self.publish(&request.id);
                    }
                }
                return Ok(writes);
            }

            self.conflicts.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                user_id = %keys.user_id,
                request_id = ?keys.request_id,
                attempt,
                "Transaction conflict, retrying"
            );
            tokio::time::sleep(retry_delay(attempt)).await;
        }

        Err(AppError::Database(format!(
            "Transaction aborted after {} attempts due to contention",
            MAX_TRANSACTION_ATTEMPTS
        )))
    }

    async fn mark_complete_if_reached(&self, request_id: &str) -> Result<bool, AppError> {
        self.check_online()?;

        let changed = {
            let _guard = self.lock_commits();
            match self.requests.get_mut(request_id) {
                Some(mut entry) if entry.doc.needs_completion() => {
                    entry.doc.status = RequestStatus::Complete;
                    entry.version += 1;
                    true
                }
                _ => false,
            }
        };

        if changed {
            self.publish(request_id);
        }
        Ok(changed)
    }

    async fn reset_all_requests(&self) -> Result<usize, AppError> {
        self.check_online()?;

        let ids: Vec<String> = {
            let _guard = self.lock_commits();
            self.requests
                .iter_mut()
                .map(|mut entry| {
                    entry.doc.prayer_count = 0;
                    entry.doc.status = RequestStatus::Active;
                    entry.version += 1;
                    entry.key().clone()
                })
                .collect()
        };

        for id in &ids {
            self.publish(id);
        }
        Ok(ids.len())
    }

    async fn set_personal_ratio(&self, user_id: &str, ratio: f64) -> Result<(), AppError> {
        self.check_ratio_writes()?;
        self.update_user(user_id, |user| user.personal_ratio = ratio);
        Ok(())
    }

    async fn set_global_ratio(&self, ratio: f64) -> Result<(), AppError> {
        self.check_ratio_writes()?;

        let _guard = self.lock_commits();
        let mut global = self.global.write().unwrap_or_else(|e| e.into_inner());
        let entry = global.get_or_insert_with(|| Versioned {
            version: 0,
            doc: GlobalStats::default(),
        });
        entry.doc.global_ratio = ratio;
        entry.version += 1;
        Ok(())
    }

    async fn increment_credits(&self, user_id: &str, amount: u64) -> Result<u64, AppError> {
        self.check_online()?;
        let user = self.update_user(user_id, |user| user.prayer_request_credits += amount);
        Ok(user.prayer_request_credits)
    }

    async fn set_notification_token(&self, user_id: &str, token: &str) -> Result<(), AppError> {
        self.check_online()?;
        self.update_user(user_id, |user| {
            user.notification_token = Some(token.to_string())
        });
        Ok(())
    }

    async fn delete_notification_token(&self, user_id: &str) -> Result<(), AppError> {
        self.check_online()?;

        let _guard = self.lock_commits();
        if let Some(mut entry) = self.users.get_mut(user_id) {
            entry.doc.notification_token = None;
            entry.version += 1;
        }
        Ok(())
    }

    async fn list_active_requests(&self) -> Result<Vec<PrayerRequest>, AppError> {
        self.check_online()?;

        let mut active: Vec<PrayerRequest> = self
            .requests
            .iter()
            .filter(|r| r.doc.status == RequestStatus::Active)
            .map(|r| r.doc.clone())
            .collect();
        active.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(active)
    }

    async fn prayed_request_ids(&self, user_id: &str) -> Result<Vec<String>, AppError> {
        self.check_online()?;
        Ok(self
            .prayers
            .iter()
            .filter(|p| p.user_id == user_id)
            .map(|p| p.request_id.clone())
            .collect())
    }

    fn request_changes(&self) -> broadcast::Receiver<RequestChange> {
        self.changes.subscribe()
    }
}
