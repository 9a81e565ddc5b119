// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session-scoped credit grants.
//!
//! Every tenth successful prayer within a client session earns the user one
//! request credit. The session counter lives on the client and is never
//! reconciled with the server-side `prayersCompleted`.

use crate::db::LedgerStore;
use serde::Serialize;
use std::sync::Arc;

/// Prayers per granted credit.
pub const PRAYERS_PER_CREDIT: u64 = 10;

/// True iff a session that has just reached `session_count` prayers earns a credit.
pub fn should_grant_credit(session_count: u64) -> bool {
    session_count > 0 && session_count % PRAYERS_PER_CREDIT == 0
}

/// Client-local count of successful prayers.
#[derive(Debug, Clone, Default)]
pub struct PrayerSession {
    count: u64,
}

impl PrayerSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one more successful prayer and return the new total.
    pub fn increment(&mut self) -> u64 {
        self.count += 1;
        self.count
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(ts_rs::TS))]
#[cfg_attr(feature = "binding-generation", ts(export))]
pub struct CreditGrant {
    pub granted: bool,
    pub session_count: u64,
}

/// Grants credits with a best-effort increment outside any transaction.
#[derive(Clone)]
pub struct CreditGrantor {
    store: Arc<dyn LedgerStore>,
}

impl CreditGrantor {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Count a successful prayer in `session` and grant a credit if the new
    /// count earns one.
    pub async fn after_prayer(&self, session: &mut PrayerSession, user_id: &str) -> CreditGrant {
        let session_count = session.increment();
        self.grant_for_count(user_id, session_count).await
    }

    /// Apply the grant rule to a session count reported by the client.
    ///
    /// Failures are logged and reported as not granted.
    pub async fn grant_for_count(&self, user_id: &str, session_count: u64) -> CreditGrant {
        if !should_grant_credit(session_count) {
            return CreditGrant {
                granted: false,
                session_count,
            };
        }

        match self.store.increment_credits(user_id, 1).await {
            Ok(balance) => {
                tracing::info!(user_id, session_count, balance, "Granted prayer request credit");
                CreditGrant {
                    granted: true,
                    session_count,
                }
            }
            Err(e) => {
                tracing::error!(user_id, session_count, error = %e, "Failed to grant credit");
                CreditGrant {
                    granted: false,
                    session_count,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryDb;

    #[test]
    fn grant_rule() {
        assert!(!should_grant_credit(0));
        assert!(!should_grant_credit(9));
        assert!(should_grant_credit(10));
        assert!(!should_grant_credit(11));
        assert!(should_grant_credit(20));
    }

    #[test]
    fn session_counts_and_resets() {
        let mut session = PrayerSession::new();
        assert_eq!(session.increment(), 1);
        assert_eq!(session.increment(), 2);
        session.reset();
        assert_eq!(session.count(), 0);
    }

    #[tokio::test]
    async fn twenty_five_prayers_grant_two_credits() {
        let store = Arc::new(MemoryDb::new());
        let grantor = CreditGrantor::new(store.clone());
        let mut session = PrayerSession::new();

        let mut grants = vec![];
        for _ in 0..25 {
            if grantor.after_prayer(&mut session, "carol").await.granted {
                grants.push(session.count());
            }
        }

        assert_eq!(grants, vec![10, 20]);
        let user = store.get_user("carol").await.unwrap().unwrap();
        assert_eq!(user.prayer_request_credits, 2);
    }

    #[tokio::test]
    async fn store_failure_is_not_granted() {
        let store = Arc::new(MemoryDb::new());
        store.set_offline(true);
        let grantor = CreditGrantor::new(store);

        let grant = grantor.grant_for_count("carol", 10).await;
        assert_eq!(
            grant,
            CreditGrant {
                granted: false,
                session_count: 10
            }
        );
    }
}
