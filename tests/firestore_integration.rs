// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore integration tests.
//!
//! These tests require the Firestore emulator to be running.
//! Set FIRESTORE_EMULATOR_HOST to run them; otherwise they are skipped.

use prayer_ledger::db::{LedgerStore, TxnFn, TxnKeys, TxnSnapshot, TxnWrites};
use prayer_ledger::error::AppError;
use prayer_ledger::ledger::{CompletionWatcher, Ledger};
use prayer_ledger::models::{PrayerRequest, RequestStatus};
use prayer_ledger::services::LogNotifier;
use std::sync::Arc;
use std::time::Duration;

mod common;
use common::{caller, test_db};

/// Generate a unique user ID for test isolation.
fn unique_uid(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4().simple())
}

async fn test_ledger() -> (Ledger, Arc<prayer_ledger::db::FirestoreDb>) {
    let db = Arc::new(test_db().await);
    (Ledger::new(db.clone(), Arc::new(LogNotifier)), db)
}

// ═══════════════════════════════════════════════════════════════════════════
// REQUEST & PRAYER TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_submit_then_pray_until_complete() {
    require_emulator!();

    let (ledger, db) = test_ledger().await;
    let owner = unique_uid("owner");

    let submitted = ledger
        .submit_prayer_request(&caller(&owner), "integration request")
        .await
        .unwrap();
    submitted.follow_up.await.unwrap();
    let request_id = submitted.receipt.request_id.clone();
    let target = submitted.receipt.target_prayer_num;
    assert!(target >= 10);

    let stored = db.get_request(&request_id).await.unwrap().unwrap();
    assert_eq!(stored.user_id, owner);
    assert_eq!(stored.prayer_count, 0);
    assert_eq!(stored.status, RequestStatus::Active);

    let prayer = unique_uid("prayer");
    for n in 1..=target {
        let committed = ledger
            .pray_for_request(&caller(&prayer), &request_id, "amen")
            .await
            .unwrap();
        assert_eq!(committed.receipt.prayer_count, n);
        assert_eq!(committed.receipt.is_complete, n == target);
    }

    let stored = db.get_request(&request_id).await.unwrap().unwrap();
    assert_eq!(stored.status, RequestStatus::Complete);

    let user = db.get_user(&prayer).await.unwrap().unwrap();
    assert_eq!(user.prayers_completed, u64::from(target));
    assert_eq!(
        db.prayed_request_ids(&prayer).await.unwrap().len(),
        target as usize
    );

    let err = ledger
        .pray_for_request(&caller(&prayer), &request_id, "one more")
        .await
        .err()
        .unwrap();
    assert!(matches!(err, AppError::FailedPrecondition(_)));
}

#[tokio::test]
async fn test_concurrent_prayers_are_all_counted() {
    require_emulator!();

    let (ledger, db) = test_ledger().await;
    let owner = unique_uid("owner");
    let request_id = ledger
        .submit_prayer_request(&caller(&owner), "concurrency")
        .await
        .unwrap()
        .receipt
        .request_id;

    let mut handles = Vec::new();
    for i in 0..5 {
        let ledger = ledger.clone();
        let request_id = request_id.clone();
        handles.push(tokio::spawn(async move {
            let uid = format!("concurrent-{i}");
            ledger
                .pray_for_request(&caller(&uid), &request_id, "amen")
                .await
                .map(|c| c.receipt)
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let stored = db.get_request(&request_id).await.unwrap().unwrap();
    assert_eq!(stored.prayer_count, 5);
}

// ═══════════════════════════════════════════════════════════════════════════
// USER FIELD TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_credits_and_notification_token() {
    require_emulator!();

    let db = test_db().await;
    let uid = unique_uid("credits");

    assert_eq!(db.increment_credits(&uid, 1).await.unwrap(), 1);
    assert_eq!(db.increment_credits(&uid, 1).await.unwrap(), 2);

    db.set_notification_token(&uid, "device-1").await.unwrap();
    let user = db.get_user(&uid).await.unwrap().unwrap();
    assert_eq!(user.prayer_request_credits, 2);
    assert_eq!(user.notification_token.as_deref(), Some("device-1"));

    db.delete_notification_token(&uid).await.unwrap();
    let user = db.get_user(&uid).await.unwrap().unwrap();
    assert!(user.notification_token.is_none());
    assert_eq!(user.prayer_request_credits, 2);
}

#[tokio::test]
async fn test_personal_ratio_write_keeps_counters() {
    require_emulator!();

    let (ledger, db) = test_ledger().await;
    let uid = unique_uid("ratio");

    let committed = ledger
        .submit_prayer_request(&caller(&uid), "ratio")
        .await
        .unwrap();
    committed.follow_up.await.unwrap();

    db.set_personal_ratio(&uid, 4.25).await.unwrap();
    let user = db.get_user(&uid).await.unwrap().unwrap();
    assert_eq!(user.personal_ratio, 4.25);
    assert_eq!(user.requests_submitted, 1);
}

#[tokio::test]
async fn test_token_removal_for_missing_user_is_noop() {
    require_emulator!();

    let db = test_db().await;
    let uid = unique_uid("no-user");

    db.delete_notification_token(&uid).await.unwrap();
    assert!(db.get_user(&uid).await.unwrap().is_none());
}

#[tokio::test]
async fn test_ratio_write_creates_full_user() {
    require_emulator!();

    let db = test_db().await;
    let uid = unique_uid("new-ratio");

    db.set_personal_ratio(&uid, 1.5).await.unwrap();
    let user = db.get_user(&uid).await.unwrap().unwrap();
    assert_eq!(user.personal_ratio, 1.5);
    assert_eq!(user.prayers_completed, 0);
    assert_eq!(user.requests_submitted, 0);
    assert_eq!(user.prayer_request_credits, 0);

    // Existing users only get the ratio field rewritten.
    db.increment_credits(&uid, 3).await.unwrap();
    db.set_personal_ratio(&uid, 2.0).await.unwrap();
    let user = db.get_user(&uid).await.unwrap().unwrap();
    assert_eq!(user.personal_ratio, 2.0);
    assert_eq!(user.prayer_request_credits, 3);
}

// ═══════════════════════════════════════════════════════════════════════════
// CHANGE FEED TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_listener_completes_request_written_by_another_client() {
    require_emulator!();

    let db = Arc::new(test_db().await);
    let _watcher = CompletionWatcher::spawn(db.clone());
    let listener = db.listen_request_changes().await.unwrap();

    // A separate client stands in for another process writing the request.
    let writer = test_db().await;
    let owner = unique_uid("owner");
    let request = PrayerRequest {
        id: unique_uid("external"),
        user_id: owner.clone(),
        text: "written elsewhere".to_string(),
        prayer_count: 10,
        target_prayer_num: 10,
        status: RequestStatus::Active,
        created_at: "2026-01-01T00:00:00.000Z".to_string(),
    };
    let request_id = request.id.clone();
    let apply: TxnFn = Arc::new(move |_: &TxnSnapshot| {
        Ok(TxnWrites {
            request: Some(request.clone()),
            ..TxnWrites::default()
        })
    });
    writer
        .transact(
            TxnKeys {
                user_id: owner,
                request_id: Some(request_id.clone()),
            },
            apply,
        )
        .await
        .unwrap();

    let mut completed = false;
    for _ in 0..100 {
        let stored = db.get_request(&request_id).await.unwrap().unwrap();
        if stored.status == RequestStatus::Complete {
            completed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(completed, "listener should drive completion of external writes");

    listener.shutdown().await.unwrap();
}
