// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore-backed ledger store.
//!
//! Transactions go through the client's `run_transaction`, which reads with
//! the transaction's consistency selector and retries the whole body with
//! backoff when the commit is aborted by a concurrent writer.
//!
//! The request change feed is driven by a Firestore listener on the
//! request collection, so writes from other instances and tools are seen
//! too. See [`FirestoreDb::listen_request_changes`].

use crate::db::{
    change_channel, collections, LedgerStore, RequestChange, TxnFn, TxnKeys, TxnSnapshot,
    TxnWrites, BATCH_SIZE,
};
use crate::error::AppError;
use crate::models::{GlobalStats, Prayer, PrayerRequest, RequestStatus, User};
use async_trait::async_trait;
use firestore::errors::{BackoffError, FirestoreError};
use firestore::{
    FirestoreListenEvent, FirestoreListener, FirestoreListenerTarget,
    FirestoreMemListenStateStorage,
};
use futures_util::FutureExt;
use tokio::sync::broadcast;

/// Fields rewritten on an existing user by a ledger transaction.
const USER_COUNTER_FIELDS: [&str; 3] =
    ["prayersCompleted", "requestsSubmitted", "prayerRequestCredits"];
/// Fields rewritten on an existing request by a prayer or a reset.
const REQUEST_COUNTER_FIELDS: [&str; 2] = ["prayerCount", "status"];
/// Fields rewritten on the existing global stats document.
const GLOBAL_COUNTER_FIELDS: [&str; 2] = ["prayersCompleted", "requestsSubmitted"];

/// Listener target watching the whole request collection.
const REQUEST_LISTENER_TARGET: u32 = 1;

type TxnBodyResult<T> = Result<T, BackoffError<FirestoreError>>;

/// A single-field write to a user document.
#[derive(Debug, Clone)]
enum UserField {
    PersonalRatio(f64),
    NotificationToken(Option<String>),
}

impl UserField {
    fn name(&self) -> &'static str {
        match self {
            UserField::PersonalRatio(_) => "personalRatio",
            UserField::NotificationToken(_) => "notificationToken",
        }
    }

    fn apply(&self, user: &mut User) {
        match self {
            UserField::PersonalRatio(ratio) => user.personal_ratio = *ratio,
            UserField::NotificationToken(token) => user.notification_token = token.clone(),
        }
    }

    /// Removing a field from a missing user has nothing to do.
    fn creates_user(&self) -> bool {
        !matches!(self, UserField::NotificationToken(None))
    }
}

/// Extract the document ID from a full document resource name
/// (`projects/p/databases/d/documents/prayerRequests/{id}`).
fn document_id_from_name(name: &str) -> Option<&str> {
    name.rsplit('/').next().filter(|id| !id.is_empty())
}

/// Running listener that forwards request document changes into the
/// store's change feed. Dropping it without [`shutdown`](Self::shutdown)
/// leaves the listen stream running until the process exits.
pub struct RequestListener {
    listener: FirestoreListener<firestore::FirestoreDb, FirestoreMemListenStateStorage>,
}

impl RequestListener {
    pub async fn shutdown(mut self) -> Result<(), AppError> {
        self.listener
            .shutdown()
            .await
            .map_err(|e| AppError::Database(format!("Failed to stop request listener: {}", e)))
    }
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
    changes: broadcast::Sender<RequestChange>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self::with_client(Some(client)))
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJvd25lciJ9."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self::with_client(Some(client)))
    }

    /// Create a disconnected client (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self::with_client(None)
    }

    fn with_client(client: Option<firestore::FirestoreDb>) -> Self {
        Self {
            client,
            changes: change_channel(),
        }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    /// Start listening to the request collection and forward every changed
    /// document ID to [`LedgerStore::request_changes`] subscribers.
    ///
    /// The initial listen replays every existing request, so subscribers
    /// also get a catch-up pass over documents written while no listener
    /// was running. Subscribe before calling this.
    pub async fn listen_request_changes(&self) -> Result<RequestListener, AppError> {
        let client = self.get_client()?;

        let mut listener = client
            .create_listener(FirestoreMemListenStateStorage::new())
            .await
            .map_err(|e| AppError::Database(format!("Failed to create request listener: {}", e)))?;

        client
            .fluent()
            .select()
            .from(collections::PRAYER_REQUESTS)
            .listen()
            .add_target(
                FirestoreListenerTarget::new(REQUEST_LISTENER_TARGET),
                &mut listener,
            )
            .map_err(|e| AppError::Database(format!("Failed to add request listen target: {}", e)))?;

        let changes = self.changes.clone();
        listener
            .start(move |event| {
                let changes = changes.clone();
                async move {
                    if let FirestoreListenEvent::DocumentChange(ref doc_change) = event {
                        if let Some(id) = doc_change
                            .document
                            .as_ref()
                            .and_then(|doc| document_id_from_name(&doc.name))
                        {
                            // No receivers is fine; the change feed is best-effort.
                            let _ = changes.send(RequestChange {
                                request_id: id.to_string(),
                            });
                        }
                    }
                    Ok(())
                }
            })
            .await
            .map_err(|e| AppError::Database(format!("Failed to start request listener: {}", e)))?;

        tracing::info!(
            collection = collections::PRAYER_REQUESTS,
            "Listening for request changes"
        );
        Ok(RequestListener { listener })
    }

    /// Read the transaction's snapshot through the transaction-scoped client.
    async fn read_snapshot(
        db: &firestore::FirestoreDb,
        keys: &TxnKeys,
    ) -> TxnBodyResult<TxnSnapshot> {
        let user: Option<User> = db
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(&keys.user_id)
            .await?;

        let request: Option<PrayerRequest> = match &keys.request_id {
            Some(request_id) => {
                db.fluent()
                    .select()
                    .by_id_in(collections::PRAYER_REQUESTS)
                    .obj()
                    .one(request_id)
                    .await?
            }
            None => None,
        };

        let global: Option<GlobalStats> = db
            .fluent()
            .select()
            .by_id_in(collections::STATS)
            .obj()
            .one(collections::GLOBAL_STATS_ID)
            .await?;

        Ok(TxnSnapshot {
            user,
            request,
            global,
            server_time: chrono::Utc::now(),
        })
    }

    /// Queue the writes produced by a transaction body.
    ///
    /// Documents present in the snapshot get a field-masked update so that
    /// fields owned by other writers (ratios, notification token) survive.
    fn queue_writes(
        db: &firestore::FirestoreDb,
        transaction: &mut firestore::FirestoreTransaction<'_>,
        keys: &TxnKeys,
        snapshot: &TxnSnapshot,
        writes: &TxnWrites,
    ) -> TxnBodyResult<()> {
        if let Some(user) = &writes.user {
            let update = db.fluent().update();
            let update = if snapshot.user.is_some() {
                update.fields(USER_COUNTER_FIELDS)
            } else {
                update
            };
            update
                .in_col(collections::USERS)
                .document_id(&keys.user_id)
                .object(user)
                .add_to_transaction(transaction)?;
        }

        if let Some(request) = &writes.request {
            let update = db.fluent().update();
            let update = if snapshot.request.is_some() {
                update.fields(REQUEST_COUNTER_FIELDS)
            } else {
                update
            };
            update
                .in_col(collections::PRAYER_REQUESTS)
                .document_id(&request.id)
                .object(request)
                .add_to_transaction(transaction)?;
        }

        if let Some(prayer) = &writes.prayer {
            db.fluent()
                .update()
                .in_col(collections::PRAYERS)
                .document_id(&prayer.id)
                .object(prayer)
                .add_to_transaction(transaction)?;
        }

        if let Some(stats) = &writes.global {
            let update = db.fluent().update();
            let update = if snapshot.global.is_some() {
                update.fields(GLOBAL_COUNTER_FIELDS)
            } else {
                update
            };
            update
                .in_col(collections::STATS)
                .document_id(collections::GLOBAL_STATS_ID)
                .object(stats)
                .add_to_transaction(transaction)?;
        }

        Ok(())
    }

    /// One attempt of a ledger transaction.
    ///
    /// Business rejections from `apply` come back as `Ok(Err(_))` so the
    /// client commits nothing and does not retry.
    async fn transaction_body(
        db: firestore::FirestoreDb,
        transaction: &mut firestore::FirestoreTransaction<'_>,
        keys: TxnKeys,
        apply: TxnFn,
    ) -> TxnBodyResult<Result<TxnWrites, AppError>> {
        let snapshot = Self::read_snapshot(&db, &keys).await?;

        let writes = match apply(&snapshot) {
            Ok(writes) => writes,
            Err(e) => return Ok(Err(e)),
        };

        Self::queue_writes(&db, transaction, &keys, &snapshot, &writes)?;
        Ok(Ok(writes))
    }

    async fn completion_body(
        db: firestore::FirestoreDb,
        transaction: &mut firestore::FirestoreTransaction<'_>,
        request_id: String,
    ) -> TxnBodyResult<bool> {
        let request: Option<PrayerRequest> = db
            .fluent()
            .select()
            .by_id_in(collections::PRAYER_REQUESTS)
            .obj()
            .one(&request_id)
            .await?;

        let Some(mut request) = request.filter(|r| r.needs_completion()) else {
            return Ok(false);
        };

        request.status = RequestStatus::Complete;
        db.fluent()
            .update()
            .fields(["status"])
            .in_col(collections::PRAYER_REQUESTS)
            .document_id(&request_id)
            .object(&request)
            .add_to_transaction(transaction)?;
        Ok(true)
    }

    async fn credit_body(
        db: firestore::FirestoreDb,
        transaction: &mut firestore::FirestoreTransaction<'_>,
        user_id: String,
        amount: u64,
    ) -> TxnBodyResult<u64> {
        let existing: Option<User> = db
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(&user_id)
            .await?;

        let exists = existing.is_some();
        let mut user = existing.unwrap_or_else(|| User::empty(user_id.as_str()));
        user.prayer_request_credits += amount;

        let update = db.fluent().update();
        let update = if exists {
            update.fields(["prayerRequestCredits"])
        } else {
            update
        };
        update
            .in_col(collections::USERS)
            .document_id(&user_id)
            .object(&user)
            .add_to_transaction(transaction)?;

        Ok(user.prayer_request_credits)
    }

    /// Write one user field. An existing user gets a field-masked update;
    /// a missing user is created as a full zero-valued document, unless the
    /// write only removes a field.
    async fn user_field_body(
        db: firestore::FirestoreDb,
        transaction: &mut firestore::FirestoreTransaction<'_>,
        user_id: String,
        field: UserField,
    ) -> TxnBodyResult<()> {
        let existing: Option<User> = db
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(&user_id)
            .await?;

        let exists = existing.is_some();
        if !exists && !field.creates_user() {
            return Ok(());
        }

        let mut user = existing.unwrap_or_else(|| User::empty(user_id.as_str()));
        field.apply(&mut user);

        let update = db.fluent().update();
        let update = if exists {
            update.fields([field.name()])
        } else {
            update
        };
        update
            .in_col(collections::USERS)
            .document_id(&user_id)
            .object(&user)
            .add_to_transaction(transaction)?;

        Ok(())
    }

    async fn update_user_field(&self, user_id: &str, field: UserField) -> Result<(), AppError> {
        let id = user_id.to_string();
        let name = field.name();

        self.get_client()?
            .run_transaction(|db, transaction| {
                Self::user_field_body(db, transaction, id.clone(), field.clone()).boxed()
            })
            .await
            .map_err(|e| AppError::Database(format!("Failed to update {}: {}", name, e)))
    }
}

#[async_trait]
impl LedgerStore for FirestoreDb {
    // ─── Point Reads ─────────────────────────────────────────────

    async fn get_user(&self, user_id: &str) -> Result<Option<User>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(user_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn get_request(&self, request_id: &str) -> Result<Option<PrayerRequest>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::PRAYER_REQUESTS)
            .obj()
            .one(request_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn get_global_stats(&self) -> Result<Option<GlobalStats>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::STATS)
            .obj()
            .one(collections::GLOBAL_STATS_ID)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    // ─── Transactions ────────────────────────────────────────────

    async fn transact(&self, keys: TxnKeys, apply: TxnFn) -> Result<TxnWrites, AppError> {
        let outcome = self
            .get_client()?
            .run_transaction(|db, transaction| {
                Self::transaction_body(db, transaction, keys.clone(), apply.clone()).boxed()
            })
            .await
            .map_err(|e| AppError::Database(format!("Transaction failed: {}", e)))?;

        let writes = outcome?;

        tracing::debug!(
            user_id = %keys.user_id,
            request_id = ?keys.request_id,
            "Ledger transaction committed"
        );

        Ok(writes)
    }

    async fn mark_complete_if_reached(&self, request_id: &str) -> Result<bool, AppError> {
        let id = request_id.to_string();

        let changed = self
            .get_client()?
            .run_transaction(|db, transaction| {
                Self::completion_body(db, transaction, id.clone()).boxed()
            })
            .await
            .map_err(|e| AppError::Database(format!("Completion update failed: {}", e)))?;

        if changed {
            tracing::debug!(request_id, "Request completion committed");
        }
        Ok(changed)
    }

    async fn reset_all_requests(&self) -> Result<usize, AppError> {
        let client = self.get_client()?;

        let requests: Vec<PrayerRequest> = client
            .fluent()
            .select()
            .from(collections::PRAYER_REQUESTS)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        for chunk in requests.chunks(BATCH_SIZE) {
            let mut transaction = client
                .begin_transaction()
                .await
                .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

            for request in chunk {
                let reset = PrayerRequest {
                    prayer_count: 0,
                    status: RequestStatus::Active,
                    ..request.clone()
                };
                client
                    .fluent()
                    .update()
                    .fields(REQUEST_COUNTER_FIELDS)
                    .in_col(collections::PRAYER_REQUESTS)
                    .document_id(&request.id)
                    .object(&reset)
                    .add_to_transaction(&mut transaction)
                    .map_err(|e| {
                        AppError::Database(format!("Failed to add reset to transaction: {}", e))
                    })?;
            }

            transaction
                .commit()
                .await
                .map_err(|e| AppError::Database(format!("Failed to commit batch reset: {}", e)))?;

            tracing::debug!(count = chunk.len(), "Committed request reset batch");
        }

        Ok(requests.len())
    }

    // ─── Non-transactional Writes ────────────────────────────────

    async fn set_personal_ratio(&self, user_id: &str, ratio: f64) -> Result<(), AppError> {
        self.update_user_field(user_id, UserField::PersonalRatio(ratio))
            .await
    }

    async fn set_global_ratio(&self, ratio: f64) -> Result<(), AppError> {
        let stats = GlobalStats {
            global_ratio: ratio,
            ..GlobalStats::default()
        };
        let _: GlobalStats = self
            .get_client()?
            .fluent()
            .update()
            .fields(["globalRatio"])
            .in_col(collections::STATS)
            .document_id(collections::GLOBAL_STATS_ID)
            .object(&stats)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn increment_credits(&self, user_id: &str, amount: u64) -> Result<u64, AppError> {
        let id = user_id.to_string();

        self.get_client()?
            .run_transaction(|db, transaction| {
                Self::credit_body(db, transaction, id.clone(), amount).boxed()
            })
            .await
            .map_err(|e| AppError::Database(format!("Credit increment failed: {}", e)))
    }

    async fn set_notification_token(&self, user_id: &str, token: &str) -> Result<(), AppError> {
        self.update_user_field(
            user_id,
            UserField::NotificationToken(Some(token.to_string())),
        )
        .await
    }

    async fn delete_notification_token(&self, user_id: &str) -> Result<(), AppError> {
        // A masked field that is absent from the object is deleted.
        self.update_user_field(user_id, UserField::NotificationToken(None))
            .await
    }

    // ─── Queries ─────────────────────────────────────────────────

    async fn list_active_requests(&self) -> Result<Vec<PrayerRequest>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::PRAYER_REQUESTS)
            .filter(|q| q.for_all([q.field("status").eq("active")]))
            .order_by([("createdAt", firestore::FirestoreQueryDirection::Ascending)])
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn prayed_request_ids(&self, user_id: &str) -> Result<Vec<String>, AppError> {
        let prayers: Vec<Prayer> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::PRAYERS)
            .filter(|q| q.for_all([q.field("userId").eq(user_id)]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(prayers.into_iter().map(|p| p.request_id).collect())
    }

    // ─── Change Feed ─────────────────────────────────────────────

    fn request_changes(&self) -> broadcast::Receiver<RequestChange> {
        self.changes.subscribe()
    }
}
