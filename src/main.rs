// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Prayer Ledger API Server
//!
//! Serves the callable prayer and request endpoints backed by Firestore.

use prayer_ledger::{
    config::{Config, LedgerBackend},
    db::{FirestoreDb, LedgerStore, MemoryDb},
    ledger::CompletionWatcher,
    services::{FcmNotifier, FirebaseTokenVerifier, LogNotifier, Notifier},
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging()?;

    let config = Config::from_env()?;
    tracing::info!(
        port = config.port,
        backend = ?config.ledger_backend,
        "Starting Prayer Ledger API"
    );

    let firestore = match config.ledger_backend {
        LedgerBackend::Firestore => Some(Arc::new(FirestoreDb::new(&config.gcp_project_id).await?)),
        LedgerBackend::Memory => None,
    };
    let store: Arc<dyn LedgerStore> = match &firestore {
        Some(db) => db.clone(),
        None => {
            tracing::warn!("Using in-memory ledger store; data is lost on restart");
            Arc::new(MemoryDb::new())
        }
    };

    let notifier: Arc<dyn Notifier> = if config.notifications_enabled {
        Arc::new(FcmNotifier::new(&config.gcp_project_id).await?)
    } else {
        tracing::info!("Push notifications disabled");
        Arc::new(LogNotifier)
    };

    let token_verifier = Arc::new(FirebaseTokenVerifier::new(&config)?);

    // Completion safety net. Subscribes before the Firestore listener starts
    // so the initial replay of existing requests is not missed.
    let _watcher = CompletionWatcher::spawn(store.clone());
    let _request_listener = match &firestore {
        Some(db) => Some(db.listen_request_changes().await?),
        None => None,
    };

    let state = Arc::new(AppState::new(
        config.clone(),
        store,
        notifier,
        token_verifier,
    ));

    let app = prayer_ledger::routes::create_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("prayer_ledger=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}
