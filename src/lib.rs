// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Prayer Ledger: backend for a prayer-request community.
//!
//! Users submit prayer requests and pray for each other's. This crate keeps
//! the counters, credits and prayer ratios consistent under concurrent
//! writers and exposes them over Firebase-style callable endpoints.

pub mod config;
pub mod db;
pub mod error;
pub mod ledger;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::LedgerStore;
use ledger::{CreditGrantor, Ledger};
use services::{FirebaseTokenVerifier, Notifier};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub ledger: Ledger,
    pub credits: CreditGrantor,
    pub token_verifier: Arc<FirebaseTokenVerifier>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn LedgerStore>,
        notifier: Arc<dyn Notifier>,
        token_verifier: Arc<FirebaseTokenVerifier>,
    ) -> Self {
        Self {
            config,
            ledger: Ledger::new(store.clone(), notifier),
            credits: CreditGrantor::new(store),
            token_verifier,
        }
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        self.ledger.store()
    }
}
