// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.

use std::env;
use std::str::FromStr;

/// Which document store backs the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerBackend {
    /// Cloud Firestore (or the emulator when FIRESTORE_EMULATOR_HOST is set)
    Firestore,
    /// In-process store; state is lost on restart
    Memory,
}

impl FromStr for LedgerBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "firestore" => Ok(Self::Firestore),
            "memory" => Ok(Self::Memory),
            _ => Err(ConfigError::Invalid("LEDGER_BACKEND", s.to_string())),
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// GCP project ID (Firestore + FCM)
    pub gcp_project_id: String,
    /// Firebase project ID that issues user ID tokens
    pub firebase_project_id: String,
    /// Frontend URL allowed by CORS
    pub frontend_url: String,
    /// Server port
    pub port: u16,
    pub ledger_backend: LedgerBackend,
    /// Deliver push notifications through FCM (otherwise log only)
    pub notifications_enabled: bool,
}

impl Config {
    /// Config for tests: in-memory store, notifications disabled.
    pub fn test_default() -> Self {
        Self {
            gcp_project_id: "test-project".to_string(),
            firebase_project_id: "test-project".to_string(),
            frontend_url: "http://localhost:3000".to_string(),
            port: 8080,
            ledger_backend: LedgerBackend::Memory,
            notifications_enabled: false,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// A `.env` file is loaded first when present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let gcp_project_id =
            env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string());
        let firebase_project_id =
            env::var("FIREBASE_PROJECT_ID").unwrap_or_else(|_| gcp_project_id.clone());

        let ledger_backend = match env::var("LEDGER_BACKEND") {
            Ok(raw) => raw.parse()?,
            Err(_) => LedgerBackend::Firestore,
        };

        let notifications_enabled = match env::var("NOTIFICATIONS_ENABLED") {
            Ok(raw) => parse_bool(&raw)
                .ok_or(ConfigError::Invalid("NOTIFICATIONS_ENABLED", raw.clone()))?,
            Err(_) => true,
        };

        Ok(Self {
            gcp_project_id,
            firebase_project_id,
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            ledger_backend,
            notifications_enabled,
        })
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}
