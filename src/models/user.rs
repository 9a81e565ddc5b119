// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User ledger document.

use serde::{Deserialize, Serialize};

/// Per-user counters stored in Firestore.
///
/// Stored at: `users/{uid}`. Created lazily by the first prayer or request
/// transaction (or by a credit grant) and never deleted by the ledger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Firebase Auth UID (document ID, not stored as a field)
    #[serde(default, skip_serializing, alias = "_firestore_id")]
    pub id: String,
    /// Prayers this user has submitted for other requests
    #[serde(default)]
    pub prayers_completed: u64,
    /// Prayer requests this user has submitted
    #[serde(default)]
    pub requests_submitted: u64,
    /// Derived: prayers_completed / max(1, requests_submitted), 2 decimals
    #[serde(default)]
    pub personal_ratio: f64,
    /// Consumable submission credits
    #[serde(default)]
    pub prayer_request_credits: u64,
    /// Set once at creation from the caller's credential shape
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_anonymous: Option<bool>,
    /// Creation timestamp (RFC 3339), server-assigned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    /// Push delivery token registered by the owner's device
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_token: Option<String>,
}

impl User {
    /// Zero-valued user with the given ID, as synthesized when no document exists.
    pub fn empty(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }
}
