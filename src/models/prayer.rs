// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Prayer event document (append-only log).

use serde::{Deserialize, Serialize};

/// One user's prayer for one request.
///
/// Stored at: `prayers/{id}`. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prayer {
    /// Generated document ID (not stored as a field)
    #[serde(default, skip_serializing, alias = "_firestore_id")]
    pub id: String,
    /// UID of the praying user
    pub user_id: String,
    pub request_id: String,
    /// Prayer text, trimmed
    pub prayer_text: String,
    /// Creation timestamp (RFC 3339), server-assigned
    pub created_at: String,
}
