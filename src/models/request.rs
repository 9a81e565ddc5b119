// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Prayer request document.

use serde::{Deserialize, Serialize};

/// Target assumed for request documents written without one.
pub const DEFAULT_TARGET_PRAYER_NUM: u32 = 10;

/// Lifecycle of a prayer request. Only ever moves `Active` -> `Complete`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    #[default]
    Active,
    Complete,
}

/// A user-submitted request seeking a target number of prayers.
///
/// Stored at: `prayerRequests/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrayerRequest {
    /// Generated document ID (not stored as a field)
    #[serde(default, skip_serializing, alias = "_firestore_id")]
    pub id: String,
    /// Owner's UID
    pub user_id: String,
    /// Request text, trimmed
    pub text: String,
    #[serde(default)]
    pub prayer_count: u32,
    #[serde(default = "default_target")]
    pub target_prayer_num: u32,
    #[serde(default)]
    pub status: RequestStatus,
    /// Creation timestamp (RFC 3339), server-assigned
    #[serde(default)]
    pub created_at: String,
}

fn default_target() -> u32 {
    DEFAULT_TARGET_PRAYER_NUM
}

impl PrayerRequest {
    pub fn is_complete(&self) -> bool {
        self.status == RequestStatus::Complete
    }

    /// True when the stored count has reached the target but the status
    /// has not caught up yet.
    pub fn needs_completion(&self) -> bool {
        self.status == RequestStatus::Active && self.prayer_count >= self.target_prayer_num
    }
}
