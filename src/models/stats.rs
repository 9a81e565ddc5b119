// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Global prayer statistics singleton.

use serde::{Deserialize, Serialize};

/// Platform-wide counters.
///
/// Stored at: `stats/global`. Written by every prayer and request
/// transaction, so it is the hottest document in the system.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalStats {
    #[serde(default)]
    pub prayers_completed: u64,
    #[serde(default)]
    pub requests_submitted: u64,
    /// Derived the same way as a user's personal ratio
    #[serde(default)]
    pub global_ratio: f64,
}
