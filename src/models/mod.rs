// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod prayer;
pub mod request;
pub mod stats;
pub mod user;

pub use prayer::Prayer;
pub use request::{PrayerRequest, RequestStatus};
pub use stats::GlobalStats;
pub use user::User;
