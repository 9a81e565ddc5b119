// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - integrations with Firebase.

pub mod firebase_auth;
pub mod messaging;

pub use firebase_auth::{AuthError, AuthUser, FirebaseTokenVerifier};
pub use messaging::{FcmNotifier, LogNotifier, Notifier, NotifyError, PrayerNotification};
