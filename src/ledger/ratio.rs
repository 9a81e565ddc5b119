// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Prayer ratio and target sizing.

/// Minimum number of prayers any request must collect.
pub const PRAYER_TARGET_FLOOR: u32 = 10;

/// Round to two decimals, half away from zero.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Prayers completed per request submitted. The divisor floors at 1, so a
/// user who never submitted a request has a ratio equal to their prayer count.
pub fn ratio(completed: u64, submitted: u64) -> f64 {
    round2(completed as f64 / submitted.max(1) as f64)
}

/// Number of prayers a new request must reach before it is complete:
/// `ceil(max(personal, global) + 10)`.
///
/// Ratios that are negative or not a number count as zero.
pub fn target_prayer_num(personal_ratio: f64, global_ratio: f64) -> u32 {
    let sanitize = |r: f64| if r.is_finite() && r > 0.0 { r } else { 0.0 };
    let highest = sanitize(personal_ratio).max(sanitize(global_ratio));
    let target = (highest + f64::from(PRAYER_TARGET_FLOOR)).ceil();

    if target >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        target as u32
    }
}
