//! The reputation tier function (§4.5).
//!
//! Pure function of `(success_count, first_success_at, now)`. Thresholds are
//! intentionally asymmetric (strict `>` on counts, `>=` on age) — preserve
//! exactly, do not round to a tidier rule.

use crate::model::Tier;

/// Computes `age_days = max(0, floor((now - first_success_at) / 86400))`,
/// or `0` when there is no first success yet.
pub fn age_days(first_success_at: Option<i64>, now: i64) -> i64 {
    match first_success_at {
        Some(ts) => ((now - ts) / 86_400).max(0),
        None => 0,
    }
}

/// Evaluated top-to-bottom; first match wins.
pub fn tier_from_success(success_count: u64, first_success_at: Option<i64>, now: i64) -> Tier {
    let age = age_days(first_success_at, now);

    if success_count > 30 && age >= 120 {
        Tier::Experienced
    } else if success_count > 10 && age >= 90 {
        Tier::Intermediate
    } else if success_count > 5 {
        Tier::Beginner
    } else {
        Tier::None
    }
}
