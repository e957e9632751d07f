//! Spaced-repetition schedule.
//!
//! Due timestamps are generated once from `first_review_time` at fixed
//! offsets and never recomputed; the only way to get a new sequence is a
//! full restart with a new first-review time.

use chrono::{DateTime, Duration, Utc};

use crate::model::ReviewItem;

/// Review offsets in minutes from the first wrong answer:
/// 1m, 10m, 1h, 1d, 3d, 7d.
pub const DEFAULT_REVIEW_OFFSETS_MIN: [i64; 6] = [1, 10, 60, 1440, 4320, 10080];

pub fn generate_due_timestamps(
    first_review_time: DateTime<Utc>,
    offsets_min: &[i64],
) -> Vec<DateTime<Utc>> {
    offsets_min
        .iter()
        .map(|minutes| first_review_time + Duration::minutes(*minutes))
        .collect()
}

/// The earliest due timestamp not yet completed: the oldest overdue slot if
/// any exist, otherwise the next future one. `None` once every slot has
/// been consumed.
pub fn next_due(item: &ReviewItem) -> Option<DateTime<Utc>> {
    item.due_timestamps
        .iter()
        .filter(|ts| !item.completed_reviews.contains(ts))
        .min()
        .copied()
}

/// Uncompleted due timestamps in `(now, now + within_hours]`, ascending.
pub fn upcoming(item: &ReviewItem, now: DateTime<Utc>, within_hours: i64) -> Vec<DateTime<Utc>> {
    let horizon = now + Duration::hours(within_hours);
    let mut due: Vec<DateTime<Utc>> = item
        .due_timestamps
        .iter()
        .filter(|ts| **ts > now && **ts <= horizon && !item.completed_reviews.contains(ts))
        .copied()
        .collect();
    due.sort();
    due
}

/// Marks a scheduled instant as satisfied. Idempotent.
pub fn mark_reviewed(item: &mut ReviewItem, timestamp: DateTime<Utc>) {
    item.completed_reviews.insert(timestamp);
}

/// Full reset: a new first-review time and a freshly generated sequence,
/// with the completion set cleared. Used when a long-idle item is missed
/// again after its schedule was exhausted.
pub fn restart_schedule(item: &mut ReviewItem, first_review_time: DateTime<Utc>, offsets_min: &[i64]) {
    item.first_review_time = first_review_time;
    item.due_timestamps = generate_due_timestamps(first_review_time, offsets_min);
    item.completed_reviews.clear();
}

/// True once every due timestamp has been completed.
pub fn is_exhausted(item: &ReviewItem) -> bool {
    next_due(item).is_none()
}
