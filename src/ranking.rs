//! Priority ranking for the review queue.
//!
//! `priority_score` is a pure function of an item's fields; higher scores
//! surface first. Ties break on the more recent wrong answer, then on id so
//! the ordering is deterministic.

use chrono::{DateTime, Utc};

use crate::model::{MasteryState, ReviewItem};

/// Scoring constants. The defaults are the tuned production values; they
/// are a table rather than hard-coded literals so callers can re-weight
/// without touching the ranking code.
#[derive(Debug, Clone)]
pub struct RankWeights {
    pub priority_factor: i64,
    pub wrong_factor: i64,
    pub recency_horizon_days: i64,
    pub not_mastered_bonus: i64,
    pub partially_mastered_bonus: i64,
    pub mastered_penalty: i64,
    pub flag_bonus: i64,
}

impl Default for RankWeights {
    fn default() -> Self {
        Self {
            priority_factor: 10,
            wrong_factor: 2,
            recency_horizon_days: 10,
            not_mastered_bonus: 15,
            partially_mastered_bonus: 8,
            mastered_penalty: -5,
            flag_bonus: 20,
        }
    }
}

pub fn priority_score(item: &ReviewItem, now: DateTime<Utc>, weights: &RankWeights) -> i64 {
    let days_since_wrong = (now - item.last_wrong_time).num_days().max(0);
    let recency = (weights.recency_horizon_days - days_since_wrong).max(0);

    let state_weight = match item.mastery_state {
        MasteryState::NotMastered => weights.not_mastered_bonus,
        MasteryState::PartiallyMastered => weights.partially_mastered_bonus,
        MasteryState::Mastered => weights.mastered_penalty,
    };

    let flag_bonus = if item.flagged { weights.flag_bonus } else { 0 };

    item.priority as i64 * weights.priority_factor
        + item.wrong_count as i64 * weights.wrong_factor
        + recency
        + state_weight
        + flag_bonus
}

/// Sorts items highest score first, breaking ties by more recent
/// `last_wrong_time`, then by id.
pub fn rank(items: &mut [ReviewItem], now: DateTime<Utc>, weights: &RankWeights) {
    items.sort_by(|a, b| {
        priority_score(b, now, weights)
            .cmp(&priority_score(a, now, weights))
            .then_with(|| b.last_wrong_time.cmp(&a.last_wrong_time))
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Confidence estimate in `[0, 1]` that the item is retained. An item that
/// has never been reviewed always reports `0.0`, whatever its state.
pub fn mastery_rate(item: &ReviewItem) -> f64 {
    if item.review_count == 0 {
        return 0.0;
    }
    match item.mastery_state {
        MasteryState::Mastered => 0.8 + 0.2 * (item.review_count as f64 / 5.0).min(1.0),
        MasteryState::PartiallyMastered => 0.5 + 0.3 * (item.review_count as f64 / 3.0).min(1.0),
        MasteryState::NotMastered => (0.3 - item.wrong_count as f64 * 0.05).max(0.1),
    }
}
