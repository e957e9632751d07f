use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MIN_PRIORITY: i32 = 1;
pub const MAX_PRIORITY: i32 = 5;
pub const DEFAULT_PRIORITY: i32 = 3;

/// How well an item is learned. Only review outcomes move the state
/// forward; a wrong answer on a mastered item demotes it back to
/// `NotMastered`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MasteryState {
    NotMastered,
    PartiallyMastered,
    Mastered,
}

/// Outcome reported after a review session. There is no outcome that sets
/// `NotMastered` directly; that state is only reached through demotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReviewOutcome {
    Partial,
    Mastered,
}

/// One missed quiz item tracked for spaced repetition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewItem {
    pub id: String,
    pub mastery_state: MasteryState,
    pub priority: i32,
    pub wrong_count: u32,
    pub review_count: u32,
    pub last_wrong_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_review_time: Option<DateTime<Utc>>,
    pub first_review_time: DateTime<Utc>,
    pub due_timestamps: Vec<DateTime<Utc>>,
    pub completed_reviews: BTreeSet<DateTime<Utc>>,
    pub flagged: bool,
}

impl ReviewItem {
    /// Creates the item for its first wrong answer. The caller attaches the
    /// generated due timestamps afterwards (see `schedule`).
    pub fn new(id: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: id.to_string(),
            mastery_state: MasteryState::NotMastered,
            priority: DEFAULT_PRIORITY,
            wrong_count: 1,
            review_count: 0,
            last_wrong_time: now,
            last_review_time: None,
            first_review_time: now,
            due_timestamps: Vec::new(),
            completed_reviews: BTreeSet::new(),
            flagged: false,
        }
    }

    /// Clamps out-of-domain fields back into their valid ranges. Transition
    /// code calls this instead of erroring on bad stored data.
    pub fn normalize(&mut self) {
        self.priority = clamp_priority(self.priority);
        if self.wrong_count == 0 {
            self.wrong_count = 1;
        }
    }
}

pub fn clamp_priority(priority: i32) -> i32 {
    priority.clamp(MIN_PRIORITY, MAX_PRIORITY)
}
