//! Mastery state machine.
//!
//! Transitions never fail: out-of-domain values are clamped back into range
//! before the transition is applied.

use chrono::{DateTime, Utc};

use crate::model::{clamp_priority, MasteryState, ReviewItem, ReviewOutcome};

/// Applies a wrong answer. A mastered item is demoted back to
/// `NotMastered` and its priority raised by one (capped at the maximum);
/// any other state is left untouched by the wrong answer alone.
pub fn on_wrong_answer(item: &mut ReviewItem, now: DateTime<Utc>) {
    item.normalize();
    item.wrong_count = item.wrong_count.saturating_add(1);
    item.last_wrong_time = now;

    if item.mastery_state == MasteryState::Mastered {
        item.mastery_state = MasteryState::NotMastered;
        item.priority = clamp_priority(item.priority + 1);
    }
}

/// Applies a completed review. `Mastered` and `Partial` outcomes advance
/// the state; both bump the review counter and the last-review time.
pub fn on_review_outcome(item: &mut ReviewItem, outcome: ReviewOutcome, now: DateTime<Utc>) {
    item.normalize();
    item.mastery_state = match outcome {
        ReviewOutcome::Mastered => MasteryState::Mastered,
        ReviewOutcome::Partial => MasteryState::PartiallyMastered,
    };
    item.review_count = item.review_count.saturating_add(1);
    item.last_review_time = Some(now);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ReviewOutcome;
    use proptest::prelude::*;

    fn item() -> ReviewItem {
        ReviewItem::new("q-1", Utc::now())
    }

    #[test]
    fn wrong_answer_bumps_counter_without_state_change() {
        let mut it = item();
        let before = it.mastery_state;
        on_wrong_answer(&mut it, Utc::now());
        assert_eq!(it.wrong_count, 2);
        assert_eq!(it.mastery_state, before);
        assert_eq!(it.priority, 3);
    }

    #[test]
    fn wrong_answer_demotes_mastered_and_raises_priority() {
        let mut it = item();
        it.mastery_state = MasteryState::Mastered;
        it.priority = 3;
        on_wrong_answer(&mut it, Utc::now());
        assert_eq!(it.mastery_state, MasteryState::NotMastered);
        assert_eq!(it.priority, 4);
    }

    #[test]
    fn demotion_priority_caps_at_five() {
        let mut it = item();
        it.mastery_state = MasteryState::Mastered;
        it.priority = 5;
        on_wrong_answer(&mut it, Utc::now());
        assert_eq!(it.priority, 5);
    }

    #[test]
    fn review_outcomes_advance_state_and_counters() {
        let mut it = item();
        let now = Utc::now();

        on_review_outcome(&mut it, ReviewOutcome::Partial, now);
        assert_eq!(it.mastery_state, MasteryState::PartiallyMastered);
        assert_eq!(it.review_count, 1);
        assert_eq!(it.last_review_time, Some(now));

        on_review_outcome(&mut it, ReviewOutcome::Mastered, now);
        assert_eq!(it.mastery_state, MasteryState::Mastered);
        assert_eq!(it.review_count, 2);
    }

    #[test]
    fn out_of_range_priority_is_clamped_not_rejected() {
        let mut it = item();
        it.priority = 42;
        on_wrong_answer(&mut it, Utc::now());
        assert!((1..=5).contains(&it.priority));
    }

    proptest! {
        #[test]
        fn priority_stays_in_domain_after_any_transition(
            start_priority in -100i32..100,
            mastered in any::<bool>(),
            wrong in any::<bool>(),
        ) {
            let mut it = item();
            it.priority = start_priority;
            if mastered {
                it.mastery_state = MasteryState::Mastered;
            }
            if wrong {
                on_wrong_answer(&mut it, Utc::now());
            } else {
                on_review_outcome(&mut it, ReviewOutcome::Partial, Utc::now());
            }
            prop_assert!((1..=5).contains(&it.priority));
        }
    }
}
