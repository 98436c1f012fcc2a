//! SM-2 spaced-repetition memory model.
//!
//! One [`ProblemStats`] record exists per (learner, fact) pair. Records are
//! created lazily on first encounter and mutated only through [`update`],
//! which applies the standard SM-2 recurrence: a 1–5 recall quality adjusts
//! the easiness factor, and the review interval grows exponentially while
//! the learner keeps answering well.
//!
//! Everything here is pure arithmetic over an explicit `now` argument —
//! no hidden clock — so identical inputs always produce identical records.
//!
//! Reference: Woźniak, P. (1990). SuperMemo SM-2 algorithm.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ProblemKey, ProfileId};

/// Easiness factor floor. SM-2 never lets an item become harder than this.
pub const MIN_EASINESS: f64 = 1.3;

/// Easiness factor assigned to a fact never reviewed before.
pub const INITIAL_EASINESS: f64 = 2.5;

const MS_PER_DAY: f64 = 24.0 * 60.0 * 60.0 * 1000.0;

/// Per-(learner, fact) mastery record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemStats {
    /// The learner this record belongs to.
    pub profile_id: ProfileId,
    /// Canonical fact identifier.
    pub problem_key: ProblemKey,
    /// SM-2 easiness factor; higher = better retained. Never below [`MIN_EASINESS`].
    pub easiness: f64,
    /// Days until the next scheduled review.
    pub interval_days: u32,
    /// Consecutive successful reviews since the last forgetting reset.
    pub repetitions: u32,
    /// When the fact is next due.
    pub next_review: DateTime<Utc>,
    /// Lifetime attempt count.
    pub total_attempts: u32,
    /// Lifetime correct count.
    pub total_correct: u32,
    /// Running average response latency in milliseconds.
    pub avg_response_time_ms: f64,
    /// When the fact was last reviewed, if ever.
    pub last_seen: Option<DateTime<Utc>>,
}

impl ProblemStats {
    /// Create the default record for a fact the learner has never seen.
    ///
    /// The fact is immediately due (`next_review = now`), so unseen material
    /// competes for selection right away.
    #[must_use]
    pub fn new(profile_id: ProfileId, problem_key: ProblemKey, now: DateTime<Utc>) -> Self {
        Self {
            profile_id,
            problem_key,
            easiness: INITIAL_EASINESS,
            interval_days: 0,
            repetitions: 0,
            next_review: now,
            total_attempts: 0,
            total_correct: 0,
            avg_response_time_ms: 0.0,
            last_seen: None,
        }
    }
}

/// Map an answer outcome to an SM-2 recall quality in 1..=5.
///
/// Incorrect answers rate 1. Correct answers rate by latency: under 3 s is
/// a 5, under 6 s a 4, anything slower a 3.
#[must_use]
pub fn quality(correct: bool, response_time_ms: f64) -> u8 {
    if !correct {
        return 1;
    }
    if response_time_ms < 3000.0 {
        5
    } else if response_time_ms < 6000.0 {
        4
    } else {
        3
    }
}

/// Apply one review to a record, returning the updated record.
///
/// Quality below 3 is a forgetting event: the repetition streak and interval
/// reset to zero. Quality 3+ advances the streak, with intervals of 1 day,
/// then 6 days, then `round(interval × easiness)`.
#[must_use]
pub fn update(
    stats: &ProblemStats,
    quality: u8,
    response_time_ms: f64,
    now: DateTime<Utc>,
) -> ProblemStats {
    debug_assert!((1..=5).contains(&quality), "quality must be 1..=5");

    let total_attempts = stats.total_attempts + 1;
    let total_correct = if quality >= 3 {
        stats.total_correct + 1
    } else {
        stats.total_correct
    };
    let avg_response_time_ms = ((stats.avg_response_time_ms * f64::from(stats.total_attempts)
        + response_time_ms)
        / f64::from(total_attempts))
    .round();

    // SM-2 easiness recurrence. Grows for 5s, shrinks for anything below 4.
    let lapse = f64::from(5 - quality.min(5));
    let easiness = MIN_EASINESS.max(stats.easiness + (0.1 - lapse * (0.08 + lapse * 0.02)));

    let (repetitions, interval_days) = if quality < 3 {
        (0, 0)
    } else {
        let repetitions = stats.repetitions + 1;
        let interval_days = match repetitions {
            1 => 1,
            2 => 6,
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            _ => (f64::from(stats.interval_days) * easiness).round() as u32,
        };
        (repetitions, interval_days)
    };

    let next_review = now + Duration::days(i64::from(interval_days));

    ProblemStats {
        profile_id: stats.profile_id,
        problem_key: stats.problem_key,
        easiness,
        interval_days,
        repetitions,
        next_review,
        total_attempts,
        total_correct,
        avg_response_time_ms,
        last_seen: Some(now),
    }
}

/// Whether the fact is due for review at `now`.
#[must_use]
pub fn is_due(stats: &ProblemStats, now: DateTime<Utc>) -> bool {
    now >= stats.next_review
}

/// How many days overdue the fact is at `now`. Negative means not yet due.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn days_overdue(stats: &ProblemStats, now: DateTime<Utc>) -> f64 {
    (now - stats.next_review).num_milliseconds() as f64 / MS_PER_DAY
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh(now: DateTime<Utc>) -> ProblemStats {
        ProblemStats::new(ProfileId::new(), ProblemKey::new(3, 7), now)
    }

    #[test]
    fn quality_maps_latency_bands() {
        assert_eq!(quality(false, 100.0), 1);
        assert_eq!(quality(true, 2999.0), 5);
        assert_eq!(quality(true, 3000.0), 4);
        assert_eq!(quality(true, 5999.0), 4);
        assert_eq!(quality(true, 6000.0), 3);
        assert_eq!(quality(true, 60_000.0), 3);
    }

    #[test]
    fn intervals_follow_one_six_then_exponential() {
        let now = Utc::now();
        let s0 = fresh(now);

        let s1 = update(&s0, 5, 2000.0, now);
        assert_eq!(s1.repetitions, 1);
        assert_eq!(s1.interval_days, 1);
        assert_eq!(s1.next_review, now + Duration::days(1));

        let s2 = update(&s1, 5, 2000.0, now);
        assert_eq!(s2.repetitions, 2);
        assert_eq!(s2.interval_days, 6);

        let s3 = update(&s2, 5, 2000.0, now);
        assert_eq!(s3.repetitions, 3);
        // round(6 × easiness) with easiness already above 2.5
        assert!(s3.interval_days >= 15);
    }

    #[test]
    fn low_quality_resets_the_streak() {
        let now = Utc::now();
        let mut stats = fresh(now);
        for _ in 0..4 {
            stats = update(&stats, 5, 2000.0, now);
        }
        assert!(stats.repetitions >= 4);
        assert!(stats.interval_days > 6);

        let reset = update(&stats, 1, 10_000.0, now);
        assert_eq!(reset.repetitions, 0);
        assert_eq!(reset.interval_days, 0);
        assert_eq!(reset.next_review, now);
        // Lifetime counters keep counting through the reset.
        assert_eq!(reset.total_attempts, 5);
        assert_eq!(reset.total_correct, 4);
    }

    #[test]
    fn easiness_never_drops_below_floor() {
        let now = Utc::now();
        let mut stats = fresh(now);
        for _ in 0..50 {
            stats = update(&stats, 1, 10_000.0, now);
        }
        assert!(stats.easiness >= MIN_EASINESS);
        assert!((stats.easiness - MIN_EASINESS).abs() < 1e-9);
    }

    #[test]
    fn average_latency_is_a_running_mean() {
        let now = Utc::now();
        let s0 = fresh(now);
        let s1 = update(&s0, 5, 2000.0, now);
        assert!((s1.avg_response_time_ms - 2000.0).abs() < f64::EPSILON);
        let s2 = update(&s1, 5, 4000.0, now);
        assert!((s2.avg_response_time_ms - 3000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn overdue_is_signed_days() {
        let now = Utc::now();
        let mut stats = fresh(now);
        stats.next_review = now - Duration::days(2);
        assert!(is_due(&stats, now));
        assert!((days_overdue(&stats, now) - 2.0).abs() < 1e-6);

        stats.next_review = now + Duration::days(3);
        assert!(!is_due(&stats, now));
        assert!((days_overdue(&stats, now) + 3.0).abs() < 1e-6);
    }
}
