//! End-of-session aggregation into memory-model updates.
//!
//! When a session ends, every fact touched during play becomes one or two
//! SM-2 updates: a correct-branch update rated from the mean response time,
//! and an incorrect-branch update rated 1 (a forgetting reset). Both
//! branches read the *pre-session* record, and the correct update is listed
//! before the incorrect one, so when the batch upserts in order the
//! incorrect branch's reset is what persists for facts touched both ways.
//! That ordering is part of the engine's observable behavior; see the
//! matching integration test before changing it.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::engine::GameState;
use crate::sm2::{self, ProblemStats};
use crate::types::{Profile, ProblemKey, SessionResult};

/// Response time charged to the incorrect-branch update (a floor miss has
/// no meaningful latency of its own).
const MISS_PENALTY_MS: f64 = 10_000.0;

/// Everything the driver needs to persist and report when a session ends.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    /// Updated stats records, in upsert order (correct branch before
    /// incorrect branch per fact).
    pub updated_stats: Vec<ProblemStats>,
    /// Aggregate result for the session history.
    pub result: SessionResult,
    /// Whether the final score beat the profile's stored high score.
    pub is_new_high_score: bool,
}

/// Fold a finished session's per-fact tallies into memory-model updates
/// and an aggregate [`SessionResult`].
#[must_use]
pub fn finalize_session(
    state: &GameState,
    stats: &HashMap<ProblemKey, ProblemStats>,
    profile: &Profile,
    now: DateTime<Utc>,
) -> SessionOutcome {
    let mut updated_stats = Vec::new();
    let mut problems_attempted = 0;
    let mut problems_correct = 0;
    let mut trouble_spots = Vec::new();

    for (&key, tally) in &state.problem_results {
        problems_attempted += tally.correct + tally.incorrect;

        if tally.correct > 0 {
            problems_correct += tally.correct;

            #[allow(clippy::cast_precision_loss)]
            let avg_time = if tally.times.is_empty() {
                0.0
            } else {
                tally.times.iter().sum::<f64>() / tally.times.len() as f64
            };
            let quality = sm2::quality(true, avg_time);

            let base = stats
                .get(&key)
                .cloned()
                .unwrap_or_else(|| ProblemStats::new(profile.id, key, now));
            updated_stats.push(sm2::update(&base, quality, avg_time, now));
        }

        if tally.incorrect > 0 {
            trouble_spots.push(key);

            let base = stats
                .get(&key)
                .cloned()
                .unwrap_or_else(|| ProblemStats::new(profile.id, key, now));
            updated_stats.push(sm2::update(&base, 1, MISS_PENALTY_MS, now));
        }
    }

    let is_new_high_score = state.score > profile.high_score;

    debug!(
        profile = %profile.id,
        score = state.score,
        attempted = problems_attempted,
        correct = problems_correct,
        trouble_spots = trouble_spots.len(),
        new_high_score = is_new_high_score,
        "Session finalized"
    );

    SessionOutcome {
        updated_stats,
        result: SessionResult {
            profile_id: profile.id,
            timestamp: now,
            score: state.score,
            level: state.level,
            problems_attempted,
            problems_correct,
            trouble_spots,
        },
        is_new_high_score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::config::GameConfig;
    use crate::engine::OutcomeTally;

    fn state_with(results: Vec<(ProblemKey, OutcomeTally)>) -> GameState {
        let mut state = GameState::new(&GameConfig::default(), Utc::now());
        state.problem_results = results.into_iter().collect();
        state
    }

    #[test]
    fn aggregates_count_both_outcome_kinds() {
        let now = Utc::now();
        let profile = Profile::new("Ada", now);
        let k1 = ProblemKey::new(3, 7);
        let k2 = ProblemKey::new(4, 6);

        let mut state = state_with(vec![
            (
                k1,
                OutcomeTally {
                    correct: 2,
                    incorrect: 0,
                    times: vec![2000.0, 4000.0],
                },
            ),
            (
                k2,
                OutcomeTally {
                    correct: 0,
                    incorrect: 1,
                    times: vec![],
                },
            ),
        ]);
        state.score = 120;

        let outcome = finalize_session(&state, &HashMap::new(), &profile, now);
        assert_eq!(outcome.result.problems_attempted, 3);
        assert_eq!(outcome.result.problems_correct, 2);
        assert_eq!(outcome.result.trouble_spots, vec![k2]);
        assert_eq!(outcome.updated_stats.len(), 2);
        assert!(outcome.is_new_high_score);
    }

    #[test]
    fn mixed_fact_gets_two_updates_correct_first() {
        let now = Utc::now();
        let profile = Profile::new("Ada", now);
        let key = ProblemKey::new(5, 5);

        let state = state_with(vec![(
            key,
            OutcomeTally {
                correct: 1,
                incorrect: 1,
                times: vec![2500.0],
            },
        )]);

        let outcome = finalize_session(&state, &HashMap::new(), &profile, now);
        assert_eq!(outcome.updated_stats.len(), 2);

        // Correct branch first: streak advanced from the pre-session record.
        assert_eq!(outcome.updated_stats[0].repetitions, 1);
        assert_eq!(outcome.updated_stats[0].interval_days, 1);
        // Incorrect branch second: a reset, also from the pre-session
        // record, so the upsert order makes the reset win.
        assert_eq!(outcome.updated_stats[1].repetitions, 0);
        assert_eq!(outcome.updated_stats[1].interval_days, 0);
        assert_eq!(outcome.updated_stats[1].total_attempts, 1);
    }

    #[test]
    fn correct_quality_comes_from_mean_time() {
        let now = Utc::now();
        let profile = Profile::new("Ada", now);
        let key = ProblemKey::new(2, 9);

        // Mean of 2 s and 8 s is 5 s: quality 4, so easiness holds steady.
        let state = state_with(vec![(
            key,
            OutcomeTally {
                correct: 2,
                incorrect: 0,
                times: vec![2000.0, 8000.0],
            },
        )]);

        let outcome = finalize_session(&state, &HashMap::new(), &profile, now);
        let updated = &outcome.updated_stats[0];
        assert_eq!(updated.repetitions, 1);
        assert!((updated.easiness - 2.5).abs() < 1e-9);
        assert!((updated.avg_response_time_ms - 5000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn high_score_requires_strictly_beating_the_record() {
        let now = Utc::now();
        let mut profile = Profile::new("Ada", now);
        profile.high_score = 200;

        let mut state = state_with(vec![]);
        state.score = 200;
        assert!(!finalize_session(&state, &HashMap::new(), &profile, now).is_new_high_score);

        state.score = 210;
        assert!(finalize_session(&state, &HashMap::new(), &profile, now).is_new_high_score);
    }
}
