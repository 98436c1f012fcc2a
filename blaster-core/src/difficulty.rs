//! Problem difficulty classification and phase filtering.
//!
//! Difficulty = 0.3·table + 0.3·product + 0.4·sm2
//!
//! Where:
//!   table(a,b)   = step function of max(a, b)      (bigger tables are harder)
//!   product(a·b) = step function of the answer     (bigger answers are harder)
//!   sm2(stats)   = step function of the easiness factor (learner-specific)
//!
//! The memory-model signal carries the largest weight: a fact the learner
//! has repeatedly fumbled is "hard" no matter how small its table is.

use std::collections::HashMap;

use rand::Rng;

use crate::phases::Phase;
use crate::sm2::ProblemStats;
use crate::types::ProblemKey;

/// Score above which a fact is no longer considered easy.
const EASY_THRESHOLD: f64 = 0.4;

/// Structural difficulty from the table a fact belongs to, in [0, 1].
#[must_use]
pub fn table_score(a: u32, b: u32) -> f64 {
    match a.max(b) {
        0..=2 => 0.0,
        3..=4 => 0.2,
        5..=7 => 0.5,
        8..=9 => 0.8,
        _ => 1.0,
    }
}

/// Structural difficulty from the magnitude of the answer, in [0, 1].
#[must_use]
pub fn product_score(product: u32) -> f64 {
    match product {
        0..=20 => 0.0,
        21..=40 => 0.3,
        41..=60 => 0.5,
        61..=80 => 0.7,
        _ => 1.0,
    }
}

/// Learner-specific difficulty from the SM-2 easiness factor, in [0, 1].
///
/// Facts never seen score a neutral 0.3.
#[must_use]
pub fn sm2_score(stats: Option<&ProblemStats>) -> f64 {
    let Some(stats) = stats else {
        return 0.3;
    };
    if stats.easiness >= 2.5 {
        0.0
    } else if stats.easiness >= 2.0 {
        0.3
    } else if stats.easiness >= 1.5 {
        0.6
    } else {
        1.0
    }
}

/// A fact's combined difficulty classification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Difficulty {
    /// The fact being classified.
    pub problem_key: ProblemKey,
    /// Structural score from the table size.
    pub table_score: f64,
    /// Structural score from the answer magnitude.
    pub product_score: f64,
    /// Learner-specific score from the memory model.
    pub sm2_score: f64,
    /// Weighted combination, in [0, 1].
    pub total_score: f64,
    /// Whether the fact qualifies as easy for phase gating.
    pub is_easy: bool,
}

/// Classify a fact for the given learner record (or `None` if unseen).
///
/// Deterministic for a fixed `(problem_key, stats)` pair.
#[must_use]
pub fn classify(problem_key: ProblemKey, stats: Option<&ProblemStats>) -> Difficulty {
    let (a, b) = problem_key.factors();
    let table_score = table_score(a, b);
    let product_score = product_score(problem_key.product());
    let sm2_score = sm2_score(stats);

    let total_score = table_score * 0.3 + product_score * 0.3 + sm2_score * 0.4;

    Difficulty {
        problem_key,
        table_score,
        product_score,
        sm2_score,
        total_score,
        is_easy: total_score <= EASY_THRESHOLD,
    }
}

/// Probability that a non-easy fact is admitted during phase 2.
///
/// Ramps with progress through the phase; re-rolled per fact per selection.
#[must_use]
pub fn hard_problem_probability(correct_in_phase: u32) -> f64 {
    if correct_in_phase < 10 {
        0.1
    } else if correct_in_phase < 20 {
        0.5
    } else {
        1.0
    }
}

/// Restrict a candidate pool to what the current phase allows.
///
/// Phase 1 keeps only easy facts, falling back to the full pool when fewer
/// than `min_easy_pool` qualify (so a learner with a rough history is never
/// starved). Phase 2 always admits easy facts and admits each hard fact with
/// an independent Bernoulli trial. Phases 3 and 4 are unfiltered.
#[must_use]
pub fn filter_by_phase<R: Rng + ?Sized>(
    pool: &[ProblemKey],
    phase: Phase,
    correct_in_phase: u32,
    stats: &HashMap<ProblemKey, ProblemStats>,
    min_easy_pool: usize,
    rng: &mut R,
) -> Vec<ProblemKey> {
    match phase {
        Phase::Foundation => {
            let easy: Vec<ProblemKey> = pool
                .iter()
                .copied()
                .filter(|key| classify(*key, stats.get(key)).is_easy)
                .collect();
            if easy.len() >= min_easy_pool {
                easy
            } else {
                pool.to_vec()
            }
        }
        Phase::GradualChallenge => {
            let p = hard_problem_probability(correct_in_phase);
            pool.iter()
                .copied()
                .filter(|key| {
                    classify(*key, stats.get(key)).is_easy || rng.gen_range(0.0..1.0) < p
                })
                .collect()
        }
        Phase::FullPractice | Phase::Mastery => pool.to_vec(),
    }
}
