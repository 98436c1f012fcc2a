//! Weighted-random problem selection.
//!
//! Candidates come from the selected times tables crossed with
//! `[0, max_multiplier]`, gated by the current phase, then weighted:
//! overdue facts dominate, weak facts are favored, facts missed this
//! session get a boost, and the short no-repeat window excludes outright.
//! A uniform draw over the cumulative weights picks the winner.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use rand::Rng;
use tracing::trace;

use crate::config::BlasterConfig;
use crate::difficulty::filter_by_phase;
use crate::engine::Problem;
use crate::phases::PhaseProgress;
use crate::sm2::{self, ProblemStats};
use crate::types::{EntityId, ProblemKey, SelectionWeight};

/// Vertical spawn position, just above the visible field.
const SPAWN_Y: f64 = -40.0;

/// Horizontal margin keeping spawned targets fully on the field.
const SPAWN_X_MARGIN: f64 = 50.0;

// ---------------------------------------------------------------------------
// Recent ring
// ---------------------------------------------------------------------------

/// Bounded FIFO set of the most recently shown facts.
///
/// Keeps insertion order explicit so "oldest evicted first" is an invariant
/// rather than an accident of hashing. Membership excludes a fact from
/// selection outright.
#[derive(Debug, Clone, Default)]
pub struct RecentRing {
    ring: VecDeque<ProblemKey>,
    capacity: usize,
}

impl RecentRing {
    /// Create a ring holding at most `capacity` keys.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record a shown fact, evicting the oldest entry past capacity.
    /// Re-showing a key already present keeps its original position.
    pub fn push(&mut self, key: ProblemKey) {
        if self.contains(key) {
            return;
        }
        self.ring.push_back(key);
        while self.ring.len() > self.capacity {
            self.ring.pop_front();
        }
    }

    /// Whether the fact is inside the no-repeat window.
    #[must_use]
    pub fn contains(&self, key: ProblemKey) -> bool {
        self.ring.contains(&key)
    }

    /// Forget everything (starvation escape hatch).
    pub fn clear(&mut self) {
        self.ring.clear();
    }

    /// Number of keys currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Whether the window is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Candidate enumeration
// ---------------------------------------------------------------------------

/// All canonical facts reachable from the selected tables with the second
/// factor in `[0, max_multiplier]`, deduplicated in first-seen order.
#[must_use]
pub fn enumerate_pool(tables: &[u32], max_multiplier: u32) -> Vec<ProblemKey> {
    let mut seen = HashSet::new();
    let mut pool = Vec::new();
    for &table in tables {
        for i in 0..=max_multiplier {
            let key = ProblemKey::new(table, i);
            if seen.insert(key) {
                pool.push(key);
            }
        }
    }
    pool
}

// ---------------------------------------------------------------------------
// Weighting
// ---------------------------------------------------------------------------

/// Selection weight for one candidate fact.
///
/// Zero inside the no-repeat window (hard exclusion). Unseen facts carry the
/// baseline weight. Otherwise the baseline grows with days overdue and with
/// a weak easiness factor, and a session-local miss multiplies the total.
#[must_use]
pub fn selection_weight(
    key: ProblemKey,
    stats: Option<&ProblemStats>,
    recent: &RecentRing,
    missed: &HashSet<ProblemKey>,
    now: DateTime<Utc>,
    config: &BlasterConfig,
) -> SelectionWeight {
    if recent.contains(key) {
        return SelectionWeight::ZERO;
    }

    let Some(stats) = stats else {
        return SelectionWeight::new(1.0);
    };

    let mut weight = 1.0;

    let overdue = sm2::days_overdue(stats, now);
    if overdue > 0.0 {
        weight += overdue * config.selection.overdue_weight_per_day;
    }

    if stats.easiness < 2.5 {
        weight += (3.0 - stats.easiness) * config.selection.weak_easiness_weight;
    }

    if missed.contains(&key) {
        weight *= config.selection.missed_boost;
    }

    SelectionWeight::new(weight)
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// Pick the next problem to spawn.
///
/// Walks the weighted candidates with a uniform draw over the total weight.
/// If every candidate weighs zero (the whole pool sits in the no-repeat
/// window), the window is cleared and selection retries, which guarantees
/// forward progress.
///
/// # Preconditions
/// `tables` must be non-empty and contribute at least one candidate;
/// an empty selection would retry forever. The driving UI enforces this.
#[allow(clippy::implicit_hasher)]
#[must_use]
pub fn select_problem<R: Rng + ?Sized>(
    tables: &[u32],
    max_multiplier: u32,
    stats: &HashMap<ProblemKey, ProblemStats>,
    recent: &mut RecentRing,
    missed: &HashSet<ProblemKey>,
    progress: &PhaseProgress,
    now: DateTime<Utc>,
    config: &BlasterConfig,
    rng: &mut R,
) -> Problem {
    debug_assert!(!tables.is_empty(), "at least one table must be selected");

    let pool = enumerate_pool(tables, max_multiplier);

    let selected_key = loop {
        let candidates = filter_by_phase(
            &pool,
            progress.current_phase,
            progress.correct_in_phase,
            stats,
            config.selection.min_easy_pool,
            rng,
        );

        let mut weighted: Vec<(ProblemKey, SelectionWeight)> = Vec::with_capacity(candidates.len());
        let mut total = 0.0;
        for key in candidates {
            let weight = selection_weight(key, stats.get(&key), recent, missed, now, config);
            if weight.is_positive() {
                total += weight.value();
                weighted.push((key, weight));
            }
        }

        if weighted.is_empty() {
            trace!("candidate pool exhausted by no-repeat window; clearing");
            recent.clear();
            continue;
        }

        let mut draw = rng.gen_range(0.0..1.0) * total;
        let mut selected = weighted[0].0;
        for (key, weight) in &weighted {
            draw -= weight.value();
            if draw <= 0.0 {
                selected = *key;
                break;
            }
        }
        break selected;
    };

    // Display order is swapped 50/50 for variety; mastery tracking stays on
    // the canonical key either way.
    let (small, large) = selected_key.factors();
    let (a, b) = if rng.gen_bool(0.5) {
        (small, large)
    } else {
        (large, small)
    };

    Problem {
        id: EntityId::new(),
        a,
        b,
        answer: selected_key.product(),
        x: SPAWN_X_MARGIN
            + rng.gen_range(0.0..1.0) * (config.game.field_width - 2.0 * SPAWN_X_MARGIN),
        y: SPAWN_Y,
        spawned_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use crate::phases::Phase;
    use crate::types::ProfileId;

    fn base_config() -> BlasterConfig {
        BlasterConfig::default()
    }

    fn full_practice() -> PhaseProgress {
        PhaseProgress {
            current_phase: Phase::FullPractice,
            correct_in_phase: 0,
            total_correct: 30,
        }
    }

    #[test]
    fn ring_evicts_oldest_first() {
        let mut ring = RecentRing::new(3);
        for i in 1..=4 {
            ring.push(ProblemKey::new(i, 1));
        }
        assert_eq!(ring.len(), 3);
        assert!(!ring.contains(ProblemKey::new(1, 1)));
        assert!(ring.contains(ProblemKey::new(4, 1)));

        // Re-pushing an existing key neither duplicates nor reorders.
        ring.push(ProblemKey::new(2, 1));
        assert_eq!(ring.len(), 3);
        ring.push(ProblemKey::new(5, 1));
        assert!(!ring.contains(ProblemKey::new(2, 1)));
    }

    #[test]
    fn pool_dedupes_across_tables() {
        let pool = enumerate_pool(&[3, 4], 4);
        // 3×4 appears once even though both tables reach it.
        let count = pool
            .iter()
            .filter(|k| **k == ProblemKey::new(3, 4))
            .count();
        assert_eq!(count, 1);
        assert_eq!(pool.len(), 9); // 5 + 5 − 1 shared
    }

    #[test]
    fn overdue_and_weak_facts_outweigh_fresh_ones() {
        let config = base_config();
        let now = Utc::now();
        let key = ProblemKey::new(6, 7);
        let recent = RecentRing::new(5);
        let missed = HashSet::new();

        let mut overdue = ProblemStats::new(ProfileId::new(), key, now);
        overdue.next_review = now - Duration::days(2);
        overdue.easiness = 1.8;

        let weight = selection_weight(key, Some(&overdue), &recent, &missed, now, &config);
        // 1 + 2·10 + (3 − 1.8)·5 = 27
        assert!((weight.value() - 27.0).abs() < 1e-6);

        let unseen = selection_weight(key, None, &recent, &missed, now, &config);
        assert!((unseen.value() - 1.0).abs() < f64::EPSILON);
        assert!(weight > unseen);
    }

    #[test]
    fn session_misses_triple_the_weight() {
        let config = base_config();
        let now = Utc::now();
        let key = ProblemKey::new(6, 7);
        let recent = RecentRing::new(5);
        let mut missed = HashSet::new();
        missed.insert(key);

        let stats = ProblemStats::new(ProfileId::new(), key, now);
        let weight = selection_weight(key, Some(&stats), &recent, &missed, now, &config);
        // Fresh record: baseline 1, easiness 2.5 adds nothing, then ×3.
        assert!((weight.value() - 3.0).abs() < 1e-6);
    }

    #[test]
    fn recently_shown_facts_are_hard_excluded() {
        let config = base_config();
        let now = Utc::now();
        let key = ProblemKey::new(6, 7);
        let mut recent = RecentRing::new(5);
        recent.push(key);

        let stats = ProblemStats::new(ProfileId::new(), key, now);
        let weight = selection_weight(key, Some(&stats), &recent, &HashSet::new(), now, &config);
        assert!(!weight.is_positive());
    }

    #[test]
    fn single_positive_candidate_always_wins() {
        let config = base_config();
        let now = Utc::now();
        let stats = HashMap::new();
        let missed = HashSet::new();
        let progress = full_practice();

        // Table 2 with multiplier 0..=2 gives three facts; exclude two.
        let mut recent = RecentRing::new(5);
        recent.push(ProblemKey::new(2, 0));
        recent.push(ProblemKey::new(2, 1));

        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let problem = select_problem(
                &[2], 2, &stats, &mut recent, &missed, &progress, now, &config, &mut rng,
            );
            assert_eq!(problem.key(), ProblemKey::new(2, 2));
        }
    }

    #[test]
    fn starved_window_clears_and_recovers() {
        let config = base_config();
        let now = Utc::now();
        let stats = HashMap::new();
        let missed = HashSet::new();
        let progress = full_practice();

        // Every candidate for table 2 up to ×1 is inside the window.
        let mut recent = RecentRing::new(5);
        recent.push(ProblemKey::new(2, 0));
        recent.push(ProblemKey::new(2, 1));

        let mut rng = StdRng::seed_from_u64(9);
        let problem = select_problem(
            &[2], 1, &stats, &mut recent, &missed, &progress, now, &config, &mut rng,
        );
        assert!(problem.key() == ProblemKey::new(2, 0) || problem.key() == ProblemKey::new(2, 1));
        assert!(recent.is_empty());
    }

    #[test]
    fn spawned_problems_sit_above_the_field() {
        let config = base_config();
        let now = Utc::now();
        let stats = HashMap::new();
        let missed = HashSet::new();
        let progress = full_practice();
        let mut recent = RecentRing::new(5);

        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..50 {
            let problem = select_problem(
                &[5], 12, &stats, &mut recent, &missed, &progress, now, &config, &mut rng,
            );
            assert!((problem.y - SPAWN_Y).abs() < f64::EPSILON);
            assert!(problem.x >= SPAWN_X_MARGIN);
            assert!(problem.x <= config.game.field_width - SPAWN_X_MARGIN);
            assert_eq!(problem.answer, problem.a * problem.b);
        }
    }

    #[test]
    fn display_order_swaps_but_key_is_canonical() {
        let config = base_config();
        let now = Utc::now();
        let stats = HashMap::new();
        let missed = HashSet::new();
        let progress = full_practice();
        let mut recent = RecentRing::new(0); // no exclusions

        let mut rng = StdRng::seed_from_u64(7);
        let mut saw_swapped = false;
        let mut saw_canonical = false;
        for _ in 0..100 {
            let problem = select_problem(
                &[3], 12, &stats, &mut recent, &missed, &progress, now, &config, &mut rng,
            );
            let (small, _) = problem.key().factors();
            if problem.a == small && problem.a != problem.b {
                saw_canonical = true;
            } else if problem.a != problem.b {
                saw_swapped = true;
            }
        }
        assert!(saw_canonical && saw_swapped);
    }
}
