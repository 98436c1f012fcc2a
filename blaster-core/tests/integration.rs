//! Integration tests — end-to-end session flows.
//!
//! These drive the engine the way the session driver does: select → spawn →
//! fire → tick, then finalize into the store, checking the cross-component
//! invariants (phase ramp, score arithmetic, double-update persistence).

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use rand::SeedableRng;
use rand::rngs::StdRng;

use blaster_core::config::BlasterConfig;
use blaster_core::engine::{self, GameState, GameStatus, Problem};
use blaster_core::persistence::ProgressDb;
use blaster_core::selector::{self, RecentRing};
use blaster_core::session::finalize_session;
use blaster_core::sm2::{self, ProblemStats};
use blaster_core::types::{EntityId, ProblemKey, Profile};

fn place(state: &mut GameState, a: u32, b: u32, x: f64, y: f64) {
    let now = Utc::now();
    engine::add_problem(
        state,
        Problem {
            id: EntityId::new(),
            a,
            b,
            answer: a * b,
            x,
            y,
            spawned_at: now,
        },
        now,
    );
}

// ---------------------------------------------------------------------------
// Phase ramp and score arithmetic over a full 15-hit run
// ---------------------------------------------------------------------------

#[test]
fn fifteen_straight_hits_reach_phase_two_with_exact_score() {
    let config = BlasterConfig::default();
    let now = Utc::now();
    let mut rng = StdRng::seed_from_u64(99);
    let mut state = GameState::new(&config.game, now);
    let stats = HashMap::new();
    let mut recent = RecentRing::new(config.selection.recent_capacity);
    let missed = HashSet::new();

    let mut expected_score = 0;

    for hit_number in 1..=15 {
        let max_multiplier = engine::max_multiplier(state.level, &config.game);
        let problem = selector::select_problem(
            &[5],
            max_multiplier,
            &stats,
            &mut recent,
            &missed,
            &state.phase_progress,
            now,
            &config,
            &mut rng,
        );
        recent.push(problem.key());
        let answer = problem.answer;
        let launch_x = problem.x;
        engine::add_problem(&mut state, problem, now);

        // Straight-up shot from directly beneath the target.
        assert!(engine::fire_missile(&mut state, answer, launch_x, &config.game, &mut rng));

        let level_at_fire = state.level;
        let mut hit = false;
        for _ in 0..500 {
            let events = engine::update(&mut state, 1.0, now, &config.game);
            for _ in &events.correct_hits {
                state.phase_progress.record_correct(&config.phases);
                hit = true;
            }
            assert!(events.incorrect_misses.is_empty(), "no target may escape");
            if hit {
                break;
            }
        }
        assert!(hit, "hit {hit_number} never landed");

        expected_score += config.game.points_per_destroy * level_at_fire;
        assert_eq!(state.score, expected_score);
        assert_eq!(state.level, state.score / config.game.points_per_level + 1);
    }

    // 15 correct answers: phase 2 exactly at the 15th hit.
    assert_eq!(state.phase_progress.current_phase.number(), 2);
    assert_eq!(state.phase_progress.correct_in_phase, 0);
    assert_eq!(state.phase_progress.total_correct, 15);

    // 10 hits at level 1, then 5 at level 2: 100 + 100 = 200.
    assert_eq!(state.score, 200);
    assert_eq!(state.level, 3);
}

// ---------------------------------------------------------------------------
// Floor misses drain lives and end the session
// ---------------------------------------------------------------------------

#[test]
fn three_floor_misses_end_the_session() {
    let config = BlasterConfig::default();
    let now = Utc::now();
    let mut state = GameState::new(&config.game, now);

    for i in 0..3 {
        place(&mut state, 4, 6, 100.0 + f64::from(i) * 50.0, -40.0);
    }

    let mut frames = 0;
    while state.status != GameStatus::Ended {
        engine::update(&mut state, 1.0, now, &config.game);
        frames += 1;
        assert!(frames < 5_000, "targets must reach the floor");
    }

    assert_eq!(state.lives, 0);
    assert_eq!(state.problem_results[&ProblemKey::new(4, 6)].incorrect, 3);
    assert!(state.problems.is_empty());
}

// ---------------------------------------------------------------------------
// Ambiguous answers resolve exactly one target
// ---------------------------------------------------------------------------

#[test]
fn duplicate_answer_fire_resolves_exactly_one_target() {
    let config = BlasterConfig::default();
    let now = Utc::now();
    let mut rng = StdRng::seed_from_u64(5);
    let mut state = GameState::new(&config.game, now);

    place(&mut state, 4, 6, 200.0, 200.0);
    place(&mut state, 3, 8, 700.0, 200.0);

    assert!(engine::fire_missile(&mut state, 24, 200.0, &config.game, &mut rng));
    for _ in 0..500 {
        engine::update(&mut state, 1.0, now, &config.game);
        if state.problems.len() == 1 {
            break;
        }
    }

    // First match in array order went down; the other 24 remains.
    assert_eq!(state.problems.len(), 1);
    assert_eq!(state.problems[0].answer, 24);
    assert_eq!(state.problems[0].key(), ProblemKey::new(3, 8));
    assert_eq!(state.problem_results[&ProblemKey::new(4, 6)].correct, 1);
    assert!(!state.problem_results.contains_key(&ProblemKey::new(3, 8)));
}

// ---------------------------------------------------------------------------
// Double update: the incorrect branch wins in the persisted record
// ---------------------------------------------------------------------------

#[test]
fn mixed_outcome_fact_persists_the_forgetting_reset() {
    let config = BlasterConfig::default();
    let now = Utc::now();
    let mut db = ProgressDb::open_in_memory().expect("open");
    let profile = db.create_profile("Ada", now).expect("create");

    // Seed a record with an existing streak.
    let key = ProblemKey::new(3, 7);
    let seeded = {
        let base = ProblemStats::new(profile.id, key, now);
        let s1 = sm2::update(&base, 5, 2000.0, now);
        sm2::update(&s1, 5, 2000.0, now)
    };
    db.put_stats_batch(std::slice::from_ref(&seeded)).expect("seed");
    assert_eq!(seeded.repetitions, 2);

    // One session where 3×7 was both hit and missed.
    let mut state = GameState::new(&config.game, now);
    let tally = state.problem_results.entry(key).or_default();
    tally.correct = 1;
    tally.times.push(2500.0);
    tally.incorrect = 1;
    state.score = 10;

    let mut stats_map = HashMap::new();
    stats_map.insert(key, seeded.clone());
    let outcome = finalize_session(&state, &stats_map, &profile, now);

    // Two updates for the one key: streak-advance first, reset second,
    // both computed from the pre-session record.
    assert_eq!(outcome.updated_stats.len(), 2);
    assert_eq!(outcome.updated_stats[0].repetitions, 3);
    assert_eq!(outcome.updated_stats[1].repetitions, 0);

    db.put_stats_batch(&outcome.updated_stats).expect("save");
    db.save_session(&outcome.result).expect("session");

    // In-order upsert: the reset is what survives.
    let stored = db.stats_for_profile(profile.id).expect("load");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].repetitions, 0);
    assert_eq!(stored[0].interval_days, 0);
    assert_eq!(stored[0].total_attempts, seeded.total_attempts + 1);
}

// ---------------------------------------------------------------------------
// Whiffed fire never disturbs scoring state
// ---------------------------------------------------------------------------

#[test]
fn fire_at_nonexistent_answer_never_changes_scoring_state() {
    let config = BlasterConfig::default();
    let now = Utc::now();
    let mut rng = StdRng::seed_from_u64(17);
    let mut state = GameState::new(&config.game, now);
    place(&mut state, 3, 7, 400.0, 100.0);

    for bogus in [0, 22, 145, 999] {
        assert!(!engine::fire_missile(&mut state, bogus, 450.0, &config.game, &mut rng));
    }

    assert_eq!(state.score, 0);
    assert_eq!(state.lives, config.game.initial_lives);
    assert_eq!(state.problems.len(), 1);
    assert!(state.problem_results.is_empty());
}

// ---------------------------------------------------------------------------
// Pure-function determinism of the memory model
// ---------------------------------------------------------------------------

#[test]
fn identical_review_sequences_produce_identical_records() {
    let now = Utc::now();
    let profile = Profile::new("Ada", now);
    let key = ProblemKey::new(6, 9);
    let sequence = [(5u8, 1800.0), (4, 4200.0), (1, 10_000.0), (5, 2100.0), (3, 7800.0)];

    let run = || {
        let mut stats = ProblemStats::new(profile.id, key, now);
        for &(quality, ms) in &sequence {
            stats = sm2::update(&stats, quality, ms, now);
        }
        stats
    };

    let first = run();
    let second = run();
    assert_eq!(first, second);

    // And a serialization round-trip changes nothing.
    let json = serde_json::to_string(&first).expect("serialize");
    let restored: ProblemStats = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(restored, first);
}
