//! Per-frame arcade simulation: falling problems, missiles, collisions.
//!
//! [`GameState`] is exclusively owned and mutated here; every other
//! component sees read-only views or the [`FrameEvents`] returned from
//! [`update`], which the driver threads back into phase and performance
//! tracking.
//!
//! Missiles are fired at an *answer*, not at a specific target instance.
//! Launch velocity is solved by predictive intercept: the missile aims at
//! where the target will be, not where it is, so high-level missiles lead
//! fast-falling targets correctly.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::GameConfig;
use crate::performance::PerformanceMetrics;
use crate::phases::PhaseProgress;
use crate::types::{EntityId, ProblemKey};

/// Frames an explosion stays alive.
pub const EXPLOSION_FRAMES: u32 = 20;

/// Frames a wrong-answer effect stays alive.
pub const WRONG_EFFECT_FRAMES: u32 = 30;

/// Glyphs cycled through by wrong-answer effects.
const WRONG_EFFECT_GLYPHS: [char; 5] = ['💥', '❌', '🙈', '😱', '🤯'];

/// Extra space around the field before an escaping missile is culled.
const MISSILE_BOUNDS_MARGIN: f64 = 20.0;

/// Missiles launch this far above the bottom edge.
const LAUNCH_HEIGHT_OFFSET: f64 = 30.0;

// ---------------------------------------------------------------------------
// Transient entities
// ---------------------------------------------------------------------------

/// A falling problem. `a` and `b` are in display order, which may be the
/// swap of the canonical key's order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Problem {
    /// Unique id for this falling instance.
    pub id: EntityId,
    /// First displayed factor.
    pub a: u32,
    /// Second displayed factor.
    pub b: u32,
    /// The product the learner must type.
    pub answer: u32,
    /// Horizontal position in base coordinates.
    pub x: f64,
    /// Vertical position in base coordinates (grows downward).
    pub y: f64,
    /// When this instance entered the field.
    pub spawned_at: DateTime<Utc>,
}

impl Problem {
    /// Canonical key for this instance's fact.
    #[must_use]
    pub fn key(&self) -> ProblemKey {
        ProblemKey::new(self.a, self.b)
    }
}

/// An in-flight missile, fired at an answer value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Missile {
    /// Unique id.
    pub id: EntityId,
    /// Horizontal position.
    pub x: f64,
    /// Vertical position.
    pub y: f64,
    /// Velocity x component (base units per frame).
    pub vx: f64,
    /// Velocity y component (base units per frame).
    pub vy: f64,
    /// The answer this missile destroys.
    pub target_answer: u32,
    /// Heading in radians, for rendering.
    pub rotation: f64,
}

/// A cosmetic explosion, aged out by frame count.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Explosion {
    /// Unique id.
    pub id: EntityId,
    /// Horizontal position.
    pub x: f64,
    /// Vertical position.
    pub y: f64,
    /// Frames since spawn.
    pub frame: u32,
}

/// A cosmetic wrong-answer effect; floats upward while spinning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WrongEffect {
    /// Unique id.
    pub id: EntityId,
    /// Displayed glyph.
    pub glyph: char,
    /// Horizontal position.
    pub x: f64,
    /// Vertical position.
    pub y: f64,
    /// Frames since spawn.
    pub frame: u32,
    /// Spin angle in radians.
    pub rotation: f64,
}

// ---------------------------------------------------------------------------
// Game state
// ---------------------------------------------------------------------------

/// Session lifecycle status. `Ended` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameStatus {
    /// Simulation advances every frame.
    Playing,
    /// Simulation frozen; state retained.
    Paused,
    /// Lives exhausted; no further simulation.
    Ended,
}

/// Per-fact outcome tally accumulated over a whole session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutcomeTally {
    /// Destroyed-by-missile count.
    pub correct: u32,
    /// Reached-the-floor count.
    pub incorrect: u32,
    /// Response times for the correct hits, in milliseconds.
    pub times: Vec<f64>,
}

/// The authoritative session state, owned by the simulation core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameState {
    /// Lifecycle status.
    pub status: GameStatus,
    /// Current score.
    pub score: u32,
    /// Current level; a pure function of score.
    pub level: u32,
    /// Remaining lives.
    pub lives: u32,
    /// Falling problems, in spawn order.
    pub problems: Vec<Problem>,
    /// In-flight missiles.
    pub missiles: Vec<Missile>,
    /// Live explosions.
    pub explosions: Vec<Explosion>,
    /// Live wrong-answer effects.
    pub wrong_effects: Vec<WrongEffect>,
    /// Session-long per-fact outcome tallies, keyed canonically.
    pub problem_results: BTreeMap<ProblemKey, OutcomeTally>,
    /// When the most recent problem spawned.
    pub last_spawn: DateTime<Utc>,
    /// When the session started.
    pub session_start: DateTime<Utc>,
    /// Phase ladder progress.
    pub phase_progress: PhaseProgress,
    /// Rolling performance window and speed multiplier.
    pub performance: PerformanceMetrics,
}

impl GameState {
    /// Fresh session state in phase 1 with full lives.
    #[must_use]
    pub fn new(config: &GameConfig, now: DateTime<Utc>) -> Self {
        Self {
            status: GameStatus::Playing,
            score: 0,
            level: 1,
            lives: config.initial_lives,
            problems: Vec::new(),
            missiles: Vec::new(),
            explosions: Vec::new(),
            wrong_effects: Vec::new(),
            problem_results: BTreeMap::new(),
            last_spawn: now,
            session_start: now,
            phase_progress: PhaseProgress::new(),
            performance: PerformanceMetrics::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Level curves
// ---------------------------------------------------------------------------

/// Level as a pure function of score: `score / points_per_level + 1`.
#[must_use]
pub fn level_for_score(score: u32, config: &GameConfig) -> u32 {
    score / config.points_per_level + 1
}

/// Fall speed at a level, in base units per frame.
#[must_use]
pub fn fall_speed(level: u32, config: &GameConfig) -> f64 {
    config.base_fall_speed + f64::from(level) * config.fall_speed_per_level
}

/// Level-curve spawn interval, clamped to the configured floor.
#[must_use]
pub fn spawn_interval_ms(level: u32, config: &GameConfig) -> u64 {
    config
        .base_spawn_interval_ms
        .saturating_sub(config.spawn_interval_step_ms * u64::from(level))
        .max(config.min_spawn_interval_ms)
}

/// Largest second factor allowed at a level; grows the pool as levels climb.
#[must_use]
pub fn max_multiplier(level: u32, config: &GameConfig) -> u32 {
    (config.base_max_multiplier + level / 2).min(config.max_multiplier_cap)
}

// ---------------------------------------------------------------------------
// Frame update
// ---------------------------------------------------------------------------

/// A target destroyed this frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrectHit {
    /// The destroyed fact.
    pub problem_key: ProblemKey,
    /// Milliseconds between spawn and destruction.
    pub response_time_ms: f64,
}

/// A target that reached the floor this frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FloorMiss {
    /// The escaped fact.
    pub problem_key: ProblemKey,
    /// Milliseconds the target survived.
    pub time_alive_ms: f64,
}

/// Everything that happened during one frame update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameEvents {
    /// Targets destroyed by missiles.
    pub correct_hits: Vec<CorrectHit>,
    /// Targets that fell off the bottom.
    pub incorrect_misses: Vec<FloorMiss>,
}

#[allow(clippy::cast_precision_loss)]
fn elapsed_ms(since: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (now - since).num_milliseconds() as f64
}

/// Advance the simulation by one frame.
///
/// `vertical_scale` proportionally scales fall distance, letting the host
/// keep perceived speed constant on a resized surface. No-op unless the
/// status is `Playing`.
pub fn update(
    state: &mut GameState,
    vertical_scale: f64,
    now: DateTime<Utc>,
    config: &GameConfig,
) -> FrameEvents {
    let mut events = FrameEvents::default();
    if state.status != GameStatus::Playing {
        return events;
    }

    let fall = fall_speed(state.level, config);

    // Falling problems. Floor breaches cost a life and count as incorrect.
    let mut i = 0;
    while i < state.problems.len() {
        state.problems[i].y += fall * vertical_scale;

        if state.problems[i].y > config.field_height {
            let problem = state.problems.remove(i);
            state.lives = state.lives.saturating_sub(1);

            let key = problem.key();
            state.problem_results.entry(key).or_default().incorrect += 1;
            events.incorrect_misses.push(FloorMiss {
                problem_key: key,
                time_alive_ms: elapsed_ms(problem.spawned_at, now),
            });

            if state.lives == 0 {
                state.status = GameStatus::Ended;
            }
        } else {
            i += 1;
        }
    }

    // Missiles: advance, cull escapees, resolve collisions. At most one
    // collision per missile per frame; first matching problem in array
    // order wins.
    let mut m = 0;
    while m < state.missiles.len() {
        state.missiles[m].x += state.missiles[m].vx;
        state.missiles[m].y += state.missiles[m].vy;

        let missile = state.missiles[m];
        let out_of_bounds = missile.x < -MISSILE_BOUNDS_MARGIN
            || missile.x > config.field_width + MISSILE_BOUNDS_MARGIN
            || missile.y < -MISSILE_BOUNDS_MARGIN
            || missile.y > config.field_height + MISSILE_BOUNDS_MARGIN;
        if out_of_bounds {
            state.missiles.remove(m);
            continue;
        }

        let hit = state.problems.iter().position(|p| {
            missile.target_answer == p.answer
                && (missile.x - p.x).abs() < config.hit_width / 2.0
                && (missile.y - p.y).abs() < config.hit_height / 2.0
        });

        if let Some(p) = hit {
            let problem = state.problems.remove(p);
            let key = problem.key();
            let response_time_ms = elapsed_ms(problem.spawned_at, now);

            let tally = state.problem_results.entry(key).or_default();
            tally.correct += 1;
            tally.times.push(response_time_ms);
            events.correct_hits.push(CorrectHit {
                problem_key: key,
                response_time_ms,
            });

            state.explosions.push(Explosion {
                id: EntityId::new(),
                x: problem.x,
                y: problem.y,
                frame: 0,
            });

            state.score += config.points_per_destroy * state.level;
            state.level = level_for_score(state.score, config);

            state.missiles.remove(m);
        } else {
            m += 1;
        }
    }

    // Cosmetic effects age out by frame count; no gameplay effect.
    state.explosions.retain_mut(|e| {
        e.frame += 1;
        e.frame < EXPLOSION_FRAMES
    });
    state.wrong_effects.retain_mut(|e| {
        e.frame += 1;
        e.y -= 2.0;
        e.rotation += 0.1;
        e.frame < WRONG_EFFECT_FRAMES
    });

    events
}

/// Register a freshly selected problem with the field.
pub fn add_problem(state: &mut GameState, problem: Problem, now: DateTime<Utc>) {
    state.problems.push(problem);
    state.last_spawn = now;
}

// ---------------------------------------------------------------------------
// Firing
// ---------------------------------------------------------------------------

/// Fire a missile at `answer` from `launch_x` on the launch rail.
///
/// If no live problem carries that answer, this is a whiff: cosmetic
/// wrong-answer effects spawn, no missile launches, and neither lives nor
/// score change — only targets reaching the floor cost lives. Otherwise the
/// first problem (array order) with the answer is targeted and a missile
/// launches on a predictive-intercept heading. Returns whether a missile
/// was fired.
pub fn fire_missile<R: Rng + ?Sized>(
    state: &mut GameState,
    answer: u32,
    launch_x: f64,
    config: &GameConfig,
    rng: &mut R,
) -> bool {
    let Some(target) = state.problems.iter().find(|p| p.answer == answer) else {
        for _ in 0..5 {
            let glyph = WRONG_EFFECT_GLYPHS[rng.gen_range(0..WRONG_EFFECT_GLYPHS.len())];
            state.wrong_effects.push(WrongEffect {
                id: EntityId::new(),
                glyph,
                x: rng.gen_range(0.0..config.field_width),
                y: config.field_height - 100.0 + rng.gen_range(0.0..50.0),
                frame: 0,
                rotation: 0.0,
            });
        }
        return false;
    };

    let launch_y = config.field_height - LAUNCH_HEIGHT_OFFSET;
    let (vx, vy) = intercept_velocity(
        target.x - launch_x,
        target.y - launch_y,
        fall_speed(state.level, config),
        config.missile_speed,
    );

    state.missiles.push(Missile {
        id: EntityId::new(),
        x: launch_x,
        y: launch_y,
        vx,
        vy,
        target_answer: answer,
        rotation: vy.atan2(vx),
    });

    true
}

/// Solve the launch velocity that meets a target falling at `fall_speed`.
///
/// With the target offset `(dx, dy)` from the launcher and both speeds in
/// units per frame, the meeting time satisfies
///
/// ```text
/// (missile_speed² − fall_speed²)·t² − 2·dy·fall_speed·t − (dx² + dy²) = 0
/// ```
///
/// and the missile aims at `(dx, dy + fall_speed·t)` for the positive root
/// `t`. When the quadratic has no usable real solution (negative
/// discriminant, near-singular leading coefficient, or a non-positive
/// root), the aim clamps to a straight line toward the target's current
/// position.
#[must_use]
pub fn intercept_velocity(dx: f64, dy: f64, fall_speed: f64, missile_speed: f64) -> (f64, f64) {
    let a = missile_speed * missile_speed - fall_speed * fall_speed;
    let b = -2.0 * dy * fall_speed;
    let c = -(dx * dx + dy * dy);
    let discriminant = b * b - 4.0 * a * c;

    let straight_line = |dx: f64, dy: f64| {
        let dist = (dx * dx + dy * dy).sqrt();
        if dist < f64::EPSILON {
            // Target is on the muzzle; any direction resolves next frame.
            (0.0, -missile_speed)
        } else {
            (dx / dist * missile_speed, dy / dist * missile_speed)
        }
    };

    if a.abs() < 1e-9 || discriminant < 0.0 {
        return straight_line(dx, dy);
    }

    let t = (-b + discriminant.sqrt()) / (2.0 * a);
    if t <= 0.0 {
        return straight_line(dx, dy);
    }

    straight_line(dx, dy + fall_speed * t)
}
