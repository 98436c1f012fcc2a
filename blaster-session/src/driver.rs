//! The session driver — one logical thread of control per session.
//!
//! Owns the game state and the scheduling inputs around it (mastery
//! records, no-repeat window, session misses, RNG) and wires three clocks
//! together:
//!
//! | clock        | cadence             | role                             |
//! |--------------|---------------------|----------------------------------|
//! | frame        | ~60 Hz interval     | simulation tick                  |
//! | spawn        | self-rescheduling   | next-problem selection           |
//! | snapshot     | 10 Hz interval      | render/HUD coalescing only       |
//!
//! The spawn timer is a one-shot that re-arms itself after every firing
//! from the current phase/performance pacing, so drift never accumulates.
//! Fire requests queue behind frame updates on the same task; there is no
//! concurrent mutation of the state.
//!
//! Teardown drops all three clocks together and skips finalization: once a
//! session is torn down, nothing touches the state or the store again. The
//! end-of-session batch write runs exactly once, guarded by a finished
//! flag.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::Ordering;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

use blaster_core::config::BlasterConfig;
use blaster_core::engine::{self, FrameEvents, GameState, GameStatus};
use blaster_core::error::{BlasterError, Result};
use blaster_core::metrics::SessionCounters;
use blaster_core::performance::{PhasePacing, phase_based_speed};
use blaster_core::persistence::ProgressDb;
use blaster_core::selector::{self, RecentRing};
use blaster_core::session::finalize_session;
use blaster_core::sm2::ProblemStats;
use blaster_core::types::{ProblemKey, Profile};

use crate::events::{SessionEvent, TelemetrySink};
use crate::input::parse_answer;
use crate::snapshot::RenderSnapshot;

/// What the host shows on the game-over screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    /// Final score.
    pub score: u32,
    /// Final level.
    pub level: u32,
    /// Total outcomes recorded.
    pub problems_attempted: u32,
    /// Correct outcomes recorded.
    pub problems_correct: u32,
    /// Facts missed at least once.
    pub trouble_spots: Vec<ProblemKey>,
    /// Whether the score beat the stored high score.
    pub is_new_high_score: bool,
}

/// Drives one session from first spawn to the final batch write.
pub struct SessionDriver {
    config: BlasterConfig,
    profile: Profile,
    tables: Vec<u32>,
    state: GameState,
    stats: HashMap<ProblemKey, ProblemStats>,
    recent: RecentRing,
    missed: HashSet<ProblemKey>,
    rng: StdRng,
    sink: Box<dyn TelemetrySink>,
    counters: SessionCounters,
    vertical_scale: f64,
    finished: bool,
}

impl std::fmt::Debug for SessionDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionDriver")
            .field("profile", &self.profile.id)
            .field("tables", &self.tables)
            .field("status", &self.state.status)
            .finish_non_exhaustive()
    }
}

impl SessionDriver {
    /// Create a driver for one session.
    ///
    /// # Preconditions
    /// `tables` must be non-empty; selection over an empty topic set never
    /// terminates. The driving UI enforces at least one selected table.
    #[must_use]
    pub fn new(
        profile: Profile,
        tables: Vec<u32>,
        config: BlasterConfig,
        sink: Box<dyn TelemetrySink>,
    ) -> Self {
        Self::with_rng(profile, tables, config, sink, StdRng::from_entropy())
    }

    /// Like [`SessionDriver::new`], with a caller-supplied RNG so tests can
    /// pin the whole session.
    #[must_use]
    pub fn with_rng(
        profile: Profile,
        tables: Vec<u32>,
        config: BlasterConfig,
        sink: Box<dyn TelemetrySink>,
        rng: StdRng,
    ) -> Self {
        debug_assert!(!tables.is_empty(), "at least one table must be selected");
        let now = Utc::now();
        let state = GameState::new(&config.game, now);
        let recent = RecentRing::new(config.selection.recent_capacity);
        Self {
            config,
            profile,
            tables,
            state,
            stats: HashMap::new(),
            recent,
            missed: HashSet::new(),
            rng,
            sink,
            counters: SessionCounters::new(),
            vertical_scale: 1.0,
            finished: false,
        }
    }

    /// Read-only view of the authoritative game state.
    #[must_use]
    pub fn state(&self) -> &GameState {
        &self.state
    }

    /// Session counters, for dashboards and debugging overlays.
    #[must_use]
    pub fn counters(&self) -> &SessionCounters {
        &self.counters
    }

    /// Scale applied to fall distance, for hosts rendering at a different
    /// aspect than the base space.
    pub fn set_vertical_scale(&mut self, scale: f64) {
        self.vertical_scale = scale;
    }

    /// Load the learner's mastery records and announce the session.
    ///
    /// Must complete before scoring begins; spawning with an empty stats
    /// map is the safe default if a host chooses not to wait.
    ///
    /// # Errors
    /// Returns storage errors from the stats read.
    pub fn begin(&mut self, db: &ProgressDb, now: DateTime<Utc>) -> Result<()> {
        let records = db.stats_for_profile(self.profile.id)?;
        self.stats = records
            .into_iter()
            .map(|s| (s.problem_key, s))
            .collect();

        self.sink.record(&SessionEvent::GameStart {
            profile_name: self.profile.name.clone(),
            tables: self.tables.clone(),
        });
        info!(
            profile = %self.profile.id,
            tables = ?self.tables,
            known_facts = self.stats.len(),
            "Session started"
        );

        // First target goes up immediately so the field is never empty.
        self.spawn_problem(now);
        Ok(())
    }

    /// Select and spawn the next problem. No-op once the session ended.
    pub fn spawn_problem(&mut self, now: DateTime<Utc>) {
        if self.state.status != GameStatus::Playing {
            return;
        }

        let max_multiplier = engine::max_multiplier(self.state.level, &self.config.game);
        let problem = selector::select_problem(
            &self.tables,
            max_multiplier,
            &self.stats,
            &mut self.recent,
            &self.missed,
            &self.state.phase_progress,
            now,
            &self.config,
            &mut self.rng,
        );

        self.recent.push(problem.key());
        engine::add_problem(&mut self.state, problem, now);
        self.counters.problems_spawned.fetch_add(1, Ordering::Relaxed);
    }

    /// Advance one frame and fold the outcome events back into phase and
    /// performance tracking.
    pub fn tick(&mut self, now: DateTime<Utc>) -> FrameEvents {
        let level_before = self.state.level;

        // The multiplier chases its target every frame, result or not.
        self.state.performance.update_speed_multiplier();

        let events = engine::update(&mut self.state, self.vertical_scale, now, &self.config.game);

        for hit in &events.correct_hits {
            let advanced = self.state.phase_progress.record_correct(&self.config.phases);
            if advanced {
                self.counters.phase_advances.fetch_add(1, Ordering::Relaxed);
                self.sink.record(&SessionEvent::PhaseAdvanced {
                    phase: self.state.phase_progress.current_phase,
                    total_correct: self.state.phase_progress.total_correct,
                });
            }
            self.state
                .performance
                .add_result(true, hit.response_time_ms, now);
            self.counters.target_hits.fetch_add(1, Ordering::Relaxed);
        }

        for miss in &events.incorrect_misses {
            self.missed.insert(miss.problem_key);
            self.state
                .performance
                .add_result(false, miss.time_alive_ms, now);
            self.counters.floor_misses.fetch_add(1, Ordering::Relaxed);
        }

        if self.state.level > level_before {
            self.sink.record(&SessionEvent::LevelUp {
                level: self.state.level,
                score: self.state.score,
            });
        }

        events
    }

    /// Handle a fire press. Unparseable input is a silent no-op; a parsed
    /// answer with no matching target whiffs (cosmetics only). Returns
    /// whether a missile launched.
    pub fn fire(&mut self, raw: &str, launch_x: f64) -> bool {
        let Some(answer) = parse_answer(raw) else {
            return false;
        };

        let fired = engine::fire_missile(
            &mut self.state,
            answer,
            launch_x,
            &self.config.game,
            &mut self.rng,
        );
        if fired {
            self.counters.missiles_fired.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.wrong_answers.fetch_add(1, Ordering::Relaxed);
        }
        fired
    }

    /// Fire from the center of the field (the default launch rail).
    pub fn fire_centered(&mut self, raw: &str) -> bool {
        let center = self.config.game.field_width / 2.0;
        self.fire(raw, center)
    }

    /// Freeze the simulation. No-op once ended.
    pub fn pause(&mut self) {
        if self.state.status == GameStatus::Playing {
            self.state.status = GameStatus::Paused;
        }
    }

    /// Resume a paused simulation.
    pub fn resume(&mut self) {
        if self.state.status == GameStatus::Paused {
            self.state.status = GameStatus::Playing;
        }
    }

    /// Current pacing from phase and performance, for the spawn scheduler.
    #[must_use]
    pub fn pacing(&self) -> PhasePacing {
        phase_based_speed(
            self.state.phase_progress.current_phase,
            &self.state.performance,
            &self.config.pacing,
        )
    }

    /// Read-only snapshot for the rendering collaborator.
    #[must_use]
    pub fn snapshot(&self) -> RenderSnapshot {
        RenderSnapshot::from_state(&self.state, &self.config)
    }

    /// Finalize the session: fold tallies into memory-model updates, write
    /// the batch, append the session history, and settle the high score.
    ///
    /// # Errors
    /// Returns [`BlasterError::SessionAlreadyFinalized`] on a second call,
    /// or storage errors from the writes.
    pub fn finish(&mut self, db: &mut ProgressDb, now: DateTime<Utc>) -> Result<SessionReport> {
        if self.finished {
            return Err(BlasterError::SessionAlreadyFinalized);
        }

        let outcome = finalize_session(&self.state, &self.stats, &self.profile, now);

        if !outcome.updated_stats.is_empty() {
            db.put_stats_batch(&outcome.updated_stats)?;
            self.counters.saves_completed.fetch_add(1, Ordering::Relaxed);
        }
        db.save_session(&outcome.result)?;

        if outcome.is_new_high_score {
            let previous = self.profile.high_score;
            self.profile.high_score = self.state.score;
            db.update_profile(&self.profile)?;
            self.sink.record(&SessionEvent::NewHighScore {
                score: self.state.score,
                previous,
                improvement: self.state.score - previous,
            });
        }

        let duration_ms = (now - self.state.session_start).num_milliseconds();
        let attempted = outcome.result.problems_attempted;
        let correct = outcome.result.problems_correct;
        let accuracy_pct = if attempted > 0 {
            (f64::from(correct) / f64::from(attempted) * 100.0).round() as u32
        } else {
            0
        };
        self.sink.record(&SessionEvent::GameEnd {
            score: self.state.score,
            level: self.state.level,
            problems_attempted: attempted,
            problems_correct: correct,
            accuracy_pct,
            duration_ms,
            is_new_high_score: outcome.is_new_high_score,
        });

        self.counters.sessions_completed.fetch_add(1, Ordering::Relaxed);
        self.finished = true;

        Ok(SessionReport {
            score: self.state.score,
            level: self.state.level,
            problems_attempted: attempted,
            problems_correct: correct,
            trouble_spots: outcome.result.trouble_spots,
            is_new_high_score: outcome.is_new_high_score,
        })
    }

    /// Run the session to completion on the current task.
    ///
    /// Returns `Ok(Some(report))` when the session ends by gameplay, or
    /// `Ok(None)` on teardown — in which case nothing was finalized or
    /// persisted, matching the no-mutation-after-teardown rule.
    ///
    /// # Errors
    /// Returns storage errors from the initial stats read or the final
    /// batch write.
    pub async fn run(
        mut self,
        db: &mut ProgressDb,
        mut fire_rx: mpsc::Receiver<String>,
        mut shutdown_rx: watch::Receiver<bool>,
        snapshot_tx: watch::Sender<RenderSnapshot>,
    ) -> Result<Option<SessionReport>> {
        self.begin(db, Utc::now())?;

        let frame_period = Duration::from_secs_f64(1.0 / f64::from(self.config.driver.frame_hz));
        let mut frame = time::interval(frame_period);
        frame.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let snapshot_period =
            Duration::from_secs_f64(1.0 / f64::from(self.config.driver.snapshot_hz));
        let mut hud = time::interval(snapshot_period);
        hud.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // The opening double-spawn: the second target leads the regular
        // self-rescheduling cadence.
        let spawn_sleep =
            time::sleep(Duration::from_millis(self.config.driver.second_spawn_delay_ms));
        tokio::pin!(spawn_sleep);

        loop {
            tokio::select! {
                _ = frame.tick() => {
                    self.tick(Utc::now());
                    if self.state.status == GameStatus::Ended {
                        let report = self.finish(db, Utc::now())?;
                        let _ = snapshot_tx.send(self.snapshot());
                        return Ok(Some(report));
                    }
                }
                () = &mut spawn_sleep => {
                    self.spawn_problem(Utc::now());
                    let next = self.pacing().spawn_interval;
                    debug!(next_spawn_ms = next.as_millis() as u64, "Spawn rescheduled");
                    spawn_sleep.as_mut().reset(time::Instant::now() + next);
                }
                Some(raw) = fire_rx.recv() => {
                    self.fire_centered(&raw);
                }
                _ = hud.tick() => {
                    let _ = snapshot_tx.send(self.snapshot());
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!(profile = %self.profile.id, "Session torn down; skipping finalize");
                        return Ok(None);
                    }
                }
            }
        }
    }
}
