//! Session difficulty phases.
//!
//! A session climbs through four phases, advancing every
//! `correct_per_phase` correct answers. The phase gates which facts the
//! selector may draw (see [`crate::difficulty::filter_by_phase`]) and, in
//! the final phase, hands pacing over to the performance monitor.
//!
//! The phase never goes backwards within a session; phase 4 is terminal.

use serde::{Deserialize, Serialize};

use crate::config::PhaseConfig;

/// The four escalating difficulty phases of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Phase 1 — easy facts only, building confidence.
    Foundation,
    /// Phase 2 — harder facts mixed in gradually.
    GradualChallenge,
    /// Phase 3 — the full pool at a steady pace.
    FullPractice,
    /// Phase 4 — full pool, pace adapted to performance.
    Mastery,
}

impl Phase {
    /// 1-based phase number, for display and persistence.
    #[must_use]
    pub fn number(self) -> u8 {
        match self {
            Self::Foundation => 1,
            Self::GradualChallenge => 2,
            Self::FullPractice => 3,
            Self::Mastery => 4,
        }
    }

    /// Whether this phase is the last one of a session.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self == Self::Mastery
    }

    /// Short HUD description.
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::Foundation => "Foundation - Building confidence with easier problems",
            Self::GradualChallenge => "Gradual Challenge - Introducing harder problems",
            Self::FullPractice => "Full Practice - All problems, steady pace",
            Self::Mastery => "Mastery - Adaptive speed based on performance",
        }
    }

    fn next(self) -> Self {
        match self {
            Self::Foundation => Self::GradualChallenge,
            Self::GradualChallenge => Self::FullPractice,
            Self::FullPractice | Self::Mastery => Self::Mastery,
        }
    }
}

/// Progress through the phase ladder for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseProgress {
    /// The phase currently in effect.
    pub current_phase: Phase,
    /// Correct answers since entering the current phase.
    pub correct_in_phase: u32,
    /// Correct answers over the whole session (monotonic).
    pub total_correct: u32,
}

impl PhaseProgress {
    /// Start a session in phase 1 with empty counters.
    #[must_use]
    pub fn new() -> Self {
        Self {
            current_phase: Phase::Foundation,
            correct_in_phase: 0,
            total_correct: 0,
        }
    }

    /// Record one correct answer. Returns `true` if the phase advanced.
    pub fn record_correct(&mut self, config: &PhaseConfig) -> bool {
        self.correct_in_phase += 1;
        self.total_correct += 1;

        if self.correct_in_phase >= config.correct_per_phase && !self.current_phase.is_terminal() {
            self.current_phase = self.current_phase.next();
            self.correct_in_phase = 0;
            return true;
        }
        false
    }

    /// Progress toward the next phase, or `None` once in the terminal phase.
    #[must_use]
    pub fn toward_next(&self, config: &PhaseConfig) -> Option<PhaseGoal> {
        if self.current_phase.is_terminal() {
            return None;
        }
        let needed = config.correct_per_phase;
        let current = self.correct_in_phase;
        Some(PhaseGoal {
            current,
            needed,
            percentage: (f64::from(current) / f64::from(needed) * 100.0).min(100.0),
        })
    }
}

impl Default for PhaseProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// How close the session is to the next phase, for HUD display.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseGoal {
    /// Correct answers so far in this phase.
    pub current: u32,
    /// Correct answers required to advance.
    pub needed: u32,
    /// `current / needed` as a percentage, capped at 100.
    pub percentage: f64,
}
