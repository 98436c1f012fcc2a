//! Session telemetry events.
//!
//! The driver announces session milestones to a [`TelemetrySink`]
//! fire-and-forget: no return value is consulted, and a sink that drops or
//! mangles events can never affect core state. The default sink logs
//! through `tracing`; hosts with a real analytics backend implement the
//! trait themselves.

use blaster_core::config::TelemetryConfig;
use blaster_core::phases::Phase;
use tracing::info;

/// A session milestone worth reporting.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A session began.
    GameStart {
        /// Learner display name.
        profile_name: String,
        /// The tables selected for practice.
        tables: Vec<u32>,
    },
    /// A session ended (lives exhausted).
    GameEnd {
        /// Final score.
        score: u32,
        /// Final level.
        level: u32,
        /// Total outcomes recorded.
        problems_attempted: u32,
        /// Correct outcomes recorded.
        problems_correct: u32,
        /// `problems_correct / problems_attempted`, in percent.
        accuracy_pct: u32,
        /// Wall-clock session length in milliseconds.
        duration_ms: i64,
        /// Whether a new high score was set.
        is_new_high_score: bool,
    },
    /// The final score beat the stored high score.
    NewHighScore {
        /// The new record.
        score: u32,
        /// The record it replaced.
        previous: u32,
        /// `score − previous`.
        improvement: u32,
    },
    /// The difficulty phase advanced.
    PhaseAdvanced {
        /// The phase now in effect.
        phase: Phase,
        /// Correct answers so far this session.
        total_correct: u32,
    },
    /// The level climbed.
    LevelUp {
        /// The level now in effect.
        level: u32,
        /// Score at the moment of the climb.
        score: u32,
    },
}

/// Receives session events, fire-and-forget.
pub trait TelemetrySink: Send + Sync {
    /// Record one event. Must not fail; must not block the frame loop.
    fn record(&self, event: &SessionEvent);
}

/// Sink that logs events through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn record(&self, event: &SessionEvent) {
        match event {
            SessionEvent::GameStart {
                profile_name,
                tables,
            } => {
                info!(target: "blaster::telemetry", profile = %profile_name, ?tables, "game_start");
            }
            SessionEvent::GameEnd {
                score,
                level,
                problems_attempted,
                problems_correct,
                accuracy_pct,
                duration_ms,
                is_new_high_score,
            } => {
                info!(
                    target: "blaster::telemetry",
                    score,
                    level,
                    problems_attempted,
                    problems_correct,
                    accuracy_pct,
                    duration_ms,
                    is_new_high_score,
                    "game_end"
                );
            }
            SessionEvent::NewHighScore {
                score,
                previous,
                improvement,
            } => {
                info!(target: "blaster::telemetry", score, previous, improvement, "new_high_score");
            }
            SessionEvent::PhaseAdvanced {
                phase,
                total_correct,
            } => {
                info!(
                    target: "blaster::telemetry",
                    phase = phase.number(),
                    total_correct,
                    "phase_advanced"
                );
            }
            SessionEvent::LevelUp { level, score } => {
                info!(target: "blaster::telemetry", level, score, "level_up");
            }
        }
    }
}

/// Sink that discards everything (telemetry disabled).
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn record(&self, _event: &SessionEvent) {}
}

/// The sink matching the configuration: tracing when enabled, null otherwise.
#[must_use]
pub fn sink_for(config: &TelemetryConfig) -> Box<dyn TelemetrySink> {
    if config.enabled {
        Box::new(TracingSink)
    } else {
        Box::new(NullSink)
    }
}
