//! Rolling-window performance monitoring and speed control.
//!
//! The monitor keeps the last ten answer outcomes and distils them into a
//! target speed multiplier; the live multiplier chases the target with
//! exponential smoothing so pace changes are ramps, not jumps. Phases 1–3
//! ignore the multiplier entirely and run at the steady pace; phase 4 hands
//! the reins to it.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::PacingConfig;
use crate::phases::Phase;

/// How many recent results the rolling window retains.
pub const WINDOW_CAPACITY: usize = 10;

/// Minimum samples before the window is trusted over the 1.0 baseline.
const MIN_SAMPLES: usize = 5;

/// Fraction of the target-to-current gap closed per frame.
const SMOOTHING: f64 = 0.05;

/// Bounds on the live multiplier.
const MULTIPLIER_MIN: f64 = 0.5;
const MULTIPLIER_MAX: f64 = 2.0;

/// One answer outcome in the rolling window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnswerSample {
    /// Whether the answer was correct.
    pub correct: bool,
    /// Response latency in milliseconds (time-alive for floor misses).
    pub response_time_ms: f64,
    /// When the outcome was recorded.
    pub timestamp: DateTime<Utc>,
}

/// Rolling performance window plus the smoothed speed multiplier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// Most recent outcomes, oldest first, at most [`WINDOW_CAPACITY`].
    pub recent_results: VecDeque<AnswerSample>,
    /// Live multiplier, smoothed and clamped to [0.5, 2.0].
    pub current_speed_multiplier: f64,
    /// Where the live multiplier is heading.
    pub target_speed_multiplier: f64,
}

impl PerformanceMetrics {
    /// Start a session at the neutral 1.0 multiplier with an empty window.
    #[must_use]
    pub fn new() -> Self {
        Self {
            recent_results: VecDeque::with_capacity(WINDOW_CAPACITY),
            current_speed_multiplier: 1.0,
            target_speed_multiplier: 1.0,
        }
    }

    /// Record an answer outcome, evicting the oldest result past capacity,
    /// and recompute the target multiplier.
    pub fn add_result(&mut self, correct: bool, response_time_ms: f64, now: DateTime<Utc>) {
        self.recent_results.push_back(AnswerSample {
            correct,
            response_time_ms,
            timestamp: now,
        });
        while self.recent_results.len() > WINDOW_CAPACITY {
            self.recent_results.pop_front();
        }
        self.target_speed_multiplier = target_multiplier(&self.recent_results);
    }

    /// One smoothing step toward the target. Called once per frame,
    /// independently of whether a new result arrived.
    pub fn update_speed_multiplier(&mut self) {
        let diff = self.target_speed_multiplier - self.current_speed_multiplier;
        self.current_speed_multiplier =
            (self.current_speed_multiplier + diff * SMOOTHING).clamp(MULTIPLIER_MIN, MULTIPLIER_MAX);
    }
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Compute the target multiplier from the rolling window.
///
/// Score = 0.6·accuracy + 0.4·(1 − min(avg_ms / 10 000, 1)), then mapped
/// through fixed bands. Fewer than [`MIN_SAMPLES`] samples is not enough
/// evidence, so the baseline 1.0 comes back.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn target_multiplier(results: &VecDeque<AnswerSample>) -> f64 {
    if results.len() < MIN_SAMPLES {
        return 1.0;
    }

    let n = results.len() as f64;
    let correct = results.iter().filter(|r| r.correct).count() as f64;
    let accuracy = correct / n;

    let avg_time = results.iter().map(|r| r.response_time_ms).sum::<f64>() / n;
    let normalized_time = (avg_time / 10_000.0).min(1.0);

    let score = accuracy * 0.6 + (1.0 - normalized_time) * 0.4;

    if score >= 0.85 {
        1.5
    } else if score >= 0.70 {
        1.25
    } else if score >= 0.55 {
        1.0
    } else {
        0.8
    }
}

/// Fall speed and spawn interval for the driver's spawn scheduler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhasePacing {
    /// Base fall speed handed to the rendering/driver layer.
    pub fall_speed: f64,
    /// Gap between spawns.
    pub spawn_interval: Duration,
}

/// Pace for the given phase: steady through phase 3, multiplier-scaled in
/// phase 4 (faster learner → faster fall, shorter spawn gap).
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn phase_based_speed(
    phase: Phase,
    metrics: &PerformanceMetrics,
    config: &PacingConfig,
) -> PhasePacing {
    if phase != Phase::Mastery {
        return PhasePacing {
            fall_speed: config.steady_fall_speed,
            spawn_interval: Duration::from_millis(config.steady_spawn_interval_ms),
        };
    }

    let multiplier = metrics.current_speed_multiplier;
    #[allow(clippy::cast_precision_loss)]
    let interval_ms = (config.steady_spawn_interval_ms as f64 / multiplier).round() as u64;
    PhasePacing {
        fall_speed: config.steady_fall_speed * multiplier,
        spawn_interval: Duration::from_millis(interval_ms),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_results(metrics: &mut PerformanceMetrics, outcomes: &[(bool, f64)]) {
        let now = Utc::now();
        for &(correct, ms) in outcomes {
            metrics.add_result(correct, ms, now);
        }
    }

    #[test]
    fn window_evicts_oldest_past_capacity() {
        let mut metrics = PerformanceMetrics::new();
        let now = Utc::now();
        for i in 0..15 {
            metrics.add_result(true, f64::from(i) * 100.0, now);
        }
        assert_eq!(metrics.recent_results.len(), WINDOW_CAPACITY);
        // Oldest five evicted: the window starts at the 6th result.
        assert!((metrics.recent_results[0].response_time_ms - 500.0).abs() < f64::EPSILON);
    }

    #[test]
    fn sparse_window_stays_at_baseline() {
        let mut metrics = PerformanceMetrics::new();
        push_results(&mut metrics, &[(true, 1000.0); 4]);
        assert!((metrics.target_speed_multiplier - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn fast_accurate_play_targets_top_speed() {
        let mut metrics = PerformanceMetrics::new();
        push_results(&mut metrics, &[(true, 1500.0); 10]);
        // accuracy 1.0, normalized time 0.15 → score 0.94
        assert!((metrics.target_speed_multiplier - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn struggling_play_targets_slowdown() {
        let mut metrics = PerformanceMetrics::new();
        push_results(&mut metrics, &[
            (false, 9000.0),
            (false, 9000.0),
            (false, 8000.0),
            (true, 9500.0),
            (false, 9000.0),
        ]);
        assert!((metrics.target_speed_multiplier - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn multiplier_ramps_smoothly_and_stays_clamped() {
        let mut metrics = PerformanceMetrics::new();
        push_results(&mut metrics, &[(true, 1000.0); 10]);
        assert!((metrics.target_speed_multiplier - 1.5).abs() < f64::EPSILON);

        metrics.update_speed_multiplier();
        // One frame closes 5% of the 0.5 gap.
        assert!((metrics.current_speed_multiplier - 1.025).abs() < 1e-9);

        for _ in 0..10_000 {
            metrics.update_speed_multiplier();
        }
        assert!(metrics.current_speed_multiplier <= MULTIPLIER_MAX);
        assert!((metrics.current_speed_multiplier - 1.5).abs() < 1e-6);
    }

    #[test]
    fn steady_phases_ignore_the_multiplier() {
        let config = PacingConfig::default();
        let mut metrics = PerformanceMetrics::new();
        metrics.current_speed_multiplier = 1.8;

        for phase in [Phase::Foundation, Phase::GradualChallenge, Phase::FullPractice] {
            let pacing = phase_based_speed(phase, &metrics, &config);
            assert!((pacing.fall_speed - 0.15).abs() < f64::EPSILON);
            assert_eq!(pacing.spawn_interval, Duration::from_millis(2500));
        }
    }

    #[test]
    fn mastery_scales_both_axes() {
        let config = PacingConfig::default();
        let mut metrics = PerformanceMetrics::new();
        metrics.current_speed_multiplier = 1.25;

        let pacing = phase_based_speed(Phase::Mastery, &metrics, &config);
        assert!((pacing.fall_speed - 0.1875).abs() < 1e-9);
        assert_eq!(pacing.spawn_interval, Duration::from_millis(2000));
    }
}
