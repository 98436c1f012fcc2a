//! Runtime metrics and frame-budget instrumentation.
//!
//! The driver increments lightweight counters in the hot path and reads
//! them on demand for dashboards or debugging overlays. The frame-budget
//! monitor tracks how long each simulation step takes against the ~16 ms
//! frame budget, since the update+render step must finish within one frame
//! to avoid visible stutter.
//!
//! Counters are lock-free `AtomicU64`; the timing histogram takes a
//! `parking_lot::Mutex` on the rare read path only.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;

// ---------------------------------------------------------------------------
// Session Counters (lock-free)
// ---------------------------------------------------------------------------

/// Atomic counters for high-frequency gameplay events.
pub struct SessionCounters {
    /// Problems spawned onto the field.
    pub problems_spawned: AtomicU64,
    /// Missiles fired (matching answer found).
    pub missiles_fired: AtomicU64,
    /// Targets destroyed by missiles.
    pub target_hits: AtomicU64,
    /// Targets that reached the floor.
    pub floor_misses: AtomicU64,
    /// Fire attempts with no matching answer on the field.
    pub wrong_answers: AtomicU64,
    /// Phase advancements.
    pub phase_advances: AtomicU64,
    /// Batched stat writes completed.
    pub saves_completed: AtomicU64,
    /// Sessions run to completion.
    pub sessions_completed: AtomicU64,
}

impl SessionCounters {
    /// Create a new set of zeroed counters.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            problems_spawned: AtomicU64::new(0),
            missiles_fired: AtomicU64::new(0),
            target_hits: AtomicU64::new(0),
            floor_misses: AtomicU64::new(0),
            wrong_answers: AtomicU64::new(0),
            phase_advances: AtomicU64::new(0),
            saves_completed: AtomicU64::new(0),
            sessions_completed: AtomicU64::new(0),
        }
    }

    /// Snapshot all counters for export.
    #[must_use]
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            problems_spawned: self.problems_spawned.load(Ordering::Relaxed),
            missiles_fired: self.missiles_fired.load(Ordering::Relaxed),
            target_hits: self.target_hits.load(Ordering::Relaxed),
            floor_misses: self.floor_misses.load(Ordering::Relaxed),
            wrong_answers: self.wrong_answers.load(Ordering::Relaxed),
            phase_advances: self.phase_advances.load(Ordering::Relaxed),
            saves_completed: self.saves_completed.load(Ordering::Relaxed),
            sessions_completed: self.sessions_completed.load(Ordering::Relaxed),
        }
    }
}

impl Default for SessionCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// A snapshot of counter values at a point in time.
#[derive(Debug, Clone, Copy)]
pub struct CounterSnapshot {
    /// Problems spawned onto the field.
    pub problems_spawned: u64,
    /// Missiles fired.
    pub missiles_fired: u64,
    /// Targets destroyed.
    pub target_hits: u64,
    /// Targets that reached the floor.
    pub floor_misses: u64,
    /// Whiffed fire attempts.
    pub wrong_answers: u64,
    /// Phase advancements.
    pub phase_advances: u64,
    /// Batched stat writes completed.
    pub saves_completed: u64,
    /// Sessions run to completion.
    pub sessions_completed: u64,
}

impl CounterSnapshot {
    /// Format as Prometheus-compatible text.
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        format!(
            "# HELP blaster_problems_spawned_total Problems spawned\n\
             # TYPE blaster_problems_spawned_total counter\n\
             blaster_problems_spawned_total {}\n\
             # HELP blaster_missiles_fired_total Missiles fired\n\
             # TYPE blaster_missiles_fired_total counter\n\
             blaster_missiles_fired_total {}\n\
             # HELP blaster_target_hits_total Targets destroyed\n\
             # TYPE blaster_target_hits_total counter\n\
             blaster_target_hits_total {}\n\
             # HELP blaster_floor_misses_total Targets that reached the floor\n\
             # TYPE blaster_floor_misses_total counter\n\
             blaster_floor_misses_total {}\n\
             # HELP blaster_wrong_answers_total Fire attempts with no target\n\
             # TYPE blaster_wrong_answers_total counter\n\
             blaster_wrong_answers_total {}\n\
             # HELP blaster_phase_advances_total Phase advancements\n\
             # TYPE blaster_phase_advances_total counter\n\
             blaster_phase_advances_total {}\n\
             # HELP blaster_saves_completed_total Stat batch writes completed\n\
             # TYPE blaster_saves_completed_total counter\n\
             blaster_saves_completed_total {}\n\
             # HELP blaster_sessions_completed_total Sessions run to completion\n\
             # TYPE blaster_sessions_completed_total counter\n\
             blaster_sessions_completed_total {}\n",
            self.problems_spawned,
            self.missiles_fired,
            self.target_hits,
            self.floor_misses,
            self.wrong_answers,
            self.phase_advances,
            self.saves_completed,
            self.sessions_completed,
        )
    }
}

// ---------------------------------------------------------------------------
// Frame Budget Monitor
// ---------------------------------------------------------------------------

/// Tracks per-frame time spent in the simulation step.
///
/// Usage:
/// ```rust,no_run
/// # use blaster_core::metrics::FrameBudgetMonitor;
/// let monitor = FrameBudgetMonitor::new(16.0); // one 60 Hz frame
/// let _guard = monitor.begin_frame();
/// // ... tick the simulation ...
/// drop(_guard);
/// assert!(monitor.last_frame_ms() < 16.0);
/// ```
pub struct FrameBudgetMonitor {
    /// Maximum allowed milliseconds per simulation step.
    budget_ms: f64,
    /// Timing history (last N frames).
    history: Mutex<FrameHistory>,
}

/// Internal frame timing data.
struct FrameHistory {
    /// Ring buffer of recent frame timings (milliseconds).
    timings: Vec<f64>,
    /// Next write index.
    write_idx: usize,
    /// Number of frames recorded.
    count: u64,
    /// Whether the last frame exceeded the budget.
    last_over_budget: bool,
}

impl FrameBudgetMonitor {
    /// Create a new monitor with the given budget (milliseconds).
    #[must_use]
    pub fn new(budget_ms: f64) -> Self {
        Self {
            budget_ms,
            history: Mutex::new(FrameHistory {
                timings: vec![0.0; 256], // Track last 256 frames
                write_idx: 0,
                count: 0,
                last_over_budget: false,
            }),
        }
    }

    /// Begin timing a frame. Returns a guard that records elapsed time on drop.
    pub fn begin_frame(&self) -> FrameGuard<'_> {
        FrameGuard {
            monitor: self,
            start: Instant::now(),
        }
    }

    /// Record a frame timing manually (milliseconds).
    pub fn record(&self, ms: f64) {
        let mut h = self.history.lock();
        let idx = h.write_idx;
        let len = h.timings.len();
        h.timings[idx] = ms;
        h.write_idx = (idx + 1) % len;
        h.count += 1;
        h.last_over_budget = ms > self.budget_ms;
    }

    /// Get the last frame's timing (milliseconds).
    #[must_use]
    pub fn last_frame_ms(&self) -> f64 {
        let h = self.history.lock();
        if h.count == 0 {
            return 0.0;
        }
        let idx = if h.write_idx == 0 {
            h.timings.len() - 1
        } else {
            h.write_idx - 1
        };
        h.timings[idx]
    }

    /// Whether the last frame exceeded the budget.
    #[must_use]
    pub fn is_over_budget(&self) -> bool {
        self.history.lock().last_over_budget
    }

    /// Get P50, P95, P99 timings from the history buffer (milliseconds).
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn percentiles(&self) -> FramePercentiles {
        let h = self.history.lock();
        let n = (h.count as usize).min(h.timings.len());
        if n == 0 {
            return FramePercentiles {
                p50: 0.0,
                p95: 0.0,
                p99: 0.0,
                max: 0.0,
                over_budget_ratio: 0.0,
            };
        }

        let mut sorted: Vec<f64> = if h.count as usize <= h.timings.len() {
            h.timings[..n].to_vec()
        } else {
            h.timings.clone()
        };
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let p50 = sorted[n / 2];
        let p95 = sorted[(n as f64 * 0.95) as usize];
        let p99 = sorted[(n as f64 * 0.99) as usize];
        let max = sorted[n - 1];
        let over_count = sorted.iter().filter(|&&t| t > self.budget_ms).count();

        FramePercentiles {
            p50,
            p95,
            p99,
            max,
            over_budget_ratio: over_count as f64 / n as f64,
        }
    }

    /// Total number of frames recorded.
    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.history.lock().count
    }

    /// The configured budget in milliseconds.
    #[must_use]
    pub fn budget_ms(&self) -> f64 {
        self.budget_ms
    }
}

/// RAII guard that records elapsed time when dropped.
pub struct FrameGuard<'a> {
    monitor: &'a FrameBudgetMonitor,
    start: Instant,
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let ms = elapsed.as_secs_f64() * 1000.0;
        self.monitor.record(ms);
    }
}

/// Percentile statistics for frame timings.
#[derive(Debug, Clone)]
pub struct FramePercentiles {
    /// 50th percentile (median) in milliseconds.
    pub p50: f64,
    /// 95th percentile in milliseconds.
    pub p95: f64,
    /// 99th percentile in milliseconds.
    pub p99: f64,
    /// Maximum observed timing.
    pub max: f64,
    /// Ratio of frames that exceeded the budget (0.0–1.0).
    pub over_budget_ratio: f64,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_default_zero() {
        let c = SessionCounters::new();
        let snap = c.snapshot();
        assert_eq!(snap.problems_spawned, 0);
        assert_eq!(snap.target_hits, 0);
        assert_eq!(snap.sessions_completed, 0);
    }

    #[test]
    fn counters_increment_and_snapshot() {
        let c = SessionCounters::new();
        c.problems_spawned.fetch_add(12, Ordering::Relaxed);
        c.missiles_fired.fetch_add(9, Ordering::Relaxed);
        c.target_hits.fetch_add(8, Ordering::Relaxed);
        c.floor_misses.fetch_add(3, Ordering::Relaxed);
        c.wrong_answers.fetch_add(1, Ordering::Relaxed);

        let snap = c.snapshot();
        assert_eq!(snap.problems_spawned, 12);
        assert_eq!(snap.missiles_fired, 9);
        assert_eq!(snap.target_hits, 8);
        assert_eq!(snap.floor_misses, 3);
        assert_eq!(snap.wrong_answers, 1);
    }

    #[test]
    fn prometheus_format_valid() {
        let c = SessionCounters::new();
        c.target_hits.fetch_add(42, Ordering::Relaxed);
        let prom = c.snapshot().to_prometheus();
        assert!(prom.contains("blaster_target_hits_total 42"));
        assert!(prom.contains("# TYPE"));
        assert!(prom.contains("# HELP"));
    }

    #[test]
    fn frame_budget_monitor_records() {
        let monitor = FrameBudgetMonitor::new(16.0);
        assert_eq!(monitor.frame_count(), 0);

        monitor.record(2.0);
        monitor.record(4.0);
        monitor.record(6.0);

        assert_eq!(monitor.frame_count(), 3);
        assert!((monitor.last_frame_ms() - 6.0).abs() < 0.001);
        assert!(!monitor.is_over_budget());
    }

    #[test]
    fn frame_budget_detects_over_budget() {
        let monitor = FrameBudgetMonitor::new(16.0);
        monitor.record(20.0);
        assert!(monitor.is_over_budget());
    }

    #[test]
    fn frame_guard_records_timing() {
        let monitor = FrameBudgetMonitor::new(100.0);
        {
            let _guard = monitor.begin_frame();
            let mut _sum = 0u64;
            for i in 0..1000 {
                _sum += i;
            }
        }
        assert_eq!(monitor.frame_count(), 1);
        assert!(monitor.last_frame_ms() < 100.0);
    }

    #[test]
    fn percentiles_with_data() {
        let monitor = FrameBudgetMonitor::new(16.0);
        for i in 0..100 {
            monitor.record(f64::from(i) * 0.1); // 0.0 to 9.9ms
        }

        let pct = monitor.percentiles();
        assert!(pct.p50 > 0.0);
        assert!(pct.p95 >= pct.p50);
        assert!(pct.p99 >= pct.p95);
        assert!((pct.over_budget_ratio - 0.0).abs() < 0.01);
    }
}
