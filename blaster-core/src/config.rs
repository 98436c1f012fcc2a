//! Configuration for the blaster engine.
//!
//! Maps directly to `blaster.toml`. Every field has a serde default equal to
//! the shipped tuning, so an empty file (or no file at all) yields the stock
//! game.

use serde::{Deserialize, Serialize};

/// Top-level configuration, loadable from TOML.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BlasterConfig {
    /// Field geometry and arcade tuning.
    #[serde(default)]
    pub game: GameConfig,
    /// Steady-pace and adaptive-pace settings.
    #[serde(default)]
    pub pacing: PacingConfig,
    /// Difficulty phase progression.
    #[serde(default)]
    pub phases: PhaseConfig,
    /// Problem selection weights and windows.
    #[serde(default)]
    pub selection: SelectionConfig,
    /// Session driver cadence.
    #[serde(default)]
    pub driver: DriverConfig,
    /// Persistence / save settings.
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Telemetry event emission.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl BlasterConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `BlasterError::Config` if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> crate::error::Result<Self> {
        toml::from_str(toml_str).map_err(|e| crate::BlasterError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Field geometry and arcade tuning.
///
/// All positions and speeds are expressed in the fixed base coordinate space;
/// the rendering collaborator maps that space onto whatever surface it has.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    /// Width of the base coordinate space.
    #[serde(default = "default_field_width")]
    pub field_width: f64,
    /// Height of the base coordinate space. Problems past this y are misses.
    #[serde(default = "default_field_height")]
    pub field_height: f64,
    /// Lives at session start; the session ends when they run out.
    #[serde(default = "default_3")]
    pub initial_lives: u32,
    /// Points awarded per destroyed target, multiplied by the current level.
    #[serde(default = "default_10")]
    pub points_per_destroy: u32,
    /// Score needed per level; level is `score / points_per_level + 1`.
    #[serde(default = "default_100")]
    pub points_per_level: u32,
    /// Missile speed in base units per frame.
    #[serde(default = "default_missile_speed")]
    pub missile_speed: f64,
    /// Hit-box width for missile/problem collision.
    #[serde(default = "default_hit_width")]
    pub hit_width: f64,
    /// Hit-box height for missile/problem collision.
    #[serde(default = "default_hit_height")]
    pub hit_height: f64,
    /// Fall speed at level 0, in base units per frame.
    #[serde(default = "default_base_fall_speed")]
    pub base_fall_speed: f64,
    /// Additional fall speed per level.
    #[serde(default = "default_fall_speed_per_level")]
    pub fall_speed_per_level: f64,
    /// Level-curve spawn interval at level 0 (milliseconds).
    #[serde(default = "default_2000")]
    pub base_spawn_interval_ms: u64,
    /// Spawn interval reduction per level (milliseconds).
    #[serde(default = "default_150")]
    pub spawn_interval_step_ms: u64,
    /// Spawn interval floor (milliseconds).
    #[serde(default = "default_800")]
    pub min_spawn_interval_ms: u64,
    /// Largest second factor at level 1.
    #[serde(default = "default_5")]
    pub base_max_multiplier: u32,
    /// Hard cap on the second factor as levels climb.
    #[serde(default = "default_12")]
    pub max_multiplier_cap: u32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            field_width: 900.0,
            field_height: 700.0,
            initial_lives: 3,
            points_per_destroy: 10,
            points_per_level: 100,
            missile_speed: 12.0,
            hit_width: 60.0,
            hit_height: 35.0,
            base_fall_speed: 0.3,
            fall_speed_per_level: 0.15,
            base_spawn_interval_ms: 2000,
            spawn_interval_step_ms: 150,
            min_spawn_interval_ms: 800,
            base_max_multiplier: 5,
            max_multiplier_cap: 12,
        }
    }
}

/// Pace applied by the driver's spawn scheduler.
///
/// Phases 1–3 run at the steady values; phase 4 scales them by the smoothed
/// performance multiplier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacingConfig {
    /// Fall speed used while the learner is still ramping up.
    #[serde(default = "default_steady_fall_speed")]
    pub steady_fall_speed: f64,
    /// Spawn interval used while the learner is still ramping up (ms).
    #[serde(default = "default_2500")]
    pub steady_spawn_interval_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            steady_fall_speed: 0.15,
            steady_spawn_interval_ms: 2500,
        }
    }
}

/// Difficulty phase progression.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseConfig {
    /// Correct answers required in a phase before advancing to the next.
    #[serde(default = "default_15")]
    pub correct_per_phase: u32,
}

impl Default for PhaseConfig {
    fn default() -> Self {
        Self {
            correct_per_phase: 15,
        }
    }
}

/// Problem selection weights and short-term windows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Capacity of the no-repeat window (most recently shown facts).
    #[serde(default = "default_5_usize")]
    pub recent_capacity: usize,
    /// Minimum easy-pool size before phase 1 falls back to the full pool.
    #[serde(default = "default_5_usize")]
    pub min_easy_pool: usize,
    /// Extra weight per day a fact is overdue for review.
    #[serde(default = "default_overdue_weight")]
    pub overdue_weight_per_day: f64,
    /// Weight scale for facts with a weak easiness factor.
    #[serde(default = "default_weak_weight")]
    pub weak_easiness_weight: f64,
    /// Multiplier for facts already missed this session.
    #[serde(default = "default_missed_boost")]
    pub missed_boost: f64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            recent_capacity: 5,
            min_easy_pool: 5,
            overdue_weight_per_day: 10.0,
            weak_easiness_weight: 5.0,
            missed_boost: 3.0,
        }
    }
}

/// Session driver cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Simulation frame rate (Hz).
    #[serde(default = "default_60")]
    pub frame_hz: u32,
    /// Render-snapshot publication rate (Hz). Visual coalescing only.
    #[serde(default = "default_10_u32")]
    pub snapshot_hz: u32,
    /// Delay before the second of the two session-opening spawns (ms).
    #[serde(default = "default_300")]
    pub second_spawn_delay_ms: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            frame_hz: 60,
            snapshot_hz: 10,
            second_spawn_delay_ms: 300,
        }
    }
}

/// Persistence / save configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Database file path.
    #[serde(default = "default_db_path")]
    pub path: String,
    /// Use WAL mode for concurrent reads.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
    /// SQLite busy timeout (milliseconds).
    #[serde(default = "default_5000")]
    pub busy_timeout_ms: u32,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            path: "blaster.db".to_string(),
            wal_mode: true,
            busy_timeout_ms: 5000,
        }
    }
}

/// Telemetry event emission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Opt-in only; when false, session events go nowhere.
    #[serde(default)]
    pub enabled: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { enabled: false }
    }
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_db_path() -> String { "blaster.db".to_string() }
fn default_field_width() -> f64 { 900.0 }
fn default_field_height() -> f64 { 700.0 }
fn default_missile_speed() -> f64 { 12.0 }
fn default_hit_width() -> f64 { 60.0 }
fn default_hit_height() -> f64 { 35.0 }
fn default_base_fall_speed() -> f64 { 0.3 }
fn default_fall_speed_per_level() -> f64 { 0.15 }
fn default_steady_fall_speed() -> f64 { 0.15 }
fn default_overdue_weight() -> f64 { 10.0 }
fn default_weak_weight() -> f64 { 5.0 }
fn default_missed_boost() -> f64 { 3.0 }
fn default_3() -> u32 { 3 }
fn default_5() -> u32 { 5 }
fn default_5_usize() -> usize { 5 }
fn default_10() -> u32 { 10 }
fn default_10_u32() -> u32 { 10 }
fn default_12() -> u32 { 12 }
fn default_15() -> u32 { 15 }
fn default_60() -> u32 { 60 }
fn default_100() -> u32 { 100 }
fn default_150() -> u64 { 150 }
fn default_300() -> u64 { 300 }
fn default_800() -> u64 { 800 }
fn default_2000() -> u64 { 2000 }
fn default_2500() -> u64 { 2500 }
fn default_5000() -> u32 { 5000 }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_stock_tuning() {
        let cfg = BlasterConfig::from_toml("").expect("parse");
        assert_eq!(cfg.game.initial_lives, 3);
        assert_eq!(cfg.game.points_per_level, 100);
        assert!((cfg.game.base_fall_speed - 0.3).abs() < f64::EPSILON);
        assert_eq!(cfg.pacing.steady_spawn_interval_ms, 2500);
        assert_eq!(cfg.phases.correct_per_phase, 15);
        assert_eq!(cfg.selection.recent_capacity, 5);
        assert!(!cfg.telemetry.enabled);
    }

    #[test]
    fn partial_toml_overrides_only_named_fields() {
        let cfg = BlasterConfig::from_toml(
            "[game]\ninitial_lives = 5\n\n[pacing]\nsteady_spawn_interval_ms = 1800\n",
        )
        .expect("parse");
        assert_eq!(cfg.game.initial_lives, 5);
        assert_eq!(cfg.game.points_per_destroy, 10);
        assert_eq!(cfg.pacing.steady_spawn_interval_ms, 1800);
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        let err = BlasterConfig::from_toml("game = 7").expect_err("must fail");
        assert!(matches!(err, crate::BlasterError::Config(_)));
    }
}
