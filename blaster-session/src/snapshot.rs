//! Read-only render snapshots.
//!
//! The rendering collaborator consumes a [`RenderSnapshot`] per refresh and
//! produces no feedback into the core; everything here is plain data copied
//! out of the game state.

use blaster_core::config::BlasterConfig;
use blaster_core::engine::{GameState, GameStatus};
use blaster_core::phases::PhaseGoal;
use serde::Serialize;

/// A falling problem, as the renderer sees it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProblemView {
    /// First displayed factor.
    pub a: u32,
    /// Second displayed factor.
    pub b: u32,
    /// Horizontal position in base coordinates.
    pub x: f64,
    /// Vertical position in base coordinates.
    pub y: f64,
}

/// An in-flight missile, as the renderer sees it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MissileView {
    /// Horizontal position.
    pub x: f64,
    /// Vertical position.
    pub y: f64,
    /// Heading in radians.
    pub rotation: f64,
}

/// A live explosion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ExplosionView {
    /// Horizontal position.
    pub x: f64,
    /// Vertical position.
    pub y: f64,
    /// Frames since spawn, for animation keyframing.
    pub frame: u32,
}

/// A live wrong-answer effect.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WrongEffectView {
    /// Displayed glyph.
    pub glyph: char,
    /// Horizontal position.
    pub x: f64,
    /// Vertical position.
    pub y: f64,
    /// Spin angle in radians.
    pub rotation: f64,
}

/// Everything a renderer or HUD needs for one refresh.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderSnapshot {
    /// Session lifecycle status.
    pub status: GameStatus,
    /// Current score.
    pub score: u32,
    /// Current level.
    pub level: u32,
    /// Remaining lives.
    pub lives: u32,
    /// 1-based phase number.
    pub phase: u8,
    /// HUD description of the phase.
    pub phase_description: &'static str,
    /// Progress toward the next phase, if not already terminal.
    pub phase_goal: Option<PhaseGoal>,
    /// Smoothed speed multiplier (phase 4 pacing).
    pub speed_multiplier: f64,
    /// Falling problems.
    pub problems: Vec<ProblemView>,
    /// In-flight missiles.
    pub missiles: Vec<MissileView>,
    /// Live explosions.
    pub explosions: Vec<ExplosionView>,
    /// Live wrong-answer effects.
    pub wrong_effects: Vec<WrongEffectView>,
}

impl RenderSnapshot {
    /// Copy the renderable parts out of the game state.
    #[must_use]
    pub fn from_state(state: &GameState, config: &BlasterConfig) -> Self {
        Self {
            status: state.status,
            score: state.score,
            level: state.level,
            lives: state.lives,
            phase: state.phase_progress.current_phase.number(),
            phase_description: state.phase_progress.current_phase.description(),
            phase_goal: state.phase_progress.toward_next(&config.phases),
            speed_multiplier: state.performance.current_speed_multiplier,
            problems: state
                .problems
                .iter()
                .map(|p| ProblemView {
                    a: p.a,
                    b: p.b,
                    x: p.x,
                    y: p.y,
                })
                .collect(),
            missiles: state
                .missiles
                .iter()
                .map(|m| MissileView {
                    x: m.x,
                    y: m.y,
                    rotation: m.rotation,
                })
                .collect(),
            explosions: state
                .explosions
                .iter()
                .map(|e| ExplosionView {
                    x: e.x,
                    y: e.y,
                    frame: e.frame,
                })
                .collect(),
            wrong_effects: state
                .wrong_effects
                .iter()
                .map(|e| WrongEffectView {
                    glyph: e.glyph,
                    x: e.x,
                    y: e.y,
                    rotation: e.rotation,
                })
                .collect(),
        }
    }
}

impl Default for RenderSnapshot {
    fn default() -> Self {
        Self {
            status: GameStatus::Playing,
            score: 0,
            level: 1,
            lives: 0,
            phase: 1,
            phase_description: "",
            phase_goal: None,
            speed_multiplier: 1.0,
            problems: Vec::new(),
            missiles: Vec::new(),
            explosions: Vec::new(),
            wrong_effects: Vec::new(),
        }
    }
}
