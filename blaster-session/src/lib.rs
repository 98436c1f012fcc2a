//! # blaster-session — Session Driver for the Blaster Engine
//!
//! This crate owns the runtime shell around `blaster-core`: the frame loop,
//! the self-rescheduling spawn timer, input handling, render snapshots, and
//! telemetry. The core stays pure and synchronous; everything clock-shaped
//! lives here.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │                    Host UI                    │
//! │  ┌─────────────────────────────────────────┐  │
//! │  │            blaster-session              │  │
//! │  │  ┌──────────┐  ┌─────────┐  ┌────────┐  │  │
//! │  │  │  Driver  │  │  Input  │  │ Events │  │  │
//! │  │  └────┬─────┘  └────┬────┘  └───┬────┘  │  │
//! │  │       │             │           │       │  │
//! │  │       ▼             ▼           ▼       │  │
//! │  │  ┌───────────────────────────────────┐  │  │
//! │  │  │           blaster-core            │  │  │
//! │  │  └───────────────────────────────────┘  │  │
//! │  └─────────────────────────────────────────┘  │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `driver` — the per-session state owner and async run loop
//! - `input` — answer buffer and fire parsing (parse failure = no-op)
//! - `events` — telemetry events and the fire-and-forget sink trait
//! - `snapshot` — read-only render/HUD snapshots
//! - `subscriber` — tracing setup for hosts

pub mod driver;
pub mod events;
pub mod input;
pub mod snapshot;
pub mod subscriber;

pub use driver::{SessionDriver, SessionReport};
pub use events::{NullSink, SessionEvent, TelemetrySink, TracingSink};
pub use snapshot::RenderSnapshot;
