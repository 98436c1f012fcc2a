//! Core type definitions shared across the drill engine.
//!
//! Persisted shapes (`Profile`, `SessionResult`) are serializable; the
//! canonical [`ProblemKey`] serializes as its display form (`"3×7"`) so the
//! same key text appears in the database, logs, and saved session results.

use chrono::{DateTime, Utc};
use ordered_float::OrderedFloat;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identity Types
// ---------------------------------------------------------------------------

/// Unique identifier for a learner profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProfileId(pub Uuid);

impl ProfileId {
    /// Create a new random profile ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ProfileId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a transient game entity (falling problem, missile,
/// cosmetic effect).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityId(pub Uuid);

impl EntityId {
    /// Create a new random entity ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Canonical Problem Key
// ---------------------------------------------------------------------------

/// Order-independent identifier for a multiplication fact.
///
/// The smaller factor always comes first, so `3×7` and `7×3` map to the same
/// mastery record. Display order shown to the learner is a presentation
/// concern (see the selector's 50/50 swap).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProblemKey {
    small: u32,
    large: u32,
}

impl ProblemKey {
    /// Build the canonical key for a factor pair, in either order.
    #[must_use]
    pub fn new(a: u32, b: u32) -> Self {
        if a <= b {
            Self { small: a, large: b }
        } else {
            Self { small: b, large: a }
        }
    }

    /// The factor pair, smaller first.
    #[must_use]
    pub fn factors(self) -> (u32, u32) {
        (self.small, self.large)
    }

    /// The product (the answer the learner must type).
    #[must_use]
    pub fn product(self) -> u32 {
        self.small * self.large
    }

    /// The times tables this fact belongs to (one entry for squares).
    #[must_use]
    pub fn tables(self) -> Vec<u32> {
        if self.small == self.large {
            vec![self.small]
        } else {
            vec![self.small, self.large]
        }
    }

    /// Whether this fact is reachable from any of the selected tables.
    #[must_use]
    pub fn in_tables(self, selected: &[u32]) -> bool {
        self.tables().iter().any(|t| selected.contains(t))
    }
}

impl fmt::Display for ProblemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}×{}", self.small, self.large)
    }
}

impl FromStr for ProblemKey {
    type Err = crate::error::BlasterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (a, b) = s.split_once('×').ok_or_else(|| {
            crate::error::BlasterError::Serialization(format!("malformed problem key: {s:?}"))
        })?;
        let a: u32 = a.trim().parse().map_err(|_| {
            crate::error::BlasterError::Serialization(format!("malformed problem key: {s:?}"))
        })?;
        let b: u32 = b.trim().parse().map_err(|_| {
            crate::error::BlasterError::Serialization(format!("malformed problem key: {s:?}"))
        })?;
        Ok(Self::new(a, b))
    }
}

impl Serialize for ProblemKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ProblemKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Learner Profile
// ---------------------------------------------------------------------------

/// A learner profile, as stored by the profile store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Unique identifier.
    pub id: ProfileId,
    /// Display name chosen by the learner.
    pub name: String,
    /// When the profile was created.
    pub created_at: DateTime<Utc>,
    /// Best session score so far.
    pub high_score: u32,
}

impl Profile {
    /// Create a fresh profile with a zero high score.
    #[must_use]
    pub fn new(name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: ProfileId::new(),
            name: name.into(),
            created_at: now,
            high_score: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Session Result
// ---------------------------------------------------------------------------

/// Aggregate outcome of one finished session, persisted for history views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionResult {
    /// The learner this session belongs to.
    pub profile_id: ProfileId,
    /// When the session ended.
    pub timestamp: DateTime<Utc>,
    /// Final score.
    pub score: u32,
    /// Final level.
    pub level: u32,
    /// Total answer outcomes recorded (correct + incorrect).
    pub problems_attempted: u32,
    /// Total correct outcomes recorded.
    pub problems_correct: u32,
    /// Facts missed at least once this session.
    pub trouble_spots: Vec<ProblemKey>,
}

// ---------------------------------------------------------------------------
// Selection Weight
// ---------------------------------------------------------------------------

/// Weight assigned to a candidate fact during selection.
///
/// Wraps [`OrderedFloat`] so candidate lists can be compared and sorted
/// without `partial_cmp` boilerplate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SelectionWeight(pub OrderedFloat<f64>);

impl SelectionWeight {
    /// Weight that excludes a candidate from the draw entirely.
    pub const ZERO: Self = Self(OrderedFloat(0.0));

    /// Create a selection weight from a raw f64.
    #[must_use]
    pub fn new(weight: f64) -> Self {
        Self(OrderedFloat(weight))
    }

    /// Get the raw weight value.
    #[must_use]
    pub fn value(self) -> f64 {
        self.0.into_inner()
    }

    /// Whether this candidate can be drawn at all.
    #[must_use]
    pub fn is_positive(self) -> bool {
        self.value() > 0.0
    }
}
