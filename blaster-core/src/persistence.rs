//! SQLite persistence for profiles, mastery records, and session history.
//!
//! The schema is typed columns rather than serialized blobs, because the
//! stats store is queried per-profile and upserted row-by-row:
//!
//! ```sql
//! CREATE TABLE profiles      (id TEXT PRIMARY KEY, name, created_at, high_score);
//! CREATE TABLE problem_stats (profile_id REFERENCES profiles ON DELETE CASCADE,
//!                             problem_key, ...sm2 fields...,
//!                             PRIMARY KEY (profile_id, problem_key));
//! CREATE TABLE sessions      (profile_id REFERENCES profiles ON DELETE CASCADE,
//!                             timestamp, ...aggregates..., trouble_spots,
//!                             PRIMARY KEY (profile_id, timestamp));
//! ```
//!
//! - WAL mode for concurrent reads while a session is live.
//! - Foreign keys ON, so deleting a profile cascades to its stats and
//!   sessions in one statement.
//! - `put_stats_batch` is a single transaction; the caller sees all-or-nothing.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::PersistenceConfig;
use crate::error::{BlasterError, Result};
use crate::sm2::ProblemStats;
use crate::types::{Profile, ProfileId, ProblemKey, SessionResult};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS profiles (
        id         TEXT PRIMARY KEY,
        name       TEXT NOT NULL,
        created_at TEXT NOT NULL,
        high_score INTEGER NOT NULL DEFAULT 0
    );
    CREATE TABLE IF NOT EXISTS problem_stats (
        profile_id           TEXT NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
        problem_key          TEXT NOT NULL,
        easiness             REAL NOT NULL,
        interval_days        INTEGER NOT NULL,
        repetitions          INTEGER NOT NULL,
        next_review          TEXT NOT NULL,
        total_attempts       INTEGER NOT NULL,
        total_correct        INTEGER NOT NULL,
        avg_response_time_ms REAL NOT NULL,
        last_seen            TEXT,
        PRIMARY KEY (profile_id, problem_key)
    );
    CREATE TABLE IF NOT EXISTS sessions (
        profile_id         TEXT NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
        timestamp          TEXT NOT NULL,
        score              INTEGER NOT NULL,
        level              INTEGER NOT NULL,
        problems_attempted INTEGER NOT NULL,
        problems_correct   INTEGER NOT NULL,
        trouble_spots      TEXT NOT NULL,
        PRIMARY KEY (profile_id, timestamp)
    );
";

/// Handle to the open progress database.
///
/// # Usage
///
/// ```no_run
/// # use blaster_core::persistence::ProgressDb;
/// # use blaster_core::config::PersistenceConfig;
/// # use chrono::Utc;
/// let db = ProgressDb::open("blaster.db", &PersistenceConfig::default())?;
/// let profile = db.create_profile("Ada", Utc::now())?;
/// let stats = db.stats_for_profile(profile.id)?;
/// assert!(stats.is_empty());
/// # Ok::<(), blaster_core::error::BlasterError>(())
/// ```
pub struct ProgressDb {
    conn: Connection,
    db_path: PathBuf,
}

impl std::fmt::Debug for ProgressDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressDb")
            .field("db_path", &self.db_path)
            .finish_non_exhaustive()
    }
}

impl ProgressDb {
    /// Open (or create) the database at `path`, applying the schema and the
    /// configured pragmas.
    ///
    /// # Errors
    ///
    /// Returns [`BlasterError::Database`] on SQLite failures.
    pub fn open<P: AsRef<Path>>(path: P, config: &PersistenceConfig) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = Connection::open_with_flags(&db_path, flags)?;

        if config.wal_mode {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(&format!("PRAGMA busy_timeout = {};", config.busy_timeout_ms))?;

        conn.execute_batch(SCHEMA)?;

        info!(
            path = %db_path.display(),
            wal = config.wal_mode,
            "Progress database opened"
        );

        Ok(Self { conn, db_path })
    }

    /// Open an in-memory database (useful for tests).
    ///
    /// # Errors
    ///
    /// Returns [`BlasterError::Database`] on SQLite failures.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn,
            db_path: PathBuf::from(":memory:"),
        })
    }

    // ------------------------------------------------------------------
    // Profiles
    // ------------------------------------------------------------------

    /// Create a profile with a fresh id and a zero high score.
    ///
    /// # Errors
    ///
    /// Returns [`BlasterError::Database`] on SQLite failures.
    pub fn create_profile(&self, name: &str, now: DateTime<Utc>) -> Result<Profile> {
        let profile = Profile::new(name, now);
        self.conn.execute(
            "INSERT INTO profiles (id, name, created_at, high_score) VALUES (?1, ?2, ?3, ?4)",
            params![
                profile.id.0.to_string(),
                profile.name,
                profile.created_at.to_rfc3339(),
                profile.high_score,
            ],
        )?;
        info!(profile = %profile.id, name = %profile.name, "Profile created");
        Ok(profile)
    }

    /// Fetch a profile by id, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`BlasterError::Database`] on SQLite failures, or
    /// [`BlasterError::Serialization`] if a stored row is malformed.
    pub fn profile(&self, id: ProfileId) -> Result<Option<Profile>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, name, created_at, high_score FROM profiles WHERE id = ?1",
        )?;
        let row: Option<(String, String, String, u32)> = stmt
            .query_row(params![id.0.to_string()], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })
            .optional()?;
        row.map(profile_from_row).transpose()
    }

    /// All profiles, in creation order.
    ///
    /// # Errors
    ///
    /// Returns [`BlasterError::Database`] on SQLite failures, or
    /// [`BlasterError::Serialization`] if a stored row is malformed.
    pub fn all_profiles(&self) -> Result<Vec<Profile>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, name, created_at, high_score FROM profiles ORDER BY created_at",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        })?;
        let mut profiles = Vec::new();
        for row in rows {
            profiles.push(profile_from_row(row?)?);
        }
        Ok(profiles)
    }

    /// Update an existing profile (name, high score).
    ///
    /// # Errors
    ///
    /// Returns [`BlasterError::ProfileNotFound`] if no row matches, or
    /// [`BlasterError::Database`] on SQLite failures.
    pub fn update_profile(&self, profile: &Profile) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE profiles SET name = ?2, high_score = ?3 WHERE id = ?1",
            params![
                profile.id.0.to_string(),
                profile.name,
                profile.high_score,
            ],
        )?;
        if changed == 0 {
            return Err(BlasterError::ProfileNotFound(profile.id));
        }
        Ok(())
    }

    /// Delete a profile; its stats and sessions cascade away with it.
    ///
    /// # Errors
    ///
    /// Returns [`BlasterError::Database`] on SQLite failures.
    pub fn delete_profile(&self, id: ProfileId) -> Result<()> {
        let changed = self
            .conn
            .execute("DELETE FROM profiles WHERE id = ?1", params![id.0.to_string()])?;
        debug!(profile = %id, deleted = changed > 0, "Profile delete");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Problem stats
    // ------------------------------------------------------------------

    /// All mastery records for a profile.
    ///
    /// # Errors
    ///
    /// Returns [`BlasterError::Database`] on SQLite failures, or
    /// [`BlasterError::Serialization`] if a stored row is malformed.
    pub fn stats_for_profile(&self, id: ProfileId) -> Result<Vec<ProblemStats>> {
        let start = Instant::now();
        let mut stmt = self.conn.prepare_cached(
            "SELECT profile_id, problem_key, easiness, interval_days, repetitions,
                    next_review, total_attempts, total_correct, avg_response_time_ms, last_seen
             FROM problem_stats WHERE profile_id = ?1",
        )?;
        let rows = stmt.query_map(params![id.0.to_string()], |row| {
            Ok(StatsRow {
                profile_id: row.get(0)?,
                problem_key: row.get(1)?,
                easiness: row.get(2)?,
                interval_days: row.get(3)?,
                repetitions: row.get(4)?,
                next_review: row.get(5)?,
                total_attempts: row.get(6)?,
                total_correct: row.get(7)?,
                avg_response_time_ms: row.get(8)?,
                last_seen: row.get(9)?,
            })
        })?;

        let mut stats = Vec::new();
        for row in rows {
            stats.push(row?.into_stats()?);
        }

        debug!(
            profile = %id,
            records = stats.len(),
            elapsed_us = start.elapsed().as_micros(),
            "Loaded problem stats"
        );
        Ok(stats)
    }

    /// Upsert a batch of mastery records in one transaction, in order.
    ///
    /// Callers rely on in-order application: when a batch carries two
    /// records for the same key, the later one wins.
    ///
    /// # Errors
    ///
    /// Returns [`BlasterError::Database`] on SQLite failures; nothing is
    /// written unless everything is.
    pub fn put_stats_batch(&mut self, batch: &[ProblemStats]) -> Result<()> {
        let start = Instant::now();
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO problem_stats (profile_id, problem_key, easiness, interval_days,
                        repetitions, next_review, total_attempts, total_correct,
                        avg_response_time_ms, last_seen)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(profile_id, problem_key) DO UPDATE SET
                    easiness = excluded.easiness,
                    interval_days = excluded.interval_days,
                    repetitions = excluded.repetitions,
                    next_review = excluded.next_review,
                    total_attempts = excluded.total_attempts,
                    total_correct = excluded.total_correct,
                    avg_response_time_ms = excluded.avg_response_time_ms,
                    last_seen = excluded.last_seen",
            )?;
            for stats in batch {
                stmt.execute(params![
                    stats.profile_id.0.to_string(),
                    stats.problem_key.to_string(),
                    stats.easiness,
                    stats.interval_days,
                    stats.repetitions,
                    stats.next_review.to_rfc3339(),
                    stats.total_attempts,
                    stats.total_correct,
                    stats.avg_response_time_ms,
                    stats.last_seen.map(|t| t.to_rfc3339()),
                ])?;
            }
        }
        tx.commit()?;

        debug!(
            records = batch.len(),
            elapsed_us = start.elapsed().as_micros(),
            "Saved problem stats batch"
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    /// Append a finished session to the history.
    ///
    /// # Errors
    ///
    /// Returns [`BlasterError::Database`] on SQLite failures, or
    /// [`BlasterError::Serialization`] if the trouble-spot list cannot be
    /// encoded.
    pub fn save_session(&self, result: &SessionResult) -> Result<()> {
        let trouble_spots = serde_json::to_string(&result.trouble_spots)
            .map_err(|e| BlasterError::Serialization(e.to_string()))?;
        self.conn.execute(
            "INSERT OR REPLACE INTO sessions (profile_id, timestamp, score, level,
                    problems_attempted, problems_correct, trouble_spots)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                result.profile_id.0.to_string(),
                result.timestamp.to_rfc3339(),
                result.score,
                result.level,
                result.problems_attempted,
                result.problems_correct,
                trouble_spots,
            ],
        )?;
        Ok(())
    }

    /// The most recent sessions for a profile, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`BlasterError::Database`] on SQLite failures, or
    /// [`BlasterError::Serialization`] if a stored row is malformed.
    pub fn session_history(&self, id: ProfileId, limit: usize) -> Result<Vec<SessionResult>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT profile_id, timestamp, score, level, problems_attempted,
                    problems_correct, trouble_spots
             FROM sessions WHERE profile_id = ?1
             ORDER BY timestamp DESC LIMIT ?2",
        )?;
        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        let rows = stmt.query_map(params![id.0.to_string(), limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, u32>(2)?,
                row.get::<_, u32>(3)?,
                row.get::<_, u32>(4)?,
                row.get::<_, u32>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?;

        let mut sessions = Vec::new();
        for row in rows {
            let (profile_id, timestamp, score, level, attempted, correct, spots) = row?;
            sessions.push(SessionResult {
                profile_id: parse_profile_id(&profile_id)?,
                timestamp: parse_timestamp(&timestamp)?,
                score,
                level,
                problems_attempted: attempted,
                problems_correct: correct,
                trouble_spots: serde_json::from_str(&spots)
                    .map_err(|e| BlasterError::Serialization(e.to_string()))?,
            });
        }
        Ok(sessions)
    }
}

// ---------------------------------------------------------------------------
// Row conversion
// ---------------------------------------------------------------------------

struct StatsRow {
    profile_id: String,
    problem_key: String,
    easiness: f64,
    interval_days: u32,
    repetitions: u32,
    next_review: String,
    total_attempts: u32,
    total_correct: u32,
    avg_response_time_ms: f64,
    last_seen: Option<String>,
}

impl StatsRow {
    fn into_stats(self) -> Result<ProblemStats> {
        Ok(ProblemStats {
            profile_id: parse_profile_id(&self.profile_id)?,
            problem_key: self.problem_key.parse::<ProblemKey>()?,
            easiness: self.easiness,
            interval_days: self.interval_days,
            repetitions: self.repetitions,
            next_review: parse_timestamp(&self.next_review)?,
            total_attempts: self.total_attempts,
            total_correct: self.total_correct,
            avg_response_time_ms: self.avg_response_time_ms,
            last_seen: self.last_seen.as_deref().map(parse_timestamp).transpose()?,
        })
    }
}

fn profile_from_row(row: (String, String, String, u32)) -> Result<Profile> {
    let (id, name, created_at, high_score) = row;
    Ok(Profile {
        id: parse_profile_id(&id)?,
        name,
        created_at: parse_timestamp(&created_at)?,
        high_score,
    })
}

fn parse_profile_id(raw: &str) -> Result<ProfileId> {
    Uuid::parse_str(raw)
        .map(ProfileId)
        .map_err(|e| BlasterError::Serialization(format!("bad profile id {raw:?}: {e}")))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| BlasterError::Serialization(format!("bad timestamp {raw:?}: {e}")))
}
