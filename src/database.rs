use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::models::{FatigueRecord, Recommendation, SessionRecord};

/// Persistence collaborator for scored sessions.
///
/// Writes are append-only; "most recent" reads order by timestamp and then
/// insertion order.
pub trait FatigueStore {
    /// Append a scored session and the fatigue record derived from it
    fn append_session(
        &self,
        session: &SessionRecord,
        record: &FatigueRecord,
    ) -> Result<(), DatabaseError>;

    /// Most recent fatigue record for the athlete
    fn latest_fatigue(&self, athlete_id: &str) -> Result<Option<FatigueRecord>, DatabaseError>;

    /// Up to `limit` fatigue records for the athlete, newest first
    fn fatigue_history(
        &self,
        athlete_id: &str,
        limit: usize,
    ) -> Result<Vec<FatigueRecord>, DatabaseError>;
}

type RawFatigueRow = (String, String, DateTime<Utc>, i64, i64, bool, String);

/// SQLite-backed store; the connection is serialized behind a mutex so one
/// instance can be shared between request threads
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Create or open a database at the specified path
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, DatabaseError> {
        let conn = Connection::open(db_path)?;
        Self::with_connection(conn)
    }

    /// Private in-memory database
    pub fn in_memory() -> Result<Self, DatabaseError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, DatabaseError> {
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Initialize database schema with tables and indexes
    fn init_schema(conn: &Connection) -> Result<(), DatabaseError> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;

            CREATE TABLE IF NOT EXISTS sessions (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                athlete_id TEXT NOT NULL,
                duration_minutes INTEGER NOT NULL,
                rpe INTEGER NOT NULL,
                session_load INTEGER NOT NULL,
                recorded_at DATETIME NOT NULL
            );

            CREATE TABLE IF NOT EXISTS fatigue_records (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                athlete_id TEXT NOT NULL,
                recorded_at DATETIME NOT NULL,
                session_load INTEGER NOT NULL,
                fatigue_level INTEGER NOT NULL,
                injury_risk_flag BOOLEAN NOT NULL,
                recommendation TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_athlete_time
                ON sessions (athlete_id, recorded_at);
            CREATE INDEX IF NOT EXISTS idx_fatigue_athlete_time
                ON fatigue_records (athlete_id, recorded_at);
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, DatabaseError> {
        self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)
    }

    fn row_to_record(row: &Row) -> rusqlite::Result<RawFatigueRow> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
        ))
    }

    fn decode(raw: RawFatigueRow) -> Result<FatigueRecord, DatabaseError> {
        let (id, athlete_id, recorded_at, session_load, fatigue_level, injury_risk_flag, recommendation) =
            raw;
        Ok(FatigueRecord {
            id: Uuid::parse_str(&id).map_err(|e| DatabaseError::Corrupt(e.to_string()))?,
            athlete_id,
            recorded_at,
            session_load,
            fatigue_level,
            injury_risk_flag,
            recommendation: recommendation
                .parse::<Recommendation>()
                .map_err(DatabaseError::Corrupt)?,
        })
    }

    /// Number of stored sessions for the athlete
    pub fn session_count(&self, athlete_id: &str) -> Result<usize, DatabaseError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sessions WHERE athlete_id = ?1",
            params![athlete_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

const SELECT_FATIGUE: &str = r#"
    SELECT id, athlete_id, recorded_at, session_load, fatigue_level, injury_risk_flag, recommendation
    FROM fatigue_records
    WHERE athlete_id = ?1
    ORDER BY recorded_at DESC, seq DESC
"#;

impl FatigueStore for Database {
    fn append_session(
        &self,
        session: &SessionRecord,
        record: &FatigueRecord,
    ) -> Result<(), DatabaseError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute(
            r#"
            INSERT INTO sessions (id, athlete_id, duration_minutes, rpe, session_load, recorded_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                Uuid::new_v4().to_string(),
                session.athlete_id,
                session.duration_minutes,
                session.rpe,
                record.session_load,
                record.recorded_at,
            ],
        )?;

        tx.execute(
            r#"
            INSERT INTO fatigue_records (
                id, athlete_id, recorded_at, session_load, fatigue_level,
                injury_risk_flag, recommendation
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                record.id.to_string(),
                record.athlete_id,
                record.recorded_at,
                record.session_load,
                record.fatigue_level,
                record.injury_risk_flag,
                record.recommendation.as_str(),
            ],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn latest_fatigue(&self, athlete_id: &str) -> Result<Option<FatigueRecord>, DatabaseError> {
        let conn = self.lock()?;
        let sql = format!("{} LIMIT 1", SELECT_FATIGUE);
        let raw = conn
            .query_row(&sql, params![athlete_id], Self::row_to_record)
            .optional()?;
        raw.map(Self::decode).transpose()
    }

    fn fatigue_history(
        &self,
        athlete_id: &str,
        limit: usize,
    ) -> Result<Vec<FatigueRecord>, DatabaseError> {
        let conn = self.lock()?;
        let sql = format!("{} LIMIT ?2", SELECT_FATIGUE);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![athlete_id, limit as i64], Self::row_to_record)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(Self::decode(row?)?);
        }
        Ok(records)
    }
}
