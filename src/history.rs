use chrono::{DateTime, Local};
use rusqlite::{params, Connection, Result};
use std::path::{Path, PathBuf};

use crate::app_dirs::AppDirs;

/// One submitted attempt, as remembered locally. `delivered == false`
/// marks attempts whose network delivery failed; the receipt file keeps
/// the payload for a supervised resubmission.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub assessment_id: String,
    pub title: String,
    pub submitted_at: DateTime<Local>,
    pub answered: u32,
    pub total: u32,
    pub elapsed_seconds: u64,
    pub fullscreen_exits: u32,
    pub delivered: bool,
    pub auto_submitted: bool,
}

/// Database manager for the local attempt log
#[derive(Debug)]
pub struct AttemptDb {
    conn: Connection,
}

impl AttemptDb {
    /// Open the default attempt log, creating the table if needed
    pub fn new() -> Result<Self> {
        let db_path =
            AppDirs::attempt_db_path().unwrap_or_else(|| PathBuf::from("invigil_attempts.db"));
        Self::open(db_path)
    }

    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        if let Some(parent) = db_path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CANTOPEN),
                    Some(format!("Failed to create directory: {}", e)),
                )
            })?;
        }

        let conn = Connection::open(db_path)?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS attempts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                assessment_id TEXT NOT NULL,
                title TEXT NOT NULL,
                submitted_at TEXT NOT NULL,
                answered INTEGER NOT NULL,
                total INTEGER NOT NULL,
                elapsed_seconds INTEGER NOT NULL,
                fullscreen_exits INTEGER NOT NULL,
                delivered BOOLEAN NOT NULL,
                auto_submitted BOOLEAN NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_attempts_submitted_at ON attempts(submitted_at)",
            [],
        )?;

        Ok(AttemptDb { conn })
    }

    /// Record one submitted attempt
    pub fn record_attempt(&self, rec: &AttemptRecord) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO attempts
            (assessment_id, title, submitted_at, answered, total, elapsed_seconds, fullscreen_exits, delivered, auto_submitted)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                rec.assessment_id,
                rec.title,
                rec.submitted_at.to_rfc3339(),
                rec.answered,
                rec.total,
                rec.elapsed_seconds as i64,
                rec.fullscreen_exits,
                rec.delivered,
                rec.auto_submitted,
            ],
        )?;

        Ok(())
    }

    /// Most recent attempts first, at most `limit` rows
    pub fn recent(&self, limit: usize) -> Result<Vec<AttemptRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT assessment_id, title, submitted_at, answered, total, elapsed_seconds, fullscreen_exits, delivered, auto_submitted
            FROM attempts
            ORDER BY submitted_at DESC
            LIMIT ?1
            "#,
        )?;

        let rows = stmt.query_map([limit as i64], |row| {
            let submitted_str: String = row.get(2)?;
            let submitted_at = DateTime::parse_from_rfc3339(&submitted_str)
                .map_err(|_| {
                    rusqlite::Error::InvalidColumnType(
                        2,
                        "submitted_at".to_string(),
                        rusqlite::types::Type::Text,
                    )
                })?
                .with_timezone(&Local);

            Ok(AttemptRecord {
                assessment_id: row.get(0)?,
                title: row.get(1)?,
                submitted_at,
                answered: row.get(3)?,
                total: row.get(4)?,
                elapsed_seconds: row.get::<_, i64>(5)? as u64,
                fullscreen_exits: row.get(6)?,
                delivered: row.get(7)?,
                auto_submitted: row.get(8)?,
            })
        })?;

        let mut attempts = Vec::new();
        for rec in rows {
            attempts.push(rec?);
        }

        Ok(attempts)
    }

    /// Export the whole log as CSV; returns the number of rows written
    pub fn export_csv<P: AsRef<Path>>(
        &self,
        path: P,
    ) -> std::result::Result<usize, Box<dyn std::error::Error>> {
        let attempts = self.recent(usize::MAX >> 1)?;

        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record([
            "assessment_id",
            "title",
            "submitted_at",
            "answered",
            "total",
            "elapsed_seconds",
            "fullscreen_exits",
            "delivered",
            "auto_submitted",
        ])?;

        for rec in &attempts {
            writer.write_record([
                rec.assessment_id.as_str(),
                rec.title.as_str(),
                &rec.submitted_at.to_rfc3339(),
                &rec.answered.to_string(),
                &rec.total.to_string(),
                &rec.elapsed_seconds.to_string(),
                &rec.fullscreen_exits.to_string(),
                &rec.delivered.to_string(),
                &rec.auto_submitted.to_string(),
            ])?;
        }
        writer.flush()?;

        Ok(attempts.len())
    }
}
