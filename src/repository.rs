//! SQLite storage for credentials, tasks and drive file view counters.
//!
//! Rows keep their record as JSON. Everything read back goes through the
//! same validation as data coming from the Drive API.

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use tracing::debug;

use crate::error::{DriveError, Result};
use crate::models::{Credential, DriveFileRecord, FileStats, Task};
use crate::validation::{parse_credential, parse_drive_file, parse_file_stats, parse_task};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS credentials (
    user_id TEXT PRIMARY KEY,
    payload TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS tasks (
    id TEXT PRIMARY KEY,
    active INTEGER NOT NULL,
    updated_at TEXT NOT NULL,
    payload TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS drive_files (
    id TEXT PRIMARY KEY,
    user_id TEXT,
    views INTEGER NOT NULL,
    first_seen TEXT NOT NULL,
    last_seen TEXT NOT NULL,
    payload TEXT NOT NULL
);
";

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Typed access to the application database.
pub struct Repository {
    conn: Connection,
}

impl Repository {
    /// Open (and create if needed) the database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        debug!(path = %path.as_ref().display(), "opened database");
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn save_credential(&self, credential: &Credential) -> Result<()> {
        let payload = serde_json::to_string(credential)?;
        self.conn.execute(
            "INSERT INTO credentials (user_id, payload) VALUES (?1, ?2)
             ON CONFLICT(user_id) DO UPDATE SET payload = excluded.payload",
            params![credential.user_id, payload],
        )?;
        Ok(())
    }

    pub fn credential(&self, user_id: &str) -> Result<Option<Credential>> {
        let payload: Option<String> = self
            .conn
            .query_row(
                "SELECT payload FROM credentials WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;

        match payload {
            Some(payload) => {
                let value: Value = serde_json::from_str(&payload)?;
                Ok(Some(parse_credential(&value)?))
            }
            None => Ok(None),
        }
    }

    /// Insert or overwrite a task.
    pub fn save_task(&self, task: &Task) -> Result<()> {
        let payload = serde_json::to_string(task)?;
        self.conn.execute(
            "INSERT INTO tasks (id, active, updated_at, payload) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                active = excluded.active,
                updated_at = excluded.updated_at,
                payload = excluded.payload",
            params![task.id, task.active, timestamp(Utc::now()), payload],
        )?;
        Ok(())
    }

    /// All stored tasks, oldest first.
    pub fn tasks(&self) -> Result<Vec<Task>> {
        let mut stmt = self
            .conn
            .prepare("SELECT payload FROM tasks ORDER BY rowid")?;
        let payloads = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        payloads
            .iter()
            .map(|payload| {
                let value: Value = serde_json::from_str(payload)?;
                parse_task(&value).map_err(DriveError::from)
            })
            .collect()
    }

    /// Remember that `record` was shown to `user_id` at `at`.
    ///
    /// The first sighting inserts the row with one view and keeps `user_id`
    /// as the owner; later ones bump the counter, widen the
    /// `first_seen`..`last_seen` window and refresh the stored record.
    pub fn record_view(
        &self,
        record: &DriveFileRecord,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let payload = serde_json::to_string(record)?;
        let at = timestamp(at);
        self.conn.execute(
            "INSERT INTO drive_files (id, user_id, views, first_seen, last_seen, payload)
             VALUES (?1, ?2, 1, ?3, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                user_id = COALESCE(user_id, excluded.user_id),
                views = views + 1,
                first_seen = MIN(first_seen, excluded.first_seen),
                last_seen = MAX(last_seen, excluded.last_seen),
                payload = excluded.payload",
            params![record.id, user_id, at, payload],
        )?;
        Ok(())
    }

    /// Cached copy of a file, with its view counters filled in.
    pub fn cached_file(&self, file_id: &str) -> Result<Option<DriveFileRecord>> {
        let row = self
            .conn
            .query_row(
                "SELECT user_id, views, first_seen, last_seen, payload
                 FROM drive_files WHERE id = ?1",
                params![file_id],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((user_id, views, first_seen, last_seen, payload)) = row else {
            return Ok(None);
        };

        let mut value: Value = serde_json::from_str(&payload)?;
        if let Value::Object(obj) = &mut value {
            obj.insert("userId".to_string(), user_id.into());
            obj.insert("views".to_string(), views.into());
            obj.insert("firstSeen".to_string(), first_seen.into());
            obj.insert("lastSeen".to_string(), last_seen.into());
        }
        Ok(Some(parse_drive_file(&value)?))
    }

    pub fn file_stats(&self, file_id: &str) -> Result<Option<FileStats>> {
        let row = self
            .conn
            .query_row(
                "SELECT views, first_seen, last_seen FROM drive_files WHERE id = ?1",
                params![file_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((views, first_seen, last_seen)) => {
                let value = serde_json::json!({
                    "fileId": file_id,
                    "views": views,
                    "firstSeen": first_seen,
                    "lastSeen": last_seen,
                });
                Ok(Some(parse_file_stats(&value)?))
            }
            None => Ok(None),
        }
    }
}
