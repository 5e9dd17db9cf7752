// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Job Manager: this node's registry of every job run.
//!
//! Rows are history: `set_not_running` stamps `ended_at` and flips
//! `is_running`, it never deletes. The registry is the authority for
//! node-local decisions (duplicate checks, kill targeting); broker state
//! is the authority for cross-node visibility.

use crate::paths::DataDir;
use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::time::{Duration, Instant};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("{job_name} is not running on this node")]
    NoRunningJob { job_name: String },

    #[error("timed out waiting for setting {setting:?} on {job_name}")]
    SettingTimeout { job_name: String, setting: String },

    #[error("job {0} is still running; stop it before removing its record")]
    JobStillRunning(i64),

    #[error("bad cache name {0:?} - must be lowercase alphanumeric with underscores")]
    BadCacheName(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// One row of `pio_job_metadata`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct JobRecord {
    pub job_id: i64,
    pub unit: String,
    pub experiment: String,
    pub job_name: String,
    pub job_source: String,
    pub pid: i32,
    pub leader: String,
    pub is_long_running_job: bool,
    pub is_running: bool,
    pub started_at: String,
    pub ended_at: Option<String>,
}

/// One row of `pio_job_published_settings`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SettingRecord {
    pub job_id: i64,
    pub setting: String,
    /// None means cleared (the row is kept as history).
    pub value: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Row selector for [`JobManager::kill_jobs`].
///
/// Long-running jobs are excluded from wildcard kills; they are only
/// targeted when `job_name` or `job_id` names them explicitly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KillFilter {
    pub all_jobs: bool,
    pub job_name: Option<String>,
    pub experiment: Option<String>,
    pub job_source: Option<String>,
    pub job_id: Option<i64>,
}

impl KillFilter {
    pub fn all_jobs() -> Self {
        Self { all_jobs: true, ..Self::default() }
    }

    pub fn job_name(name: impl Into<String>) -> Self {
        Self { job_name: Some(name.into()), ..Self::default() }
    }

    pub fn experiment(experiment: impl Into<String>) -> Self {
        Self { experiment: Some(experiment.into()), ..Self::default() }
    }

    pub fn job_id(id: i64) -> Self {
        Self { job_id: Some(id), ..Self::default() }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Explicit targeting opts long-running jobs in.
    fn names_explicitly(&self) -> bool {
        self.job_name.is_some() || self.job_id.is_some()
    }
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS pio_job_metadata (
    job_id INTEGER PRIMARY KEY AUTOINCREMENT,
    unit TEXT NOT NULL,
    experiment TEXT NOT NULL,
    job_name TEXT NOT NULL,
    job_source TEXT NOT NULL,
    pid INTEGER NOT NULL,
    leader TEXT NOT NULL,
    is_long_running_job INTEGER NOT NULL DEFAULT 0,
    is_running INTEGER NOT NULL DEFAULT 1,
    started_at TEXT NOT NULL,
    ended_at TEXT
);
CREATE INDEX IF NOT EXISTS ix_pio_job_metadata_running
    ON pio_job_metadata (job_name, is_running);
CREATE TABLE IF NOT EXISTS pio_job_published_settings (
    job_id INTEGER NOT NULL REFERENCES pio_job_metadata (job_id),
    setting TEXT NOT NULL,
    value TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (job_id, setting)
);
";

fn utc_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Single-writer registry over SQLite. Serialize access through the
/// internal lock; cross-process contention is bounded by busy_timeout.
pub struct JobManager {
    conn: Mutex<Connection>,
}

impl JobManager {
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_dir(dir: &DataDir) -> Result<Self, StorageError> {
        dir.ensure_exists()?;
        Self::open(&dir.job_db())
    }

    /// Insert a new running row, returning its monotonically increasing id.
    #[allow(clippy::too_many_arguments)]
    pub fn register_and_set_running(
        &self,
        unit: &str,
        experiment: &str,
        job_name: &str,
        job_source: &str,
        pid: i32,
        leader: &str,
        is_long_running_job: bool,
    ) -> Result<i64, StorageError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO pio_job_metadata
                 (unit, experiment, job_name, job_source, pid, leader,
                  is_long_running_job, is_running, started_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8)",
            params![unit, experiment, job_name, job_source, pid, leader, is_long_running_job, utc_timestamp()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Stamp `ended_at` and flip `is_running`. Idempotent: a second call
    /// leaves the first `ended_at` untouched.
    pub fn set_not_running(&self, job_id: i64) -> Result<(), StorageError> {
        self.conn.lock().execute(
            "UPDATE pio_job_metadata SET is_running = 0, ended_at = ?1
             WHERE job_id = ?2 AND is_running = 1",
            params![utc_timestamp(), job_id],
        )?;
        Ok(())
    }

    pub fn is_job_running(&self, job_name: &str) -> Result<bool, StorageError> {
        Ok(self.get_running_job_id(job_name)?.is_some())
    }

    pub fn get_running_job_id(&self, job_name: &str) -> Result<Option<i64>, StorageError> {
        let conn = self.conn.lock();
        let id = conn
            .query_row(
                "SELECT job_id FROM pio_job_metadata
                 WHERE job_name = ?1 AND is_running = 1
                 ORDER BY job_id DESC LIMIT 1",
                params![job_name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// SIGTERM every live row matching the filter. Returns the number of
    /// signals issued. Stale pids are ignored (the signal is still
    /// counted; the row's owner is responsible for its own clean-up).
    pub fn kill_jobs(&self, filter: &KillFilter) -> Result<usize, StorageError> {
        if filter.is_empty() {
            return Ok(0);
        }
        let mut sql = String::from(
            "SELECT job_id, pid, job_name FROM pio_job_metadata WHERE is_running = 1",
        );
        let mut clauses: Vec<(String, rusqlite::types::Value)> = Vec::new();
        if let Some(job_name) = &filter.job_name {
            clauses.push(("job_name".to_string(), job_name.clone().into()));
        }
        if let Some(experiment) = &filter.experiment {
            clauses.push(("experiment".to_string(), experiment.clone().into()));
        }
        if let Some(job_source) = &filter.job_source {
            clauses.push(("job_source".to_string(), job_source.clone().into()));
        }
        if let Some(job_id) = filter.job_id {
            clauses.push(("job_id".to_string(), job_id.into()));
        }
        if !filter.names_explicitly() {
            sql.push_str(" AND is_long_running_job = 0");
        }
        for (i, (column, _)) in clauses.iter().enumerate() {
            sql.push_str(&format!(" AND {column} = ?{}", i + 1));
        }

        let targets: Vec<(i64, i32, String)> = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare(&sql)?;
            let values: Vec<rusqlite::types::Value> =
                clauses.into_iter().map(|(_, v)| v).collect();
            let rows = stmt.query_map(rusqlite::params_from_iter(values), |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?;
            rows.collect::<Result<_, _>>()?
        };

        let mut count = 0;
        for (job_id, pid, job_name) in targets {
            if pid <= 1 {
                tracing::debug!(job_id, pid, job_name, "refusing to signal reserved pid");
                continue;
            }
            match nix::sys::signal::kill(
                nix::unistd::Pid::from_raw(pid),
                nix::sys::signal::Signal::SIGTERM,
            ) {
                Ok(()) => {}
                Err(e) => {
                    tracing::debug!(job_id, pid, job_name, error = %e, "SIGTERM failed");
                }
            }
            count += 1;
        }
        Ok(count)
    }

    /// Insert or update a setting row. `None` clears the value but keeps
    /// the row; `created_at` is preserved across updates.
    pub fn upsert_setting(
        &self,
        job_id: i64,
        setting: &str,
        value: Option<&str>,
    ) -> Result<(), StorageError> {
        let now = utc_timestamp();
        self.conn.lock().execute(
            "INSERT INTO pio_job_published_settings
                 (job_id, setting, value, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT (job_id, setting)
             DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![job_id, setting, value, now],
        )?;
        Ok(())
    }

    fn setting_of_running_job(
        &self,
        job_name: &str,
        setting: &str,
    ) -> Result<Option<String>, StorageError> {
        let Some(job_id) = self.get_running_job_id(job_name)? else {
            return Err(StorageError::NoRunningJob { job_name: job_name.to_string() });
        };
        let conn = self.conn.lock();
        let value = conn
            .query_row(
                "SELECT value FROM pio_job_published_settings
                 WHERE job_id = ?1 AND setting = ?2 AND value IS NOT NULL",
                params![job_id, setting],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Block up to `timeout` for `setting` to appear on the currently
    /// running instance of `job_name`. Errors immediately if no instance
    /// is running.
    pub fn get_setting_from_running_job(
        &self,
        job_name: &str,
        setting: &str,
        timeout: Duration,
    ) -> Result<String, StorageError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(value) = self.setting_of_running_job(job_name, setting)? {
                return Ok(value);
            }
            if Instant::now() >= deadline {
                return Err(StorageError::SettingTimeout {
                    job_name: job_name.to_string(),
                    setting: setting.to_string(),
                });
            }
            std::thread::sleep(Duration::from_millis(100));
        }
    }

    fn query_jobs(&self, where_clause: &str) -> Result<Vec<JobRecord>, StorageError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT job_id, unit, experiment, job_name, job_source, pid, leader,
                    is_long_running_job, is_running, started_at, ended_at
             FROM pio_job_metadata {where_clause} ORDER BY job_id"
        ))?;
        let rows = stmt.query_map([], |row| {
            Ok(JobRecord {
                job_id: row.get(0)?,
                unit: row.get(1)?,
                experiment: row.get(2)?,
                job_name: row.get(3)?,
                job_source: row.get(4)?,
                pid: row.get(5)?,
                leader: row.get(6)?,
                is_long_running_job: row.get(7)?,
                is_running: row.get(8)?,
                started_at: row.get(9)?,
                ended_at: row.get(10)?,
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    /// Currently running jobs on this node.
    pub fn list_jobs(&self) -> Result<Vec<JobRecord>, StorageError> {
        self.query_jobs("WHERE is_running = 1")
    }

    /// Every job ever run on this node, running or not.
    pub fn list_job_history(&self) -> Result<Vec<JobRecord>, StorageError> {
        self.query_jobs("")
    }

    pub fn get_job_info(&self, job_id: i64) -> Result<Option<JobRecord>, StorageError> {
        let jobs = self.query_jobs(&format!("WHERE job_id = {job_id}"))?;
        Ok(jobs.into_iter().next())
    }

    pub fn list_job_settings(&self, job_id: i64) -> Result<Vec<SettingRecord>, StorageError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT job_id, setting, value, created_at, updated_at
             FROM pio_job_published_settings WHERE job_id = ?1 ORDER BY setting",
        )?;
        let rows = stmt.query_map(params![job_id], |row| {
            Ok(SettingRecord {
                job_id: row.get(0)?,
                setting: row.get(1)?,
                value: row.get(2)?,
                created_at: row.get(3)?,
                updated_at: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    /// Delete one non-running row and its settings.
    pub fn remove_job(&self, job_id: i64) -> Result<bool, StorageError> {
        let conn = self.conn.lock();
        let running: Option<bool> = conn
            .query_row(
                "SELECT is_running FROM pio_job_metadata WHERE job_id = ?1",
                params![job_id],
                |row| row.get(0),
            )
            .optional()?;
        match running {
            None => Ok(false),
            Some(true) => Err(StorageError::JobStillRunning(job_id)),
            Some(false) => {
                conn.execute(
                    "DELETE FROM pio_job_published_settings WHERE job_id = ?1",
                    params![job_id],
                )?;
                conn.execute("DELETE FROM pio_job_metadata WHERE job_id = ?1", params![job_id])?;
                Ok(true)
            }
        }
    }

    /// Delete every non-running row and its settings. Returns rows removed.
    pub fn purge_job_history(&self) -> Result<usize, StorageError> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM pio_job_published_settings WHERE job_id IN
                 (SELECT job_id FROM pio_job_metadata WHERE is_running = 0)",
            [],
        )?;
        let removed =
            conn.execute("DELETE FROM pio_job_metadata WHERE is_running = 0", [])?;
        Ok(removed)
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
