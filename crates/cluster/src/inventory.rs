// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Leader-side cluster inventory.
//!
//! The registry behind `$broadcast` resolution and the `/api/workers`
//! surface: which units exist, whether they are active, and which
//! experiment each is assigned to. Lives in the leader's shared SQLite
//! database.

use crate::error::ClusterError;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerEntry {
    pub pioreactor_unit: String,
    pub is_active: bool,
    pub model_name: Option<String>,
    pub model_version: Option<String>,
    pub experiment: Option<String>,
    pub added_at: String,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS cluster_workers (
    pioreactor_unit TEXT PRIMARY KEY,
    is_active INTEGER NOT NULL DEFAULT 1,
    model_name TEXT,
    model_version TEXT,
    experiment TEXT,
    added_at TEXT NOT NULL
);
";

pub struct Inventory {
    conn: Mutex<Connection>,
}

impl Inventory {
    pub fn open(path: &Path) -> Result<Self, ClusterError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_dir(dir: &pio_storage::DataDir) -> Result<Self, ClusterError> {
        dir.ensure_exists().map_err(ClusterError::Io)?;
        Self::open(&dir.job_db())
    }

    /// Add or re-add a worker. Re-adding refreshes the model info and
    /// reactivates the unit.
    pub fn add_worker(
        &self,
        unit: &str,
        model_name: Option<&str>,
        model_version: Option<&str>,
    ) -> Result<(), ClusterError> {
        let now = chrono::Utc::now().to_rfc3339();
        self.conn.lock().execute(
            "INSERT INTO cluster_workers
                 (pioreactor_unit, is_active, model_name, model_version, added_at)
             VALUES (?1, 1, ?2, ?3, ?4)
             ON CONFLICT (pioreactor_unit)
             DO UPDATE SET is_active = 1, model_name = excluded.model_name,
                           model_version = excluded.model_version",
            params![unit, model_name, model_version, now],
        )?;
        Ok(())
    }

    pub fn remove_worker(&self, unit: &str) -> Result<bool, ClusterError> {
        let removed = self
            .conn
            .lock()
            .execute("DELETE FROM cluster_workers WHERE pioreactor_unit = ?1", params![unit])?;
        Ok(removed > 0)
    }

    pub fn set_active(&self, unit: &str, is_active: bool) -> Result<bool, ClusterError> {
        let updated = self.conn.lock().execute(
            "UPDATE cluster_workers SET is_active = ?1 WHERE pioreactor_unit = ?2",
            params![is_active, unit],
        )?;
        Ok(updated > 0)
    }

    /// Assign a worker to an experiment (one experiment per worker).
    pub fn assign_to_experiment(&self, unit: &str, experiment: &str) -> Result<bool, ClusterError> {
        let updated = self.conn.lock().execute(
            "UPDATE cluster_workers SET experiment = ?1 WHERE pioreactor_unit = ?2",
            params![experiment, unit],
        )?;
        Ok(updated > 0)
    }

    pub fn unassign_from_experiment(
        &self,
        unit: &str,
        experiment: &str,
    ) -> Result<bool, ClusterError> {
        let updated = self.conn.lock().execute(
            "UPDATE cluster_workers SET experiment = NULL
             WHERE pioreactor_unit = ?1 AND experiment = ?2",
            params![unit, experiment],
        )?;
        Ok(updated > 0)
    }

    fn query(&self, where_clause: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<WorkerEntry>, ClusterError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT pioreactor_unit, is_active, model_name, model_version, experiment, added_at
             FROM cluster_workers {where_clause} ORDER BY pioreactor_unit"
        ))?;
        let rows = stmt.query_map(params, |row| {
            Ok(WorkerEntry {
                pioreactor_unit: row.get(0)?,
                is_active: row.get(1)?,
                model_name: row.get(2)?,
                model_version: row.get(3)?,
                experiment: row.get(4)?,
                added_at: row.get(5)?,
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    pub fn list_workers(&self) -> Result<Vec<WorkerEntry>, ClusterError> {
        self.query("", &[])
    }

    pub fn get_worker(&self, unit: &str) -> Result<Option<WorkerEntry>, ClusterError> {
        Ok(self.query("WHERE pioreactor_unit = ?1", &[&unit])?.into_iter().next())
    }

    pub fn active_workers(&self) -> Result<Vec<String>, ClusterError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT pioreactor_unit FROM cluster_workers WHERE is_active = 1
             ORDER BY pioreactor_unit",
        )?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    pub fn active_workers_in_experiment(
        &self,
        experiment: &str,
    ) -> Result<Vec<String>, ClusterError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT pioreactor_unit FROM cluster_workers
             WHERE is_active = 1 AND experiment = ?1 ORDER BY pioreactor_unit",
        )?;
        let rows = stmt.query_map(params![experiment], |row| row.get(0))?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    pub fn workers_in_experiment(&self, experiment: &str) -> Result<Vec<WorkerEntry>, ClusterError> {
        self.query("WHERE experiment = ?1", &[&experiment])
    }
}

#[cfg(test)]
#[path = "inventory_tests.rs"]
mod tests;
