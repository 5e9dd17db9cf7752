// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Named key-value caches over SQLite.
//!
//! Two stores with identical APIs: the intermittent store lives in a
//! database wiped at reboot, the persistent one survives. Values are
//! stored as text; `get_json`/`set_json` layer serde on top.

use crate::manager::StorageError;
use crate::paths::DataDir;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

fn is_valid_cache_name(name: &str) -> bool {
    !name.is_empty()
        && name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// One named table inside a cache database.
#[derive(Debug)]
pub struct KvStore {
    conn: Mutex<Connection>,
    table: String,
}

impl KvStore {
    pub fn open(db_path: &Path, name: &str) -> Result<Self, StorageError> {
        if !is_valid_cache_name(name) {
            return Err(StorageError::BadCacheName(name.to_string()));
        }
        let table = format!("cache_{name}");
        let conn = Connection::open(db_path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {table} (key TEXT PRIMARY KEY, value TEXT NOT NULL)"
            ),
            [],
        )?;
        Ok(Self { conn: Mutex::new(conn), table })
    }

    pub fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.conn.lock().execute(
            &format!(
                "INSERT INTO {} (key, value) VALUES (?1, ?2)
                 ON CONFLICT (key) DO UPDATE SET value = excluded.value",
                self.table
            ),
            params![key, value],
        )?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let value = self
            .conn
            .lock()
            .query_row(
                &format!("SELECT value FROM {} WHERE key = ?1", self.table),
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let text = serde_json::to_string(value)
            .map_err(|e| StorageError::Io(std::io::Error::other(e)))?;
        self.set(key, &text)
    }

    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        match self.get(key)? {
            None => Ok(None),
            Some(text) => Ok(serde_json::from_str(&text).ok()),
        }
    }

    pub fn contains(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.get(key)?.is_some())
    }

    /// Remove a key, returning its previous value.
    pub fn pop(&self, key: &str) -> Result<Option<String>, StorageError> {
        let previous = self.get(key)?;
        self.conn
            .lock()
            .execute(&format!("DELETE FROM {} WHERE key = ?1", self.table), params![key])?;
        Ok(previous)
    }

    pub fn keys(&self) -> Result<Vec<String>, StorageError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!("SELECT key FROM {} ORDER BY key", self.table))?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        self.conn.lock().execute(&format!("DELETE FROM {}", self.table), [])?;
        Ok(())
    }
}

/// Cache wiped at reboot (lives on tmpfs on real nodes).
pub fn local_intermittent_storage(dir: &DataDir, name: &str) -> Result<KvStore, StorageError> {
    dir.ensure_exists()?;
    KvStore::open(&dir.intermittent_cache_db(), name)
}

/// Cache that survives reboots.
pub fn local_persistent_storage(dir: &DataDir, name: &str) -> Result<KvStore, StorageError> {
    dir.ensure_exists()?;
    KvStore::open(&dir.persistent_cache_db(), name)
}

#[cfg(test)]
#[path = "kv_tests.rs"]
mod tests;
