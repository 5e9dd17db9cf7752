// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Layered node configuration.
//!
//! Search order: the cluster-wide `config.toml`, then the node-local
//! `unit_config.toml` (scalar overrides win), then `PIO_CONFIG_…`
//! environment variables. Sections address nested tables with dots, e.g.
//! `get("cluster.addresses", "worker1")`.

use std::path::Path;
use thiserror::Error;

/// Cluster-wide config file name inside the data dir.
pub const GLOBAL_CONFIG: &str = "config.toml";

/// Node-local override file name inside the data dir.
pub const UNIT_CONFIG: &str = "unit_config.toml";

const ENV_PREFIX: &str = "PIO_CONFIG_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Merged view over the layered configuration files.
#[derive(Debug, Clone, Default)]
pub struct Config {
    root: toml::Table,
}

impl Config {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a single TOML document (tests, and the global layer).
    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        Ok(Self { root: text.parse::<toml::Table>()? })
    }

    /// Load the layered configuration from a data directory.
    ///
    /// Missing files are fine; a present-but-invalid file is an error.
    pub fn load_from_dir(dir: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::empty();
        for name in [GLOBAL_CONFIG, UNIT_CONFIG] {
            let path = dir.join(name);
            if !path.exists() {
                continue;
            }
            let text = std::fs::read_to_string(&path)
                .map_err(|source| ConfigError::Io { path: path.display().to_string(), source })?;
            let layer: toml::Table = text
                .parse()
                .map_err(|source| ConfigError::Parse { path: path.display().to_string(), source })?;
            merge_tables(&mut config.root, &layer);
        }
        config.apply_env_overrides(std::env::vars());
        Ok(config)
    }

    /// Apply `PIO_CONFIG_<SECTION>__<KEY>=value` overrides. Double
    /// underscores separate path segments; segments are lowercased.
    fn apply_env_overrides(&mut self, vars: impl Iterator<Item = (String, String)>) {
        for (key, value) in vars {
            let Some(rest) = key.strip_prefix(ENV_PREFIX) else { continue };
            let segments: Vec<String> =
                rest.split("__").map(|s| s.to_lowercase()).filter(|s| !s.is_empty()).collect();
            let Some((leaf, path)) = segments.split_last() else { continue };
            if path.is_empty() {
                continue;
            }
            self.set(&path.join("."), leaf, toml::Value::String(value));
        }
    }

    fn section(&self, section: &str) -> Option<&toml::Table> {
        let mut table = &self.root;
        for part in section.split('.') {
            table = table.get(part)?.as_table()?;
        }
        Some(table)
    }

    pub fn has_section(&self, section: &str) -> bool {
        self.section(section).is_some()
    }

    fn lookup(&self, section: &str, key: &str) -> Option<&toml::Value> {
        self.section(section)?.get(key)
    }

    pub fn get(&self, section: &str, key: &str) -> Option<String> {
        self.lookup(section, key).map(|v| match v {
            toml::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    pub fn getfloat(&self, section: &str, key: &str) -> Option<f64> {
        match self.lookup(section, key)? {
            toml::Value::Float(f) => Some(*f),
            toml::Value::Integer(i) => Some(*i as f64),
            toml::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn getfloat_or(&self, section: &str, key: &str, fallback: f64) -> f64 {
        self.getfloat(section, key).unwrap_or(fallback)
    }

    pub fn getint(&self, section: &str, key: &str) -> Option<i64> {
        match self.lookup(section, key)? {
            toml::Value::Integer(i) => Some(*i),
            toml::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn getint_or(&self, section: &str, key: &str, fallback: i64) -> i64 {
        self.getint(section, key).unwrap_or(fallback)
    }

    pub fn getbool(&self, section: &str, key: &str) -> Option<bool> {
        match self.lookup(section, key)? {
            toml::Value::Boolean(b) => Some(*b),
            toml::Value::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Some(true),
                "false" | "0" | "no" | "off" => Some(false),
                _ => None,
            },
            toml::Value::Integer(i) => Some(*i != 0),
            _ => None,
        }
    }

    pub fn getbool_or(&self, section: &str, key: &str, fallback: bool) -> bool {
        self.getbool(section, key).unwrap_or(fallback)
    }

    /// All key → string-value pairs in a section (used to enumerate
    /// photodiode channels, address overrides, etc.).
    pub fn section_items(&self, section: &str) -> Vec<(String, String)> {
        let Some(table) = self.section(section) else { return Vec::new() };
        table
            .iter()
            .filter(|(_, v)| !v.is_table())
            .map(|(k, v)| {
                let value = match v {
                    toml::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), value)
            })
            .collect()
    }

    /// Set a value, creating intermediate tables as needed. A scalar
    /// shadowing an intermediate path segment is replaced by a table.
    pub fn set(&mut self, section: &str, key: &str, value: toml::Value) {
        let mut table = &mut self.root;
        for part in section.split('.') {
            let entry = table
                .entry(part.to_string())
                .or_insert_with(|| toml::Value::Table(toml::Table::new()));
            if !entry.is_table() {
                *entry = toml::Value::Table(toml::Table::new());
            }
            table = match entry.as_table_mut() {
                Some(t) => t,
                None => return,
            };
        }
        table.insert(key.to_string(), value);
    }
}

/// Deep merge: nested tables merge recursively, scalars replace.
fn merge_tables(base: &mut toml::Table, layer: &toml::Table) {
    for (key, value) in layer {
        match (base.get_mut(key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
