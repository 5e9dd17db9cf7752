// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Node data-directory layout.

use std::path::{Path, PathBuf};

/// Where a node keeps its config files, job registry, and caches.
///
/// Resolved from `PIO_DATA_DIR` (tests point this at a tempdir), falling
/// back to `~/.pioreactor`.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn from_env() -> Self {
        if let Ok(dir) = std::env::var("PIO_DATA_DIR") {
            if !dir.is_empty() {
                return Self::new(dir);
            }
        }
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        Self::new(PathBuf::from(home).join(".pioreactor"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ensure_exists(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)
    }

    /// Cluster-wide configuration file.
    pub fn global_config(&self) -> PathBuf {
        self.root.join(pio_core::config::GLOBAL_CONFIG)
    }

    /// Node-local configuration overrides.
    pub fn unit_config(&self) -> PathBuf {
        self.root.join(pio_core::config::UNIT_CONFIG)
    }

    /// The Job Manager database.
    pub fn job_db(&self) -> PathBuf {
        self.root.join("pioreactor.sqlite")
    }

    /// Key-value store wiped at reboot.
    pub fn intermittent_cache_db(&self) -> PathBuf {
        self.root.join("local_intermittent_pioreactor_metadata.sqlite")
    }

    /// Key-value store that survives reboots.
    pub fn persistent_cache_db(&self) -> PathBuf {
        self.root.join("local_persistent_pioreactor_metadata.sqlite")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_under_root() {
        let dir = DataDir::new("/data/pio");
        assert_eq!(dir.job_db(), Path::new("/data/pio/pioreactor.sqlite"));
        assert_eq!(dir.global_config(), Path::new("/data/pio/config.toml"));
        assert_eq!(dir.unit_config(), Path::new("/data/pio/unit_config.toml"));
        assert_ne!(dir.intermittent_cache_db(), dir.persistent_cache_db());
    }
}
