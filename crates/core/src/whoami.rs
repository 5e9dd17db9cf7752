// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Node identity helpers.

use crate::config::Config;

/// Default API port for both leader and worker HTTP surfaces.
pub const DEFAULT_API_PORT: u16 = 4999;

/// This node's unit name: `PIO_UNIT` if set, else the hostname.
pub fn get_unit_name() -> String {
    if let Ok(unit) = std::env::var("PIO_UNIT") {
        if !unit.is_empty() {
            return unit;
        }
    }
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}

/// The leader's hostname from config, falling back to this node.
pub fn leader_hostname(config: &Config) -> String {
    config.get("cluster", "leader_hostname").unwrap_or_else(get_unit_name)
}

pub fn am_i_leader(config: &Config) -> bool {
    leader_hostname(config) == get_unit_name()
}

pub fn api_port(config: &Config) -> u16 {
    config
        .getint("cluster", "api_port")
        .and_then(|p| u16::try_from(p).ok())
        .unwrap_or(DEFAULT_API_PORT)
}

/// True under `PIO_TESTING=1`; accelerates timing-sensitive paths.
pub fn is_testing_env() -> bool {
    std::env::var("PIO_TESTING").map(|v| v == "1").unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leader_defaults_to_self_without_config() {
        let config = Config::empty();
        assert_eq!(leader_hostname(&config), get_unit_name());
        assert!(am_i_leader(&config));
    }

    #[test]
    fn api_port_reads_config() {
        let config = Config::parse("[cluster]\napi_port = 5000\n").unwrap();
        assert_eq!(api_port(&config), 5000);
        assert_eq!(api_port(&Config::empty()), DEFAULT_API_PORT);
    }
}
