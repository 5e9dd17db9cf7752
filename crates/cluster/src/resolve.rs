// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unit-name to network-address resolution.

use pio_core::Config;

/// Resolve a unit name to the host the dispatcher should call.
///
/// `[cluster.addresses]` entries override; otherwise mDNS-style
/// `<unit>.local`. An override may carry an explicit `host:port`, which
/// also overrides the API port.
pub fn resolve_to_address(config: &Config, unit: &str) -> String {
    config.get("cluster.addresses", unit).unwrap_or_else(|| format!("{unit}.local"))
}

/// Base URL for a unit's API.
pub fn unit_base_url(config: &Config, unit: &str) -> String {
    let address = resolve_to_address(config, unit);
    if address.contains(':') {
        format!("http://{address}")
    } else {
        format!("http://{address}:{}", pio_core::whoami::api_port(config))
    }
}
