// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The run-command catalog a unit advertises.
//!
//! `GET /api/units/<unit>/capabilities` lets the UI (and the MCP
//! surface) discover which jobs a node can run and which options each
//! accepts, without shelling out to `pio run --help`.

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct CommandOption {
    pub name: &'static str,
    pub datatype: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunCommand {
    pub name: &'static str,
    pub options: &'static [CommandOption],
}

/// Jobs this build knows how to `pio run`.
pub const RUN_COMMANDS: &[RunCommand] = &[
    RunCommand {
        name: "stirring",
        options: &[CommandOption { name: "target_rpm", datatype: "float" }],
    },
    RunCommand {
        name: "growth_rate_calculating",
        options: &[CommandOption { name: "ignore_cache", datatype: "boolean" }],
    },
];

pub fn catalog() -> serde_json::Value {
    serde_json::json!({
        "run_commands": RUN_COMMANDS,
    })
}
