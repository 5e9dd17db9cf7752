// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job lifecycle state machine.
//!
//! States follow the Homie-inspired convention: a job starts in `init`,
//! moves to `ready`, may pause in `sleeping`, and ends in `disconnected`.
//! `lost` is special: it is only ever written to the broker by the broker
//! itself, via the job's last-will, when the job dies without cleaning up.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Init,
    Ready,
    Sleeping,
    Disconnected,
    Lost,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Init => "init",
            JobState::Ready => "ready",
            JobState::Sleeping => "sleeping",
            JobState::Disconnected => "disconnected",
            JobState::Lost => "lost",
        }
    }

    /// Whether the transition `self -> to` is a legal edge.
    ///
    /// Legal edges: init→ready, ready⇄sleeping,
    /// {init,ready,sleeping}→disconnected,
    /// {init,ready,sleeping,disconnected}→lost.
    pub fn can_transition_to(self, to: JobState) -> bool {
        use JobState::*;
        match (self, to) {
            (Init, Ready) => true,
            (Ready, Sleeping) | (Sleeping, Ready) => true,
            (Init | Ready | Sleeping, Disconnected) => true,
            (Init | Ready | Sleeping | Disconnected, Lost) => true,
            _ => false,
        }
    }

    /// States a job considers "active" for divergence checks.
    pub fn is_alive(self) -> bool {
        matches!(self, JobState::Init | JobState::Ready | JobState::Sleeping)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unrecognized state string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown job state: {0:?}")]
pub struct UnknownState(pub String);

impl FromStr for JobState {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "init" => Ok(JobState::Init),
            "ready" => Ok(JobState::Ready),
            "sleeping" => Ok(JobState::Sleeping),
            "disconnected" => Ok(JobState::Disconnected),
            "lost" => Ok(JobState::Lost),
            other => Err(UnknownState(other.to_string())),
        }
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
