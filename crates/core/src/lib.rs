// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! pio-core: shared types for the Pioreactor runtime
//!
//! Everything the rest of the workspace agrees on lives here: the job state
//! machine, published-setting schemas, the canonical MQTT topic layout,
//! domain structs for optical-density and dosing telemetry, the layered
//! configuration, and the repeating-timer and latch primitives.

pub mod config;
pub mod latch;
pub mod settings;
pub mod state;
pub mod structs;
pub mod timer;
pub mod topics;
pub mod whoami;

pub use config::{Config, ConfigError};
pub use latch::Latch;
pub use settings::{
    decode_setting_payload, format_with_optional_units, validate_published_settings,
    PublishedSetting, SettingType, SettingValue, SettingsError,
};
pub use state::{JobState, UnknownState};
pub use structs::{
    DosingEvent, DosingEventName, GrowthRate, KalmanFilterOutput, LogRecord, ODFiltered, ODReading,
    ODReadings, PdAngle, PdChannel,
};
pub use timer::RepeatedTimer;
pub use topics::{BROADCAST, STATE_SETTING, TOPIC_PREFIX, UNIVERSAL_EXPERIMENT};
