// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Published-setting schemas and payload codecs.
//!
//! Every background job declares a schema of published settings. The schema
//! drives three things: what gets mirrored to the broker (retained), what a
//! remote client may mutate via the `/set` sub-topic, and what survives the
//! job's clean-up (`persist`).

use serde::{Deserialize, Serialize};

/// Wire datatype of a published setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingType {
    String,
    Float,
    Integer,
    Boolean,
    Json,
}

/// Schema entry for one published setting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedSetting {
    pub datatype: SettingType,
    pub settable: bool,
    /// Display unit, e.g. "rpm" or "h⁻¹".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Settings with `persist = false` are cleared from the broker and
    /// nulled in the job registry on clean-up.
    #[serde(default)]
    pub persist: bool,
}

impl PublishedSetting {
    pub fn new(datatype: SettingType, settable: bool) -> Self {
        Self { datatype, settable, unit: None, persist: false }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn persisted(mut self) -> Self {
        self.persist = true;
        self
    }
}

/// A decoded setting value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Json(serde_json::Value),
}

impl SettingValue {
    /// Encode for an MQTT payload. Scalars go as their plain text form,
    /// JSON values as a JSON document.
    pub fn to_payload(&self) -> Vec<u8> {
        match self {
            SettingValue::String(s) => s.clone().into_bytes(),
            SettingValue::Float(f) => f.to_string().into_bytes(),
            SettingValue::Integer(i) => i.to_string().into_bytes(),
            SettingValue::Boolean(b) => b.to_string().into_bytes(),
            SettingValue::Json(v) => serde_json::to_vec(v).unwrap_or_default(),
        }
    }

    /// JSON representation for storage in the job registry.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            SettingValue::String(s) => serde_json::Value::String(s.clone()),
            SettingValue::Float(f) => serde_json::json!(f),
            SettingValue::Integer(i) => serde_json::json!(i),
            SettingValue::Boolean(b) => serde_json::Value::Bool(*b),
            SettingValue::Json(v) => v.clone(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SettingValue::Float(f) => Some(*f),
            SettingValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SettingValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SettingValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<f64> for SettingValue {
    fn from(v: f64) -> Self {
        SettingValue::Float(v)
    }
}

impl From<i64> for SettingValue {
    fn from(v: i64) -> Self {
        SettingValue::Integer(v)
    }
}

impl From<bool> for SettingValue {
    fn from(v: bool) -> Self {
        SettingValue::Boolean(v)
    }
}

impl From<&str> for SettingValue {
    fn from(v: &str) -> Self {
        SettingValue::String(v.to_string())
    }
}

impl From<String> for SettingValue {
    fn from(v: String) -> Self {
        SettingValue::String(v)
    }
}

impl From<serde_json::Value> for SettingValue {
    fn from(v: serde_json::Value) -> Self {
        SettingValue::Json(v)
    }
}

impl std::fmt::Display for SettingValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingValue::String(s) => f.write_str(s),
            SettingValue::Float(v) => write!(f, "{v}"),
            SettingValue::Integer(v) => write!(f, "{v}"),
            SettingValue::Boolean(v) => write!(f, "{v}"),
            SettingValue::Json(v) => write!(f, "{v}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    #[error("setting {0:?} has a bad name - must be lowercase alphanumeric, separated by underscores")]
    BadName(String),

    #[error("could not decode payload as {datatype:?}: {payload:?}")]
    BadPayload { datatype: String, payload: String },
}

/// Decode an inbound `/set` payload according to the declared datatype.
///
/// Booleans accept the usual truthy spellings (`true`, `1`, `y`, `on`,
/// `yes`, `t`, case-insensitive); everything else decodes strictly.
pub fn decode_setting_payload(
    payload: &[u8],
    datatype: SettingType,
) -> Result<SettingValue, SettingsError> {
    let text = String::from_utf8_lossy(payload);
    let bad = || SettingsError::BadPayload {
        datatype: format!("{datatype:?}").to_lowercase(),
        payload: text.to_string(),
    };
    match datatype {
        SettingType::String => Ok(SettingValue::String(text.to_string())),
        SettingType::Float => text.trim().parse::<f64>().map(SettingValue::Float).map_err(|_| bad()),
        SettingType::Integer => {
            text.trim().parse::<i64>().map(SettingValue::Integer).map_err(|_| bad())
        }
        SettingType::Boolean => {
            let truthy = matches!(
                text.trim().to_lowercase().as_str(),
                "true" | "1" | "y" | "on" | "yes" | "t"
            );
            Ok(SettingValue::Boolean(truthy))
        }
        SettingType::Json => {
            serde_json::from_slice(payload).map(SettingValue::Json).map_err(|_| bad())
        }
    }
}

/// Validate a single setting name: lowercase alphanumeric chunks separated
/// by underscores.
pub fn is_valid_setting_name(name: &str) -> bool {
    !name.is_empty()
        && name.split('_').all(|chunk| {
            !chunk.is_empty()
                && chunk.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        })
}

/// Validate a whole schema. Jobs call this during construction and must
/// clean up and surface the error if it fails.
pub fn validate_published_settings<'a>(
    settings: impl IntoIterator<Item = (&'a str, &'a PublishedSetting)>,
) -> Result<(), SettingsError> {
    for (name, _props) in settings {
        if !is_valid_setting_name(name) {
            return Err(SettingsError::BadName(name.to_string()));
        }
    }
    Ok(())
}

/// Render a value with its optional display unit, truncated to 40 chars.
///
/// `format_with_optional_units("25.0", Some("cm"))` → `"25.0 cm"`;
/// percent signs attach without a space.
pub fn format_with_optional_units(value: &str, unit: Option<&str>) -> String {
    const MAX: usize = 40;
    let s = match unit {
        None => value.to_string(),
        Some("%") => format!("{value}%"),
        Some(u) => format!("{value} {u}"),
    };
    if s.chars().count() > MAX {
        let truncated: String = s.chars().take(MAX).collect();
        format!("{truncated}...")
    } else {
        s
    }
}

#[cfg(test)]
#[path = "settings_tests.rs"]
mod tests;
