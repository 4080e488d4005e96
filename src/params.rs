//! Pipeline parameters shared by every job: the process-wide Config Store.
//!
//! [`PipelineParams`] is mutated only through [`PipelineParams::update`], which
//! validates the key and the value before writing. [`ParamOverrides`] carries the
//! one-shot values a single submission may use without touching the store.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ParamError;

/// Upper bound on `floor_count`. Each floor replicates every detection, so the
/// element list grows linearly with this value.
pub const MAX_FLOOR_COUNT: u32 = 200;

/// The recognised parameter names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKey {
    /// Pixels-to-meters factor.
    Scale,
    /// Floor height in meters.
    Height,
    /// Number of floors the plan is replicated over, 1 to [`MAX_FLOOR_COUNT`].
    FloorCount,
    /// Minimum detection confidence, strictly inside (0, 1).
    ConfThreshold,
}

impl ParamKey {
    pub const ALL: [ParamKey; 4] = [
        ParamKey::Scale,
        ParamKey::Height,
        ParamKey::FloorCount,
        ParamKey::ConfThreshold,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ParamKey::Scale => "scale",
            ParamKey::Height => "height",
            ParamKey::FloorCount => "floor_count",
            ParamKey::ConfThreshold => "conf_threshold",
        }
    }

    /// Checks `value` against the key's type and range and returns it in its
    /// stored form.
    pub fn validate(&self, value: f64) -> Result<ParamValue, ParamError> {
        let invalid = |reason| ParamError::InvalidConfigValue {
            key: self.as_str().to_string(),
            value,
            reason,
        };
        if !value.is_finite() {
            return Err(invalid("must be a finite number"));
        }
        match self {
            ParamKey::Scale | ParamKey::Height => {
                if value <= 0.0 {
                    return Err(invalid("must be greater than 0"));
                }
                Ok(ParamValue::Float(value))
            }
            ParamKey::FloorCount => {
                if value.fract() != 0.0 {
                    return Err(invalid("must be a whole number"));
                }
                if value < 1.0 {
                    return Err(invalid("must be a positive integer"));
                }
                if value > f64::from(MAX_FLOOR_COUNT) {
                    return Err(invalid("must be at most 200"));
                }
                Ok(ParamValue::Int(value as u32))
            }
            ParamKey::ConfThreshold => {
                if value <= 0.0 || value >= 1.0 {
                    return Err(invalid("must be strictly between 0 and 1"));
                }
                Ok(ParamValue::Float(value))
            }
        }
    }
}

impl fmt::Display for ParamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParamKey {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ParamKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s.trim())
            .ok_or_else(|| ParamError::UnknownConfigKey(s.to_string()))
    }
}

/// A validated parameter value, serialized as a bare JSON number.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(u32),
    Float(f64),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Float(v) => write!(f, "{v}"),
        }
    }
}

/// Current values of every pipeline parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineParams {
    pub scale: f64,
    pub height: f64,
    pub floor_count: u32,
    pub conf_threshold: f64,
}

impl Default for PipelineParams {
    fn default() -> Self {
        Self {
            scale: 0.05,
            height: 3.0,
            floor_count: 1,
            conf_threshold: 0.25,
        }
    }
}

impl PipelineParams {
    /// Validates and applies a single update. On error nothing is written.
    pub fn update(&mut self, key: &str, value: f64) -> Result<(ParamKey, ParamValue), ParamError> {
        let key: ParamKey = key.parse()?;
        let validated = key.validate(value)?;
        self.set(key, validated);
        Ok((key, validated))
    }

    fn set(&mut self, key: ParamKey, value: ParamValue) {
        match (key, value) {
            (ParamKey::FloorCount, ParamValue::Int(v)) => self.floor_count = v,
            (ParamKey::Scale, ParamValue::Float(v)) => self.scale = v,
            (ParamKey::Height, ParamValue::Float(v)) => self.height = v,
            (ParamKey::ConfThreshold, ParamValue::Float(v)) => self.conf_threshold = v,
            // validate() only yields Int for floor_count and Float otherwise.
            _ => {}
        }
    }

    pub fn get(&self, key: ParamKey) -> ParamValue {
        match key {
            ParamKey::Scale => ParamValue::Float(self.scale),
            ParamKey::Height => ParamValue::Float(self.height),
            ParamKey::FloorCount => ParamValue::Int(self.floor_count),
            ParamKey::ConfThreshold => ParamValue::Float(self.conf_threshold),
        }
    }

    /// Re-validates every field, e.g. after loading defaults from a file.
    pub fn validate(&self) -> Result<(), ParamError> {
        for key in ParamKey::ALL {
            let raw = match self.get(key) {
                ParamValue::Int(v) => f64::from(v),
                ParamValue::Float(v) => v,
            };
            key.validate(raw)?;
        }
        Ok(())
    }

    /// Returns a copy with `overrides` applied on top. `self` is untouched.
    pub fn with_overrides(&self, overrides: &ParamOverrides) -> Self {
        let mut params = *self;
        for (key, value) in overrides.iter() {
            params.set(key, value);
        }
        params
    }

    /// Flat `key = value` listing, one per line.
    pub fn listing(&self) -> String {
        ParamKey::ALL
            .iter()
            .map(|key| format!("{key} = {}", self.get(*key)))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn as_map(&self) -> BTreeMap<String, ParamValue> {
        ParamKey::ALL
            .iter()
            .map(|key| (key.to_string(), self.get(*key)))
            .collect()
    }
}

/// One-shot values for a single submission. Never written back to the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamOverrides {
    values: BTreeMap<ParamKey, ParamValue>,
}

impl ParamOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and records an override for `key`.
    pub fn set(&mut self, key: ParamKey, value: f64) -> Result<(), ParamError> {
        let validated = key.validate(value)?;
        self.values.insert(key, validated);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ParamKey, ParamValue)> + '_ {
        self.values.iter().map(|(k, v)| (*k, *v))
    }
}
