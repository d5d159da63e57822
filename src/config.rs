//! Engine tunables with defaults, validation and typed partial updates.
//!
//! Updates arrive as loosely typed key/value maps (from an API layer or a
//! settings file). Recognized keys are parsed into a [`ConfigPatch`] first,
//! so a bad value rejects the whole update and readers never observe a
//! half-applied configuration. Unknown keys are ignored.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ConfigError;
use crate::normalize::normalize_phrase;

pub const DEFAULT_WAKE_PHRASES: &[&str] = &["hey autobot", "ok autobot", "autobot"];

/// Recognized option names for [`ConfigPatch::from_map`].
pub mod keys {
    pub const ENABLED: &str = "enabled";
    pub const WAKE_PHRASES: &str = "wake_phrases";
    pub const BASE_CONFIDENCE_THRESHOLD: &str = "base_confidence_threshold";
    pub const COOLDOWN_SECONDS: &str = "cooldown_seconds";
    pub const MAX_FALSE_POSITIVE_RATE: &str = "max_false_positive_rate";
    pub const ADAPTIVE_ENABLED: &str = "adaptive_enabled";
    pub const NOISE_TOLERANCE: &str = "noise_tolerance";
    pub const CHUNK_DURATION_MS: &str = "chunk_duration_ms";
    pub const MAX_CPU_PERCENT: &str = "max_cpu_percent";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WakeWordConfig {
    pub enabled: bool,
    /// Normalized, de-duplicated, in priority order.
    pub wake_phrases: Vec<String>,
    pub base_confidence_threshold: f64,
    pub cooldown_seconds: f64,
    pub max_false_positive_rate: f64,
    pub adaptive_enabled: bool,
    /// Carried for host integrations; scoring uses a fixed noise penalty.
    pub noise_tolerance: f64,
    pub chunk_duration_ms: u64,
    pub max_cpu_percent: f64,
}

impl Default for WakeWordConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            wake_phrases: DEFAULT_WAKE_PHRASES.iter().map(|p| p.to_string()).collect(),
            base_confidence_threshold: 0.7,
            cooldown_seconds: 2.0,
            max_false_positive_rate: 0.1,
            adaptive_enabled: true,
            noise_tolerance: 0.3,
            chunk_duration_ms: 100,
            max_cpu_percent: 15.0,
        }
    }
}

impl WakeWordConfig {
    /// Normalize phrases and check every field against its documented range.
    pub fn validated(mut self) -> Result<Self, ConfigError> {
        self.wake_phrases = normalize_phrases(&self.wake_phrases)?;
        check_unit(keys::BASE_CONFIDENCE_THRESHOLD, self.base_confidence_threshold)?;
        check_non_negative(keys::COOLDOWN_SECONDS, self.cooldown_seconds)?;
        check_unit(keys::MAX_FALSE_POSITIVE_RATE, self.max_false_positive_rate)?;
        check_unit(keys::NOISE_TOLERANCE, self.noise_tolerance)?;
        if self.chunk_duration_ms == 0 {
            return Err(ConfigError::OutOfRange {
                key: keys::CHUNK_DURATION_MS.to_string(),
                value: 0.0,
                range: "> 0",
            });
        }
        check_positive(keys::MAX_CPU_PERCENT, self.max_cpu_percent)?;
        Ok(self)
    }

    /// Merge a patch into a copy of this config and validate the result.
    pub fn merged(&self, patch: &ConfigPatch) -> Result<Self, ConfigError> {
        let mut next = self.clone();
        if let Some(v) = patch.enabled {
            next.enabled = v;
        }
        if let Some(ref v) = patch.wake_phrases {
            next.wake_phrases = v.clone();
        }
        if let Some(v) = patch.base_confidence_threshold {
            next.base_confidence_threshold = v;
        }
        if let Some(v) = patch.cooldown_seconds {
            next.cooldown_seconds = v;
        }
        if let Some(v) = patch.max_false_positive_rate {
            next.max_false_positive_rate = v;
        }
        if let Some(v) = patch.adaptive_enabled {
            next.adaptive_enabled = v;
        }
        if let Some(v) = patch.noise_tolerance {
            next.noise_tolerance = v;
        }
        if let Some(v) = patch.chunk_duration_ms {
            next.chunk_duration_ms = v;
        }
        if let Some(v) = patch.max_cpu_percent {
            next.max_cpu_percent = v;
        }
        next.validated()
    }
}

/// A partial configuration update. `None` fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigPatch {
    pub enabled: Option<bool>,
    pub wake_phrases: Option<Vec<String>>,
    pub base_confidence_threshold: Option<f64>,
    pub cooldown_seconds: Option<f64>,
    pub max_false_positive_rate: Option<f64>,
    pub adaptive_enabled: Option<bool>,
    pub noise_tolerance: Option<f64>,
    pub chunk_duration_ms: Option<u64>,
    pub max_cpu_percent: Option<f64>,
}

impl ConfigPatch {
    /// Parse recognized keys out of a loosely typed map. Unknown keys are
    /// skipped; a recognized key with the wrong value type is an error.
    pub fn from_map(map: &Map<String, Value>) -> Result<Self, ConfigError> {
        let mut patch = ConfigPatch::default();
        for (key, value) in map {
            match key.as_str() {
                keys::ENABLED => patch.enabled = Some(as_bool(key, value)?),
                keys::WAKE_PHRASES => patch.wake_phrases = Some(as_string_list(key, value)?),
                keys::BASE_CONFIDENCE_THRESHOLD => {
                    patch.base_confidence_threshold = Some(as_f64(key, value)?)
                }
                keys::COOLDOWN_SECONDS => patch.cooldown_seconds = Some(as_f64(key, value)?),
                keys::MAX_FALSE_POSITIVE_RATE => {
                    patch.max_false_positive_rate = Some(as_f64(key, value)?)
                }
                keys::ADAPTIVE_ENABLED => patch.adaptive_enabled = Some(as_bool(key, value)?),
                keys::NOISE_TOLERANCE => patch.noise_tolerance = Some(as_f64(key, value)?),
                keys::CHUNK_DURATION_MS => patch.chunk_duration_ms = Some(as_u64(key, value)?),
                keys::MAX_CPU_PERCENT => patch.max_cpu_percent = Some(as_f64(key, value)?),
                other => tracing::debug!(key = other, "config_key_ignored"),
            }
        }
        Ok(patch)
    }

    pub fn is_empty(&self) -> bool {
        *self == ConfigPatch::default()
    }
}

/// Normalize phrases, dropping later duplicates and keeping first-seen order.
pub fn normalize_phrases(phrases: &[String]) -> Result<Vec<String>, ConfigError> {
    let mut out: Vec<String> = Vec::with_capacity(phrases.len());
    for raw in phrases {
        let phrase =
            normalize_phrase(raw).ok_or_else(|| ConfigError::InvalidPhrase(raw.clone()))?;
        if !out.contains(&phrase) {
            out.push(phrase);
        }
    }
    Ok(out)
}

fn as_bool(key: &str, value: &Value) -> Result<bool, ConfigError> {
    value.as_bool().ok_or_else(|| ConfigError::InvalidType {
        key: key.to_string(),
        expected: "bool",
    })
}

fn as_f64(key: &str, value: &Value) -> Result<f64, ConfigError> {
    value.as_f64().ok_or_else(|| ConfigError::InvalidType {
        key: key.to_string(),
        expected: "number",
    })
}

fn as_u64(key: &str, value: &Value) -> Result<u64, ConfigError> {
    if let Some(v) = value.as_u64() {
        return Ok(v);
    }
    match value.as_f64() {
        Some(v) if v >= 0.0 && v.fract() == 0.0 && v <= u64::MAX as f64 => Ok(v as u64),
        Some(v) => Err(ConfigError::OutOfRange {
            key: key.to_string(),
            value: v,
            range: "non-negative integer",
        }),
        None => Err(ConfigError::InvalidType {
            key: key.to_string(),
            expected: "integer",
        }),
    }
}

fn as_string_list(key: &str, value: &Value) -> Result<Vec<String>, ConfigError> {
    let invalid = || ConfigError::InvalidType {
        key: key.to_string(),
        expected: "array of strings",
    };
    value
        .as_array()
        .ok_or_else(invalid)?
        .iter()
        .map(|v| v.as_str().map(str::to_string).ok_or_else(invalid))
        .collect()
}

fn check_unit(key: &str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            key: key.to_string(),
            value,
            range: "[0, 1]",
        })
    }
}

fn check_non_negative(key: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            key: key.to_string(),
            value,
            range: ">= 0",
        })
    }
}

fn check_positive(key: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            key: key.to_string(),
            value,
            range: "> 0",
        })
    }
}
