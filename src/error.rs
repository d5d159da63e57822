//! Error types for configuration updates.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid type for {key}: expected {expected}")]
    InvalidType { key: String, expected: &'static str },

    #[error("value {value} for {key} is out of range {range}")]
    OutOfRange {
        key: String,
        value: f64,
        range: &'static str,
    },

    #[error("invalid wake phrase: {0:?}")]
    InvalidPhrase(String),
}
