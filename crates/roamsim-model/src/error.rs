//! Errors raised while loading or building a scenario.

use roamsim_common::SimError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Scenario has no access points")]
    NoAccessPoints,

    #[error("Scenario has no channels")]
    NoChannels,

    #[error("Invalid channel {0} (expected 1..=14)")]
    InvalidChannel(u8),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Unknown node '{0}'")]
    UnknownNode(String),

    #[error("Flow '{flow}': unknown endpoint '{endpoint}'")]
    UnknownEndpoint { flow: String, endpoint: String },

    #[error("Flow '{flow}': stop ({stop_s} s) before start ({start_s} s)")]
    InvalidWindow { flow: String, start_s: f64, stop_s: f64 },

    #[error(transparent)]
    Time(#[from] SimError),
}

impl ModelError {
    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ModelError::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
