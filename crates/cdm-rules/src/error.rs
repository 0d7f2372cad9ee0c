//! Error types for rule configuration.

use std::path::PathBuf;

use thiserror::Error;

/// Malformed or incomplete rule configuration.
///
/// Always fatal: a run never starts streaming with a configuration that
/// produced one of these.
#[derive(Debug, Error)]
pub enum ConfigError {
    // === Document Errors ===
    /// Failed to read the rule file.
    #[error("failed to read rule file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The document is not valid JSON.
    #[error("rule document is not valid JSON: {source}")]
    Json {
        #[source]
        source: serde_json::Error,
    },

    // === Structure Errors ===
    /// A required key is absent.
    #[error("missing required key '{key}' at {location}")]
    MissingKey { key: String, location: String },

    /// A value has the wrong JSON type.
    #[error("{location}: expected {expected}")]
    InvalidType {
        location: String,
        expected: &'static str,
    },

    /// `term_mapping` is neither a concept id nor a map of concept ids.
    #[error("{location}: invalid term_mapping: {reason}")]
    InvalidTermMapping { location: String, reason: String },

    /// An operation name is not supported.
    #[error("{location}: unknown operation '{name}'")]
    UnknownOperation { location: String, name: String },

    // === Destination Errors ===
    /// The destination table is not registered.
    #[error("unknown destination table '{table}'")]
    UnknownTable { table: String },

    /// Two `cdm` keys name the same registered table (e.g. `person` and `Person`).
    #[error("destination table '{table}' is declared twice (as '{first}' and '{second}')")]
    DuplicateTable {
        table: String,
        first: String,
        second: String,
    },

    /// Two destination objects share a name.
    #[error("destination object '{name}' is declared twice")]
    DuplicateObject { name: String },

    /// The destination table does not define the field.
    #[error("destination table '{table}' has no field '{field}' (object {object})")]
    UnknownField {
        table: String,
        object: String,
        field: String,
    },
}

impl ConfigError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn missing(key: &str, location: impl Into<String>) -> Self {
        Self::MissingKey {
            key: key.to_string(),
            location: location.into(),
        }
    }

    pub(crate) fn invalid_type(location: impl Into<String>, expected: &'static str) -> Self {
        Self::InvalidType {
            location: location.into(),
            expected,
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
