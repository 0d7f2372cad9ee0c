//! Error types for the mapping engine.

use thiserror::Error;

use cdm_ingest::IngestError;
use cdm_model::ModelError;
use cdm_output::OutputError;
use cdm_rules::ConfigError;

/// A field rule references source data the current chunk does not have.
///
/// Aborts the owning object instance and every instance depending on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    #[error(
        "{instance} ({table}): field '{field}' needs source table '{source_table}', which is not loaded"
    )]
    MissingSourceTable {
        table: String,
        instance: String,
        field: String,
        source_table: String,
    },

    #[error(
        "{instance} ({table}): field '{field}' needs column '{source_table}.{source_field}', which does not exist"
    )]
    MissingSourceColumn {
        table: String,
        instance: String,
        field: String,
        source_table: String,
        source_field: String,
    },
}

impl MappingError {
    pub fn instance(&self) -> &str {
        match self {
            Self::MissingSourceTable { instance, .. } | Self::MissingSourceColumn { instance, .. } => {
                instance
            }
        }
    }
}

/// The object instances could not be ordered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("dependency cycle between objects: {}", .unresolved.join(", "))]
pub struct DependencyCycleError {
    /// Instances that could not be placed in the order.
    pub unresolved: Vec<String>,
}

/// Fatal errors of a mapping run.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Cycle(#[from] DependencyCycleError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Output(#[from] OutputError),

    #[error("table registry is invalid: {0}")]
    Registry(#[from] ModelError),
}

pub type Result<T> = std::result::Result<T, CoreError>;
