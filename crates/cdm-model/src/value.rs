use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A standardized concept identifier.
///
/// Vocabularies use integer ids, but some registries hand out string codes,
/// so both are accepted. Serialized untagged to keep integers as JSON numbers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConceptId {
    Number(i64),
    Code(String),
}

impl fmt::Display for ConceptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(value) => write!(f, "{value}"),
            Self::Code(value) => f.write_str(value),
        }
    }
}

impl From<i64> for ConceptId {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for ConceptId {
    fn from(value: &str) -> Self {
        Self::Code(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum CellValue {
    Text(String),
    Missing,
}

impl CellValue {
    /// Builds a cell from a raw source value; empty or blank input is `Missing`.
    pub fn from_raw(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            Self::Missing
        } else {
            Self::Text(trimmed.to_string())
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            Self::Missing => None,
        }
    }
}

impl From<&ConceptId> for CellValue {
    fn from(value: &ConceptId) -> Self {
        Self::Text(value.to_string())
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(value) => f.write_str(value),
            Self::Missing => Ok(()),
        }
    }
}

/// One produced destination row keyed by destination field name.
///
/// Column order is not carried here; writers take it from the table definition.
pub type OutputRow = BTreeMap<String, CellValue>;
