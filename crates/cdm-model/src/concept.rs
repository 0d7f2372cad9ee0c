use serde::{Deserialize, Serialize};

use crate::value::ConceptId;

/// Where a concept id was mapped from.
///
/// Equality is exact: two descriptors are the same source only when every
/// field, including the optional source value, matches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub source_field: String,
    pub source_table: String,
    pub source_dataset: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub source_value: Option<String>,
}

/// Grouped concept-index entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptEntry {
    pub concept_id: ConceptId,
    pub concept_name: String,
    pub domain: String,
    pub sources: Vec<SourceDescriptor>,
}

/// Ungrouped concept occurrence, one per mapped value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatConcept {
    pub concept_id: ConceptId,
    pub concept_name: String,
    pub domain: String,
    #[serde(flatten)]
    pub source: SourceDescriptor,
}
