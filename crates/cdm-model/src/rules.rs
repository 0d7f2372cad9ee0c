//! Rule configuration types.
//!
//! A [`RuleConfig`] is the parsed form of a rule document:
//!
//! ```json
//! {
//!   "dataset_name": "d1",
//!   "cdm": {
//!     "person": [
//!       { "person": { "person_id": { "source_table": "t1", "source_field": "id" } } }
//!     ]
//!   }
//! }
//! ```
//!
//! Every level keeps the declaration order of the document: destination
//! tables, the rule sets of a table, the concept groups of a rule set, and
//! the fields of a concept group.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::value::ConceptId;

/// A loaded rule configuration. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleConfig {
    pub dataset_name: String,
    pub cdm: Vec<DestinationRules>,
}

/// All rule sets targeting one destination table.
#[derive(Debug, Clone, PartialEq)]
pub struct DestinationRules {
    pub table: String,
    pub rule_sets: Vec<RuleSet>,
}

/// One destination-object instance worth of rules.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleSet {
    pub concepts: Vec<ConceptGroup>,
}

/// Field rules declared under one concept name.
#[derive(Debug, Clone, PartialEq)]
pub struct ConceptGroup {
    pub name: String,
    pub fields: Vec<FieldMapping>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldMapping {
    pub destination_field: String,
    pub rule: FieldRule,
}

/// How a single destination field is computed.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRule {
    pub source_table: String,
    pub source_field: String,
    /// `None` means the value is passed through from the source field.
    pub term_mapping: Option<TermMapping>,
    /// Transforms applied, in order, to pass-through values.
    pub operations: Vec<FieldOperation>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TermMapping {
    /// Every row maps to the same concept.
    Constant(ConceptId),
    /// Raw source value to concept, in document order.
    Lookup(IndexMap<String, ConceptId>),
}

impl TermMapping {
    /// Resolves a raw source value. Constants ignore the value.
    pub fn resolve(&self, raw: &str) -> Option<&ConceptId> {
        match self {
            Self::Constant(id) => Some(id),
            Self::Lookup(values) => values.get(raw),
        }
    }

    /// `(source_value, concept_id)` pairs in declaration order; constants
    /// carry no source value.
    pub fn pairs(&self) -> Vec<(Option<&str>, &ConceptId)> {
        match self {
            Self::Constant(id) => vec![(None, id)],
            Self::Lookup(values) => values
                .iter()
                .map(|(value, id)| (Some(value.as_str()), id))
                .collect(),
        }
    }
}

/// Named value transforms a pass-through field rule may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldOperation {
    ExtractYear,
    ExtractMonth,
    ExtractDay,
    GetDatetime,
    GetDate,
    Trim,
    Uppercase,
    Lowercase,
}

impl FieldOperation {
    pub const ALL: [FieldOperation; 8] = [
        Self::ExtractYear,
        Self::ExtractMonth,
        Self::ExtractDay,
        Self::GetDatetime,
        Self::GetDate,
        Self::Trim,
        Self::Uppercase,
        Self::Lowercase,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExtractYear => "extract_year",
            Self::ExtractMonth => "extract_month",
            Self::ExtractDay => "extract_day",
            Self::GetDatetime => "get_datetime",
            Self::GetDate => "get_date",
            Self::Trim => "trim",
            Self::Uppercase => "uppercase",
            Self::Lowercase => "lowercase",
        }
    }
}

impl fmt::Display for FieldOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldOperation {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|op| op.as_str() == wanted)
            .ok_or_else(|| ModelError::UnknownOperation(s.to_string()))
    }
}

/// A field rule together with where it sits in the configuration.
#[derive(Debug, Clone, Copy)]
pub struct RuleEntry<'a> {
    pub table: &'a str,
    pub rule_set_index: usize,
    pub concept: &'a str,
    pub destination_field: &'a str,
    pub rule: &'a FieldRule,
}

impl RuleConfig {
    pub fn destination(&self, table: &str) -> Option<&DestinationRules> {
        self.cdm.iter().find(|rules| rules.table == table)
    }

    pub fn rule_set_count(&self) -> usize {
        self.cdm.iter().map(|rules| rules.rule_sets.len()).sum()
    }

    /// Walks every field rule in declaration order.
    pub fn entries(&self) -> impl Iterator<Item = RuleEntry<'_>> + '_ {
        self.cdm.iter().flat_map(|destination| {
            destination
                .rule_sets
                .iter()
                .enumerate()
                .flat_map(move |(rule_set_index, rule_set)| {
                    rule_set.concepts.iter().flat_map(move |concept| {
                        concept.fields.iter().map(move |field| RuleEntry {
                            table: &destination.table,
                            rule_set_index,
                            concept: &concept.name,
                            destination_field: &field.destination_field,
                            rule: &field.rule,
                        })
                    })
                })
        })
    }
}

impl RuleSet {
    /// Destination fields mapped anywhere in this rule set, first occurrence order.
    pub fn destination_fields(&self) -> Vec<&str> {
        let mut fields: Vec<&str> = Vec::new();
        for concept in &self.concepts {
            for field in &concept.fields {
                if !fields.contains(&field.destination_field.as_str()) {
                    fields.push(&field.destination_field);
                }
            }
        }
        fields
    }
}
