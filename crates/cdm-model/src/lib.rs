//! Common data model definitions.
//!
//! This crate holds the types shared by every stage of the mapping run:
//!
//! - **Rules**: the declarative rule configuration ([`RuleConfig`]) that says
//!   how source columns become destination fields
//! - **Concepts**: concept identifiers and the descriptors used by the
//!   concept index
//! - **Tables**: cell values, output rows and the static registry of
//!   destination tables ([`TableRegistry`])

#![deny(unsafe_code)]

pub mod concept;
pub mod error;
pub mod names;
pub mod registry;
pub mod rules;
pub mod value;

pub use concept::{ConceptEntry, FlatConcept, SourceDescriptor};
pub use error::{ModelError, Result};
pub use names::normalize_name;
pub use registry::{ForeignKey, KeyRef, TableDefinition, TableRegistry, default_registry};
pub use rules::{
    ConceptGroup, DestinationRules, FieldMapping, FieldOperation, FieldRule, RuleConfig,
    RuleEntry, RuleSet, TermMapping,
};
pub use value::{CellValue, ConceptId, OutputRow};
