//! Rule configuration loading and concept indexing.
//!
//! - **Loader**: parse a JSON rule document into a [`cdm_model::RuleConfig`]
//!   and list the objects it declares
//! - **Concepts**: invert term mappings into a [`ConceptIndex`] or a flat
//!   list of occurrences for reporting
//!
//! # Example
//!
//! ```ignore
//! use cdm_rules::{build_index, list_objects, load_rules};
//!
//! let config = load_rules(Path::new("rules.json"))?;
//! let objects = list_objects(&config);
//! let index = build_index(std::slice::from_ref(&config));
//! ```

#![deny(unsafe_code)]

mod concepts;
mod error;
mod loader;

pub use concepts::{ConceptConflict, ConceptIndex, build_index, display_name, flatten};
pub use error::{ConfigError, Result};
pub use loader::{list_objects, load_rules, parse_rules, rules_from_value};
