//! Rule application engine.
//!
//! - [`dag`]: orders destination objects so key producers run first
//! - [`interpreter`]: the rule-driven [`DestinationObject`] implementation
//! - [`operations`]: value transforms for pass-through fields
//! - [`pipeline`]: per-chunk orchestration, abort handling and key generation
//!
//! # Example
//!
//! ```ignore
//! use cdm_core::{EngineOptions, Pipeline};
//!
//! let mut pipeline = Pipeline::assemble(&config, default_registry(), EngineOptions::default())?;
//! let summary = pipeline.run(&mut stream, &mut writer)?;
//! ```

#![deny(unsafe_code)]

pub mod dag;
mod error;
pub mod interpreter;
pub mod object;
pub mod operations;
mod options;
pub mod pipeline;
pub mod resolution;

pub use dag::{DependencyGraph, build_order};
pub use error::{CoreError, DependencyCycleError, MappingError, Result};
pub use interpreter::RuleInterpreter;
pub use object::DestinationObject;
pub use options::EngineOptions;
pub use pipeline::{AbortReason, AbortedInstance, ChunkReport, Pipeline, RunSummary};
pub use resolution::{ResolutionLog, TermResolutionWarning};
