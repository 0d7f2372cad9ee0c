//! Destination object abstraction.
//!
//! A [`DestinationObject`] turns one chunk of source data into rows of a
//! single destination table. The pipeline only sees this trait, so rule-driven
//! objects ([`crate::RuleInterpreter`]) and hand-written ones are scheduled
//! the same way.
//!
//! # Example
//!
//! ```ignore
//! struct FixedPeriod;
//!
//! impl DestinationObject for FixedPeriod {
//!     fn name(&self) -> &str {
//!         "observation_period_fixed"
//!     }
//!
//!     fn table(&self) -> &str {
//!         "observation_period"
//!     }
//!
//!     fn requires(&self) -> Vec<KeyRef> {
//!         vec![KeyRef::new("person", "person_id")]
//!     }
//!
//!     fn maps_field(&self, field: &str) -> bool {
//!         field == "person_id"
//!     }
//!
//!     fn compute(&self, chunk: &Chunk, log: &mut ResolutionLog) -> Result<Vec<OutputRow>, MappingError> {
//!         // build rows from chunk
//!         Ok(Vec::new())
//!     }
//! }
//! ```

use cdm_ingest::Chunk;
use cdm_model::{KeyRef, OutputRow};

use crate::error::MappingError;
use crate::resolution::ResolutionLog;

pub trait DestinationObject {
    /// Unique instance name, `{table}_{index}` for rule-driven objects.
    fn name(&self) -> &str;

    /// Destination table the rows belong to.
    fn table(&self) -> &str;

    /// Keys whose values this object produces for others to reference.
    fn provides(&self) -> Vec<KeyRef> {
        Vec::new()
    }

    /// Keys produced by other objects that this object references.
    fn requires(&self) -> Vec<KeyRef> {
        Vec::new()
    }

    /// Whether the object fills `field` itself.
    fn maps_field(&self, field: &str) -> bool;

    /// Compute the rows for one chunk.
    ///
    /// Warnings go to `log`; callers discard both rows and log when this
    /// returns an error.
    fn compute(&self, chunk: &Chunk, log: &mut ResolutionLog)
    -> Result<Vec<OutputRow>, MappingError>;
}
