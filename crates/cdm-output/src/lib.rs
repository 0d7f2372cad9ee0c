//! Destination table output.
//!
//! [`TableWriter`] appends rows to `{output_dir}/{table}.{ext}` as each chunk
//! is processed, writing the header once per table.

#![deny(unsafe_code)]

mod error;
mod writer;

pub use error::{OutputError, Result};
pub use writer::{TableWriter, WriterOptions};
