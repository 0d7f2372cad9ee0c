//! Source ingestion for the mapping engine.
//!
//! Sources are CSV files named by their file name. [`ChunkStream`] reads them
//! in lockstep so that memory stays bounded by the chunk size.

#![deny(unsafe_code)]

mod chunk;
mod discovery;
mod error;
mod reader;

pub use chunk::{Chunk, SourceTable};
pub use discovery::{discover_sources, list_csv_files, source_name};
pub use error::{IngestError, Result};
pub use reader::{ChunkOptions, ChunkStream};
