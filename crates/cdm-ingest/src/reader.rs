//! Synchronized chunked reading over a set of named CSV sources.
//!
//! Each call to [`ChunkStream::next_chunk`] pulls up to `chunk_size` rows from
//! every source at once. Sources that run out early contribute an empty table
//! that still carries their headers, so lookups keep resolving columns. The
//! stream ends when a pull yields no rows from any source.
//!
//! # Usage
//!
//! ```ignore
//! use cdm_ingest::{ChunkOptions, ChunkStream};
//!
//! let options = ChunkOptions::default().with_chunk_size(1000);
//! let mut stream = ChunkStream::open(sources, options)?;
//! while let Some(chunk) = stream.next_chunk()? {
//!     // process chunk
//! }
//! ```

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use cdm_model::normalize_name;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::chunk::{Chunk, SourceTable};
use crate::error::{IngestError, Result};

/// Options for chunked reading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkOptions {
    /// Rows pulled from each source per chunk. `None` reads each source whole.
    pub chunk_size: Option<usize>,

    /// Upper bound on rows read from each source.
    pub max_rows: Option<usize>,

    /// Field delimiter. Defaults to `,`.
    pub delimiter: u8,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            chunk_size: None,
            max_rows: None,
            delimiter: b',',
        }
    }
}

impl ChunkOptions {
    /// Set the rows per chunk. Zero is treated as unbounded.
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = (size > 0).then_some(size);
        self
    }

    pub fn with_max_rows(mut self, rows: usize) -> Self {
        self.max_rows = Some(rows);
        self
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }
}

struct SourceCursor {
    name: String,
    path: PathBuf,
    reader: csv::Reader<File>,
    headers: Vec<String>,
    rows_read: usize,
    exhausted: bool,
}

impl SourceCursor {
    fn open(name: String, path: PathBuf, options: &ChunkOptions) -> Result<Self> {
        if !path.is_file() {
            return Err(IngestError::FileNotFound { path });
        }
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .delimiter(options.delimiter)
            .from_path(&path)
            .map_err(|e| IngestError::csv(&path, e))?;
        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| IngestError::csv(&path, e))?
            .iter()
            .map(normalize_name)
            .collect();
        debug!(source = %name, columns = headers.len(), "opened source");
        let exhausted = headers.is_empty();
        Ok(Self {
            name,
            path,
            reader,
            headers,
            rows_read: 0,
            exhausted,
        })
    }

    fn read_rows(&mut self, options: &ChunkOptions) -> Result<SourceTable> {
        let mut table = SourceTable::new(self.headers.clone());
        if self.exhausted {
            return Ok(table);
        }
        let mut budget = options.chunk_size.unwrap_or(usize::MAX);
        if let Some(max) = options.max_rows {
            budget = budget.min(max.saturating_sub(self.rows_read));
        }

        let mut record = csv::StringRecord::new();
        while table.rows.len() < budget {
            let more = self
                .reader
                .read_record(&mut record)
                .map_err(|e| IngestError::csv(&self.path, e))?;
            if !more {
                self.exhausted = true;
                break;
            }
            if record.iter().all(|cell| cell.trim().is_empty()) {
                continue;
            }
            let mut row: Vec<String> = record.iter().map(str::to_string).collect();
            row.resize(self.headers.len().max(row.len()), String::new());
            table.rows.push(row);
        }

        self.rows_read += table.rows.len();
        if options
            .max_rows
            .is_some_and(|max| self.rows_read >= max)
        {
            self.exhausted = true;
        }
        Ok(table)
    }
}

/// Pull cursor yielding aligned [`Chunk`]s across all sources.
pub struct ChunkStream {
    sources: BTreeMap<String, PathBuf>,
    options: ChunkOptions,
    cursors: Vec<SourceCursor>,
    chunks_read: usize,
    exhausted: bool,
}

impl ChunkStream {
    /// Open every source and read its header row.
    pub fn open(sources: BTreeMap<String, PathBuf>, options: ChunkOptions) -> Result<Self> {
        if sources.is_empty() {
            return Err(IngestError::NoSources);
        }
        let cursors = open_cursors(&sources, &options)?;
        Ok(Self {
            sources,
            options,
            cursors,
            chunks_read: 0,
            exhausted: false,
        })
    }

    /// Read the next chunk, or `None` once every source is drained.
    pub fn next_chunk(&mut self) -> Result<Option<Chunk>> {
        if self.exhausted {
            return Ok(None);
        }

        let mut chunk = Chunk::new(self.chunks_read);
        for cursor in &mut self.cursors {
            match cursor.read_rows(&self.options) {
                Ok(table) => chunk.insert(cursor.name.clone(), table),
                Err(err) => {
                    self.exhausted = true;
                    return Err(err);
                }
            }
        }

        if self.cursors.iter().all(|c| c.exhausted) {
            self.exhausted = true;
        }
        if chunk.is_empty() {
            self.exhausted = true;
            return Ok(None);
        }

        debug!(
            chunk = chunk.index,
            rows = chunk.total_rows(),
            "read chunk"
        );
        self.chunks_read += 1;
        Ok(Some(chunk))
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Reopen every source and start again from the first data row.
    pub fn rewind(&mut self) -> Result<()> {
        self.cursors = open_cursors(&self.sources, &self.options)?;
        self.chunks_read = 0;
        self.exhausted = false;
        Ok(())
    }

    pub fn source_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.sources.keys().map(String::as_str)
    }

    pub fn source_path(&self, name: &str) -> Option<&Path> {
        self.sources.get(name).map(PathBuf::as_path)
    }

    /// Headers of a source as read from its first line.
    pub fn headers(&self, name: &str) -> Option<&[String]> {
        self.cursors
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.headers.as_slice())
    }

    pub fn chunks_read(&self) -> usize {
        self.chunks_read
    }
}

impl Iterator for ChunkStream {
    type Item = Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_chunk().transpose()
    }
}

fn open_cursors(
    sources: &BTreeMap<String, PathBuf>,
    options: &ChunkOptions,
) -> Result<Vec<SourceCursor>> {
    sources
        .iter()
        .map(|(name, path)| SourceCursor::open(name.clone(), path.clone(), options))
        .collect()
}
