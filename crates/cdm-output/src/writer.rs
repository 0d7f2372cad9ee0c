//! Append-only writer producing one delimited file per destination table.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use cdm_model::{CellValue, OutputRow, TableDefinition};
use tracing::{debug, info};

use crate::error::{OutputError, Result};

/// Options for table output.
#[derive(Debug, Clone)]
pub struct WriterOptions {
    /// Field delimiter. Defaults to tab.
    pub delimiter: u8,
    /// File extension without the leading dot. Defaults to `tsv`.
    pub extension: String,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            delimiter: b'\t',
            extension: "tsv".to_string(),
        }
    }
}

impl WriterOptions {
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }
}

struct OpenTable {
    path: PathBuf,
    writer: csv::Writer<File>,
    rows: usize,
}

/// Writes destination rows as they are produced.
///
/// The first non-empty write for a table truncates its file and writes the
/// header; later writes append. Files stay open until [`TableWriter::finalize`].
pub struct TableWriter {
    output_dir: PathBuf,
    options: WriterOptions,
    tables: BTreeMap<String, OpenTable>,
}

impl TableWriter {
    pub fn new(output_dir: impl Into<PathBuf>, options: WriterOptions) -> Result<Self> {
        let output_dir = output_dir.into();
        fs::create_dir_all(&output_dir).map_err(|source| OutputError::Io {
            path: output_dir.clone(),
            source,
        })?;
        Ok(Self {
            output_dir,
            options,
            tables: BTreeMap::new(),
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// File path a table is (or would be) written to.
    pub fn path_for(&self, table: &str) -> PathBuf {
        self.output_dir
            .join(format!("{table}.{}", self.options.extension))
    }

    /// Append rows to the table's file, creating it on first use.
    ///
    /// Columns follow `definition.columns`; fields absent from a row or
    /// `Missing` are written empty. Returns the number of rows written.
    pub fn write(&mut self, definition: &TableDefinition, rows: &[OutputRow]) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        let path = self.path_for(&definition.name);
        let delimiter = self.options.delimiter;
        let table = match self.tables.entry(definition.name.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let mut writer = csv::WriterBuilder::new()
                    .delimiter(delimiter)
                    .from_path(&path)
                    .map_err(|source| OutputError::Csv {
                        path: path.clone(),
                        source,
                    })?;
                writer
                    .write_record(&definition.columns)
                    .map_err(|source| OutputError::Csv {
                        path: path.clone(),
                        source,
                    })?;
                debug!(table = %definition.name, path = %path.display(), "created table file");
                entry.insert(OpenTable {
                    path,
                    writer,
                    rows: 0,
                })
            }
        };
        for row in rows {
            let record = definition.columns.iter().map(|column| {
                row.get(column)
                    .and_then(CellValue::as_text)
                    .unwrap_or_default()
            });
            table
                .writer
                .write_record(record)
                .map_err(|source| OutputError::Csv {
                    path: table.path.clone(),
                    source,
                })?;
        }
        table.writer.flush().map_err(|source| OutputError::Io {
            path: table.path.clone(),
            source,
        })?;
        table.rows += rows.len();
        Ok(rows.len())
    }

    /// Total rows written so far for a table.
    pub fn rows_written(&self, table: &str) -> usize {
        self.tables.get(table).map_or(0, |t| t.rows)
    }

    /// Flush and close every file, returning row counts per table.
    pub fn finalize(self) -> Result<BTreeMap<String, usize>> {
        let mut counts = BTreeMap::new();
        for (name, mut table) in self.tables {
            table.writer.flush().map_err(|source| OutputError::Io {
                path: table.path.clone(),
                source,
            })?;
            info!(table = %name, rows = table.rows, path = %table.path.display(), "table written");
            counts.insert(name, table.rows);
        }
        Ok(counts)
    }
}
