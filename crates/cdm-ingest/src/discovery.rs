//! Input discovery: resolve command-line inputs into named sources.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{IngestError, Result};

/// Lists all CSV files in a directory.
///
/// Returns files sorted by filename.
pub fn list_csv_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(IngestError::DirectoryNotFound {
            path: dir.to_path_buf(),
        });
    }

    let mut files = Vec::new();
    let entries = std::fs::read_dir(dir).map_err(|e| IngestError::DirectoryRead {
        path: dir.to_path_buf(),
        source: e,
    })?;

    for entry_result in entries {
        let entry = entry_result.map_err(|e| IngestError::DirectoryRead {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let is_csv = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if is_csv {
            files.push(path);
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Source name for a file: its file name, as rules refer to it.
pub fn source_name(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
}

/// Resolve inputs into a map of source name to path.
///
/// Directories contribute every CSV file they contain; plain files are taken
/// as given regardless of extension.
pub fn discover_sources(inputs: &[PathBuf]) -> Result<BTreeMap<String, PathBuf>> {
    let mut sources: BTreeMap<String, PathBuf> = BTreeMap::new();
    for input in inputs {
        let files = if input.is_dir() {
            list_csv_files(input)?
        } else if input.is_file() {
            vec![input.clone()]
        } else {
            return Err(IngestError::FileNotFound {
                path: input.clone(),
            });
        };

        for path in files {
            let Some(name) = source_name(&path) else {
                continue;
            };
            if let Some(first) = sources.get(&name) {
                return Err(IngestError::DuplicateSource {
                    name,
                    first: first.clone(),
                    second: path,
                });
            }
            debug!(source = %name, path = %path.display(), "discovered source");
            sources.insert(name, path);
        }
    }

    if sources.is_empty() {
        return Err(IngestError::NoSources);
    }
    Ok(sources)
}
