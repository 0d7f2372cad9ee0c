use std::collections::BTreeMap;
use std::path::PathBuf;

use cdm_core::RunSummary;

#[derive(Debug)]
pub struct RunResult {
    pub dataset_name: String,
    pub output_dir: PathBuf,
    /// Files written, keyed by destination table.
    pub files: BTreeMap<String, PathBuf>,
    /// Rows flushed per table, as reported by the writer when it closed.
    pub tables: BTreeMap<String, usize>,
    pub summary: RunSummary,
    pub has_errors: bool,
}

impl RunResult {
    pub fn new(
        output_dir: PathBuf,
        files: BTreeMap<String, PathBuf>,
        tables: BTreeMap<String, usize>,
        summary: RunSummary,
    ) -> Self {
        Self {
            dataset_name: summary.dataset_name.clone(),
            output_dir,
            files,
            tables,
            has_errors: summary.has_failures(),
            summary,
        }
    }
}
