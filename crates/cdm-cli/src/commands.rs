use std::collections::BTreeMap;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use comfy_table::Table;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, info_span};

use cdm_core::{EngineOptions, Pipeline};
use cdm_ingest::{ChunkOptions, ChunkStream, discover_sources};
use cdm_model::default_registry;
use cdm_output::{TableWriter, WriterOptions};
use cdm_rules::{build_index, flatten, list_objects, load_rules};

use crate::cli::{OutputFormatArg, RunArgs};
use crate::summary::apply_table_style;
use crate::types::RunResult;

pub fn run_tables() -> Result<()> {
    let registry = default_registry();
    registry.validate().context("validate table registry")?;
    let mut table = Table::new();
    table.set_header(vec!["Table", "Primary key", "References", "Columns"]);
    apply_table_style(&mut table);
    for definition in registry.tables() {
        let key = match (&definition.primary_key, definition.key_generated) {
            (Some(key), true) => format!("{key} (generated)"),
            (Some(key), false) => key.clone(),
            (None, _) => "-".to_string(),
        };
        let references: Vec<String> = definition
            .foreign_keys
            .iter()
            .map(|fk| fk.references.to_string())
            .collect();
        table.add_row(vec![
            definition.name.clone(),
            key,
            if references.is_empty() {
                "-".to_string()
            } else {
                references.join(", ")
            },
            definition.columns.len().to_string(),
        ]);
    }
    println!("{table}");
    Ok(())
}

/// JSON listing of the object names declared per destination table.
pub fn objects_report(rules: &Path) -> Result<String> {
    let config = load_rules(rules).with_context(|| format!("load rules {}", rules.display()))?;
    serde_json::to_string_pretty(&list_objects(&config)).context("serialize objects")
}

/// JSON concept report across one or more rule documents.
pub fn concepts_report(rules: &[PathBuf], flat: bool) -> Result<String> {
    let mut configs = Vec::with_capacity(rules.len());
    for path in rules {
        let config =
            load_rules(path).with_context(|| format!("load rules {}", path.display()))?;
        configs.push(config);
    }
    if flat {
        serde_json::to_string_pretty(&flatten(&configs)).context("serialize concepts")
    } else {
        serde_json::to_string_pretty(&build_index(&configs)).context("serialize concepts")
    }
}

pub fn run_map(args: &RunArgs) -> Result<RunResult> {
    let config = load_rules(&args.rules)
        .with_context(|| format!("load rules {}", args.rules.display()))?;
    let span = info_span!("map", dataset = %config.dataset_name);
    let _guard = span.enter();
    let start = Instant::now();

    let options = EngineOptions::default()
        .with_log_data(args.log_data)
        .with_debug(args.debug);
    let mut pipeline =
        Pipeline::assemble(&config, default_registry(), options).context("assemble pipeline")?;
    info!(order = ?pipeline.order(), "processing order");

    let sources = discover_sources(&args.inputs).context("discover source files")?;
    info!(sources = sources.len(), "sources discovered");
    let mut chunk_options =
        ChunkOptions::default().with_delimiter(delimiter_byte(args.input_delimiter)?);
    if let Some(size) = args.chunk_size {
        chunk_options = chunk_options.with_chunk_size(size);
    }
    if let Some(rows) = args.max_rows {
        chunk_options = chunk_options.with_max_rows(rows);
    }
    let mut stream = ChunkStream::open(sources, chunk_options).context("open source files")?;

    let mut writer = TableWriter::new(&args.output_dir, writer_options(args.format))
        .with_context(|| format!("create output directory {}", args.output_dir.display()))?;

    let progress = chunk_progress();
    let mut rows = 0usize;
    let summary = pipeline
        .run_with_progress(&mut stream, &mut writer, |report| {
            rows += report.total_rows();
            progress.inc(1);
            progress.set_message(format!("{rows} rows written"));
        })
        .context("map sources")?;
    progress.finish_and_clear();

    let files: BTreeMap<String, PathBuf> = summary
        .rows_written
        .keys()
        .map(|table| (table.clone(), writer.path_for(table)))
        .collect();
    let tables = writer.finalize().context("finalize output tables")?;

    info!(
        rows = tables.values().sum::<usize>(),
        duration_ms = start.elapsed().as_millis(),
        "mapping complete"
    );
    Ok(RunResult::new(args.output_dir.clone(), files, tables, summary))
}

fn writer_options(format: OutputFormatArg) -> WriterOptions {
    match format {
        OutputFormatArg::Tsv => WriterOptions::default(),
        OutputFormatArg::Csv => WriterOptions::default()
            .with_delimiter(b',')
            .with_extension("csv"),
    }
}

/// Source delimiters are single bytes.
pub fn delimiter_byte(delimiter: char) -> Result<u8> {
    if !delimiter.is_ascii() {
        bail!("input delimiter must be a single ASCII character, got {delimiter:?}");
    }
    Ok(delimiter as u8)
}

fn chunk_progress() -> ProgressBar {
    if !io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new_spinner();
    if let Ok(style) =
        ProgressStyle::with_template("  Mapping  {spinner} chunk {pos} [{elapsed_precise}] {msg}")
    {
        bar.set_style(style);
    }
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}
