//! CLI argument definitions for the CDM mapper.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colorchoice_clap::Color;

#[derive(Parser)]
#[command(
    name = "cdm-mapper",
    version,
    about = "Map source CSV extracts into a common data model",
    long_about = "Map heterogeneous source tables into common data model tables.\n\n\
                  A JSON rule document declares, per destination table, how each\n\
                  destination field is taken from a source column and coded."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Adjust log verbosity (-v for info, -vv for debug, -q for errors only).
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Explicit log level (overrides -v/-q flags).
    #[arg(long = "log-level", value_enum, global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Log output format (pretty for human, json for machine parsing).
    #[arg(
        long = "log-format",
        value_enum,
        default_value = "pretty",
        global = true
    )]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Map source files into destination tables.
    Run(RunArgs),

    /// List the objects a rule document declares, per destination table.
    Objects(ObjectsArgs),

    /// Report which source values map to which concepts.
    Concepts(ConceptsArgs),

    /// List the supported destination tables.
    Tables,
}

#[derive(Parser)]
pub struct RunArgs {
    /// Rule document (JSON).
    #[arg(long = "rules", value_name = "JSON")]
    pub rules: PathBuf,

    /// Directory receiving one file per destination table.
    #[arg(long = "output-dir", short = 'o', visible_alias = "out-dir", value_name = "DIR")]
    pub output_dir: PathBuf,

    /// Source CSV files, or directories containing them.
    #[arg(long = "inputs", short = 'i', value_name = "PATH", num_args = 1.., required = true)]
    pub inputs: Vec<PathBuf>,

    /// Rows read from each source per chunk (default: whole file).
    #[arg(long = "chunk-size", visible_alias = "number-of-rows-per-chunk", value_name = "N")]
    pub chunk_size: Option<usize>,

    /// Maximum rows read from each source.
    #[arg(long = "max-rows", visible_alias = "number-of-rows-to-process", value_name = "N")]
    pub max_rows: Option<usize>,

    /// Field delimiter of the source files.
    #[arg(long = "input-delimiter", value_name = "CHAR", default_value_t = ',')]
    pub input_delimiter: char,

    /// Format of the destination table files.
    #[arg(long = "format", value_enum, default_value = "tsv")]
    pub format: OutputFormatArg,

    /// Include raw source values in warnings and log output.
    ///
    /// Source extracts usually carry patient data; values are redacted
    /// unless this flag is set.
    #[arg(long = "log-data")]
    pub log_data: bool,

    /// Emit a trace event for every produced row.
    #[arg(long = "debug")]
    pub debug: bool,
}

#[derive(Parser)]
pub struct ObjectsArgs {
    /// Rule document (JSON).
    #[arg(value_name = "JSON")]
    pub rules: PathBuf,
}

#[derive(Parser)]
pub struct ConceptsArgs {
    /// Rule documents (JSON) to index together.
    #[arg(value_name = "JSON", num_args = 1.., required = true)]
    pub rules: Vec<PathBuf>,

    /// One entry per mapped value instead of grouping by concept id.
    #[arg(long = "flat")]
    pub flat: bool,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormatArg {
    Tsv,
    Csv,
}

/// CLI log level choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// CLI log format choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}
