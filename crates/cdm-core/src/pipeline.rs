//! Chunk-by-chunk orchestration of destination objects.
//!
//! The pipeline is assembled once from a rule configuration: one
//! [`RuleInterpreter`] per rule set, validated against the table registry and
//! ordered by [`build_order`]. Each chunk then flows through every live object
//! in that order, and each object's rows are written before the next object
//! runs.
//!
//! # Failure handling
//!
//! - IO failures (reading sources, writing tables) are fatal for the run.
//! - A [`MappingError`] aborts the object that raised it, along with every
//!   object that depends on it, for the rest of the run. Rows and warnings
//!   from the failing chunk are discarded. Independent objects continue.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

use cdm_ingest::{Chunk, ChunkStream};
use cdm_model::{CellValue, OutputRow, RuleConfig, TableDefinition, TableRegistry};
use cdm_output::TableWriter;
use cdm_rules::ConfigError;
use tracing::{debug, error, info, info_span, warn};

use crate::dag::{DependencyGraph, build_order};
use crate::error::{MappingError, Result};
use crate::interpreter::RuleInterpreter;
use crate::object::DestinationObject;
use crate::options::EngineOptions;
use crate::resolution::{ResolutionLog, TermResolutionWarning};

/// Why an object stopped producing rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// The object itself failed.
    Failed(MappingError),
    /// An object it depends on was aborted.
    DependsOn(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbortedInstance {
    pub name: String,
    pub table: String,
    /// Chunk in which the object was aborted.
    pub chunk: usize,
    pub reason: AbortReason,
}

impl fmt::Display for AbortedInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            AbortReason::Failed(error) => write!(f, "{error}"),
            AbortReason::DependsOn(parent) => {
                write!(f, "{} ({}): depends on aborted {parent}", self.name, self.table)
            }
        }
    }
}

/// Outcome of processing one chunk.
#[derive(Debug, Clone, Default)]
pub struct ChunkReport {
    pub index: usize,
    /// Rows written per destination table.
    pub rows_written: BTreeMap<String, usize>,
    /// Objects aborted while processing this chunk.
    pub aborted: Vec<AbortedInstance>,
}

impl ChunkReport {
    pub fn total_rows(&self) -> usize {
        self.rows_written.values().sum()
    }
}

/// Outcome of a complete run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub dataset_name: String,
    pub chunks_processed: usize,
    /// Processing order of the object instances.
    pub order: Vec<String>,
    pub rows_written: BTreeMap<String, usize>,
    pub aborted: Vec<AbortedInstance>,
    pub warnings: Vec<TermResolutionWarning>,
}

impl RunSummary {
    pub fn has_failures(&self) -> bool {
        !self.aborted.is_empty()
    }

    pub fn total_rows(&self) -> usize {
        self.rows_written.values().sum()
    }
}

struct Instance {
    object: Box<dyn DestinationObject>,
    definition: TableDefinition,
    /// Primary key column the pipeline fills for this object.
    generated_key: Option<String>,
}

pub struct Pipeline {
    dataset_name: String,
    instances: Vec<Instance>,
    graph: DependencyGraph,
    options: EngineOptions,
    aborted: BTreeMap<String, AbortedInstance>,
    key_counters: BTreeMap<String, u64>,
    rows_written: BTreeMap<String, usize>,
    resolution: ResolutionLog,
    chunks_processed: usize,
}

impl Pipeline {
    /// Build the objects for every rule set in `config` and order them.
    pub fn assemble(
        config: &RuleConfig,
        registry: &TableRegistry,
        options: EngineOptions,
    ) -> Result<Self> {
        registry.validate()?;

        let mut objects: Vec<Box<dyn DestinationObject>> = Vec::new();
        let mut declared: BTreeMap<&str, &str> = BTreeMap::new();
        for destination in &config.cdm {
            let definition =
                registry
                    .get(&destination.table)
                    .ok_or_else(|| ConfigError::UnknownTable {
                        table: destination.table.clone(),
                    })?;
            if let Some(first) = declared.insert(&definition.name, &destination.table) {
                return Err(ConfigError::DuplicateTable {
                    table: definition.name.clone(),
                    first: first.to_string(),
                    second: destination.table.clone(),
                }
                .into());
            }
            for (index, rule_set) in destination.rule_sets.iter().enumerate() {
                let interpreter = RuleInterpreter::new(definition, index, rule_set, options);
                if let Some(field) = rule_set
                    .destination_fields()
                    .into_iter()
                    .find(|field| !definition.has_column(field))
                {
                    return Err(ConfigError::UnknownField {
                        table: definition.name.clone(),
                        object: interpreter.name().to_string(),
                        field: field.to_string(),
                    }
                    .into());
                }
                objects.push(Box::new(interpreter));
            }
        }

        Self::with_objects(config.dataset_name.clone(), objects, registry, options)
    }

    /// Assemble a pipeline from prepared objects.
    pub fn with_objects(
        dataset_name: impl Into<String>,
        objects: Vec<Box<dyn DestinationObject>>,
        registry: &TableRegistry,
        options: EngineOptions,
    ) -> Result<Self> {
        let mut instances: Vec<Instance> = Vec::with_capacity(objects.len());
        for object in objects {
            if instances.iter().any(|i| i.object.name() == object.name()) {
                return Err(ConfigError::DuplicateObject {
                    name: object.name().to_string(),
                }
                .into());
            }
            let definition = registry
                .get(object.table())
                .cloned()
                .ok_or_else(|| ConfigError::UnknownTable {
                    table: object.table().to_string(),
                })?;
            let generated_key = definition
                .primary_key
                .clone()
                .filter(|key| definition.key_generated && !object.maps_field(key));
            instances.push(Instance {
                object,
                definition,
                generated_key,
            });
        }

        let refs: Vec<&dyn DestinationObject> =
            instances.iter().map(|i| i.object.as_ref()).collect();
        let graph = build_order(&refs)?;

        let dataset_name = dataset_name.into();
        info!(
            dataset = %dataset_name,
            objects = instances.len(),
            "pipeline assembled"
        );
        Ok(Self {
            dataset_name,
            instances,
            graph,
            options,
            aborted: BTreeMap::new(),
            key_counters: BTreeMap::new(),
            rows_written: BTreeMap::new(),
            resolution: ResolutionLog::new(options.log_data),
            chunks_processed: 0,
        })
    }

    pub fn dataset_name(&self) -> &str {
        &self.dataset_name
    }

    /// Instance names in processing order.
    pub fn order(&self) -> Vec<&str> {
        self.graph.order().collect()
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn is_aborted(&self, name: &str) -> bool {
        self.aborted.contains_key(name)
    }

    pub fn resolution(&self) -> &ResolutionLog {
        &self.resolution
    }

    /// Run every live object over one chunk.
    pub fn process_chunk(&mut self, chunk: &Chunk, writer: &mut TableWriter) -> Result<ChunkReport> {
        let span = info_span!("chunk", index = chunk.index);
        let _guard = span.enter();
        let start = Instant::now();

        let mut report = ChunkReport {
            index: chunk.index,
            ..ChunkReport::default()
        };
        let order = self.graph.indices().to_vec();
        for index in order {
            let instance = &self.instances[index];
            let name = instance.object.name();
            if self.aborted.contains_key(name) {
                debug!(object = %name, "skipping aborted object");
                continue;
            }

            let mut log = ResolutionLog::new(self.options.log_data);
            let outcome = info_span!("object", name = %name)
                .in_scope(|| instance.object.compute(chunk, &mut log));
            match outcome {
                Ok(rows) => self.commit(index, rows, log, writer, &mut report)?,
                Err(error) => self.abort(index, chunk.index, error, &mut report),
            }
        }

        self.chunks_processed += 1;
        debug!(
            rows = report.total_rows(),
            aborted = report.aborted.len(),
            duration_ms = start.elapsed().as_millis(),
            "chunk processed"
        );
        Ok(report)
    }

    /// Pull chunks until the stream is exhausted.
    pub fn run(&mut self, stream: &mut ChunkStream, writer: &mut TableWriter) -> Result<RunSummary> {
        self.run_with_progress(stream, writer, |_| {})
    }

    /// Like [`Pipeline::run`], calling `on_chunk` after every chunk.
    pub fn run_with_progress(
        &mut self,
        stream: &mut ChunkStream,
        writer: &mut TableWriter,
        mut on_chunk: impl FnMut(&ChunkReport),
    ) -> Result<RunSummary> {
        let span = info_span!("run", dataset = %self.dataset_name);
        let _guard = span.enter();
        let start = Instant::now();

        while let Some(chunk) = stream.next_chunk()? {
            let report = self.process_chunk(&chunk, writer)?;
            on_chunk(&report);
        }

        let summary = self.summary();
        info!(
            chunks = summary.chunks_processed,
            rows = summary.total_rows(),
            aborted = summary.aborted.len(),
            warnings = summary.warnings.len(),
            duration_ms = start.elapsed().as_millis(),
            "run complete"
        );
        Ok(summary)
    }

    /// Snapshot of the run so far.
    pub fn summary(&self) -> RunSummary {
        let mut aborted: Vec<AbortedInstance> = self.aborted.values().cloned().collect();
        aborted.sort_by(|a, b| (a.chunk, &a.name).cmp(&(b.chunk, &b.name)));
        RunSummary {
            dataset_name: self.dataset_name.clone(),
            chunks_processed: self.chunks_processed,
            order: self.graph.order().map(str::to_string).collect(),
            rows_written: self.rows_written.clone(),
            aborted,
            warnings: self.resolution.warnings().cloned().collect(),
        }
    }

    fn commit(
        &mut self,
        index: usize,
        mut rows: Vec<OutputRow>,
        log: ResolutionLog,
        writer: &mut TableWriter,
        report: &mut ChunkReport,
    ) -> Result<()> {
        let instance = &self.instances[index];
        let table = &instance.definition.name;
        if let Some(key) = &instance.generated_key {
            let counter = self.key_counters.entry(table.clone()).or_insert(0);
            for row in &mut rows {
                *counter += 1;
                row.insert(key.clone(), CellValue::Text(counter.to_string()));
            }
        }

        let written = writer.write(&instance.definition, &rows)?;
        self.resolution.merge(log);
        *self.rows_written.entry(table.clone()).or_default() += written;
        *report.rows_written.entry(table.clone()).or_default() += written;
        if self.options.debug {
            debug!(object = %instance.object.name(), rows = written, "object processed");
        }
        Ok(())
    }

    fn abort(&mut self, index: usize, chunk: usize, error: MappingError, report: &mut ChunkReport) {
        let instance = &self.instances[index];
        let name = instance.object.name().to_string();
        error!(
            object = %name,
            %error,
            chunk,
            "object aborted, its rows for this chunk are dropped"
        );
        let failed = AbortedInstance {
            name: name.clone(),
            table: instance.definition.name.clone(),
            chunk,
            reason: AbortReason::Failed(error),
        };
        report.aborted.push(failed.clone());
        self.aborted.insert(name.clone(), failed);

        for dependent in self.graph.dependents_of(&name) {
            if self.aborted.contains_key(&dependent) {
                continue;
            }
            let Some(table) = self
                .instances
                .iter()
                .find(|i| i.object.name() == dependent)
                .map(|i| i.definition.name.clone())
            else {
                continue;
            };
            warn!(object = %dependent, parent = %name, "object aborted with its dependency");
            let entry = AbortedInstance {
                name: dependent.clone(),
                table,
                chunk,
                reason: AbortReason::DependsOn(name.clone()),
            };
            report.aborted.push(entry.clone());
            self.aborted.insert(dependent, entry);
        }
    }
}
