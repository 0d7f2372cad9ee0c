//! Rule-driven destination objects.

use std::collections::BTreeSet;

use cdm_ingest::{Chunk, SourceTable};
use cdm_model::{
    CellValue, ConceptGroup, FieldMapping, KeyRef, OutputRow, RuleSet, TableDefinition,
    TermMapping,
};
use tracing::trace;

use crate::error::MappingError;
use crate::object::DestinationObject;
use crate::operations::apply_all;
use crate::options::EngineOptions;
use crate::resolution::{MissSite, ResolutionLog};

/// Builds destination rows from one rule set.
///
/// Every concept group in the rule set produces one row per row of its
/// driving source table, which is the table named by the group's first field
/// rule. Other source tables used by the group are aligned by row position.
#[derive(Debug, Clone)]
pub struct RuleInterpreter {
    name: String,
    definition: TableDefinition,
    rule_set: RuleSet,
    options: EngineOptions,
}

struct ResolvedField<'c> {
    mapping: &'c FieldMapping,
    table: &'c SourceTable,
    column: usize,
}

impl RuleInterpreter {
    pub fn new(
        definition: &TableDefinition,
        index: usize,
        rule_set: &RuleSet,
        options: EngineOptions,
    ) -> Self {
        Self {
            name: format!("{}_{index}", definition.name),
            definition: definition.clone(),
            rule_set: rule_set.clone(),
            options,
        }
    }

    pub fn definition(&self) -> &TableDefinition {
        &self.definition
    }

    pub fn rule_set(&self) -> &RuleSet {
        &self.rule_set
    }

    fn resolve<'c>(
        &self,
        chunk: &'c Chunk,
        mapping: &'c FieldMapping,
    ) -> Result<ResolvedField<'c>, MappingError> {
        let rule = &mapping.rule;
        let table = chunk
            .table(&rule.source_table)
            .ok_or_else(|| MappingError::MissingSourceTable {
                table: self.definition.name.clone(),
                instance: self.name.clone(),
                field: mapping.destination_field.clone(),
                source_table: rule.source_table.clone(),
            })?;
        let column = table.column_index(&rule.source_field).ok_or_else(|| {
            MappingError::MissingSourceColumn {
                table: self.definition.name.clone(),
                instance: self.name.clone(),
                field: mapping.destination_field.clone(),
                source_table: rule.source_table.clone(),
                source_field: rule.source_field.clone(),
            }
        })?;
        Ok(ResolvedField {
            mapping,
            table,
            column,
        })
    }

    fn evaluate(&self, field: &ResolvedField<'_>, row: usize, log: &mut ResolutionLog) -> CellValue {
        let rule = &field.mapping.rule;
        let raw = field.table.value(row, field.column).unwrap_or("");
        match &rule.term_mapping {
            Some(TermMapping::Constant(id)) => CellValue::from(id),
            Some(TermMapping::Lookup(values)) => {
                let raw = raw.trim();
                if raw.is_empty() {
                    return CellValue::Missing;
                }
                match values.get(raw) {
                    Some(id) => CellValue::from(id),
                    None => {
                        log.record(
                            MissSite {
                                instance: &self.name,
                                table: &self.definition.name,
                                destination_field: &field.mapping.destination_field,
                                source_table: &rule.source_table,
                                source_field: &rule.source_field,
                            },
                            raw,
                        );
                        CellValue::Missing
                    }
                }
            }
            None => apply_all(&rule.operations, CellValue::from_raw(raw)),
        }
    }

    fn compute_group(
        &self,
        chunk: &Chunk,
        group: &ConceptGroup,
        log: &mut ResolutionLog,
        rows: &mut Vec<OutputRow>,
    ) -> Result<(), MappingError> {
        let fields = group
            .fields
            .iter()
            .map(|mapping| self.resolve(chunk, mapping))
            .collect::<Result<Vec<_>, _>>()?;
        let Some(driving) = fields.first() else {
            return Ok(());
        };

        for index in 0..driving.table.len() {
            let row: OutputRow = fields
                .iter()
                .map(|field| {
                    (
                        field.mapping.destination_field.clone(),
                        self.evaluate(field, index, log),
                    )
                })
                .collect();
            if self.options.debug {
                if self.options.log_data {
                    trace!(instance = %self.name, concept = %group.name, row = index, values = ?row, "row");
                } else {
                    trace!(instance = %self.name, concept = %group.name, row = index, fields = row.len(), "row");
                }
            }
            rows.push(row);
        }
        Ok(())
    }
}

impl DestinationObject for RuleInterpreter {
    fn name(&self) -> &str {
        &self.name
    }

    fn table(&self) -> &str {
        &self.definition.name
    }

    fn provides(&self) -> Vec<KeyRef> {
        match (&self.definition.primary_key, self.definition.primary_key_ref()) {
            (Some(key), Some(key_ref)) if self.definition.key_generated || self.maps_field(key) => {
                vec![key_ref]
            }
            _ => Vec::new(),
        }
    }

    fn requires(&self) -> Vec<KeyRef> {
        let keys: BTreeSet<KeyRef> = self
            .rule_set
            .destination_fields()
            .into_iter()
            .filter_map(|field| self.definition.foreign_key(field))
            .map(|fk| fk.references.clone())
            .collect();
        keys.into_iter().collect()
    }

    fn maps_field(&self, field: &str) -> bool {
        self.rule_set
            .concepts
            .iter()
            .flat_map(|group| &group.fields)
            .any(|mapping| mapping.destination_field == field)
    }

    fn compute(
        &self,
        chunk: &Chunk,
        log: &mut ResolutionLog,
    ) -> Result<Vec<OutputRow>, MappingError> {
        let mut rows = Vec::new();
        for group in &self.rule_set.concepts {
            self.compute_group(chunk, group, log, &mut rows)?;
        }
        Ok(rows)
    }
}
