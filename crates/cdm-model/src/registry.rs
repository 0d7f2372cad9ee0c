//! Destination-table definitions and registry.
//!
//! Each supported destination table is described by a [`TableDefinition`]:
//! its fixed column order, its primary key and the foreign keys that point at
//! other tables. The [`TableRegistry`] indexes definitions by table name.
//!
//! # Architecture
//!
//! The supported tables are registered explicitly in
//! [`TableRegistry::default_tables`]. [`default_registry()`] returns that
//! registry, validated and cached. Tests and other data models can build
//! their own registry with [`TableRegistry::new`] and
//! [`TableRegistry::register`].
//!
//! # Supported Tables
//!
//! | Table | Primary key | References |
//! |-------|-------------|------------|
//! | person | person_id (source) | - |
//! | observation_period | observation_period_id | person |
//! | visit_occurrence | visit_occurrence_id | person |
//! | condition_occurrence | condition_occurrence_id | person, visit_occurrence |
//! | drug_exposure | drug_exposure_id | person, visit_occurrence |
//! | procedure_occurrence | procedure_occurrence_id | person, visit_occurrence |
//! | device_exposure | device_exposure_id | person, visit_occurrence |
//! | measurement | measurement_id | person, visit_occurrence |
//! | observation | observation_id | person, visit_occurrence |
//! | death | - | person |
//! | specimen | specimen_id | person |

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::OnceLock;

use crate::error::{ModelError, Result};

/// A `table.field` key that one destination object produces and others consume.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyRef {
    pub table: String,
    pub field: String,
}

impl KeyRef {
    pub fn new(table: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            field: field.into(),
        }
    }
}

impl fmt::Display for KeyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.field)
    }
}

/// A column holding the key of another table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub column: String,
    pub references: KeyRef,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDefinition {
    pub name: String,
    pub description: String,
    /// Output column order.
    pub columns: Vec<String>,
    pub primary_key: Option<String>,
    /// True when the engine assigns the primary key if no rule maps it.
    pub key_generated: bool,
    pub foreign_keys: Vec<ForeignKey>,
}

impl TableDefinition {
    pub fn new(name: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
            primary_key: None,
            key_generated: false,
            foreign_keys: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Primary key supplied by the source data.
    #[must_use]
    pub fn with_source_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = Some(column.into());
        self.key_generated = false;
        self
    }

    /// Primary key assigned by the engine when unmapped.
    #[must_use]
    pub fn with_generated_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = Some(column.into());
        self.key_generated = true;
        self
    }

    #[must_use]
    pub fn with_foreign_key(
        mut self,
        column: impl Into<String>,
        table: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        self.foreign_keys.push(ForeignKey {
            column: column.into(),
            references: KeyRef::new(table, key),
        });
        self
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn foreign_key(&self, column: &str) -> Option<&ForeignKey> {
        self.foreign_keys.iter().find(|fk| fk.column == column)
    }

    pub fn primary_key_ref(&self) -> Option<KeyRef> {
        self.primary_key
            .as_ref()
            .map(|key| KeyRef::new(self.name.clone(), key.clone()))
    }
}

/// Registry of destination tables indexed by lowercase table name.
#[derive(Debug, Clone, Default)]
pub struct TableRegistry {
    tables: BTreeMap<String, TableDefinition>,
}

impl TableRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a definition, replacing any previous one with the same name.
    pub fn register(&mut self, definition: TableDefinition) {
        self.tables
            .insert(definition.name.to_lowercase(), definition);
    }

    /// Case-insensitive lookup.
    pub fn get(&self, name: &str) -> Option<&TableDefinition> {
        self.tables.get(&name.trim().to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.tables.values().map(|t| t.name.as_str())
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableDefinition> + '_ {
        self.tables.values()
    }

    /// Checks that every definition is complete and every reference resolves.
    pub fn validate(&self) -> Result<()> {
        for table in self.tables.values() {
            if table.columns.is_empty() {
                return Err(ModelError::EmptyTable {
                    table: table.name.clone(),
                });
            }
            let mut seen = BTreeSet::new();
            for column in &table.columns {
                if !seen.insert(column.as_str()) {
                    return Err(ModelError::DuplicateColumn {
                        table: table.name.clone(),
                        column: column.clone(),
                    });
                }
            }
            if let Some(key) = &table.primary_key
                && !table.has_column(key)
            {
                return Err(ModelError::UnknownPrimaryKey {
                    table: table.name.clone(),
                    key: key.clone(),
                });
            }
            for fk in &table.foreign_keys {
                if !table.has_column(&fk.column) {
                    return Err(ModelError::UnknownForeignKeyColumn {
                        table: table.name.clone(),
                        column: fk.column.clone(),
                    });
                }
                let Some(target) = self.get(&fk.references.table) else {
                    return Err(ModelError::UnknownReferencedTable {
                        table: table.name.clone(),
                        column: fk.column.clone(),
                        target: fk.references.table.clone(),
                    });
                };
                if target.primary_key.as_deref() != Some(fk.references.field.as_str()) {
                    return Err(ModelError::ReferenceNotPrimaryKey {
                        table: table.name.clone(),
                        column: fk.column.clone(),
                        target: fk.references.table.clone(),
                        key: fk.references.field.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Builds the registry of supported destination tables.
    pub fn default_tables() -> Self {
        let mut registry = Self::new();
        registry.register(person());
        registry.register(observation_period());
        registry.register(visit_occurrence());
        registry.register(condition_occurrence());
        registry.register(drug_exposure());
        registry.register(procedure_occurrence());
        registry.register(device_exposure());
        registry.register(measurement());
        registry.register(observation());
        registry.register(death());
        registry.register(specimen());
        registry
    }
}

static DEFAULT_REGISTRY: OnceLock<TableRegistry> = OnceLock::new();

/// Returns the validated registry of supported destination tables.
///
/// # Panics
///
/// Panics if the built-in definitions fail [`TableRegistry::validate`];
/// the registry tests guard against that.
pub fn default_registry() -> &'static TableRegistry {
    DEFAULT_REGISTRY.get_or_init(|| {
        let registry = TableRegistry::default_tables();
        if let Err(error) = registry.validate() {
            panic!("built-in table registry is inconsistent: {error}");
        }
        registry
    })
}

fn person() -> TableDefinition {
    TableDefinition::new(
        "person",
        &[
            "person_id",
            "gender_concept_id",
            "year_of_birth",
            "month_of_birth",
            "day_of_birth",
            "birth_datetime",
            "race_concept_id",
            "ethnicity_concept_id",
            "location_id",
            "provider_id",
            "care_site_id",
            "person_source_value",
            "gender_source_value",
            "gender_source_concept_id",
            "race_source_value",
            "race_source_concept_id",
            "ethnicity_source_value",
            "ethnicity_source_concept_id",
        ],
    )
    .with_description("Demographics of each person")
    .with_source_key("person_id")
}

fn observation_period() -> TableDefinition {
    TableDefinition::new(
        "observation_period",
        &[
            "observation_period_id",
            "person_id",
            "observation_period_start_date",
            "observation_period_end_date",
            "period_type_concept_id",
        ],
    )
    .with_description("Spans of time a person is observed")
    .with_generated_key("observation_period_id")
    .with_foreign_key("person_id", "person", "person_id")
}

fn visit_occurrence() -> TableDefinition {
    TableDefinition::new(
        "visit_occurrence",
        &[
            "visit_occurrence_id",
            "person_id",
            "visit_concept_id",
            "visit_start_date",
            "visit_start_datetime",
            "visit_end_date",
            "visit_end_datetime",
            "visit_type_concept_id",
            "provider_id",
            "care_site_id",
            "visit_source_value",
            "visit_source_concept_id",
            "admitting_source_concept_id",
            "admitting_source_value",
            "discharge_to_concept_id",
            "discharge_to_source_value",
            "preceding_visit_occurrence_id",
        ],
    )
    .with_description("Encounters with the health care system")
    .with_generated_key("visit_occurrence_id")
    .with_foreign_key("person_id", "person", "person_id")
}

fn condition_occurrence() -> TableDefinition {
    TableDefinition::new(
        "condition_occurrence",
        &[
            "condition_occurrence_id",
            "person_id",
            "condition_concept_id",
            "condition_start_date",
            "condition_start_datetime",
            "condition_end_date",
            "condition_end_datetime",
            "condition_type_concept_id",
            "stop_reason",
            "provider_id",
            "visit_occurrence_id",
            "visit_detail_id",
            "condition_source_value",
            "condition_source_concept_id",
            "condition_status_source_value",
            "condition_status_concept_id",
        ],
    )
    .with_description("Diagnoses, signs and symptoms")
    .with_generated_key("condition_occurrence_id")
    .with_foreign_key("person_id", "person", "person_id")
    .with_foreign_key("visit_occurrence_id", "visit_occurrence", "visit_occurrence_id")
}

fn drug_exposure() -> TableDefinition {
    TableDefinition::new(
        "drug_exposure",
        &[
            "drug_exposure_id",
            "person_id",
            "drug_concept_id",
            "drug_exposure_start_date",
            "drug_exposure_start_datetime",
            "drug_exposure_end_date",
            "drug_exposure_end_datetime",
            "verbatim_end_date",
            "drug_type_concept_id",
            "stop_reason",
            "refills",
            "quantity",
            "days_supply",
            "sig",
            "route_concept_id",
            "lot_number",
            "provider_id",
            "visit_occurrence_id",
            "visit_detail_id",
            "drug_source_value",
            "drug_source_concept_id",
            "route_source_value",
            "dose_unit_source_value",
        ],
    )
    .with_description("Exposure to a drug")
    .with_generated_key("drug_exposure_id")
    .with_foreign_key("person_id", "person", "person_id")
    .with_foreign_key("visit_occurrence_id", "visit_occurrence", "visit_occurrence_id")
}

fn procedure_occurrence() -> TableDefinition {
    TableDefinition::new(
        "procedure_occurrence",
        &[
            "procedure_occurrence_id",
            "person_id",
            "procedure_concept_id",
            "procedure_date",
            "procedure_datetime",
            "procedure_type_concept_id",
            "modifier_concept_id",
            "quantity",
            "provider_id",
            "visit_occurrence_id",
            "visit_detail_id",
            "procedure_source_value",
            "procedure_source_concept_id",
            "modifier_source_value",
        ],
    )
    .with_description("Procedures performed")
    .with_generated_key("procedure_occurrence_id")
    .with_foreign_key("person_id", "person", "person_id")
    .with_foreign_key("visit_occurrence_id", "visit_occurrence", "visit_occurrence_id")
}

fn device_exposure() -> TableDefinition {
    TableDefinition::new(
        "device_exposure",
        &[
            "device_exposure_id",
            "person_id",
            "device_concept_id",
            "device_exposure_start_date",
            "device_exposure_start_datetime",
            "device_exposure_end_date",
            "device_exposure_end_datetime",
            "device_type_concept_id",
            "unique_device_id",
            "quantity",
            "provider_id",
            "visit_occurrence_id",
            "visit_detail_id",
            "device_source_value",
            "device_source_concept_id",
        ],
    )
    .with_description("Exposure to a device")
    .with_generated_key("device_exposure_id")
    .with_foreign_key("person_id", "person", "person_id")
    .with_foreign_key("visit_occurrence_id", "visit_occurrence", "visit_occurrence_id")
}

fn measurement() -> TableDefinition {
    TableDefinition::new(
        "measurement",
        &[
            "measurement_id",
            "person_id",
            "measurement_concept_id",
            "measurement_date",
            "measurement_datetime",
            "measurement_time",
            "measurement_type_concept_id",
            "operator_concept_id",
            "value_as_number",
            "value_as_concept_id",
            "unit_concept_id",
            "range_low",
            "range_high",
            "provider_id",
            "visit_occurrence_id",
            "visit_detail_id",
            "measurement_source_value",
            "measurement_source_concept_id",
            "unit_source_value",
            "value_source_value",
        ],
    )
    .with_description("Laboratory tests and other measurements")
    .with_generated_key("measurement_id")
    .with_foreign_key("person_id", "person", "person_id")
    .with_foreign_key("visit_occurrence_id", "visit_occurrence", "visit_occurrence_id")
}

fn observation() -> TableDefinition {
    TableDefinition::new(
        "observation",
        &[
            "observation_id",
            "person_id",
            "observation_concept_id",
            "observation_date",
            "observation_datetime",
            "observation_type_concept_id",
            "value_as_number",
            "value_as_string",
            "value_as_concept_id",
            "qualifier_concept_id",
            "unit_concept_id",
            "provider_id",
            "visit_occurrence_id",
            "visit_detail_id",
            "observation_source_value",
            "observation_source_concept_id",
            "unit_source_value",
            "qualifier_source_value",
        ],
    )
    .with_description("Clinical facts not captured elsewhere")
    .with_generated_key("observation_id")
    .with_foreign_key("person_id", "person", "person_id")
    .with_foreign_key("visit_occurrence_id", "visit_occurrence", "visit_occurrence_id")
}

fn death() -> TableDefinition {
    TableDefinition::new(
        "death",
        &[
            "person_id",
            "death_date",
            "death_datetime",
            "death_type_concept_id",
            "cause_concept_id",
            "cause_source_value",
            "cause_source_concept_id",
        ],
    )
    .with_description("Date and cause of death")
    .with_foreign_key("person_id", "person", "person_id")
}

fn specimen() -> TableDefinition {
    TableDefinition::new(
        "specimen",
        &[
            "specimen_id",
            "person_id",
            "specimen_concept_id",
            "specimen_type_concept_id",
            "specimen_date",
            "specimen_datetime",
            "quantity",
            "unit_concept_id",
            "anatomic_site_concept_id",
            "disease_status_concept_id",
            "specimen_source_id",
            "specimen_source_value",
            "unit_source_value",
            "anatomic_site_source_value",
            "disease_status_source_value",
        ],
    )
    .with_description("Biological samples taken from a person")
    .with_generated_key("specimen_id")
    .with_foreign_key("person_id", "person", "person_id")
}
