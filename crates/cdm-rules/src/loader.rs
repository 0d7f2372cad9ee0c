//! Rule document loading.
//!
//! Parses a JSON rule document into a [`RuleConfig`], checking the structure
//! as it goes so that every [`ConfigError`] names the offending location,
//! e.g. `cdm.person[0].MALE 3025.person_id`.
//!
//! A destination table holds either a list of rule sets or, as exported by
//! the rule registry, an object of concepts. In the second shape every
//! concept becomes a rule set of its own:
//!
//! ```json
//! { "cdm": { "condition_occurrence": { "Headache 378253": { "person_id": { ... } } } } }
//! ```

use std::path::Path;

use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::debug;

use cdm_model::{
    ConceptGroup, ConceptId, DestinationRules, FieldMapping, FieldOperation, FieldRule,
    RuleConfig, RuleSet, TermMapping, normalize_name,
};

use crate::error::{ConfigError, Result};

/// Reads and parses a rule document from disk.
pub fn load_rules(path: &Path) -> Result<RuleConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
    let config = parse_rules(&contents)?;
    debug!(
        path = %path.display(),
        dataset = %config.dataset_name,
        tables = config.cdm.len(),
        objects = config.rule_set_count(),
        "loaded rule configuration"
    );
    Ok(config)
}

/// Parses a rule document held in memory.
pub fn parse_rules(contents: &str) -> Result<RuleConfig> {
    let value: Value =
        serde_json::from_str(contents).map_err(|source| ConfigError::Json { source })?;
    rules_from_value(&value)
}

/// Builds a rule configuration from already-parsed JSON.
///
/// Accepts `dataset_name` at the top level, or `metadata.dataset` as written
/// by the upstream rule registry. The top-level key wins when both exist.
pub fn rules_from_value(value: &Value) -> Result<RuleConfig> {
    let root = value
        .as_object()
        .ok_or_else(|| ConfigError::invalid_type("$", "an object"))?;

    let dataset_name = dataset_name(root)?;

    let cdm = root
        .get("cdm")
        .ok_or_else(|| ConfigError::missing("cdm", "$"))?
        .as_object()
        .ok_or_else(|| ConfigError::invalid_type("cdm", "an object of destination tables"))?;

    let mut destinations = Vec::with_capacity(cdm.len());
    for (table, rule_sets) in cdm {
        let table = normalize_name(table);
        let location = format!("cdm.{table}");
        let parsed = match rule_sets {
            Value::Array(list) => {
                let mut parsed = Vec::with_capacity(list.len());
                for (index, rule_set) in list.iter().enumerate() {
                    parsed.push(parse_rule_set(rule_set, &format!("{location}[{index}]"))?);
                }
                parsed
            }
            Value::Object(concepts) => {
                let mut parsed = Vec::with_capacity(concepts.len());
                for (concept, fields) in concepts {
                    let group = parse_concept(concept, fields, &location)?;
                    parsed.push(RuleSet {
                        concepts: vec![group],
                    });
                }
                parsed
            }
            _ => {
                return Err(ConfigError::invalid_type(
                    &location,
                    "a list of rule sets or an object of concepts",
                ));
            }
        };
        destinations.push(DestinationRules {
            table,
            rule_sets: parsed,
        });
    }

    Ok(RuleConfig {
        dataset_name,
        cdm: destinations,
    })
}

/// Lists, per destination table, the concept names declared across its rule
/// sets. Tables and names keep their declaration order.
pub fn list_objects(config: &RuleConfig) -> IndexMap<String, Vec<String>> {
    let mut objects: IndexMap<String, Vec<String>> = IndexMap::new();
    for destination in &config.cdm {
        let names = objects.entry(destination.table.clone()).or_default();
        for rule_set in &destination.rule_sets {
            names.extend(rule_set.concepts.iter().map(|c| c.name.clone()));
        }
    }
    objects
}

fn dataset_name(root: &Map<String, Value>) -> Result<String> {
    if let Some(name) = root.get("dataset_name") {
        return name
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ConfigError::invalid_type("dataset_name", "a string"));
    }
    match root.get("metadata").and_then(|m| m.get("dataset")) {
        Some(name) => name
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ConfigError::invalid_type("metadata.dataset", "a string")),
        None => Err(ConfigError::missing("dataset_name", "$")),
    }
}

fn parse_rule_set(value: &Value, location: &str) -> Result<RuleSet> {
    let concepts = value
        .as_object()
        .ok_or_else(|| ConfigError::invalid_type(location, "an object of concepts"))?;
    let mut groups = Vec::with_capacity(concepts.len());
    for (concept, fields) in concepts {
        groups.push(parse_concept(concept, fields, location)?);
    }
    Ok(RuleSet { concepts: groups })
}

fn parse_concept(concept: &str, fields: &Value, location: &str) -> Result<ConceptGroup> {
    let concept_location = format!("{location}.{concept}");
    let fields = fields
        .as_object()
        .ok_or_else(|| ConfigError::invalid_type(&concept_location, "an object of fields"))?;
    let mut mappings = Vec::with_capacity(fields.len());
    for (field, rule) in fields {
        let field = normalize_name(field);
        let rule = parse_field_rule(rule, &format!("{concept_location}.{field}"))?;
        mappings.push(FieldMapping {
            destination_field: field,
            rule,
        });
    }
    Ok(ConceptGroup {
        name: concept.trim().to_string(),
        fields: mappings,
    })
}

fn parse_field_rule(value: &Value, location: &str) -> Result<FieldRule> {
    let rule = value
        .as_object()
        .ok_or_else(|| ConfigError::invalid_type(location, "a field rule object"))?;
    let source_table = required_string(rule, "source_table", location)?;
    let source_field = required_string(rule, "source_field", location)?;

    let term_mapping = match rule.get("term_mapping") {
        None | Some(Value::Null) => None,
        Some(mapping) => Some(parse_term_mapping(mapping, location)?),
    };

    let operations = match rule.get("operations") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => {
            let mut ops = Vec::with_capacity(items.len());
            for item in items {
                let name = item.as_str().ok_or_else(|| {
                    ConfigError::invalid_type(format!("{location}.operations"), "operation names")
                })?;
                let op: FieldOperation =
                    name.parse().map_err(|_| ConfigError::UnknownOperation {
                        location: location.to_string(),
                        name: name.to_string(),
                    })?;
                ops.push(op);
            }
            ops
        }
        Some(_) => {
            return Err(ConfigError::invalid_type(
                format!("{location}.operations"),
                "a list of operation names",
            ));
        }
    };

    Ok(FieldRule {
        source_table: normalize_name(&source_table),
        source_field: normalize_name(&source_field),
        term_mapping,
        operations,
    })
}

fn required_string(rule: &Map<String, Value>, key: &str, location: &str) -> Result<String> {
    match rule.get(key) {
        Some(Value::String(value)) if !value.trim().is_empty() => Ok(value.clone()),
        Some(Value::String(_)) | None | Some(Value::Null) => {
            Err(ConfigError::missing(key, location))
        }
        Some(_) => Err(ConfigError::invalid_type(
            format!("{location}.{key}"),
            "a string",
        )),
    }
}

fn parse_term_mapping(value: &Value, location: &str) -> Result<TermMapping> {
    if let Value::Object(values) = value {
        let mut lookup = IndexMap::with_capacity(values.len());
        for (source_value, concept) in values {
            let id = concept_id(concept).ok_or_else(|| ConfigError::InvalidTermMapping {
                location: location.to_string(),
                reason: format!("value for '{source_value}' is not a concept id"),
            })?;
            lookup.insert(source_value.trim().to_string(), id);
        }
        return Ok(TermMapping::Lookup(lookup));
    }
    concept_id(value)
        .map(TermMapping::Constant)
        .ok_or_else(|| ConfigError::InvalidTermMapping {
            location: location.to_string(),
            reason: "expected a concept id or an object of concept ids".to_string(),
        })
}

fn concept_id(value: &Value) -> Option<ConceptId> {
    match value {
        Value::Number(number) => number.as_i64().map(ConceptId::Number),
        Value::String(code) if !code.trim().is_empty() => {
            Some(ConceptId::Code(code.trim().to_string()))
        }
        _ => None,
    }
}
