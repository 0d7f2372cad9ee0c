//! Concept index: which source values map to which concept ids.
//!
//! The index inverts the term mappings of one or more rule configurations.
//! For every concept id it records a display name, the destination table
//! (its domain) and the set of source descriptors that produce it.
//!
//! The first rule to mention a concept id fixes its name and domain. Later
//! rules that disagree are kept out of the entry and recorded as
//! [`ConceptConflict`]s, each logged at `warn`.
//!
//! Entries and their sources keep first-seen order.

use indexmap::IndexMap;
use serde::Serialize;
use tracing::warn;

use cdm_model::{ConceptEntry, ConceptId, FlatConcept, RuleConfig, SourceDescriptor};

/// Two rules disagreeing on the metadata of one concept id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConceptConflict {
    pub concept_id: ConceptId,
    pub kept_name: String,
    pub kept_domain: String,
    pub ignored_name: String,
    pub ignored_domain: String,
}

/// Read-only lookup from concept id to its name, domain and sources.
///
/// Serializes as `{"entries": {concept_id: entry}, "conflicts": [...]}`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConceptIndex {
    entries: IndexMap<ConceptId, ConceptEntry>,
    conflicts: Vec<ConceptConflict>,
}

impl ConceptIndex {
    pub fn get(&self, id: &ConceptId) -> Option<&ConceptEntry> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in the order their concept id was first seen.
    pub fn entries(&self) -> impl Iterator<Item = &ConceptEntry> + '_ {
        self.entries.values()
    }

    pub fn conflicts(&self) -> &[ConceptConflict] {
        &self.conflicts
    }

    fn record(&mut self, occurrence: FlatConcept) {
        let name = display_name(&occurrence.concept_name).to_string();
        match self.entries.get_mut(&occurrence.concept_id) {
            Some(entry) => {
                if entry.concept_name != name || entry.domain != occurrence.domain {
                    let conflict = ConceptConflict {
                        concept_id: occurrence.concept_id.clone(),
                        kept_name: entry.concept_name.clone(),
                        kept_domain: entry.domain.clone(),
                        ignored_name: name,
                        ignored_domain: occurrence.domain.clone(),
                    };
                    if !self.conflicts.contains(&conflict) {
                        warn!(
                            concept_id = %conflict.concept_id,
                            kept_name = %conflict.kept_name,
                            kept_domain = %conflict.kept_domain,
                            ignored_name = %conflict.ignored_name,
                            ignored_domain = %conflict.ignored_domain,
                            "conflicting metadata for concept, keeping first"
                        );
                        self.conflicts.push(conflict);
                    }
                }
                if !entry.sources.contains(&occurrence.source) {
                    entry.sources.push(occurrence.source);
                }
            }
            None => {
                self.entries.insert(
                    occurrence.concept_id.clone(),
                    ConceptEntry {
                        concept_id: occurrence.concept_id,
                        concept_name: name,
                        domain: occurrence.domain,
                        sources: vec![occurrence.source],
                    },
                );
            }
        }
    }
}

/// Builds the grouped concept index from every loaded configuration.
pub fn build_index(configs: &[RuleConfig]) -> ConceptIndex {
    let mut index = ConceptIndex::default();
    for occurrence in flatten(configs) {
        index.record(occurrence);
    }
    index
}

/// Lists every concept occurrence, ungrouped, in declaration order.
pub fn flatten(configs: &[RuleConfig]) -> Vec<FlatConcept> {
    let mut occurrences = Vec::new();
    for config in configs {
        for entry in config.entries() {
            let Some(mapping) = &entry.rule.term_mapping else {
                continue;
            };
            for (source_value, concept_id) in mapping.pairs() {
                occurrences.push(FlatConcept {
                    concept_id: concept_id.clone(),
                    concept_name: entry.concept.to_string(),
                    domain: entry.table.to_string(),
                    source: SourceDescriptor {
                        source_field: entry.rule.source_field.clone(),
                        source_table: entry.rule.source_table.clone(),
                        source_dataset: config.dataset_name.clone(),
                        source_value: source_value.map(str::to_string),
                    },
                });
            }
        }
    }
    occurrences
}

/// Concept names carry a trailing id token ("MALE 8507"); drop it.
pub fn display_name(concept_name: &str) -> &str {
    concept_name
        .rsplit_once(' ')
        .map_or(concept_name, |(head, _)| head)
}
