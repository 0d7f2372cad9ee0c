//! Processing order of destination objects.
//!
//! An object that references a key (for example `person.person_id`) must run
//! after every object that produces that key. The order is a topological sort
//! of these edges; ties go to the object declared first, so the same
//! configuration always yields the same order.

use std::collections::{BTreeMap, BTreeSet};

use cdm_model::KeyRef;
use tracing::debug;

use crate::error::DependencyCycleError;
use crate::object::DestinationObject;

/// Dependency edges between object instances and their processing order.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    names: Vec<String>,
    order: Vec<usize>,
    dependents: Vec<BTreeSet<usize>>,
}

impl DependencyGraph {
    /// Instance names in processing order.
    pub fn order(&self) -> impl Iterator<Item = &str> + '_ {
        self.order.iter().map(|&index| self.names[index].as_str())
    }

    /// Declaration indices in processing order.
    pub fn indices(&self) -> &[usize] {
        &self.order
    }

    /// Every instance that directly or transitively depends on `name`.
    pub fn dependents_of(&self, name: &str) -> BTreeSet<String> {
        let Some(start) = self.names.iter().position(|n| n == name) else {
            return BTreeSet::new();
        };
        let mut seen = BTreeSet::new();
        let mut stack: Vec<usize> = self.dependents[start].iter().copied().collect();
        while let Some(index) = stack.pop() {
            if seen.insert(index) {
                stack.extend(self.dependents[index].iter().copied());
            }
        }
        seen.into_iter()
            .map(|index| self.names[index].clone())
            .collect()
    }

    /// Direct dependencies of `name`, in declaration order.
    pub fn dependencies_of(&self, name: &str) -> Vec<&str> {
        let Some(target) = self.names.iter().position(|n| n == name) else {
            return Vec::new();
        };
        self.dependents
            .iter()
            .enumerate()
            .filter(|(_, deps)| deps.contains(&target))
            .map(|(index, _)| self.names[index].as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Order `objects` so that key producers run before key consumers.
///
/// References between objects of the same destination table do not create
/// edges. Fails with the instances left unordered when the edges form a cycle.
pub fn build_order(
    objects: &[&dyn DestinationObject],
) -> Result<DependencyGraph, DependencyCycleError> {
    let mut providers: BTreeMap<KeyRef, Vec<usize>> = BTreeMap::new();
    for (index, object) in objects.iter().enumerate() {
        for key in object.provides() {
            providers.entry(key).or_default().push(index);
        }
    }

    let mut dependents: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); objects.len()];
    let mut in_degree = vec![0usize; objects.len()];
    for (consumer, object) in objects.iter().enumerate() {
        for key in object.requires() {
            let Some(producers) = providers.get(&key) else {
                debug!(object = object.name(), key = %key, "no object produces key");
                continue;
            };
            for &producer in producers {
                if objects[producer].table() == object.table() {
                    continue;
                }
                if dependents[producer].insert(consumer) {
                    in_degree[consumer] += 1;
                }
            }
        }
    }

    let mut ready: BTreeSet<usize> = (0..objects.len())
        .filter(|&index| in_degree[index] == 0)
        .collect();
    let mut order = Vec::with_capacity(objects.len());
    while let Some(index) = ready.pop_first() {
        order.push(index);
        for &dependent in &dependents[index] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }

    let names: Vec<String> = objects.iter().map(|o| o.name().to_string()).collect();
    if order.len() < objects.len() {
        let placed: BTreeSet<usize> = order.iter().copied().collect();
        let unresolved = (0..objects.len())
            .filter(|index| !placed.contains(index))
            .map(|index| names[index].clone())
            .collect();
        return Err(DependencyCycleError { unresolved });
    }

    let graph = DependencyGraph {
        names,
        order,
        dependents,
    };
    debug!(order = ?graph.order().collect::<Vec<_>>(), "resolved object order");
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MappingError;
    use crate::resolution::ResolutionLog;
    use cdm_ingest::Chunk;
    use cdm_model::OutputRow;

    struct Stub {
        name: &'static str,
        table: &'static str,
        provides: Vec<KeyRef>,
        requires: Vec<KeyRef>,
    }

    impl Stub {
        fn new(name: &'static str, table: &'static str) -> Self {
            Self {
                name,
                table,
                provides: Vec::new(),
                requires: Vec::new(),
            }
        }

        fn providing(mut self, table: &str, field: &str) -> Self {
            self.provides.push(KeyRef::new(table, field));
            self
        }

        fn requiring(mut self, table: &str, field: &str) -> Self {
            self.requires.push(KeyRef::new(table, field));
            self
        }
    }

    impl DestinationObject for Stub {
        fn name(&self) -> &str {
            self.name
        }

        fn table(&self) -> &str {
            self.table
        }

        fn provides(&self) -> Vec<KeyRef> {
            self.provides.clone()
        }

        fn requires(&self) -> Vec<KeyRef> {
            self.requires.clone()
        }

        fn maps_field(&self, _field: &str) -> bool {
            false
        }

        fn compute(
            &self,
            _chunk: &Chunk,
            _log: &mut ResolutionLog,
        ) -> Result<Vec<OutputRow>, MappingError> {
            Ok(Vec::new())
        }
    }

    fn order(objects: &[Stub]) -> Result<Vec<String>, DependencyCycleError> {
        let refs: Vec<&dyn DestinationObject> =
            objects.iter().map(|o| o as &dyn DestinationObject).collect();
        build_order(&refs).map(|graph| graph.order().map(str::to_string).collect())
    }

    #[test]
    fn producers_run_before_consumers() {
        let objects = vec![
            Stub::new("condition_occurrence_0", "condition_occurrence")
                .requiring("person", "person_id"),
            Stub::new("person_0", "person").providing("person", "person_id"),
            Stub::new("person_1", "person").providing("person", "person_id"),
        ];
        assert_eq!(
            order(&objects).unwrap(),
            vec!["person_0", "person_1", "condition_occurrence_0"]
        );
    }

    #[test]
    fn independent_objects_keep_declaration_order() {
        let objects = vec![
            Stub::new("observation_0", "observation"),
            Stub::new("measurement_0", "measurement"),
            Stub::new("death_0", "death"),
        ];
        assert_eq!(
            order(&objects).unwrap(),
            vec!["observation_0", "measurement_0", "death_0"]
        );
    }

    #[test]
    fn same_table_references_do_not_create_edges() {
        let objects = vec![
            Stub::new("visit_occurrence_0", "visit_occurrence")
                .providing("visit_occurrence", "visit_occurrence_id")
                .requiring("visit_occurrence", "visit_occurrence_id"),
        ];
        assert_eq!(order(&objects).unwrap(), vec!["visit_occurrence_0"]);
    }

    #[test]
    fn cycle_names_unordered_instances() {
        let objects = vec![
            Stub::new("a_0", "a").providing("a", "id").requiring("b", "id"),
            Stub::new("b_0", "b").providing("b", "id").requiring("a", "id"),
            Stub::new("c_0", "c"),
        ];
        let err = order(&objects).unwrap_err();
        assert_eq!(err.unresolved, vec!["a_0", "b_0"]);
    }

    #[test]
    fn dependents_are_transitive() {
        let objects = vec![
            Stub::new("person_0", "person").providing("person", "person_id"),
            Stub::new("visit_occurrence_0", "visit_occurrence")
                .providing("visit_occurrence", "visit_occurrence_id")
                .requiring("person", "person_id"),
            Stub::new("condition_occurrence_0", "condition_occurrence")
                .requiring("visit_occurrence", "visit_occurrence_id"),
            Stub::new("death_0", "death"),
        ];
        let refs: Vec<&dyn DestinationObject> =
            objects.iter().map(|o| o as &dyn DestinationObject).collect();
        let graph = build_order(&refs).unwrap();
        let dependents = graph.dependents_of("person_0");
        assert!(dependents.contains("visit_occurrence_0"));
        assert!(dependents.contains("condition_occurrence_0"));
        assert!(!dependents.contains("death_0"));
        assert_eq!(graph.dependencies_of("condition_occurrence_0"), vec!["visit_occurrence_0"]);
    }
}
