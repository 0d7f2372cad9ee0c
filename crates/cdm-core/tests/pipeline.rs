use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use cdm_core::{
    AbortReason, CoreError, DestinationObject, EngineOptions, Pipeline, RuleInterpreter,
    RunSummary,
};
use cdm_ingest::{ChunkOptions, ChunkStream};
use cdm_model::{TableDefinition, TableRegistry, default_registry};
use cdm_output::{TableWriter, WriterOptions};
use cdm_rules::{ConfigError, parse_rules};
use proptest::prelude::*;
use tracing_subscriber::fmt::MakeWriter;

struct Run {
    summary: RunSummary,
    counts: BTreeMap<String, usize>,
    out: PathBuf,
    _dir: tempfile::TempDir,
}

impl Run {
    fn table(&self, name: &str) -> String {
        fs::read_to_string(self.out.join(format!("{name}.tsv"))).unwrap_or_default()
    }

    /// Values of one column, header excluded.
    fn column(&self, table: &str, column: &str) -> Vec<String> {
        let contents = self.table(table);
        let mut lines = contents.lines();
        let header: Vec<&str> = lines.next().unwrap().split('\t').collect();
        let index = header.iter().position(|h| *h == column).unwrap();
        lines
            .map(|line| line.split('\t').nth(index).unwrap_or("").to_string())
            .collect()
    }
}

fn write_sources(dir: &Path, sources: &[(&str, &str)]) -> BTreeMap<String, PathBuf> {
    sources
        .iter()
        .map(|(name, contents)| {
            let path = dir.join(format!("{name}.csv"));
            fs::write(&path, contents).unwrap();
            ((*name).to_string(), path)
        })
        .collect()
}

fn run(rules: &str, sources: &[(&str, &str)], chunk_size: Option<usize>) -> Run {
    let dir = tempfile::tempdir().unwrap();
    let sources = write_sources(dir.path(), sources);
    let out = dir.path().join("out");

    let config = parse_rules(rules).unwrap();
    let mut pipeline =
        Pipeline::assemble(&config, default_registry(), EngineOptions::default()).unwrap();
    let mut options = ChunkOptions::default();
    if let Some(size) = chunk_size {
        options = options.with_chunk_size(size);
    }
    let mut stream = ChunkStream::open(sources, options).unwrap();
    let mut writer = TableWriter::new(&out, WriterOptions::default()).unwrap();
    let summary = pipeline.run(&mut stream, &mut writer).unwrap();
    let counts = writer.finalize().unwrap();
    Run {
        summary,
        counts,
        out,
        _dir: dir,
    }
}

#[test]
fn person_ids_pass_through() {
    let rules = r#"{"dataset_name":"d1","cdm":{"person":[{"person":{"person_id":{"source_table":"t1","source_field":"id"}}}]}}"#;
    let run = run(rules, &[("t1", "id\n1\n2\n3\n")], None);

    assert_eq!(run.column("person", "person_id"), vec!["1", "2", "3"]);
    assert_eq!(run.table("person").lines().filter(|l| l.starts_with("person_id")).count(), 1);
    assert_eq!(run.counts.get("person"), Some(&3));
    assert!(run.summary.warnings.is_empty());
    assert!(!run.summary.has_failures());
}

#[test]
fn unmapped_lookup_value_is_null_with_one_warning() {
    let rules = r#"{"dataset_name":"d1","cdm":{"person":[{"gender":{
        "person_id":{"source_table":"t1","source_field":"id"},
        "gender_concept_id":{"source_table":"t1","source_field":"sex","term_mapping":{"M":8507,"F":8532}}
    }}]}}"#;
    let run = run(rules, &[("t1", "id,sex\n1,M\n2,F\n3,U\n")], None);

    assert_eq!(run.column("person", "gender_concept_id"), vec!["8507", "8532", ""]);
    assert_eq!(run.summary.warnings.len(), 1);
    // Values are redacted unless data logging is enabled.
    assert_eq!(run.summary.warnings[0].value, None);
    assert_eq!(run.summary.warnings[0].destination_field, "gender_concept_id");
    assert!(!run.summary.has_failures());
}

#[test]
fn scalar_mapping_repeats_concept_and_generates_keys() {
    let rules = r#"{"dataset_name":"d1","cdm":{"condition_occurrence":[{"Headache 378253":{
        "person_id":{"source_table":"symptoms","source_field":"id"},
        "condition_concept_id":{"source_table":"symptoms","source_field":"headache","term_mapping":378253}
    }}]}}"#;
    let run = run(
        rules,
        &[("symptoms", "id,headache\n1,yes\n2,yes\n3,\n4,yes\n")],
        Some(3),
    );

    assert_eq!(
        run.column("condition_occurrence", "condition_concept_id"),
        vec!["378253"; 4]
    );
    assert_eq!(
        run.column("condition_occurrence", "condition_occurrence_id"),
        vec!["1", "2", "3", "4"]
    );
}

#[test]
fn header_written_once_across_chunks() {
    let rules = r#"{"dataset_name":"d1","cdm":{"person":[{"person":{"person_id":{"source_table":"t1","source_field":"id"}}}]}}"#;
    let run = run(rules, &[("t1", "id\n1\n2\n3\n4\n5\n")], Some(2));

    assert_eq!(run.summary.chunks_processed, 3);
    let contents = run.table("person");
    assert_eq!(contents.lines().count(), 6);
    assert_eq!(contents.lines().filter(|l| l.starts_with("person_id")).count(), 1);
}

#[test]
fn producers_are_ordered_before_consumers() {
    let rules = r#"{"dataset_name":"d1","cdm":{
        "condition_occurrence":[{"Fever 437663":{
            "person_id":{"source_table":"t1","source_field":"id"},
            "condition_concept_id":{"source_table":"t1","source_field":"fever","term_mapping":437663}
        }}],
        "person":[{"person":{"person_id":{"source_table":"t1","source_field":"id"}}}]
    }}"#;
    let config = parse_rules(rules).unwrap();
    let pipeline =
        Pipeline::assemble(&config, default_registry(), EngineOptions::default()).unwrap();
    assert_eq!(pipeline.order(), vec!["person_0", "condition_occurrence_0"]);
}

#[test]
fn failed_object_aborts_dependents_only() {
    let rules = r#"{"dataset_name":"d1","cdm":{
        "person":[{"person":{"person_id":{"source_table":"t1","source_field":"subject"}}}],
        "condition_occurrence":[{"Fever 437663":{
            "person_id":{"source_table":"t1","source_field":"id"},
            "condition_concept_id":{"source_table":"t1","source_field":"fever","term_mapping":437663}
        }}],
        "measurement":[{"Weight 3025315":{
            "measurement_concept_id":{"source_table":"t1","source_field":"fever","term_mapping":3025315}
        }}]
    }}"#;
    let run = run(rules, &[("t1", "id,fever\n1,y\n2,n\n")], Some(1));

    let aborted: Vec<(&str, &AbortReason)> = run
        .summary
        .aborted
        .iter()
        .map(|a| (a.name.as_str(), &a.reason))
        .collect();
    assert_eq!(aborted.len(), 2);
    assert!(matches!(aborted[0], ("condition_occurrence_0", AbortReason::DependsOn(p)) if p == "person_0"));
    assert!(matches!(aborted[1], ("person_0", AbortReason::Failed(_))));

    assert!(run.summary.has_failures());
    assert_eq!(run.counts.get("measurement"), Some(&2));
    assert!(!run.counts.contains_key("person"));
    assert!(!run.counts.contains_key("condition_occurrence"));
}

/// Formatted log output collected in memory.
#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn lines(&self) -> Vec<String> {
        String::from_utf8(self.0.lock().unwrap().clone())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

impl io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for Captured {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[test]
fn failed_object_logs_at_error_and_dependents_at_warn() {
    let rules = r#"{"dataset_name":"d1","cdm":{
        "person":[{"person":{"person_id":{"source_table":"t1","source_field":"subject"}}}],
        "condition_occurrence":[{"Fever 437663":{
            "person_id":{"source_table":"t1","source_field":"id"},
            "condition_concept_id":{"source_table":"t1","source_field":"fever","term_mapping":437663}
        }}]
    }}"#;
    let captured = Captured::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(captured.clone())
        .with_ansi(false)
        .without_time()
        .finish();

    let run = tracing::subscriber::with_default(subscriber, || {
        run(rules, &[("t1", "id,fever\n1,y\n")], None)
    });
    assert_eq!(run.summary.aborted.len(), 2);

    let lines = captured.lines();
    let failed: Vec<&String> = lines
        .iter()
        .filter(|line| line.contains("object aborted, its rows"))
        .collect();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].trim_start().starts_with("ERROR"), "{}", failed[0]);
    assert!(failed[0].contains("object=person_0"));

    let dependent = lines
        .iter()
        .find(|line| line.contains("object aborted with its dependency"))
        .unwrap();
    assert!(dependent.trim_start().starts_with("WARN"), "{dependent}");
    assert!(dependent.contains("object=condition_occurrence_0"));
}

#[test]
fn missing_source_table_is_reported() {
    let rules = r#"{"dataset_name":"d1","cdm":{"person":[{"person":{"person_id":{"source_table":"absent","source_field":"id"}}}]}}"#;
    let run = run(rules, &[("t1", "id\n1\n")], None);
    assert_eq!(run.summary.aborted.len(), 1);
    assert!(run.summary.aborted[0].to_string().contains("absent"));
}

#[test]
fn unknown_destination_is_rejected_at_assembly() {
    let config = parse_rules(
        r#"{"dataset_name":"d1","cdm":{"visit_detail":[{"v":{"visit_detail_id":{"source_table":"t1","source_field":"id"}}}]}}"#,
    )
    .unwrap();
    let err = Pipeline::assemble(&config, default_registry(), EngineOptions::default())
        .err()
        .unwrap();
    assert!(matches!(err, CoreError::Config(ConfigError::UnknownTable { .. })));

    let config = parse_rules(
        r#"{"dataset_name":"d1","cdm":{"person":[{"p":{"shoe_size":{"source_table":"t1","source_field":"id"}}}]}}"#,
    )
    .unwrap();
    let err = Pipeline::assemble(&config, default_registry(), EngineOptions::default())
        .err()
        .unwrap();
    assert!(
        matches!(err, CoreError::Config(ConfigError::UnknownField { ref field, ref object, .. }) if field == "shoe_size" && object == "person_0")
    );
}

#[test]
fn table_declared_twice_under_different_case_is_rejected() {
    let config = parse_rules(
        r#"{"dataset_name":"d1","cdm":{
            "person":[{"p":{"person_id":{"source_table":"t1","source_field":"id"}}}],
            "Person":[{"q":{"person_id":{"source_table":"t1","source_field":"subject"}}}]
        }}"#,
    )
    .unwrap();

    let err = Pipeline::assemble(&config, default_registry(), EngineOptions::default())
        .err()
        .unwrap();
    assert!(
        matches!(err, CoreError::Config(ConfigError::DuplicateTable { ref table, ref first, ref second })
            if table == "person" && first == "person" && second == "Person")
    );
}

#[test]
fn objects_sharing_a_name_are_rejected() {
    let config = parse_rules(
        r#"{"dataset_name":"d1","cdm":{"person":[{"p":{"person_id":{"source_table":"t1","source_field":"id"}}}]}}"#,
    )
    .unwrap();
    let registry = default_registry();
    let definition = registry.get("person").unwrap();
    let rule_set = &config.cdm[0].rule_sets[0];
    let objects: Vec<Box<dyn DestinationObject>> = vec![
        Box::new(RuleInterpreter::new(definition, 0, rule_set, EngineOptions::default())),
        Box::new(RuleInterpreter::new(definition, 0, rule_set, EngineOptions::default())),
    ];

    let err = Pipeline::with_objects("d1", objects, registry, EngineOptions::default())
        .err()
        .unwrap();
    assert!(
        matches!(err, CoreError::Config(ConfigError::DuplicateObject { ref name }) if name == "person_0")
    );
}

const TWO_CONDITIONS: &str = r#"{"dataset_name":"d1","cdm":{"condition_occurrence":[
    {"Headache 378253":{
        "condition_concept_id":{"source_table":"symptoms","source_field":"headache","term_mapping":378253}
    }},
    {"Fever 437663":{
        "condition_concept_id":{"source_table":"symptoms","source_field":"fever","term_mapping":437663}
    }}
]}}"#;

const SYMPTOMS: &str = "id,headache,fever\n1,y,y\n2,y,n\n3,n,y\n";

#[test]
fn rule_sets_on_one_table_write_in_declaration_order() {
    let config = parse_rules(TWO_CONDITIONS).unwrap();
    let pipeline =
        Pipeline::assemble(&config, default_registry(), EngineOptions::default()).unwrap();
    assert_eq!(
        pipeline.order(),
        vec!["condition_occurrence_0", "condition_occurrence_1"]
    );

    let run = run(TWO_CONDITIONS, &[("symptoms", SYMPTOMS)], None);
    assert_eq!(
        run.column("condition_occurrence", "condition_concept_id"),
        vec!["378253", "378253", "378253", "437663", "437663", "437663"]
    );
    assert_eq!(
        run.column("condition_occurrence", "condition_occurrence_id"),
        vec!["1", "2", "3", "4", "5", "6"]
    );
    assert_eq!(run.counts.get("condition_occurrence"), Some(&6));
}

#[test]
fn rule_sets_on_one_table_interleave_per_chunk() {
    let run = run(TWO_CONDITIONS, &[("symptoms", SYMPTOMS)], Some(2));

    // Each chunk writes every instance's rows before the next chunk is read.
    assert_eq!(
        run.column("condition_occurrence", "condition_concept_id"),
        vec!["378253", "378253", "437663", "437663", "378253", "437663"]
    );
    // Generated keys continue across instances and chunks.
    assert_eq!(
        run.column("condition_occurrence", "condition_occurrence_id"),
        vec!["1", "2", "3", "4", "5", "6"]
    );
    assert_eq!(run.summary.chunks_processed, 2);
}

#[test]
fn cycle_is_detected_before_any_chunk() {
    let mut registry = TableRegistry::new();
    registry.register(
        TableDefinition::new("left", &["left_id", "right_id"])
            .with_source_key("left_id")
            .with_foreign_key("right_id", "right", "right_id"),
    );
    registry.register(
        TableDefinition::new("right", &["right_id", "left_id"])
            .with_source_key("right_id")
            .with_foreign_key("left_id", "left", "left_id"),
    );
    let config = parse_rules(
        r#"{"dataset_name":"d1","cdm":{
            "left":[{"l":{
                "left_id":{"source_table":"t1","source_field":"a"},
                "right_id":{"source_table":"t1","source_field":"b"}
            }}],
            "right":[{"r":{
                "right_id":{"source_table":"t1","source_field":"b"},
                "left_id":{"source_table":"t1","source_field":"a"}
            }}]
        }}"#,
    )
    .unwrap();

    let err = Pipeline::assemble(&config, &registry, EngineOptions::default())
        .err()
        .unwrap();
    match err {
        CoreError::Cycle(cycle) => assert_eq!(cycle.unresolved, vec!["left_0", "right_0"]),
        other => panic!("expected cycle, got {other}"),
    }
}

const CHUNKED_RULES: &str = r#"{"dataset_name":"d1","cdm":{
    "person":[{"person":{
        "person_id":{"source_table":"demo","source_field":"id"},
        "gender_concept_id":{"source_table":"demo","source_field":"sex","term_mapping":{"M":8507,"F":8532}}
    }}],
    "observation":[{"Smoker 4005823":{
        "person_id":{"source_table":"demo","source_field":"id"},
        "observation_concept_id":{"source_table":"demo","source_field":"sex","term_mapping":4005823}
    }}]
}}"#;

fn demographics(rows: usize) -> String {
    let mut out = String::from("id,sex\n");
    for i in 1..=rows {
        let sex = ["M", "F", "U", ""][i % 4];
        out.push_str(&format!("{i},{sex}\n"));
    }
    out
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    // Holds for tables fed by a single object. Tables fed by several objects
    // interleave per chunk, see `rule_sets_on_one_table_interleave_per_chunk`.
    #[test]
    fn chunked_output_matches_single_chunk(rows in 1usize..40, chunk in 1usize..12) {
        let source = demographics(rows);
        let whole = run(CHUNKED_RULES, &[("demo", source.as_str())], None);
        let chunked = run(CHUNKED_RULES, &[("demo", source.as_str())], Some(chunk));

        prop_assert_eq!(whole.table("person"), chunked.table("person"));
        prop_assert_eq!(whole.table("observation"), chunked.table("observation"));
        prop_assert_eq!(whole.counts, chunked.counts);
        prop_assert_eq!(whole.summary.warnings, chunked.summary.warnings);
    }
}
