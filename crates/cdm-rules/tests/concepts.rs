use cdm_model::ConceptId;
use cdm_rules::{build_index, flatten, parse_rules};

fn config(dataset: &str, table: &str, field: &str, mapping: &str) -> cdm_model::RuleConfig {
    parse_rules(&format!(
        r#"{{"dataset_name":"{dataset}","cdm":{{"condition_occurrence":[{{"Headache 378253":{{
            "condition_concept_id":{{"source_table":"{table}","source_field":"{field}","term_mapping":{mapping}}}
        }}}}]}}}}"#
    ))
    .expect("parse rules")
}

#[test]
fn distinct_sources_are_both_recorded() {
    let configs = vec![
        config("d1", "symptoms.csv", "headache", "378253"),
        config("d1", "visits.csv", "complaint", "378253"),
    ];
    let index = build_index(&configs);
    let entry = index.get(&ConceptId::Number(378253)).expect("entry");
    assert_eq!(entry.sources.len(), 2);
    assert_eq!(entry.concept_name, "Headache");
    assert_eq!(entry.domain, "condition_occurrence");
}

#[test]
fn identical_descriptor_is_recorded_once() {
    let configs = vec![
        config("d1", "symptoms.csv", "headache", "378253"),
        config("d1", "symptoms.csv", "headache", "378253"),
    ];
    let index = build_index(&configs);
    assert_eq!(index.len(), 1);
    assert_eq!(index.get(&ConceptId::Number(378253)).unwrap().sources.len(), 1);
    // The flat listing keeps every occurrence.
    assert_eq!(flatten(&configs).len(), 2);
}

#[test]
fn lookup_mapping_yields_one_entry_per_value() {
    let configs = vec![config(
        "d1",
        "symptoms.csv",
        "headache",
        r#"{"Yes":378253,"Severe":378253,"Migraine":318736}"#,
    )];
    let index = build_index(&configs);
    assert_eq!(index.len(), 2);
    let headache = index.get(&ConceptId::Number(378253)).unwrap();
    let values: Vec<Option<&str>> = headache
        .sources
        .iter()
        .map(|s| s.source_value.as_deref())
        .collect();
    assert_eq!(values, vec![Some("Yes"), Some("Severe")]);
}

#[test]
fn flatten_and_index_keep_declaration_order() {
    let configs = vec![
        config(
            "d1",
            "symptoms.csv",
            "headache",
            r#"{"Yes":378253,"Severe":378253,"Acute":4192}"#,
        ),
        config("d1", "visits.csv", "complaint", "201826"),
    ];

    let values: Vec<Option<String>> = flatten(&configs)
        .into_iter()
        .map(|c| c.source.source_value)
        .collect();
    assert_eq!(
        values,
        vec![
            Some("Yes".to_string()),
            Some("Severe".to_string()),
            Some("Acute".to_string()),
            None
        ]
    );

    let index = build_index(&configs);
    let ids: Vec<&ConceptId> = index.entries().map(|e| &e.concept_id).collect();
    assert_eq!(
        ids,
        vec![
            &ConceptId::Number(378253),
            &ConceptId::Number(4192),
            &ConceptId::Number(201826)
        ]
    );
}

#[test]
fn first_writer_wins_and_conflict_is_recorded() {
    let first = config("d1", "symptoms.csv", "headache", "378253");
    let second = parse_rules(
        r#"{"dataset_name":"d2","cdm":{"observation":[{"Pain 378253":{
            "observation_concept_id":{"source_table":"obs.csv","source_field":"pain","term_mapping":378253}
        }}]}}"#,
    )
    .unwrap();
    let index = build_index(&[first, second]);
    let entry = index.get(&ConceptId::Number(378253)).unwrap();
    assert_eq!(entry.concept_name, "Headache");
    assert_eq!(entry.domain, "condition_occurrence");
    assert_eq!(entry.sources.len(), 2);
    assert_eq!(index.conflicts().len(), 1);
    assert_eq!(index.conflicts()[0].ignored_domain, "observation");
}

#[test]
fn flat_report_serializes_without_empty_source_value() {
    let configs = vec![config("d1", "symptoms.csv", "headache", "378253")];
    let flat = flatten(&configs);
    insta::assert_json_snapshot!(flat, @r#"
    [
      {
        "concept_id": 378253,
        "concept_name": "Headache 378253",
        "domain": "condition_occurrence",
        "source_field": "headache",
        "source_table": "symptoms.csv",
        "source_dataset": "d1"
      }
    ]
    "#);
}
