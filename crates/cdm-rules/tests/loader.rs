use std::fs;

use cdm_rules::{ConfigError, list_objects, load_rules};

const RULES: &str = r#"{
  "dataset_name": "study-a",
  "cdm": {
    "person": [
      {
        "MALE 8507": {
          "person_id": {"source_table": "demographics.csv", "source_field": "PersonID"},
          "gender_concept_id": {"source_table": "demographics.csv", "source_field": "sex", "term_mapping": {"M": 8507}}
        }
      },
      {
        "FEMALE 8532": {
          "person_id": {"source_table": "demographics.csv", "source_field": "PersonID"},
          "gender_concept_id": {"source_table": "demographics.csv", "source_field": "sex", "term_mapping": {"F": 8532}}
        }
      }
    ],
    "condition_occurrence": [
      {
        "Headache 378253": {
          "person_id": {"source_table": "symptoms.csv", "source_field": "PersonID"},
          "condition_concept_id": {"source_table": "symptoms.csv", "source_field": "headache", "term_mapping": 378253}
        },
        "Fever 437663": {
          "person_id": {"source_table": "symptoms.csv", "source_field": "PersonID"},
          "condition_concept_id": {"source_table": "symptoms.csv", "source_field": "fever", "term_mapping": 437663}
        }
      }
    ]
  }
}"#;

#[test]
fn loads_rules_from_file() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("rules.json");
    fs::write(&path, RULES).expect("write rules");

    let config = load_rules(&path).expect("load rules");
    assert_eq!(config.dataset_name, "study-a");
    assert_eq!(config.rule_set_count(), 3);
    // Declaration order of the document is preserved.
    assert_eq!(config.cdm[0].table, "person");
    assert_eq!(config.cdm[1].table, "condition_occurrence");
}

#[test]
fn missing_file_is_io_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    let err = load_rules(&dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}

#[test]
fn list_objects_keeps_declaration_order() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("rules.json");
    fs::write(&path, RULES).expect("write rules");
    let config = load_rules(&path).expect("load rules");

    let objects = list_objects(&config);
    insta::assert_json_snapshot!(objects, @r#"
    {
      "person": [
        "MALE 8507",
        "FEMALE 8532"
      ],
      "condition_occurrence": [
        "Headache 378253",
        "Fever 437663"
      ]
    }
    "#);
}

#[test]
fn list_objects_matches_nested_keys() {
    let config = cdm_rules::parse_rules(RULES).expect("parse");
    let objects = list_objects(&config);
    for destination in &config.cdm {
        let expected: Vec<String> = destination
            .rule_sets
            .iter()
            .flat_map(|set| set.concepts.iter().map(|c| c.name.clone()))
            .collect();
        assert_eq!(objects[&destination.table], expected);
    }
}

#[test]
fn registry_export_shape_lists_like_rule_set_lists() {
    let exported = r#"{
      "metadata": {"dataset": "study-a"},
      "cdm": {
        "person": {
          "MALE 8507": {
            "person_id": {"source_table": "demographics.csv", "source_field": "PersonID"},
            "gender_concept_id": {"source_table": "demographics.csv", "source_field": "sex", "term_mapping": {"M": 8507}}
          },
          "FEMALE 8532": {
            "person_id": {"source_table": "demographics.csv", "source_field": "PersonID"},
            "gender_concept_id": {"source_table": "demographics.csv", "source_field": "sex", "term_mapping": {"F": 8532}}
          }
        }
      }
    }"#;
    let config = cdm_rules::parse_rules(exported).expect("parse");
    assert_eq!(config.dataset_name, "study-a");
    assert_eq!(config.rule_set_count(), 2);
    insta::assert_json_snapshot!(list_objects(&config), @r#"
    {
      "person": [
        "MALE 8507",
        "FEMALE 8532"
      ]
    }
    "#);
}
