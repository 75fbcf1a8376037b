//! Serialized result tree and text renderers

use serde_json::Value;

use crate::test_utils::*;
use tli_analyzer::{render, OutputFormat, RunMetadata};

fn report_json() -> Value {
    let report = analyze(&corpus()).report(&RunMetadata::now("cluster.log"));
    serde_json::from_str(&report.to_json_pretty().unwrap()).unwrap()
}

#[test]
fn test_top_level_shape() {
    let json = report_json();
    let metadata = &json["analysis_metadata"];
    assert_eq!(metadata["log_file"], "cluster.log");
    assert_eq!(metadata["total_invalidation_events"], 3);
    assert!(metadata["generated_at"].is_string());
    assert_eq!(json["lock_invalidation_events"].as_array().unwrap().len(), 3);
}

#[test]
fn test_event_entry_shape() {
    let json = report_json();
    let event = &json["lock_invalidation_events"][0];
    assert_eq!(event["event_id"], 1);
    assert_eq!(event["timestamp"], "2025-10-22T07:45:21.649000Z");
    assert_eq!(event["table"], "/Root/t1");
    assert_eq!(event["victim"]["tx_id"], "B");
    assert_eq!(event["victim"]["all_queries"][0]["query_text"], "select_B");
    assert_eq!(event["culprit"]["tx_id"], "A");
    assert_eq!(event["lock_details"]["lock_id"], "L1");
    assert!(event["raw_entries"]["victim_log_line"]
        .as_str()
        .unwrap()
        .contains("Status: ABORTED"));
    assert!(event["raw_entries"].get("detailed_log_lines").is_none());
}

#[test]
fn test_unresolved_culprit_is_null() {
    let json = report_json();
    let event = &json["lock_invalidation_events"][1];
    assert_eq!(event["victim"]["tx_id"], "U");
    assert!(event["culprit"].is_null());
    assert_eq!(event["lock_details"]["lock_id"], "999");
    assert!(event["raw_entries"].get("culprit_log_line").is_none());
}

#[test]
fn test_every_format_renders() {
    let report = analyze(&corpus()).report(&RunMetadata::now("cluster.log"));

    let yaml = render(&report, OutputFormat::default()).unwrap();
    assert!(yaml.starts_with("analysis_metadata:"));

    let json = render(&report, OutputFormat::Json).unwrap();
    assert!(json.ends_with("}\n"));

    let sql = render(&report, OutputFormat::Sql).unwrap();
    assert!(sql.contains("-- TLI EVENT #3"));
    assert!(sql.contains("SELECT v FROM tt1 WHERE id = 1;"));

    let summary = render(&report, OutputFormat::Summary).unwrap();
    assert!(summary.contains("Total invalidation events: 3"));
    assert!(summary.contains("Found 2 unique victim+culprit combinations:"));
}

#[test]
fn test_yaml_carries_the_same_tree_as_json() {
    let report = analyze(&corpus()).report(&RunMetadata::now("cluster.log"));
    let yaml = render(&report, OutputFormat::Yaml).unwrap();
    let from_yaml: Value = serde_yaml::from_str(&yaml).unwrap();
    let from_json = serde_json::to_value(&report).unwrap();
    assert_eq!(from_yaml, from_json);

    let chain = &from_yaml["lock_invalidation_events"][2];
    assert_eq!(chain["culprit"]["tx_id"], "01k85ekr9f1t3w7y5b2n4c6d8e");
    assert_eq!(chain["culprit"]["phy_tx_id"], "562949953837901");
    assert_eq!(chain["lock_details"]["lock_id"], "562949953837900");
}
