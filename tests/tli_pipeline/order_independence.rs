//! Results must not depend on line order or on how input is sharded

use proptest::prelude::*;
use serde_json::Value;

use crate::test_utils::*;
use tli_analyzer::{Analysis, Analyzer, AnalyzerConfig, RunMetadata};

fn event_ids(lines: &[String]) -> Vec<(u64, Option<String>)> {
    analyze(lines)
        .events
        .iter()
        .map(|e| (e.event_id, e.victim.transaction.tx_id().map(str::to_string)))
        .collect()
}

fn detailed() -> Analyzer {
    let config = AnalyzerConfig {
        collect_details: true,
        ..AnalyzerConfig::default()
    };
    Analyzer::from_config(&config).unwrap()
}

/// The whole serialized report, evidence included, minus the wall clock
fn report_value(analysis: &Analysis) -> Value {
    let report = analysis.report(&RunMetadata::now("cluster.log"));
    let mut value = serde_json::to_value(&report).unwrap();
    value["analysis_metadata"]
        .as_object_mut()
        .unwrap()
        .remove("generated_at");
    value
}

fn full_report(lines: &[String]) -> Value {
    report_value(&detailed().analyze_lines(lines))
}

fn node_shards(lines: &[String]) -> Vec<Vec<String>> {
    let shard = |node: &str| -> Vec<String> {
        lines.iter().filter(|l| l.contains(node)).cloned().collect()
    };
    let rest: Vec<String> = lines
        .iter()
        .filter(|l| !l.contains("ydb-static-node-"))
        .cloned()
        .collect();
    vec![
        shard("ydb-static-node-3"),
        shard("ydb-static-node-2"),
        shard("ydb-static-node-1"),
        rest,
    ]
}

#[test]
fn test_reversed_input_gives_identical_report() {
    let forward = corpus();
    let mut backward = corpus();
    backward.reverse();
    assert_eq!(full_report(&forward), full_report(&backward));
}

#[test]
fn test_descriptive_fields_ignore_line_order() {
    // the culprit session also shows up on node 2, later
    let mut lines = corpus();
    lines.push(sys(
        "ydb-static-node-2",
        844,
        "07:45:22.000000",
        "DEBUG",
        "Component: SessionActor,SessionId: s-A-moved,TraceId: late-A,Type: Request,TxId: A,QueryAction: QUERY_ACTION_EXECUTE,QueryText: late_A",
    ));
    let forward = full_report(&lines);
    lines.reverse();
    let backward = full_report(&lines);
    assert_eq!(forward, backward);

    let culprit = &forward["lock_invalidation_events"][0]["culprit"];
    assert_eq!(culprit["tx_id"], "A");
    assert_eq!(culprit["session_id"], "s-A");
}

#[test]
fn test_reversed_input() {
    let forward = corpus();
    let mut backward = corpus();
    backward.reverse();
    assert_eq!(outcome(&analyze(&forward)), outcome(&analyze(&backward)));
    assert_eq!(event_ids(&forward), event_ids(&backward));
}

#[test]
fn test_shards_by_node_match_single_input() {
    let lines = corpus();
    let merged = Analyzer::default()
        .analyze_shards(node_shards(&lines))
        .unwrap();
    let single = analyze(&lines);

    assert_eq!(outcome(&merged), outcome(&single));
    assert_eq!(merged.parse_stats.total, single.parse_stats.total);
    assert_eq!(merged.events.len(), single.events.len());
}

#[test]
fn test_node_shards_give_identical_report() {
    let lines = corpus();
    let merged = detailed().analyze_shards(node_shards(&lines)).unwrap();
    assert_eq!(report_value(&merged), full_report(&lines));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_shuffled_corpus_gives_same_pairs(
        lines in Just(corpus()).prop_shuffle()
    ) {
        let baseline = corpus();
        prop_assert_eq!(outcome(&analyze(&lines)), outcome(&analyze(&baseline)));
        prop_assert_eq!(event_ids(&lines), event_ids(&baseline));
    }

    #[test]
    fn prop_shuffled_with_duplicates_gives_same_pairs(
        lines in Just(corpus()).prop_flat_map(|c| {
            let len = c.len();
            (Just(c), proptest::collection::vec(0..len, 0..8))
        }).prop_flat_map(|(mut c, extra)| {
            let copies: Vec<String> = extra.iter().map(|&i| c[i].clone()).collect();
            c.extend(copies);
            Just(c).prop_shuffle()
        })
    ) {
        prop_assert_eq!(outcome(&analyze(&lines)), outcome(&analyze(&corpus())));
    }

    #[test]
    fn prop_shuffled_corpus_gives_identical_report(
        lines in Just(corpus()).prop_shuffle()
    ) {
        prop_assert_eq!(full_report(&lines), full_report(&corpus()));
    }

    #[test]
    fn prop_random_shards_give_identical_report(
        (lines, cut) in Just(corpus()).prop_shuffle().prop_flat_map(|c| {
            let len = c.len();
            (Just(c), 0..=len)
        })
    ) {
        let (left, right) = lines.split_at(cut);
        let merged = detailed()
            .analyze_shards(vec![left.to_vec(), right.to_vec()])
            .unwrap();
        prop_assert_eq!(report_value(&merged), full_report(&corpus()));
    }
}
