//! Counting, numbering and idempotence

use crate::test_utils::*;
use tli_analyzer::{AnalyzerConfig, RunMetadata};

#[test]
fn test_one_event_per_tli_abort_with_dense_ids() {
    let analysis = analyze(&corpus());
    let ids: Vec<u64> = analysis.events.iter().map(|e| e.event_id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert_eq!(analysis.index_stats.aborts, analysis.events.len());

    let report = analysis.report(&RunMetadata::now("corpus.log"));
    assert_eq!(
        report.analysis_metadata.total_invalidation_events,
        report.lock_invalidation_events.len()
    );
}

#[test]
fn test_garbage_lines_are_skipped() {
    let lines = corpus();
    let analysis = analyze(&lines);
    assert_eq!(analysis.parse_stats.total, lines.len());
    assert_eq!(analysis.parse_stats.skipped, 4);
    assert_eq!(
        analysis.parse_stats.accepted + analysis.parse_stats.skipped,
        analysis.parse_stats.total
    );
}

#[test]
fn test_empty_input() {
    let analysis = analyze(&[]);
    assert!(analysis.events.is_empty());
    assert_eq!(analysis.parse_stats.total, 0);

    let report = analysis.report(&RunMetadata::now("empty.log"));
    assert_eq!(report.analysis_metadata.total_invalidation_events, 0);
}

#[test]
fn test_duplicated_input_is_idempotent() {
    let once = analyze(&corpus());
    let mut doubled = corpus();
    doubled.extend(corpus());
    let twice = analyze(&doubled);

    assert_eq!(outcome(&once), outcome(&twice));
    assert_eq!(once.events.len(), twice.events.len());
    for (a, b) in once.events.iter().zip(&twice.events) {
        assert_eq!(
            a.victim.transaction.queries().len(),
            b.victim.transaction.queries().len()
        );
    }
}

#[test]
fn test_non_tli_abort_is_not_an_event() {
    let mut lines = shared_lock_scenario();
    lines.push(session(
        "07:46:00.000000",
        "SessionId: s-X,TraceId: t-X,Type: Response,TxId: X,Status: ABORTED,Issues: { message: \"Some other failure\" issue_code: 1030 severity: 1 }",
    ));
    assert_eq!(analyze(&lines).events.len(), 1);
}

#[test]
fn test_conflicting_status_is_reported_as_anomaly() {
    let mut lines = shared_lock_scenario();
    lines.push(session(
        "07:45:21.700000",
        "SessionId: s-A,TraceId: x-A,Type: Response,TxId: A,Status: COMMITTED",
    ));
    lines.push(session(
        "07:45:21.710000",
        "SessionId: s-A,TraceId: y-A,Type: Response,TxId: A,Status: ABORTED",
    ));

    let analysis = analyze(&lines);
    assert!(analysis.index_stats.anomalies >= 1);
    assert_eq!(analysis.events.len(), 1);
}

#[test]
fn test_custom_marker_from_config() {
    let config = AnalyzerConfig {
        tli_issue_code: 9999,
        tli_message: "Something else".to_string(),
        ..AnalyzerConfig::default()
    };
    let analysis = tli_analyzer::analyze(&corpus(), &config).unwrap();
    assert!(analysis.events.is_empty());
}

#[test]
fn test_invalid_config_is_rejected() {
    let config = AnalyzerConfig {
        log_format: "xml".to_string(),
        ..AnalyzerConfig::default()
    };
    assert!(tli_analyzer::analyze(&corpus(), &config).is_err());
}
