//! Known victim/culprit situations

use crate::test_utils::*;
use tli_analyzer::MatchStrategy;

#[test]
fn test_shared_lock_pairs_victim_with_committer() {
    let analysis = analyze(&shared_lock_scenario());
    assert_eq!(analysis.events.len(), 1);

    let event = &analysis.events[0];
    assert_eq!(event.event_id, 1);
    assert_eq!(event.victim.transaction.tx_id(), Some("B"));
    assert_eq!(event.table, "/Root/t1");
    assert_eq!(event.lock_id.as_deref(), Some("L1"));

    let culprit = event.culprit.as_ref().unwrap();
    assert_eq!(culprit.transaction.tx_id(), Some("A"));
    assert_eq!(culprit.strategy, MatchStrategy::SharedLock);
}

#[test]
fn test_closest_prior_commit_wins() {
    let mut lines = committer("C1", "L1", "07:45:19.000000", "07:45:19.649000");
    lines.extend(committer("C2", "L1", "07:45:20.000000", "07:45:20.649000"));
    lines.extend(victim("B", "L1", "07:45:18.000000", "07:45:21.649000"));

    let analysis = analyze(&lines);
    let culprit = analysis.events[0].culprit.as_ref().unwrap();
    assert_eq!(culprit.transaction.tx_id(), Some("C2"));
}

#[test]
fn test_commit_after_abort_is_not_a_culprit() {
    let mut lines = committer("LATE", "L1", "07:45:22.000000", "07:45:22.500000");
    lines.extend(victim("B", "L1", "07:45:21.000000", "07:45:21.649000"));

    let analysis = analyze(&lines);
    assert_eq!(analysis.events.len(), 1);
    assert!(analysis.events[0].culprit.is_none());
}

#[test]
fn test_unresolvable_victim_keeps_its_block() {
    let analysis = analyze(&unresolved_scenario());
    assert_eq!(analysis.events.len(), 1);

    let event = &analysis.events[0];
    assert!(!event.is_resolved());
    assert_eq!(event.lock_id.as_deref(), Some("999"));
    assert_eq!(event.victim.transaction.tx_id(), Some("U"));
    assert_eq!(event.victim.transaction.queries().len(), 1);
    assert_eq!(event.table, "/Root/t1");
}

#[test]
fn test_broken_lock_chain_names_the_breaker() {
    let analysis = analyze(&broken_lock_chain_scenario());
    assert_eq!(analysis.events.len(), 1);

    let event = &analysis.events[0];
    assert_eq!(event.table, "/Root/database/test_schema_ca7eb8ed/tt1");
    assert_eq!(event.lock_id.as_deref(), Some("562949953837900"));
    assert_eq!(
        event.victim.transaction.tx_id(),
        Some("01k85ekret8vjt70bq09a16h6q")
    );

    let culprit = event.culprit.as_ref().unwrap();
    assert_eq!(culprit.strategy, MatchStrategy::BrokenLockChain);
    assert_eq!(
        culprit.transaction.tx_id(),
        Some("01k85ekr9f1t3w7y5b2n4c6d8e")
    );
    assert_eq!(culprit.phy_tx_id.as_deref(), Some("562949953837901"));
    assert_eq!(
        culprit.transaction.session_id(),
        Some("ydb://session/3?node_id=50001&id=NmQ0ZTRmYjMtNjBkYjVhMWMtOTVkNDA1MTItZjJmOGQ1ZTg=")
    );
    assert!(culprit
        .transaction
        .headline_query_text()
        .is_some_and(|q| q.starts_with("UPSERT INTO tt1")));
}

#[test]
fn test_mixed_corpus() {
    let analysis = analyze(&corpus());
    assert_eq!(analysis.events.len(), 3);

    let victims: Vec<_> = analysis
        .events
        .iter()
        .map(|e| e.victim.transaction.tx_id().unwrap_or_default().to_string())
        .collect();
    assert_eq!(victims, vec!["B", "U", "01k85ekret8vjt70bq09a16h6q"]);

    let resolved = analysis.events.iter().filter(|e| e.is_resolved()).count();
    assert_eq!(resolved, 2);
}

#[test]
fn test_raw_format_matches_journal_format() {
    let raw: Vec<String> = corpus()
        .iter()
        .filter_map(|l| l.split_once("]: ").map(|(_, rest)| rest.to_string()))
        .collect();

    let from_raw = analyze_raw(&raw);
    let from_journal = analyze(&corpus());
    assert_eq!(outcome(&from_raw), outcome(&from_journal));
}
