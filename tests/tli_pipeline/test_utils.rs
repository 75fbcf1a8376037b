//! Log line builders and a mixed corpus shared by the suite.

#![allow(dead_code)]

use std::collections::BTreeSet;

use tli_analyzer::{Analysis, Analyzer, AnalyzerConfig, LogFormat};

pub const TLI_ISSUES_T1: &str = "Issues: { message: \"Transaction locks invalidated. Table: `/Root/t1`\" issue_code: 2001 severity: 1 }";

/// A journalctl line from `node`
pub fn sys(node: &str, pid: u32, ts: &str, level: &str, fields: &str) -> String {
    format!(
        "окт 22 10:54:51 {} ydbd[{}]: 2025-10-22T{}Z :DATA_INTEGRITY {}: {}",
        node, pid, ts, level, fields
    )
}

/// A session actor line on node 1
pub fn session(ts: &str, fields: &str) -> String {
    sys(
        "ydb-static-node-1",
        846,
        ts,
        "DEBUG",
        &format!("Component: SessionActor,{}", fields),
    )
}

/// Transaction `tx` that touches `lock` and commits at `commit_ts`
pub fn committer(tx: &str, lock: &str, work_ts: &str, commit_ts: &str) -> Vec<String> {
    vec![
        session(work_ts, &format!("SessionId: s-{tx},TraceId: t-{tx},Type: Request,TxId: {tx},QueryAction: QUERY_ACTION_EXECUTE,QueryText: upsert_{tx}")),
        session(work_ts, &format!("SessionId: s-{tx},TraceId: t-{tx},Type: Response,TxId: {tx},LockId: {lock},Status: SUCCESS")),
        session(commit_ts, &format!("SessionId: s-{tx},TraceId: c-{tx},Type: Request,TxId: {tx},QueryAction: QUERY_ACTION_COMMIT_TX,QueryText: commit_{tx}")),
        session(commit_ts, &format!("SessionId: s-{tx},TraceId: c-{tx},Type: Response,TxId: {tx},Status: SUCCESS")),
    ]
}

/// Transaction `tx` that touches `lock` and aborts with TLI at `abort_ts`
pub fn victim(tx: &str, lock: &str, work_ts: &str, abort_ts: &str) -> Vec<String> {
    vec![
        session(work_ts, &format!("SessionId: s-{tx},TraceId: t-{tx},Type: Request,TxId: {tx},QueryAction: QUERY_ACTION_EXECUTE,QueryText: select_{tx}")),
        session(work_ts, &format!("SessionId: s-{tx},TraceId: t-{tx},Type: Response,TxId: {tx},LockId: {lock},Status: SUCCESS")),
        session(abort_ts, &format!("SessionId: s-{tx},TraceId: c-{tx},Type: Response,TxId: {tx},Status: ABORTED,{TLI_ISSUES_T1}")),
    ]
}

/// A commits over L1 at 07:45:21.619, B aborts at 07:45:21.649
pub fn shared_lock_scenario() -> Vec<String> {
    let mut lines = committer("A", "L1", "07:45:21.500000", "07:45:21.619000");
    lines.extend(victim("B", "L1", "07:45:21.400000", "07:45:21.649000"));
    lines
}

/// Victim lost lock 562949953837900 to PhyTxId 562949953837901; the
/// Executer reports the lost lock in its `Locks: [...]` block
pub fn broken_lock_chain_scenario() -> Vec<String> {
    let victim_session = "ydb://session/3?node_id=50005&id=MzFkMjA5YjktNWJkYzI3YzgtYjEwOGJhNDAtOWFlMmZhYzI=";
    let culprit_session = "ydb://session/3?node_id=50001&id=NmQ0ZTRmYjMtNjBkYjVhMWMtOTVkNDA1MTItZjJmOGQ1ZTg=";
    vec![
        sys("ydb-static-node-3", 889, "07:54:51.300000", "DEBUG", &format!(
            "Component: SessionActor,SessionId: {victim_session},TraceId: 01k85ekrmy9tcyvnx2qvwdkcts,Type: Request,TxId: 01k85ekret8vjt70bq09a16h6q,QueryAction: QUERY_ACTION_EXECUTE,QueryType: QUERY_TYPE_SQL_GENERIC_QUERY,QueryText: SELECT v FROM tt1 WHERE id = 1"
        )),
        sys("ydb-static-node-1", 846, "07:54:51.400000", "DEBUG", &format!(
            "Component: SessionActor,SessionId: {culprit_session},TraceId: 01k85ekr8cz6a5w0h2kd8m3xqe,Type: Request,QueryAction: QUERY_ACTION_EXECUTE,QueryType: QUERY_TYPE_SQL_GENERIC_QUERY,QueryText: UPSERT INTO tt1 (id, v) VALUES (1, 2),NeedCommitTx: true"
        )),
        sys("ydb-static-node-2", 844, "07:54:51.410000", "INFO",
            "Component: DataShard,Type: Locks,TabletId: 72075186224047631,PhyTxId: 562949953837901,BreakLocks: [562949953837900 844424930570469 ]"),
        sys("ydb-static-node-1", 846, "07:54:51.420000", "DEBUG", &format!(
            "Component: SessionActor,SessionId: {culprit_session},TraceId: 01k85ekr8cz6a5w0h2kd8m3xqe,Type: Response,TxId: 01k85ekr9f1t3w7y5b2n4c6d8e,PhyTxId: 562949953837901,Status: SUCCESS"
        )),
        sys("ydb-static-node-3", 889, "07:54:51.428479", "INFO",
            "Component: Executer,Type: Response,State: Execute,TraceId: 01k85ekrmy9tcyvnx2qvwdkcts,PhyTxId: 562949953837887,ShardId: 72075186224047627,Locks: [LockId: 562949953837900 DataShard: 72075186224047627 Generation: 1 Counter: 2 SchemeShard: 72075186224037897 PathId: 131 HasWrites: false ],Status: LOCKS_BROKEN,Issues: Empty"),
        sys("ydb-static-node-3", 889, "07:54:51.433950", "DEBUG", &format!(
            "Component: SessionActor,SessionId: {victim_session},TraceId: 01k85ekrmy9tcyvnx2qvwdkcts,Type: Response,TxId: 01k85ekret8vjt70bq09a16h6q,Status: ABORTED,Issues: {{ message: \"Transaction locks invalidated. Table: `/Root/database/test_schema_ca7eb8ed/tt1`\" issue_code: 2001 severity: 1 }}"
        )),
    ]
}

/// Victim U holding lock 999 that nothing else touched
pub fn unresolved_scenario() -> Vec<String> {
    victim("U", "999", "07:49:59.000000", "07:50:00.000000")
}

/// Lines that must be skipped
pub fn noise() -> Vec<String> {
    vec![
        "garbage text".to_string(),
        String::new(),
        "окт 22 10:54:51 ydb-static-node-1 ydbd[846]: 2025-10-22T07:50:00.000000Z :KQP_SESSION INFO: SessionId: s-x,TraceId: t-x".to_string(),
    ]
}

/// Every scenario plus noise, in a fixed order
pub fn corpus() -> Vec<String> {
    let mut lines = Vec::new();
    lines.extend(broken_lock_chain_scenario());
    lines.push(noise()[0].clone());
    lines.extend(shared_lock_scenario());
    lines.extend(noise());
    lines.extend(unresolved_scenario());
    lines
}

pub fn analyze(lines: &[String]) -> Analysis {
    Analyzer::default().analyze_lines(lines)
}

pub fn analyze_raw(lines: &[String]) -> Analysis {
    let config = AnalyzerConfig {
        log_format: LogFormat::Raw.to_string(),
        ..AnalyzerConfig::default()
    };
    tli_analyzer::analyze(lines, &config).unwrap()
}

/// (victim tx, culprit tx, lock, table) per event, independent of event ids
pub type Outcome = BTreeSet<(Option<String>, Option<String>, Option<String>, String)>;

pub fn outcome(analysis: &Analysis) -> Outcome {
    analysis
        .events
        .iter()
        .map(|e| {
            (
                e.victim.transaction.tx_id().map(str::to_string),
                e.culprit
                    .as_ref()
                    .and_then(|c| c.transaction.tx_id().map(str::to_string)),
                e.lock_id.clone(),
                e.table.clone(),
            )
        })
        .collect()
}
