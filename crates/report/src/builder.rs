//! Report tree
//!
//! [`ReportBuilder::build`] is a pure transformation from resolved events to
//! the serializable result document:
//!
//! ```text
//! analysis_metadata:        generated_at, log_file, total_invalidation_events
//! lock_invalidation_events: event_id, timestamp, table,
//!                           victim { ..., all_queries },
//!                           culprit { ..., all_queries } | null,
//!                           lock_details { lock_id },
//!                           raw_entries { victim_log_line, culprit_log_line? }
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tli_core::{
    format_timestamp, Culprit, LockInvalidationEvent, QueryEvent, Result, Timestamp, Transaction,
};
use tracing::debug;

/// Run-scoped metadata passed in by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunMetadata {
    /// When the report was generated
    pub generated_at: Timestamp,
    /// Input descriptor: file path or `<stdin>`
    pub log_file: String,
}

impl RunMetadata {
    /// Metadata stamped with the current time
    pub fn now(log_file: impl Into<String>) -> Self {
        Self {
            generated_at: Utc::now(),
            log_file: log_file.into(),
        }
    }
}

/// Top of the result document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    /// Run metadata
    pub analysis_metadata: AnalysisMetadata,
    /// Events ordered by event_id
    pub lock_invalidation_events: Vec<EventEntry>,
}

/// `analysis_metadata` block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisMetadata {
    /// Generation timestamp
    pub generated_at: String,
    /// Input descriptor
    pub log_file: String,
    /// Number of events, always equal to the event list length
    pub total_invalidation_events: usize,
}

/// One entry of `lock_invalidation_events`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEntry {
    /// 1-based sequential id
    pub event_id: u64,
    /// Victim abort timestamp
    pub timestamp: String,
    /// Table path, empty when the issue message named none
    pub table: String,
    /// Aborted side
    pub victim: VictimEntry,
    /// Committing side; `null` when unresolved
    pub culprit: Option<CulpritEntry>,
    /// Contested lock
    pub lock_details: LockDetails,
    /// Source lines
    pub raw_entries: RawEntries,
}

/// `victim` block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VictimEntry {
    /// Session of the aborting line, else of the transaction
    pub session_id: Option<String>,
    /// Trace of the aborting attempt
    pub trace_id: Option<String>,
    /// Host that logged the abort
    pub node: Option<String>,
    /// ydbd process that logged the abort, e.g. `ydbd[889]`
    pub process: Option<String>,
    /// Logical transaction id
    pub tx_id: Option<String>,
    /// Latest commit-type query text, else the final query's
    pub query_text: Option<String>,
    /// Every query of the transaction, oldest first
    pub all_queries: Vec<QueryEntry>,
}

/// `culprit` block
///
/// A lock breaker whose PhyTxId no session line maps to a transaction is
/// reported with `phy_tx_id` set and the transaction fields `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CulpritEntry {
    /// Session the culprit ran in
    pub session_id: Option<String>,
    /// Trace of the committing attempt
    pub trace_id: Option<String>,
    /// Physical transaction id that broke the lock, else the smallest known
    pub phy_tx_id: Option<String>,
    /// Logical transaction id; `null` for an unmapped lock breaker
    pub tx_id: Option<String>,
    /// Host that logged the culprit line
    pub node: Option<String>,
    /// ydbd process that logged the culprit line
    pub process: Option<String>,
    /// Latest commit-type query text, else the final query's
    pub query_text: Option<String>,
    /// Every query of the transaction, oldest first
    pub all_queries: Vec<QueryEntry>,
}

/// One element of `all_queries`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryEntry {
    /// Query text or hash as logged
    pub query_text: Option<String>,
    /// `QUERY_ACTION_*` name; empty when the line carried none
    pub query_action: String,
    /// Trace of the issuing attempt; empty when unknown
    pub trace_id: String,
    /// When the query was logged
    pub timestamp: String,
    /// `QUERY_TYPE_*` name; empty when unknown
    pub query_type: String,
}

/// `lock_details` block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockDetails {
    /// Contested lock; `null` when it cannot be pinned to one id
    pub lock_id: Option<String>,
}

/// `raw_entries` block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEntries {
    /// The aborting line, trimmed
    pub victim_log_line: String,
    /// The committing or lock-breaking line; omitted when unresolved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub culprit_log_line: Option<String>,
    /// Every evidence line, newest first; only when details were collected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detailed_log_lines: Option<Vec<String>>,
}

impl Report {
    /// Pretty JSON rendering of the tree
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// YAML rendering of the tree, fields in declaration order
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Number of events with a culprit
    pub fn resolved_count(&self) -> usize {
        self.lock_invalidation_events
            .iter()
            .filter(|e| e.culprit.is_some())
            .count()
    }
}

/// Builds [`Report`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportBuilder;

impl ReportBuilder {
    /// Assemble the result tree; events are emitted in event_id order
    pub fn build(events: &[LockInvalidationEvent], metadata: &RunMetadata) -> Report {
        let mut ordered: Vec<&LockInvalidationEvent> = events.iter().collect();
        ordered.sort_by_key(|e| e.event_id);

        let entries: Vec<EventEntry> = ordered.into_iter().map(event_entry).collect();
        debug!(target: "tli::report", events = entries.len(), "Built report tree");

        Report {
            analysis_metadata: AnalysisMetadata {
                generated_at: format_timestamp(&metadata.generated_at),
                log_file: metadata.log_file.clone(),
                total_invalidation_events: entries.len(),
            },
            lock_invalidation_events: entries,
        }
    }
}

fn event_entry(event: &LockInvalidationEvent) -> EventEntry {
    let victim_tx = &event.victim.transaction;
    let victim_record = &event.victim.record;

    EventEntry {
        event_id: event.event_id,
        timestamp: format_timestamp(&event.timestamp),
        table: event.table.clone(),
        victim: VictimEntry {
            session_id: victim_record
                .session_id()
                .or_else(|| victim_tx.session_id())
                .map(str::to_string),
            trace_id: victim_record
                .trace_id()
                .map(str::to_string)
                .or_else(|| victim_tx.trace_ids().iter().next().cloned()),
            node: non_empty(&victim_record.node).or_else(|| victim_tx.node().map(str::to_string)),
            process: non_empty(&victim_record.process)
                .or_else(|| victim_tx.process().map(str::to_string)),
            tx_id: victim_tx.tx_id().map(str::to_string),
            query_text: victim_tx.headline_query_text().map(str::to_string),
            all_queries: all_queries(victim_tx),
        },
        culprit: event.culprit.as_ref().map(culprit_entry),
        lock_details: LockDetails {
            lock_id: event.lock_id.clone(),
        },
        raw_entries: RawEntries {
            victim_log_line: victim_record.raw.trim().to_string(),
            culprit_log_line: event
                .culprit
                .as_ref()
                .map(|c| c.record.raw.trim().to_string()),
            detailed_log_lines: if event.evidence.is_empty() {
                None
            } else {
                Some(event.evidence.iter().map(|l| l.trim().to_string()).collect())
            },
        },
    }
}

fn culprit_entry(culprit: &Culprit) -> CulpritEntry {
    let tx = &culprit.transaction;
    CulpritEntry {
        session_id: tx
            .session_id()
            .or_else(|| culprit.record.session_id())
            .map(str::to_string),
        trace_id: culprit.trace_id.clone(),
        phy_tx_id: culprit
            .phy_tx_id
            .clone()
            .or_else(|| tx.phy_tx_id().map(str::to_string)),
        tx_id: tx.tx_id().map(str::to_string),
        node: non_empty(&culprit.record.node).or_else(|| tx.node().map(str::to_string)),
        process: non_empty(&culprit.record.process).or_else(|| tx.process().map(str::to_string)),
        query_text: tx.headline_query_text().map(str::to_string),
        all_queries: all_queries(tx),
    }
}

fn all_queries(tx: &Transaction) -> Vec<QueryEntry> {
    tx.queries().iter().map(query_entry).collect()
}

fn query_entry(query: &QueryEvent) -> QueryEntry {
    QueryEntry {
        query_text: query.query_text.clone(),
        query_action: query.action.to_string(),
        trace_id: query.trace_id.clone().unwrap_or_default(),
        timestamp: format_timestamp(&query.timestamp),
        query_type: query.query_type.clone().unwrap_or_default(),
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
