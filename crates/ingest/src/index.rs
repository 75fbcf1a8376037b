//! Transaction index
//!
//! Phase one of the pipeline. Records arrive in any order; the index keeps
//! enough per-trace and per-transaction state that the end result does not
//! depend on that order:
//!
//! - identity: `trace_id → key` aliases plus the `key → Transaction` map;
//!   a provisional trace-keyed entity is folded into the tx-keyed one as
//!   soon as a record links the two
//! - commit detection: per-trace flags, so a SUCCESS response is recognized
//!   as a commit whether its commit-type request was seen before or after
//! - lock breaks: DataShard `BreakLocks` lines, keyed by lock id
//! - TLI aborts: kept aside for the resolver, duplicates absorbed
//!
//! Where two lines compete for the same slot (PhyTxId owner, the SUCCESS
//! that proves a commit) the earliest by (timestamp, raw text) wins. Trace
//! identity conflicts are anomalies and keep the first binding seen.
//!
//! [`TransactionIndex::finalize`] freezes everything into a read-only
//! [`FinalizedIndex`].

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use tli_core::config::{TLI_ISSUE_CODE, TLI_MESSAGE};
use tli_core::{
    line_order, table_from_issue, AnalyzerConfig, Error, QueryEvent, Record, Result,
    StatusUpdate, TerminalStatus, Timestamp, Transaction, TxKey,
};
use tracing::{debug, info, warn};

/// Decides whether a record is a "Transaction locks invalidated" abort
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TliMarker {
    issue_code: u32,
    message: String,
}

impl Default for TliMarker {
    fn default() -> Self {
        Self::new(TLI_ISSUE_CODE, TLI_MESSAGE)
    }
}

impl TliMarker {
    /// Marker for the given issue code and message
    pub fn new(issue_code: u32, message: impl Into<String>) -> Self {
        Self {
            issue_code,
            message: message.into(),
        }
    }

    /// Marker from configuration
    pub fn from_config(config: &AnalyzerConfig) -> Self {
        Self::new(config.tli_issue_code, config.tli_message.clone())
    }

    /// `Status: ABORTED` plus the TLI issue code or message
    pub fn matches(&self, record: &Record) -> bool {
        if record.status() != Some("ABORTED") {
            return false;
        }
        record.issue_code() == Some(self.issue_code)
            || record
                .issue_message()
                .map_or(false, |m| m.contains(self.message.as_str()))
    }
}

/// One lock id listed by a DataShard `BreakLocks` line
#[derive(Debug, Clone)]
pub struct LockBreak {
    /// Lock that was broken
    pub lock_id: String,
    /// Physical transaction that broke it
    pub breaker_phy_tx_id: String,
    /// The `BreakLocks` line
    pub record: Arc<Record>,
}

/// Counters describing an index
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    /// Records ingested (duplicates included)
    pub records: usize,
    /// Transactions known
    pub transactions: usize,
    /// Transactions that never revealed a tx_id
    pub provisional: usize,
    /// Distinct lock ids with at least one break
    pub broken_locks: usize,
    /// Distinct TLI abort records
    pub aborts: usize,
    /// Identity and terminal-status anomalies seen
    pub anomalies: usize,
}

#[derive(Debug, Default)]
struct TraceState {
    commit_requested: bool,
    pending_success: Option<Arc<Record>>,
}

/// Incrementally built transaction index
#[derive(Debug)]
pub struct TransactionIndex {
    marker: TliMarker,
    transactions: FxHashMap<TxKey, Transaction>,
    by_trace: FxHashMap<String, TxKey>,
    by_phy_tx: FxHashMap<String, TxKey>,
    traces: FxHashMap<String, TraceState>,
    lock_breaks: FxHashMap<String, Vec<LockBreak>>,
    aborts: Vec<Arc<Record>>,
    seen_aborts: FxHashSet<(Option<String>, Timestamp, String)>,
    /// Kept only when the index will be merged into another
    records: Option<Vec<Arc<Record>>>,
    ingested: usize,
    anomalies: usize,
}

impl Default for TransactionIndex {
    fn default() -> Self {
        Self::new(TliMarker::default())
    }
}

impl TransactionIndex {
    /// Empty index using `marker` to recognize TLI aborts
    pub fn new(marker: TliMarker) -> Self {
        Self {
            marker,
            transactions: FxHashMap::default(),
            by_trace: FxHashMap::default(),
            by_phy_tx: FxHashMap::default(),
            traces: FxHashMap::default(),
            lock_breaks: FxHashMap::default(),
            aborts: Vec::new(),
            seen_aborts: FxHashSet::default(),
            records: None,
            ingested: 0,
            anomalies: 0,
        }
    }

    /// Empty index configured from `config`
    pub fn from_config(config: &AnalyzerConfig) -> Self {
        Self::new(TliMarker::from_config(config))
    }

    /// Builder: keep every ingested record so this index can later be
    /// passed to [`TransactionIndex::merge`]
    pub fn retaining_records(mut self) -> Self {
        if self.records.is_none() {
            self.records = Some(Vec::new());
        }
        self
    }

    /// Number of records ingested so far
    pub fn len(&self) -> usize {
        self.ingested
    }

    /// Whether nothing was ingested
    pub fn is_empty(&self) -> bool {
        self.ingested == 0
    }

    /// Ingest a batch of records
    pub fn ingest_all<I: IntoIterator<Item = Record>>(&mut self, records: I) {
        for record in records {
            self.ingest(record);
        }
    }

    /// Ingest one record
    pub fn ingest(&mut self, record: Record) {
        self.ingest_shared(Arc::new(record));
    }

    fn ingest_shared(&mut self, record: Arc<Record>) {
        self.ingested += 1;
        if let Some(records) = &mut self.records {
            records.push(Arc::clone(&record));
        }

        for lock_id in record.break_locks() {
            self.add_lock_break(lock_id, &record);
        }

        if self.marker.matches(&record) {
            self.add_abort(&record);
        }

        let Some(key) = self.resolve_identity(&record) else {
            return;
        };

        if let Some(phy) = record.phy_tx_id() {
            self.bind_phy_tx(phy, &key);
        }

        if let Some(tx) = self.transactions.get_mut(&key) {
            tx.observe(&record);
            if let Some(table) = record.issue_message().and_then(table_from_issue) {
                tx.add_table(table);
            }
            if let Some(event) = QueryEvent::from_record(&record) {
                tx.add_query(event);
            }
        }

        self.apply_status(&key, &record);
    }

    /// Look up or create the transaction a record belongs to
    fn resolve_identity(&mut self, record: &Record) -> Option<TxKey> {
        let (tx_id, trace_id) = identity_of(record);

        match (tx_id, trace_id) {
            (Some(tx_id), Some(trace_id)) => {
                let tx_key = TxKey::Tx(tx_id.to_string());
                match self.by_trace.get(trace_id).cloned() {
                    None => {
                        self.ensure(&tx_key);
                        self.by_trace.insert(trace_id.to_string(), tx_key.clone());
                    }
                    Some(current) if current == tx_key => {}
                    Some(provisional @ TxKey::Trace(_)) => {
                        self.fold(provisional, &tx_key);
                    }
                    Some(other) => {
                        self.anomalies += 1;
                        warn!(
                            target: "tli::index",
                            trace_id,
                            bound = %other,
                            claimed = %tx_key,
                            "Trace already bound to another transaction"
                        );
                        self.ensure(&tx_key);
                    }
                }
                Some(tx_key)
            }
            (Some(tx_id), None) => {
                let tx_key = TxKey::Tx(tx_id.to_string());
                self.ensure(&tx_key);
                Some(tx_key)
            }
            (None, Some(trace_id)) => {
                let key = self
                    .by_trace
                    .entry(trace_id.to_string())
                    .or_insert_with(|| TxKey::Trace(trace_id.to_string()))
                    .clone();
                self.ensure(&key);
                Some(key)
            }
            (None, None) => None,
        }
    }

    /// Claim a PhyTxId for `key`. Competing claims settle on the smallest
    /// key, so a tx-keyed owner beats a provisional one.
    fn bind_phy_tx(&mut self, phy: &str, key: &TxKey) {
        match self.by_phy_tx.get_mut(phy) {
            None => {
                self.by_phy_tx.insert(phy.to_string(), key.clone());
            }
            Some(owner) if *owner == *key => {}
            Some(owner) => {
                debug!(
                    target: "tli::index",
                    phy_tx_id = phy,
                    owner = %owner,
                    claimed = %key,
                    "PhyTxId claimed twice"
                );
                if *key < *owner {
                    *owner = key.clone();
                }
            }
        }
    }

    fn ensure(&mut self, key: &TxKey) {
        if !self.transactions.contains_key(key) {
            self.transactions
                .insert(key.clone(), Transaction::new(key.clone()));
        }
    }

    /// Move a provisional entity under its tx_id key and re-point its aliases
    fn fold(&mut self, from: TxKey, into: &TxKey) {
        let Some(mut provisional) = self.transactions.remove(&from) else {
            return;
        };

        for trace in provisional.trace_ids() {
            self.by_trace.insert(trace.clone(), into.clone());
        }
        for phy in provisional.phy_tx_ids() {
            if self.by_phy_tx.get(phy) == Some(&from) {
                self.by_phy_tx.insert(phy.clone(), into.clone());
            }
        }

        debug!(target: "tli::index", from = %from, into = %into, "Merged provisional transaction");

        match self.transactions.remove(into) {
            Some(mut target) => {
                let update = target.absorb(provisional);
                self.note_status_update(into, update);
                self.transactions.insert(into.clone(), target);
            }
            None => {
                provisional.rekey(into.id());
                self.transactions.insert(into.clone(), provisional);
            }
        }
    }

    fn apply_status(&mut self, key: &TxKey, record: &Arc<Record>) {
        let status = record.status();
        let mut terminal = None;

        match status {
            Some("ABORTED") if record.is_response() || self.marker.matches(record) => {
                terminal = Some((TerminalStatus::Aborted, Arc::clone(record)));
            }
            Some("COMMITTED") => {
                terminal = Some((TerminalStatus::Committed, Arc::clone(record)));
            }
            _ => {}
        }

        // Commit detection through the trace, in either arrival order
        if let Some(trace) = record.trace_id() {
            let state = self.traces.entry(trace.to_string()).or_default();
            if record.is_commit_query() && !record.is_response() {
                state.commit_requested = true;
            }
            if record.is_response() && status == Some("SUCCESS") {
                let earlier = state
                    .pending_success
                    .as_ref()
                    .map_or(true, |current| line_order(record, current) == Ordering::Less);
                if earlier {
                    state.pending_success = Some(Arc::clone(record));
                }
            }
            if terminal.is_none() && (state.commit_requested || record.is_commit_query()) {
                if let Some(success) = &state.pending_success {
                    terminal = Some((TerminalStatus::Committed, Arc::clone(success)));
                }
            }
        }

        if let Some((status, evidence)) = terminal {
            if let Some(tx) = self.transactions.get_mut(key) {
                let update = tx.set_terminal(status, &evidence);
                self.note_status_update(key, update);
            }
        }
    }

    fn note_status_update(&mut self, key: &TxKey, update: StatusUpdate) {
        if let StatusUpdate::Conflict { kept, rejected } = update {
            self.anomalies += 1;
            warn!(
                target: "tli::index",
                tx = %key,
                kept = ?kept,
                rejected = ?rejected,
                "Conflicting terminal status, earliest line kept"
            );
        }
    }

    fn add_lock_break(&mut self, lock_id: &str, record: &Arc<Record>) {
        let Some(phy) = record.phy_tx_id() else {
            debug!(target: "tli::index", lock_id, "BreakLocks line without PhyTxId");
            return;
        };
        let breaks = self.lock_breaks.entry(lock_id.to_string()).or_default();
        let seen = breaks.iter().any(|b| {
            b.breaker_phy_tx_id == phy
                && b.record.timestamp == record.timestamp
                && b.record.raw == record.raw
        });
        if !seen {
            breaks.push(LockBreak {
                lock_id: lock_id.to_string(),
                breaker_phy_tx_id: phy.to_string(),
                record: Arc::clone(record),
            });
        }
    }

    fn add_abort(&mut self, record: &Arc<Record>) {
        let dedup_key = (
            record.trace_id().map(str::to_string),
            record.timestamp,
            record.raw.clone(),
        );
        if self.seen_aborts.insert(dedup_key) {
            self.aborts.push(Arc::clone(record));
        } else {
            debug!(target: "tli::index", raw = %record.raw, "Duplicate TLI abort absorbed");
        }
    }

    /// Fold another shard's index into this one.
    ///
    /// The other shard's records are replayed through the same identity
    /// rules, so re-keying and monotonic status hold across shards.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `other` ingested records without
    /// [`TransactionIndex::retaining_records`].
    pub fn merge(&mut self, other: TransactionIndex) -> Result<()> {
        let records = match other.records {
            Some(records) => records,
            None if other.ingested == 0 => Vec::new(),
            None => {
                return Err(Error::InvalidInput(format!(
                    "cannot merge a shard index of {} records built without retained records",
                    other.ingested
                )))
            }
        };
        let count = records.len();
        for record in records {
            self.ingest_shared(record);
        }
        debug!(target: "tli::index", records = count, "Merged shard index");
        Ok(())
    }

    /// Freeze the index for the resolve phase
    pub fn finalize(self) -> FinalizedIndex {
        let mut aborts = self.aborts;
        aborts.sort_by(|a, b| {
            (a.timestamp, &a.node, &a.raw).cmp(&(b.timestamp, &b.node, &b.raw))
        });

        let mut lock_breaks = self.lock_breaks;
        for breaks in lock_breaks.values_mut() {
            breaks.sort_by(|a, b| {
                (a.record.timestamp, &a.breaker_phy_tx_id, &a.record.raw).cmp(&(
                    b.record.timestamp,
                    &b.breaker_phy_tx_id,
                    &b.record.raw,
                ))
            });
        }

        let mut by_lock: FxHashMap<String, Vec<TxKey>> = FxHashMap::default();
        let mut committed: Vec<TxKey> = Vec::new();
        for (key, tx) in &self.transactions {
            for lock_id in tx.lock_ids() {
                by_lock.entry(lock_id.clone()).or_default().push(key.clone());
            }
            if tx.status() == TerminalStatus::Committed {
                committed.push(key.clone());
            }
        }
        for keys in by_lock.values_mut() {
            keys.sort();
        }
        committed.sort();

        let stats = IndexStats {
            records: self.ingested,
            transactions: self.transactions.len(),
            provisional: self
                .transactions
                .keys()
                .filter(|k| k.is_provisional())
                .count(),
            broken_locks: lock_breaks.len(),
            aborts: aborts.len(),
            anomalies: self.anomalies,
        };

        info!(
            target: "tli::index",
            records = stats.records,
            transactions = stats.transactions,
            provisional = stats.provisional,
            aborts = stats.aborts,
            anomalies = stats.anomalies,
            "Index finalized"
        );

        FinalizedIndex {
            transactions: self.transactions,
            by_trace: self.by_trace,
            by_phy_tx: self.by_phy_tx,
            by_lock,
            committed,
            lock_breaks,
            aborts,
            stats,
        }
    }
}

/// (tx_id, trace_id) of a record. A TxId equal to the record's own PhyTxId
/// is a DataShard-level id, not a logical transaction.
fn identity_of(record: &Record) -> (Option<&str>, Option<&str>) {
    let tx_id = record.tx_id().filter(|tx| Some(*tx) != record.phy_tx_id());
    (tx_id, record.trace_id())
}

/// Read-only index handed to the resolver
#[derive(Debug)]
pub struct FinalizedIndex {
    transactions: FxHashMap<TxKey, Transaction>,
    by_trace: FxHashMap<String, TxKey>,
    by_phy_tx: FxHashMap<String, TxKey>,
    by_lock: FxHashMap<String, Vec<TxKey>>,
    committed: Vec<TxKey>,
    lock_breaks: FxHashMap<String, Vec<LockBreak>>,
    aborts: Vec<Arc<Record>>,
    stats: IndexStats,
}

impl FinalizedIndex {
    /// Transaction by key
    pub fn get(&self, key: &TxKey) -> Option<&Transaction> {
        self.transactions.get(key)
    }

    /// Transaction a trace belongs to
    pub fn by_trace(&self, trace_id: &str) -> Option<&Transaction> {
        self.by_trace
            .get(trace_id)
            .and_then(|k| self.transactions.get(k))
    }

    /// Transaction by tx_id
    pub fn by_tx_id(&self, tx_id: &str) -> Option<&Transaction> {
        self.transactions.get(&TxKey::Tx(tx_id.to_string()))
    }

    /// Transaction a physical transaction id was reported for
    pub fn by_phy_tx_id(&self, phy_tx_id: &str) -> Option<&Transaction> {
        self.by_phy_tx
            .get(phy_tx_id)
            .and_then(|k| self.transactions.get(k))
    }

    /// Transaction a record belongs to: by tx_id first, then by trace
    pub fn transaction_for(&self, record: &Record) -> Option<&Transaction> {
        let (tx_id, trace_id) = identity_of(record);
        tx_id
            .and_then(|tx| self.by_tx_id(tx))
            .or_else(|| trace_id.and_then(|trace| self.by_trace(trace)))
    }

    /// All transactions, in no particular order
    pub fn transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions.values()
    }

    /// Transactions that touched any of `lock_ids`, each once, in key order
    pub fn transactions_with_locks<'a, I>(&self, lock_ids: I) -> Vec<&Transaction>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let keys: BTreeSet<&TxKey> = lock_ids
            .into_iter()
            .filter_map(|lock| self.by_lock.get(lock))
            .flatten()
            .collect();
        keys.into_iter()
            .filter_map(|k| self.transactions.get(k))
            .collect()
    }

    /// Committed transactions, in key order
    pub fn committed(&self) -> impl Iterator<Item = &Transaction> {
        self.committed
            .iter()
            .filter_map(|k| self.transactions.get(k))
    }

    /// Breaks recorded for a lock id, oldest first
    pub fn lock_breaks(&self, lock_id: &str) -> &[LockBreak] {
        self.lock_breaks
            .get(lock_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// TLI abort records in (timestamp, node, raw) order
    pub fn aborts(&self) -> &[Arc<Record>] {
        &self.aborts
    }

    /// Index counters
    pub fn stats(&self) -> IndexStats {
        self.stats
    }
}
