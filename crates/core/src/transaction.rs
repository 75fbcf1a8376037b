//! Reconstructed transactions
//!
//! A [`Transaction`] accumulates everything the log says about one logical
//! transaction: its query history, terminal outcome, touched locks and the
//! physical transaction ids DataShards knew it by.
//!
//! Identity starts provisional ([`TxKey::Trace`]) and becomes
//! [`TxKey::Tx`] once a record reveals the tx_id; [`Transaction::absorb`]
//! folds a provisional entity into the tx-keyed one.
//!
//! Every attribute that several lines could supply is taken from the
//! earliest line by (timestamp, raw text), so the result does not depend on
//! the order lines were ingested in. The same rule settles duplicate queries
//! and conflicting terminal statuses.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashSet;

use crate::record::{QueryAction, Record, Timestamp};

/// Key of a transaction in the index
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TxKey {
    /// Known transaction id
    Tx(String),
    /// Provisional key: the first trace id seen before any tx_id
    Trace(String),
    /// Known only by a physical transaction id; never stored in the index
    Phy(String),
}

impl TxKey {
    /// The identifier inside the key
    pub fn id(&self) -> &str {
        match self {
            TxKey::Tx(id) | TxKey::Trace(id) | TxKey::Phy(id) => id,
        }
    }

    /// Whether this key is still provisional
    pub fn is_provisional(&self) -> bool {
        matches!(self, TxKey::Trace(_))
    }
}

impl fmt::Display for TxKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxKey::Tx(id) => write!(f, "tx:{}", id),
            TxKey::Trace(id) => write!(f, "trace:{}", id),
            TxKey::Phy(id) => write!(f, "phy:{}", id),
        }
    }
}

/// Total order on lines: timestamp, then raw text
pub fn line_order(a: &Record, b: &Record) -> Ordering {
    a.timestamp.cmp(&b.timestamp).then_with(|| a.raw.cmp(&b.raw))
}

/// Keep whichever of `current` and `candidate` comes first in [`line_order`]
fn keep_earliest(current: &mut Option<Arc<Record>>, candidate: &Arc<Record>) {
    let replace = match current {
        Some(existing) => line_order(candidate, existing) == Ordering::Less,
        None => true,
    };
    if replace {
        *current = Some(Arc::clone(candidate));
    }
}

/// One query issued inside a transaction
#[derive(Debug, Clone)]
pub struct QueryEvent {
    /// Query action
    pub action: QueryAction,
    /// Query type, if logged
    pub query_type: Option<String>,
    /// Query text or hash, never parsed
    pub query_text: Option<String>,
    /// Record timestamp
    pub timestamp: Timestamp,
    /// Trace of the attempt that issued the query
    pub trace_id: Option<String>,
    /// Whether the query commits the transaction
    pub commit: bool,
    /// Source line
    pub record: Arc<Record>,
}

type QueryKey = (QueryAction, Timestamp, Option<String>);

impl QueryEvent {
    /// Build a query event from a record carrying `QueryAction`/`QueryText`
    pub fn from_record(record: &Arc<Record>) -> Option<Self> {
        let action = record.query_action();
        let text = record.query_text();
        if action.is_none() && text.is_none() {
            return None;
        }
        Some(QueryEvent {
            action: action.unwrap_or(QueryAction::Other(String::new())),
            query_type: record.query_type().map(str::to_string),
            query_text: text.map(str::to_string),
            timestamp: record.timestamp,
            trace_id: record.trace_id().map(str::to_string),
            commit: record.is_commit_query(),
            record: Arc::clone(record),
        })
    }

    /// Identity of a query: two lines with equal keys log the same query
    fn key(&self) -> QueryKey {
        (self.action.clone(), self.timestamp, self.query_text.clone())
    }

    fn same_query(&self, other: &QueryEvent) -> bool {
        self.action == other.action
            && self.timestamp == other.timestamp
            && self.query_text == other.query_text
    }
}

/// Terminal outcome of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminalStatus {
    /// No terminal record seen
    Unknown,
    /// Committed successfully
    Committed,
    /// Aborted
    Aborted,
}

impl TerminalStatus {
    /// Whether the status is Committed or Aborted
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TerminalStatus::Unknown)
    }
}

/// Outcome of a terminal status update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusUpdate {
    /// The status was set by this update
    Set,
    /// The status already had this value, or the update carried none
    Unchanged,
    /// Two different terminal statuses were seen; the one backed by the
    /// earliest line is kept
    Conflict {
        /// Status retained
        kept: TerminalStatus,
        /// Status rejected
        rejected: TerminalStatus,
    },
}

/// A logical transaction reconstructed from the log
#[derive(Debug, Clone)]
pub struct Transaction {
    key: TxKey,
    tx_id: Option<String>,
    session_source: Option<Arc<Record>>,
    node_source: Option<Arc<Record>>,
    trace_ids: BTreeSet<String>,
    phy_tx_ids: BTreeSet<String>,
    queries: Vec<QueryEvent>,
    query_keys: FxHashSet<QueryKey>,
    status: TerminalStatus,
    status_record: Option<Arc<Record>>,
    lock_ids: BTreeSet<String>,
    lock_records: Vec<Arc<Record>>,
    tables: BTreeSet<String>,
}

impl Transaction {
    /// Create an empty transaction under the given key
    pub fn new(key: TxKey) -> Self {
        let tx_id = match &key {
            TxKey::Tx(id) => Some(id.clone()),
            TxKey::Trace(_) | TxKey::Phy(_) => None,
        };
        let mut trace_ids = BTreeSet::new();
        let mut phy_tx_ids = BTreeSet::new();
        match &key {
            TxKey::Trace(trace) => {
                trace_ids.insert(trace.clone());
            }
            TxKey::Phy(phy) => {
                phy_tx_ids.insert(phy.clone());
            }
            TxKey::Tx(_) => {}
        }
        Transaction {
            key,
            tx_id,
            session_source: None,
            node_source: None,
            trace_ids,
            phy_tx_ids,
            queries: Vec::new(),
            query_keys: FxHashSet::default(),
            status: TerminalStatus::Unknown,
            status_record: None,
            lock_ids: BTreeSet::new(),
            lock_records: Vec::new(),
            tables: BTreeSet::new(),
        }
    }

    /// Snapshot of a transaction known only through one record
    pub fn from_record(record: &Arc<Record>) -> Self {
        let key = match (record.tx_id(), record.trace_id()) {
            (Some(tx), _) => TxKey::Tx(tx.to_string()),
            (None, Some(trace)) => TxKey::Trace(trace.to_string()),
            (None, None) => TxKey::Trace(String::new()),
        };
        let mut tx = Transaction::new(key);
        tx.observe(record);
        tx
    }

    /// Placeholder for a lock breaker whose PhyTxId no session line maps to
    /// a logical transaction. Only the node of `record` is taken over.
    pub fn unmapped_breaker(phy_tx_id: &str, record: &Arc<Record>) -> Self {
        let mut tx = Transaction::new(TxKey::Phy(phy_tx_id.to_string()));
        if !record.node.is_empty() {
            tx.node_source = Some(Arc::clone(record));
        }
        tx
    }

    /// Index key
    pub fn key(&self) -> &TxKey {
        &self.key
    }

    /// Whether the transaction is only known by a physical transaction id
    pub fn is_unmapped(&self) -> bool {
        matches!(self.key, TxKey::Phy(_))
    }

    /// Transaction id, once known
    pub fn tx_id(&self) -> Option<&str> {
        self.tx_id.as_deref()
    }

    /// Session the transaction ran in, from the earliest line naming one
    pub fn session_id(&self) -> Option<&str> {
        self.session_source.as_ref().and_then(|r| r.session_id())
    }

    /// Node of the earliest line carrying one
    pub fn node(&self) -> Option<&str> {
        self.node_source.as_ref().map(|r| r.node.as_str())
    }

    /// Process of the same line as [`Transaction::node`]
    pub fn process(&self) -> Option<&str> {
        self.node_source.as_ref().map(|r| r.process.as_str())
    }

    /// All trace ids attributed to the transaction
    pub fn trace_ids(&self) -> &BTreeSet<String> {
        &self.trace_ids
    }

    /// Physical transaction ids known for the transaction
    pub fn phy_tx_ids(&self) -> &BTreeSet<String> {
        &self.phy_tx_ids
    }

    /// Smallest known physical transaction id
    pub fn phy_tx_id(&self) -> Option<&str> {
        self.phy_tx_ids.iter().next().map(String::as_str)
    }

    /// Query history in ascending (timestamp, raw line) order
    pub fn queries(&self) -> &[QueryEvent] {
        &self.queries
    }

    /// Terminal status
    pub fn status(&self) -> TerminalStatus {
        self.status
    }

    /// Earliest record proving the terminal status
    pub fn status_record(&self) -> Option<&Arc<Record>> {
        self.status_record.as_ref()
    }

    /// Lock ids the transaction is known to have touched
    pub fn lock_ids(&self) -> &BTreeSet<String> {
        &self.lock_ids
    }

    /// Lines that revealed the transaction's lock ids, in line order
    pub fn lock_records(&self) -> &[Arc<Record>] {
        &self.lock_records
    }

    /// Tables named by issue messages of the transaction
    pub fn tables(&self) -> &BTreeSet<String> {
        &self.tables
    }

    /// Stable identifier used for tie-breaks and log output
    pub fn sort_id(&self) -> &str {
        self.tx_id.as_deref().unwrap_or_else(|| self.key.id())
    }

    /// Record descriptive attributes of a line attributed to this transaction
    pub fn observe(&mut self, record: &Arc<Record>) {
        if self.tx_id.is_none() {
            // A TxId equal to the line's PhyTxId is DataShard-level
            self.tx_id = record
                .tx_id()
                .filter(|tx| Some(*tx) != record.phy_tx_id())
                .map(str::to_string);
        }
        if record.session_id().is_some() {
            keep_earliest(&mut self.session_source, record);
        }
        if !record.node.is_empty() {
            keep_earliest(&mut self.node_source, record);
        }
        if let Some(trace) = record.trace_id() {
            self.trace_ids.insert(trace.to_string());
        }
        if let Some(phy) = record.phy_tx_id() {
            self.phy_tx_ids.insert(phy.to_string());
        }
        let locks = record.lock_ids();
        if !locks.is_empty() {
            for lock in locks {
                self.lock_ids.insert(lock.to_string());
            }
            self.add_lock_record(record);
        }
    }

    fn add_lock_record(&mut self, record: &Arc<Record>) {
        match self
            .lock_records
            .binary_search_by(|r| line_order(r, record))
        {
            Ok(_) => {}
            Err(pos) => self.lock_records.insert(pos, Arc::clone(record)),
        }
    }

    /// Promote a provisional transaction to its tx_id key
    pub fn rekey(&mut self, tx_id: &str) {
        self.key = TxKey::Tx(tx_id.to_string());
        self.tx_id = Some(tx_id.to_string());
    }

    /// Add a query event; duplicates by (action, timestamp, text) are absorbed
    /// and the one from the smallest raw line is kept.
    ///
    /// Returns `true` if the event was new.
    pub fn add_query(&mut self, event: QueryEvent) -> bool {
        if self.query_keys.insert(event.key()) {
            let pos = self.query_position(&event);
            self.queries.insert(pos, event);
            return true;
        }

        let same_instant = self
            .queries
            .partition_point(|q| q.timestamp < event.timestamp);
        let existing = self.queries[same_instant..]
            .iter()
            .take_while(|q| q.timestamp == event.timestamp)
            .position(|q| q.same_query(&event))
            .map(|offset| same_instant + offset);
        if let Some(at) = existing {
            if event.record.raw < self.queries[at].record.raw {
                self.queries.remove(at);
                let pos = self.query_position(&event);
                self.queries.insert(pos, event);
            }
        }
        false
    }

    fn query_position(&self, event: &QueryEvent) -> usize {
        self.queries
            .partition_point(|q| line_order(&q.record, &event.record) != Ordering::Greater)
    }

    /// Add a lock id
    pub fn add_lock(&mut self, lock_id: &str) {
        self.lock_ids.insert(lock_id.to_string());
    }

    /// Add a table name
    pub fn add_table(&mut self, table: &str) {
        if !table.is_empty() {
            self.tables.insert(table.to_string());
        }
    }

    /// Record a terminal status.
    ///
    /// A repeated status keeps the earliest proving line. Two different
    /// terminal statuses are a conflict; the status whose line comes first
    /// in [`line_order`] wins, whatever order the lines arrived in.
    pub fn set_terminal(&mut self, status: TerminalStatus, record: &Arc<Record>) -> StatusUpdate {
        if !status.is_terminal() {
            return StatusUpdate::Unchanged;
        }
        if !self.status.is_terminal() {
            self.status = status;
            self.status_record = Some(Arc::clone(record));
            return StatusUpdate::Set;
        }

        let earlier = self
            .status_record
            .as_ref()
            .map_or(true, |current| line_order(record, current) == Ordering::Less);
        if self.status == status {
            if earlier {
                self.status_record = Some(Arc::clone(record));
            }
            return StatusUpdate::Unchanged;
        }

        if earlier {
            let rejected = self.status;
            self.status = status;
            self.status_record = Some(Arc::clone(record));
            StatusUpdate::Conflict {
                kept: status,
                rejected,
            }
        } else {
            StatusUpdate::Conflict {
                kept: self.status,
                rejected: status,
            }
        }
    }

    /// Fold another entity of the same transaction into this one
    pub fn absorb(&mut self, other: Transaction) -> StatusUpdate {
        if self.tx_id.is_none() {
            self.tx_id = other.tx_id;
        }
        if let Some(record) = &other.session_source {
            keep_earliest(&mut self.session_source, record);
        }
        if let Some(record) = &other.node_source {
            keep_earliest(&mut self.node_source, record);
        }
        self.trace_ids.extend(other.trace_ids);
        self.phy_tx_ids.extend(other.phy_tx_ids);
        self.lock_ids.extend(other.lock_ids);
        for record in &other.lock_records {
            self.add_lock_record(record);
        }
        self.tables.extend(other.tables);
        for query in other.queries {
            self.add_query(query);
        }
        match other.status_record {
            Some(record) => self.set_terminal(other.status, &record),
            None => StatusUpdate::Unchanged,
        }
    }

    /// Latest commit instant not after `limit`, with the record proving it.
    ///
    /// Uses commit-type query events first, then a Committed terminal record.
    pub fn commit_at_or_before(&self, limit: &Timestamp) -> Option<(Timestamp, Arc<Record>)> {
        let from_queries = self
            .queries
            .iter()
            .rev()
            .find(|q| q.commit && q.timestamp <= *limit)
            .map(|q| (q.timestamp, Arc::clone(&q.record)));
        if from_queries.is_some() {
            return from_queries;
        }
        match (&self.status, &self.status_record) {
            (TerminalStatus::Committed, Some(record)) if record.timestamp <= *limit => {
                Some((record.timestamp, Arc::clone(record)))
            }
            _ => None,
        }
    }

    /// Text of the latest commit-type query, or of the final query
    pub fn headline_query_text(&self) -> Option<&str> {
        self.queries
            .iter()
            .rev()
            .find(|q| q.commit && q.query_text.is_some())
            .or_else(|| self.queries.iter().rev().find(|q| q.query_text.is_some()))
            .and_then(|q| q.query_text.as_deref())
    }
}
