//! Parsed log records
//!
//! A [`Record`] is one accepted diagnostic line: the header (timestamp, node,
//! process, service tag, severity) plus the trailing `Key: value` section,
//! stored as a [`Fields`] map over the closed [`FieldName`] enumeration.
//! Records are immutable once built.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// UTC instant embedded in a log line
pub type Timestamp = DateTime<Utc>;

/// Parse the RFC 3339 timestamp written by ydbd (`2025-10-22T07:54:51.433950Z`)
pub fn parse_timestamp(text: &str) -> Option<Timestamp> {
    DateTime::parse_from_rfc3339(text.trim())
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

/// Render a timestamp the way ydbd writes it, microsecond precision with `Z`
pub fn format_timestamp(ts: &Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Table path named by a TLI issue message.
///
/// The path follows `Table:` inside backticks; without backticks it runs to
/// the next quote, comma or whitespace.
pub fn table_from_issue(message: &str) -> Option<&str> {
    let start = message.find("Table:")? + "Table:".len();
    let rest = message[start..].trim_start();
    let table = match rest.strip_prefix('`') {
        Some(inner) => &inner[..inner.find('`')?],
        None => {
            let end = rest
                .find(|c: char| c == '"' || c == ',' || c == '`' || c.is_whitespace())
                .unwrap_or(rest.len());
            &rest[..end]
        }
    };
    let table = table.trim();
    if table.is_empty() {
        None
    } else {
        Some(table)
    }
}

/// Recognized keys of the field section. Anything else is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FieldName {
    /// Emitting actor (`SessionActor`, `DataShard`, ...)
    Component,
    /// Client session identifier
    SessionId,
    /// Per-attempt correlation token
    TraceId,
    /// Line shape: `Request`, `Response`, `Locks`, `Finished`, ...
    Type,
    /// Logical transaction id
    TxId,
    /// DataShard physical transaction id
    PhyTxId,
    /// Lock id(s) held by the transaction
    LockId,
    /// Executer lock block: `[LockId: N DataShard: ... LockId: M ...]`
    Locks,
    /// Lock ids broken by a physical transaction
    BreakLocks,
    /// Operation status (`SUCCESS`, `ABORTED`, `LOCKS_BROKEN`, ...)
    Status,
    /// Raw `{ message: ... issue_code: ... }` block
    Issues,
    /// Numeric issue code
    IssueCode,
    /// Issue message text
    IssueMessage,
    /// `QUERY_ACTION_EXECUTE`, `QUERY_ACTION_COMMIT_TX`, ...
    QueryAction,
    /// Query type
    QueryType,
    /// Query text or its hash
    QueryText,
    /// Whether the request commits the transaction
    NeedCommitTx,
    /// DataShard tablet id
    TabletId,
}

impl FieldName {
    /// Every recognized field name
    pub const ALL: [FieldName; 18] = [
        FieldName::Component,
        FieldName::SessionId,
        FieldName::TraceId,
        FieldName::Type,
        FieldName::TxId,
        FieldName::PhyTxId,
        FieldName::LockId,
        FieldName::Locks,
        FieldName::BreakLocks,
        FieldName::Status,
        FieldName::Issues,
        FieldName::IssueCode,
        FieldName::IssueMessage,
        FieldName::QueryAction,
        FieldName::QueryType,
        FieldName::QueryText,
        FieldName::NeedCommitTx,
        FieldName::TabletId,
    ];

    /// The key as it appears in the log line
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldName::Component => "Component",
            FieldName::SessionId => "SessionId",
            FieldName::TraceId => "TraceId",
            FieldName::Type => "Type",
            FieldName::TxId => "TxId",
            FieldName::PhyTxId => "PhyTxId",
            FieldName::LockId => "LockId",
            FieldName::Locks => "Locks",
            FieldName::BreakLocks => "BreakLocks",
            FieldName::Status => "Status",
            FieldName::Issues => "Issues",
            FieldName::IssueCode => "IssueCode",
            FieldName::IssueMessage => "IssueMessage",
            FieldName::QueryAction => "QueryAction",
            FieldName::QueryType => "QueryType",
            FieldName::QueryText => "QueryText",
            FieldName::NeedCommitTx => "NeedCommitTx",
            FieldName::TabletId => "TabletId",
        }
    }

    /// Look up a key from the log line; `None` for unrecognized keys
    pub fn from_key(key: &str) -> Option<Self> {
        FieldName::ALL.iter().copied().find(|f| f.as_str() == key)
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier values ydbd writes when an id is not known yet
const ABSENT_IDS: [&str; 3] = ["", "Empty", "Unknown"];

/// Field section of a record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fields(BTreeMap<FieldName, String>);

impl Fields {
    /// Create an empty field map
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field. The first occurrence of a key wins.
    pub fn insert(&mut self, name: FieldName, value: impl Into<String>) {
        self.0.entry(name).or_insert_with(|| value.into());
    }

    /// Raw value of a field
    pub fn get(&self, name: FieldName) -> Option<&str> {
        self.0.get(&name).map(String::as_str)
    }

    /// Identifier value of a field, with ydbd's placeholder values filtered out
    pub fn ident(&self, name: FieldName) -> Option<&str> {
        self.get(name)
            .map(str::trim)
            .filter(|v| !ABSENT_IDS.contains(v))
    }

    /// Whether the field is present
    pub fn contains(&self, name: FieldName) -> bool {
        self.0.contains_key(&name)
    }

    /// Number of recognized fields
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no recognized field was found
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate fields in key order
    pub fn iter(&self) -> impl Iterator<Item = (FieldName, &str)> {
        self.0.iter().map(|(k, v)| (*k, v.as_str()))
    }
}

/// Request/response shape of a session line, from its `Type:` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Query request received by the session actor
    Request,
    /// Query response sent by the session actor
    Response,
}

impl Direction {
    /// Map a `Type:` value to a direction. Other line types have none.
    pub fn from_type(value: &str) -> Option<Self> {
        match value.trim() {
            "Request" => Some(Direction::Request),
            "Response" => Some(Direction::Response),
            _ => None,
        }
    }
}

/// Query action carried by request lines
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QueryAction {
    /// `QUERY_ACTION_EXECUTE`
    Execute,
    /// `QUERY_ACTION_COMMIT_TX`
    CommitTx,
    /// Any other action, kept verbatim
    Other(String),
}

impl QueryAction {
    /// Parse the log spelling of an action
    pub fn from_log(value: &str) -> Self {
        match value.trim() {
            "QUERY_ACTION_EXECUTE" => QueryAction::Execute,
            "QUERY_ACTION_COMMIT_TX" => QueryAction::CommitTx,
            other => QueryAction::Other(other.to_string()),
        }
    }

    /// The log spelling of the action
    pub fn as_log_str(&self) -> &str {
        match self {
            QueryAction::Execute => "QUERY_ACTION_EXECUTE",
            QueryAction::CommitTx => "QUERY_ACTION_COMMIT_TX",
            QueryAction::Other(s) => s,
        }
    }
}

impl fmt::Display for QueryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_log_str())
    }
}

/// One accepted log line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Instant written by the emitting process (only comparable per node)
    pub timestamp: Timestamp,
    /// Host name of the emitting node; empty for raw-format logs
    pub node: String,
    /// Process name and pid, e.g. `ydbd[889]`; empty for raw-format logs
    pub process: String,
    /// Service tag, e.g. `DATA_INTEGRITY`
    pub service: String,
    /// Severity, e.g. `DEBUG`
    pub severity: String,
    /// Request/response shape, if the line is one
    pub direction: Option<Direction>,
    /// Recognized key-value fields
    pub fields: Fields,
    /// Original line, kept for evidence
    pub raw: String,
}

impl Record {
    /// Session id, if known
    pub fn session_id(&self) -> Option<&str> {
        self.fields.ident(FieldName::SessionId)
    }

    /// Trace id, if known
    pub fn trace_id(&self) -> Option<&str> {
        self.fields.ident(FieldName::TraceId)
    }

    /// Transaction id, if known
    pub fn tx_id(&self) -> Option<&str> {
        self.fields.ident(FieldName::TxId)
    }

    /// Physical transaction id, if known
    pub fn phy_tx_id(&self) -> Option<&str> {
        self.fields.ident(FieldName::PhyTxId)
    }

    /// Status value
    pub fn status(&self) -> Option<&str> {
        self.fields.get(FieldName::Status).map(str::trim)
    }

    /// Lock ids from a top-level `LockId:` followed by every `LockId:` of
    /// a `Locks: [...]` block, in line order. Repeats are kept.
    pub fn lock_ids(&self) -> Vec<&str> {
        let mut ids = split_id_list(self.fields.get(FieldName::LockId));
        if let Some(block) = self.fields.get(FieldName::Locks) {
            ids.extend(lock_ids_in_block(block));
        }
        ids
    }

    /// Lock ids from `BreakLocks: [...]`
    pub fn break_locks(&self) -> Vec<&str> {
        split_id_list(self.fields.get(FieldName::BreakLocks))
    }

    /// Query action, if the line carries one
    pub fn query_action(&self) -> Option<QueryAction> {
        self.fields
            .get(FieldName::QueryAction)
            .filter(|v| !v.trim().is_empty())
            .map(QueryAction::from_log)
    }

    /// Query text (opaque)
    pub fn query_text(&self) -> Option<&str> {
        self.fields
            .get(FieldName::QueryText)
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    /// Query type
    pub fn query_type(&self) -> Option<&str> {
        self.fields
            .get(FieldName::QueryType)
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    /// Whether the request asks to commit the transaction
    pub fn needs_commit(&self) -> bool {
        matches!(
            self.fields.get(FieldName::NeedCommitTx).map(str::trim),
            Some("true") | Some("1")
        )
    }

    /// Whether this line is a commit-type query (`COMMIT_TX` or `NeedCommitTx`)
    pub fn is_commit_query(&self) -> bool {
        self.needs_commit() || self.query_action() == Some(QueryAction::CommitTx)
    }

    /// Numeric issue code
    pub fn issue_code(&self) -> Option<u32> {
        self.fields
            .get(FieldName::IssueCode)
            .and_then(|v| v.trim().parse().ok())
    }

    /// Issue message, falling back to the raw `Issues` block
    pub fn issue_message(&self) -> Option<&str> {
        self.fields
            .get(FieldName::IssueMessage)
            .or_else(|| self.fields.get(FieldName::Issues))
    }

    /// Whether this is a response line
    pub fn is_response(&self) -> bool {
        self.direction == Some(Direction::Response)
    }
}

fn split_id_list(value: Option<&str>) -> Vec<&str> {
    match value {
        Some(v) => v
            .trim()
            .trim_start_matches('[')
            .trim_end_matches(']')
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|s| !s.is_empty())
            .collect(),
        None => Vec::new(),
    }
}

fn lock_ids_in_block(block: &str) -> impl Iterator<Item = &str> {
    block.split("LockId:").skip(1).filter_map(|chunk| {
        let chunk = chunk.trim_start();
        let end = chunk
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(chunk.len());
        (end > 0).then(|| &chunk[..end])
    })
}
