//! Resolved lock invalidation events

use std::fmt;
use std::sync::Arc;

use crate::record::{Record, Timestamp};
use crate::transaction::Transaction;

/// How a culprit was matched to its victim, strongest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MatchStrategy {
    /// DataShard `BreakLocks` line names a lock the victim held
    BrokenLockChain,
    /// Committed transaction touched a lock id the victim touched
    SharedLock,
    /// Committed transaction referenced the victim's table shortly before
    TableTiming,
}

impl MatchStrategy {
    /// Short name used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStrategy::BrokenLockChain => "broken_lock_chain",
            MatchStrategy::SharedLock => "shared_lock",
            MatchStrategy::TableTiming => "table_timing",
        }
    }
}

impl fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The aborted side of an event
#[derive(Debug, Clone)]
pub struct Victim {
    /// Victim transaction as reconstructed at resolve time
    pub transaction: Transaction,
    /// The aborting TLI record
    pub record: Arc<Record>,
}

/// The committing side of an event
#[derive(Debug, Clone)]
pub struct Culprit {
    /// Culprit transaction as reconstructed at resolve time
    pub transaction: Transaction,
    /// The committing (or lock-breaking) record
    pub record: Arc<Record>,
    /// Trace of the committing attempt
    pub trace_id: Option<String>,
    /// Physical transaction id that broke the lock, if known
    pub phy_tx_id: Option<String>,
    /// Strategy that produced the match
    pub strategy: MatchStrategy,
}

/// One TLI failure with its most probable cause
#[derive(Debug, Clone)]
pub struct LockInvalidationEvent {
    /// 1-based, dense, in detection order
    pub event_id: u64,
    /// Victim abort timestamp
    pub timestamp: Timestamp,
    /// Table named by the abort issue message; empty when not extractable
    pub table: String,
    /// Contested lock, if resolved
    pub lock_id: Option<String>,
    /// Aborted transaction
    pub victim: Victim,
    /// Committing transaction, if resolved
    pub culprit: Option<Culprit>,
    /// Every line used as evidence, newest first (only when collected)
    pub evidence: Vec<String>,
}

impl LockInvalidationEvent {
    /// Whether a culprit was found
    pub fn is_resolved(&self) -> bool {
        self.culprit.is_some()
    }
}
