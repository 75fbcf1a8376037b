//! Culprit matching strategies
//!
//! Each strategy looks at one victim and returns its candidates, best
//! first. The correlator asks the strategies in order and takes the first
//! non-empty answer:
//!
//! 1. [`BrokenLockChain`]: a DataShard `BreakLocks` line names a lock the
//!    victim held; its PhyTxId leads to the breaking transaction, or stands
//!    in for it when no session line maps that PhyTxId
//! 2. [`SharedLock`]: another transaction touched one of the victim's lock
//!    ids and committed at or before the abort
//! 3. [`TableTiming`]: the victim has no lock ids; a committed transaction
//!    that referenced the victim's table at or before the abort

use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::Arc;

use tli_core::{MatchStrategy, Record, TerminalStatus, Timestamp, Transaction};
use tli_ingest::{FinalizedIndex, LockBreak};
use tracing::debug;

// ============================================================================
// Victim / Candidate
// ============================================================================

/// What the strategies know about the victim
#[derive(Debug, Clone, Copy)]
pub struct VictimContext<'a> {
    /// Victim transaction
    pub transaction: &'a Transaction,
    /// The aborting TLI record
    pub record: &'a Record,
    /// Table named by the abort; empty if unknown
    pub table: &'a str,
}

impl<'a> VictimContext<'a> {
    /// Abort instant
    pub fn timestamp(&self) -> Timestamp {
        self.record.timestamp
    }

    /// Lock ids the victim touched
    pub fn lock_ids(&self) -> &'a BTreeSet<String> {
        self.transaction.lock_ids()
    }

    /// Whether `tx` is the victim itself
    pub fn is_self(&self, tx: &Transaction) -> bool {
        tx.key() == self.transaction.key()
    }
}

/// A possible culprit
#[derive(Debug, Clone)]
pub struct Candidate<'a> {
    /// Candidate transaction; owned only for an unmapped lock breaker
    pub transaction: Cow<'a, Transaction>,
    /// Committing (or lock-breaking) record
    pub record: Arc<Record>,
    /// Instant used for ranking
    pub at: Timestamp,
    /// Contested lock, when the strategy pins one down
    pub lock_id: Option<String>,
    /// Physical transaction that broke the lock
    pub phy_tx_id: Option<String>,
    /// Further lines backing the match
    pub evidence: Vec<Arc<Record>>,
}

/// Pluggable culprit matching
///
/// Implementations must not mutate anything; the index is read-only during
/// the resolve phase.
pub trait CulpritStrategy: Send + Sync {
    /// Candidates for `victim`, best first. Empty if the strategy has no
    /// opinion.
    fn candidates<'a>(
        &self,
        victim: &VictimContext<'_>,
        index: &'a FinalizedIndex,
    ) -> Vec<Candidate<'a>>;

    /// Which strategy this is, reported on the event
    fn kind(&self) -> MatchStrategy;
}

/// The default strategy list, strongest evidence first
pub fn default_strategies() -> Vec<Box<dyn CulpritStrategy>> {
    vec![
        Box::new(BrokenLockChain),
        Box::new(SharedLock),
        Box::new(TableTiming),
    ]
}

/// Latest commit first; exact ties go to the smaller tx_id
fn by_closest_commit(a: &Candidate<'_>, b: &Candidate<'_>) -> Ordering {
    b.at.cmp(&a.at).then_with(|| by_identity(a, b))
}

/// Mapped transactions before unmapped breakers, then smaller tx_id, then key
fn by_identity(a: &Candidate<'_>, b: &Candidate<'_>) -> Ordering {
    a.transaction
        .is_unmapped()
        .cmp(&b.transaction.is_unmapped())
        .then_with(|| a.transaction.sort_id().cmp(b.transaction.sort_id()))
        .then_with(|| a.transaction.key().cmp(b.transaction.key()))
}

/// Committed-or-undecided transaction's latest commit at or before the abort
fn prior_commit(tx: &Transaction, limit: &Timestamp) -> Option<(Timestamp, Arc<Record>)> {
    if tx.status() == TerminalStatus::Aborted {
        return None;
    }
    tx.commit_at_or_before(limit)
}

// ============================================================================
// BrokenLockChain
// ============================================================================

/// victim lock id → `BreakLocks` line → breaker PhyTxId → breaker transaction
///
/// Breakers that themselves aborted are skipped. A breaker PhyTxId no
/// session line maps to a transaction still yields a candidate: a
/// placeholder carrying only the PhyTxId and the `BreakLocks` line.
#[derive(Debug, Clone, Copy, Default)]
pub struct BrokenLockChain;

impl BrokenLockChain {
    /// Candidate for one mapped breaker
    fn mapped<'a>(
        breaker: &'a Transaction,
        brk: &LockBreak,
        abort_at: &Timestamp,
    ) -> Candidate<'a> {
        let mut evidence = vec![Arc::clone(&brk.record)];
        let record = match breaker.commit_at_or_before(abort_at) {
            Some((_, commit)) => {
                evidence.push(Arc::clone(&commit));
                commit
            }
            None => breaker
                .queries()
                .last()
                .map(|q| Arc::clone(&q.record))
                .unwrap_or_else(|| Arc::clone(&brk.record)),
        };
        Candidate {
            transaction: Cow::Borrowed(breaker),
            record,
            at: brk.record.timestamp,
            lock_id: Some(brk.lock_id.clone()),
            phy_tx_id: Some(brk.breaker_phy_tx_id.clone()),
            evidence,
        }
    }

    /// Partial candidate for a breaker known only by its PhyTxId
    fn unmapped<'a>(brk: &LockBreak) -> Candidate<'a> {
        debug!(
            target: "tli::correlate",
            phy_tx_id = %brk.breaker_phy_tx_id,
            lock_id = %brk.lock_id,
            "Lock breaker not mapped to a transaction"
        );
        Candidate {
            transaction: Cow::Owned(Transaction::unmapped_breaker(
                &brk.breaker_phy_tx_id,
                &brk.record,
            )),
            record: Arc::clone(&brk.record),
            at: brk.record.timestamp,
            lock_id: Some(brk.lock_id.clone()),
            phy_tx_id: Some(brk.breaker_phy_tx_id.clone()),
            evidence: vec![Arc::clone(&brk.record)],
        }
    }
}

impl CulpritStrategy for BrokenLockChain {
    fn candidates<'a>(
        &self,
        victim: &VictimContext<'_>,
        index: &'a FinalizedIndex,
    ) -> Vec<Candidate<'a>> {
        let abort_at = victim.timestamp();
        let mut found: Vec<Candidate<'a>> = Vec::new();

        for lock_id in victim.lock_ids() {
            for brk in index.lock_breaks(lock_id) {
                // A transaction breaking its own lock is not a culprit
                if victim
                    .transaction
                    .phy_tx_ids()
                    .contains(&brk.breaker_phy_tx_id)
                {
                    continue;
                }
                let candidate = match index.by_phy_tx_id(&brk.breaker_phy_tx_id) {
                    Some(breaker) if victim.is_self(breaker) => continue,
                    // An aborted breaker's writes never landed
                    Some(breaker) if breaker.status() == TerminalStatus::Aborted => continue,
                    Some(breaker) => Self::mapped(breaker, brk, &abort_at),
                    None => Self::unmapped(brk),
                };
                if found.iter().any(|c| {
                    c.at == candidate.at && c.transaction.key() == candidate.transaction.key()
                }) {
                    continue;
                }
                found.push(candidate);
            }
        }

        // Breaks at or before the abort, closest first; then later ones,
        // since node clocks are not synchronized
        found.sort_by(|a, b| {
            let a_late = a.at > abort_at;
            let b_late = b.at > abort_at;
            a_late.cmp(&b_late).then_with(|| {
                if a_late {
                    a.at.cmp(&b.at).then_with(|| by_identity(a, b))
                } else {
                    by_closest_commit(a, b)
                }
            })
        });
        found
    }

    fn kind(&self) -> MatchStrategy {
        MatchStrategy::BrokenLockChain
    }
}

// ============================================================================
// SharedLock
// ============================================================================

/// Other transactions sharing a lock id with the victim
#[derive(Debug, Clone, Copy, Default)]
pub struct SharedLock;

impl CulpritStrategy for SharedLock {
    fn candidates<'a>(
        &self,
        victim: &VictimContext<'_>,
        index: &'a FinalizedIndex,
    ) -> Vec<Candidate<'a>> {
        let victim_locks = victim.lock_ids();
        if victim_locks.is_empty() {
            return Vec::new();
        }
        let abort_at = victim.timestamp();

        let mut found: Vec<Candidate<'a>> = index
            .transactions_with_locks(victim_locks)
            .into_iter()
            .filter(|tx| !victim.is_self(tx))
            .filter_map(|tx| {
                let shared: Vec<&String> = tx.lock_ids().intersection(victim_locks).collect();
                if shared.is_empty() {
                    return None;
                }
                let (at, record) = prior_commit(tx, &abort_at)?;
                let mut evidence: Vec<Arc<Record>> = tx.lock_records().to_vec();
                evidence.push(Arc::clone(&record));
                Some(Candidate {
                    transaction: Cow::Borrowed(tx),
                    record,
                    at,
                    lock_id: match shared.as_slice() {
                        [only] => Some((*only).clone()),
                        _ => None,
                    },
                    phy_tx_id: tx.phy_tx_id().map(str::to_string),
                    evidence,
                })
            })
            .collect();

        found.sort_by(by_closest_commit);
        found
    }

    fn kind(&self) -> MatchStrategy {
        MatchStrategy::SharedLock
    }
}

// ============================================================================
// TableTiming
// ============================================================================

/// Committed transactions that referenced the victim's table
#[derive(Debug, Clone, Copy, Default)]
pub struct TableTiming;

impl TableTiming {
    fn references(tx: &Transaction, table: &str) -> bool {
        if tx.tables().contains(table) {
            return true;
        }
        let leaf = table.rsplit('/').next().unwrap_or(table);
        tx.queries().iter().filter_map(|q| q.query_text.as_deref()).any(|text| {
            text.contains(table) || (!leaf.is_empty() && mentions_identifier(text, leaf))
        })
    }
}

impl CulpritStrategy for TableTiming {
    fn candidates<'a>(
        &self,
        victim: &VictimContext<'_>,
        index: &'a FinalizedIndex,
    ) -> Vec<Candidate<'a>> {
        if !victim.lock_ids().is_empty() || victim.table.is_empty() {
            return Vec::new();
        }
        let abort_at = victim.timestamp();

        let mut found: Vec<Candidate<'a>> = index
            .committed()
            .filter(|tx| !victim.is_self(tx))
            .filter(|tx| Self::references(tx, victim.table))
            .filter_map(|tx| {
                let (at, record) = tx.commit_at_or_before(&abort_at)?;
                Some(Candidate {
                    transaction: Cow::Borrowed(tx),
                    evidence: vec![Arc::clone(&record)],
                    record,
                    at,
                    lock_id: None,
                    phy_tx_id: tx.phy_tx_id().map(str::to_string),
                })
            })
            .collect();

        found.sort_by(by_closest_commit);
        found
    }

    fn kind(&self) -> MatchStrategy {
        MatchStrategy::TableTiming
    }
}

/// `ident` occurs in `text` not glued to other identifier characters
fn mentions_identifier(text: &str, ident: &str) -> bool {
    let is_ident = |c: char| c.is_alphanumeric() || c == '_';
    text.match_indices(ident).any(|(start, _)| {
        let before = text[..start].chars().next_back();
        let after = text[start + ident.len()..].chars().next();
        !before.map_or(false, is_ident) && !after.map_or(false, is_ident)
    })
}
