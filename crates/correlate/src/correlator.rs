//! Lock correlator
//!
//! Phase two of the pipeline: walks the TLI aborts of a [`FinalizedIndex`]
//! in (timestamp, node, raw) order and turns each into one
//! [`LockInvalidationEvent`]. Nothing in the index is mutated; an abort with
//! no matching culprit still yields an event.

use std::sync::Arc;

use tli_core::{
    table_from_issue, AnalyzerConfig, Culprit, LockInvalidationEvent, Record, Transaction, Victim,
};
use tli_ingest::FinalizedIndex;
use tracing::{debug, info};

use crate::strategy::{default_strategies, Candidate, CulpritStrategy, VictimContext};

/// Resolves victims to culprits
pub struct LockCorrelator {
    strategies: Vec<Box<dyn CulpritStrategy>>,
    collect_details: bool,
}

impl Default for LockCorrelator {
    fn default() -> Self {
        Self::new(default_strategies())
    }
}

impl std::fmt::Debug for LockCorrelator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockCorrelator")
            .field(
                "strategies",
                &self.strategies.iter().map(|s| s.kind()).collect::<Vec<_>>(),
            )
            .field("collect_details", &self.collect_details)
            .finish()
    }
}

impl LockCorrelator {
    /// Correlator asking `strategies` in order
    pub fn new(strategies: Vec<Box<dyn CulpritStrategy>>) -> Self {
        Self {
            strategies,
            collect_details: false,
        }
    }

    /// Default strategies, settings from configuration
    pub fn from_config(config: &AnalyzerConfig) -> Self {
        Self::default().with_details(config.collect_details)
    }

    /// Builder: attach every evidence line to each event
    pub fn with_details(mut self, collect: bool) -> Self {
        self.collect_details = collect;
        self
    }

    /// One event per TLI abort, event ids 1..=N
    pub fn resolve(&self, index: &FinalizedIndex) -> Vec<LockInvalidationEvent> {
        let events: Vec<LockInvalidationEvent> = index
            .aborts()
            .iter()
            .zip(1u64..)
            .map(|(record, event_id)| self.resolve_one(index, record, event_id))
            .collect();

        let resolved = events.iter().filter(|e| e.is_resolved()).count();
        info!(
            target: "tli::correlate",
            events = events.len(),
            resolved,
            unresolved = events.len() - resolved,
            "Resolved lock invalidations"
        );
        events
    }

    fn resolve_one(
        &self,
        index: &FinalizedIndex,
        record: &Arc<Record>,
        event_id: u64,
    ) -> LockInvalidationEvent {
        let victim_tx = index
            .transaction_for(record)
            .cloned()
            .unwrap_or_else(|| Transaction::from_record(record));

        let table = record
            .issue_message()
            .and_then(table_from_issue)
            .unwrap_or_default()
            .to_string();
        if table.is_empty() {
            debug!(target: "tli::correlate", event_id, "No table in TLI issue message");
        }

        let context = VictimContext {
            transaction: &victim_tx,
            record,
            table: &table,
        };

        let mut matched = None;
        for strategy in &self.strategies {
            if let Some(best) = strategy.candidates(&context, index).into_iter().next() {
                matched = Some((strategy.kind(), best));
                break;
            }
        }

        let lock_id = match &matched {
            Some((_, candidate)) => contested_lock(&victim_tx, candidate),
            None => single(victim_tx.lock_ids().iter()),
        };

        let evidence = if self.collect_details {
            collect_evidence(record, &victim_tx, matched.as_ref().map(|(_, c)| c))
        } else {
            Vec::new()
        };

        let culprit = matched.map(|(strategy, candidate)| {
            debug!(
                target: "tli::correlate",
                event_id,
                victim = victim_tx.sort_id(),
                culprit = candidate.transaction.sort_id(),
                strategy = %strategy,
                "Culprit found"
            );
            Culprit {
                trace_id: candidate
                    .record
                    .trace_id()
                    .map(str::to_string)
                    .or_else(|| candidate.transaction.trace_ids().iter().next().cloned()),
                phy_tx_id: candidate.phy_tx_id,
                transaction: candidate.transaction.into_owned(),
                record: candidate.record,
                strategy,
            }
        });
        if culprit.is_none() {
            debug!(target: "tli::correlate", event_id, victim = victim_tx.sort_id(), "No culprit");
        }

        LockInvalidationEvent {
            event_id,
            timestamp: record.timestamp,
            table,
            lock_id,
            victim: Victim {
                transaction: victim_tx,
                record: Arc::clone(record),
            },
            culprit,
            evidence,
        }
    }
}

/// Lock pinned by the strategy, else the single lock both sides touched,
/// else the victim's single lock
fn contested_lock(victim: &Transaction, candidate: &Candidate<'_>) -> Option<String> {
    candidate
        .lock_id
        .clone()
        .or_else(|| {
            single(
                victim
                    .lock_ids()
                    .intersection(candidate.transaction.lock_ids()),
            )
        })
        .or_else(|| single(victim.lock_ids().iter()))
}

fn single<'a>(mut ids: impl Iterator<Item = &'a String>) -> Option<String> {
    match (ids.next(), ids.next()) {
        (Some(only), None) => Some(only.clone()),
        _ => None,
    }
}

/// Every line backing the event, deduplicated, newest first
fn collect_evidence(
    abort: &Arc<Record>,
    victim: &Transaction,
    culprit: Option<&Candidate<'_>>,
) -> Vec<String> {
    let mut lines: Vec<&Arc<Record>> = vec![abort];
    lines.extend(victim.lock_records());
    if let Some(candidate) = culprit {
        lines.push(&candidate.record);
        lines.extend(candidate.evidence.iter());
    }

    lines.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.raw.cmp(&b.raw)));
    lines.dedup_by(|a, b| a.raw == b.raw);
    lines.into_iter().map(|r| r.raw.clone()).collect()
}
