//! TLI analyzer - find who broke the locks of aborted YDB transactions
//!
//! YDB aborts a transaction with "Transaction locks invalidated" (TLI) when
//! another transaction committed over a lock it held. This crate reads the
//! `DATA_INTEGRITY` log lines of a cluster, in any order and from any mix of
//! nodes, and pairs every such victim with its most probable culprit.
//!
//! # Quick Start
//!
//! ```ignore
//! use tli_analyzer::{Analyzer, AnalyzerConfig, RunMetadata};
//!
//! let analyzer = Analyzer::from_config(&AnalyzerConfig::default())?;
//! let analysis = analyzer.analyze_lines(std::io::stdin().lines().map_while(Result::ok));
//! let report = analysis.report(&RunMetadata::now("<stdin>"));
//! println!("{}", report.to_yaml()?);
//! ```
//!
//! # Architecture
//!
//! Two phases. Ingest parses every line and builds the transaction index;
//! resolve runs only after the whole input was ingested, because a
//! culprit's commit may appear anywhere in the stream relative to its
//! victim's abort.

pub use tli_core::{
    AnalyzerConfig, Culprit, Error, LockInvalidationEvent, LogFormat, MatchStrategy,
    OutputFormat, Record, Result, TerminalStatus, Transaction, Victim,
};
pub use tli_correlate::{CulpritStrategy, LockCorrelator};
pub use tli_ingest::{
    FinalizedIndex, IndexStats, LineParser, ParseStats, TliMarker, TransactionIndex,
};
pub use tli_report::{render, render_sql, render_summary, Report, ReportBuilder, RunMetadata};

use tracing::info;

/// Outcome of one analysis run
#[derive(Debug, Clone)]
pub struct Analysis {
    /// One event per TLI abort, ordered by event_id
    pub events: Vec<LockInvalidationEvent>,
    /// Line counters
    pub parse_stats: ParseStats,
    /// Index counters
    pub index_stats: IndexStats,
}

impl Analysis {
    /// Build the result tree for this run
    pub fn report(&self, metadata: &RunMetadata) -> Report {
        ReportBuilder::build(&self.events, metadata)
    }
}

/// The full parse → index → resolve pipeline
#[derive(Debug)]
pub struct Analyzer {
    parser: LineParser,
    marker: TliMarker,
    correlator: LockCorrelator,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self {
            parser: LineParser::default(),
            marker: TliMarker::default(),
            correlator: LockCorrelator::default(),
        }
    }
}

impl Analyzer {
    /// Pipeline configured from `config`
    ///
    /// # Errors
    ///
    /// Returns an error if the config names an unknown log format.
    pub fn from_config(config: &AnalyzerConfig) -> Result<Self> {
        Ok(Self {
            parser: LineParser::from_config(config)?,
            marker: TliMarker::from_config(config),
            correlator: LockCorrelator::from_config(config),
        })
    }

    /// Parse and index one input of lines without resolving
    pub fn index_lines<I, S>(&self, lines: I) -> (TransactionIndex, ParseStats)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.index_into(TransactionIndex::new(self.marker.clone()), lines)
    }

    /// Parse and index one shard; the index keeps its records so it can be
    /// merged
    pub fn index_shard<I, S>(&self, lines: I) -> (TransactionIndex, ParseStats)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.index_into(
            TransactionIndex::new(self.marker.clone()).retaining_records(),
            lines,
        )
    }

    fn index_into<I, S>(&self, mut index: TransactionIndex, lines: I) -> (TransactionIndex, ParseStats)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let (records, stats) = self.parser.parse_lines(lines);
        index.ingest_all(records);
        (index, stats)
    }

    /// Resolve a fully ingested index
    pub fn resolve(&self, index: TransactionIndex, parse_stats: ParseStats) -> Analysis {
        let finalized = index.finalize();
        let events = self.correlator.resolve(&finalized);
        info!(
            target: "tli::correlate",
            lines = parse_stats.total,
            events = events.len(),
            "Analysis complete"
        );
        Analysis {
            events,
            parse_stats,
            index_stats: finalized.stats(),
        }
    }

    /// Run the whole pipeline over one input
    pub fn analyze_lines<I, S>(&self, lines: I) -> Analysis
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let (index, stats) = self.index_lines(lines);
        self.resolve(index, stats)
    }

    /// Run the pipeline over inputs indexed separately (e.g. one per node)
    /// and merged before resolving
    ///
    /// # Errors
    ///
    /// Returns an error if a shard index cannot be merged.
    pub fn analyze_shards<I, L, S>(&self, shards: I) -> Result<Analysis>
    where
        I: IntoIterator<Item = L>,
        L: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut merged = TransactionIndex::new(self.marker.clone());
        let mut totals = ParseStats::default();
        for shard in shards {
            let (index, stats) = self.index_shard(shard);
            totals.total += stats.total;
            totals.accepted += stats.accepted;
            totals.skipped += stats.skipped;
            merged.merge(index)?;
        }
        Ok(self.resolve(merged, totals))
    }
}

/// Analyze `lines` with `config`
///
/// # Errors
///
/// Returns an error if the config is invalid.
pub fn analyze<I, S>(lines: I, config: &AnalyzerConfig) -> Result<Analysis>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    config.validate()?;
    Ok(Analyzer::from_config(config)?.analyze_lines(lines))
}
