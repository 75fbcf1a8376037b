//! Core types for the TLI analyzer
//!
//! This crate defines the foundational types used throughout the pipeline:
//! - Record: one parsed diagnostic line with its typed field map
//! - Transaction: per-transaction state rebuilt from unordered records
//! - LockInvalidationEvent: a victim abort paired with its probable culprit
//! - AnalyzerConfig: settings loaded from `tli.toml`
//! - Error: error type for the I/O edges of the pipeline

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod event;
pub mod record;
pub mod transaction;

pub use config::{AnalyzerConfig, LogFormat, OutputFormat, CONFIG_FILE_NAME};
pub use error::{Error, Result};
pub use event::{Culprit, LockInvalidationEvent, MatchStrategy, Victim};
pub use record::{
    format_timestamp, parse_timestamp, table_from_issue, Direction, FieldName, Fields, QueryAction,
    Record, Timestamp,
};
pub use transaction::{
    line_order, QueryEvent, StatusUpdate, TerminalStatus, Transaction, TxKey,
};
