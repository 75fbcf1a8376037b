//! Ingest phase of the TLI analyzer
//!
//! - [`LineParser`]: raw log line → [`tli_core::Record`]
//! - [`TransactionIndex`]: unordered records → per-transaction state,
//!   frozen into a [`FinalizedIndex`] for the resolver

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod index;
pub mod parser;

pub use index::{FinalizedIndex, IndexStats, LockBreak, TliMarker, TransactionIndex};
pub use parser::{LineParser, ParseStats};
