//! Resolve phase of the TLI analyzer
//!
//! [`LockCorrelator`] pairs every TLI abort of a finalized index with its
//! most probable culprit, asking an ordered list of [`CulpritStrategy`]
//! implementations.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod correlator;
pub mod strategy;

pub use correlator::LockCorrelator;
pub use strategy::{
    default_strategies, BrokenLockChain, Candidate, CulpritStrategy, SharedLock, TableTiming,
    VictimContext,
};
