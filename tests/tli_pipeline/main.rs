//! TLI Pipeline Test Suite
//!
//! End-to-end tests of parse → index → resolve → report.
//!
//! ## Structure
//!
//! - **scenarios**: known victim/culprit situations and their expected pairs
//! - **invariants**: event counts, dense ids, idempotence, anomaly handling
//! - **order_independence**: permuted, duplicated and sharded input
//! - **report_shape**: the serialized result tree and the text renderers
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --test tli_pipeline
//! cargo test --test tli_pipeline order_independence
//! ```

mod test_utils;

mod invariants;
mod order_independence;
mod report_shape;
mod scenarios;
