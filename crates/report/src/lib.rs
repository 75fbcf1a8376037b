//! Report rendering for the TLI analyzer
//!
//! - [`ReportBuilder`]: resolved events → serializable [`Report`] tree,
//!   written as YAML (default) or JSON
//! - [`render_sql`]: SQL-script-like listing of both transactions per event
//! - [`render_summary`]: events aggregated by victim/culprit query shape

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod builder;
pub mod sql;
pub mod summary;

pub use builder::{
    AnalysisMetadata, CulpritEntry, EventEntry, LockDetails, QueryEntry, RawEntries, Report,
    ReportBuilder, RunMetadata, VictimEntry,
};
pub use sql::render_sql;
pub use summary::{aggregate, fingerprint, render_summary, Combination};

use tli_core::{OutputFormat, Result};

/// Render a report in the requested format
pub fn render(report: &Report, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Yaml => report.to_yaml(),
        OutputFormat::Json => report.to_json_pretty().map(|mut s| {
            s.push('\n');
            s
        }),
        OutputFormat::Sql => Ok(render_sql(report)),
        OutputFormat::Summary => Ok(render_summary(report)),
    }
}
