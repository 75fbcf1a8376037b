//! SQL-script-like rendering
//!
//! Each event becomes a commented banner followed by the victim's and the
//! culprit's queries as statements, so the report can be opened in any SQL
//! editor and the two transactions read side by side.

use crate::builder::{EventEntry, QueryEntry, Report};

const WIDTH: usize = 120;

fn rule(c: char) -> String {
    format!("-- {}", c.to_string().repeat(WIDTH))
}

/// Render the report as an SQL script
pub fn render_sql(report: &Report) -> String {
    if report.lock_invalidation_events.is_empty() {
        return "-- No transaction lock invalidation events found\n".to_string();
    }

    let mut lines = Vec::new();
    lines.push(rule('='));
    lines.push("-- YDB Transaction Lock Invalidation (TLI) Analysis Report".to_string());
    lines.push(rule('='));
    lines.push(format!(
        "-- Generated at: {}",
        report.analysis_metadata.generated_at
    ));
    lines.push(format!("-- Log file: {}", report.analysis_metadata.log_file));
    lines.push(format!(
        "-- Total invalidation events: {}",
        report.analysis_metadata.total_invalidation_events
    ));
    lines.push(rule('='));
    lines.push(String::new());

    for event in &report.lock_invalidation_events {
        write_event(event, &mut lines);
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn write_event(event: &EventEntry, lines: &mut Vec<String>) {
    lines.push(rule('='));
    lines.push(format!("-- TLI EVENT #{}", event.event_id));
    lines.push(format!("-- Timestamp: {}", event.timestamp));
    if !event.table.is_empty() {
        lines.push(format!("-- Table: {}", event.table));
    }
    if let Some(lock_id) = &event.lock_details.lock_id {
        lines.push(format!("-- Lock ID: {}", lock_id));
    }
    lines.push(format!(
        "-- Victim raw log: {}",
        event.raw_entries.victim_log_line
    ));
    if let Some(culprit_line) = &event.raw_entries.culprit_log_line {
        lines.push(format!("-- Culprit raw log: {}", culprit_line));
    }
    lines.push(rule('='));
    lines.push(String::new());

    let victim = &event.victim;
    lines.push(rule('-'));
    lines.push("-- VICTIM TRANSACTION".to_string());
    lines.push(rule('-'));
    lines.push(format!(
        "-- Session ID: {}",
        victim.session_id.as_deref().unwrap_or("unknown")
    ));
    if let Some(tx_id) = &victim.tx_id {
        lines.push(format!("-- Transaction ID: {}", tx_id));
    }
    if let (Some(first), Some(last)) = (victim.all_queries.first(), victim.all_queries.last()) {
        lines.push(format!("-- Transaction Start: {}", first.timestamp));
        lines.push(format!("-- Transaction End: {}", last.timestamp));
    }
    lines.push(String::new());
    for query in &victim.all_queries {
        write_statement(query, lines);
    }
    lines.push(String::new());

    lines.push(rule('-'));
    lines.push("-- CULPRIT TRANSACTION".to_string());
    lines.push(rule('-'));
    match &event.culprit {
        Some(culprit) => {
            lines.push(format!(
                "-- Session ID: {}",
                culprit.session_id.as_deref().unwrap_or("unknown")
            ));
            if let Some(tx_id) = &culprit.tx_id {
                lines.push(format!("-- Transaction ID: {}", tx_id));
            }
            lines.push(String::new());
            for query in &culprit.all_queries {
                write_statement(query, lines);
            }
        }
        None => {
            lines.push("-- Not found in the analyzed log".to_string());
        }
    }
    lines.push(String::new());
}

fn write_statement(query: &QueryEntry, lines: &mut Vec<String>) {
    let header = format!(
        "-- {} --- {} {}",
        query.timestamp,
        query.trace_id,
        "-".repeat(WIDTH)
    );
    lines.push(header.chars().take(WIDTH + 3).collect());

    match query.query_text.as_deref() {
        Some(text) => {
            let mut statement = dedent(text).trim().to_string();
            if !statement.ends_with(';') {
                statement.push(';');
            }
            lines.push(statement);
        }
        None => lines.push(format!("-- {}", query.query_action)),
    }
    lines.push(String::new());
}

/// Remove the common leading whitespace of all non-blank lines
fn dedent(text: &str) -> String {
    let leading = |l: &str| l.chars().take_while(|c| c.is_whitespace()).count();
    let indent = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(leading)
        .min()
        .unwrap_or(0);
    text.lines()
        .map(|l| l.chars().skip(leading(l).min(indent)).collect::<String>())
        .collect::<Vec<_>>()
        .join("\n")
}
