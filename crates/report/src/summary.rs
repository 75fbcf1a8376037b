//! Aggregated summary
//!
//! Groups events by the shape of the two transactions involved, i.e. the
//! sequence of query texts on each side, and counts how often each
//! victim/culprit pair occurred. Shapes are compared by an xxh3 fingerprint.

use xxhash_rust::xxh3::xxh3_64;

use crate::builder::{EventEntry, QueryEntry, Report};

const WIDTH: usize = 80;

/// One victim/culprit combination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Combination<'a> {
    /// Fingerprint of the victim's query sequence
    pub victim_hash: u64,
    /// Fingerprint of the culprit's query sequence
    pub culprit_hash: u64,
    /// Events with this combination, in report order
    pub events: Vec<&'a EventEntry>,
}

impl Combination<'_> {
    /// Number of occurrences
    pub fn count(&self) -> usize {
        self.events.len()
    }

    /// Whether both sides run the same transaction shape
    pub fn is_self_conflict(&self) -> bool {
        self.victim_hash == self.culprit_hash
    }
}

/// Fingerprint of a query sequence. Queries without text count by action.
pub fn fingerprint(queries: &[QueryEntry]) -> u64 {
    let joined = queries
        .iter()
        .map(|q| normalize(q.query_text.as_deref().unwrap_or(&q.query_action)))
        .collect::<Vec<_>>()
        .join("\n");
    xxh3_64(joined.as_bytes())
}

/// Group resolved events by (victim, culprit) fingerprint, most frequent first.
///
/// Events missing the queries of either side are left out.
pub fn aggregate(report: &Report) -> Vec<Combination<'_>> {
    let mut combinations: Vec<Combination<'_>> = Vec::new();

    for event in &report.lock_invalidation_events {
        let Some(culprit) = &event.culprit else {
            continue;
        };
        if event.victim.all_queries.is_empty() || culprit.all_queries.is_empty() {
            continue;
        }
        let victim_hash = fingerprint(&event.victim.all_queries);
        let culprit_hash = fingerprint(&culprit.all_queries);

        match combinations
            .iter_mut()
            .find(|c| c.victim_hash == victim_hash && c.culprit_hash == culprit_hash)
        {
            Some(existing) => existing.events.push(event),
            None => combinations.push(Combination {
                victim_hash,
                culprit_hash,
                events: vec![event],
            }),
        }
    }

    // stable: equal counts keep first-seen order
    combinations.sort_by(|a, b| b.count().cmp(&a.count()));
    combinations
}

/// Render the aggregated summary as text
pub fn render_summary(report: &Report) -> String {
    if report.lock_invalidation_events.is_empty() {
        return "No transaction lock invalidation events found\n".to_string();
    }

    let rule = "=".repeat(WIDTH);
    let thin = "-".repeat(WIDTH);
    let mut lines = vec![
        rule.clone(),
        "YDB Transaction Lock Invalidation (TLI) Aggregated Summary".to_string(),
        rule.clone(),
        format!("Generated at: {}", report.analysis_metadata.generated_at),
        format!(
            "Total invalidation events: {}",
            report.analysis_metadata.total_invalidation_events
        ),
        rule,
        String::new(),
    ];

    let combinations = aggregate(report);
    if combinations.is_empty() {
        lines.push("No valid victim+culprit combinations found".to_string());
        return lines.join("\n") + "\n";
    }

    lines.push(format!(
        "Found {} unique victim+culprit combinations:",
        combinations.len()
    ));
    lines.push(String::new());

    for (i, combination) in combinations.iter().enumerate() {
        let Some(representative) = combination.events.first() else {
            continue;
        };
        lines.push(thin.clone());
        lines.push(format!("#{} TLI Count: {}", i + 1, combination.count()));
        lines.push(thin.clone());

        lines.push("VICTIM:".to_string());
        push_queries(&representative.victim.all_queries, &mut lines);
        lines.push(String::new());

        lines.push("CULPRIT:".to_string());
        if let Some(culprit) = &representative.culprit {
            push_queries(&culprit.all_queries, &mut lines);
        }
        lines.push(String::new());

        lines.push("DETAILS:".to_string());
        lines.push(format!("  Table: {}", representative.table));
        lines.push(format!("  Victim Hash: {:016x}", combination.victim_hash));
        lines.push(format!("  Culprit Hash: {:016x}", combination.culprit_hash));
        if combination.is_self_conflict() {
            lines.push(
                "  Victim and culprit are different instances of the same transaction.".to_string(),
            );
        }
        let first = combination.events.iter().map(|e| &e.timestamp).min();
        let last = combination.events.iter().map(|e| &e.timestamp).max();
        if let (Some(first), Some(last)) = (first, last) {
            lines.push(format!("  First occurrence: {}", first));
            lines.push(format!("  Last occurrence: {}", last));
        }
        lines.push(String::new());
    }

    lines.join("\n") + "\n"
}

fn push_queries(queries: &[QueryEntry], lines: &mut Vec<String>) {
    for (j, query) in queries.iter().enumerate() {
        let text = query.query_text.as_deref().unwrap_or(&query.query_action);
        lines.push(format!("  {}. {}", j + 1, normalize(text)));
    }
}

/// Collapse all whitespace runs into single spaces
fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
