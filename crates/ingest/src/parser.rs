//! Line parser
//!
//! Turns one raw log line into a [`Record`], or rejects it. Two header
//! layouts are understood (see [`LogFormat`]):
//!
//! ```text
//! окт 22 10:54:51 ydb-static-node-3 ydbd[889]: 2025-10-22T07:54:51.433950Z :DATA_INTEGRITY DEBUG: Component: SessionActor,...
//! 2025-10-22T07:54:51.433950Z :DATA_INTEGRITY DEBUG: Component: SessionActor,...
//! ```
//!
//! The syslog date in front of a journalctl line has no sub-second
//! precision and is ignored; the embedded ydbd timestamp is used instead.
//!
//! The field section is a comma-separated list of `Key: value` pairs. A
//! comma only ends a value when it is outside `{}`, `[]` and double quotes
//! and is followed by another `Key:`; this keeps issue blocks such as
//! `Issues: { message: "... Table: `/Root/t1`" issue_code: 2001 severity: 1 }`
//! in one piece.

use tli_core::{
    parse_timestamp, AnalyzerConfig, Direction, FieldName, Fields, LogFormat, Record, Result,
};
use tracing::{info, trace};

/// Counters of a parse run. Skipped lines are never fatal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseStats {
    /// Lines seen
    pub total: usize,
    /// Lines turned into records
    pub accepted: usize,
    /// Lines rejected as noise or malformed
    pub skipped: usize,
}

/// Parser for ydbd data-integrity log lines
#[derive(Debug, Clone)]
pub struct LineParser {
    format: LogFormat,
    component_tag: String,
}

impl Default for LineParser {
    fn default() -> Self {
        Self::new(LogFormat::Systemd, tli_core::config::DEFAULT_COMPONENT_TAG)
    }
}

impl LineParser {
    /// Create a parser for the given header layout and service tag
    pub fn new(format: LogFormat, component_tag: impl Into<String>) -> Self {
        Self {
            format,
            component_tag: component_tag.into(),
        }
    }

    /// Create a parser from configuration
    pub fn from_config(config: &AnalyzerConfig) -> Result<Self> {
        Ok(Self::new(config.log_format()?, config.component_tag.clone()))
    }

    /// Header layout this parser expects
    pub fn format(&self) -> LogFormat {
        self.format
    }

    /// Parse one line. Returns `None` for noise and malformed lines.
    pub fn parse_line(&self, line: &str) -> Option<Record> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return None;
        }

        let (node, process, content) = match self.format {
            LogFormat::Systemd => split_systemd_header(line)?,
            LogFormat::Raw => (String::new(), String::new(), line.trim_start()),
        };

        let mut rest = content;
        let timestamp = parse_timestamp(next_token(&mut rest)?)?;
        let service = next_token(&mut rest)?.strip_prefix(':')?;
        if service != self.component_tag {
            return None;
        }
        let severity = next_token(&mut rest)?.strip_suffix(':')?;

        let fields = parse_fields(rest);
        let direction = fields.get(FieldName::Type).and_then(Direction::from_type);

        Some(Record {
            timestamp,
            node,
            process,
            service: service.to_string(),
            severity: severity.to_string(),
            direction,
            fields,
            raw: line.to_string(),
        })
    }

    /// Parse a batch of lines, counting what was skipped
    pub fn parse_lines<I, S>(&self, lines: I) -> (Vec<Record>, ParseStats)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut records = Vec::new();
        let mut stats = ParseStats::default();

        for (line_no, line) in lines.into_iter().enumerate() {
            stats.total += 1;
            match self.parse_line(line.as_ref()) {
                Some(record) => {
                    stats.accepted += 1;
                    records.push(record);
                }
                None => {
                    stats.skipped += 1;
                    trace!(target: "tli::parse", line = line_no + 1, "Skipped line");
                }
            }
        }

        info!(
            target: "tli::parse",
            total = stats.total,
            accepted = stats.accepted,
            skipped = stats.skipped,
            "Parsed log lines"
        );
        (records, stats)
    }
}

/// Pop the next whitespace-separated token
fn next_token<'a>(rest: &mut &'a str) -> Option<&'a str> {
    let s = rest.trim_start();
    if s.is_empty() {
        return None;
    }
    let end = s.find(char::is_whitespace).unwrap_or(s.len());
    let (token, tail) = s.split_at(end);
    *rest = tail;
    Some(token)
}

/// `<mon> <day> <hh:mm:ss> <node> <proc>[<pid>]: <content>`
fn split_systemd_header(line: &str) -> Option<(String, String, &str)> {
    let mut rest = line;
    let _month = next_token(&mut rest)?;
    let day = next_token(&mut rest)?;
    if !day.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let time = next_token(&mut rest)?;
    if time.split(':').count() != 3 {
        return None;
    }
    let node = next_token(&mut rest)?;
    let process = next_token(&mut rest)?.strip_suffix(':')?;
    let (name, pid) = process.strip_suffix(']')?.split_once('[')?;
    if name.is_empty() || pid.is_empty() || !pid.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some((node.to_string(), process.to_string(), rest.trim_start()))
}

/// Split the trailing `Key: value,Key: value` section
pub fn parse_fields(section: &str) -> Fields {
    let mut fields = Fields::new();
    let mut rest = section.trim();

    while !rest.is_empty() {
        let Some(colon) = rest.find(':') else {
            break;
        };
        let key = rest[..colon].trim();
        let (value, next) = split_value(&rest[colon + 1..]);
        if let Some(name) = FieldName::from_key(key) {
            fields.insert(name, value.trim());
        }
        rest = next.trim_start();
    }

    if let Some(issues) = fields.get(FieldName::Issues).map(str::to_string) {
        if let Some(message) = issue_message(&issues) {
            fields.insert(FieldName::IssueMessage, message);
        }
        if let Some(code) = issue_code(&issues) {
            fields.insert(FieldName::IssueCode, code);
        }
    }

    fields
}

/// Split one value off the front of `s`, returning `(value, remainder)`.
///
/// A value whose quotes or brackets never balance (a truncated query text)
/// ends at the next `,Key:` instead of swallowing the rest of the line.
fn split_value(s: &str) -> (&str, &str) {
    split_balanced(s).unwrap_or_else(|| split_at_next_key(s))
}

/// Split at the first `,Key:` outside quotes and brackets; `None` if the
/// quotes or brackets are still open at the end of the line
fn split_balanced(s: &str) -> Option<(&str, &str)> {
    let mut depth = 0usize;
    let mut in_quotes = false;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if in_quotes {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_quotes = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            '{' | '[' => depth += 1,
            '}' | ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 && starts_with_key(&s[i + 1..]) => {
                return Some((&s[..i], &s[i + 1..]));
            }
            _ => {}
        }
    }
    if in_quotes || depth > 0 {
        None
    } else {
        Some((s, ""))
    }
}

fn split_at_next_key(s: &str) -> (&str, &str) {
    s.match_indices(',')
        .find(|(i, _)| starts_with_key(&s[i + 1..]))
        .map(|(i, _)| (&s[..i], &s[i + 1..]))
        .unwrap_or((s, ""))
}

/// Whether `s` begins with `Ident:` (or is only whitespace, i.e. a trailing comma)
fn starts_with_key(s: &str) -> bool {
    let t = s.trim_start();
    if t.is_empty() {
        return true;
    }
    let ident_len = t
        .bytes()
        .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_')
        .count();
    ident_len > 0 && t[ident_len..].starts_with(':')
}

/// `message: "..."` inside an issues block
fn issue_message(issues: &str) -> Option<String> {
    let start = issues.find("message:")? + "message:".len();
    let rest = issues[start..].trim_start().strip_prefix('"')?;
    let mut out = String::new();
    let mut escaped = false;
    for c in rest.chars() {
        match c {
            _ if escaped => {
                out.push(c);
                escaped = false;
            }
            '\\' => escaped = true,
            '"' => return Some(out),
            _ => out.push(c),
        }
    }
    None
}

/// `issue_code: N` inside an issues block
fn issue_code(issues: &str) -> Option<String> {
    let start = issues.find("issue_code:")? + "issue_code:".len();
    let digits: String = issues[start..]
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.is_empty() {
        None
    } else {
        Some(digits)
    }
}
