//! Analyzer configuration via `tli.toml`
//!
//! Every setting has a default, so the file is optional. The CLI looks for
//! `tli.toml` in the working directory unless `--config` names another file;
//! command line flags override what the file says.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Config file name looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "tli.toml";

/// Service tag of the lines the analyzer understands
pub const DEFAULT_COMPONENT_TAG: &str = "DATA_INTEGRITY";

/// Issue code ydb reports for "Transaction locks invalidated"
pub const TLI_ISSUE_CODE: u32 = 2001;

/// Issue message prefix ydb reports for "Transaction locks invalidated"
pub const TLI_MESSAGE: &str = "Transaction locks invalidated";

/// Header layout of the input lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// journalctl output: `<mon> <day> <time> <node> <proc>[<pid>]: <ts> ...`
    #[default]
    Systemd,
    /// ydbd log file: `<ts> :<SERVICE> <LEVEL>: ...`
    Raw,
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "systemd" => Ok(LogFormat::Systemd),
            "raw" => Ok(LogFormat::Raw),
            other => Err(Error::config(format!(
                "Invalid log format '{}'. Expected \"systemd\" or \"raw\".",
                other
            ))),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogFormat::Systemd => "systemd",
            LogFormat::Raw => "raw",
        })
    }
}

/// Report rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Structured report tree as YAML
    #[default]
    Yaml,
    /// Structured report tree as pretty JSON
    Json,
    /// SQL-script-like listing of victim and culprit queries
    Sql,
    /// Victim/culprit combinations aggregated by count
    Summary,
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "yaml" => Ok(OutputFormat::Yaml),
            "json" => Ok(OutputFormat::Json),
            "sql" => Ok(OutputFormat::Sql),
            "summary" => Ok(OutputFormat::Summary),
            other => Err(Error::config(format!(
                "Invalid output format '{}'. Expected \"yaml\", \"json\", \"sql\" or \"summary\".",
                other
            ))),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutputFormat::Yaml => "yaml",
            OutputFormat::Json => "json",
            OutputFormat::Sql => "sql",
            OutputFormat::Summary => "summary",
        })
    }
}

/// Analyzer configuration loaded from `tli.toml`.
///
/// # Example
///
/// ```toml
/// component_tag = "DATA_INTEGRITY"
/// log_format = "systemd"
/// output_format = "yaml"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalyzerConfig {
    /// Service tag a line must carry to be parsed
    #[serde(default = "default_component_tag")]
    pub component_tag: String,
    /// Header layout: `"systemd"` or `"raw"`
    #[serde(default = "default_log_format")]
    pub log_format: String,
    /// Report rendering: `"yaml"`, `"json"`, `"sql"` or `"summary"`
    #[serde(default = "default_output_format")]
    pub output_format: String,
    /// Issue code marking a TLI abort
    #[serde(default = "default_tli_issue_code")]
    pub tli_issue_code: u32,
    /// Issue message marking a TLI abort
    #[serde(default = "default_tli_message")]
    pub tli_message: String,
    /// Attach every evidence line to each event
    #[serde(default)]
    pub collect_details: bool,
    /// Log level when no `-v` flag is given (`error`..`trace`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

fn default_component_tag() -> String {
    DEFAULT_COMPONENT_TAG.to_string()
}

fn default_log_format() -> String {
    "systemd".to_string()
}

fn default_output_format() -> String {
    OutputFormat::default().to_string()
}

fn default_tli_issue_code() -> u32 {
    TLI_ISSUE_CODE
}

fn default_tli_message() -> String {
    TLI_MESSAGE.to_string()
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            component_tag: default_component_tag(),
            log_format: default_log_format(),
            output_format: default_output_format(),
            tli_issue_code: default_tli_issue_code(),
            tli_message: default_tli_message(),
            collect_details: false,
            log_level: None,
        }
    }
}

impl AnalyzerConfig {
    /// Parse the log format string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not `"systemd"` or `"raw"`.
    pub fn log_format(&self) -> Result<LogFormat> {
        self.log_format.parse()
    }

    /// Parse the output format string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a known format.
    pub fn output_format(&self) -> Result<OutputFormat> {
        self.output_format.parse()
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# TLI analyzer configuration
#
# Service tag of the lines to analyze (ydbd: DATA_INTEGRITY)
component_tag = "DATA_INTEGRITY"

# Input header layout: "systemd" (journalctl, default) or "raw" (ydbd log file)
log_format = "systemd"

# Report: "yaml" (default), "json", "sql" or "summary"
output_format = "yaml"

# What marks a TLI abort
tli_issue_code = 2001
tli_message = "Transaction locks invalidated"

# Attach every evidence line to each event (default: false)
collect_details = false

# Log level when no -v flag is given: error, warn, info, debug, trace
# log_level = "warn"
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: AnalyzerConfig = toml::from_str(&content).map_err(|e| {
            Error::config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, else `tli.toml` in `dir` if present, else defaults.
    pub fn discover(path: Option<&Path>, dir: &Path) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => {
                let candidate = dir.join(CONFIG_FILE_NAME);
                if candidate.is_file() {
                    Self::from_file(&candidate)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Check that every enumerated setting is known
    pub fn validate(&self) -> Result<()> {
        self.log_format()?;
        self.output_format()?;
        if self.component_tag.trim().is_empty() {
            return Err(Error::config("component_tag must not be empty"));
        }
        Ok(())
    }

    /// Serialize this config to TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::SerializationError(format!("Failed to serialize config: {}", e)))
    }
}
