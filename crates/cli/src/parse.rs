//! ArgMatches → run options.
//!
//! Flags override whatever the config file says; the config file overrides
//! the built-in defaults.

use std::path::{Path, PathBuf};

use clap::ArgMatches;
use tli_analyzer::{AnalyzerConfig, Result};

/// Everything the command line can ask for
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliOptions {
    pub log_file: Option<PathBuf>,
    pub config_path: Option<PathBuf>,
    pub log_format: Option<String>,
    pub output_format: Option<String>,
    pub details: bool,
    pub verbosity: u8,
    pub print_config: bool,
}

/// Translate parsed arguments into [`CliOptions`].
pub fn matches_to_options(matches: &ArgMatches) -> CliOptions {
    CliOptions {
        log_file: matches.get_one::<String>("log-file").map(PathBuf::from),
        config_path: matches.get_one::<String>("config").map(PathBuf::from),
        log_format: matches.get_one::<String>("log-format").cloned(),
        output_format: matches.get_one::<String>("output-format").cloned(),
        details: matches.get_flag("details"),
        verbosity: matches.get_count("verbose"),
        print_config: matches.get_flag("print-config"),
    }
}

impl CliOptions {
    /// Load the config (explicit path, else `tli.toml` in `dir`) and apply
    /// flag overrides.
    pub fn load_config(&self, dir: &Path) -> Result<AnalyzerConfig> {
        let mut config = AnalyzerConfig::discover(self.config_path.as_deref(), dir)?;
        if let Some(format) = &self.log_format {
            config.log_format = format.clone();
        }
        if let Some(format) = &self.output_format {
            config.output_format = format.clone();
        }
        if self.details {
            config.collect_details = true;
        }
        config.validate()?;
        Ok(config)
    }

    /// `tracing` filter directive: `-v` flags win over the config's level
    pub fn log_filter(&self, config: &AnalyzerConfig) -> String {
        match self.verbosity {
            0 => config
                .log_level
                .clone()
                .unwrap_or_else(|| "warn".to_string()),
            1 => "info".to_string(),
            2 => "debug".to_string(),
            _ => "trace".to_string(),
        }
    }
}
