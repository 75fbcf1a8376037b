//! `tli`: pair TLI-aborted YDB transactions with the transactions that
//! broke their locks.
//!
//! - **File mode**: `tli --log-file cluster.log`
//! - **Pipe mode**: `journalctl -u ydbd | tli -o summary`
//!
//! The report goes to stdout, logs go to stderr.

mod commands;
mod parse;

use std::fs;
use std::io::{self, IsTerminal, Read, Write};
use std::path::Path;
use std::process;

use tli_analyzer::{render, AnalyzerConfig, Error, Result, RunMetadata};
use tracing::debug;

use commands::build_cli;
use parse::{matches_to_options, CliOptions};

const STDIN_NAME: &str = "<stdin>";

fn main() {
    let matches = build_cli().get_matches();
    let options = matches_to_options(&matches);

    if options.print_config {
        print!("{}", AnalyzerConfig::default_toml());
        return;
    }

    if let Err(e) = run(&options) {
        eprintln!("tli: error: {}", e);
        process::exit(1);
    }
}

fn run(options: &CliOptions) -> Result<()> {
    let config = options.load_config(&std::env::current_dir()?)?;
    init_tracing(&options.log_filter(&config));

    let (lines, source) = read_input(options.log_file.as_deref())?;
    let analysis = tli_analyzer::analyze(&lines, &config)?;
    let report = analysis.report(&RunMetadata::now(source));
    let format = config.output_format()?;
    let rendered = render(&report, format)?;
    debug!(
        target: "tli::report",
        source = %report.analysis_metadata.log_file,
        %format,
        bytes = rendered.len(),
        "Report rendered"
    );

    let mut stdout = io::stdout().lock();
    stdout.write_all(rendered.as_bytes())?;
    stdout.flush()?;
    Ok(())
}

fn init_tracing(filter: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();
}

/// All input lines plus the name to report as their source
fn read_input(path: Option<&Path>) -> Result<(Vec<String>, String)> {
    match path {
        Some(path) => {
            let bytes = fs::read(path).map_err(|e| {
                Error::IoError(io::Error::new(
                    e.kind(),
                    format!("{}: {}", path.display(), e),
                ))
            })?;
            Ok((split_lines(&bytes), path.display().to_string()))
        }
        None => {
            let stdin = io::stdin();
            if stdin.is_terminal() {
                return Err(Error::invalid_input(
                    "no --log-file given and stdin is a terminal",
                ));
            }
            let mut bytes = Vec::new();
            stdin.lock().read_to_end(&mut bytes)?;
            Ok((split_lines(&bytes), STDIN_NAME.to_string()))
        }
    }
}

/// Split on `\n`, dropping `\r` and replacing invalid UTF-8
fn split_lines(bytes: &[u8]) -> Vec<String> {
    let body = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    if body.is_empty() {
        return Vec::new();
    }
    body.split(|&b| b == b'\n')
        .map(|line| {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            String::from_utf8_lossy(line).into_owned()
        })
        .collect()
}
