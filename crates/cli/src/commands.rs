//! Clap command definition.

use clap::{Arg, ArgAction, Command};

/// Build the `tli` command.
pub fn build_cli() -> Command {
    Command::new("tli")
        .about("Find the transactions that broke the locks of TLI-aborted YDB transactions")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("log-file")
                .long("log-file")
                .short('l')
                .value_name("PATH")
                .help("Log file to analyze (default: stdin)"),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .short('f')
                .value_parser(["systemd", "raw"])
                .help("Input line layout (default: systemd)"),
        )
        .arg(
            Arg::new("output-format")
                .long("output-format")
                .short('o')
                .value_parser(["yaml", "json", "sql", "summary"])
                .help("Report format (default: yaml)"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .value_name("PATH")
                .help("Config file (default: ./tli.toml if present)"),
        )
        .arg(
            Arg::new("details")
                .long("details")
                .action(ArgAction::SetTrue)
                .help("Include every contributing log line in the report"),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .action(ArgAction::Count)
                .help("Log to stderr: -v info, -vv debug, -vvv trace"),
        )
        .arg(
            Arg::new("print-config")
                .long("print-config")
                .action(ArgAction::SetTrue)
                .conflicts_with_all(["log-file", "config"])
                .help("Print a commented default config file and exit"),
        )
}
