//! matcompctl - command-line client for multi-task prediction comparison

use clap::Parser;
use matcompctl::cli::Cli;
use matcompctl::commands;
use owo_colors::OwoColorize;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();

    // Diagnostics go to stderr so JSON output stays clean
    let filter = match &cli.log_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = commands::run(cli) {
        eprintln!("{} {:#}", "[ERROR]".red(), e);
        std::process::exit(1);
    }
}
