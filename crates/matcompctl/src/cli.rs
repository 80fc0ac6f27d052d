//! CLI - Command-line argument parsing
//!
//! Defines the CLI structure using clap.
//! Keeps argument parsing separate from execution logic.

use clap::{Args, Parser, Subcommand};
use matcomp_common::ClusterPolicy;
use std::path::PathBuf;

/// matcomp command-line client
#[derive(Parser, Debug)]
#[command(name = "matcompctl")]
#[command(about = "Compare predictions of several tasks", long_about = None)]
#[command(version)]
#[command(disable_help_subcommand = true)]
pub struct Cli {
    /// Config file (overrides $MATCOMP_CONFIG and defaults)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Never color output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Log verbosity for diagnostics on stderr (e.g. debug)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compare two or more tasks
    Compare(CompareArgs),

    /// Saved comparisons
    History {
        #[command(subcommand)]
        action: HistoryCommands,
    },

    /// Print the effective configuration as TOML
    Config {
        /// Write the default config to --config or the user config path
        #[arg(long)]
        init: bool,
    },
}

#[derive(Args, Debug)]
pub struct CompareArgs {
    /// Task to compare, as ID or ID=FILE (FILE holds {"predictions": [...]})
    #[arg(long = "task", short = 't', value_name = "ID[=FILE]", value_parser = parse_task_spec, required = true)]
    pub tasks: Vec<TaskSpec>,

    /// Target column to compare (repeatable)
    #[arg(long = "target", short = 'c', value_name = "COL", required = true)]
    pub targets: Vec<String>,

    /// Agreement tolerance in percent (default from config)
    #[arg(long, value_name = "PCT")]
    pub tolerance: Option<f64>,

    /// Clustering policy (default from config)
    #[arg(long, value_name = "POLICY")]
    pub policy: Option<ClusterPolicy>,

    /// Output JSON only
    #[arg(long)]
    pub json: bool,

    /// Save the result to history
    #[arg(long)]
    pub save: bool,

    /// Note stored with a saved result
    #[arg(long, requires = "save")]
    pub note: Option<String>,
}

/// History subcommands
#[derive(Subcommand, Debug)]
pub enum HistoryCommands {
    /// List saved comparisons, newest first
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,

        /// Output JSON only
        #[arg(long)]
        json: bool,
    },

    /// Show one saved comparison
    Show {
        id: String,

        /// Output JSON only
        #[arg(long)]
        json: bool,
    },

    /// Delete a saved comparison
    Delete { id: String },

    /// Replace the note of a saved comparison (the record gets a new id)
    Note {
        id: String,

        /// New note; omit to clear it
        text: Option<String>,
    },
}

/// Where a task's rows come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    pub id: String,
    pub file: Option<PathBuf>,
}

pub fn parse_task_spec(raw: &str) -> Result<TaskSpec, String> {
    let (id, file) = match raw.split_once('=') {
        Some((id, file)) => {
            if file.is_empty() {
                return Err(format!("missing file after '=' in '{}'", raw));
            }
            (id, Some(PathBuf::from(file)))
        }
        None => (raw, None),
    };

    let id = id.trim();
    if id.is_empty() {
        return Err(format!("missing task id in '{}'", raw));
    }
    Ok(TaskSpec {
        id: id.to_string(),
        file,
    })
}
