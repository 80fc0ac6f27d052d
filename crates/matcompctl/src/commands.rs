//! Command execution for matcompctl.

use crate::cli::{Cli, Commands, CompareArgs, HistoryCommands, TaskSpec};
use crate::render::{self, RenderOptions};
use anyhow::{bail, Context, Result};
use matcomp_common::backend::PredictionsResponse;
use matcomp_common::{
    ComparisonAggregator, ComparisonRequest, ComparisonResult, Config, HistoryStore,
    HttpPredictionSource, InMemoryPredictionSource, NewHistoryRecord, PredictionSource,
};
use serde_json::Value;
use std::fs;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Dispatch a parsed command line.
pub fn run(cli: Cli) -> Result<()> {
    if let Commands::Config { init: true } = cli.command {
        let path = init_config(cli.config.as_deref())?;
        println!("Wrote default config to {}", path.display());
        return Ok(());
    }

    let config = Config::load(cli.config.as_deref())?;
    let opts = RenderOptions {
        color: !cli.no_color && std::io::stdout().is_terminal(),
        precision: config.comparison.display_precision as usize,
    };

    match cli.command {
        Commands::Compare(args) => execute_compare(&args, &config, opts),
        Commands::History { action } => execute_history(action, &config, opts),
        Commands::Config { .. } => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

/// Write the default config to `target`, or to the user config path.
/// Refuses to overwrite an existing file.
pub fn init_config(target: Option<&Path>) -> Result<PathBuf> {
    let path = match target {
        Some(path) => path.to_path_buf(),
        None => Config::user_config_path().context("No user config directory")?,
    };
    if path.exists() {
        bail!("{} already exists", path.display());
    }
    Config::save_default(&path)?;
    Ok(path)
}

/// Read a predictions file: `{"predictions": [...]}` or a bare row array.
pub fn load_predictions_file(path: &Path) -> Result<Vec<Value>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read predictions: {}", path.display()))?;
    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("Invalid JSON in {}", path.display()))?;

    match value {
        Value::Array(rows) => Ok(rows),
        Value::Object(_) => {
            let body: PredictionsResponse = serde_json::from_value(value)
                .with_context(|| format!("Unexpected predictions shape in {}", path.display()))?;
            Ok(body.predictions)
        }
        _ => bail!(
            "{} must hold a predictions object or an array of rows",
            path.display()
        ),
    }
}

/// Gather every task's rows, from its file when one is given and from the
/// backend otherwise.
pub fn collect_rows(
    tasks: &[TaskSpec],
    backend: &dyn PredictionSource,
) -> Result<InMemoryPredictionSource> {
    let mut source = InMemoryPredictionSource::new();
    for task in tasks {
        let rows = match &task.file {
            Some(path) => load_predictions_file(path)?,
            None => backend
                .fetch_predictions(&task.id)
                .with_context(|| format!("Failed to fetch predictions for {}", task.id))?,
        };
        debug!("Loaded {} rows for {}", rows.len(), task.id);
        source.insert(task.id.clone(), rows);
    }
    Ok(source)
}

/// Build the request and run it against already-collected rows.
pub fn compare_with(
    args: &CompareArgs,
    config: &Config,
    source: &dyn PredictionSource,
) -> Result<ComparisonResult> {
    let request = ComparisonRequest {
        task_ids: args.tasks.iter().map(|t| t.id.clone()).collect(),
        target_columns: args.targets.clone(),
        tolerance: args.tolerance.unwrap_or(config.comparison.default_tolerance),
        cluster_policy: args.policy,
    };

    let aggregator = ComparisonAggregator::new(config.comparison.options());
    aggregator
        .compare_from_source(&request, source)
        .context("comparison failed")
}

fn execute_compare(args: &CompareArgs, config: &Config, opts: RenderOptions) -> Result<()> {
    let backend = HttpPredictionSource::new(&config.backend.base_url, config.backend.timeout_secs);
    let rows = collect_rows(&args.tasks, &backend)?;
    let result = compare_with(args, config, &rows)?;

    if args.save {
        let store = open_history(config)?;
        let saved = store.save(NewHistoryRecord::from_result(result.clone(), args.note.clone()))?;
        info!("Saved comparison {}", saved.id);
        if !args.json {
            println!("Saved as {}", saved.id);
            println!();
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{}", render::render_comparison(&result, opts));
    }
    Ok(())
}

fn open_history(config: &Config) -> Result<HistoryStore> {
    let path = config.history.resolved_path();
    HistoryStore::open(&path).with_context(|| format!("Failed to open history at {}", path.display()))
}

fn execute_history(action: HistoryCommands, config: &Config, opts: RenderOptions) -> Result<()> {
    let store = open_history(config)?;

    match action {
        HistoryCommands::List { limit, json } => {
            let summaries = store.list(limit)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summaries)?);
            } else {
                print!("{}", render::render_history_list(&summaries, opts.color));
            }
        }
        HistoryCommands::Show { id, json } => {
            let Some(record) = store.get(&id)? else {
                bail!("No saved comparison with id {}", id);
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else {
                print!("{}", render::render_record(&record, opts));
            }
        }
        HistoryCommands::Delete { id } => {
            if !store.delete(&id)? {
                bail!("No saved comparison with id {}", id);
            }
            println!("Deleted {}", id);
        }
        HistoryCommands::Note { id, text } => {
            let replacement = store.update_note(&id, text)?;
            println!("{} replaced by {}", id, replacement.id);
        }
    }
    Ok(())
}
