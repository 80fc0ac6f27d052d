//! Text rendering of comparison results and history listings.
//!
//! Renderers return strings so they can be tested; callers print them.

use matcomp_common::consistency::buckets_by_level;
use matcomp_common::{ComparisonResult, ConsistencyDistribution, HistoryRecord, HistorySummary, Severity};
use owo_colors::OwoColorize;

const HR: &str = "────────────────────────────────────────────────────────────";

/// Display options passed explicitly to every renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    pub color: bool,
    /// Decimal places for metric values
    pub precision: usize,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            color: false,
            precision: 4,
        }
    }
}

/// Paint text in a severity's color when color is enabled.
pub fn paint(text: &str, severity: Severity, color: bool) -> String {
    if !color {
        return text.to_string();
    }
    let (r, g, b) = severity.rgb();
    text.truecolor(r, g, b).to_string()
}

fn bold(text: &str, color: bool) -> String {
    if color {
        text.bold().to_string()
    } else {
        text.to_string()
    }
}

fn dim(text: &str, color: bool) -> String {
    if color {
        text.dimmed().to_string()
    } else {
        text.to_string()
    }
}

fn write_distribution(out: &mut String, distribution: &ConsistencyDistribution) {
    if distribution.is_empty() {
        out.push_str("  (no samples with two or more valid predictions)\n");
        return;
    }
    for (label, bucket) in buckets_by_level(distribution) {
        out.push_str(&format!(
            "  {:24} {:>6} {:>7.1}%\n",
            label, bucket.count, bucket.percentage
        ));
    }
}

/// Full comparison report: overall distribution, then per-target
/// consistency and per-task metrics.
pub fn render_comparison(result: &ComparisonResult, opts: RenderOptions) -> String {
    let mut out = String::new();
    let p = opts.precision;

    out.push_str(&format!(
        "{}\n",
        bold(&format!("Comparison of {} tasks", result.n_tasks), opts.color)
    ));
    out.push_str(&format!("{}\n", dim(HR, opts.color)));
    out.push_str(&format!("{:12} {}\n", "tasks", result.task_ids.join(", ")));
    out.push_str(&format!("{:12} {}\n", "targets", result.target_columns.join(", ")));
    out.push_str(&format!("{:12} {}%\n", "tolerance", result.tolerance));
    out.push_str(&format!("{:12} {}\n", "policy", result.cluster_policy));
    out.push_str(&format!("{:12} {}\n", "samples", result.total_samples));
    out.push('\n');

    out.push_str(&format!("{}\n", bold("Consistency", opts.color)));
    write_distribution(&mut out, &result.consistency_distribution);

    for target in &result.target_columns {
        out.push('\n');
        let samples = result
            .target_consistency
            .get(target)
            .map(|t| t.total_samples)
            .unwrap_or(0);
        out.push_str(&format!(
            "{}\n",
            bold(&format!("Target {} ({} samples)", target, samples), opts.color)
        ));
        if let Some(consistency) = result.target_consistency.get(target) {
            write_distribution(&mut out, &consistency.distribution);
        }

        out.push('\n');
        out.push_str(&format!(
            "  {:16} {:>6} {:>12} {:>12} {:>10} {:>9}\n",
            "Task", "Count", "MAE", "RMSE", "R2", "MAPE"
        ));
        out.push_str(&format!("  {}\n", dim(&"-".repeat(70), opts.color)));

        for task_id in &result.task_ids {
            let Some(metrics) = result.metrics(target, task_id) else {
                continue;
            };
            let mape = format!("{:>8.2}%", metrics.mape);
            let mape = if metrics.count > 0 {
                paint(&mape, metrics.severity(), opts.color)
            } else {
                mape
            };
            out.push_str(&format!(
                "  {:16} {:>6} {:>12.p$} {:>12.p$} {:>10.p$} {}\n",
                task_id,
                metrics.count,
                metrics.mae,
                metrics.rmse,
                metrics.r2,
                mape,
                p = p
            ));
        }
    }

    out
}

/// One line per saved comparison.
pub fn render_history_list(summaries: &[HistorySummary], color: bool) -> String {
    let mut out = String::new();
    if summaries.is_empty() {
        out.push_str("No saved comparisons.\n");
        return out;
    }

    out.push_str(&format!(
        "{:36}  {:16}  {:>7}  {:>7}  {}\n",
        "ID", "Created", "Tol %", "Samples", "Tasks / Note"
    ));
    out.push_str(&format!("{}\n", dim(HR, color)));
    for s in summaries {
        out.push_str(&format!(
            "{:36}  {:16}  {:>7}  {:>7}  {}",
            s.id,
            s.created_at.format("%Y-%m-%d %H:%M").to_string(),
            s.tolerance,
            s.total_samples,
            s.task_ids.join(",")
        ));
        if let Some(note) = &s.note {
            out.push_str(&format!("  {}", dim(&format!("({})", note), color)));
        }
        out.push('\n');
    }
    out
}

/// Saved record header followed by its report.
pub fn render_record(record: &HistoryRecord, opts: RenderOptions) -> String {
    let mut out = String::new();
    out.push_str(&format!("{:12} {}\n", "id", record.id));
    out.push_str(&format!(
        "{:12} {}\n",
        "created",
        record.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    if let Some(note) = &record.note {
        out.push_str(&format!("{:12} {}\n", "note", note));
    }
    out.push('\n');
    out.push_str(&render_comparison(&record.comparison_results, opts));
    out
}
