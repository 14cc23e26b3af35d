//! Analytics commands - history, show, export, reference, delete
//!
//! All of them open the saved analytics directory through a
//! `MetricsRegistry`, so the reference flag and file naming rules are the
//! same ones a running application applies.

use crate::cli::error::HelpfulError;
use crate::cli::output::{format_metric, print_table, print_table_colored};
use anyhow::{Context, Result};
use comfy_table::Color;
use neuroshift_core::{JobId, JobResult, MetricsAccumulator, MetricsRegistry, NeuroshiftConfig};
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// One row of `neuroshift history`.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticSummary {
    pub job_id: String,
    pub name: String,
    pub description: String,
    pub key: String,
    pub predictions: usize,
    pub total_predictions: usize,
    pub reference: bool,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub result: Option<JobResult>,
}

impl AnalyticSummary {
    fn of(accumulator: &MetricsAccumulator) -> Self {
        Self {
            job_id: accumulator.job_id().to_string(),
            name: accumulator.display_name(),
            description: accumulator.description(),
            key: accumulator.key().to_string(),
            predictions: accumulator.prediction_count(),
            total_predictions: accumulator.total_predictions(),
            reference: accumulator.is_reference(),
            accuracy: accumulator.overall_accuracy(),
            precision: accumulator.overall_precision(),
            recall: accumulator.overall_recall(),
            f1: accumulator.overall_f1(),
            result: accumulator.result(),
        }
    }
}

/// Per-class row of `neuroshift show`.
#[derive(Debug, Clone, Serialize)]
pub struct ClassMetrics {
    pub class: String,
    pub true_positive: u64,
    pub true_negative: u64,
    pub false_positive: u64,
    pub false_negative: u64,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

#[derive(Debug, Serialize)]
struct ShowOutput {
    #[serde(flatten)]
    summary: AnalyticSummary,
    classes: Vec<ClassMetrics>,
}

fn open_registry(config: &NeuroshiftConfig) -> Result<MetricsRegistry> {
    let dir = &config.paths.analytics;
    MetricsRegistry::open(dir.clone(), &config.analytics_file_fields())
        .with_context(|| format!("Failed to open analytics in {}", dir.display()))
}

fn find(registry: &MetricsRegistry, raw: &str) -> Result<Arc<MetricsAccumulator>> {
    let id = JobId::parse(raw).map_err(|e| HelpfulError::invalid_job_id(raw, e))?;
    registry
        .get_by_id(&id)
        .ok_or_else(|| HelpfulError::analytic_not_found(raw).into())
}

/// Saved analytics, reference first, then by name.
pub fn summaries(registry: &MetricsRegistry) -> Vec<AnalyticSummary> {
    let mut rows: Vec<AnalyticSummary> = registry
        .saved()
        .iter()
        .map(|acc| AnalyticSummary::of(acc))
        .collect();
    rows.sort_by(|a, b| {
        b.reference
            .cmp(&a.reference)
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.job_id.cmp(&b.job_id))
    });
    rows
}

pub fn class_metrics(accumulator: &MetricsAccumulator) -> Vec<ClassMetrics> {
    accumulator
        .classes()
        .into_iter()
        .filter_map(|class| {
            let counts = accumulator.confusion(&class)?;
            Some(ClassMetrics {
                accuracy: accumulator.class_accuracy(&class),
                precision: accumulator.class_precision(&class),
                recall: accumulator.class_recall(&class),
                f1: accumulator.class_f1(&class),
                true_positive: counts.true_positive,
                true_negative: counts.true_negative,
                false_positive: counts.false_positive,
                false_negative: counts.false_negative,
                class,
            })
        })
        .collect()
}

fn status_cell(result: Option<&JobResult>) -> (String, Option<Color>) {
    match result {
        Some(JobResult::Success) => ("success".to_string(), Some(Color::Green)),
        Some(JobResult::Failure { message }) => (format!("failed: {}", message), Some(Color::Red)),
        None => ("incomplete".to_string(), Some(Color::Yellow)),
    }
}

pub fn run_history(config: &NeuroshiftConfig, json: bool) -> Result<()> {
    let registry = open_registry(config)?;
    let rows = summaries(&registry);

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if rows.is_empty() {
        println!("No saved analytics in {}", config.paths.analytics.display());
        return Ok(());
    }

    let table_rows = rows
        .iter()
        .map(|row| {
            let marker = if row.reference {
                ("*".to_string(), Some(Color::Green))
            } else {
                (String::new(), None)
            };
            vec![
                marker,
                (row.job_id.clone(), None),
                (row.name.clone(), None),
                (row.key.clone(), None),
                (format!("{}/{}", row.predictions, row.total_predictions), None),
                (format_metric(row.accuracy), None),
                (format_metric(row.precision), None),
                (format_metric(row.recall), None),
                (format_metric(row.f1), None),
                status_cell(row.result.as_ref()),
            ]
        })
        .collect();
    print_table_colored(
        &[
            "Ref",
            "Job ID",
            "Name",
            "Key",
            "Predictions",
            "Accuracy",
            "Precision",
            "Recall",
            "F1",
            "Status",
        ],
        table_rows,
    );
    Ok(())
}

pub fn run_show(config: &NeuroshiftConfig, job_id: &str, json: bool) -> Result<()> {
    let registry = open_registry(config)?;
    let accumulator = find(&registry, job_id)?;
    let output = ShowOutput {
        summary: AnalyticSummary::of(&accumulator),
        classes: class_metrics(&accumulator),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let summary = &output.summary;
    println!("{} ({})", summary.name, summary.job_id);
    println!("  {}", summary.description);
    println!("  Key:         {}", summary.key);
    println!(
        "  Predictions: {}/{}",
        summary.predictions, summary.total_predictions
    );
    println!(
        "  Overall:     accuracy {}  precision {}  recall {}  F1 {}",
        format_metric(summary.accuracy),
        format_metric(summary.precision),
        format_metric(summary.recall),
        format_metric(summary.f1)
    );
    println!();

    let rows = output
        .classes
        .iter()
        .map(|c| {
            vec![
                c.class.clone(),
                c.true_positive.to_string(),
                c.true_negative.to_string(),
                c.false_positive.to_string(),
                c.false_negative.to_string(),
                format_metric(c.accuracy),
                format_metric(c.precision),
                format_metric(c.recall),
                format_metric(c.f1),
            ]
        })
        .collect();
    print_table(
        &[
            "Class",
            "TP",
            "TN",
            "FP",
            "FN",
            "Accuracy",
            "Precision",
            "Recall",
            "F1",
        ],
        rows,
    );
    Ok(())
}

pub fn run_export(config: &NeuroshiftConfig, job_id: &str, output: Option<&Path>) -> Result<()> {
    let registry = open_registry(config)?;
    let accumulator = find(&registry, job_id)?;
    let csv = accumulator
        .export_csv()
        .with_context(|| format!("Failed to export analytic {}", job_id))?;

    match output {
        Some(path) => {
            std::fs::write(path, &csv)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Exported analytic {} to {}", job_id, path.display());
            println!(
                "Exported {} prediction(s) to {}",
                accumulator.prediction_count(),
                path.display()
            );
        }
        None => {
            std::io::stdout()
                .write_all(&csv)
                .context("Failed to write CSV to stdout")?;
        }
    }
    Ok(())
}

pub fn run_reference(config: &NeuroshiftConfig, job_id: Option<&str>, clear: bool) -> Result<()> {
    let registry = open_registry(config)?;

    if clear {
        match registry.reference() {
            Some(previous) => {
                registry.forget_reference();
                println!("Cleared reference '{}'", previous.display_name());
            }
            None => println!("No reference is set"),
        }
        return Ok(());
    }

    let Some(job_id) = job_id else {
        anyhow::bail!("a job id or --clear is required");
    };
    let accumulator = find(&registry, job_id)?;
    if !registry.set_reference(accumulator.job_id()) {
        return Err(HelpfulError::analytic_not_found(job_id).into());
    }
    println!(
        "Reference set to '{}' ({})",
        accumulator.display_name(),
        accumulator.key()
    );
    Ok(())
}

pub fn run_delete(config: &NeuroshiftConfig, job_id: &str) -> Result<()> {
    let registry = open_registry(config)?;
    let accumulator = find(&registry, job_id)?;
    let path = registry.record_path(&accumulator);

    registry
        .delete(&accumulator)
        .with_context(|| format!("Failed to delete analytic {}", job_id))?;
    match path {
        Some(path) => println!(
            "Deleted '{}' ({})",
            accumulator.display_name(),
            path.display()
        ),
        None => println!("Deleted '{}'", accumulator.display_name()),
    }
    Ok(())
}
