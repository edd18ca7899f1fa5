//! gxt show - Show one experiment with its variant intervals

use clap::Args;
use serde::Serialize;
use tracing::warn;

use crate::app::AppContext;
use crate::cli::output::{HumanLayout, OutputFormat, emit_human, emit_jsonl, emit_robot, emit_tsv, robot_ok};
use crate::core::experiment::ExperimentConfig;
use crate::core::variants::{CumulativeInterval, VariantSet};
use crate::error::{GxtError, Result};

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Experiment id (directory name under experiments/)
    pub experiment: String,

    /// Also print the assignment SQL for this engine
    #[arg(long)]
    pub sql: bool,

    /// Engine for the bucket expression and --sql (default: configured engine)
    #[arg(long)]
    pub engine: Option<String>,
}

#[derive(Debug, Serialize)]
struct ShowOutput<'a> {
    experiment: &'a ExperimentConfig,
    salt: &'a str,
    precision: u64,
    intervals: &'a [CumulativeInterval],
    /// Variants whose interval does not classify its own lower bound.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    interval_gaps: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    engine: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bucket_expression: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    assignments_table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sql: Option<String>,
}

pub fn run(ctx: &AppContext, args: &ShowArgs) -> Result<()> {
    let experiment = ctx.project.load_experiment(&args.experiment)?;

    let engine = match ctx.engine(args.engine.as_deref()) {
        Ok(engine) => Some(engine),
        Err(GxtError::EngineNotConfigured(_)) if !args.sql => None,
        Err(err) => return Err(err),
    };
    let bucket_expression = engine.as_ref().map(|engine| {
        engine.render(
            experiment.randomization_unit.as_str(),
            experiment.salt(),
            ctx.config.precision,
        )
    });
    let sql = match (&engine, args.sql) {
        (Some(engine), true) => Some(ctx.assignment_query(&experiment, engine.as_ref())?.render()),
        _ => None,
    };

    let interval_gaps = interval_gaps(&experiment.variants);
    if !interval_gaps.is_empty() {
        warn!(experiment = %experiment.id, gaps = ?interval_gaps, "interval table does not classify its own boundaries");
    }

    let output = ShowOutput {
        experiment: &experiment,
        salt: experiment.salt(),
        precision: ctx.config.precision.get(),
        intervals: experiment.variants.intervals(),
        interval_gaps,
        engine: engine.as_ref().map(|engine| engine.engine()),
        bucket_expression,
        assignments_table: ctx.assignments_table(&experiment).ok(),
        sql,
    };

    match ctx.output_format {
        OutputFormat::Json => emit_robot(&robot_ok(&output)),
        OutputFormat::Jsonl => emit_jsonl(output.intervals),
        OutputFormat::Tsv => {
            emit_tsv(&["variant", "exposure", "low", "high"], output.intervals, |i| {
                vec![
                    i.variant.clone(),
                    experiment
                        .variants
                        .exposure_of(&i.variant)
                        .map(|e| e.to_string())
                        .unwrap_or_default(),
                    i.low.to_string(),
                    i.high.to_string(),
                ]
            });
            Ok(())
        }
        OutputFormat::Human | OutputFormat::Plain => {
            show_human(&output);
            Ok(())
        }
    }
}

/// Self-check of the interval table: each non-empty interval must own its
/// lower bound when evaluated in-process.
fn interval_gaps(variants: &VariantSet) -> Vec<String> {
    variants
        .intervals()
        .iter()
        .filter(|interval| !interval.is_empty())
        .filter(|interval| variants.classify(interval.low.as_f64()) != Some(interval.variant.as_str()))
        .map(|interval| interval.variant.clone())
        .collect()
}

fn show_human(output: &ShowOutput<'_>) {
    let experiment = output.experiment;
    let meta = &experiment.metadata;
    let mut layout = HumanLayout::new();
    layout.title(&experiment.id);
    layout
        .kv("Unit", experiment.randomization_unit.as_str())
        .kv("Salt", output.salt)
        .kv("Precision", &output.precision.to_string())
        .kv("Status", meta.status.as_deref().unwrap_or("-"))
        .kv(
            "Assignments table",
            output.assignments_table.as_deref().unwrap_or("-"),
        );
    if let Some(owner) = &meta.owner {
        layout.kv("Owner", owner);
    }
    if let Some(description) = &meta.description {
        layout.kv("Description", description);
    }
    if !meta.tags.is_empty() {
        layout.kv("Tags", &meta.tags.join(", "));
    }
    if meta.start_date.is_some() || meta.end_date.is_some() {
        layout.kv(
            "Window",
            &format!(
                "{} .. {}",
                meta.start_date.as_deref().unwrap_or("?"),
                meta.end_date.as_deref().unwrap_or("?")
            ),
        );
    }

    layout.blank().section("Variants");
    for (variant, interval) in experiment.variants.variants().iter().zip(output.intervals) {
        layout.bullet(&format!(
            "{:<16} {:>8}  [{}, {})",
            variant.name, variant.exposure, interval.low, interval.high
        ));
    }

    if !output.interval_gaps.is_empty() {
        layout.kv("Interval gaps", &output.interval_gaps.join(", "));
    }

    if let Some(expression) = &output.bucket_expression {
        layout
            .blank()
            .section(&format!("Bucket expression ({})", output.engine.unwrap_or("-")))
            .push_line(expression.clone());
    }

    if let Some(sql) = &output.sql {
        layout.blank().section("Assignment SQL").push_line(sql.clone());
    }
    emit_human(layout);
}
