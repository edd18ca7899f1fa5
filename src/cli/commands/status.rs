//! gxt status - Persisted assignments and recent runs on the local warehouse

use clap::Args;
use serde::Serialize;

use crate::app::AppContext;
use crate::cli::output::{HumanLayout, OutputFormat, emit_human, emit_jsonl, emit_robot, emit_tsv, robot_ok};
use crate::core::experiment::ExperimentConfig;
use crate::engine::identifier_parts;
use crate::error::Result;
use crate::storage::{RunRecord, VariantCount};

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Experiment to report on (default: runs for every experiment)
    pub experiment: Option<String>,

    /// Engine whose warehouse to read (default: configured engine)
    #[arg(long)]
    pub engine: Option<String>,

    /// Number of recent runs to show
    #[arg(long, short = 'n', default_value = "10")]
    pub limit: usize,
}

/// Persisted units for one variant against its configured exposure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariantShare {
    pub variant: String,
    pub units: u64,
    /// Observed fraction of persisted units.
    pub share: f64,
    /// `None` for variants no longer in `config.yml`.
    pub exposure: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experiment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignments_table: Option<String>,
    pub assigned: Vec<VariantShare>,
    pub runs: Vec<RunRecord>,
}

/// Configured variants in declaration order, then any persisted variant that
/// is no longer configured.
#[allow(clippy::cast_precision_loss)]
fn shares(experiment: &ExperimentConfig, counts: &[VariantCount]) -> Vec<VariantShare> {
    let total: u64 = counts.iter().map(|c| c.units).sum();
    let units_of = |name: &str| {
        counts
            .iter()
            .find(|c| c.variant == name)
            .map_or(0, |c| c.units)
    };
    let share = |units: u64| if total == 0 { 0.0 } else { units as f64 / total as f64 };

    let configured = experiment.variants.variants().iter().map(|variant| {
        let units = units_of(&variant.name);
        VariantShare {
            variant: variant.name.clone(),
            units,
            share: share(units),
            exposure: Some(variant.exposure),
        }
    });
    let retired = counts
        .iter()
        .filter(|c| experiment.variants.exposure_of(&c.variant).is_none())
        .map(|c| VariantShare {
            variant: c.variant.clone(),
            units: c.units,
            share: share(c.units),
            exposure: None,
        });
    configured.chain(retired).collect()
}

pub fn run(ctx: &AppContext, args: &StatusArgs) -> Result<()> {
    let report = collect(ctx, args)?;

    match ctx.output_format {
        OutputFormat::Json => emit_robot(&robot_ok(&report)),
        OutputFormat::Jsonl => emit_jsonl(&report.runs),
        OutputFormat::Tsv => {
            emit_tsv(
                &["run_id", "experiment", "ran_at", "inserted", "existing", "drifted"],
                &report.runs,
                |run| {
                    vec![
                        run.id.clone(),
                        run.experiment_id.clone(),
                        run.ran_at.clone(),
                        run.inserted.to_string(),
                        run.existing.to_string(),
                        run.drifted.to_string(),
                    ]
                },
            );
            Ok(())
        }
        OutputFormat::Human | OutputFormat::Plain => {
            status_human(&report);
            Ok(())
        }
    }
}

pub fn collect(ctx: &AppContext, args: &StatusArgs) -> Result<StatusReport> {
    let engine = ctx.engine(args.engine.as_deref())?;
    let warehouse = ctx.open_warehouse(engine.as_ref())?;

    let (assignments_table, assigned) = match &args.experiment {
        Some(id) => {
            let experiment = ctx.project.load_experiment(id)?;
            let table = ctx.assignments_table(&experiment)?;
            let name = identifier_parts(&table).pop().unwrap_or_else(|| table.clone());
            let counts = if warehouse.table_exists(&name)? {
                warehouse.ledger_summary(&engine.qualify_identifier(&table), id)?
            } else {
                Vec::new()
            };
            (Some(table), shares(&experiment, &counts))
        }
        None => (None, Vec::new()),
    };

    Ok(StatusReport {
        experiment: args.experiment.clone(),
        assignments_table,
        assigned,
        runs: warehouse.recent_runs(args.experiment.as_deref(), args.limit)?,
    })
}

fn status_human(report: &StatusReport) {
    let mut layout = HumanLayout::new();
    layout.title(&format!(
        "Status {}",
        report.experiment.as_deref().unwrap_or("(all experiments)")
    ));

    if let Some(table) = &report.assignments_table {
        layout.kv("Assignments table", table);
        let total: u64 = report.assigned.iter().map(|c| c.units).sum();
        layout.kv("Assigned units", &total.to_string());
        for share in &report.assigned {
            let exposure = share
                .exposure
                .map_or_else(|| "not configured".to_string(), |e| format!("{:.1}%", e * 100.0));
            layout.bullet(&format!(
                "{:<16} {:>8}  {:>5.1}%  (exposure {exposure})",
                share.variant,
                share.units,
                share.share * 100.0
            ));
        }
        layout.blank();
    }

    layout.section("Recent runs");
    if report.runs.is_empty() {
        layout.push_line("No runs recorded.");
    }
    for run in &report.runs {
        layout.bullet(&format!(
            "{}  {}  +{} inserted, {} existing{}",
            run.ran_at,
            run.experiment_id,
            run.inserted,
            run.existing,
            if run.drifted > 0 {
                format!(", {} drifted", run.drifted)
            } else {
                String::new()
            }
        ));
    }
    emit_human(layout);
}
