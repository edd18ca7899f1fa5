//! gxt run - Compile an experiment's assignment SQL and optionally write the ledger

use clap::Args;
use clap::builder::PossibleValuesParser;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::app::AppContext;
use crate::cli::output::{HumanLayout, OutputFormat, emit_human, emit_jsonl, emit_robot, emit_tsv, robot_ok};
use crate::core::assignment::STAGES;
use crate::core::experiment::ExperimentConfig;
use crate::engine::{Engine, LEDGER_COLUMNS, LEDGER_KEYS, identifier_parts};
use crate::error::{GxtError, Result};
use crate::storage::{AssignmentRow, RunRecord, sql_digest};

/// Units listed when some buckets matched no variant.
const UNMATCHED_SAMPLE: usize = 5;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Experiment id (directory name under experiments/)
    pub experiment: String,

    /// Engine to compile for (default: configured engine)
    #[arg(long)]
    pub engine: Option<String>,

    /// Print only one stage of the assignment query
    #[arg(long, value_parser = PossibleValuesParser::new(STAGES), conflicts_with = "execute")]
    pub stage: Option<String>,

    /// Execute against the local warehouse and insert new assignments
    #[arg(long)]
    pub execute: bool,

    /// Create the assignments table when it does not exist
    #[arg(long)]
    pub create_assignments_table: bool,

    /// Show this many assignment rows after executing
    #[arg(long, default_value = "0")]
    pub preview: usize,
}

/// Compiled statements for one experiment.
#[derive(Debug, Serialize)]
pub struct CompiledRun {
    pub experiment: String,
    pub engine: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    pub assignment_sql: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignments_table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_table_sql: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger_sql: Option<String>,
}

/// Result of an executed run.
#[derive(Debug, Serialize)]
pub struct ExecutedRun {
    pub run_id: String,
    pub experiment: String,
    pub engine: String,
    pub assignments_table: String,
    pub inserted: u64,
    pub existing: u64,
    pub drifted: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub preview: Vec<AssignmentRow>,
}

pub fn run(ctx: &AppContext, args: &RunArgs) -> Result<()> {
    let experiment = ctx.project.load_experiment(&args.experiment)?;
    let engine = ctx.engine(args.engine.as_deref())?;

    if args.execute {
        let executed = execute(ctx, &experiment, engine.as_ref(), args)?;
        return emit_executed(ctx, &executed);
    }

    let compiled = compile(ctx, &experiment, engine.as_ref(), args)?;
    emit_compiled(ctx, &compiled)
}

/// Render the assignment query and the ledger statements without running them.
pub fn compile(
    ctx: &AppContext,
    experiment: &ExperimentConfig,
    engine: &dyn Engine,
    args: &RunArgs,
) -> Result<CompiledRun> {
    let query = ctx.assignment_query(experiment, engine)?;

    if let Some(stage) = &args.stage {
        let sql = query.stage_sql(stage).ok_or_else(|| {
            GxtError::Config(format!("unknown stage '{stage}' (stages: {})", STAGES.join(", ")))
        })?;
        return Ok(CompiledRun {
            experiment: experiment.id.clone(),
            engine: engine.engine().to_string(),
            stage: Some(stage.clone()),
            assignment_sql: sql,
            assignments_table: None,
            create_table_sql: None,
            ledger_sql: None,
        });
    }

    let assignment_sql = query.render();
    let (assignments_table, create_table_sql, ledger_sql) = match ctx.assignments_table(experiment) {
        Ok(table) => {
            let target = engine.qualify_identifier(&table);
            let select =
                engine.ledger_select(&experiment.id, &experiment.randomization_unit, &assignment_sql);
            let ledger = engine.insert_if_absent(&target, &select, &LEDGER_KEYS, &LEDGER_COLUMNS);
            let ddl = args
                .create_assignments_table
                .then(|| engine.ledger_ddl(&target));
            (Some(table), ddl, Some(ledger))
        }
        Err(GxtError::MissingConfig(key)) => {
            warn!(experiment = %experiment.id, %key, "no assignments table configured; printing assignment SQL only");
            (None, None, None)
        }
        Err(err) => return Err(err),
    };

    Ok(CompiledRun {
        experiment: experiment.id.clone(),
        engine: engine.engine().to_string(),
        stage: None,
        assignment_sql,
        assignments_table,
        create_table_sql,
        ledger_sql,
    })
}

/// Run the assignment query locally and insert units not yet in the ledger.
///
/// Nothing is written when any unit falls outside every variant interval.
pub fn execute(
    ctx: &AppContext,
    experiment: &ExperimentConfig,
    engine: &dyn Engine,
    args: &RunArgs,
) -> Result<ExecutedRun> {
    let mut warehouse = ctx.open_warehouse(engine)?;
    let query = ctx.assignment_query(experiment, engine)?;
    let assignment_sql = query.render();
    let unit = &experiment.randomization_unit;

    let unmatched = warehouse.unmatched(&assignment_sql, unit, UNMATCHED_SAMPLE)?;
    if unmatched.count > 0 {
        return Err(GxtError::UnmatchedBucket {
            experiment: experiment.id.clone(),
            unmatched: unmatched.count,
            sample: unmatched.sample,
        });
    }

    let table = ctx.assignments_table(experiment)?;
    let target = engine.qualify_identifier(&table);
    if args.create_assignments_table {
        warehouse.ensure_ledger(&engine.ledger_ddl(&target))?;
    } else {
        let name = identifier_parts(&table).pop().unwrap_or_else(|| table.clone());
        if !warehouse.table_exists(&name)? {
            return Err(GxtError::Config(format!(
                "assignments table {table} does not exist; rerun with --create-assignments-table"
            )));
        }
    }

    let select = engine.ledger_select(&experiment.id, unit, &assignment_sql);
    let insert = engine.insert_if_absent(&target, &select, &LEDGER_KEYS, &LEDGER_COLUMNS);
    let outcome = warehouse.upsert_from_select(&target, &select, &insert)?;

    let record = RunRecord {
        id: Uuid::new_v4().to_string(),
        experiment_id: experiment.id.clone(),
        engine: engine.engine().to_string(),
        assignments_table: table.clone(),
        sql_sha256: sql_digest(&insert),
        inserted: outcome.inserted,
        existing: outcome.existing,
        drifted: outcome.drifted,
        ran_at: chrono::Utc::now().to_rfc3339(),
    };
    warehouse.record_run(&record)?;
    info!(experiment = %experiment.id, run_id = %record.id, "recorded run");

    let preview = if args.preview > 0 {
        warehouse.preview(&assignment_sql, unit, args.preview)?
    } else {
        Vec::new()
    };

    Ok(ExecutedRun {
        run_id: record.id,
        experiment: record.experiment_id,
        engine: record.engine,
        assignments_table: table,
        inserted: outcome.inserted,
        existing: outcome.existing,
        drifted: outcome.drifted,
        preview,
    })
}

fn emit_compiled(ctx: &AppContext, compiled: &CompiledRun) -> Result<()> {
    match ctx.output_format {
        OutputFormat::Json => emit_robot(&robot_ok(compiled)),
        OutputFormat::Jsonl => emit_jsonl(std::slice::from_ref(compiled)),
        OutputFormat::Human | OutputFormat::Plain | OutputFormat::Tsv => {
            let mut out = String::new();
            if compiled.stage.is_some() || compiled.ledger_sql.is_none() {
                out.push_str(&compiled.assignment_sql);
            } else {
                out.push_str("-- assignment query\n");
                out.push_str(&compiled.assignment_sql);
                out.push_str(";\n");
                if let Some(ddl) = &compiled.create_table_sql {
                    out.push_str("\n-- create assignments table\n");
                    out.push_str(ddl);
                    out.push_str(";\n");
                }
                if let Some(ledger) = &compiled.ledger_sql {
                    out.push_str("\n-- insert new assignments\n");
                    out.push_str(ledger);
                }
            }
            out.push(';');
            println!("{out}");
            Ok(())
        }
    }
}

fn emit_executed(ctx: &AppContext, executed: &ExecutedRun) -> Result<()> {
    match ctx.output_format {
        OutputFormat::Json => emit_robot(&robot_ok(executed)),
        OutputFormat::Jsonl => emit_jsonl(&executed.preview),
        OutputFormat::Tsv => {
            emit_tsv(&["unit", "hash_bucket", "variant"], &executed.preview, |row| {
                vec![
                    row.unit.clone(),
                    row.hash_bucket.map(|b| b.to_string()).unwrap_or_default(),
                    row.variant.clone().unwrap_or_default(),
                ]
            });
            Ok(())
        }
        OutputFormat::Human | OutputFormat::Plain => {
            let mut layout = HumanLayout::new();
            layout.title(&format!("Run {}", executed.experiment));
            layout
                .kv("Engine", &executed.engine)
                .kv("Assignments table", &executed.assignments_table)
                .kv("Inserted", &executed.inserted.to_string())
                .kv("Already assigned", &executed.existing.to_string())
                .kv("Run id", &executed.run_id);
            if executed.drifted > 0 {
                layout.kv("Drifted", &executed.drifted.to_string());
            }
            if !executed.preview.is_empty() {
                layout.blank().section("Preview");
                for row in &executed.preview {
                    layout.bullet(&format!(
                        "{}  {}  {}",
                        row.unit,
                        row.hash_bucket.map(|b| format!("{b:.6}")).unwrap_or_default(),
                        row.variant.as_deref().unwrap_or("NULL")
                    ));
                }
            }
            emit_human(layout);
            Ok(())
        }
    }
}
