//! gxt validate - Check experiment configs, audiences and synthesis

use clap::Args;
use console::style;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::app::AppContext;
use crate::cli::output::{HumanLayout, OutputFormat, emit_human, emit_jsonl, emit_robot, emit_tsv, robot_ok};
use crate::engine::Engine;
use crate::error::{ErrorCode, GxtError, Result};

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Experiments to validate (default: all)
    pub experiments: Vec<String>,

    /// Engine used for the synthesis check (default: configured engine)
    #[arg(long)]
    pub engine: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub experiment: String,
    pub valid: bool,
    pub variants: usize,
    /// Whether the assignment query was synthesized for an engine.
    pub synthesized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn run(ctx: &AppContext, args: &ValidateArgs) -> Result<()> {
    let ids = if args.experiments.is_empty() {
        ctx.project.experiment_ids()?
    } else {
        args.experiments.clone()
    };

    let engine = match ctx.engine(args.engine.as_deref()) {
        Ok(engine) => Some(engine),
        Err(GxtError::EngineNotConfigured(reason)) => {
            warn!(%reason, "no engine configured; skipping synthesis check");
            None
        }
        Err(err) => return Err(err),
    };

    let reports: Vec<ValidationReport> = ids
        .par_iter()
        .map(|id| check(ctx, id, engine.as_deref()))
        .collect();

    let errors: Vec<String> = reports
        .iter()
        .filter_map(|r| r.error.as_ref().map(|e| format!("{}: {e}", r.experiment)))
        .collect();
    info!(checked = reports.len(), invalid = errors.len(), "validation finished");

    if !errors.is_empty() {
        if !ctx.output_format.is_machine_readable() {
            validate_human(&reports, ctx.output_format);
        }
        return Err(GxtError::ValidationFailed {
            checked: reports.len(),
            errors,
        });
    }

    match ctx.output_format {
        OutputFormat::Json => emit_robot(&robot_ok(&reports)),
        OutputFormat::Jsonl => emit_jsonl(&reports),
        OutputFormat::Tsv => {
            emit_tsv(&["experiment", "valid", "variants", "synthesized"], &reports, |r| {
                vec![
                    r.experiment.clone(),
                    r.valid.to_string(),
                    r.variants.to_string(),
                    r.synthesized.to_string(),
                ]
            });
            Ok(())
        }
        OutputFormat::Human | OutputFormat::Plain => {
            validate_human(&reports, ctx.output_format);
            Ok(())
        }
    }
}

/// Load, read the audience and synthesize one experiment.
fn check(ctx: &AppContext, id: &str, engine: Option<&dyn Engine>) -> ValidationReport {
    let outcome = ctx.project.load_experiment(id).and_then(|experiment| {
        let synthesized = match engine {
            Some(engine) => {
                ctx.assignment_query(&experiment, engine)?;
                true
            }
            None => {
                ctx.project.raw_audience(id)?;
                false
            }
        };
        Ok((experiment.variants.len(), synthesized))
    });

    match outcome {
        Ok((variants, synthesized)) => ValidationReport {
            experiment: id.to_string(),
            valid: true,
            variants,
            synthesized,
            code: None,
            error: None,
        },
        Err(err) => ValidationReport {
            experiment: id.to_string(),
            valid: false,
            variants: 0,
            synthesized: false,
            code: Some(err.code()),
            error: Some(err.to_string()),
        },
    }
}

fn validate_human(reports: &[ValidationReport], format: OutputFormat) {
    let colored = format.use_colors();
    let mut layout = HumanLayout::new();
    layout.title("Validation");
    for report in reports {
        let line = match &report.error {
            None => {
                let mark = if colored { style("ok").green().to_string() } else { "ok".to_string() };
                format!("{mark}  {} ({} variants)", report.experiment, report.variants)
            }
            Some(error) => {
                let mark = if colored { style("FAIL").red().to_string() } else { "FAIL".to_string() };
                format!("{mark} {}: {error}", report.experiment)
            }
        };
        layout.push_line(line);
    }
    emit_human(layout);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProjectConfig;
    use crate::test_utils::fixtures::ProjectFixture;

    fn context(fixture: &ProjectFixture) -> AppContext {
        AppContext::new(fixture.path(), ProjectConfig::default(), OutputFormat::Json).unwrap()
    }

    #[test]
    fn valid_experiment_is_synthesized() {
        let fixture = ProjectFixture::new();
        fixture.experiment("exp", "user_id", &[("a", 0.5), ("b", 0.5)], "SELECT 1 AS user_id");
        let ctx = context(&fixture);
        let engine = ctx.engine(Some("generic")).unwrap();

        let report = check(&ctx, "exp", Some(engine.as_ref()));
        assert!(report.valid);
        assert!(report.synthesized);
        assert_eq!(report.variants, 2);
    }

    #[test]
    fn missing_audience_fails_without_engine() {
        let fixture = ProjectFixture::new();
        fixture.experiment("exp", "user_id", &[("a", 1.0)], "");
        let report = check(&context(&fixture), "exp", None);
        assert!(!report.valid);
        assert_eq!(report.code, Some(ErrorCode::AudienceMissing));
    }

    #[test]
    fn run_collects_every_failure() {
        let fixture = ProjectFixture::new();
        fixture.experiment("good", "user_id", &[("a", 1.0)], "SELECT 1 AS user_id");
        fixture.experiment("sum", "user_id", &[("a", 0.5)], "SELECT 1 AS user_id");
        fixture.experiment("unit", "user id", &[("a", 1.0)], "SELECT 1 AS user_id");

        let args = ValidateArgs {
            experiments: Vec::new(),
            engine: Some("sqlite".into()),
        };
        match run(&context(&fixture), &args).unwrap_err() {
            GxtError::ValidationFailed { checked, errors } => {
                assert_eq!(checked, 3);
                assert_eq!(errors.len(), 2);
                assert!(errors.iter().any(|e| e.starts_with("sum:")));
                assert!(errors.iter().any(|e| e.starts_with("unit:")));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
