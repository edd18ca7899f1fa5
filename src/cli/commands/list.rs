//! gxt list - List experiments under experiments/

use clap::Args;
use console::style;
use serde::Serialize;

use crate::app::AppContext;
use crate::cli::output::{HumanLayout, OutputFormat, emit_human, emit_jsonl, emit_robot, emit_tsv, robot_ok};
use crate::error::Result;
use crate::project::ExperimentEntry;

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only experiments with this status (e.g. running, draft)
    #[arg(long)]
    pub status: Option<String>,

    /// Only experiments carrying this tag
    #[arg(long, short)]
    pub tag: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExperimentSummary {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub randomization_unit: Option<String>,
    pub variants: Vec<String>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    pub tags: Vec<String>,
    pub groups: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExperimentSummary {
    fn from_entry(entry: &ExperimentEntry) -> Self {
        match &entry.config {
            Ok(config) => Self {
                id: entry.id.clone(),
                randomization_unit: Some(config.randomization_unit.to_string()),
                variants: config
                    .variants
                    .variants()
                    .iter()
                    .map(|v| format!("{}={}", v.name, v.exposure))
                    .collect(),
                status: config.metadata.status.clone().unwrap_or_else(|| "-".to_string()),
                owner: config.metadata.owner.clone(),
                tags: config.metadata.tags.clone(),
                groups: config.metadata.groups,
                error: None,
            },
            Err(err) => Self {
                id: entry.id.clone(),
                randomization_unit: None,
                variants: Vec::new(),
                status: "invalid".to_string(),
                owner: None,
                tags: Vec::new(),
                groups: 0,
                error: Some(err.to_string()),
            },
        }
    }
}

pub fn run(ctx: &AppContext, args: &ListArgs) -> Result<()> {
    let summaries: Vec<ExperimentSummary> = ctx
        .project
        .experiments()?
        .iter()
        .map(ExperimentSummary::from_entry)
        .filter(|s| {
            args.status
                .as_ref()
                .is_none_or(|status| s.status.eq_ignore_ascii_case(status))
        })
        .filter(|s| args.tag.as_ref().is_none_or(|tag| s.tags.contains(tag)))
        .collect();

    match ctx.output_format {
        OutputFormat::Json => emit_robot(&robot_ok(&summaries)),
        OutputFormat::Jsonl => emit_jsonl(&summaries),
        OutputFormat::Tsv => {
            emit_tsv(&["id", "unit", "status", "variants", "groups"], &summaries, |s| {
                vec![
                    s.id.clone(),
                    s.randomization_unit.clone().unwrap_or_default(),
                    s.status.clone(),
                    s.variants.join(","),
                    s.groups.to_string(),
                ]
            });
            Ok(())
        }
        OutputFormat::Human | OutputFormat::Plain => {
            list_human(&summaries, ctx.output_format);
            Ok(())
        }
    }
}

fn list_human(summaries: &[ExperimentSummary], format: OutputFormat) {
    if summaries.is_empty() {
        println!("No experiments found.");
        return;
    }

    let mut layout = HumanLayout::new();
    layout.title(&format!("Experiments ({})", summaries.len()));
    for summary in summaries {
        let id = if format.use_colors() {
            style(&summary.id).bold().to_string()
        } else {
            summary.id.clone()
        };
        match &summary.error {
            Some(error) => layout.push_line(format!("{id}  [invalid] {error}")),
            None => layout.push_line(format!(
                "{id}  [{}] unit={} variants={}",
                summary.status,
                summary.randomization_unit.as_deref().unwrap_or("-"),
                summary.variants.join(", ")
            )),
        };
    }
    emit_human(layout);
}
