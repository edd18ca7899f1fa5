//! Context-aware error suggestions.
//!
//! Complements the static suggestions in the `codes` module by reading the
//! structured context attached to an error.

use serde_json::Value;

use super::codes::ErrorCode;

/// Generate a context-aware suggestion for an error.
///
/// Falls back to [`ErrorCode::suggestion`] when the context does not carry
/// enough detail for a more specific hint.
pub fn suggest_for_error(code: ErrorCode, context: Option<&Value>) -> String {
    match code {
        ErrorCode::ExperimentNotFound => suggest_experiment_not_found(context),
        ErrorCode::ExposureSumInvalid => suggest_exposure_sum(context),
        ErrorCode::UnitColumnInvalid => suggest_unit_column(context),
        ErrorCode::EngineUnknown => suggest_engine_unknown(context),
        ErrorCode::ConfigMissingRequired => suggest_config_missing_required(context),
        ErrorCode::UnmatchedBucket => suggest_unmatched_bucket(context),
        ErrorCode::ValidationFailed => suggest_validation_failed(context),
        _ => code.suggestion().to_string(),
    }
}

fn context_str<'a>(context: Option<&'a Value>, key: &str) -> Option<&'a str> {
    context.and_then(|c| c.get(key)).and_then(Value::as_str)
}

fn context_strings(context: Option<&Value>, key: &str) -> Vec<String> {
    context
        .and_then(|c| c.get(key))
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn suggest_experiment_not_found(context: Option<&Value>) -> String {
    let Some(experiment) = context_str(context, "experiment") else {
        return ErrorCode::ExperimentNotFound.suggestion().to_string();
    };
    let available = context_strings(context, "available");
    let refs: Vec<&str> = available.iter().map(String::as_str).collect();
    let similar = suggest_similar_experiments(experiment, &refs, 3);

    if similar.is_empty() {
        format!(
            "Experiment '{experiment}' not found. Run `gxt list` to see available experiments"
        )
    } else {
        format!(
            "Experiment '{experiment}' not found. Did you mean: {}?",
            similar.join(", ")
        )
    }
}

fn suggest_exposure_sum(context: Option<&Value>) -> String {
    let experiment = context_str(context, "experiment");
    let sum = context.and_then(|c| c.get("sum")).and_then(Value::as_f64);

    match (experiment, sum) {
        (Some(exp), Some(sum)) if sum < 1.0 => format!(
            "Exposures for '{exp}' sum to {sum}; add {:.6} to a variant so the total is 1.0",
            1.0 - sum
        ),
        (Some(exp), Some(sum)) => format!(
            "Exposures for '{exp}' sum to {sum}; remove {:.6} from the variants so the total is 1.0",
            sum - 1.0
        ),
        _ => ErrorCode::ExposureSumInvalid.suggestion().to_string(),
    }
}

fn suggest_unit_column(context: Option<&Value>) -> String {
    match context_str(context, "experiment") {
        Some(exp) => format!(
            "Set `randomization_unit` in experiments/{exp}/config.yml to a plain column name such as user_id, \
             other than hash_bucket, variant or a query stage name"
        ),
        None => ErrorCode::UnitColumnInvalid.suggestion().to_string(),
    }
}

fn suggest_engine_unknown(context: Option<&Value>) -> String {
    let known = context_strings(context, "known");
    if known.is_empty() {
        return ErrorCode::EngineUnknown.suggestion().to_string();
    }
    format!("Use one of the registered engines: {}", known.join(", "))
}

fn suggest_config_missing_required(context: Option<&Value>) -> String {
    match context_str(context, "config_key") {
        Some(key) => format!(
            "Required config '{key}' is missing. Set `{key}` in gxt_project.yml or export GXT_{}",
            key.to_uppercase()
        ),
        None => ErrorCode::ConfigMissingRequired.suggestion().to_string(),
    }
}

fn suggest_unmatched_bucket(context: Option<&Value>) -> String {
    let experiment = context_str(context, "experiment");
    let unmatched = context
        .and_then(|c| c.get("unmatched"))
        .and_then(Value::as_u64);

    match (experiment, unmatched) {
        (Some(exp), Some(count)) => format!(
            "{count} unit(s) in '{exp}' matched no variant interval. Nothing was written. Inspect the intervals with `gxt show {exp}`"
        ),
        _ => ErrorCode::UnmatchedBucket.suggestion().to_string(),
    }
}

fn suggest_validation_failed(context: Option<&Value>) -> String {
    let errors = context_strings(context, "errors");
    if errors.is_empty() {
        return ErrorCode::ValidationFailed.suggestion().to_string();
    }
    format!(
        "{} validation error(s). Fix each listed experiment, then rerun `gxt validate`",
        errors.len()
    )
}

/// Get suggestions for similar experiment names based on a misspelled id.
pub fn suggest_similar_experiments(
    query: &str,
    available: &[&str],
    max_suggestions: usize,
) -> Vec<String> {
    let query_lower = query.to_lowercase();
    let mut scored: Vec<_> = available
        .iter()
        .map(|s| (s, similarity_score(&query_lower, &s.to_lowercase())))
        .filter(|(_, score)| *score > 0.3)
        .collect();

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored
        .into_iter()
        .take(max_suggestions)
        .map(|(s, _)| (*s).to_string())
        .collect()
}

/// Jaccard similarity over character trigrams.
#[allow(clippy::cast_precision_loss)]
fn similarity_score(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let a_trigrams: std::collections::HashSet<_> = trigrams(a).collect();
    let b_trigrams: std::collections::HashSet<_> = trigrams(b).collect();

    if a_trigrams.is_empty() || b_trigrams.is_empty() {
        if a.starts_with(b) || b.starts_with(a) {
            return 0.8;
        }
        if a.contains(b) || b.contains(a) {
            return 0.5;
        }
        return 0.0;
    }

    let intersection = a_trigrams.intersection(&b_trigrams).count();
    let union = a_trigrams.union(&b_trigrams).count();
    intersection as f64 / union as f64
}

fn trigrams(s: &str) -> impl Iterator<Item = &str> {
    (0..s.len().saturating_sub(2)).filter_map(move |i| s.get(i..i + 3))
}
