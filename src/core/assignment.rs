//! Assignment query synthesis.
//!
//! An [`AssignmentQuery`] is a small tree of named stages:
//!
//! ```text
//! audience -> unique_audience -> hashed -> classified
//! ```
//!
//! It is built from validated inputs only and rendered to SQL text at the
//! boundary. Any single stage can be rendered on its own for inspection.

use std::fmt::Write as _;

use tracing::debug;

use crate::core::bucket::BucketHashRenderer;
use crate::core::experiment::UnitColumn;
use crate::core::variants::{Boundary, VariantSet};

pub const AUDIENCE: &str = "audience";
pub const UNIQUE_AUDIENCE: &str = "unique_audience";
pub const HASHED: &str = "hashed";
pub const CLASSIFIED: &str = "classified";

/// Column carrying the bucket value in the `hashed` stage and the output.
pub const HASH_BUCKET_COLUMN: &str = "hash_bucket";
/// Column carrying the variant label in the output.
pub const VARIANT_COLUMN: &str = "variant";

/// Names of every stage, in evaluation order.
pub const STAGES: [&str; 4] = [AUDIENCE, UNIQUE_AUDIENCE, HASHED, CLASSIFIED];

#[derive(Debug, Clone, PartialEq, Eq)]
enum StageBody {
    /// Caller-supplied audience SQL, embedded verbatim.
    Raw(String),
    /// One row per distinct unit.
    Distinct { from: &'static str },
    /// Distinct units plus their bucket value.
    Hashed {
        from: &'static str,
        expression: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Stage {
    name: &'static str,
    body: StageBody,
}

/// One `WHEN` arm of the classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifyArm {
    pub low: Boundary,
    pub high: Boundary,
    /// Variant name already quoted as a string literal.
    pub label: String,
}

/// A fully synthesized assignment query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentQuery {
    unit: UnitColumn,
    stages: Vec<Stage>,
    arms: Vec<ClassifyArm>,
}

impl AssignmentQuery {
    /// Compose the assignment query.
    ///
    /// `hash_expression` is bound to the deduplicated unit stream unchanged;
    /// `dialect` is only used to quote variant labels.
    #[must_use]
    pub fn synthesize(
        audience_sql: &str,
        hash_expression: &str,
        unit: &UnitColumn,
        variants: &VariantSet,
        dialect: &(impl BucketHashRenderer + ?Sized),
    ) -> Self {
        let stages = vec![
            Stage {
                name: AUDIENCE,
                body: StageBody::Raw(clean_audience(audience_sql)),
            },
            Stage {
                name: UNIQUE_AUDIENCE,
                body: StageBody::Distinct { from: AUDIENCE },
            },
            Stage {
                name: HASHED,
                body: StageBody::Hashed {
                    from: UNIQUE_AUDIENCE,
                    expression: hash_expression.to_string(),
                },
            },
        ];
        let arms = variants
            .intervals()
            .iter()
            .map(|interval| ClassifyArm {
                low: interval.low,
                high: interval.high,
                label: dialect.quote_literal(&interval.variant),
            })
            .collect();

        let query = Self {
            unit: unit.clone(),
            stages,
            arms,
        };
        debug!(
            engine = dialect.engine(),
            unit = %query.unit,
            arms = query.arms.len(),
            "synthesized assignment query"
        );
        query
    }

    #[must_use]
    pub const fn unit(&self) -> &UnitColumn {
        &self.unit
    }

    #[must_use]
    pub fn arms(&self) -> &[ClassifyArm] {
        &self.arms
    }

    /// Render the complete query selecting `(unit, hash_bucket, variant)`.
    #[must_use]
    pub fn render(&self) -> String {
        let mut sql = self.render_with(self.stages.len());
        sql.push_str(&self.render_classify());
        sql
    }

    /// Render a query that selects everything from stage `name`.
    ///
    /// Returns `None` for an unknown stage name.
    #[must_use]
    pub fn stage_sql(&self, name: &str) -> Option<String> {
        if name == CLASSIFIED {
            return Some(self.render());
        }
        let position = self.stages.iter().position(|stage| stage.name == name)?;
        let mut sql = self.render_with(position + 1);
        let _ = write!(sql, "SELECT * FROM {name}");
        Some(sql)
    }

    fn render_with(&self, count: usize) -> String {
        let mut sql = String::from("WITH ");
        for (idx, stage) in self.stages.iter().take(count).enumerate() {
            if idx > 0 {
                sql.push_str(",\n");
            }
            let _ = write!(sql, "{} AS (\n{}\n)", stage.name, self.render_body(&stage.body));
        }
        sql.push('\n');
        sql
    }

    fn render_body(&self, body: &StageBody) -> String {
        let unit = &self.unit;
        match body {
            StageBody::Raw(sql) => sql.clone(),
            StageBody::Distinct { from } => {
                format!("  SELECT DISTINCT {unit} AS {unit} FROM {from}")
            }
            StageBody::Hashed { from, expression } => format!(
                "  SELECT {unit} AS {unit},\n    {expression} AS {HASH_BUCKET_COLUMN}\n  FROM {from}"
            ),
        }
    }

    fn render_classify(&self) -> String {
        let unit = &self.unit;
        let mut sql = format!("SELECT\n  {unit} AS {unit},\n  {HASH_BUCKET_COLUMN},\n  CASE\n");
        for arm in &self.arms {
            let _ = writeln!(
                sql,
                "    WHEN {HASH_BUCKET_COLUMN} >= {} AND {HASH_BUCKET_COLUMN} < {} THEN {}",
                arm.low, arm.high, arm.label
            );
        }
        let _ = write!(sql, "  END AS {VARIANT_COLUMN}\nFROM {HASHED}");
        sql
    }
}

/// Strip trailing whitespace and statement terminators so the audience can be
/// embedded as a sub-query.
#[must_use]
pub fn clean_audience(sql: &str) -> String {
    sql.trim_end_matches(|c: char| c.is_whitespace() || c == ';')
        .to_string()
}
