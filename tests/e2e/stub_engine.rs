//! A registered engine whose buckets fall outside every interval.

use gxt::GxtError;
use gxt::core::{BucketHashRenderer, Precision};
use gxt::engine::{Engine, EngineSettings, SqliteEngine};

use super::fixture::{E2EFixture, LEDGER};

/// SQLite engine that hashes every unit to exactly 1.0.
struct OutOfRangeEngine(SqliteEngine);

impl BucketHashRenderer for OutOfRangeEngine {
    fn engine(&self) -> &'static str {
        "out_of_range"
    }

    fn render(&self, _column: &str, _salt: &str, _precision: Precision) -> String {
        "1.0".to_string()
    }
}

impl Engine for OutOfRangeEngine {
    fn qualify_table(&self, dataset: &str, table: &str) -> String {
        self.0.qualify_table(dataset, table)
    }

    fn qualify_identifier(&self, identifier: &str) -> String {
        self.0.qualify_identifier(identifier)
    }

    fn string_type(&self) -> &'static str {
        self.0.string_type()
    }

    fn timestamp_type(&self) -> &'static str {
        self.0.timestamp_type()
    }

    fn current_timestamp(&self) -> &'static str {
        self.0.current_timestamp()
    }

    fn can_execute(&self) -> bool {
        true
    }

    fn database_path(&self) -> Option<&str> {
        self.0.database_path()
    }

    fn ledger_ddl(&self, table: &str) -> String {
        self.0.ledger_ddl(table)
    }

    fn insert_if_absent(&self, target: &str, select: &str, keys: &[&str], columns: &[&str]) -> String {
        self.0.insert_if_absent(target, select, keys, columns)
    }
}

fn out_of_range(settings: &EngineSettings) -> Box<dyn Engine> {
    Box::new(OutOfRangeEngine(SqliteEngine::from_settings(settings)))
}

#[test]
fn unmatched_buckets_abort_before_any_write() {
    let fixture = E2EFixture::new();
    fixture.seed_users(5);
    fixture.experiment("checkout", &[("control", 0.5), ("treatment", 0.5)], "SELECT user_id FROM users");

    let mut ctx = fixture.context();
    ctx.registry.register("out_of_range", out_of_range);
    ctx.config.engine = Some("out_of_range".into());

    let err = fixture.execute(&ctx, "checkout").unwrap_err();
    match err {
        GxtError::UnmatchedBucket {
            experiment,
            unmatched,
            sample,
        } => {
            assert_eq!(experiment, "checkout");
            assert_eq!(unmatched, 5);
            assert!(!sample.is_empty() && sample.len() <= 5);
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let warehouse = fixture.warehouse();
    assert!(!warehouse.table_exists(LEDGER).unwrap());
    assert!(warehouse.recent_runs(None, 10).unwrap().is_empty());
}

#[test]
fn registered_engine_is_listed_in_unknown_engine_errors() {
    let fixture = E2EFixture::new();
    let mut ctx = fixture.context();
    ctx.registry.register("out_of_range", out_of_range);

    let err = ctx.engine(Some("snowflake")).err().unwrap();
    match err {
        GxtError::UnknownEngine { known, .. } => {
            assert!(known.contains(&"out_of_range".to_string()));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
