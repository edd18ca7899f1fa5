//! Assignment SQL executed end to end on SQLite.

use std::collections::BTreeMap;

use gxt::core::{AssignmentQuery, BucketHashRenderer, Precision, UnitColumn, Variant, VariantSet, bucket_value};
use gxt::engine::SqliteEngine;
use gxt::storage::{VariantCount, Warehouse};

use super::fixture::E2EFixture;

fn control_treatment(experiment: &str) -> VariantSet {
    VariantSet::new(
        experiment,
        vec![Variant::new("control", 0.5), Variant::new("treatment", 0.5)],
    )
    .unwrap()
}

#[test]
fn stub_buckets_classify_on_half_open_intervals() {
    let warehouse = Warehouse::open_in_memory().unwrap();
    let unit = UnitColumn::new("exp", "user_id").unwrap();
    let query = AssignmentQuery::synthesize(
        "SELECT 'u1' AS user_id UNION ALL SELECT 'u2' UNION ALL SELECT 'u3' UNION ALL SELECT 'u1';",
        "CASE user_id WHEN 'u1' THEN 0.1 WHEN 'u2' THEN 0.6 WHEN 'u3' THEN 0.49999 END",
        &unit,
        &control_treatment("exp"),
        &SqliteEngine::default(),
    );

    let rows = warehouse.preview(&query.render(), &unit, 10).unwrap();
    let assigned: BTreeMap<String, Option<String>> =
        rows.into_iter().map(|row| (row.unit, row.variant)).collect();

    assert_eq!(assigned.len(), 3, "duplicate units collapse to one row");
    assert_eq!(assigned["u1"].as_deref(), Some("control"));
    assert_eq!(assigned["u2"].as_deref(), Some("treatment"));
    assert_eq!(assigned["u3"].as_deref(), Some("control"));
}

#[test]
fn boundary_bucket_belongs_to_upper_variant() {
    let warehouse = Warehouse::open_in_memory().unwrap();
    let unit = UnitColumn::new("exp", "user_id").unwrap();
    let query = AssignmentQuery::synthesize(
        "SELECT 'edge' AS user_id",
        "0.5",
        &unit,
        &control_treatment("exp"),
        &SqliteEngine::default(),
    );

    let rows = warehouse.preview(&query.render(), &unit, 10).unwrap();
    assert_eq!(rows[0].variant.as_deref(), Some("treatment"));
}

#[test]
fn sql_buckets_match_in_process_buckets() {
    let fixture = E2EFixture::new();
    fixture.seed_users(200);
    let warehouse = fixture.warehouse();

    let engine = SqliteEngine::default();
    let unit = UnitColumn::new("pricing", "user_id").unwrap();
    let variants = VariantSet::new(
        "pricing",
        vec![
            Variant::new("a", 0.2),
            Variant::new("b", 0.3),
            Variant::new("c", 0.5),
        ],
    )
    .unwrap();
    let precision = Precision::default();
    let query = AssignmentQuery::synthesize(
        "SELECT user_id FROM users",
        &engine.render("user_id", "pricing", precision),
        &unit,
        &variants,
        &engine,
    );

    let rows = warehouse.preview(&query.render(), &unit, 500).unwrap();
    assert_eq!(rows.len(), 200);
    for row in rows {
        let expected = bucket_value(&row.unit, "pricing", precision);
        let bucket = row.hash_bucket.unwrap();
        assert!((bucket - expected).abs() < 1e-12, "{}: {bucket} vs {expected}", row.unit);
        assert_eq!(row.variant.as_deref(), variants.classify(expected), "{}", row.unit);
    }
}

#[test]
fn execute_writes_every_unit_once() {
    let fixture = E2EFixture::new();
    fixture.seed_users(50);
    fixture.experiment(
        "checkout",
        &[("control", 0.5), ("treatment", 0.5)],
        "SELECT user_id FROM users UNION ALL SELECT user_id FROM users",
    );
    let ctx = fixture.context();

    let run = fixture.execute(&ctx, "checkout").unwrap();
    assert_eq!(run.inserted, 50);
    assert_eq!(run.existing, 0);

    let ledger = fixture.ledger("checkout");
    assert_eq!(ledger.len(), 50);
    for (unit, variant) in &ledger {
        let bucket = bucket_value(unit, "checkout", Precision::default());
        let expected = if bucket < 0.5 { "control" } else { "treatment" };
        assert_eq!(variant, expected, "{unit}");
    }
}

#[test]
fn rerun_after_exposure_change_keeps_persisted_assignments() {
    let fixture = E2EFixture::new();
    fixture.seed_users(200);
    fixture.experiment(
        "checkout",
        &[("control", 0.5), ("treatment", 0.5)],
        "SELECT user_id FROM users",
    );
    let ctx = fixture.context();
    fixture.execute(&ctx, "checkout").unwrap();
    let before = fixture.ledger("checkout");

    fixture.experiment(
        "checkout",
        &[("control", 0.1), ("treatment", 0.9)],
        "SELECT user_id FROM users",
    );
    let rerun = fixture.execute(&ctx, "checkout").unwrap();

    assert_eq!(rerun.inserted, 0);
    assert_eq!(rerun.existing, 200);
    assert!(rerun.drifted > 0);
    assert_eq!(fixture.ledger("checkout"), before);
}

#[test]
fn new_units_are_appended_on_rerun() {
    let fixture = E2EFixture::new();
    fixture.seed_users(10);
    fixture.experiment("checkout", &[("only", 1.0)], "SELECT user_id FROM users");
    let ctx = fixture.context();
    fixture.execute(&ctx, "checkout").unwrap();

    fixture
        .warehouse()
        .conn()
        .execute_batch("INSERT INTO users (user_id) VALUES ('late-1'), ('late-2')")
        .unwrap();
    let rerun = fixture.execute(&ctx, "checkout").unwrap();

    assert_eq!(rerun.inserted, 2);
    assert_eq!(rerun.existing, 10);
    assert_eq!(
        fixture.summary("checkout"),
        vec![VariantCount {
            variant: "only".into(),
            units: 12
        }]
    );
}

#[test]
fn zero_exposure_variant_receives_no_units() {
    let fixture = E2EFixture::new();
    fixture.seed_users(100);
    fixture.experiment(
        "holdout",
        &[("paused", 0.0), ("live", 1.0)],
        "SELECT user_id FROM users",
    );
    let ctx = fixture.context();
    fixture.execute(&ctx, "holdout").unwrap();

    assert_eq!(
        fixture.summary("holdout"),
        vec![VariantCount {
            variant: "live".into(),
            units: 100
        }]
    );
}

#[test]
fn experiments_share_one_ledger_without_colliding() {
    let fixture = E2EFixture::new();
    fixture.seed_users(20);
    fixture.experiment("first", &[("a", 1.0)], "SELECT user_id FROM users");
    fixture.experiment("second", &[("b", 1.0)], "SELECT user_id FROM users");
    let ctx = fixture.context();

    assert_eq!(fixture.execute(&ctx, "first").unwrap().inserted, 20);
    assert_eq!(fixture.execute(&ctx, "second").unwrap().inserted, 20);
    assert_eq!(fixture.ledger("first").len(), 20);
    assert_eq!(fixture.ledger("second").len(), 20);

    let runs = fixture.warehouse().recent_runs(None, 10).unwrap();
    assert_eq!(runs.len(), 2);
    assert!(runs.iter().all(|run| run.sql_sha256.len() == 64));
}
