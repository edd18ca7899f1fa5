//! Concurrent runs against one warehouse file.

use std::sync::{Arc, Barrier};
use std::thread;

use gxt::engine::{Engine, SqliteEngine};

use super::fixture::{E2EFixture, LEDGER};

#[test]
fn concurrent_runs_insert_each_unit_once() {
    let fixture = E2EFixture::new();
    fixture.seed_users(300);
    fixture.experiment(
        "checkout",
        &[("control", 0.5), ("treatment", 0.5)],
        "SELECT user_id FROM users",
    );
    fixture
        .warehouse()
        .ensure_ledger(&SqliteEngine::default().ledger_ddl(LEDGER))
        .unwrap();

    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let root = fixture.root.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let ctx = gxt::app::AppContext::new(
                    &root,
                    E2EFixture::config(),
                    gxt::cli::output::OutputFormat::Json,
                )
                .unwrap();
                let experiment = ctx.project.load_experiment("checkout").unwrap();
                let engine = ctx.engine(None).unwrap();
                barrier.wait();
                gxt::cli::commands::run::execute(
                    &ctx,
                    &experiment,
                    engine.as_ref(),
                    &super::fixture::run_args("checkout"),
                )
                .unwrap()
            })
        })
        .collect();

    let runs: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let inserted: u64 = runs.iter().map(|run| run.inserted).sum();
    assert_eq!(inserted, 300);
    assert!(runs.iter().all(|run| run.inserted + run.existing == 300));
    assert_eq!(fixture.ledger("checkout").len(), 300);
    assert_eq!(fixture.warehouse().recent_runs(Some("checkout"), 10).unwrap().len(), 2);
}
