use std::sync::Arc;

use market_data_ingestor::universe::{DirectoryError, StaticDirectory};
use price_sync::loader::LoadError;
use price_sync::pipeline::{CancelFlag, IngestionPipeline, Pipeline, PipelineError};

mod common;

use common::ScriptedProvider;

#[tokio::test]
async fn single_symbol_run_writes_derived_changes() {
    let (db, _conn) = common::setup_db();
    let provider = ScriptedProvider::default().with("AAA", &[10.0, 12.0, 9.0]);
    let pipeline = IngestionPipeline::new(common::definition(&db, &["AAA"], provider, false));

    let summary = pipeline
        .execute(common::date(2025, 4, 28))
        .await
        .expect("run");
    assert_eq!(summary.symbols_attempted, 1);
    assert_eq!(summary.symbols_succeeded, 1);
    assert_eq!(summary.rows_written, 3);
    assert!(summary.failures.is_empty());

    let rows = common::loader(&db, false)
        .rows_for_symbol("AAA")
        .expect("read");
    let changes: Vec<f64> = rows.iter().map(|r| r.close_change).collect();
    let pcts: Vec<Option<f64>> = rows.iter().map(|r| r.close_pct_change).collect();
    assert_eq!(changes, vec![0.0, 2.0, -3.0]);
    assert_eq!(pcts, vec![Some(0.0), Some(20.0), Some(-25.0)]);
    // Window for 2025-04-28 starts on 2025-04-21.
    assert_eq!(rows[0].trade_date, common::date(2025, 4, 21));
}

#[tokio::test]
async fn failing_symbol_is_reported_and_others_are_written() {
    let (db, _conn) = common::setup_db();
    let provider = ScriptedProvider::default()
        .with("AAA", &[10.0, 11.0])
        .failing("BBB");
    let pipeline = IngestionPipeline::new(common::definition(&db, &["AAA", "BBB"], provider, false));

    let summary = pipeline
        .execute(common::date(2025, 4, 28))
        .await
        .expect("partial failure is not fatal");
    assert_eq!(summary.symbols_attempted, 2);
    assert_eq!(summary.symbols_succeeded, 1);
    assert_eq!(summary.rows_written, 2);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].0, "BBB");
    assert!(summary.failures[0].1.contains("unknown symbol"));

    assert_eq!(common::loader(&db, false).count_rows().expect("count"), 2);
}

#[tokio::test]
async fn symbol_without_data_counts_as_success() {
    let (db, _conn) = common::setup_db();
    let provider = ScriptedProvider::default().with("AAA", &[10.0]);
    let pipeline = IngestionPipeline::new(common::definition(&db, &["AAA", "NEW"], provider, false));

    let summary = pipeline
        .execute(common::date(2025, 4, 28))
        .await
        .expect("run");
    assert_eq!(summary.symbols_succeeded, 2);
    assert_eq!(summary.rows_written, 1);
}

#[tokio::test]
async fn empty_universe_is_fatal_and_skips_table_creation() {
    let (db, _conn) = common::setup_db();
    let def = common::definition_with(
        &db,
        Arc::new(StaticDirectory::new(vec![])),
        ScriptedProvider::default(),
        false,
    );
    let pipeline = IngestionPipeline::new(def);

    let err = pipeline
        .execute(common::date(2025, 4, 28))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Directory(DirectoryError::Empty)));
    assert!(common::loader(&db, false).count_rows().is_err(), "table must not exist");
}

#[tokio::test]
async fn unavailable_directory_is_fatal() {
    let (db, _conn) = common::setup_db();
    let def = common::definition_with(
        &db,
        Arc::new(common::UnavailableDirectory),
        ScriptedProvider::default(),
        false,
    );

    let err = IngestionPipeline::new(def)
        .execute(common::date(2025, 4, 28))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Directory(DirectoryError::Unavailable(_))));
}

#[tokio::test]
async fn rerunning_a_date_duplicates_rows_without_unique_key() {
    let (db, _conn) = common::setup_db();
    let provider = ScriptedProvider::default().with("AAA", &[10.0, 12.0, 9.0]);
    let pipeline = IngestionPipeline::new(common::definition(&db, &["AAA"], provider, false));
    let day = common::date(2025, 4, 28);

    pipeline.execute(day).await.expect("first run");
    pipeline.execute(day).await.expect("second run");

    assert_eq!(common::loader(&db, false).count_rows().expect("count"), 6);
}

#[tokio::test]
async fn rerunning_a_date_upserts_with_unique_key() {
    let (db, _conn) = common::setup_db();
    let provider = ScriptedProvider::default().with("AAA", &[10.0, 12.0, 9.0]);
    let pipeline = IngestionPipeline::new(common::definition(&db, &["AAA"], provider, true));
    let day = common::date(2025, 4, 28);

    pipeline.execute(day).await.expect("first run");
    let second = pipeline.execute(day).await.expect("second run");

    assert_eq!(second.rows_written, 3);
    assert_eq!(common::loader(&db, true).count_rows().expect("count"), 3);
}

#[tokio::test]
async fn cancelled_run_writes_nothing() {
    let (db, _conn) = common::setup_db();
    let provider = ScriptedProvider::default().with("AAA", &[10.0]);
    let cancel = CancelFlag::default();
    let pipeline = IngestionPipeline::new(common::definition(&db, &["AAA"], provider, false))
        .with_cancel_flag(cancel.clone());

    cancel.cancel();
    let err = pipeline
        .execute(common::date(2025, 4, 28))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Cancelled));
    assert_eq!(common::loader(&db, false).count_rows().expect("count"), 0);
}

#[tokio::test]
async fn rejected_row_fails_the_run_and_drops_the_whole_batch() {
    let (db, mut conn) = common::setup_db();
    common::create_positive_close_table(&mut conn);
    let provider = ScriptedProvider::default()
        .with("AAA", &[10.0, 12.0])
        .with("BBB", &[5.0, -1.0]);
    let pipeline = IngestionPipeline::new(common::definition(&db, &["AAA", "BBB"], provider, false));

    let err = pipeline
        .execute(common::date(2025, 4, 28))
        .await
        .unwrap_err();
    assert!(
        matches!(err, PipelineError::Load(LoadError::Write { .. })),
        "unexpected error: {err:?}"
    );
    assert_eq!(common::loader(&db, false).count_rows().expect("count"), 0);
}
