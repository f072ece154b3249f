#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration as StdDuration,
};

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use diesel::prelude::*;
use diesel::sql_types::{Integer, Text};
use market_data_ingestor::{
    MarketDataFetcher,
    models::{
        bar::Bar, bar_series::BarSeries, request_params::BarsRequestParams, symbol::Symbol,
        timeframe::TimeFrame,
    },
    providers::{ApiSnafu, DataProvider, ProviderError},
    universe::{DirectoryError, StaticDirectory, SymbolDirectory},
};
use price_sync::{
    db::{connection, migrate},
    loader::Loader,
    pipeline::{Pipeline, PipelineDefinition, PipelineError, RunSummary},
    schedule::{RetryPolicy, RunPolicy},
    table::TableName,
};
use tempfile::TempDir;

#[derive(QueryableByName)]
struct JournalMode {
    #[diesel(sql_type = Text)]
    journal_mode: String,
}
#[derive(QueryableByName)]
struct ForeignKeys {
    #[diesel(sql_type = Integer)]
    foreign_keys: i32,
}
#[derive(QueryableByName)]
struct BusyTimeout {
    #[diesel(sql_type = Integer, column_name = "timeout")]
    busy_timeout: i32,
}

pub struct TestDb {
    _dir: TempDir,    // keep alive for the life of the test
    pub path: String, // <tmpdir>/test.db
}

pub fn setup_db() -> (TestDb, SqliteConnection) {
    let dir = TempDir::new().expect("tempdir");
    let mut p = PathBuf::from(dir.path());
    p.push("test.db");
    let path = p.to_string_lossy().to_string();

    migrate::run_sqlite(&path).expect("migrations");

    let conn = connection::connect_sqlite(&path).expect("connect");
    (TestDb { _dir: dir, path }, conn)
}

pub fn assert_sqlite_pragmas(conn: &mut SqliteConnection) {
    use diesel::sql_query;

    let jm: JournalMode = sql_query("PRAGMA journal_mode;").get_result(conn).unwrap();
    assert_eq!(jm.journal_mode.to_lowercase(), "wal"); // WAL is persistent per DB file

    let fk: ForeignKeys = sql_query("PRAGMA foreign_keys;").get_result(conn).unwrap();
    assert_eq!(fk.foreign_keys, 1);

    let bt: BusyTimeout = sql_query("PRAGMA busy_timeout;").get_result(conn).unwrap();
    assert_eq!(bt.busy_timeout, 5000);
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn symbols(list: &[&str]) -> Vec<Symbol> {
    list.iter().map(|s| Symbol::new(s).unwrap()).collect()
}

pub fn loader(db: &TestDb, unique_key: bool) -> Loader {
    Loader::new(db.path.clone(), TableName::default(), unique_key)
}

/// Returns one daily bar per configured close, starting on the first day of the
/// requested window at 13:30 UTC. Symbols in `failing` return an API error.
#[derive(Default)]
pub struct ScriptedProvider {
    pub closes: HashMap<String, Vec<f64>>,
    pub failing: HashSet<String>,
}

impl ScriptedProvider {
    pub fn with(mut self, symbol: &str, closes: &[f64]) -> Self {
        self.closes.insert(symbol.to_string(), closes.to_vec());
        self
    }

    pub fn failing(mut self, symbol: &str) -> Self {
        self.failing.insert(symbol.to_string());
        self
    }
}

#[async_trait]
impl DataProvider for ScriptedProvider {
    async fn fetch_bars(&self, params: BarsRequestParams) -> Result<Vec<BarSeries>, ProviderError> {
        let mut out = Vec::new();
        for symbol in &params.symbols {
            if self.failing.contains(symbol) {
                return ApiSnafu {
                    message: format!("unknown symbol {symbol}"),
                }
                .fail();
            }
            let Some(closes) = self.closes.get(symbol) else {
                continue;
            };
            let first = params.start + Duration::hours(13) + Duration::minutes(30);
            let bars = closes
                .iter()
                .enumerate()
                .map(|(i, &c)| Bar::ohlcv(first + Duration::days(i as i64), c, c + 1.0, c - 1.0, c, 1_000.0))
                .collect();
            out.push(BarSeries {
                symbol: symbol.clone(),
                timeframe: params.timeframe,
                bars,
            });
        }
        Ok(out)
    }
}

pub struct UnavailableDirectory;

#[async_trait]
impl SymbolDirectory for UnavailableDirectory {
    async fn list_symbols(&self) -> Result<Vec<Symbol>, DirectoryError> {
        Err(DirectoryError::Unavailable("listing returned HTTP 503".into()))
    }
}

pub fn definition_with(
    db: &TestDb,
    directory: Arc<dyn SymbolDirectory>,
    provider: ScriptedProvider,
    unique_key: bool,
) -> PipelineDefinition {
    PipelineDefinition {
        directory,
        fetcher: MarketDataFetcher::new(Arc::new(provider)),
        interval: TimeFrame::day(),
        window_days: 7,
        loader: loader(db, unique_key),
    }
}

pub fn definition(
    db: &TestDb,
    universe: &[&str],
    provider: ScriptedProvider,
    unique_key: bool,
) -> PipelineDefinition {
    definition_with(
        db,
        Arc::new(StaticDirectory::new(symbols(universe))),
        provider,
        unique_key,
    )
}

/// Fails its first `fail_first` executions, then succeeds. Optionally sleeps
/// before returning so tests can overlap calls.
#[derive(Default)]
pub struct FlakyPipeline {
    pub fail_first: u32,
    pub calls: AtomicU32,
    pub seen: std::sync::Mutex<Vec<NaiveDate>>,
    pub pause: StdDuration,
}

impl FlakyPipeline {
    pub fn failing(n: u32) -> Self {
        Self {
            fail_first: n,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<NaiveDate> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Pipeline for FlakyPipeline {
    async fn execute(&self, run_date: NaiveDate) -> Result<RunSummary, PipelineError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.seen.lock().unwrap().push(run_date);
        if !self.pause.is_zero() {
            tokio::time::sleep(self.pause).await;
        }
        if n <= self.fail_first {
            return Err(PipelineError::Directory(DirectoryError::Unavailable(format!(
                "attempt {n} failed"
            ))));
        }
        Ok(RunSummary {
            symbols_attempted: 1,
            symbols_succeeded: 1,
            rows_written: 5,
            failures: vec![],
        })
    }
}

/// Daily cadence from `start`, zero retry delay.
pub fn fast_policy(start: NaiveDate, retries: u32) -> RunPolicy {
    RunPolicy {
        retry: RetryPolicy::new(retries, StdDuration::ZERO),
        ..RunPolicy::new(start)
    }
}

/// Pre-creates the default price table with every expected column plus a
/// `CHECK (close_price > 0)`, so any batch holding a non-positive close fails.
pub fn create_positive_close_table(conn: &mut SqliteConnection) {
    diesel::sql_query(
        "CREATE TABLE \"stock_prices\" (
            trade_date       TIMESTAMP   NOT NULL,
            close_price      DOUBLE      NOT NULL CHECK (close_price > 0),
            high_price       DOUBLE      NOT NULL,
            low_price        DOUBLE      NOT NULL,
            open_price       DOUBLE      NOT NULL,
            volume           BIGINT      NOT NULL,
            symbol           VARCHAR(10) NOT NULL,
            close_change     DOUBLE      NOT NULL,
            close_pct_change DOUBLE      NULL
        )",
    )
    .execute(conn)
    .expect("create checked table");
}
