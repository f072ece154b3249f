use std::time::Duration;

use chrono::NaiveTime;
use market_data_ingestor::models::{request_params::ProviderParams, timeframe::TimeFrame};
use market_data_ingestor::providers::alpaca_rest::{
    AlpacaBarsParams,
    params::{Adjustment, Feed},
};
use price_sync::config::{
    DATABASE_URL_ENV, ProviderKind, Universe, default_start_date, load_config_path,
    load_config_str,
};
use price_sync::schedule::Cadence;
use serial_test::serial;

mod common;

const MINIMAL: &str = r#"
[storage]
database_url = "sqlite://prices.db"
"#;

#[test]
#[serial]
fn minimal_config_takes_defaults() {
    let s = load_config_str(MINIMAL).expect("valid");
    assert_eq!(s.database_url, "sqlite://prices.db");
    assert_eq!(s.table.as_str(), "stock_prices");
    assert!(!s.unique_key);
    assert_eq!(s.provider, ProviderKind::Yahoo);
    assert_eq!(s.interval, TimeFrame::day());
    assert_eq!(s.window_days, 7);
    assert_eq!(s.requests_per_minute.get(), 200);
    assert_eq!(s.run_policy.retry.retries, 2);
    assert_eq!(s.run_policy.retry.delay, Duration::from_secs(300));
    assert_eq!(s.run_policy.cadence, Cadence::Daily);
    assert!(s.run_policy.catchup);
    assert_eq!(s.run_policy.start_date, default_start_date());
    assert_eq!(s.run_policy.lease_ttl, chrono::Duration::hours(1));
    assert_eq!(s.fire_at, NaiveTime::MIN);
    assert!(matches!(s.universe, Universe::Csv { .. }));
    assert_eq!(s.provider_params, ProviderParams::None);
}

#[test]
#[serial]
fn full_config_is_honoured() {
    let s = load_config_str(
        r#"
        [storage]
        table = "daily_bars"
        database_url = "sqlite:bars.db"
        unique_key = true

        [ingest]
        provider = "alpaca"
        interval = "1D"
        window_days = 3
        requests_per_minute = 60

        [ingest.alpaca]
        feed = "iex"
        adjustment = "split"

        [schedule]
        retries = 0
        retry_delay_secs = 5
        cadence = "weekdays"
        catchup = false
        start_date = "2025-05-01"
        fire_at = "21:30:00"
        lease_ttl_secs = 600

        [universe]
        source = "static"
        symbols = ["AAPL", "BRK.B"]
        "#,
    )
    .expect("valid");

    assert_eq!(s.table.as_str(), "daily_bars");
    assert!(s.unique_key);
    assert_eq!(s.provider, ProviderKind::Alpaca);
    assert_eq!(s.window_days, 3);
    assert_eq!(s.requests_per_minute.get(), 60);
    assert_eq!(
        s.provider_params,
        ProviderParams::Alpaca(AlpacaBarsParams {
            adjustment: Some(Adjustment::Split),
            feed: Some(Feed::Iex),
        })
    );
    assert_eq!(s.run_policy.retry.max_attempts(), 1);
    assert_eq!(s.run_policy.cadence, Cadence::Weekdays);
    assert!(!s.run_policy.catchup);
    assert_eq!(s.run_policy.start_date, common::date(2025, 5, 1));
    assert_eq!(s.fire_at, NaiveTime::from_hms_opt(21, 30, 0).unwrap());
    assert_eq!(s.run_policy.lease_ttl, chrono::Duration::minutes(10));
    match s.universe {
        Universe::Static(symbols) => {
            let names: Vec<String> = symbols.iter().map(|s| s.to_string()).collect();
            assert_eq!(names, vec!["AAPL", "BRK.B"]);
        }
        other => panic!("expected static universe, got {other:?}"),
    }
}

#[test]
#[serial]
fn unknown_keys_are_rejected() {
    let err = load_config_str(
        r#"
        [storage]
        database_url = "sqlite://prices.db"
        tabel = "oops"
        "#,
    )
    .unwrap_err();
    assert!(format!("{err:#}").contains("tabel"), "{err:#}");
}

#[test]
#[serial]
fn invalid_values_are_rejected() {
    let cases = [
        r#"storage = { database_url = "x", table = "bad-name" }"#,
        r#"storage = { database_url = "x", table = "x; DROP TABLE y" }"#,
        "storage = { database_url = \"x\" }\ningest = { interval = \"1H\" }",
        "storage = { database_url = \"x\" }\ningest = { window_days = 0 }",
        "storage = { database_url = \"x\" }\ningest = { requests_per_minute = 0 }",
        "storage = { database_url = \"x\" }\nschedule = { lease_ttl_secs = 0 }",
        "storage = { database_url = \"x\" }\nuniverse = { source = \"static\", symbols = [] }",
        "storage = { database_url = \"x\" }\nuniverse = { source = \"static\", symbols = [\"WAYTOOLONGSYMBOL\"] }",
        "storage = { database_url = \"x\" }\nuniverse = { source = \"ftp\" }",
        "storage = { database_url = \"x\" }\ningest = { alpaca = { feed = \"iex\" } }",
        "storage = { database_url = \"x\" }\ningest = { provider = \"alpaca\", alpaca = { feed = \"nyse\" } }",
        "storage = { database_url = \"x\" }\ningest = { provider = \"alpaca\", alpaca = { limit = 5 } }",
    ];
    for case in cases {
        assert!(load_config_str(case).is_err(), "accepted: {case}");
    }
}

#[test]
#[serial]
fn database_url_falls_back_to_env() {
    unsafe { std::env::set_var(DATABASE_URL_ENV, "sqlite://from-env.db") };
    let s = load_config_str("").expect("env fallback");
    assert_eq!(s.database_url, "sqlite://from-env.db");

    unsafe { std::env::remove_var(DATABASE_URL_ENV) };
    let err = load_config_str("").unwrap_err();
    assert!(format!("{err:#}").contains("database_url"), "{err:#}");
}

#[test]
#[serial]
fn config_file_is_read_from_disk() {
    let dir = tempfile::TempDir::new().expect("tempdir");
    let path = dir.path().join("price_sync.toml");
    std::fs::write(&path, MINIMAL).expect("write");
    assert!(load_config_path(&path).is_ok());

    let missing = dir.path().join("nope.toml");
    let err = load_config_path(&missing).unwrap_err();
    assert!(format!("{err:#}").contains("nope.toml"));
}
