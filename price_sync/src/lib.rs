//! Daily OHLCV ingestion into SQLite.
//!
//! A run lists the symbol universe, fetches a trailing window of daily bars
//! per symbol, derives close-to-close changes and appends everything to one
//! price table in a single transaction. The [`schedule`] module decides which
//! run dates execute and retries failures, tracking each date in the
//! `ingestion_runs` ledger.

pub mod app;
pub mod config;
pub mod db;
pub mod ledger;
pub mod loader;
pub mod models;
pub mod pipeline;
pub mod run;
pub mod schedule;
pub mod schema;
pub mod table;
pub mod transform;
