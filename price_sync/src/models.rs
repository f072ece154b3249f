//! Row types moved between the pipeline and SQLite.
//!
//! - [`NormalizedRow`]: one daily bar for one symbol, ready to be written.
//! - [`StoredPriceRow`]: the same row read back from the price table.
//! - [`RunRow`]: a row of [`crate::schema::ingestion_runs`].

use chrono::{NaiveDate, NaiveDateTime};
use diesel::{
    prelude::*,
    sql_types::{BigInt, Double, Nullable, Text, Timestamp},
};
use serde::Serialize;

use crate::schema::ingestion_runs;

/// One normalized daily bar with derived change fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedRow {
    pub trade_date: NaiveDate,
    pub open_price: f64,
    pub high_price: f64,
    pub low_price: f64,
    pub close_price: f64,
    pub volume: i64,
    pub symbol: String,
    /// Close minus the previous close in the same window; 0 for the first row.
    pub close_change: f64,
    /// Percent change over the previous close. `None` when that close was zero.
    pub close_pct_change: Option<f64>,
}

/// A price-table row as read back with `sql_query`.
#[derive(Debug, Clone, QueryableByName)]
pub struct StoredPriceRow {
    #[diesel(sql_type = Timestamp)]
    pub trade_date: NaiveDateTime,
    #[diesel(sql_type = Double)]
    pub open_price: f64,
    #[diesel(sql_type = Double)]
    pub high_price: f64,
    #[diesel(sql_type = Double)]
    pub low_price: f64,
    #[diesel(sql_type = Double)]
    pub close_price: f64,
    #[diesel(sql_type = BigInt)]
    pub volume: i64,
    #[diesel(sql_type = Text)]
    pub symbol: String,
    #[diesel(sql_type = Double)]
    pub close_change: f64,
    #[diesel(sql_type = Nullable<Double>)]
    pub close_pct_change: Option<f64>,
}

impl From<StoredPriceRow> for NormalizedRow {
    fn from(r: StoredPriceRow) -> Self {
        Self {
            trade_date: r.trade_date.date(),
            open_price: r.open_price,
            high_price: r.high_price,
            low_price: r.low_price,
            close_price: r.close_price,
            volume: r.volume,
            symbol: r.symbol,
            close_change: r.close_change,
            close_pct_change: r.close_pct_change,
        }
    }
}

/// A row in [`crate::schema::ingestion_runs`]. Dates and timestamps are stored as text.
#[derive(Debug, Clone, Queryable, Selectable, QueryableByName)]
#[diesel(table_name = ingestion_runs, check_for_backend(diesel::sqlite::Sqlite))]
pub struct RunRow {
    /// `YYYY-MM-DD`.
    pub run_date: String,
    pub state: String,
    pub attempts: i32,
    pub rows_written: i64,
    pub last_error: Option<String>,
    pub lease_owner: Option<String>,
    /// RFC3339 UTC with millisecond precision.
    pub lease_expires_at: Option<String>,
    pub updated_at: String,
}
