//! Writes normalized rows into the destination price table.
//!
//! ## Connections
//! Every public method opens its own connection through
//! [`connect_sqlite`](crate::db::connection::connect_sqlite) and drops it on return.
//! The methods are blocking; async callers run them on `spawn_blocking`.
//!
//! ## Transactions
//! [`Loader::write_batch`] runs inside a single **`BEGIN IMMEDIATE`** transaction
//! (`SqliteConnection::immediate_transaction`), so a batch is applied whole or not at all.
//!
//! ## Uniqueness
//! By default the table has no key and re-running a window appends duplicate rows.
//! With `unique_key` the loader adds a `UNIQUE(trade_date, symbol)` index and
//! upserts instead.

use chrono::NaiveTime;
use diesel::{
    Connection, QueryableByName, RunQueryDsl, SqliteConnection, sql_query,
    sql_types::{BigInt, Double, Nullable, Text, Timestamp},
};
use thiserror::Error;

use crate::{
    db::{DbError, connection::connect_sqlite},
    models::{NormalizedRow, StoredPriceRow},
    table::TableName,
};

/// Columns of the price table, in declaration order.
pub const PRICE_COLUMNS: [&str; 9] = [
    "trade_date",
    "close_price",
    "high_price",
    "low_price",
    "open_price",
    "volume",
    "symbol",
    "close_change",
    "close_pct_change",
];

#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Connect(#[from] DbError),
    #[error("schema error on table {table}: {message}")]
    Schema { table: String, message: String },
    #[error("batch write to {table} failed: {source}")]
    Write {
        table: String,
        #[source]
        source: diesel::result::Error,
    },
    #[error("read from {table} failed: {source}")]
    Read {
        table: String,
        #[source]
        source: diesel::result::Error,
    },
}

#[derive(QueryableByName)]
struct ColumnInfo {
    #[diesel(sql_type = Text)]
    name: String,
}

#[derive(QueryableByName)]
struct RowCount {
    #[diesel(sql_type = BigInt)]
    n: i64,
}

#[derive(Debug, Clone)]
pub struct Loader {
    database_url: String,
    table: TableName,
    unique_key: bool,
}

impl Loader {
    pub fn new(database_url: impl Into<String>, table: TableName, unique_key: bool) -> Self {
        Self {
            database_url: database_url.into(),
            table,
            unique_key,
        }
    }

    pub fn table(&self) -> &TableName {
        &self.table
    }

    fn connect(&self) -> Result<SqliteConnection, LoadError> {
        Ok(connect_sqlite(&self.database_url)?)
    }

    fn schema_err(&self, message: impl Into<String>) -> LoadError {
        LoadError::Schema {
            table: self.table.to_string(),
            message: message.into(),
        }
    }

    /// Creates the table if absent and checks that every expected column exists.
    ///
    /// Safe to call on every run; existing rows are untouched.
    pub fn ensure_table(&self) -> Result<(), LoadError> {
        let mut conn = self.connect()?;
        let t = self.table.quoted();

        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {t} (
                trade_date       TIMESTAMP   NOT NULL,
                close_price      DOUBLE      NOT NULL,
                high_price       DOUBLE      NOT NULL,
                low_price        DOUBLE      NOT NULL,
                open_price       DOUBLE      NOT NULL,
                volume           BIGINT      NOT NULL,
                symbol           VARCHAR(10) NOT NULL,
                close_change     DOUBLE      NOT NULL,
                close_pct_change DOUBLE      NULL
            )"
        );
        sql_query(ddl)
            .execute(&mut conn)
            .map_err(|e| self.schema_err(format!("create failed: {e}")))?;

        let columns: Vec<ColumnInfo> = sql_query(format!("PRAGMA table_info({t})"))
            .load(&mut conn)
            .map_err(|e| self.schema_err(format!("table_info failed: {e}")))?;
        let missing: Vec<&str> = PRICE_COLUMNS
            .iter()
            .copied()
            .filter(|want| !columns.iter().any(|c| c.name.eq_ignore_ascii_case(want)))
            .collect();
        if !missing.is_empty() {
            return Err(self.schema_err(format!("missing columns: {}", missing.join(", "))));
        }

        if self.unique_key {
            let index = format!("\"{}_trade_date_symbol_key\"", self.table.as_str());
            sql_query(format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS {index} ON {t} (trade_date, symbol)"
            ))
            .execute(&mut conn)
            .map_err(|e| self.schema_err(format!("unique index failed: {e}")))?;
        }

        tracing::info!(table = %self.table, unique_key = self.unique_key, "table ensured");
        Ok(())
    }

    fn insert_sql(&self) -> String {
        let t = self.table.quoted();
        let base = format!(
            "INSERT INTO {t} ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            PRICE_COLUMNS.join(", ")
        );
        if !self.unique_key {
            return base;
        }
        let updates = PRICE_COLUMNS
            .iter()
            .filter(|c| !matches!(**c, "trade_date" | "symbol"))
            .map(|c| format!("{c} = excluded.{c}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!("{base} ON CONFLICT (trade_date, symbol) DO UPDATE SET {updates}")
    }

    /// Writes `rows` in one immediate transaction and returns the affected row count.
    pub fn write_batch(&self, rows: &[NormalizedRow]) -> Result<usize, LoadError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let mut conn = self.connect()?;
        let sql = self.insert_sql();

        let written = conn
            .immediate_transaction::<_, diesel::result::Error, _>(|conn| {
                let mut n = 0;
                for row in rows {
                    n += sql_query(sql.as_str())
                        .bind::<Timestamp, _>(row.trade_date.and_time(NaiveTime::MIN))
                        .bind::<Double, _>(row.close_price)
                        .bind::<Double, _>(row.high_price)
                        .bind::<Double, _>(row.low_price)
                        .bind::<Double, _>(row.open_price)
                        .bind::<BigInt, _>(row.volume)
                        .bind::<Text, _>(row.symbol.as_str())
                        .bind::<Double, _>(row.close_change)
                        .bind::<Nullable<Double>, _>(row.close_pct_change)
                        .execute(conn)?;
                }
                Ok(n)
            })
            .map_err(|source| LoadError::Write {
                table: self.table.to_string(),
                source,
            })?;

        tracing::info!(table = %self.table, rows = written, "batch written");
        Ok(written)
    }

    pub fn count_rows(&self) -> Result<i64, LoadError> {
        let mut conn = self.connect()?;
        let count: RowCount = sql_query(format!("SELECT COUNT(*) AS n FROM {}", self.table.quoted()))
            .get_result(&mut conn)
            .map_err(|source| self.read_err(source))?;
        Ok(count.n)
    }

    /// Rows stored for `symbol`, oldest first.
    pub fn rows_for_symbol(&self, symbol: &str) -> Result<Vec<NormalizedRow>, LoadError> {
        let mut conn = self.connect()?;
        let cols = PRICE_COLUMNS.join(", ");
        let rows: Vec<StoredPriceRow> = sql_query(format!(
            "SELECT {cols} FROM {} WHERE symbol = ? ORDER BY trade_date, rowid",
            self.table.quoted()
        ))
        .bind::<Text, _>(symbol)
        .load(&mut conn)
        .map_err(|source| self.read_err(source))?;
        Ok(rows.into_iter().map(NormalizedRow::from).collect())
    }

    fn read_err(&self, source: diesel::result::Error) -> LoadError {
        LoadError::Read {
            table: self.table.to_string(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_insert_has_no_conflict_clause() {
        let loader = Loader::new(":memory:", TableName::default(), false);
        let sql = loader.insert_sql();
        assert!(sql.starts_with("INSERT INTO \"stock_prices\" (trade_date, close_price"));
        assert!(!sql.contains("ON CONFLICT"));
    }

    #[test]
    fn keyed_insert_upserts_value_columns() {
        let loader = Loader::new(":memory:", TableName::default(), true);
        let sql = loader.insert_sql();
        assert!(sql.contains("ON CONFLICT (trade_date, symbol) DO UPDATE SET close_price = excluded.close_price"));
        assert!(!sql.contains("symbol = excluded.symbol"));
    }
}
