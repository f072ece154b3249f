//! Database utilities for connections and schema migrations.
//!
//! - [`connection::connect_sqlite`] opens a connection with WAL, foreign_keys=ON and a
//!   5000ms busy_timeout applied.
//! - [`migrate::run_sqlite`] applies the embedded migrations that own the
//!   `ingestion_runs` ledger. The price table is not migrated; the loader creates it.
//!
//! Example:
//! ```no_run
//! use price_sync::db::{connection, migrate};
//!
//! let db_path = std::env::temp_dir().join("price_sync_example.db");
//! migrate::run_sqlite(db_path.to_str().unwrap()).expect("migrations");
//! let _conn = connection::connect_sqlite(db_path.to_str().unwrap()).expect("connect");
//! ```

pub mod connection;
pub mod migrate;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("failed to open database '{url}': {source}")]
    Connect {
        url: String,
        #[source]
        source: diesel::ConnectionError,
    },
    #[error("failed to configure connection: {0}")]
    Pragma(#[source] diesel::result::Error),
    #[error("migration failed: {0}")]
    Migration(String),
}

/// Strips an optional `sqlite://` or `sqlite:` scheme so the rest can be handed to SQLite.
pub fn sqlite_path(database_url: &str) -> &str {
    database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(database_url)
}
