//! SQLite connection helpers.

use diesel::{Connection, RunQueryDsl, SqliteConnection, sql_query};

use super::{DbError, sqlite_path};

/// Open a SQLite connection and apply connection-wide PRAGMAs.
pub fn connect_sqlite(database_url: &str) -> Result<SqliteConnection, DbError> {
    let mut conn =
        SqliteConnection::establish(sqlite_path(database_url)).map_err(|source| DbError::Connect {
            url: database_url.to_string(),
            source,
        })?;

    // Readers keep going while a batch write holds the lock.
    for pragma in [
        "PRAGMA journal_mode=WAL;",
        "PRAGMA foreign_keys=ON;",
        "PRAGMA busy_timeout=5000;",
    ] {
        sql_query(pragma).execute(&mut conn).map_err(DbError::Pragma)?;
    }
    Ok(conn)
}
