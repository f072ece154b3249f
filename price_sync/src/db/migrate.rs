//! Embedded migrations for the run ledger.

use diesel::connection::SimpleConnection;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};

use super::{DbError, connection::connect_sqlite};

/// Embedded Diesel migrations bundled with this crate.
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Runs pending migrations on the SQLite database at `url`.
pub fn run_sqlite(url: &str) -> Result<(), DbError> {
    let mut conn = connect_sqlite(url)?;
    conn.batch_execute("PRAGMA journal_mode=WAL;")
        .map_err(DbError::Pragma)?;
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| DbError::Migration(e.to_string()))?;
    if !applied.is_empty() {
        tracing::info!(count = applied.len(), "applied ledger migrations");
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn migrations_apply_on_temp_file() {
        let temp = tempfile::NamedTempFile::new().unwrap();
        let path = temp.path().to_string_lossy().to_string();

        run_sqlite(&path).expect("migration run");
        // Second run is a no-op.
        run_sqlite(&path).expect("migration rerun");

        let mut conn = connect_sqlite(&path).unwrap();
        conn.batch_execute(
            "INSERT INTO ingestion_runs (run_date, state, updated_at)
             VALUES ('2025-04-26', 'pending', '2025-04-26T00:00:00.000Z')",
        )
        .unwrap();
    }
}
