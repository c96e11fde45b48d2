//! SQL schema migrations and connection setup for the SQLite backend.
//!
//! Uses `rusqlite_migration` to manage schema migrations via SQLite's
//! `user_version` pragma. Migrations are embedded at compile time via
//! `include_str!`.

use rusqlite::Connection;
use rusqlite_migration::{Migrations, M};

use crate::error::StorageError;

/// All schema migrations, applied in order via `user_version` tracking.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![M::up(include_str!("migrations/001_initial_schema.sql"))])
}

/// Opens (or creates) a SQLite database at `path` with WAL mode, foreign keys,
/// and all pending migrations applied.
pub fn open_database(path: &str) -> Result<Connection, StorageError> {
    let mut conn = Connection::open(path)?;
    configure_and_migrate(&mut conn)?;
    Ok(conn)
}

/// Opens an in-memory SQLite database with foreign keys and all pending
/// migrations applied.
pub fn open_in_memory() -> Result<Connection, StorageError> {
    let mut conn = Connection::open_in_memory()?;
    configure_and_migrate(&mut conn)?;
    Ok(conn)
}

/// Configures pragmas and applies pending migrations.
fn configure_and_migrate(conn: &mut Connection) -> Result<(), StorageError> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    // Off by default in SQLite.
    conn.pragma_update(None, "foreign_keys", "ON")?;

    migrations()
        .to_latest(conn)
        .map_err(|e| StorageError::Migration(e.to_string()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_valid() {
        assert!(migrations().validate().is_ok());
    }

    #[test]
    fn in_memory_database_has_all_tables() {
        let conn = open_in_memory().unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN \
                 ('projects', 'materials', 'samples', 'mass_spectrometers', 'irradiations', \
                  'levels', 'irradiation_positions', 'analyses')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 8);
    }
}
