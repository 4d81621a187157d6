//! Database schema migrations

use crate::{Error, Result};
use rusqlite::Connection;

const SCHEMA_VERSION: i32 = 2;

/// Run all migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;

    tracing::debug!(
        "Running migrations: current_version={}, target_version={}",
        current_version,
        SCHEMA_VERSION
    );

    if current_version > SCHEMA_VERSION {
        return Err(Error::Migration(format!(
            "database schema v{} is newer than supported v{}",
            current_version, SCHEMA_VERSION
        )));
    }

    if current_version < 1 {
        migrate_v1(conn)?;
    }

    if current_version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Current schema version, 0 for a fresh database
pub fn get_schema_version(conn: &Connection) -> Result<i32> {
    let result = conn.query_row(
        "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
        [],
        |row| row.get(0),
    );

    match result {
        Ok(v) => Ok(v),
        Err(_) => Ok(0),
    }
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)",
        [],
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    tracing::debug!("Schema version {}", version);
    Ok(())
}

/// Cells, sync cursor, checkpoints
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE cells (
            tx_hash TEXT NOT NULL,
            output_index INTEGER NOT NULL,
            lock_hash TEXT NOT NULL,
            capacity TEXT NOT NULL,
            status TEXT NOT NULL,
            block_number INTEGER,
            spent_block_number INTEGER,
            PRIMARY KEY (tx_hash, output_index)
        );

        CREATE INDEX idx_cells_lock_status ON cells(lock_hash, status);
        CREATE INDEX idx_cells_block ON cells(block_number);
        CREATE INDEX idx_cells_spent_block ON cells(spent_block_number);

        CREATE TABLE sync_state (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            cursor INTEGER,
            updated_at TEXT NOT NULL
        );

        INSERT INTO sync_state (id, cursor, updated_at) VALUES (1, NULL, datetime('now'));

        CREATE TABLE checkpoints (
            height INTEGER PRIMARY KEY,
            block_hash TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );
        "#,
    )?;

    set_schema_version(conn, 1)
}

/// Per-lock-hash transaction involvement for tx counts
fn migrate_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE cell_transactions (
            tx_hash TEXT NOT NULL,
            lock_hash TEXT NOT NULL,
            block_number INTEGER,
            PRIMARY KEY (tx_hash, lock_hash)
        );

        CREATE INDEX idx_cell_transactions_lock ON cell_transactions(lock_hash);
        CREATE INDEX idx_cell_transactions_block ON cell_transactions(block_number);
        "#,
    )?;

    set_schema_version(conn, 2)
}
