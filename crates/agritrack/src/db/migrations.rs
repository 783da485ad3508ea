//! Versioned schema migrations for the job store.
//!
//! Applied versions are recorded in `_migrations`. Each pending migration
//! runs in its own transaction together with its bookkeeping row, so a
//! failed step leaves the schema at the previous version.

use rusqlite::{params, Connection};

use super::error::DatabaseError;

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
    /// Column the step adds. The step is recorded but not executed when the
    /// column is already there.
    adds_column: Option<(&'static str, &'static str)>,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "jobs_table",
        sql: include_str!("sql/001_create_jobs.sql"),
        adds_column: None,
    },
    Migration {
        version: 2,
        name: "jobs_error_column",
        sql: include_str!("sql/002_add_error.sql"),
        adds_column: Some(("jobs", "error")),
    },
    Migration {
        version: 3,
        name: "jobs_indexes",
        sql: include_str!("sql/003_job_indexes.sql"),
        adds_column: None,
    },
];

const BOOKKEEPING: &str = "CREATE TABLE IF NOT EXISTS _migrations (
    version INTEGER PRIMARY KEY,
    description TEXT NOT NULL,
    applied_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);";

/// Brings the schema up to the latest version.
pub fn run_all(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(BOOKKEEPING)?;

    let applied: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?;

    for migration in MIGRATIONS.iter().filter(|m| m.version > applied) {
        apply(conn, migration)?;
    }

    Ok(())
}

fn apply(conn: &Connection, migration: &Migration) -> Result<(), DatabaseError> {
    let failed = |e: rusqlite::Error| DatabaseError::Migration {
        version: migration.version,
        reason: e.to_string(),
    };

    let tx = conn.unchecked_transaction().map_err(failed)?;

    let present = match migration.adds_column {
        Some((table, column)) => column_exists(&tx, table, column)?,
        None => false,
    };
    if present {
        log::debug!(
            "Schema v{} ({}) already present, recording only",
            migration.version,
            migration.name
        );
    } else {
        log::info!("Applying schema v{} ({})", migration.version, migration.name);
        tx.execute_batch(migration.sql).map_err(failed)?;
    }

    tx.execute(
        "INSERT INTO _migrations (version, description) VALUES (?1, ?2)",
        params![migration.version, migration.name],
    )
    .map_err(failed)?;
    tx.commit().map_err(failed)
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool, DatabaseError> {
    // PRAGMA arguments cannot be bound; only plain identifiers are accepted.
    if table.is_empty() || !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(DatabaseError::Migration {
            version: 0,
            reason: format!("Invalid table name: {}", table),
        });
    }
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let mut names = stmt.query_map([], |row| row.get::<_, String>(1))?;
    Ok(names.any(|name| matches!(name, Ok(n) if n == column)))
}
