//! Schema migrations.
//!
//! Applied versions are recorded in `_migrations`. Each migration runs in
//! its own `IMMEDIATE` transaction together with its bookkeeping row, so a
//! second process opening the same file either waits or sees it applied.

use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior};

use super::error::DatabaseError;

struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

/// All migrations in order. Each is applied at most once.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create_submissions_table",
        sql: include_str!("sql/001_create_submissions.sql"),
    },
    Migration {
        version: 2,
        description: "create_jobs_table",
        sql: include_str!("sql/002_create_jobs.sql"),
    },
    Migration {
        version: 3,
        description: "create_parsed_table",
        sql: include_str!("sql/003_create_parsed.sql"),
    },
    Migration {
        version: 4,
        description: "create_flags_table",
        sql: include_str!("sql/004_create_flags.sql"),
    },
];

pub fn run_all(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );",
    )?;

    for migration in MIGRATIONS {
        apply(conn, migration)?;
    }
    Ok(())
}

fn apply(conn: &Connection, migration: &Migration) -> Result<(), DatabaseError> {
    let failed = |e: rusqlite::Error| DatabaseError::Migration {
        version: migration.version,
        reason: e.to_string(),
    };

    // `new_unchecked` takes `&Connection`; the caller owns the connection
    // exclusively while migrating.
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    if is_applied(&tx, migration.version)? {
        return Ok(());
    }

    log::info!(
        "Applying migration v{} ({})",
        migration.version,
        migration.description
    );
    tx.execute_batch(migration.sql).map_err(failed)?;
    tx.execute(
        "INSERT INTO _migrations (version, description) VALUES (?1, ?2)",
        rusqlite::params![migration.version, migration.description],
    )?;
    tx.commit().map_err(failed)?;
    Ok(())
}

fn is_applied(conn: &Connection, version: u32) -> Result<bool, DatabaseError> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM _migrations WHERE version = ?1",
            [version],
            |_| Ok(()),
        )
        .optional()?
        .is_some())
}
