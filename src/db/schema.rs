use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::Connection;

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial",
        sql: "CREATE TABLE IF NOT EXISTS ideas (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                root_idea TEXT NOT NULL,
                document TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );",
    },
    Migration {
        version: 2,
        name: "ideas_updated_index",
        sql: "CREATE INDEX IF NOT EXISTS idx_ideas_updated ON ideas(updated_at);",
    },
];

/// Bring the schema up to the latest version.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )",
    )
    .context("Failed to create schema_migrations table")?;

    let current = schema_version(conn)?;
    MIGRATIONS
        .iter()
        .filter(|migration| migration.version > current)
        .try_for_each(|migration| apply(conn, migration))
}

/// Highest applied version, 0 for a fresh database.
pub fn schema_version(conn: &Connection) -> Result<u32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )
    .context("Failed to read schema version")
}

// The migration and its bookkeeping row commit together.
fn apply(conn: &Connection, migration: &Migration) -> Result<()> {
    tracing::info!(version = migration.version, name = migration.name, "Applying migration");

    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(migration.sql)
        .with_context(|| format!("Migration {} ({}) failed", migration.version, migration.name))?;
    tx.execute(
        "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
        (migration.version, migration.name, Utc::now().to_rfc3339()),
    )?;
    tx.commit()?;
    Ok(())
}
