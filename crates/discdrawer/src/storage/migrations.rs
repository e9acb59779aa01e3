//! Schema versioning for the discdrawer database.
//!
//! The version lives in the `metadata` table. Fresh databases get the base
//! schema from [`SCHEMA_STATEMENTS`] and are then walked through every
//! migration up to [`CURRENT_VERSION`].

use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};

use crate::error::{Error, Result};

use super::schema::SCHEMA_STATEMENTS;

/// The current schema version.
pub const CURRENT_VERSION: i32 = 2;

const VERSION_KEY: &str = "schema_version";

/// Create missing tables and apply pending migrations.
///
/// # Errors
///
/// Returns an error if schema creation or a migration fails.
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    // foreign keys are off by default in SQLite, per connection
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;

    for statement in SCHEMA_STATEMENTS {
        conn.execute(statement, [])?;
    }

    let version = schema_version(conn)?;
    if version > CURRENT_VERSION {
        return Err(Error::DatabaseMigration {
            message: format!(
                "database schema version {version} is newer than supported version {CURRENT_VERSION}"
            ),
        });
    }
    if version < CURRENT_VERSION {
        info!(from = version, to = CURRENT_VERSION, "Migrating database schema");
        for next in (version + 1)..=CURRENT_VERSION {
            run_migration(conn, next)?;
        }
        set_schema_version(conn, CURRENT_VERSION)?;
    }
    Ok(())
}

/// Read the stored schema version, 0 for a fresh database.
fn schema_version(conn: &Connection) -> Result<i32> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM metadata WHERE key = ?1",
            [VERSION_KEY],
            |row| row.get(0),
        )
        .optional()?;

    match value {
        None => Ok(0),
        Some(value) => value.parse().map_err(|_| Error::DatabaseMigration {
            message: format!("invalid schema version: {value}"),
        }),
    }
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
        (VERSION_KEY, version.to_string()),
    )?;
    Ok(())
}

fn run_migration(conn: &Connection, version: i32) -> Result<()> {
    debug!(version, "Applying migration");
    match version {
        // base schema, created by SCHEMA_STATEMENTS
        1 => Ok(()),
        2 => migrate_v2(conn),
        _ => Err(Error::DatabaseMigration {
            message: format!("unknown migration version: {version}"),
        }),
    }
}

/// Version 2 indexes throw times for date-ordered history listings.
fn migrate_v2(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_throws_thrown_at ON measured_throws(thrown_at DESC)",
        [],
    )?;
    Ok(())
}
