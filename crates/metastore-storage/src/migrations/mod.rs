//! Schema migrations using PRAGMA user_version.
//!
//! Migrations are applied strictly in version order, each inside its own
//! BEGIN IMMEDIATE transaction. `user_version` and the `schema_migrations`
//! ledger row are written in that same transaction, so a failed or cancelled
//! migration leaves the database exactly at the previous version.

pub mod v001_initial;
pub mod v002_split_node_id;

use std::time::Instant;

use metastore_core::config::MissingNodeIdPolicy;
use metastore_core::constants::MIGRATIONS_TABLE;
use metastore_core::errors::StorageError;
use metastore_core::traits::{Cancellable, CancellationToken};
use rusqlite::{params, Connection};

use crate::connection::writer::with_immediate_transaction;
use crate::schema;
use crate::sqlite_err;

/// One numbered schema change.
pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    /// Forward step. Returns the number of rows it rewrote.
    pub up: fn(&Connection, &MigrationOptions) -> Result<usize, StorageError>,
    /// Reverse step, restoring the schema of `version - 1`.
    pub down: fn(&Connection) -> Result<(), StorageError>,
}

impl std::fmt::Debug for Migration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migration")
            .field("version", &self.version)
            .field("name", &self.name)
            .finish()
    }
}

/// All migrations, in application order.
pub static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial",
        up: v001_initial::up,
        down: v001_initial::down,
    },
    Migration {
        version: 2,
        name: "split_node_id",
        up: v002_split_node_id::up,
        down: v002_split_node_id::down,
    },
];

/// Knobs passed to every migration step.
#[derive(Debug, Clone, Default)]
pub struct MigrationOptions {
    pub missing_node_id: MissingNodeIdPolicy,
    pub cancellation: CancellationToken,
}

impl MigrationOptions {
    pub fn with_policy(missing_node_id: MissingNodeIdPolicy) -> Self {
        Self {
            missing_node_id,
            cancellation: CancellationToken::new(),
        }
    }

    /// Returns `Err(Cancelled)` once cancellation has been requested.
    pub fn check_cancelled(&self) -> Result<(), StorageError> {
        if self.cancellation.is_cancelled() {
            return Err(StorageError::Cancelled);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

/// One migration step executed by the runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedStep {
    pub version: u32,
    pub name: &'static str,
    pub direction: Direction,
    pub rows_affected: usize,
    pub duration_ms: u64,
}

/// Outcome of a runner invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub from_version: u32,
    pub to_version: u32,
    pub steps: Vec<AppliedStep>,
}

impl MigrationReport {
    pub fn is_noop(&self) -> bool {
        self.steps.is_empty()
    }
}

/// A row of the `schema_migrations` ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRecord {
    pub version: u32,
    pub name: String,
    pub applied_at: i64,
    pub rows_affected: i64,
}

/// Highest version this binary knows how to apply.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}

/// Run all pending migrations.
pub fn run_migrations(
    conn: &Connection,
    options: &MigrationOptions,
) -> Result<MigrationReport, StorageError> {
    migrate_to(conn, latest_version(), options)
}

/// Bring the schema to exactly `target`, applying forward steps or
/// reverting in descending order as needed.
pub fn migrate_to(
    conn: &Connection,
    target: u32,
    options: &MigrationOptions,
) -> Result<MigrationReport, StorageError> {
    let latest = latest_version();
    if target > latest {
        return Err(StorageError::UnknownMigration { version: target });
    }
    let from_version = current_version(conn)?;
    if from_version > latest {
        return Err(StorageError::UnknownMigration {
            version: from_version,
        });
    }

    ensure_ledger(conn)?;

    let mut report = MigrationReport {
        from_version,
        to_version: from_version,
        steps: Vec::new(),
    };

    if target >= from_version {
        for migration in MIGRATIONS
            .iter()
            .filter(|m| m.version > from_version && m.version <= target)
        {
            options.check_cancelled()?;
            let step = apply_up(conn, migration, options)?;
            report.to_version = migration.version;
            report.steps.push(step);
        }
    } else {
        for migration in MIGRATIONS
            .iter()
            .rev()
            .filter(|m| m.version > target && m.version <= from_version)
        {
            options.check_cancelled()?;
            let step = apply_down(conn, migration)?;
            report.to_version = migration.version - 1;
            report.steps.push(step);
        }
    }

    if report.is_noop() {
        tracing::debug!(version = from_version, "schema already at target version");
    }
    Ok(report)
}

fn apply_up(
    conn: &Connection,
    migration: &Migration,
    options: &MigrationOptions,
) -> Result<AppliedStep, StorageError> {
    let started = Instant::now();
    let rows_affected = with_immediate_transaction(conn, |tx| {
        let rows = (migration.up)(tx, options).map_err(|e| e.in_migration(migration.version))?;
        tx.execute(
            &format!(
                "INSERT OR REPLACE INTO {MIGRATIONS_TABLE} (version, name, applied_at, rows_affected)
                 VALUES (?1, ?2, unixepoch(), ?3)"
            ),
            params![migration.version, migration.name, rows as i64],
        )
        .map_err(|e| ledger_err(migration.version, e))?;
        tx.pragma_update(None, "user_version", migration.version)
            .map_err(|e| ledger_err(migration.version, e))?;
        Ok(rows)
    })
    .inspect_err(|e| {
        tracing::error!(
            version = migration.version,
            name = migration.name,
            error = %e,
            "migration failed, rolled back"
        );
    })?;

    let duration_ms = started.elapsed().as_millis() as u64;
    tracing::info!(
        version = migration.version,
        name = migration.name,
        rows_affected,
        duration_ms,
        "applied migration"
    );
    Ok(AppliedStep {
        version: migration.version,
        name: migration.name,
        direction: Direction::Up,
        rows_affected,
        duration_ms,
    })
}

fn apply_down(conn: &Connection, migration: &Migration) -> Result<AppliedStep, StorageError> {
    let started = Instant::now();
    let previous = migration.version - 1;
    with_immediate_transaction(conn, |tx| {
        (migration.down)(tx).map_err(|e| e.in_migration(migration.version))?;
        tx.execute(
            &format!("DELETE FROM {MIGRATIONS_TABLE} WHERE version = ?1"),
            params![migration.version],
        )
        .map_err(|e| ledger_err(migration.version, e))?;
        tx.pragma_update(None, "user_version", previous)
            .map_err(|e| ledger_err(migration.version, e))?;
        Ok(())
    })?;

    let duration_ms = started.elapsed().as_millis() as u64;
    tracing::info!(
        version = migration.version,
        name = migration.name,
        duration_ms,
        "reverted migration"
    );
    Ok(AppliedStep {
        version: migration.version,
        name: migration.name,
        direction: Direction::Down,
        rows_affected: 0,
        duration_ms,
    })
}

fn ledger_err(version: u32, e: rusqlite::Error) -> StorageError {
    StorageError::MigrationFailed {
        version,
        message: format!("recording migration: {e}"),
    }
}

fn ensure_ledger(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {MIGRATIONS_TABLE} (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at INTEGER NOT NULL,
            rows_affected INTEGER NOT NULL DEFAULT 0
        ) STRICT;"
    ))
    .map_err(sqlite_err)
}

/// Get the current schema version.
pub fn current_version(conn: &Connection) -> Result<u32, StorageError> {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
        .map_err(sqlite_err)
}

/// Ledger rows in version order. Empty on a database never migrated.
pub fn applied_migrations(conn: &Connection) -> Result<Vec<MigrationRecord>, StorageError> {
    if !schema::table_exists(conn, MIGRATIONS_TABLE)? {
        return Ok(Vec::new());
    }
    let mut stmt = conn
        .prepare(&format!(
            "SELECT version, name, applied_at, rows_affected
             FROM {MIGRATIONS_TABLE} ORDER BY version"
        ))
        .map_err(sqlite_err)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(MigrationRecord {
                version: row.get(0)?,
                name: row.get(1)?,
                applied_at: row.get(2)?,
                rows_affected: row.get(3)?,
            })
        })
        .map_err(sqlite_err)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(sqlite_err)
}

/// Migrations newer than the current schema version.
pub fn pending_migrations(conn: &Connection) -> Result<Vec<&'static Migration>, StorageError> {
    let current = current_version(conn)?;
    Ok(MIGRATIONS.iter().filter(|m| m.version > current).collect())
}
