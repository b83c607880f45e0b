//! File-based SQL migration runner.
//!
//! Migrations are `<ordinal>_<label>.sql` files read from a directory at
//! startup. The highest ordinal applied so far is kept in a single tracker
//! row (`migration_tracker.migration_int`, `id = 1`). Files at or below the
//! pointer are skipped; the rest are applied in ascending ordinal order.
//!
//! Each file is split into statements that are executed one at a time, and
//! each statement commits on its own. Nothing wraps a file in a
//! transaction, so when a statement fails the statements before it stay
//! applied. The first failing statement stops the run.

use std::path::Path;

use rusqlite::{params, Connection};

use crate::connection::Database;
use crate::discover::{discover_migrations, sort_by_ordinal, MigrationFile};
use crate::error::{ExecuteError, MigrationError};
use crate::execute::execute_on;
use crate::query::QueryBuilder;
use crate::splitter::split;
use crate::{TRACKER_COLUMN, TRACKER_TABLE};

/// A migration applied during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMigration {
    /// The file's ordinal.
    pub ordinal: i64,
    /// The file name.
    pub file_name: String,
    /// Number of statements executed.
    pub statements: usize,
}

/// What a migration run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    /// Whether the schema was created by this run.
    pub first_run: bool,
    /// Tracker pointer before the run.
    pub previous: i64,
    /// Tracker pointer after the run.
    pub current: i64,
    /// Files applied, in order.
    pub applied: Vec<AppliedMigration>,
}

/// Pending work without applying anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    /// Current tracker pointer.
    pub current: i64,
    /// Files above the pointer, in application order.
    pub pending: Vec<MigrationFile>,
}

/// Reads the tracker pointer.
///
/// # Errors
///
/// Returns `MigrationError::TrackerRead` on query failure or
/// `MigrationError::TrackerMissing` if the row is absent.
pub fn current_version(conn: &Connection) -> Result<i64, MigrationError> {
    let query = QueryBuilder::select(TRACKER_TABLE)
        .columns([TRACKER_COLUMN])
        .filter("id = 1")
        .build();

    let rows = execute_on(conn, &query, [])
        .map_err(MigrationError::TrackerRead)?
        .into_rows();
    let row = rows.first().ok_or(MigrationError::TrackerMissing)?;
    row.get(TRACKER_COLUMN).map_err(MigrationError::TrackerRead)
}

fn record_version(conn: &Connection, ordinal: i64) -> Result<(), MigrationError> {
    let query = QueryBuilder::update(TRACKER_TABLE)
        .columns([TRACKER_COLUMN])
        .filter("id = 1")
        .build();

    let outcome = execute_on(conn, &query, params![ordinal]).map_err(|source| {
        MigrationError::TrackerUpdate { ordinal, source }
    })?;
    if outcome.rows_affected() == Some(0) {
        return Err(MigrationError::TrackerMissing);
    }
    Ok(())
}

/// Discovered files above `pointer`, sorted by ordinal.
fn pending_migrations(dir: &Path, pointer: i64) -> Result<Vec<MigrationFile>, MigrationError> {
    let mut files = discover_migrations(dir)?;
    sort_by_ordinal(&mut files);
    files.retain(|f| f.ordinal > pointer);
    Ok(files)
}

/// Splits and executes one migration file. Returns the statement count.
fn apply_file(conn: &Connection, file: &MigrationFile) -> Result<usize, MigrationError> {
    let sql = file.read_sql()?;
    let split = split(&sql);
    if let Some(trailing) = split.trailing {
        tracing::warn!(
            file = %file.file_name,
            trailing,
            "ignoring unterminated text at end of migration"
        );
    }

    let mut executed = 0;
    for (index, statement) in split.statements.iter().enumerate() {
        if statement.trim_end_matches(';').trim().is_empty() {
            continue;
        }
        conn.execute_batch(statement)
            .map_err(|source| MigrationError::StatementExecution {
                file: file.file_name.clone(),
                index,
                statement: statement.to_string(),
                source,
            })?;
        executed += 1;
    }
    Ok(executed)
}

/// Applies pending migrations from `dir` on `conn`.
///
/// With `first_run` set the pointer is taken to be 0 without reading the
/// tracker. The tracker is written once, after the last file, and only if
/// something was applied.
///
/// If a file fails after earlier files in the same run succeeded, the
/// pointer is still advanced past the successful ones before the error is
/// returned.
///
/// # Errors
///
/// Returns `MigrationError` on any read, execution, or tracker failure.
pub fn run_migrations_on(
    conn: &Connection,
    dir: &Path,
    first_run: bool,
) -> Result<MigrationReport, MigrationError> {
    let previous = if first_run { 0 } else { current_version(conn)? };
    tracing::debug!(pointer = previous, first_run, "read migration pointer");

    let pending = pending_migrations(dir, previous)?;
    let mut applied = Vec::with_capacity(pending.len());

    for file in &pending {
        tracing::info!(ordinal = file.ordinal, file = %file.file_name, "applying migration");

        match apply_file(conn, file) {
            Ok(statements) => applied.push(AppliedMigration {
                ordinal: file.ordinal,
                file_name: file.file_name.clone(),
                statements,
            }),
            Err(err) => {
                if let Some(last) = applied.last() {
                    if let Err(record_err) = record_version(conn, last.ordinal) {
                        tracing::error!(
                            ordinal = last.ordinal,
                            error = %record_err,
                            "failed to record partial migration progress"
                        );
                    }
                }
                return Err(err);
            }
        }
    }

    let current = match applied.last() {
        Some(last) => {
            record_version(conn, last.ordinal)?;
            tracing::info!(
                count = applied.len(),
                from = previous,
                to = last.ordinal,
                "applied database migrations"
            );
            last.ordinal
        }
        None => {
            tracing::info!(pointer = previous, "no migrations to apply, schema is up to date");
            previous
        }
    };

    Ok(MigrationReport {
        first_run,
        previous,
        current,
        applied,
    })
}

/// Applies pending migrations from `dir` to `database`.
///
/// # Errors
///
/// See [`run_migrations_on`]; additionally `MigrationError::Pool` if no
/// connection is available.
pub fn run_migrations(
    database: &Database,
    dir: &Path,
    first_run: bool,
) -> Result<MigrationReport, MigrationError> {
    let conn = database.get()?;
    run_migrations_on(&conn, dir, first_run)
}

/// Reports the pointer and pending files without applying anything.
///
/// # Errors
///
/// Returns `MigrationError` if the tracker or the directory cannot be read.
pub fn migration_status(database: &Database, dir: &Path) -> Result<MigrationStatus, MigrationError> {
    let conn = database.get()?;
    let current = current_version(&conn)?;
    let pending = pending_migrations(dir, current)?;
    Ok(MigrationStatus { current, pending })
}

/// Reads the tracker pointer through the pool.
///
/// # Errors
///
/// Returns `ExecuteError` if the tracker cannot be read.
pub fn tracker_pointer(database: &Database) -> Result<Option<i64>, ExecuteError> {
    let query = QueryBuilder::select(TRACKER_TABLE)
        .columns([TRACKER_COLUMN])
        .filter("id = 1")
        .build();
    database
        .execute(&query, [])?
        .into_rows()
        .first()
        .map(|row| row.get(TRACKER_COLUMN))
        .transpose()
}
