//! Database layer for the City Explorer server.
//!
//! Owns everything between process start and the first request: opening
//! connections, creating the schema on first boot, and bringing it up to
//! date from the SQL files in the migrations directory. It also provides
//! the small query builder and executor that request handlers use.
//!
//! # Startup sequence
//!
//! [`connect`] runs, in order:
//!
//! 1. open a server-level handle rooted at the data directory;
//! 2. check whether the schema exists, and bootstrap it if not;
//! 3. close the server-level handle and open the schema pool;
//! 4. apply every migration file above the tracker pointer, then advance
//!    the pointer once.
//!
//! The returned [`Database`] is the only handle the rest of the process
//! should use. Nothing may query it before `connect` returns. Migrations
//! assume a single process; there is no locking between instances.
//!
//! # Design decisions
//!
//! - **SQLite, one file per schema**: the data directory stands in for a
//!   database server and each schema is a `<name>.db` file in it.
//! - **`r2d2` connection pool**: the schema handle is shared by every
//!   request handler without manual lifetime management.
//! - **Statements run one at a time**: migration files are split by
//!   [`split_statements`] so trigger bodies stay whole and failures point at
//!   a single statement.

mod bootstrap;
mod connection;
mod discover;
mod error;
mod execute;
mod migrations;
mod query;
mod splitter;

use std::path::{Path, PathBuf};

pub use bootstrap::{
    initialize_schema, render_bootstrap, schema_exists, validate_schema_name, BOOTSTRAP_SQL,
    SCHEMA_NAME_PLACEHOLDER, SCHEMA_PATH_PLACEHOLDER,
};
pub use connection::{
    close, open_scoped, open_unscoped, Credentials, Database, DbConnection, DbPool,
    DbRuntimeSettings, ServerHandle, SCHEMA_FILE_EXTENSION,
};
pub use discover::{discover_migrations, parse_file_name, sort_by_ordinal, MigrationFile};
pub use error::{
    ConnectError, ConnectionError, ExecuteError, FileNameError, InitializationFailure,
    MigrationError,
};
pub use execute::{execute_on, QueryOutcome, Row};
pub use migrations::{
    current_version, migration_status, run_migrations, run_migrations_on, tracker_pointer,
    AppliedMigration, MigrationReport, MigrationStatus,
};
pub use query::{Operation, Query, QueryBuilder};
pub use splitter::{split, split_statements, Split};

/// Table holding the migration pointer.
pub const TRACKER_TABLE: &str = "migration_tracker";

/// Column holding the highest applied ordinal.
pub const TRACKER_COLUMN: &str = "migration_int";

/// Where migrations come from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationSource {
    /// Directory of `<ordinal>_<label>.sql` files.
    pub dir: PathBuf,
    /// Bootstrap script to use instead of [`BOOTSTRAP_SQL`].
    pub bootstrap_script: Option<PathBuf>,
}

impl MigrationSource {
    /// Migrations from `dir` with the embedded bootstrap script.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            bootstrap_script: None,
        }
    }
}

/// A ready schema handle and what it took to get there.
#[derive(Debug)]
pub struct Connected {
    /// Pool bound to the schema.
    pub database: Database,
    /// What the migration run did.
    pub report: MigrationReport,
}

/// Brings `schema` up to date and returns a handle bound to it.
///
/// Creates the schema first if it does not exist. Any error means the
/// schema may be in an unexpected state and the process should not start
/// serving.
///
/// # Errors
///
/// Returns `ConnectError` for an invalid name, a connection failure, a
/// failed existence check, a failed bootstrap, or a failed migration.
pub fn connect(
    credentials: &Credentials,
    schema: &str,
    source: &MigrationSource,
) -> Result<Connected, ConnectError> {
    validate_schema_name(schema)?;

    let server = open_unscoped(credentials)?;
    let first_run = !schema_exists(&server, schema)?;
    if first_run {
        tracing::info!(schema, "schema not found, initialising");
        initialize_schema(&server, schema, source.bootstrap_script.as_deref())?;
    }
    close(server)?;

    let database = open_scoped(credentials, schema)?;
    let report = run_migrations(&database, &source.dir, first_run)?;

    tracing::info!(
        schema,
        first_run,
        version = report.current,
        "database ready"
    );

    Ok(Connected { database, report })
}

/// Convenience for callers that only have paths.
///
/// # Errors
///
/// See [`connect`].
pub fn connect_dir(
    data_dir: &Path,
    schema: &str,
    migrations_dir: &Path,
) -> Result<Connected, ConnectError> {
    connect(
        &Credentials::new(data_dir),
        schema,
        &MigrationSource::new(migrations_dir),
    )
}
