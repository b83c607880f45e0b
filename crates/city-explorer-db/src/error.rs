//! Error types for the database layer.
//!
//! Every failure on the startup path ends up in [`ConnectError`], which the
//! caller is expected to treat as fatal. Nothing in this crate retries.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur when opening or closing a handle.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The data directory could not be created or is not a directory.
    #[error("data directory '{}' is unavailable: {source}", path.display())]
    DataDir {
        /// The configured data directory.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Opening the server-level connection failed.
    #[error("failed to open server connection: {0}")]
    Open(#[source] rusqlite::Error),

    /// The schema file does not exist, so there is nothing to bind to.
    #[error("schema '{schema}' does not exist at '{}'", path.display())]
    MissingSchema {
        /// The requested schema.
        schema: String,
        /// Where its file was expected.
        path: PathBuf,
    },

    /// Building the schema connection pool failed.
    #[error("failed to open schema '{schema}': {source}")]
    Pool {
        /// The schema the pool was bound to.
        schema: String,
        /// The underlying pool error.
        source: r2d2::Error,
    },

    /// Closing the server-level connection failed.
    #[error("failed to close server connection: {0}")]
    Close(#[source] rusqlite::Error),
}

/// Errors produced by the generic query executor.
#[derive(Debug, Error)]
pub enum ExecuteError {
    /// No pooled connection could be checked out.
    #[error("failed to get database connection: {0}")]
    Pool(#[from] r2d2::Error),

    /// The statement failed to prepare or run.
    #[error("query failed: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A result row has no column with the requested name.
    #[error("no column named '{0}' in result row")]
    UnknownColumn(String),

    /// A column value could not be converted to the requested type.
    #[error("column '{column}' has an incompatible type: {source}")]
    Column {
        /// The column that failed to convert.
        column: String,
        /// The conversion error.
        source: rusqlite::types::FromSqlError,
    },
}

/// Reasons a directory entry is not treated as a migration file.
///
/// These never fail a run; the discoverer logs them and moves on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FileNameError {
    /// The file name does not end in `.sql`.
    #[error("'{0}' does not have a .sql extension")]
    Extension(String),

    /// The file name has no `_` separating ordinal from label.
    #[error("'{0}' has no '<ordinal>_<label>' separator")]
    MissingSeparator(String),

    /// The text before the first `_` is not a non-negative integer.
    #[error("'{0}' does not start with a numeric ordinal")]
    InvalidOrdinal(String),
}

/// Errors that abort a migration run.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// The migrations directory could not be listed.
    #[error("failed to read migration directory '{}': {source}", path.display())]
    DirectoryRead {
        /// The migrations directory.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A migration file could not be read.
    #[error("failed to read migration file '{}': {source}", path.display())]
    FileRead {
        /// The migration file.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// No connection could be checked out for the run.
    #[error("failed to get database connection for migrations: {0}")]
    Pool(#[from] r2d2::Error),

    /// The tracker row could not be read.
    #[error("failed to read migration tracker: {0}")]
    TrackerRead(#[source] ExecuteError),

    /// The tracker table exists but holds no row with `id = 1`.
    #[error("migration tracker row is missing")]
    TrackerMissing,

    /// A single statement in a migration file failed.
    #[error("migration '{file}' failed at statement {index}: {source}")]
    StatementExecution {
        /// The migration file name.
        file: String,
        /// Zero-based position of the statement within the file.
        index: usize,
        /// The statement text that failed.
        statement: String,
        /// The underlying SQLite error.
        source: rusqlite::Error,
    },

    /// The new pointer could not be persisted after applying migrations.
    #[error("failed to record migration {ordinal} in tracker: {source}")]
    TrackerUpdate {
        /// The ordinal that was being recorded.
        ordinal: i64,
        /// The underlying executor error.
        source: ExecuteError,
    },
}

/// Errors returned by [`crate::connect`].
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The schema name is not a plain identifier.
    #[error("invalid schema name '{0}': expected letters, digits and underscores, and not main or temp")]
    InvalidSchemaName(String),

    /// A handle could not be opened or closed.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// The catalog lookup for the schema failed.
    #[error("failed to check whether schema '{schema}' exists: {source}")]
    ExistenceCheck {
        /// The schema being looked up.
        schema: String,
        /// The underlying SQLite error.
        source: rusqlite::Error,
    },

    /// The bootstrap script failed. The process cannot continue.
    #[error("failed to initialise schema '{schema}': {reason}")]
    Initialization {
        /// The schema being created.
        schema: String,
        /// What went wrong.
        #[source]
        reason: InitializationFailure,
    },

    /// Applying migrations failed.
    #[error(transparent)]
    Migration(#[from] MigrationError),
}

/// The cause of a failed bootstrap.
#[derive(Debug, Error)]
pub enum InitializationFailure {
    /// The bootstrap script override could not be read.
    #[error("failed to read bootstrap script '{}': {source}", path.display())]
    ScriptRead {
        /// The configured script path.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The bootstrap script failed to execute.
    #[error("bootstrap script failed: {0}")]
    Script(#[source] rusqlite::Error),
}
