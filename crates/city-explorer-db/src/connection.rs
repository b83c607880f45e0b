//! Connection management.
//!
//! Two kinds of handle exist. A [`ServerHandle`] is a short-lived in-memory
//! connection rooted at the data directory: it has no schema of its own and
//! reaches schemas by attaching their files. A [`Database`] is the pool bound
//! to a single schema file; it lives for the rest of the process and is what
//! request handlers receive.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OpenFlags};

use crate::error::ConnectionError;

/// File extension used for schema files inside the data directory.
pub const SCHEMA_FILE_EXTENSION: &str = "db";

/// Runtime tunables for SQLite connection behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbRuntimeSettings {
    /// Busy timeout for SQLite connections, in milliseconds.
    pub busy_timeout_ms: u64,

    /// Maximum number of pooled SQLite connections.
    pub pool_max_size: u32,
}

impl Default for DbRuntimeSettings {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
            pool_max_size: 8,
        }
    }
}

/// A type alias for the SQLite connection pool.
pub type DbPool = Pool<SqliteConnectionManager>;

/// A connection checked out of a [`DbPool`].
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

/// Where the server lives and how its connections behave.
///
/// The data directory plays the role of the database host: every schema is
/// a `<name>.db` file inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Directory holding one file per schema.
    pub data_dir: PathBuf,

    /// Connection tunables applied to every handle.
    pub settings: DbRuntimeSettings,
}

impl Credentials {
    /// Credentials for `data_dir` with default runtime settings.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            settings: DbRuntimeSettings::default(),
        }
    }

    /// Replaces the runtime settings.
    pub fn with_settings(mut self, settings: DbRuntimeSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Path of the file backing `schema`.
    pub fn schema_path(&self, schema: &str) -> PathBuf {
        schema_path(&self.data_dir, schema)
    }
}

fn schema_path(data_dir: &Path, schema: &str) -> PathBuf {
    data_dir.join(format!("{schema}.{SCHEMA_FILE_EXTENSION}"))
}

/// Server-level handle with no default schema.
///
/// Only used while deciding whether a schema needs bootstrapping. Release it
/// with [`close`] before opening the scoped handle.
pub struct ServerHandle {
    conn: Connection,
    data_dir: PathBuf,
}

impl ServerHandle {
    /// The underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// The data directory this handle is rooted at.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Path of the file backing `schema` on this server.
    pub fn schema_path(&self, schema: &str) -> PathBuf {
        schema_path(&self.data_dir, schema)
    }
}

impl fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerHandle")
            .field("data_dir", &self.data_dir)
            .finish_non_exhaustive()
    }
}

/// Opens a server-level handle rooted at `credentials.data_dir`.
///
/// The data directory is created if it does not exist yet.
///
/// # Errors
///
/// Returns `ConnectionError::DataDir` if the directory cannot be created, or
/// `ConnectionError::Open` if the in-memory connection cannot be opened.
pub fn open_unscoped(credentials: &Credentials) -> Result<ServerHandle, ConnectionError> {
    std::fs::create_dir_all(&credentials.data_dir).map_err(|source| ConnectionError::DataDir {
        path: credentials.data_dir.clone(),
        source,
    })?;

    let conn = Connection::open_in_memory().map_err(ConnectionError::Open)?;
    conn.busy_timeout(Duration::from_millis(credentials.settings.busy_timeout_ms))
        .map_err(ConnectionError::Open)?;

    tracing::debug!(
        data_dir = %credentials.data_dir.display(),
        "opened server connection"
    );

    Ok(ServerHandle {
        conn,
        data_dir: credentials.data_dir.clone(),
    })
}

/// Closes a server-level handle.
///
/// # Errors
///
/// Returns `ConnectionError::Close` if SQLite refuses to close the
/// connection (for example because a statement is still live).
pub fn close(handle: ServerHandle) -> Result<(), ConnectionError> {
    let ServerHandle { conn, data_dir } = handle;
    conn.close().map_err(|(_, e)| ConnectionError::Close(e))?;
    tracing::debug!(data_dir = %data_dir.display(), "closed server connection");
    Ok(())
}

/// Long-lived handle bound to a single schema.
///
/// Cheap to clone; clones share the same pool.
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    schema: String,
}

impl Database {
    /// Wraps an existing pool. The pool must already point at `schema`.
    pub fn from_pool(pool: DbPool, schema: impl Into<String>) -> Self {
        Self {
            pool,
            schema: schema.into(),
        }
    }

    /// The schema this handle is bound to.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// The underlying connection pool.
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Checks a connection out of the pool.
    ///
    /// # Errors
    ///
    /// Returns the pool error if no connection becomes available in time.
    pub fn get(&self) -> Result<DbConnection, r2d2::Error> {
        self.pool.get()
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("schema", &self.schema)
            .field("max_size", &self.pool.max_size())
            .finish()
    }
}

/// Opens the pool bound to `schema`, with WAL mode and foreign keys enabled.
///
/// The schema file must already exist; this never creates one.
///
/// # Errors
///
/// Returns `ConnectionError::MissingSchema` if the schema file is absent,
/// or `ConnectionError::Pool` if the pool cannot be built.
pub fn open_scoped(credentials: &Credentials, schema: &str) -> Result<Database, ConnectionError> {
    let path = credentials.schema_path(schema);
    if !path.is_file() {
        return Err(ConnectionError::MissingSchema {
            schema: schema.to_string(),
            path,
        });
    }

    let settings = credentials.settings;
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_FULL_MUTEX;

    let manager = SqliteConnectionManager::file(&path)
        .with_flags(flags)
        .with_init(move |conn| {
            // In-memory and some network filesystems report something other
            // than "wal"; only "wal" and "memory" are acceptable.
            let journal_mode: String =
                conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
            if journal_mode != "wal" && journal_mode != "memory" {
                return Err(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
                    Some(format!(
                        "failed to set WAL journal mode, got: {}",
                        journal_mode
                    )),
                ));
            }
            conn.execute_batch(&format!(
                "PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = {};",
                settings.busy_timeout_ms
            ))
        });

    let pool = Pool::builder()
        .max_size(settings.pool_max_size)
        .build(manager)
        .map_err(|source| ConnectionError::Pool {
            schema: schema.to_string(),
            source,
        })?;

    tracing::debug!(schema, path = %path.display(), "opened schema pool");

    Ok(Database::from_pool(pool, schema))
}
