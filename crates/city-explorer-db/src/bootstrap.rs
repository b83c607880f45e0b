//! Schema existence check and one-time initialisation.
//!
//! A schema "exists" when its file is present in the data directory and its
//! catalog contains the migration tracker table. Anything less is treated as
//! absent and bootstrapped from the initialisation script.

use std::borrow::Cow;
use std::path::Path;

use rusqlite::OptionalExtension;

use crate::connection::ServerHandle;
use crate::error::{ConnectError, InitializationFailure};
use crate::TRACKER_TABLE;

/// Embedded bootstrap script.
pub const BOOTSTRAP_SQL: &str = include_str!("bootstrap/000_initialisation.sql");

/// Token replaced with the schema name in the bootstrap script.
pub const SCHEMA_NAME_PLACEHOLDER: &str = "{{SCHEMA_NAME}}";

/// Token replaced with the schema file path in the bootstrap script.
pub const SCHEMA_PATH_PLACEHOLDER: &str = "{{SCHEMA_PATH}}";

/// Alias used when attaching a schema file for inspection.
const PROBE_ALIAS: &str = "schema_probe";

/// Database names SQLite reserves on every connection.
const RESERVED_NAMES: [&str; 2] = ["main", "temp"];

/// Checks that `name` is usable both as a file stem and as an unquoted alias.
///
/// # Errors
///
/// Returns `ConnectError::InvalidSchemaName` unless `name` matches
/// `[A-Za-z_][A-Za-z0-9_]*` and is not one of SQLite's own database names
/// (`main`, `temp`, in any case).
pub fn validate_schema_name(name: &str) -> Result<(), ConnectError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    } && !RESERVED_NAMES
        .iter()
        .any(|reserved| name.eq_ignore_ascii_case(reserved));

    if valid {
        Ok(())
    } else {
        Err(ConnectError::InvalidSchemaName(name.to_string()))
    }
}

/// Returns whether `schema` already exists on the server.
///
/// A missing file or a catalog without the tracker table is a plain `false`.
///
/// # Errors
///
/// Returns `ConnectError::ExistenceCheck` if the file cannot be attached or
/// its catalog cannot be queried (for example, it is not a SQLite database).
pub fn schema_exists(server: &ServerHandle, schema: &str) -> Result<bool, ConnectError> {
    let path = server.schema_path(schema);
    if !path.is_file() {
        tracing::debug!(schema, path = %path.display(), "schema file not found");
        return Ok(false);
    }

    let conn = server.connection();
    let check_err = |source| ConnectError::ExistenceCheck {
        schema: schema.to_string(),
        source,
    };

    conn.execute(
        &format!("ATTACH DATABASE ?1 AS {PROBE_ALIAS}"),
        [path.to_string_lossy().into_owned()],
    )
    .map_err(check_err)?;

    let lookup = conn
        .query_row(
            &format!(
                "SELECT name FROM {PROBE_ALIAS}.sqlite_master WHERE type = 'table' AND name = ?1"
            ),
            [TRACKER_TABLE],
            |row| row.get::<_, String>(0),
        )
        .optional();

    // Detach even when the lookup failed so the alias can be reused.
    let detached = conn.execute(&format!("DETACH DATABASE {PROBE_ALIAS}"), []);

    let found = lookup.map_err(check_err)?;
    detached.map_err(check_err)?;

    Ok(found.as_deref() == Some(TRACKER_TABLE))
}

/// Substitutes the schema placeholders in a bootstrap script.
pub fn render_bootstrap(script: &str, schema: &str, schema_path: &Path) -> String {
    // Single quotes are the only thing that can break out of the path literal.
    let path_literal = schema_path.to_string_lossy().replace('\'', "''");
    script
        .replace(SCHEMA_NAME_PLACEHOLDER, schema)
        .replace(SCHEMA_PATH_PLACEHOLDER, &path_literal)
}

/// Creates `schema` and its tracker table.
///
/// Uses the script at `script_path` when given, otherwise [`BOOTSTRAP_SQL`].
/// The rendered script runs as a single batch on the server handle.
///
/// # Errors
///
/// Returns `ConnectError::Initialization`. The caller must not continue.
pub fn initialize_schema(
    server: &ServerHandle,
    schema: &str,
    script_path: Option<&Path>,
) -> Result<(), ConnectError> {
    let fail = |reason| ConnectError::Initialization {
        schema: schema.to_string(),
        reason,
    };

    let script: Cow<'_, str> = match script_path {
        Some(path) => Cow::Owned(std::fs::read_to_string(path).map_err(|source| {
            fail(InitializationFailure::ScriptRead {
                path: path.to_path_buf(),
                source,
            })
        })?),
        None => Cow::Borrowed(BOOTSTRAP_SQL),
    };

    let rendered = render_bootstrap(&script, schema, &server.schema_path(schema));
    server
        .connection()
        .execute_batch(&rendered)
        .map_err(|e| fail(InitializationFailure::Script(e)))?;

    tracing::info!(schema, "initialised schema");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{close, open_unscoped, Credentials};

    #[test]
    fn schema_names_are_plain_identifiers() {
        for ok in ["city_explorer_app", "_scratch", "a1"] {
            validate_schema_name(ok).unwrap_or_else(|e| panic!("{ok} should be valid: {e}"));
        }
        for bad in ["", "1app", "app-db", "app db", "../escape", "app\"x", "main", "TEMP"] {
            assert!(
                matches!(
                    validate_schema_name(bad),
                    Err(ConnectError::InvalidSchemaName(_))
                ),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn render_replaces_every_placeholder() {
        let rendered = render_bootstrap(
            "ATTACH '{{SCHEMA_PATH}}' AS {{SCHEMA_NAME}}; DETACH {{SCHEMA_NAME}};",
            "app",
            Path::new("/srv/o'brien/app.db"),
        );
        assert_eq!(rendered, "ATTACH '/srv/o''brien/app.db' AS app; DETACH app;");
    }

    #[test]
    fn missing_schema_does_not_exist() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let server = open_unscoped(&Credentials::new(dir.path())).expect("should open server");

        assert!(!schema_exists(&server, "app").expect("check should succeed"));
        assert!(
            !dir.path().join("app.db").exists(),
            "existence check must not create the file"
        );
    }

    #[test]
    fn initialize_then_exists() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let server = open_unscoped(&Credentials::new(dir.path())).expect("should open server");

        initialize_schema(&server, "app", None).expect("bootstrap should succeed");
        assert!(schema_exists(&server, "app").expect("check should succeed"));

        // A different schema on the same server is unaffected.
        assert!(!schema_exists(&server, "app2").expect("check should succeed"));

        let conn = rusqlite::Connection::open(dir.path().join("app.db")).expect("should open file");
        let pointer: i64 = conn
            .query_row(
                "SELECT migration_int FROM migration_tracker WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .expect("tracker row should be seeded");
        assert_eq!(pointer, 0);

        drop(conn);
        close(server).expect("should close server");
    }

    #[test]
    fn file_without_tracker_is_not_a_schema() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let conn = rusqlite::Connection::open(dir.path().join("app.db")).expect("should open file");
        conn.execute_batch("CREATE TABLE unrelated (id INTEGER PRIMARY KEY);")
            .expect("should create table");
        drop(conn);

        let server = open_unscoped(&Credentials::new(dir.path())).expect("should open server");
        assert!(!schema_exists(&server, "app").expect("check should succeed"));

        // Running the check twice proves the probe alias was detached.
        assert!(!schema_exists(&server, "app").expect("second check should succeed"));
    }

    #[test]
    fn non_database_file_is_an_existence_error() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        std::fs::write(dir.path().join("app.db"), b"definitely not a sqlite database file")
            .expect("should write junk");

        let server = open_unscoped(&Credentials::new(dir.path())).expect("should open server");
        let err = schema_exists(&server, "app").expect_err("junk file should fail the lookup");
        assert!(
            matches!(err, ConnectError::ExistenceCheck { ref schema, .. } if schema == "app"),
            "got {err:?}"
        );
    }

    #[test]
    fn broken_bootstrap_script_is_fatal() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let script = dir.path().join("init.sql");
        std::fs::write(&script, "CREATE TABLE {{SCHEMA_NAME}}.oops (").expect("should write script");

        let server =
            open_unscoped(&Credentials::new(dir.path().join("data"))).expect("should open server");
        let err = initialize_schema(&server, "app", Some(&script)).expect_err("script is invalid");
        assert!(
            matches!(
                err,
                ConnectError::Initialization {
                    reason: InitializationFailure::Script(_),
                    ..
                }
            ),
            "got {err:?}"
        );
        let cause = std::error::Error::source(&err).expect("initialisation error keeps its cause");
        assert!(cause.to_string().starts_with("bootstrap script failed"), "got {cause}");

        let err = initialize_schema(&server, "app", Some(&dir.path().join("absent.sql")))
            .expect_err("script is missing");
        assert!(
            matches!(
                err,
                ConnectError::Initialization {
                    reason: InitializationFailure::ScriptRead { .. },
                    ..
                }
            ),
            "got {err:?}"
        );
    }
}
