//! Generic query executor.
//!
//! Dispatches on the [`Operation`] carried by a built [`Query`]: selects
//! produce rows, inserts produce the new row id, updates and deletes produce
//! an affected-row count.

use std::sync::Arc;

use rusqlite::types::{FromSql, Value, ValueRef};
use rusqlite::{Connection, Params};

use crate::connection::Database;
use crate::error::ExecuteError;
use crate::query::{Operation, Query};

/// Result of executing a [`Query`].
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    /// Rows returned by a `SELECT`.
    Rows(Vec<Row>),
    /// An `INSERT` completed.
    Inserted {
        /// Rowid of the last inserted row.
        id: i64,
        /// Number of rows inserted.
        rows_affected: usize,
    },
    /// An `UPDATE` or `DELETE` completed.
    RowsAffected(usize),
}

impl QueryOutcome {
    /// The returned rows; empty for anything but a `SELECT`.
    pub fn into_rows(self) -> Vec<Row> {
        match self {
            Self::Rows(rows) => rows,
            _ => Vec::new(),
        }
    }

    /// Rows changed by a write; `None` for a `SELECT`.
    pub fn rows_affected(&self) -> Option<usize> {
        match self {
            Self::Rows(_) => None,
            Self::Inserted { rows_affected, .. } => Some(*rows_affected),
            Self::RowsAffected(n) => Some(*n),
        }
    }

    /// The new rowid for an `INSERT`.
    pub fn inserted_id(&self) -> Option<i64> {
        match self {
            Self::Inserted { id, .. } => Some(*id),
            _ => None,
        }
    }
}

/// One row of a `SELECT` result, detached from the connection.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    /// Column names, in select-list order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Raw values, in select-list order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Reads the column named `column` as `T`.
    ///
    /// # Errors
    ///
    /// Returns `ExecuteError::UnknownColumn` if there is no such column, or
    /// `ExecuteError::Column` if the value does not convert to `T`.
    pub fn get<T: FromSql>(&self, column: &str) -> Result<T, ExecuteError> {
        let idx = self
            .columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| ExecuteError::UnknownColumn(column.to_string()))?;
        T::column_result(ValueRef::from(&self.values[idx])).map_err(|source| {
            ExecuteError::Column {
                column: column.to_string(),
                source,
            }
        })
    }
}

/// Executes `query` on a connection the caller already holds.
///
/// # Errors
///
/// Returns `ExecuteError::Sqlite` if the statement fails to prepare, bind,
/// or run.
pub fn execute_on<P: Params>(
    conn: &Connection,
    query: &Query,
    params: P,
) -> Result<QueryOutcome, ExecuteError> {
    tracing::trace!(operation = %query.operation(), sql = query.sql(), "executing query");

    match query.operation() {
        Operation::Select => {
            let mut stmt = conn.prepare(query.sql())?;
            let columns: Arc<[String]> = stmt
                .column_names()
                .into_iter()
                .map(str::to_string)
                .collect();
            let width = columns.len();

            let mut rows = stmt.query(params)?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let values = (0..width)
                    .map(|i| row.get::<_, Value>(i))
                    .collect::<Result<Vec<_>, _>>()?;
                out.push(Row {
                    columns: Arc::clone(&columns),
                    values,
                });
            }
            Ok(QueryOutcome::Rows(out))
        }
        Operation::Insert => {
            let rows_affected = conn.execute(query.sql(), params)?;
            Ok(QueryOutcome::Inserted {
                id: conn.last_insert_rowid(),
                rows_affected,
            })
        }
        Operation::Update | Operation::Delete => {
            let rows_affected = conn.execute(query.sql(), params)?;
            Ok(QueryOutcome::RowsAffected(rows_affected))
        }
    }
}

impl Database {
    /// Executes `query` on a connection checked out of the pool.
    ///
    /// Parameters bind to the `?` placeholders left to right.
    ///
    /// # Errors
    ///
    /// Returns `ExecuteError::Pool` if no connection is available, or any
    /// error from [`execute_on`].
    pub fn execute<P: Params>(&self, query: &Query, params: P) -> Result<QueryOutcome, ExecuteError> {
        let conn = self.get()?;
        execute_on(&conn, query, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryBuilder;
    use rusqlite::params;

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        conn.execute_batch(
            "CREATE TABLE users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                password TEXT NOT NULL,
                is_admin INTEGER NOT NULL DEFAULT 0
            );",
        )
        .expect("should create users table");
        conn
    }

    fn insert_user(conn: &Connection, username: &str) -> i64 {
        let query = QueryBuilder::insert("users")
            .columns(["username", "password"])
            .values(2)
            .build();
        execute_on(conn, &query, params![username, "hash"])
            .expect("insert should succeed")
            .inserted_id()
            .expect("insert should report an id")
    }

    #[test]
    fn insert_reports_new_rowid() {
        let conn = test_db();
        assert_eq!(insert_user(&conn, "jimbob"), 1);
        assert_eq!(insert_user(&conn, "peter_pan"), 2);
    }

    #[test]
    fn select_returns_typed_rows() {
        let conn = test_db();
        insert_user(&conn, "jimbob");
        insert_user(&conn, "peter_pan");

        let query = QueryBuilder::select("users")
            .columns(["id", "username"])
            .filter("username = ?")
            .build();
        let rows = execute_on(&conn, &query, ["peter_pan"])
            .expect("select should succeed")
            .into_rows();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].columns(), ["id", "username"]);
        assert_eq!(rows[0].get::<i64>("id").expect("id"), 2);
        assert_eq!(
            rows[0].get::<String>("username").expect("username"),
            "peter_pan"
        );
    }

    #[test]
    fn select_with_no_matches_is_empty() {
        let conn = test_db();
        let query = QueryBuilder::select("users").filter("id = ?").build();
        let outcome = execute_on(&conn, &query, [42]).expect("select should succeed");
        assert_eq!(outcome, QueryOutcome::Rows(Vec::new()));
        assert_eq!(outcome.rows_affected(), None);
    }

    #[test]
    fn row_get_reports_bad_columns() {
        let conn = test_db();
        insert_user(&conn, "jimbob");
        let rows = execute_on(&conn, &QueryBuilder::select("users").build(), [])
            .expect("select should succeed")
            .into_rows();

        assert!(matches!(
            rows[0].get::<i64>("email"),
            Err(ExecuteError::UnknownColumn(c)) if c == "email"
        ));
        assert!(matches!(
            rows[0].get::<i64>("username"),
            Err(ExecuteError::Column { .. })
        ));
    }

    #[test]
    fn update_and_delete_report_affected_rows() {
        let conn = test_db();
        insert_user(&conn, "jimbob");
        insert_user(&conn, "peter_pan");

        let update = QueryBuilder::update("users")
            .columns(["password"])
            .filter("id = ?")
            .build();
        let outcome = execute_on(&conn, &update, params!["scoobydoo", 2]).expect("update");
        assert_eq!(outcome, QueryOutcome::RowsAffected(1));

        let delete = QueryBuilder::delete("users").build();
        let outcome = execute_on(&conn, &delete, []).expect("delete");
        assert_eq!(outcome.rows_affected(), Some(2));
        assert_eq!(outcome.inserted_id(), None);
    }

    #[test]
    fn wrong_parameter_count_is_an_error() {
        let conn = test_db();
        let query = QueryBuilder::insert("users")
            .columns(["username", "password"])
            .values(2)
            .build();
        let err = execute_on(&conn, &query, ["only_one"]).expect_err("should fail");
        assert!(matches!(err, ExecuteError::Sqlite(_)), "got {err:?}");
    }

    #[test]
    fn constraint_violations_surface_as_errors() {
        let conn = test_db();
        insert_user(&conn, "jimbob");
        let query = QueryBuilder::insert("users")
            .columns(["username", "password"])
            .values(2)
            .build();
        let err = execute_on(&conn, &query, ["jimbob", "again"]).expect_err("unique violated");
        assert!(matches!(err, ExecuteError::Sqlite(_)), "got {err:?}");
    }
}
