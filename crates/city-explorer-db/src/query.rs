//! Minimal SQL template builder.
//!
//! Renders `SELECT`/`INSERT`/`UPDATE`/`DELETE` text with positional `?`
//! placeholders. Table names, column names, join clauses and `WHERE`
//! fragments are inserted verbatim: nothing is quoted, escaped or checked,
//! so they must never carry user input. Values always go through
//! placeholders, bound left to right in the order they appear in the
//! rendered text.
//!
//! ```rust,ignore
//! let query = QueryBuilder::update("countries")
//!     .columns(["data", "expiry_date"])
//!     .filter("id = ?")
//!     .build();
//! assert_eq!(query.sql(), "UPDATE countries SET data = ?, expiry_date = ? WHERE id = ?");
//! db.execute(&query, params![data, expiry, id])?;
//! ```

use std::fmt;

/// The kind of statement a [`Query`] renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `SELECT ... FROM ...`
    Select,
    /// `INSERT INTO ... VALUES ...`
    Insert,
    /// `UPDATE ... SET ...`
    Update,
    /// `DELETE FROM ...`
    Delete,
}

impl Operation {
    /// The SQL verb.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Select => "SELECT",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rendered SQL together with the operation that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    operation: Operation,
    sql: String,
}

impl Query {
    /// The operation this query performs.
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// The rendered SQL text.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Number of `?` placeholders outside of quoted text.
    pub fn placeholder_count(&self) -> usize {
        let mut count = 0;
        let mut quote = None;
        for c in self.sql.chars() {
            match (quote, c) {
                (None, '\'' | '"') => quote = Some(c),
                (Some(q), _) if c == q => quote = None,
                (None, '?') => count += 1,
                _ => {}
            }
        }
        count
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// Fluent builder for a [`Query`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryBuilder {
    operation: Operation,
    table: String,
    columns: Vec<String>,
    value_count: usize,
    filters: Vec<String>,
    joins: Vec<String>,
}

impl QueryBuilder {
    /// Starts a builder for `operation` against `table`.
    pub fn new(operation: Operation, table: impl Into<String>) -> Self {
        Self {
            operation,
            table: table.into(),
            columns: Vec::new(),
            value_count: 0,
            filters: Vec::new(),
            joins: Vec::new(),
        }
    }

    /// Starts a `SELECT` from `table`.
    pub fn select(table: impl Into<String>) -> Self {
        Self::new(Operation::Select, table)
    }

    /// Starts an `INSERT` into `table`.
    pub fn insert(table: impl Into<String>) -> Self {
        Self::new(Operation::Insert, table)
    }

    /// Starts an `UPDATE` of `table`.
    pub fn update(table: impl Into<String>) -> Self {
        Self::new(Operation::Update, table)
    }

    /// Starts a `DELETE` from `table`.
    pub fn delete(table: impl Into<String>) -> Self {
        Self::new(Operation::Delete, table)
    }

    /// Sets the column list, replacing any earlier one.
    ///
    /// `SELECT` falls back to `*` when no columns are given. `UPDATE`
    /// renders one `col = ?` per column.
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Number of `?` placeholders in an `INSERT`'s `VALUES` list.
    pub fn values(mut self, count: usize) -> Self {
        self.value_count = count;
        self
    }

    /// Appends a `WHERE` fragment. Fragments are joined with `AND`.
    pub fn filter(mut self, fragment: impl Into<String>) -> Self {
        self.filters.push(fragment.into());
        self
    }

    /// Appends a join clause, e.g. `JOIN cities ON cities.id = pois.city_id`.
    ///
    /// Only rendered for `SELECT`.
    pub fn join(mut self, clause: impl Into<String>) -> Self {
        self.joins.push(clause.into());
        self
    }

    /// Renders the query.
    pub fn build(&self) -> Query {
        let mut sql = match self.operation {
            Operation::Select => {
                let cols = if self.columns.is_empty() {
                    "*".to_string()
                } else {
                    self.columns.join(", ")
                };
                let mut sql = format!("SELECT {cols} FROM {}", self.table);
                for join in &self.joins {
                    sql.push(' ');
                    sql.push_str(join);
                }
                sql
            }
            Operation::Insert => {
                let placeholders = vec!["?"; self.value_count].join(", ");
                format!(
                    "INSERT INTO {} ({}) VALUES ({placeholders})",
                    self.table,
                    self.columns.join(", ")
                )
            }
            Operation::Update => {
                let assignments = self
                    .columns
                    .iter()
                    .map(|col| format!("{col} = ?"))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("UPDATE {} SET {assignments}", self.table)
            }
            Operation::Delete => format!("DELETE FROM {}", self.table),
        };

        if !self.filters.is_empty() && self.operation != Operation::Insert {
            sql.push_str(" WHERE ");
            sql.push_str(&self.filters.join(" AND "));
        }

        Query {
            operation: self.operation,
            sql,
        }
    }
}
