//! The driver interface consumed by the engine.
//!
//! The engine never talks to a database directly. It prepares statements,
//! binds [`SqlValue`] parameters and reads [`Row`]s through a [`Connection`].
//! [`SqliteConnection`] implements it on top of sqlx.

mod sqlite;

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::value::SqlValue;

pub use sqlite::SqliteConnection;

/// A failure reported by a driver.
pub type DriverError = Box<dyn std::error::Error + Send + Sync>;

/// Result type alias for driver calls.
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Handle to a statement prepared on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatementId(pub u64);

/// One row of a query result.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<SqlValue>,
}

impl Row {
    /// Creates a row. `columns` and `values` are parallel.
    #[must_use]
    pub fn new(columns: Arc<[String]>, values: Vec<SqlValue>) -> Self {
        Self { columns, values }
    }

    /// Returns the value of a column, matched case-insensitively.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
            .and_then(|i| self.values.get(i))
    }

    /// Returns the column names.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns the values in column order.
    #[must_use]
    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }
}

/// A live database connection.
///
/// Statements are referred to by [`StatementId`] once prepared. Releasing a
/// statement or closing the connection more than once is a no-op.
pub trait Connection: Send {
    /// Prepares `sql`, reporting syntax and schema errors early.
    fn prepare<'a>(&'a mut self, sql: &'a str) -> BoxFuture<'a, DriverResult<StatementId>>;

    /// Runs a prepared query and returns every row.
    fn query<'a>(
        &'a mut self,
        statement: StatementId,
        params: &'a [SqlValue],
    ) -> BoxFuture<'a, DriverResult<Vec<Row>>>;

    /// Runs a prepared statement and returns the affected-row count.
    fn execute<'a>(
        &'a mut self,
        statement: StatementId,
        params: &'a [SqlValue],
    ) -> BoxFuture<'a, DriverResult<u64>>;

    /// Runs prepared statements in order, each with its own parameters,
    /// and returns the total affected-row count.
    ///
    /// Either every statement is applied or none is.
    fn execute_batch<'a>(
        &'a mut self,
        batch: &'a [(StatementId, Vec<SqlValue>)],
    ) -> BoxFuture<'a, DriverResult<u64>>;

    /// Releases a prepared statement.
    fn close_statement(&mut self, statement: StatementId);

    /// Starts a transaction.
    fn begin(&mut self) -> BoxFuture<'_, DriverResult<()>>;

    /// Commits the open transaction.
    fn commit(&mut self) -> BoxFuture<'_, DriverResult<()>>;

    /// Rolls back the open transaction.
    fn rollback(&mut self) -> BoxFuture<'_, DriverResult<()>>;

    /// Marks the open transaction as abandoned by its owner.
    ///
    /// Called where no future can be awaited. The transaction must be
    /// rolled back before the connection runs anything else.
    fn abandon_transaction(&mut self);

    /// Lists the user tables of the database.
    fn tables(&mut self) -> BoxFuture<'_, DriverResult<Vec<String>>>;

    /// Closes the connection.
    fn close(&mut self) -> BoxFuture<'_, DriverResult<()>>;
}
