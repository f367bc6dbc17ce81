//! Execution context: the resource scope of a span of requests.
//!
//! A context borrows one connection exclusively, tracks every statement it
//! prepares and releases them all when closed or dropped. It also carries
//! the bookkeeping of in-progress inserts used to break reference cycles.

use std::any::TypeId;
use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::class::ObjectKey;
use crate::connection::{Connection, Row, StatementId};
use crate::error::{Result, SqlobError};
use crate::persist::{downcast, Persist};
use crate::registry::Sqlob;
use crate::value::{SqlScalar, SqlValue};

/// A statement prepared through a context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    id: StatementId,
    sql: String,
}

impl Statement {
    /// Returns the SQL text.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }
}

/// A foreign key written as NULL because its target row was still being
/// inserted, applied once the outermost insert completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Patch {
    pub(crate) table: String,
    pub(crate) column: String,
    pub(crate) primary_key: String,
    pub(crate) row: Uuid,
    pub(crate) target: Uuid,
}

/// Scoped owner of one connection and the statements opened on it.
///
/// ```ignore
/// let mut ctx = sqlob.context(&mut connection);
/// let id = ctx.put(&person).await?;
/// let loaded: Option<Person> = ctx.get(id).await?;
/// ctx.close().await?;
/// ```
pub struct ExecutionContext<'c> {
    sqlob: &'c Sqlob,
    connection: &'c mut dyn Connection,
    statements: HashMap<String, StatementId>,
    in_flight: HashMap<ObjectKey, Uuid>,
    resolving: HashSet<ObjectKey>,
    materializing: HashSet<(TypeId, Uuid)>,
    patches: Vec<Patch>,
    in_transaction: bool,
    closed: bool,
}

impl<'c> ExecutionContext<'c> {
    /// Opens a context over `connection`.
    pub fn new(sqlob: &'c Sqlob, connection: &'c mut dyn Connection) -> Self {
        Self {
            sqlob,
            connection,
            statements: HashMap::new(),
            in_flight: HashMap::new(),
            resolving: HashSet::new(),
            materializing: HashSet::new(),
            patches: Vec::new(),
            in_transaction: false,
            closed: false,
        }
    }

    /// Returns the engine.
    #[must_use]
    pub const fn sqlob(&self) -> &'c Sqlob {
        self.sqlob
    }

    /// Returns whether [`close`](Self::close) has been called.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Returns the number of statements held open.
    #[must_use]
    pub fn open_statements(&self) -> usize {
        self.statements.len()
    }

    const fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(SqlobError::ClosedResource)
        } else {
            Ok(())
        }
    }

    /// Prepares `sql`, reusing the statement if this context already
    /// prepared the same text.
    ///
    /// # Errors
    ///
    /// Returns [`SqlobError::ClosedResource`] after [`close`](Self::close)
    /// and [`SqlobError::Database`] when the driver rejects the statement.
    pub async fn prepare(&mut self, sql: &str) -> Result<Statement> {
        self.ensure_open()?;
        if let Some(id) = self.statements.get(sql) {
            return Ok(Statement {
                id: *id,
                sql: sql.to_string(),
            });
        }
        debug!(sql = %sql, "Preparing statement");
        let id = self
            .connection
            .prepare(sql)
            .await
            .map_err(|e| SqlobError::database(sql, e))?;
        self.statements.insert(sql.to_string(), id);
        Ok(Statement {
            id,
            sql: sql.to_string(),
        })
    }

    /// Runs a prepared query.
    ///
    /// # Errors
    ///
    /// Returns [`SqlobError::ClosedResource`] after [`close`](Self::close)
    /// and [`SqlobError::Database`] when execution fails.
    pub async fn query(&mut self, statement: &Statement, params: &[SqlValue]) -> Result<Vec<Row>> {
        self.ensure_open()?;
        debug!(sql = %statement.sql, params = params.len(), "Executing query");
        self.connection
            .query(statement.id, params)
            .await
            .map_err(|e| SqlobError::database(&statement.sql, e))
    }

    /// Runs a prepared statement and returns the affected-row count.
    ///
    /// # Errors
    ///
    /// Returns [`SqlobError::ClosedResource`] after [`close`](Self::close)
    /// and [`SqlobError::Database`] when execution fails.
    pub async fn update(&mut self, statement: &Statement, params: &[SqlValue]) -> Result<u64> {
        self.ensure_open()?;
        debug!(sql = %statement.sql, params = params.len(), "Executing statement");
        self.connection
            .execute(statement.id, params)
            .await
            .map_err(|e| SqlobError::database(&statement.sql, e))
    }

    /// Runs prepared statements in order, all or nothing.
    ///
    /// # Errors
    ///
    /// Returns [`SqlobError::ClosedResource`] after [`close`](Self::close)
    /// and [`SqlobError::Database`] when any statement fails.
    pub async fn batch(&mut self, batch: &[(Statement, Vec<SqlValue>)]) -> Result<u64> {
        self.ensure_open()?;
        let Some((first, _)) = batch.first() else {
            return Ok(0);
        };
        debug!(sql = %first.sql, statements = batch.len(), "Executing batch");
        let prepared: Vec<(StatementId, Vec<SqlValue>)> = batch
            .iter()
            .map(|(statement, params)| (statement.id, params.clone()))
            .collect();
        self.connection
            .execute_batch(&prepared)
            .await
            .map_err(|e| SqlobError::database(&first.sql, e))
    }

    /// Lists the tables of the database.
    ///
    /// # Errors
    ///
    /// Returns [`SqlobError::ClosedResource`] after [`close`](Self::close)
    /// and [`SqlobError::Database`] when the driver fails.
    pub async fn tables(&mut self) -> Result<Vec<String>> {
        self.ensure_open()?;
        self.connection
            .tables()
            .await
            .map_err(|e| SqlobError::database("list tables", e))
    }

    /// Returns whether the database has a table named `name`, compared
    /// case-insensitively.
    ///
    /// # Errors
    ///
    /// See [`tables`](Self::tables).
    pub async fn contains_table(&mut self, name: &str) -> Result<bool> {
        Ok(self
            .tables()
            .await?
            .iter()
            .any(|table| table.eq_ignore_ascii_case(name)))
    }

    /// Prepares and runs a query.
    ///
    /// # Errors
    ///
    /// See [`prepare`](Self::prepare) and [`query`](Self::query).
    pub async fn fetch(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        let statement = self.prepare(sql).await?;
        self.query(&statement, params).await
    }

    /// Prepares and runs a statement.
    ///
    /// # Errors
    ///
    /// See [`prepare`](Self::prepare) and [`update`](Self::update).
    pub async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let statement = self.prepare(sql).await?;
        self.update(&statement, params).await
    }

    /// Starts a transaction.
    ///
    /// # Errors
    ///
    /// Returns [`SqlobError::ClosedResource`] after [`close`](Self::close)
    /// and [`SqlobError::Database`] when the driver fails.
    pub async fn begin(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.connection
            .begin()
            .await
            .map_err(|e| SqlobError::database("BEGIN", e))?;
        self.in_transaction = true;
        Ok(())
    }

    /// Commits the open transaction.
    ///
    /// # Errors
    ///
    /// Returns [`SqlobError::ClosedResource`] after [`close`](Self::close)
    /// and [`SqlobError::Database`] when the driver fails.
    pub async fn commit(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.in_transaction = false;
        self.connection
            .commit()
            .await
            .map_err(|e| SqlobError::database("COMMIT", e))
    }

    /// Rolls back the open transaction.
    ///
    /// # Errors
    ///
    /// Returns [`SqlobError::ClosedResource`] after [`close`](Self::close)
    /// and [`SqlobError::Database`] when the driver fails.
    pub async fn rollback(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.in_transaction = false;
        self.connection
            .rollback()
            .await
            .map_err(|e| SqlobError::database("ROLLBACK", e))
    }

    /// Releases every statement and rolls back an open transaction.
    ///
    /// The connection itself stays open. Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`SqlobError::Database`] when the rollback fails; the
    /// statements are released regardless.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.release_statements();
        if self.in_transaction {
            self.in_transaction = false;
            debug!("Rolling back transaction left open");
            self.connection
                .rollback()
                .await
                .map_err(|e| SqlobError::database("ROLLBACK", e))?;
        }
        Ok(())
    }

    fn release_statements(&mut self) {
        for (_, id) in self.statements.drain() {
            self.connection.close_statement(id);
        }
    }

    /// Stores `object` and returns its identifier, reusing an equal row.
    ///
    /// # Errors
    ///
    /// Returns the schema error of `T` or the first statement failure.
    pub async fn put<T: Persist>(&mut self, object: &T) -> Result<Uuid> {
        let class = self.sqlob.class_of::<T>()?;
        class.put(object, self).await
    }

    /// Loads the `T` stored with identifier `id`.
    ///
    /// # Errors
    ///
    /// Returns the schema error of `T`, the first statement failure or a
    /// conversion error for a stored value.
    pub async fn get<T: Persist>(&mut self, id: Uuid) -> Result<Option<T>> {
        let class = self.sqlob.class_of::<T>()?;
        let Some(object) = class.get(id, self).await? else {
            return Ok(None);
        };
        downcast(object, class.type_name()).map(Some)
    }

    pub(crate) fn in_flight(&self, key: ObjectKey) -> Option<Uuid> {
        self.in_flight.get(&key).copied()
    }

    pub(crate) fn enter_insert(&mut self, key: ObjectKey, id: Uuid) {
        self.in_flight.insert(key, id);
    }

    /// Ends the insertion of `keys`. The outermost insertion applies the
    /// deferred foreign keys, or drops them when it failed.
    pub(crate) async fn leave_insert(&mut self, keys: &[ObjectKey], outcome: Result<()>) -> Result<()> {
        for key in keys {
            self.in_flight.remove(key);
        }
        if !self.in_flight.is_empty() {
            return outcome;
        }
        let patches = std::mem::take(&mut self.patches);
        outcome?;
        for patch in patches {
            debug!(table = %patch.table, column = %patch.column, "Patching deferred reference");
            let sql = format!(
                "UPDATE {} SET {} = ? WHERE {} = ?",
                patch.table, patch.column, patch.primary_key
            );
            self.execute(&sql, &[patch.target.encode(), patch.row.encode()])
                .await?;
        }
        Ok(())
    }

    pub(crate) fn defer(&mut self, patch: Patch) {
        self.patches.push(patch);
    }

    pub(crate) fn start_resolving(&mut self, key: ObjectKey) -> bool {
        self.resolving.insert(key)
    }

    pub(crate) fn stop_resolving(&mut self, key: ObjectKey) {
        self.resolving.remove(&key);
    }

    pub(crate) fn start_materializing(&mut self, type_id: TypeId, id: Uuid) -> bool {
        self.materializing.insert((type_id, id))
    }

    pub(crate) fn stop_materializing(&mut self, type_id: TypeId, id: Uuid) {
        self.materializing.remove(&(type_id, id));
    }

    pub(crate) fn is_materializing(&self, type_id: TypeId, id: Uuid) -> bool {
        self.materializing.contains(&(type_id, id))
    }
}

impl Drop for ExecutionContext<'_> {
    fn drop(&mut self) {
        if !self.statements.is_empty() {
            warn!(statements = self.statements.len(), "Execution context dropped without close");
        }
        self.release_statements();
        if self.in_transaction {
            warn!("Execution context dropped with an open transaction, rolling back");
            self.connection.abandon_transaction();
        }
    }
}

impl std::fmt::Debug for ExecutionContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("statements", &self.statements.len())
            .field("in_transaction", &self.in_transaction)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}
