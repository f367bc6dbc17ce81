//! [`Connection`] over a single sqlx SQLite connection.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Column as _, Connection as _, Row as _, Sqlite, TypeInfo as _, ValueRef as _};
use thiserror::Error;
use tracing::debug;

use super::{Connection, DriverResult, Row, StatementId};
use crate::error::{Result, SqlobError};
use crate::value::SqlValue;

const BATCH_SAVEPOINT: &str = "sqlob_batch";

#[derive(Debug, Error)]
enum SqliteDriverError {
    #[error("statement {0:?} is not prepared on this connection")]
    UnknownStatement(StatementId),
    #[error("connection is closed")]
    Closed,
}

/// A SQLite connection usable by the engine.
#[derive(Debug)]
pub struct SqliteConnection {
    inner: Option<sqlx::SqliteConnection>,
    statements: HashMap<StatementId, String>,
    next_id: u64,
    abandoned: bool,
}

impl SqliteConnection {
    /// Opens a connection, e.g. `sqlite::memory:` or `sqlite://data.db`.
    ///
    /// # Errors
    ///
    /// Returns [`SqlobError::Database`] when the database cannot be opened.
    pub async fn connect(url: &str) -> Result<Self> {
        let inner = sqlx::SqliteConnection::connect(url)
            .await
            .map_err(|e| SqlobError::database("connect", Box::new(e)))?;
        debug!(url, "Opened SQLite connection");
        Ok(Self::from_raw(inner))
    }

    /// Wraps an already open sqlx connection.
    #[must_use]
    pub fn from_raw(inner: sqlx::SqliteConnection) -> Self {
        Self {
            inner: Some(inner),
            statements: HashMap::new(),
            next_id: 0,
            abandoned: false,
        }
    }

    /// Returns the number of prepared statements not yet released.
    #[must_use]
    pub fn open_statements(&self) -> usize {
        self.statements.len()
    }

    /// Returns whether [`Connection::close`] has been called.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    /// Returns the open connection, first rolling back a transaction
    /// abandoned since the last call.
    async fn raw(&mut self) -> DriverResult<&mut sqlx::SqliteConnection> {
        let conn = self.inner.as_mut().ok_or(SqliteDriverError::Closed)?;
        if self.abandoned {
            self.abandoned = false;
            debug!("Rolling back abandoned transaction");
            Self::run(conn, "ROLLBACK").await?;
        }
        Ok(conn)
    }

    async fn statement(&mut self, statement: StatementId) -> DriverResult<(&mut sqlx::SqliteConnection, String)> {
        let sql = self
            .statements
            .get(&statement)
            .cloned()
            .ok_or(SqliteDriverError::UnknownStatement(statement))?;
        Ok((self.raw().await?, sql))
    }

    async fn run(conn: &mut sqlx::SqliteConnection, sql: &str) -> DriverResult<()> {
        sqlx::query(sql).execute(&mut *conn).await?;
        Ok(())
    }
}

/// Binds a parameter to a raw query.
fn bind_param<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: SqlValue,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        SqlValue::Null => query.bind(Option::<i64>::None),
        SqlValue::Bool(b) => query.bind(b),
        SqlValue::Int(i) => query.bind(i),
        SqlValue::Float(f) => query.bind(f),
        SqlValue::Text(s) => query.bind(s),
        SqlValue::Blob(b) => query.bind(b),
    }
}

fn bind_all<'q>(sql: &'q str, params: &[SqlValue]) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    params
        .iter()
        .cloned()
        .fold(sqlx::query(sql), bind_param)
}

/// Decodes a row by the storage class of each value.
fn decode_row(row: &SqliteRow, columns: &Arc<[String]>) -> DriverResult<Row> {
    let mut values = Vec::with_capacity(columns.len());
    for index in 0..columns.len() {
        let raw = row.try_get_raw(index)?;
        if raw.is_null() {
            values.push(SqlValue::Null);
            continue;
        }
        let storage = raw.type_info().name().to_ascii_uppercase();
        let value = match storage.as_str() {
            "INTEGER" | "BOOLEAN" => SqlValue::Int(row.try_get_unchecked::<i64, _>(index)?),
            "REAL" => SqlValue::Float(row.try_get_unchecked::<f64, _>(index)?),
            "BLOB" => SqlValue::Blob(row.try_get_unchecked::<Vec<u8>, _>(index)?),
            _ => SqlValue::Text(row.try_get_unchecked::<String, _>(index)?),
        };
        values.push(value);
    }
    Ok(Row::new(Arc::clone(columns), values))
}

impl Connection for SqliteConnection {
    fn prepare<'a>(&'a mut self, sql: &'a str) -> BoxFuture<'a, DriverResult<StatementId>> {
        Box::pin(async move {
            sqlx::Executor::prepare(self.raw().await?, sql).await?;
            let id = StatementId(self.next_id);
            self.next_id += 1;
            self.statements.insert(id, sql.to_string());
            Ok(id)
        })
    }

    fn query<'a>(
        &'a mut self,
        statement: StatementId,
        params: &'a [SqlValue],
    ) -> BoxFuture<'a, DriverResult<Vec<Row>>> {
        Box::pin(async move {
            let (conn, sql) = self.statement(statement).await?;
            let rows = bind_all(&sql, params).fetch_all(&mut *conn).await?;
            let Some(first) = rows.first() else {
                return Ok(Vec::new());
            };
            let columns: Arc<[String]> = first
                .columns()
                .iter()
                .map(|c| c.name().to_string())
                .collect();
            rows.iter().map(|row| decode_row(row, &columns)).collect()
        })
    }

    fn execute<'a>(
        &'a mut self,
        statement: StatementId,
        params: &'a [SqlValue],
    ) -> BoxFuture<'a, DriverResult<u64>> {
        Box::pin(async move {
            let (conn, sql) = self.statement(statement).await?;
            let done = bind_all(&sql, params).execute(&mut *conn).await?;
            Ok(done.rows_affected())
        })
    }

    fn execute_batch<'a>(
        &'a mut self,
        batch: &'a [(StatementId, Vec<SqlValue>)],
    ) -> BoxFuture<'a, DriverResult<u64>> {
        Box::pin(async move {
            // One statement is atomic on its own
            if let [(statement, params)] = batch {
                return self.execute(*statement, params).await;
            }

            let mut sqls = Vec::with_capacity(batch.len());
            for (statement, _) in batch {
                let sql = self
                    .statements
                    .get(statement)
                    .cloned()
                    .ok_or(SqliteDriverError::UnknownStatement(*statement))?;
                sqls.push(sql);
            }

            let conn = self.raw().await?;
            Self::run(conn, &format!("SAVEPOINT {BATCH_SAVEPOINT}")).await?;
            let mut affected = 0;
            for (sql, (_, params)) in sqls.iter().zip(batch) {
                match bind_all(sql, params).execute(&mut *conn).await {
                    Ok(done) => affected += done.rows_affected(),
                    Err(e) => {
                        debug!(statements = batch.len(), "Batch failed, rolling back");
                        Self::run(conn, &format!("ROLLBACK TO {BATCH_SAVEPOINT}")).await?;
                        Self::run(conn, &format!("RELEASE {BATCH_SAVEPOINT}")).await?;
                        return Err(e.into());
                    }
                }
            }
            Self::run(conn, &format!("RELEASE {BATCH_SAVEPOINT}")).await?;
            Ok(affected)
        })
    }

    fn close_statement(&mut self, statement: StatementId) {
        self.statements.remove(&statement);
    }

    fn begin(&mut self) -> BoxFuture<'_, DriverResult<()>> {
        Box::pin(async move { Self::run(self.raw().await?, "BEGIN").await })
    }

    fn commit(&mut self) -> BoxFuture<'_, DriverResult<()>> {
        Box::pin(async move { Self::run(self.raw().await?, "COMMIT").await })
    }

    fn rollback(&mut self) -> BoxFuture<'_, DriverResult<()>> {
        Box::pin(async move { Self::run(self.raw().await?, "ROLLBACK").await })
    }

    fn abandon_transaction(&mut self) {
        self.abandoned = true;
    }

    fn tables(&mut self) -> BoxFuture<'_, DriverResult<Vec<String>>> {
        Box::pin(async move {
            let conn = self.raw().await?;
            let names = sqlx::query_scalar::<_, String>(
                "SELECT name FROM sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            )
            .fetch_all(&mut *conn)
            .await?;
            Ok(names)
        })
    }

    fn close(&mut self) -> BoxFuture<'_, DriverResult<()>> {
        Box::pin(async move {
            self.statements.clear();
            self.abandoned = false;
            if let Some(conn) = self.inner.take() {
                conn.close().await?;
            }
            Ok(())
        })
    }
}
