//! Requests: one generated statement (or batch) against a mapped type.
//!
//! Every request is consumed by execution. Run it inside an existing
//! [`ExecutionContext`] with [`Request::execute`], or hand it a bare
//! connection with [`Request::execute_on`], which opens a context for the
//! call and closes it on every exit path.

mod count;
mod create;
mod delete;
mod drop;
mod insert;
mod select;
mod update;

pub use count::CountRequest;
pub use create::CreateRequest;
pub use delete::DeleteRequest;
pub use drop::DropRequest;
pub use insert::InsertRequest;
pub use select::SelectRequest;
pub use update::UpdateRequest;

use crate::class::SqlobClass;
use crate::connection::Connection;
use crate::context::ExecutionContext;
use crate::error::{Result, SqlobError};
use crate::registry::Sqlob;

/// A single-use operation on a mapped type.
#[allow(async_fn_in_trait)]
pub trait Request: Sized {
    /// What a successful execution yields.
    type Output;

    /// Executes the request within `ctx`.
    ///
    /// # Errors
    ///
    /// Returns [`SqlobError::Database`] wrapping the first driver failure,
    /// or the schema error of the mapped type.
    async fn execute(self, ctx: &mut ExecutionContext<'_>) -> Result<Self::Output>;

    /// Executes the request in a context of its own over `connection`.
    ///
    /// The context is closed before returning, whether or not the request
    /// succeeded.
    ///
    /// # Errors
    ///
    /// Returns the request's error, or the error closing the context.
    async fn execute_on(self, sqlob: &Sqlob, connection: &mut dyn Connection) -> Result<Self::Output> {
        let mut ctx = ExecutionContext::new(sqlob, connection);
        let outcome = self.execute(&mut ctx).await;
        let closed = ctx.close().await;
        let output = outcome?;
        closed?;
        Ok(output)
    }
}

/// Checks that every named column exists on `class`.
fn check_columns<'a>(class: &SqlobClass, columns: impl IntoIterator<Item = &'a str>) -> Result<()> {
    for column in columns {
        if class.field(column).is_none() && !column.eq_ignore_ascii_case(class.primary_key()) {
            return Err(SqlobError::UnknownColumn {
                table: class.name().to_string(),
                column: column.to_string(),
            });
        }
    }
    Ok(())
}
