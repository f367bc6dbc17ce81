//! Counting stored rows.

use std::marker::PhantomData;

use super::Request;
use crate::class::where_clause;
use crate::context::ExecutionContext;
use crate::criteria::Where;
use crate::error::Result;
use crate::persist::Persist;
use crate::value::{SqlScalar, SqlValue};

/// Counts the rows matching a criteria.
///
/// ```ignore
/// let adults = CountRequest::<Person>::new(Where::eq("age", 30))
///     .execute(&mut ctx)
///     .await?;
/// ```
#[derive(Debug)]
pub struct CountRequest<T> {
    criteria: Where,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Persist> CountRequest<T> {
    /// Counts rows matching `criteria`.
    #[must_use]
    pub const fn new(criteria: Where) -> Self {
        Self {
            criteria,
            _marker: PhantomData,
        }
    }

    /// Counts every row.
    #[must_use]
    pub const fn all() -> Self {
        Self::new(Where::none())
    }
}

impl<T: Persist> Request for CountRequest<T> {
    type Output = u64;

    async fn execute(self, ctx: &mut ExecutionContext<'_>) -> Result<u64> {
        let class = ctx.sqlob().class_of::<T>()?;
        let (predicate, params) = self.criteria.to_sql();
        let sql = format!(
            "SELECT COUNT(*) AS row_count FROM {}{}",
            class.name(),
            where_clause(&predicate)
        );
        let rows = ctx.fetch(&sql, &params).await?;
        let count = rows
            .first()
            .and_then(|row| row.get("row_count"))
            .cloned()
            .unwrap_or(SqlValue::Int(0));
        Ok(i64::decode(count)?.unsigned_abs())
    }
}
