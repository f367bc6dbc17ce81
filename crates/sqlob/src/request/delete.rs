//! Deleting rows.

use std::marker::PhantomData;

use uuid::Uuid;

use super::Request;
use crate::class::where_clause;
use crate::context::ExecutionContext;
use crate::criteria::Where;
use crate::error::Result;
use crate::persist::Persist;

/// Deletes the rows matching a criteria and returns how many were removed.
///
/// Referencing rows are not followed; where the database enforces foreign
/// keys, deleting a row that is still referenced fails.
#[derive(Debug)]
pub struct DeleteRequest<T> {
    criteria: Where,
    id: Option<Uuid>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Persist> DeleteRequest<T> {
    /// Deletes rows matching `criteria`.
    #[must_use]
    pub const fn new(criteria: Where) -> Self {
        Self {
            criteria,
            id: None,
            _marker: PhantomData,
        }
    }

    /// Deletes every row.
    #[must_use]
    pub const fn all() -> Self {
        Self::new(Where::none())
    }

    /// Deletes the row with identifier `id`.
    #[must_use]
    pub const fn by_id(id: Uuid) -> Self {
        Self {
            criteria: Where::none(),
            id: Some(id),
            _marker: PhantomData,
        }
    }
}

impl<T: Persist> Request for DeleteRequest<T> {
    type Output = u64;

    async fn execute(self, ctx: &mut ExecutionContext<'_>) -> Result<u64> {
        let class = ctx.sqlob().class_of::<T>()?;
        let criteria = match self.id {
            Some(id) => Where::eq(class.primary_key(), id).and(self.criteria),
            None => self.criteria,
        };
        let (predicate, params) = criteria.to_sql();
        let sql = format!("DELETE FROM {}{}", class.name(), where_clause(&predicate));
        ctx.execute(&sql, &params).await
    }
}
