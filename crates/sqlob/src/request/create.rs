//! Table creation.

use std::any::TypeId;
use std::collections::HashSet;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::info;

use super::Request;
use crate::class::SqlobClass;
use crate::context::ExecutionContext;
use crate::error::Result;
use crate::persist::Persist;
use crate::registry::Sqlob;

/// Creates the table of a mapped type, and before it the tables of every
/// type it references, skipping tables that already exist.
///
/// Yields the table names in creation order.
#[derive(Debug)]
pub struct CreateRequest<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T: Persist> CreateRequest<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T: Persist> Default for CreateRequest<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Orders `class` after the classes it references, directly or not.
pub(super) fn creation_order(
    class: Arc<SqlobClass>,
    sqlob: &Sqlob,
    visited: &mut HashSet<TypeId>,
    order: &mut Vec<Arc<SqlobClass>>,
) -> Result<()> {
    if !visited.insert(class.type_id()) {
        return Ok(());
    }
    for (_, target) in class.references(sqlob)? {
        creation_order(target, sqlob, visited, order)?;
    }
    order.push(class);
    Ok(())
}

impl<T: Persist> Request for CreateRequest<T> {
    type Output = Vec<String>;

    async fn execute(self, ctx: &mut ExecutionContext<'_>) -> Result<Vec<String>> {
        let sqlob = ctx.sqlob();
        let mut order = Vec::new();
        creation_order(sqlob.class_of::<T>()?, sqlob, &mut HashSet::new(), &mut order)?;

        let mut created = Vec::with_capacity(order.len());
        for class in order {
            let sql = class.creation_statement_if_absent(ctx.sqlob())?;
            ctx.execute(&sql, &[]).await?;
            info!(table = %class.name(), "Table ready");
            created.push(class.name().to_string());
        }
        Ok(created)
    }
}
