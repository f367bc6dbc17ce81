//! Table removal.

use std::collections::HashSet;
use std::marker::PhantomData;

use tracing::info;

use super::create::creation_order;
use super::Request;
use crate::context::ExecutionContext;
use crate::error::Result;
use crate::persist::Persist;

/// Drops the table of a mapped type, skipping it when absent.
///
/// With [`cascade`](Self::cascade) the tables of every type it references
/// are dropped too, each after the tables referencing it. Yields the table
/// names in drop order.
#[derive(Debug)]
pub struct DropRequest<T> {
    cascade: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Persist> DropRequest<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            cascade: false,
            _marker: PhantomData,
        }
    }

    /// Also drops the tables of referenced types.
    #[must_use]
    pub const fn cascade(mut self) -> Self {
        self.cascade = true;
        self
    }
}

impl<T: Persist> Default for DropRequest<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Persist> Request for DropRequest<T> {
    type Output = Vec<String>;

    async fn execute(self, ctx: &mut ExecutionContext<'_>) -> Result<Vec<String>> {
        let sqlob = ctx.sqlob();
        let class = sqlob.class_of::<T>()?;
        let order = if self.cascade {
            let mut order = Vec::new();
            creation_order(class, sqlob, &mut HashSet::new(), &mut order)?;
            order.reverse();
            order
        } else {
            vec![class]
        };

        let mut dropped = Vec::with_capacity(order.len());
        for class in order {
            ctx.execute(&class.drop_statement(), &[]).await?;
            info!(table = %class.name(), "Table dropped");
            dropped.push(class.name().to_string());
        }
        Ok(dropped)
    }
}
