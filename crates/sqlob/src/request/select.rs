//! Loading records.

use std::marker::PhantomData;

use uuid::Uuid;

use super::{check_columns, Request};
use crate::context::ExecutionContext;
use crate::criteria::Where;
use crate::error::Result;
use crate::persist::{downcast, Persist};
use crate::result::{Record, Results};

/// Loads the records matching a criteria.
///
/// With a column subset, fields outside it keep their default value.
/// References are loaded along with the records pointing at them.
#[derive(Debug)]
pub struct SelectRequest<T> {
    criteria: Where,
    id: Option<Uuid>,
    columns: Option<Vec<String>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Persist> SelectRequest<T> {
    /// Selects rows matching `criteria`.
    #[must_use]
    pub const fn new(criteria: Where) -> Self {
        Self {
            criteria,
            id: None,
            columns: None,
            _marker: PhantomData,
        }
    }

    /// Selects every row.
    #[must_use]
    pub const fn all() -> Self {
        Self::new(Where::none())
    }

    /// Selects the row with identifier `id`.
    #[must_use]
    pub const fn by_id(id: Uuid) -> Self {
        Self {
            criteria: Where::none(),
            id: Some(id),
            columns: None,
            _marker: PhantomData,
        }
    }

    /// Restricts the loaded columns. The primary key is always loaded.
    #[must_use]
    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns = Some(columns.iter().map(ToString::to_string).collect());
        self
    }
}

impl<T: Persist> Request for SelectRequest<T> {
    type Output = Results<T>;

    async fn execute(self, ctx: &mut ExecutionContext<'_>) -> Result<Results<T>> {
        let class = ctx.sqlob().class_of::<T>()?;

        let columns: Vec<&str> = match &self.columns {
            Some(subset) => {
                check_columns(&class, subset.iter().map(String::as_str))?;
                std::iter::once(class.primary_key())
                    .chain(
                        subset
                            .iter()
                            .map(String::as_str)
                            .filter(|c| !c.eq_ignore_ascii_case(class.primary_key())),
                    )
                    .collect()
            }
            None => class.column_names(),
        };

        let criteria = match self.id {
            Some(id) => Where::eq(class.primary_key(), id).and(self.criteria),
            None => self.criteria,
        };
        let (predicate, params) = criteria.to_sql();
        let rows = ctx.fetch(&class.select_sql(&columns, &predicate), &params).await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            let id = class.row_id(row)?;
            let object = class.populate(row, ctx).await?;
            records.push(Record::with_id(id, downcast::<T>(object, class.type_name())?));
        }
        Ok(Results::new(records, rows.len() as u64))
    }
}
