//! Updating stored rows.

use uuid::Uuid;

use super::{check_columns, Request};
use crate::class::{object_key, where_clause};
use crate::context::ExecutionContext;
use crate::criteria::Where;
use crate::error::Result;
use crate::persist::Persist;
use crate::value::{SqlValue, ToSqlValue};

/// Sets columns on the rows matching a criteria and returns the number of
/// rows changed.
///
/// ```ignore
/// let changed = UpdateRequest::<Person>::set("age", 31)
///     .filter(Where::eq("name", "Ann"))
///     .execute(&mut ctx)
///     .await?;
/// ```
#[derive(Debug)]
pub struct UpdateRequest<T> {
    assignments: Vec<(String, SqlValue)>,
    criteria: Where,
    replacement: Option<(Uuid, T)>,
}

impl<T: Persist> UpdateRequest<T> {
    /// Sets `column` to `value`.
    #[must_use]
    pub fn set(column: impl Into<String>, value: impl ToSqlValue) -> Self {
        Self {
            assignments: vec![(column.into(), value.to_sql_value())],
            criteria: Where::none(),
            replacement: None,
        }
    }

    /// Rewrites every column of row `id` from `object`.
    ///
    /// Objects `object` references are stored first.
    #[must_use]
    pub const fn replace(id: Uuid, object: T) -> Self {
        Self {
            assignments: Vec::new(),
            criteria: Where::none(),
            replacement: Some((id, object)),
        }
    }

    /// Also sets `column` to `value`.
    #[must_use]
    pub fn and_set(mut self, column: impl Into<String>, value: impl ToSqlValue) -> Self {
        self.assignments.push((column.into(), value.to_sql_value()));
        self
    }

    /// Restricts the update to rows matching `criteria`.
    #[must_use]
    pub fn filter(mut self, criteria: Where) -> Self {
        self.criteria = self.criteria.and(criteria);
        self
    }
}

impl<T: Persist> Request for UpdateRequest<T> {
    type Output = u64;

    async fn execute(mut self, ctx: &mut ExecutionContext<'_>) -> Result<u64> {
        let class = ctx.sqlob().class_of::<T>()?;

        if let Some((id, object)) = &self.replacement {
            let key = object_key(class.type_id(), object);
            ctx.enter_insert(key, *id);
            let (outcome, storage) = match class.row_storage(object, ctx).await {
                Ok(storage) => (Ok(()), storage),
                Err(e) => (Err(e), Vec::new()),
            };
            ctx.leave_insert(&[key], outcome).await?;
            for (field, value) in class.fields().iter().zip(&storage) {
                self.assignments
                    .push((field.column().name.clone(), value.comparable()));
            }
            self.criteria = Where::eq(class.primary_key(), *id).and(self.criteria);
        }

        if self.assignments.is_empty() {
            return Ok(0);
        }
        check_columns(&class, self.assignments.iter().map(|(c, _)| c.as_str()))?;

        let (predicate, criteria_params) = self.criteria.to_sql();
        let set: Vec<String> = self
            .assignments
            .iter()
            .map(|(column, _)| format!("{column} = ?"))
            .collect();
        let sql = format!(
            "UPDATE {} SET {}{}",
            class.name(),
            set.join(", "),
            where_clause(&predicate)
        );
        let params: Vec<SqlValue> = self
            .assignments
            .into_iter()
            .map(|(_, value)| value)
            .chain(criteria_params)
            .collect();
        ctx.execute(&sql, &params).await
    }
}
