//! Batched insertion of records that are not stored yet.

use std::collections::HashSet;

use tracing::debug;

use super::Request;
use crate::class::{equality_criteria, object_key, row_matches, ObjectKey, SqlobClass};
use crate::context::ExecutionContext;
use crate::criteria::Where;
use crate::error::{Result, SqlobError};
use crate::field::Storage;
use crate::persist::Persist;
use crate::result::{Record, Results};
use crate::value::SqlValue;

/// Parameters bound by one statement, under SQLite's lowest default limit.
const MAX_PARAMETERS: usize = 999;

/// Records looked up by one query, keeping its expression tree shallow.
const MAX_ALTERNATIVES: usize = 200;

/// Inserts records, skipping those equal to a stored row or to an earlier
/// record of the same request.
///
/// Referenced objects are stored before the rows pointing at them. The
/// results list the records actually inserted.
#[derive(Debug)]
pub struct InsertRequest<T> {
    records: Vec<Record<T>>,
}

impl<T: Persist> InsertRequest<T> {
    /// Inserts `objects`, each under a generated identifier.
    ///
    /// # Errors
    ///
    /// Returns [`SqlobError::EmptyRecordSet`] when `objects` is empty.
    pub fn new(objects: impl IntoIterator<Item = T>) -> Result<Self> {
        Self::with_records(objects.into_iter().map(Record::new))
    }

    /// Inserts one object under a generated identifier.
    #[must_use]
    pub fn single(object: T) -> Self {
        Self {
            records: vec![Record::new(object)],
        }
    }

    /// Inserts records under their own identifiers.
    ///
    /// # Errors
    ///
    /// Returns [`SqlobError::EmptyRecordSet`] when `records` is empty.
    pub fn with_records(records: impl IntoIterator<Item = Record<T>>) -> Result<Self> {
        let records: Vec<_> = records.into_iter().collect();
        if records.is_empty() {
            return Err(SqlobError::EmptyRecordSet);
        }
        Ok(Self { records })
    }

    /// Returns the records to insert.
    #[must_use]
    pub fn records(&self) -> &[Record<T>] {
        &self.records
    }

    /// Returns the indices of records with no equal stored row.
    async fn unstored(&self, class: &SqlobClass, ctx: &mut ExecutionContext<'_>) -> Result<Vec<usize>> {
        let mut equalities = Vec::with_capacity(self.records.len());
        for record in &self.records {
            equalities.push(class.equality(&record.object, ctx).await?);
        }

        let candidates: Vec<_> = equalities.iter().flatten().collect();
        let per_query = (MAX_PARAMETERS / class.fields().len().max(1)).clamp(1, MAX_ALTERNATIVES);
        let mut rows = Vec::new();
        for chunk in candidates.chunks(per_query) {
            let (predicate, params) = Where::any(chunk.iter().map(|e| equality_criteria(e))).to_sql();
            let sql = class.select_sql(&class.column_names(), &predicate);
            rows.extend(ctx.fetch(&sql, &params).await?);
        }

        Ok(equalities
            .iter()
            .enumerate()
            .filter(|(i, equality)| {
                let stored = equality
                    .as_ref()
                    .is_some_and(|e| rows.iter().any(|row| row_matches(e, row)));
                if stored {
                    debug!(table = %class.name(), id = %self.records[*i].id, "Record already stored");
                }
                !stored
            })
            .map(|(i, _)| i)
            .collect())
    }

    /// Inserts the records at `indices` in one batch and returns the
    /// indices actually inserted.
    ///
    /// Rows go out as multi-row INSERTs, as few as the parameter limit
    /// allows.
    async fn insert_batch(
        &self,
        class: &SqlobClass,
        indices: &[usize],
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<Vec<usize>> {
        let mut rows = Vec::with_capacity(indices.len());
        let mut seen: Vec<(Vec<SqlValue>, usize)> = Vec::with_capacity(indices.len());

        for &index in indices {
            let record = &self.records[index];
            let storage = class.row_storage(&record.object, ctx).await?;
            let values: Vec<SqlValue> = storage.iter().map(Storage::comparable).collect();
            if let Some((_, kept)) = seen.iter().find(|(v, _)| *v == values) {
                let kept = self.records[*kept].id;
                debug!(table = %class.name(), id = %record.id, duplicate_of = %kept, "Skipping duplicate record");
                continue;
            }
            rows.push(class.bind_row(record.id, &storage, ctx));
            seen.push((values, index));
        }

        let per_statement = (MAX_PARAMETERS / (class.fields().len() + 1)).max(1);
        let mut batch = Vec::with_capacity(rows.len().div_ceil(per_statement));
        for chunk in rows.chunks(per_statement) {
            let statement = ctx.prepare(&class.insertion_statement(chunk.len())).await?;
            batch.push((statement, chunk.concat()));
        }
        ctx.batch(&batch).await?;
        Ok(seen.into_iter().map(|(_, index)| index).collect())
    }
}

impl<T: Persist> Request for InsertRequest<T> {
    type Output = Results<T>;

    async fn execute(self, ctx: &mut ExecutionContext<'_>) -> Result<Results<T>> {
        let class = ctx.sqlob().class_of::<T>()?;
        let unstored = self.unstored(&class, ctx).await?;
        if unstored.is_empty() {
            return Ok(Results::new(Vec::new(), 0));
        }

        let keys: Vec<ObjectKey> = unstored
            .iter()
            .map(|&i| {
                let record = &self.records[i];
                let key = object_key(class.type_id(), &record.object);
                ctx.enter_insert(key, record.id);
                key
            })
            .collect();
        let (outcome, inserted) = match self.insert_batch(&class, &unstored, ctx).await {
            Ok(inserted) => (Ok(()), inserted),
            Err(e) => (Err(e), Vec::new()),
        };
        ctx.leave_insert(&keys, outcome).await?;

        let inserted: HashSet<usize> = inserted.into_iter().collect();
        let records: Vec<_> = self
            .records
            .into_iter()
            .enumerate()
            .filter(|(i, _)| inserted.contains(i))
            .map(|(_, record)| record)
            .collect();
        Ok(Results::new(records, inserted.len() as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::Description;

    #[derive(Debug, Default)]
    struct Empty;

    impl Persist for Empty {
        fn description() -> Description {
            Description::new::<Self>("Empty", Vec::new())
        }
    }

    #[test]
    fn test_empty_record_set_is_rejected() {
        assert!(matches!(
            InsertRequest::<Empty>::new(Vec::new()),
            Err(SqlobError::EmptyRecordSet)
        ));
        assert!(matches!(
            InsertRequest::<Empty>::with_records(Vec::new()),
            Err(SqlobError::EmptyRecordSet)
        ));
        assert_eq!(InsertRequest::single(Empty).records().len(), 1);
    }

    #[test]
    fn test_records_keep_explicit_ids() {
        let id = uuid::Uuid::new_v4();
        let request = InsertRequest::with_records([Record::with_id(id, Empty)]).unwrap();
        assert_eq!(request.records()[0].id, id);
    }
}
