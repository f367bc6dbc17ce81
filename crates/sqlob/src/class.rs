//! Schema of one mapped type.

use std::any::TypeId;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::debug;
use uuid::Uuid;

use crate::column::ColumnKind;
use crate::connection::Row;
use crate::context::{ExecutionContext, Patch};
use crate::criteria::Where;
use crate::error::{Result, SqlobError};
use crate::field::{SqlobField, Storage};
use crate::persist::{AnyObject, TypeKey};
use crate::registry::{Sqlob, SqlobConfig};
use crate::types::ValueKind;
use crate::value::{SqlScalar, SqlValue};

/// Outcome of storing an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stored {
    /// The row exists.
    Ready(Uuid),
    /// The row is being inserted further up the call chain.
    Pending(Uuid),
}

impl Stored {
    pub(crate) const fn id(self) -> Uuid {
        match self {
            Self::Ready(id) | Self::Pending(id) => id,
        }
    }
}

/// Identity of an object instance while it is being stored.
pub(crate) type ObjectKey = (TypeId, usize);

pub(crate) fn object_key(type_id: TypeId, object: &AnyObject) -> ObjectKey {
    (type_id, (object as *const AnyObject).cast::<()>() as usize)
}

/// Column and value pairs a stored row must carry to equal an object.
pub(crate) type Equality = Vec<(String, SqlValue)>;

/// Table layout of a mapped type: name, primary key and ordered fields.
///
/// Built once per type by [`Sqlob::class_of`] and immutable afterwards.
#[derive(Debug)]
pub struct SqlobClass {
    type_id: TypeId,
    type_name: &'static str,
    name: String,
    primary_key: String,
    pk_type: String,
    fields: Vec<SqlobField>,
    instantiate: fn() -> Box<AnyObject>,
}

impl SqlobClass {
    pub(crate) fn build(key: &TypeKey, config: &SqlobConfig) -> Result<Self> {
        let description = key.describe();
        let pk_type = config.types.lookup(ValueKind::Uuid)?.sql_type.clone();

        let mut fields = Vec::with_capacity(description.attributes.len());
        for attribute in description.attributes {
            let factory = config
                .factories()
                .find(|f| f.accepts(&attribute))
                .ok_or_else(|| SqlobError::NoApplicableColumnFactory {
                    type_name: description.type_name.to_string(),
                    field: attribute.name.to_string(),
                })?;
            let column = factory.build(&attribute, &config.types)?;
            fields.push(SqlobField::new(attribute, column));
        }

        Ok(Self {
            type_id: key.id(),
            type_name: description.type_name,
            name: description
                .table
                .unwrap_or(description.type_name)
                .to_string(),
            primary_key: config.primary_key.clone(),
            pk_type,
            fields,
            instantiate: description.instantiate,
        })
    }

    /// Returns the table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the mapped type name.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns the mapped type identity.
    #[must_use]
    pub const fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns the primary key column name.
    #[must_use]
    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// Returns the fields in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[SqlobField] {
        &self.fields
    }

    /// Returns the field stored in `column`.
    #[must_use]
    pub fn field(&self, column: &str) -> Option<&SqlobField> {
        self.fields
            .iter()
            .find(|f| f.column().name.eq_ignore_ascii_case(column))
    }

    /// Returns the column names in declaration order, primary key first.
    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        std::iter::once(self.primary_key.as_str())
            .chain(self.fields.iter().map(|f| f.column().name.as_str()))
            .collect()
    }

    /// Returns the referenced schema of every reference column.
    ///
    /// # Errors
    ///
    /// Returns the schema error of a referenced type.
    pub fn references(&self, sqlob: &Sqlob) -> Result<Vec<(&SqlobField, Arc<Self>)>> {
        self.fields
            .iter()
            .filter_map(|field| match &field.column().kind {
                ColumnKind::Reference { target, .. } => Some((field, target)),
                ColumnKind::Scalar { .. } => None,
            })
            .map(|(field, target)| sqlob.class_for(target).map(|class| (field, class)))
            .collect()
    }

    /// Returns the `CREATE TABLE` statement.
    ///
    /// ```text
    /// CREATE TABLE Person (id CHAR(36) PRIMARY KEY, name VARCHAR(1024), age INTEGER)
    /// ```
    ///
    /// Every reference column gets a foreign key to the referenced table,
    /// listed after the column definitions.
    ///
    /// # Errors
    ///
    /// Returns the schema error of a referenced type.
    pub fn creation_statement(&self, sqlob: &Sqlob) -> Result<String> {
        self.create_table("CREATE TABLE", sqlob)
    }

    /// Returns the `CREATE TABLE IF NOT EXISTS` statement.
    ///
    /// # Errors
    ///
    /// Returns the schema error of a referenced type.
    pub fn creation_statement_if_absent(&self, sqlob: &Sqlob) -> Result<String> {
        self.create_table("CREATE TABLE IF NOT EXISTS", sqlob)
    }

    fn create_table(&self, verb: &str, sqlob: &Sqlob) -> Result<String> {
        let mut parts = vec![format!("{} {} PRIMARY KEY", self.primary_key, self.pk_type)];
        parts.extend(self.fields.iter().map(|f| f.column().definition()));
        for (field, target) in self.references(sqlob)? {
            parts.push(format!(
                "FOREIGN KEY ({}) REFERENCES {}({})",
                field.column().name,
                target.name,
                target.primary_key
            ));
        }
        Ok(format!("{verb} {} ({})", self.name, parts.join(", ")))
    }

    /// Returns the statement dropping the table when it exists.
    #[must_use]
    pub fn drop_statement(&self) -> String {
        format!("DROP TABLE IF EXISTS {}", self.name)
    }

    /// Returns whether the table exists in the database behind `ctx`.
    ///
    /// # Errors
    ///
    /// Returns [`SqlobError::Database`] when the tables cannot be listed.
    pub async fn exists(&self, ctx: &mut ExecutionContext<'_>) -> Result<bool> {
        ctx.contains_table(&self.name).await
    }

    pub(crate) fn select_sql(&self, columns: &[&str], predicate: &str) -> String {
        format!(
            "SELECT {} FROM {}{}",
            columns.join(", "),
            self.name,
            where_clause(predicate)
        )
    }

    /// Returns the statement inserting `rows` rows at once, the primary
    /// key first and then the field columns.
    #[must_use]
    pub fn insertion_statement(&self, rows: usize) -> String {
        let columns = self.column_names();
        let row = format!(
            "({})",
            vec![SqlValue::placeholder(); columns.len()].join(", ")
        );
        format!(
            "INSERT INTO {} ({}) VALUES {}",
            self.name,
            columns.join(", "),
            vec![row; rows].join(", ")
        )
    }

    pub(crate) fn row_id(&self, row: &Row) -> Result<Uuid> {
        let value = row
            .get(&self.primary_key)
            .cloned()
            .ok_or_else(|| SqlobError::UnknownColumn {
                table: self.name.clone(),
                column: self.primary_key.clone(),
            })?;
        Uuid::decode(value)
    }

    /// Stores `object` and returns its identifier.
    ///
    /// A stored row equal to `object` is reused. Otherwise referenced
    /// objects are stored first and a new row is inserted.
    ///
    /// # Errors
    ///
    /// Returns [`SqlobError::Database`] when a statement fails.
    pub async fn put(&self, object: &AnyObject, ctx: &mut ExecutionContext<'_>) -> Result<Uuid> {
        Ok(self.store(object, ctx).await?.id())
    }

    pub(crate) fn store<'a, 'c>(
        &'a self,
        object: &'a AnyObject,
        ctx: &'a mut ExecutionContext<'c>,
    ) -> BoxFuture<'a, Result<Stored>> {
        Box::pin(async move {
            let key = object_key(self.type_id, object);
            if let Some(id) = ctx.in_flight(key) {
                debug!(table = %self.name, %id, "Reference cycle, deferring foreign key");
                return Ok(Stored::Pending(id));
            }
            if let Some(id) = self.find_id(object, ctx).await? {
                debug!(table = %self.name, %id, "Reusing stored row");
                return Ok(Stored::Ready(id));
            }

            let id = Uuid::new_v4();
            ctx.enter_insert(key, id);
            let outcome = self.insert_row(id, object, ctx).await;
            ctx.leave_insert(&[key], outcome).await?;
            Ok(Stored::Ready(id))
        })
    }

    async fn insert_row(&self, id: Uuid, object: &AnyObject, ctx: &mut ExecutionContext<'_>) -> Result<()> {
        let storage = self.row_storage(object, ctx).await?;
        let row = self.bind_row(id, &storage, ctx);
        ctx.execute(&self.insertion_statement(1), &row).await?;
        Ok(())
    }

    /// Stores what every field of `object` needs stored first, in field order.
    pub(crate) async fn row_storage(&self, object: &AnyObject, ctx: &mut ExecutionContext<'_>) -> Result<Vec<Storage>> {
        let mut storage = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            storage.push(field.store(object, ctx).await?);
        }
        Ok(storage)
    }

    /// Returns the insert parameters for row `id`, deferring pending references.
    pub(crate) fn bind_row(&self, id: Uuid, storage: &[Storage], ctx: &mut ExecutionContext<'_>) -> Vec<SqlValue> {
        let mut row = Vec::with_capacity(storage.len() + 1);
        row.push(id.encode());
        for (field, value) in self.fields.iter().zip(storage) {
            if let Storage::Pending(target) = value {
                ctx.defer(Patch {
                    table: self.name.clone(),
                    column: field.column().name.clone(),
                    primary_key: self.primary_key.clone(),
                    row: id,
                    target: *target,
                });
            }
            row.push(value.bound());
        }
        row
    }

    /// Returns the identifier of a stored row equal to `object`.
    ///
    /// Rows are equal when every column matches; references match by the
    /// identifier of the referenced row. `None` when no such row exists.
    ///
    /// # Errors
    ///
    /// Returns [`SqlobError::Database`] when the lookup fails.
    pub fn find_id<'a, 'c>(
        &'a self,
        object: &'a AnyObject,
        ctx: &'a mut ExecutionContext<'c>,
    ) -> BoxFuture<'a, Result<Option<Uuid>>> {
        Box::pin(async move {
            let key = object_key(self.type_id, object);
            if ctx.in_flight(key).is_some() || !ctx.start_resolving(key) {
                return Ok(None);
            }
            let outcome = self.lookup_id(object, ctx).await;
            ctx.stop_resolving(key);
            outcome
        })
    }

    async fn lookup_id(&self, object: &AnyObject, ctx: &mut ExecutionContext<'_>) -> Result<Option<Uuid>> {
        let Some(equality) = self.equality(object, ctx).await? else {
            return Ok(None);
        };
        let (predicate, params) = equality_criteria(&equality).to_sql();
        let sql = self.select_sql(&[self.primary_key.as_str()], &predicate);
        let rows = ctx.fetch(&sql, &params).await?;
        rows.first().map(|row| self.row_id(row)).transpose()
    }

    /// Returns the criteria matching rows equal to `object`.
    ///
    /// `None` when `object` references an object that is not stored.
    ///
    /// # Errors
    ///
    /// Returns [`SqlobError::Database`] when resolving a reference fails.
    pub async fn criteria(&self, object: &AnyObject, ctx: &mut ExecutionContext<'_>) -> Result<Option<Where>> {
        Ok(self
            .equality(object, ctx)
            .await?
            .map(|equality| equality_criteria(&equality)))
    }

    pub(crate) async fn equality(&self, object: &AnyObject, ctx: &mut ExecutionContext<'_>) -> Result<Option<Equality>> {
        let mut equality = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            match field.lookup(object, ctx).await? {
                Some(value) => equality.push((field.column().name.clone(), value)),
                None => return Ok(None),
            }
        }
        Ok(Some(equality))
    }

    /// Loads the row `id`.
    ///
    /// # Errors
    ///
    /// Returns [`SqlobError::Database`] when a statement fails, and
    /// conversion errors for stored values that do not fit their field.
    pub fn get<'a, 'c>(
        &'a self,
        id: Uuid,
        ctx: &'a mut ExecutionContext<'c>,
    ) -> BoxFuture<'a, Result<Option<Box<AnyObject>>>> {
        Box::pin(async move {
            let (predicate, params) = Where::eq(self.primary_key.as_str(), id).to_sql();
            let sql = self.select_sql(&self.column_names(), &predicate);
            let rows = ctx.fetch(&sql, &params).await?;
            match rows.first() {
                Some(row) => self.populate(row, ctx).await.map(Some),
                None => Ok(None),
            }
        })
    }

    /// Builds an instance from a row.
    ///
    /// Fields whose column the row lacks keep their default. References are
    /// loaded recursively; one pointing back to a row already being loaded
    /// is left unset.
    ///
    /// # Errors
    ///
    /// Returns conversion errors for values that do not fit their field.
    pub async fn populate(&self, row: &Row, ctx: &mut ExecutionContext<'_>) -> Result<Box<AnyObject>> {
        let id = self.row_id(row)?;
        let entered = ctx.start_materializing(self.type_id, id);
        let mut object = (self.instantiate)();
        let outcome = self.fill(&mut *object, row, ctx).await;
        if entered {
            ctx.stop_materializing(self.type_id, id);
        }
        outcome.map(|()| object)
    }

    async fn fill(&self, object: &mut AnyObject, row: &Row, ctx: &mut ExecutionContext<'_>) -> Result<()> {
        for field in &self.fields {
            if let Some(value) = field.from_storage(row, ctx).await? {
                field.set(object, value)?;
            }
        }
        Ok(())
    }
}

pub(crate) fn where_clause(predicate: &str) -> String {
    if predicate.is_empty() {
        String::new()
    } else {
        format!(" WHERE {predicate}")
    }
}

pub(crate) fn equality_criteria(equality: &Equality) -> Where {
    Where::all(
        equality
            .iter()
            .map(|(column, value)| Where::eq(column.as_str(), value.clone())),
    )
}

/// Returns whether `row` carries every value of `equality`.
pub(crate) fn row_matches(equality: &Equality, row: &Row) -> bool {
    equality.iter().all(|(column, value)| {
        row.get(column)
            .is_some_and(|stored| stored.same_storage(value))
    })
}
