//! Binding between one attribute of a mapped type and its column.

use uuid::Uuid;

use crate::class::Stored;
use crate::column::{Column, ColumnKind};
use crate::connection::Row;
use crate::context::ExecutionContext;
use crate::error::Result;
use crate::persist::{AnyObject, Attribute, FieldRef, FieldValue};
use crate::value::{SqlScalar, SqlValue};

/// What a field contributes to an inserted row.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Storage {
    /// The value to bind.
    Value(SqlValue),
    /// A reference to a row whose insertion is still in progress; NULL is
    /// written and the identifier patched in afterwards.
    Pending(Uuid),
}

impl Storage {
    /// The value used when comparing rows of one batch.
    pub(crate) fn comparable(&self) -> SqlValue {
        match self {
            Self::Value(v) => v.clone(),
            Self::Pending(id) => id.encode(),
        }
    }

    /// The value bound at insertion.
    pub(crate) fn bound(&self) -> SqlValue {
        match self {
            Self::Value(v) => v.clone(),
            Self::Pending(_) => SqlValue::Null,
        }
    }
}

/// One persisted attribute of a mapped type.
#[derive(Debug, Clone)]
pub struct SqlobField {
    attribute: Attribute,
    column: Column,
}

impl SqlobField {
    pub(crate) const fn new(attribute: Attribute, column: Column) -> Self {
        Self { attribute, column }
    }

    /// Returns the attribute name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.attribute.name
    }

    /// Returns the column.
    #[must_use]
    pub const fn column(&self) -> &Column {
        &self.column
    }

    /// Returns the described attribute.
    #[must_use]
    pub const fn attribute(&self) -> &Attribute {
        &self.attribute
    }

    /// Reads the attribute of `object`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SqlobError::InaccessibleField`] when `object` is not
    /// an instance of the owning type.
    pub fn get<'a>(&self, object: &'a AnyObject) -> Result<FieldRef<'a>> {
        (self.attribute.getter)(object)
    }

    /// Writes the attribute of `object`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SqlobError::InaccessibleField`] or
    /// [`crate::SqlobError::Conversion`] when the value does not fit.
    pub fn set(&self, object: &mut AnyObject, value: FieldValue) -> Result<()> {
        (self.attribute.setter)(object, value)
    }

    /// Converts an attribute value to what its column stores.
    ///
    /// Scalars are stored as they are. A referenced object is stored first
    /// and its identifier returned; an absent reference, or one whose
    /// insertion is still in progress, is NULL.
    ///
    /// # Errors
    ///
    /// Propagates failures storing the referenced object.
    pub async fn to_storage(&self, value: FieldRef<'_>, ctx: &mut ExecutionContext<'_>) -> Result<SqlValue> {
        Ok(self.storage(value, ctx).await?.bound())
    }

    pub(crate) async fn store(&self, object: &AnyObject, ctx: &mut ExecutionContext<'_>) -> Result<Storage> {
        let value = self.get(object)?;
        self.storage(value, ctx).await
    }

    async fn storage(&self, value: FieldRef<'_>, ctx: &mut ExecutionContext<'_>) -> Result<Storage> {
        match (value, &self.column.kind) {
            (FieldRef::Reference(Some(target)), ColumnKind::Reference { target: key, .. }) => {
                let class = ctx.sqlob().class_for(key)?;
                Ok(match class.store(target, ctx).await? {
                    Stored::Ready(id) => Storage::Value(id.encode()),
                    Stored::Pending(id) => Storage::Pending(id),
                })
            }
            (FieldRef::Reference(_), _) => Ok(Storage::Value(SqlValue::Null)),
            (FieldRef::Scalar(value), _) => Ok(Storage::Value(value)),
        }
    }

    /// Returns the stored value `object` would be compared with.
    ///
    /// `None` when the attribute references an object that is not stored,
    /// so no row can be equal to `object`.
    pub(crate) async fn lookup(&self, object: &AnyObject, ctx: &mut ExecutionContext<'_>) -> Result<Option<SqlValue>> {
        match (self.get(object)?, &self.column.kind) {
            (FieldRef::Reference(Some(target)), ColumnKind::Reference { target: key, .. }) => {
                let class = ctx.sqlob().class_for(key)?;
                Ok(class.find_id(target, ctx).await?.map(|id| id.encode()))
            }
            (FieldRef::Reference(_), _) => Ok(Some(SqlValue::Null)),
            (FieldRef::Scalar(value), _) => Ok(Some(value)),
        }
    }

    /// Reads the attribute value from a row.
    ///
    /// Returns `None` when the row lacks the column, or when the referenced
    /// row is already being loaded further up the chain; the attribute is
    /// then left as it is.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SqlobError::Conversion`] for a malformed stored
    /// identifier, and propagates failures loading the referenced row.
    pub async fn from_storage(&self, row: &Row, ctx: &mut ExecutionContext<'_>) -> Result<Option<FieldValue>> {
        let Some(value) = self.column.extract(row)? else {
            return Ok(None);
        };
        let ColumnKind::Reference { target, .. } = &self.column.kind else {
            return Ok(Some(FieldValue::Scalar(value)));
        };
        if value.is_null() {
            return Ok(Some(FieldValue::Reference(None)));
        }
        let id = Uuid::decode(value)?;
        let class = ctx.sqlob().class_for(target)?;
        if ctx.is_materializing(class.type_id(), id) {
            return Ok(None);
        }
        Ok(class
            .get(id, ctx)
            .await?
            .map(|object| FieldValue::Reference(Some(object))))
    }
}
