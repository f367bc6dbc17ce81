//! Describing mapped types.
//!
//! A mapped type implements [`Persist`], normally through
//! `#[derive(Persist)]`. Its [`Description`] lists the persistable
//! attributes in declaration order, each with a getter and a setter working
//! on type-erased instances. Schema descriptors are built from these
//! descriptions once per type.
//!
//! ```ignore
//! #[derive(Debug, Default, Persist)]
//! #[sqlob(table = "people")]
//! pub struct Person {
//!     pub name: String,
//!     #[sqlob(column = "years")]
//!     pub age: i32,
//!     #[sqlob(reference)]
//!     pub address: Option<Box<Address>>,
//!     #[sqlob(transient)]
//!     pub cached: bool,
//! }
//! ```

use core::fmt;
use std::any::{Any, TypeId};
use std::sync::Arc;

use crate::error::{Result, SqlobError};
use crate::types::ValueKind;
use crate::value::{SqlScalar, SqlValue};

/// A type-erased instance of a mapped type.
pub type AnyObject = dyn Any + Send + Sync;

/// Reads an attribute from an instance.
pub type Getter = for<'a> fn(&'a AnyObject) -> Result<FieldRef<'a>>;

/// Writes an attribute on an instance.
pub type Setter = fn(&mut AnyObject, FieldValue) -> Result<()>;

/// A type that can be stored as rows of a table.
pub trait Persist: Any + Send + Sync + Default {
    /// Describes the persistable attributes of this type.
    fn description() -> Description;
}

/// The persistable shape of a mapped type.
pub struct Description {
    /// Simple type name.
    pub type_name: &'static str,
    /// Table name override.
    pub table: Option<&'static str>,
    /// Persistable attributes in declaration order.
    pub attributes: Vec<Attribute>,
    /// Creates a default instance.
    pub instantiate: fn() -> Box<AnyObject>,
}

impl Description {
    /// Creates a description of `T`.
    #[must_use]
    pub fn new<T: Persist>(type_name: &'static str, attributes: Vec<Attribute>) -> Self {
        Self {
            type_name,
            table: None,
            attributes,
            instantiate: instantiate::<T>,
        }
    }

    /// Overrides the table name.
    #[must_use]
    pub const fn table(mut self, table: &'static str) -> Self {
        self.table = Some(table);
        self
    }
}

impl fmt::Debug for Description {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Description")
            .field("type_name", &self.type_name)
            .field("table", &self.table)
            .field("attributes", &self.attributes)
            .finish_non_exhaustive()
    }
}

fn instantiate<T: Persist>() -> Box<AnyObject> {
    Box::new(T::default())
}

/// Identity of a mapped type, usable without naming it statically.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
    describe: fn() -> Description,
}

impl TypeKey {
    /// Returns the key of `T`.
    #[must_use]
    pub fn of<T: Persist>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            describe: T::description,
        }
    }

    /// Returns the type identity.
    #[must_use]
    pub const fn id(&self) -> TypeId {
        self.id
    }

    /// Returns the full Rust type name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Builds the type's description.
    #[must_use]
    pub fn describe(&self) -> Description {
        (self.describe)()
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TypeKey").field(&self.name).finish()
    }
}

/// What an attribute holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    /// A value stored directly in its column.
    Scalar {
        /// Value kind used for the type lookup.
        kind: ValueKind,
        /// Whether `None` is representable.
        nullable: bool,
    },
    /// Another mapped object, stored as its identifier.
    Reference {
        /// The referenced type.
        target: TypeKey,
        /// Whether the reference may be absent.
        nullable: bool,
    },
}

/// One persistable attribute of a mapped type.
#[derive(Clone, Copy)]
pub struct Attribute {
    /// Field name.
    pub name: &'static str,
    /// Column name override.
    pub column: Option<&'static str>,
    /// SQL type override.
    pub sql_type: Option<&'static str>,
    /// Scalar or reference.
    pub kind: AttributeKind,
    /// Reads the attribute.
    pub getter: Getter,
    /// Writes the attribute.
    pub setter: Setter,
}

impl Attribute {
    /// Describes a scalar attribute of type `S`.
    #[must_use]
    pub const fn scalar<S: SqlScalar>(name: &'static str, getter: Getter, setter: Setter) -> Self {
        Self {
            name,
            column: None,
            sql_type: None,
            kind: AttributeKind::Scalar {
                kind: S::KIND,
                nullable: S::NULLABLE,
            },
            getter,
            setter,
        }
    }

    /// Describes a reference attribute of type `R`.
    #[must_use]
    pub fn reference<R: ReferenceField>(name: &'static str, getter: Getter, setter: Setter) -> Self {
        Self {
            name,
            column: None,
            sql_type: None,
            kind: AttributeKind::Reference {
                target: R::target(),
                nullable: R::NULLABLE,
            },
            getter,
            setter,
        }
    }

    /// Overrides the column name.
    #[must_use]
    pub const fn column(mut self, column: &'static str) -> Self {
        self.column = Some(column);
        self
    }

    /// Overrides the SQL type.
    #[must_use]
    pub const fn sql_type(mut self, sql_type: &'static str) -> Self {
        self.sql_type = Some(sql_type);
        self
    }

    /// Returns the column name.
    #[must_use]
    pub fn column_name(&self) -> &'static str {
        self.column.unwrap_or(self.name)
    }

    /// Returns whether this attribute references another mapped type.
    #[must_use]
    pub const fn is_reference(&self) -> bool {
        matches!(self.kind, AttributeKind::Reference { .. })
    }
}

impl fmt::Debug for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attribute")
            .field("name", &self.name)
            .field("column", &self.column)
            .field("sql_type", &self.sql_type)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// A borrowed attribute value.
#[derive(Debug)]
pub enum FieldRef<'a> {
    /// Encoded scalar.
    Scalar(SqlValue),
    /// The referenced object, if any.
    Reference(Option<&'a AnyObject>),
}

/// An owned attribute value to write.
#[derive(Debug)]
pub enum FieldValue {
    /// Encoded scalar.
    Scalar(SqlValue),
    /// The referenced object, if any.
    Reference(Option<Box<AnyObject>>),
}

/// A field type holding a reference to another mapped type.
///
/// Implemented for every `#[derive(Persist)]` type, for `Box<T>` and
/// `Arc<T>` of a mapped type, and for `Option` of any of these.
pub trait ReferenceField: Sized + Send + Sync + 'static {
    /// The referenced mapped type.
    type Target: Persist;

    /// Whether the reference may be absent.
    const NULLABLE: bool;

    /// Returns the key of the referenced type.
    #[must_use]
    fn target() -> TypeKey {
        TypeKey::of::<Self::Target>()
    }

    /// Borrows the referenced object.
    fn get(&self) -> Option<&Self::Target>;

    /// Builds the field from a loaded object; `None` leaves the field unset.
    fn from_target(target: Option<Self::Target>) -> Option<Self>;
}

impl<T: Persist> ReferenceField for Box<T> {
    type Target = T;
    const NULLABLE: bool = false;

    fn get(&self) -> Option<&T> {
        Some(&**self)
    }

    fn from_target(target: Option<T>) -> Option<Self> {
        target.map(Self::new)
    }
}

impl<T: Persist> ReferenceField for Arc<T> {
    type Target = T;
    const NULLABLE: bool = false;

    fn get(&self) -> Option<&T> {
        Some(&**self)
    }

    fn from_target(target: Option<T>) -> Option<Self> {
        target.map(Self::new)
    }
}

impl<R: ReferenceField> ReferenceField for Option<R> {
    type Target = R::Target;
    const NULLABLE: bool = true;

    fn get(&self) -> Option<&R::Target> {
        self.as_ref().and_then(R::get)
    }

    fn from_target(target: Option<R::Target>) -> Option<Self> {
        Some(target.and_then(|t| R::from_target(Some(t))))
    }
}

fn inaccessible(type_name: &str, field: &str, reason: impl Into<String>) -> SqlobError {
    SqlobError::InaccessibleField {
        type_name: type_name.to_string(),
        field: field.to_string(),
        reason: reason.into(),
    }
}

/// Downcasts an instance for reading `field`.
///
/// # Errors
///
/// Returns [`SqlobError::InaccessibleField`] when `object` is not a `T`.
pub fn access<'a, T: Persist>(object: &'a AnyObject, field: &str) -> Result<&'a T> {
    object
        .downcast_ref::<T>()
        .ok_or_else(|| inaccessible(std::any::type_name::<T>(), field, "instance has another type"))
}

/// Downcasts an instance for writing `field`.
///
/// # Errors
///
/// Returns [`SqlobError::InaccessibleField`] when `object` is not a `T`.
pub fn access_mut<'a, T: Persist>(object: &'a mut AnyObject, field: &str) -> Result<&'a mut T> {
    object
        .downcast_mut::<T>()
        .ok_or_else(|| inaccessible(std::any::type_name::<T>(), field, "instance has another type"))
}

/// Reads a scalar attribute.
#[must_use]
pub fn scalar_ref<S: SqlScalar>(value: &S) -> FieldRef<'static> {
    FieldRef::Scalar(value.encode())
}

/// Reads a reference attribute.
#[must_use]
pub fn reference_ref<R: ReferenceField>(value: &R) -> FieldRef<'_> {
    FieldRef::Reference(value.get().map(|t| t as &AnyObject))
}

/// Decodes the value written to a scalar attribute.
///
/// # Errors
///
/// Returns [`SqlobError::InaccessibleField`] when handed a reference, and
/// [`SqlobError::Conversion`] when the value does not decode as `S`.
pub fn scalar_from<S: SqlScalar>(value: FieldValue, field: &str) -> Result<S> {
    match value {
        FieldValue::Scalar(v) => S::decode(v),
        FieldValue::Reference(_) => Err(inaccessible(
            std::any::type_name::<S>(),
            field,
            "expected a scalar value, got a reference",
        )),
    }
}

/// Decodes the value written to a reference attribute.
///
/// `Ok(None)` means the field cannot represent the value (an absent target
/// for a non-optional reference) and should be left as it is.
///
/// # Errors
///
/// Returns [`SqlobError::InaccessibleField`] when handed a scalar or an
/// object of another type.
pub fn reference_from<R: ReferenceField>(value: FieldValue, field: &str) -> Result<Option<R>> {
    let type_name = std::any::type_name::<R::Target>();
    match value {
        FieldValue::Reference(None) => Ok(R::from_target(None)),
        FieldValue::Reference(Some(object)) => {
            let target = object
                .downcast::<R::Target>()
                .map_err(|_| inaccessible(type_name, field, "referenced object has another type"))?;
            Ok(R::from_target(Some(*target)))
        }
        FieldValue::Scalar(_) => Err(inaccessible(
            type_name,
            field,
            "expected a reference, got a scalar value",
        )),
    }
}

/// Recovers a typed object from a loaded instance.
pub(crate) fn downcast<T: Persist>(object: Box<AnyObject>, type_name: &str) -> Result<T> {
    object
        .downcast::<T>()
        .map(|object| *object)
        .map_err(|_| SqlobError::Conversion {
            expected: std::any::type_name::<T>(),
            found: format!("an instance of {type_name}"),
        })
}
