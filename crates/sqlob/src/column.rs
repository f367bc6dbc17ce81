//! Column descriptors and the factories building them from attributes.

use core::fmt;

use crate::connection::Row;
use crate::error::{Result, SqlobError};
use crate::persist::{Attribute, AttributeKind, TypeKey};
use crate::types::{SqlTypeCode, TypeRegistry, ValueKind};
use crate::value::SqlValue;

/// Reads a column value from a row, for dialects whose storage needs
/// decoding before it can be handed to a field.
pub type Extractor = fn(&Row, &str) -> Result<SqlValue>;

/// A column of a mapped table.
#[derive(Debug, Clone)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// SQL type as written in DDL.
    pub sql_type: String,
    /// Scalar or reference.
    pub kind: ColumnKind,
}

/// How a column stores its value.
#[derive(Clone)]
pub enum ColumnKind {
    /// The field value itself.
    Scalar {
        /// Value kind of the field.
        value_kind: ValueKind,
        /// Type code of the column.
        code: SqlTypeCode,
        /// Whether NULL is allowed.
        nullable: bool,
        /// Custom decoding.
        extractor: Option<Extractor>,
    },
    /// The identifier of a row of another mapped type.
    Reference {
        /// The referenced type.
        target: TypeKey,
        /// Whether NULL is allowed.
        nullable: bool,
    },
}

impl fmt::Debug for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar {
                value_kind,
                code,
                nullable,
                extractor,
            } => f
                .debug_struct("Scalar")
                .field("value_kind", value_kind)
                .field("code", code)
                .field("nullable", nullable)
                .field("custom_extractor", &extractor.is_some())
                .finish(),
            Self::Reference { target, nullable } => f
                .debug_struct("Reference")
                .field("target", target)
                .field("nullable", nullable)
                .finish(),
        }
    }
}

impl Column {
    /// Returns whether the column holds a foreign key.
    #[must_use]
    pub const fn is_reference(&self) -> bool {
        matches!(self.kind, ColumnKind::Reference { .. })
    }

    /// Returns the column definition used in `CREATE TABLE`.
    #[must_use]
    pub fn definition(&self) -> String {
        format!("{} {}", self.name, self.sql_type)
    }

    /// Reads this column's value from a row.
    ///
    /// Returns `None` when the row does not carry the column.
    ///
    /// # Errors
    ///
    /// Propagates failures of a custom extractor.
    pub fn extract(&self, row: &Row) -> Result<Option<SqlValue>> {
        if row.get(&self.name).is_none() {
            return Ok(None);
        }
        match &self.kind {
            ColumnKind::Scalar {
                extractor: Some(extract),
                ..
            } => extract(row, &self.name).map(Some),
            _ => Ok(row.get(&self.name).cloned()),
        }
    }
}

/// Builds columns for the attributes it accepts.
pub trait ColumnFactory: Send + Sync {
    /// Returns whether this factory can build a column for `attribute`.
    fn accepts(&self, attribute: &Attribute) -> bool;

    /// Builds the column.
    ///
    /// # Errors
    ///
    /// Returns [`SqlobError::UnsupportedType`] when the registry has no
    /// mapping the column needs.
    fn build(&self, attribute: &Attribute, types: &TypeRegistry) -> Result<Column>;
}

fn sql_type_of(attribute: &Attribute, kind: ValueKind, types: &TypeRegistry) -> Result<(String, SqlTypeCode)> {
    match attribute.sql_type {
        Some(spec) => {
            let code = SqlTypeCode::from_sql_type(spec)
                .ok_or_else(|| SqlobError::UnsupportedType(spec.to_string()))?;
            Ok((spec.to_string(), code))
        }
        None => {
            let mapped = types.lookup(kind)?;
            Ok((mapped.sql_type.clone(), mapped.code))
        }
    }
}

/// Builds foreign key columns for reference attributes.
///
/// The column type is the registry's identifier type.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReferenceColumnFactory;

impl ColumnFactory for ReferenceColumnFactory {
    fn accepts(&self, attribute: &Attribute) -> bool {
        attribute.is_reference()
    }

    fn build(&self, attribute: &Attribute, types: &TypeRegistry) -> Result<Column> {
        let AttributeKind::Reference { target, nullable } = attribute.kind else {
            return Err(SqlobError::NoApplicableColumnFactory {
                type_name: String::from("reference column"),
                field: attribute.name.to_string(),
            });
        };
        let (sql_type, _) = sql_type_of(attribute, ValueKind::Uuid, types)?;
        Ok(Column {
            name: attribute.column_name().to_string(),
            sql_type,
            kind: ColumnKind::Reference { target, nullable },
        })
    }
}

/// Builds columns for scalar attributes.
#[derive(Debug, Default, Clone)]
pub struct ScalarColumnFactory {
    extractors: Vec<(ValueKind, Extractor)>,
}

impl ScalarColumnFactory {
    /// Creates a factory without custom extractors.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            extractors: Vec::new(),
        }
    }

    /// Decodes every column of `kind` with `extractor`.
    #[must_use]
    pub fn with_extractor(mut self, kind: ValueKind, extractor: Extractor) -> Self {
        self.extractors.retain(|(k, _)| *k != kind);
        self.extractors.push((kind, extractor));
        self
    }

    fn extractor(&self, kind: ValueKind) -> Option<Extractor> {
        self.extractors
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, e)| *e)
    }
}

impl ColumnFactory for ScalarColumnFactory {
    fn accepts(&self, attribute: &Attribute) -> bool {
        matches!(attribute.kind, AttributeKind::Scalar { .. })
    }

    fn build(&self, attribute: &Attribute, types: &TypeRegistry) -> Result<Column> {
        let AttributeKind::Scalar { kind, nullable } = attribute.kind else {
            return Err(SqlobError::NoApplicableColumnFactory {
                type_name: String::from("scalar column"),
                field: attribute.name.to_string(),
            });
        };
        let (sql_type, code) = sql_type_of(attribute, kind, types)?;
        Ok(Column {
            name: attribute.column_name().to_string(),
            sql_type,
            kind: ColumnKind::Scalar {
                value_kind: kind,
                code,
                nullable,
                extractor: self.extractor(kind),
            },
        })
    }
}

/// Reads booleans stored as integers, `'true'`/`'false'` text or `'t'`/`'f'`.
///
/// # Errors
///
/// Returns [`SqlobError::Conversion`] for any other value.
pub fn lenient_bool(row: &Row, column: &str) -> Result<SqlValue> {
    let value = row.get(column).cloned().unwrap_or(SqlValue::Null);
    match value {
        SqlValue::Null | SqlValue::Bool(_) => Ok(value),
        SqlValue::Int(n) => Ok(SqlValue::Bool(n != 0)),
        SqlValue::Text(ref s) => match s.to_ascii_lowercase().as_str() {
            "true" | "t" | "1" => Ok(SqlValue::Bool(true)),
            "false" | "f" | "0" => Ok(SqlValue::Bool(false)),
            _ => Err(SqlobError::Conversion {
                expected: "bool",
                found: value.describe(),
            }),
        },
        other => Err(SqlobError::Conversion {
            expected: "bool",
            found: other.describe(),
        }),
    }
}
