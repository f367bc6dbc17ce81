//! Type registry: the vocabulary shared by mapped fields and a SQL dialect.
//!
//! Every scalar field declares a [`ValueKind`]. A [`TypeRegistry`] maps each
//! kind to one [`SqlobType`] carrying the dialect's type name and its
//! [`SqlTypeCode`]. Registries are built once (from the built-in dialect
//! tables or a [`DialectConfig`]) and are read-only afterwards.

use core::fmt;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SqlobError};

/// Application-side kind of a scalar value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// `bool`.
    Bool,
    /// `i8`.
    I8,
    /// `i16`.
    I16,
    /// `i32`.
    I32,
    /// `i64`.
    I64,
    /// `f32`.
    F32,
    /// `f64`.
    F64,
    /// `char`.
    Char,
    /// `String`.
    Text,
    /// `Vec<u8>`.
    Bytes,
    /// `uuid::Uuid`; also the kind of primary keys and reference columns.
    Uuid,
    /// `chrono::NaiveDate`.
    Date,
    /// `chrono::NaiveDateTime`.
    DateTime,
}

impl ValueKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 13] = [
        Self::Bool,
        Self::I8,
        Self::I16,
        Self::I32,
        Self::I64,
        Self::F32,
        Self::F64,
        Self::Char,
        Self::Text,
        Self::Bytes,
        Self::Uuid,
        Self::Date,
        Self::DateTime,
    ];

    /// Returns the configuration name of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::Char => "char",
            Self::Text => "text",
            Self::Bytes => "bytes",
            Self::Uuid => "uuid",
            Self::Date => "date",
            Self::DateTime => "date_time",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Numeric SQL type codes, compatible with the JDBC `java.sql.Types` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlTypeCode {
    /// `BIT`
    Bit,
    /// `TINYINT`
    Tinyint,
    /// `SMALLINT`
    Smallint,
    /// `INTEGER`
    Integer,
    /// `BIGINT`
    Bigint,
    /// `REAL`
    Real,
    /// `FLOAT`
    Float,
    /// `DOUBLE`
    Double,
    /// `NUMERIC`
    Numeric,
    /// `DECIMAL`
    Decimal,
    /// `CHAR`
    Char,
    /// `VARCHAR`
    Varchar,
    /// `LONGVARCHAR`
    Longvarchar,
    /// `NCHAR`
    Nchar,
    /// `NVARCHAR`
    Nvarchar,
    /// `DATE`
    Date,
    /// `TIME`
    Time,
    /// `TIMESTAMP`
    Timestamp,
    /// `BINARY`
    Binary,
    /// `VARBINARY`
    Varbinary,
    /// `LONGVARBINARY`
    Longvarbinary,
    /// `BLOB`
    Blob,
    /// `CLOB`
    Clob,
    /// `BOOLEAN`
    Boolean,
    /// Anything dialect specific.
    Other,
}

impl SqlTypeCode {
    /// Returns the numeric code.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Bit => -7,
            Self::Tinyint => -6,
            Self::Smallint => 5,
            Self::Integer => 4,
            Self::Bigint => -5,
            Self::Real => 7,
            Self::Float => 6,
            Self::Double => 8,
            Self::Numeric => 2,
            Self::Decimal => 3,
            Self::Char => 1,
            Self::Varchar => 12,
            Self::Longvarchar => -1,
            Self::Nchar => -15,
            Self::Nvarchar => -9,
            Self::Date => 91,
            Self::Time => 92,
            Self::Timestamp => 93,
            Self::Binary => -2,
            Self::Varbinary => -3,
            Self::Longvarbinary => -4,
            Self::Blob => 2004,
            Self::Clob => 2005,
            Self::Boolean => 16,
            Self::Other => 1111,
        }
    }

    /// Derives the code from a SQL type specification such as `VARCHAR(64)`.
    ///
    /// Only the leading type name is considered; length and precision
    /// arguments are ignored.
    #[must_use]
    pub fn from_sql_type(spec: &str) -> Option<Self> {
        let head = spec
            .trim()
            .split(|c: char| c == '(' || c.is_whitespace())
            .next()
            .unwrap_or_default()
            .to_ascii_uppercase();
        let code = match head.as_str() {
            "BIT" => Self::Bit,
            "TINYINT" => Self::Tinyint,
            "SMALLINT" | "INT2" => Self::Smallint,
            "INTEGER" | "INT" | "INT4" | "MEDIUMINT" => Self::Integer,
            "BIGINT" | "INT8" => Self::Bigint,
            "REAL" | "FLOAT4" => Self::Real,
            "FLOAT" => Self::Float,
            "DOUBLE" | "FLOAT8" => Self::Double,
            "NUMERIC" => Self::Numeric,
            "DECIMAL" => Self::Decimal,
            "CHAR" | "CHARACTER" => Self::Char,
            "VARCHAR" | "TEXT" | "VARCHAR2" => Self::Varchar,
            "LONGVARCHAR" => Self::Longvarchar,
            "NCHAR" => Self::Nchar,
            "NVARCHAR" => Self::Nvarchar,
            "DATE" => Self::Date,
            "TIME" => Self::Time,
            "TIMESTAMP" | "DATETIME" => Self::Timestamp,
            "BINARY" => Self::Binary,
            "VARBINARY" | "BYTEA" => Self::Varbinary,
            "LONGVARBINARY" => Self::Longvarbinary,
            "BLOB" => Self::Blob,
            "CLOB" => Self::Clob,
            "BOOLEAN" | "BOOL" => Self::Boolean,
            "UUID" | "JSON" | "JSONB" => Self::Other,
            _ => return None,
        };
        Some(code)
    }
}

/// A registered mapping between a value kind and a dialect SQL type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlobType {
    /// Application value kind.
    pub kind: ValueKind,
    /// SQL type as written in DDL, e.g. `VARCHAR(1024)`.
    pub sql_type: String,
    /// Type code.
    pub code: SqlTypeCode,
}

impl fmt::Display for SqlobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {} ({})", self.kind, self.sql_type, self.code.code())
    }
}

/// Mapping from value kinds to dialect types.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: Vec<SqlobType>,
}

impl TypeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self { types: Vec::new() }
    }

    /// Registers `kind` as `sql_type`, deriving the type code from its name.
    ///
    /// # Errors
    ///
    /// Returns [`SqlobError::UnsupportedType`] when the type name is unknown.
    pub fn register(&mut self, kind: ValueKind, sql_type: impl Into<String>) -> Result<()> {
        let sql_type = sql_type.into();
        let code = SqlTypeCode::from_sql_type(&sql_type)
            .ok_or_else(|| SqlobError::UnsupportedType(sql_type.clone()))?;
        self.register_with_code(kind, sql_type, code);
        Ok(())
    }

    /// Registers `kind` with an explicit type code.
    ///
    /// A kind maps to a single type: registering it again replaces the
    /// previous mapping.
    pub fn register_with_code(
        &mut self,
        kind: ValueKind,
        sql_type: impl Into<String>,
        code: SqlTypeCode,
    ) {
        let entry = SqlobType {
            kind,
            sql_type: sql_type.into(),
            code,
        };
        match self.types.iter_mut().find(|t| t.kind == kind) {
            Some(existing) => *existing = entry,
            None => self.types.push(entry),
        }
    }

    /// Looks up the type registered for a value kind.
    ///
    /// # Errors
    ///
    /// Returns [`SqlobError::UnsupportedType`] when `kind` has no mapping.
    pub fn lookup(&self, kind: ValueKind) -> Result<&SqlobType> {
        self.types
            .iter()
            .find(|t| t.kind == kind)
            .ok_or_else(|| SqlobError::UnsupportedType(format!("value kind {kind}")))
    }

    /// Looks up the earliest registered type carrying `code`.
    ///
    /// # Errors
    ///
    /// Returns [`SqlobError::UnsupportedType`] when no type has this code.
    pub fn lookup_code(&self, code: SqlTypeCode) -> Result<&SqlobType> {
        self.types
            .iter()
            .find(|t| t.code == code)
            .ok_or_else(|| SqlobError::UnsupportedType(format!("type code {}", code.code())))
    }

    /// Returns the registered types in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &SqlobType> {
        self.types.iter()
    }

    /// Returns the value kinds without a mapping.
    #[must_use]
    pub fn missing_kinds(&self) -> Vec<ValueKind> {
        ValueKind::ALL
            .into_iter()
            .filter(|k| self.types.iter().all(|t| t.kind != *k))
            .collect()
    }

    /// Built-in SQLite mapping.
    #[must_use]
    pub fn sqlite() -> Self {
        Self::from_table(&[
            (ValueKind::Bool, "BOOLEAN", SqlTypeCode::Boolean),
            (ValueKind::I8, "TINYINT", SqlTypeCode::Tinyint),
            (ValueKind::I16, "SMALLINT", SqlTypeCode::Smallint),
            (ValueKind::I32, "INTEGER", SqlTypeCode::Integer),
            (ValueKind::I64, "BIGINT", SqlTypeCode::Bigint),
            (ValueKind::F32, "REAL", SqlTypeCode::Real),
            (ValueKind::F64, "DOUBLE", SqlTypeCode::Double),
            (ValueKind::Char, "NCHAR(1)", SqlTypeCode::Nchar),
            (ValueKind::Text, "VARCHAR(1024)", SqlTypeCode::Varchar),
            (ValueKind::Bytes, "BLOB", SqlTypeCode::Blob),
            (ValueKind::Uuid, "CHAR(36)", SqlTypeCode::Char),
            (ValueKind::Date, "DATE", SqlTypeCode::Date),
            (ValueKind::DateTime, "TIMESTAMP", SqlTypeCode::Timestamp),
        ])
    }

    /// Built-in PostgreSQL mapping.
    #[must_use]
    pub fn postgres() -> Self {
        Self::from_table(&[
            (ValueKind::Bool, "BOOLEAN", SqlTypeCode::Boolean),
            (ValueKind::I8, "SMALLINT", SqlTypeCode::Smallint),
            (ValueKind::I16, "SMALLINT", SqlTypeCode::Smallint),
            (ValueKind::I32, "INTEGER", SqlTypeCode::Integer),
            (ValueKind::I64, "BIGINT", SqlTypeCode::Bigint),
            (ValueKind::F32, "REAL", SqlTypeCode::Real),
            (ValueKind::F64, "DOUBLE PRECISION", SqlTypeCode::Double),
            (ValueKind::Char, "CHAR(1)", SqlTypeCode::Char),
            (ValueKind::Text, "VARCHAR(1024)", SqlTypeCode::Varchar),
            (ValueKind::Bytes, "BYTEA", SqlTypeCode::Varbinary),
            (ValueKind::Uuid, "UUID", SqlTypeCode::Other),
            (ValueKind::Date, "DATE", SqlTypeCode::Date),
            (ValueKind::DateTime, "TIMESTAMP", SqlTypeCode::Timestamp),
        ])
    }

    /// Builds a registry from a dialect configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SqlobError::UnsupportedType`] when a configured SQL type
    /// name is not recognised.
    pub fn from_config(config: &DialectConfig) -> Result<Self> {
        let mut registry = Self::new();
        for (kind, sql_type) in &config.types {
            registry.register(*kind, sql_type.clone())?;
        }
        Ok(registry)
    }

    fn from_table(table: &[(ValueKind, &str, SqlTypeCode)]) -> Self {
        let mut registry = Self::new();
        for (kind, sql_type, code) in table {
            registry.register_with_code(*kind, *sql_type, *code);
        }
        registry
    }
}

fn default_primary_key() -> String {
    String::from("id")
}

/// A dialect definition loaded from JSON.
///
/// ```json
/// {"name": "sqlite", "primary_key": "id", "types": {"text": "VARCHAR(255)"}}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialectConfig {
    /// Dialect name, used in log output.
    pub name: String,
    /// Primary key column name.
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
    /// SQL type per value kind.
    #[serde(default)]
    pub types: BTreeMap<ValueKind, String>,
}

impl DialectConfig {
    /// Parses a configuration from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`SqlobError::Configuration`] on malformed input.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_from_type_spec() {
        assert_eq!(
            SqlTypeCode::from_sql_type("VARCHAR(64)"),
            Some(SqlTypeCode::Varchar)
        );
        assert_eq!(
            SqlTypeCode::from_sql_type("double precision"),
            Some(SqlTypeCode::Double)
        );
        assert_eq!(SqlTypeCode::from_sql_type("bytea"), Some(SqlTypeCode::Varbinary));
        assert_eq!(SqlTypeCode::from_sql_type("GEOMETRY"), None);
        assert_eq!(SqlTypeCode::Timestamp.code(), 93);
    }

    #[test]
    fn test_lookup_both_ways() {
        let registry = TypeRegistry::sqlite();
        let text = registry.lookup(ValueKind::Text).unwrap();
        assert_eq!(text.sql_type, "VARCHAR(1024)");
        assert_eq!(registry.lookup_code(text.code).unwrap().kind, ValueKind::Text);
    }

    #[test]
    fn test_lookup_code_returns_earliest() {
        let registry = TypeRegistry::postgres();
        assert_eq!(
            registry.lookup_code(SqlTypeCode::Smallint).unwrap().kind,
            ValueKind::I8
        );
    }

    #[test]
    fn test_reregistration_replaces() {
        let mut registry = TypeRegistry::sqlite();
        registry.register(ValueKind::Text, "TEXT").unwrap();
        assert_eq!(registry.lookup(ValueKind::Text).unwrap().sql_type, "TEXT");
        assert_eq!(registry.iter().filter(|t| t.kind == ValueKind::Text).count(), 1);
    }

    #[test]
    fn test_missing_mapping_is_unsupported() {
        let registry = TypeRegistry::new();
        assert!(matches!(
            registry.lookup(ValueKind::Bool),
            Err(SqlobError::UnsupportedType(_))
        ));
        assert!(matches!(
            registry.lookup_code(SqlTypeCode::Blob),
            Err(SqlobError::UnsupportedType(_))
        ));
        let mut registry = TypeRegistry::new();
        assert!(registry.register(ValueKind::Bool, "WHATEVER").is_err());
    }

    #[test]
    fn test_dialect_config_from_json() {
        let config = DialectConfig::from_json(
            r#"{"name": "tiny", "types": {"text": "VARCHAR(255)", "uuid": "CHAR(36)"}}"#,
        )
        .unwrap();
        assert_eq!(config.primary_key, "id");

        let registry = TypeRegistry::from_config(&config).unwrap();
        assert_eq!(
            registry.lookup(ValueKind::Text).unwrap().sql_type,
            "VARCHAR(255)"
        );
        assert!(registry.missing_kinds().contains(&ValueKind::Bool));
        assert!(!registry.missing_kinds().contains(&ValueKind::Uuid));
    }

    #[test]
    fn test_dialect_config_rejects_unknown_kind() {
        let err = DialectConfig::from_json(r#"{"name": "x", "types": {"decimal": "NUMERIC"}}"#)
            .unwrap_err();
        assert!(matches!(err, SqlobError::Configuration(_)));
    }

    #[test]
    fn test_builtins_cover_every_kind() {
        assert!(TypeRegistry::sqlite().missing_kinds().is_empty());
        assert!(TypeRegistry::postgres().missing_kinds().is_empty());
    }
}
