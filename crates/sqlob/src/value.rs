//! SQL values and conversions between them and mapped field types.
//!
//! [`ToSqlValue`] converts criteria and update payloads into parameters.
//! [`SqlScalar`] is implemented by every Rust type that can be stored in a
//! scalar column and knows both directions of the conversion.

use chrono::{NaiveDate, NaiveDateTime};
use uuid::Uuid;

use crate::error::{Result, SqlobError};
use crate::types::ValueKind;

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// A SQL value that can be bound as a statement parameter or read from a row.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// NULL value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Float value.
    Float(f64),
    /// Text value.
    Text(String),
    /// Binary blob value.
    Blob(Vec<u8>),
}

impl SqlValue {
    /// Returns whether this is `NULL`.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the parameter placeholder.
    #[must_use]
    pub const fn placeholder() -> &'static str {
        "?"
    }

    /// Compares two values the way a database column would.
    ///
    /// Backends normalise what they store (booleans come back as integers
    /// from SQLite, integral floats may come back as integers), so values
    /// read from a row are compared to bound values after normalisation.
    #[must_use]
    pub fn same_storage(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Bool(a), Self::Int(b)) | (Self::Int(b), Self::Bool(a)) => i64::from(*a) == *b,
            #[allow(clippy::cast_precision_loss)]
            (Self::Float(a), Self::Int(b)) | (Self::Int(b), Self::Float(a)) => *a == *b as f64,
            _ => self == other,
        }
    }

    pub(crate) fn describe(&self) -> String {
        match self {
            Self::Null => String::from("NULL"),
            Self::Bool(b) => format!("boolean {b}"),
            Self::Int(n) => format!("integer {n}"),
            Self::Float(f) => format!("float {f}"),
            Self::Text(s) => format!("text '{s}'"),
            Self::Blob(b) => format!("blob of {} bytes", b.len()),
        }
    }
}

/// Trait for types that can be converted to SQL values.
pub trait ToSqlValue {
    /// Converts the value to a `SqlValue`.
    fn to_sql_value(self) -> SqlValue;
}

impl ToSqlValue for SqlValue {
    fn to_sql_value(self) -> SqlValue {
        self
    }
}

impl ToSqlValue for bool {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Bool(self)
    }
}

impl ToSqlValue for i64 {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Int(self)
    }
}

impl ToSqlValue for i32 {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Int(i64::from(self))
    }
}

impl ToSqlValue for i16 {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Int(i64::from(self))
    }
}

impl ToSqlValue for i8 {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Int(i64::from(self))
    }
}

impl ToSqlValue for f64 {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Float(self)
    }
}

impl ToSqlValue for f32 {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Float(f64::from(self))
    }
}

impl ToSqlValue for char {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Text(self.to_string())
    }
}

impl ToSqlValue for String {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Text(self)
    }
}

impl ToSqlValue for &str {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Text(String::from(self))
    }
}

impl ToSqlValue for Vec<u8> {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Blob(self)
    }
}

impl ToSqlValue for &[u8] {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Blob(self.to_vec())
    }
}

impl ToSqlValue for Uuid {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Text(self.to_string())
    }
}

impl ToSqlValue for NaiveDate {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Text(self.format(DATE_FORMAT).to_string())
    }
}

impl ToSqlValue for NaiveDateTime {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Text(self.format(DATE_TIME_FORMAT).to_string())
    }
}

impl<T: ToSqlValue> ToSqlValue for Option<T> {
    fn to_sql_value(self) -> SqlValue {
        match self {
            Some(v) => v.to_sql_value(),
            None => SqlValue::Null,
        }
    }
}

/// A Rust type stored in a single scalar column.
pub trait SqlScalar: Sized + Send + Sync + 'static {
    /// The value kind looked up in the type registry.
    const KIND: ValueKind;

    /// Whether `NULL` is a legal stored value.
    const NULLABLE: bool = false;

    /// Encodes this value for binding.
    fn encode(&self) -> SqlValue;

    /// Decodes a stored value.
    fn decode(value: SqlValue) -> Result<Self>;
}

fn mismatch<T>(expected: &'static str, value: &SqlValue) -> Result<T> {
    Err(SqlobError::Conversion {
        expected,
        found: value.describe(),
    })
}

fn decode_int<T: TryFrom<i64>>(expected: &'static str, value: SqlValue) -> Result<T> {
    match value {
        SqlValue::Int(n) => T::try_from(n).or_else(|_| mismatch(expected, &SqlValue::Int(n))),
        other => mismatch(expected, &other),
    }
}

impl SqlScalar for bool {
    const KIND: ValueKind = ValueKind::Bool;

    fn encode(&self) -> SqlValue {
        SqlValue::Bool(*self)
    }

    fn decode(value: SqlValue) -> Result<Self> {
        match value {
            SqlValue::Bool(b) => Ok(b),
            SqlValue::Int(n) => Ok(n != 0),
            other => mismatch("bool", &other),
        }
    }
}

macro_rules! impl_int_scalar {
    ($($ty:ty => $kind:ident),+ $(,)?) => {
        $(
            impl SqlScalar for $ty {
                const KIND: ValueKind = ValueKind::$kind;

                fn encode(&self) -> SqlValue {
                    SqlValue::Int(i64::from(*self))
                }

                fn decode(value: SqlValue) -> Result<Self> {
                    decode_int(stringify!($ty), value)
                }
            }
        )+
    };
}

impl_int_scalar!(i8 => I8, i16 => I16, i32 => I32, i64 => I64);

impl SqlScalar for f64 {
    const KIND: ValueKind = ValueKind::F64;

    fn encode(&self) -> SqlValue {
        SqlValue::Float(*self)
    }

    #[allow(clippy::cast_precision_loss)]
    fn decode(value: SqlValue) -> Result<Self> {
        match value {
            SqlValue::Float(f) => Ok(f),
            SqlValue::Int(n) => Ok(n as f64),
            other => mismatch("f64", &other),
        }
    }
}

impl SqlScalar for f32 {
    const KIND: ValueKind = ValueKind::F32;

    fn encode(&self) -> SqlValue {
        SqlValue::Float(f64::from(*self))
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    fn decode(value: SqlValue) -> Result<Self> {
        match value {
            SqlValue::Float(f) => Ok(f as f32),
            SqlValue::Int(n) => Ok(n as f32),
            other => mismatch("f32", &other),
        }
    }
}

impl SqlScalar for char {
    const KIND: ValueKind = ValueKind::Char;

    fn encode(&self) -> SqlValue {
        SqlValue::Text(self.to_string())
    }

    fn decode(value: SqlValue) -> Result<Self> {
        if let SqlValue::Text(s) = &value {
            let mut chars = s.chars();
            if let (Some(c), None) = (chars.next(), chars.next()) {
                return Ok(c);
            }
        }
        mismatch("char", &value)
    }
}

impl SqlScalar for String {
    const KIND: ValueKind = ValueKind::Text;

    fn encode(&self) -> SqlValue {
        SqlValue::Text(self.clone())
    }

    fn decode(value: SqlValue) -> Result<Self> {
        match value {
            SqlValue::Text(s) => Ok(s),
            other => mismatch("String", &other),
        }
    }
}

impl SqlScalar for Vec<u8> {
    const KIND: ValueKind = ValueKind::Bytes;

    fn encode(&self) -> SqlValue {
        SqlValue::Blob(self.clone())
    }

    fn decode(value: SqlValue) -> Result<Self> {
        match value {
            SqlValue::Blob(b) => Ok(b),
            other => mismatch("Vec<u8>", &other),
        }
    }
}

impl SqlScalar for Uuid {
    const KIND: ValueKind = ValueKind::Uuid;

    fn encode(&self) -> SqlValue {
        SqlValue::Text(self.to_string())
    }

    fn decode(value: SqlValue) -> Result<Self> {
        match &value {
            SqlValue::Text(s) => Self::parse_str(s).or_else(|_| mismatch("Uuid", &value)),
            SqlValue::Blob(b) => Self::from_slice(b).or_else(|_| mismatch("Uuid", &value)),
            _ => mismatch("Uuid", &value),
        }
    }
}

impl SqlScalar for NaiveDate {
    const KIND: ValueKind = ValueKind::Date;

    fn encode(&self) -> SqlValue {
        SqlValue::Text(self.format(DATE_FORMAT).to_string())
    }

    fn decode(value: SqlValue) -> Result<Self> {
        match &value {
            SqlValue::Text(s) => {
                Self::parse_from_str(s, DATE_FORMAT).or_else(|_| mismatch("NaiveDate", &value))
            }
            _ => mismatch("NaiveDate", &value),
        }
    }
}

impl SqlScalar for NaiveDateTime {
    const KIND: ValueKind = ValueKind::DateTime;

    fn encode(&self) -> SqlValue {
        SqlValue::Text(self.format(DATE_TIME_FORMAT).to_string())
    }

    fn decode(value: SqlValue) -> Result<Self> {
        match &value {
            SqlValue::Text(s) => Self::parse_from_str(s, DATE_TIME_FORMAT)
                .or_else(|_| mismatch("NaiveDateTime", &value)),
            _ => mismatch("NaiveDateTime", &value),
        }
    }
}

impl<T: SqlScalar> SqlScalar for Option<T> {
    const KIND: ValueKind = T::KIND;
    const NULLABLE: bool = true;

    fn encode(&self) -> SqlValue {
        self.as_ref().map_or(SqlValue::Null, T::encode)
    }

    fn decode(value: SqlValue) -> Result<Self> {
        match value {
            SqlValue::Null => Ok(None),
            other => T::decode(other).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_sql_value_conversions() {
        assert_eq!(true.to_sql_value(), SqlValue::Bool(true));
        assert_eq!(42_i32.to_sql_value(), SqlValue::Int(42));
        assert_eq!(2.5_f64.to_sql_value(), SqlValue::Float(2.5));
        assert_eq!("hello".to_sql_value(), SqlValue::Text(String::from("hello")));
        assert_eq!(None::<i32>.to_sql_value(), SqlValue::Null);
        assert_eq!(Some(42_i32).to_sql_value(), SqlValue::Int(42));
    }

    #[test]
    fn test_bool_decodes_from_integer() {
        assert!(bool::decode(SqlValue::Int(1)).unwrap());
        assert!(!bool::decode(SqlValue::Int(0)).unwrap());
        assert!(bool::decode(SqlValue::Text("yes".into())).is_err());
    }

    #[test]
    fn test_int_range_is_checked() {
        assert_eq!(i8::decode(SqlValue::Int(-7)).unwrap(), -7);
        assert!(matches!(
            i8::decode(SqlValue::Int(300)),
            Err(SqlobError::Conversion { expected: "i8", .. })
        ));
    }

    #[test]
    fn test_null_needs_option() {
        assert!(String::decode(SqlValue::Null).is_err());
        assert_eq!(Option::<String>::decode(SqlValue::Null).unwrap(), None);
        assert_eq!(
            Option::<String>::decode(SqlValue::Text("a".into())).unwrap(),
            Some(String::from("a"))
        );
    }

    #[test]
    fn test_char_requires_single_character() {
        assert_eq!(char::decode(SqlValue::Text("x".into())).unwrap(), 'x');
        assert!(char::decode(SqlValue::Text("xy".into())).is_err());
        assert!(char::decode(SqlValue::Text(String::new())).is_err());
    }

    #[test]
    fn test_temporal_text_format() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(date.encode(), SqlValue::Text("2024-02-29".into()));
        assert_eq!(NaiveDate::decode(date.encode()).unwrap(), date);

        let stamp = date.and_hms_milli_opt(13, 5, 9, 250).unwrap();
        assert_eq!(NaiveDateTime::decode(stamp.encode()).unwrap(), stamp);
    }

    #[test]
    fn test_uuid_from_text_and_blob() {
        let id = Uuid::new_v4();
        assert_eq!(Uuid::decode(id.encode()).unwrap(), id);
        assert_eq!(
            Uuid::decode(SqlValue::Blob(id.as_bytes().to_vec())).unwrap(),
            id
        );
    }

    #[test]
    fn test_same_storage_normalises_booleans() {
        assert!(SqlValue::Bool(true).same_storage(&SqlValue::Int(1)));
        assert!(SqlValue::Int(0).same_storage(&SqlValue::Bool(false)));
        assert!(SqlValue::Float(3.0).same_storage(&SqlValue::Int(3)));
        assert!(!SqlValue::Text("1".into()).same_storage(&SqlValue::Int(1)));
    }
}
