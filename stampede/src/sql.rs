//! The SQL surface of the harness.
//!
//! Statements are fixed strings with numbered placeholders; everything
//! variable travels as a [`Value`]. Statement text and column order match
//! the target schema's five tables.

use bytes::{BufMut, BytesMut};
use time::{OffsetDateTime, PrimitiveDateTime};
use tokio_postgres::types::{IsNull, ToSql, Type, to_sql_checked};

pub mod read;
pub mod write;

/// A single bind parameter.
///
/// Statements mix integers, floats, text, text arrays, timestamps and
/// JSON documents in one parameter list, so dispatch to the concrete
/// encoding happens here rather than in the caller's type signature.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// An integer column. Encoded as `int4` or `int8` to match the
    /// statement's resolved parameter type.
    Int(i64),
    /// A `double precision` column.
    Double(f64),
    /// A `text` or `varchar` column.
    Text(String),
    /// A `text[]` column.
    TextArray(Vec<String>),
    /// A timestamp column. Values are UTC; for `timestamp without time
    /// zone` the offset is dropped rather than converted.
    Timestamp(OffsetDateTime),
    /// A pre-rendered JSON document, accepted by `json`, `jsonb` and
    /// plain `text` columns.
    Json(String),
}

impl ToSql for Value {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            Value::Int(value) => {
                if *ty == Type::INT4 {
                    i32::try_from(*value)?.to_sql(ty, out)
                } else {
                    value.to_sql(ty, out)
                }
            }
            Value::Double(value) => value.to_sql(ty, out),
            Value::Text(value) => value.to_sql(ty, out),
            Value::TextArray(value) => value.to_sql(ty, out),
            Value::Timestamp(value) => {
                if *ty == Type::TIMESTAMP {
                    PrimitiveDateTime::new(value.date(), value.time()).to_sql(ty, out)
                } else {
                    value.to_sql(ty, out)
                }
            }
            Value::Json(body) => {
                if *ty == Type::JSONB {
                    // jsonb wire format carries a leading version byte.
                    out.put_u8(1);
                }
                out.extend_from_slice(body.as_bytes());
                Ok(IsNull::No)
            }
        }
    }

    fn accepts(_: &Type) -> bool {
        // Variant/type agreement is enforced by the statements themselves.
        true
    }

    to_sql_checked!();
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<Vec<String>> for Value {
    fn from(value: Vec<String>) -> Self {
        Value::TextArray(value)
    }
}

impl From<OffsetDateTime> for Value {
    fn from(value: OffsetDateTime) -> Self {
        Value::Timestamp(value)
    }
}

/// Borrow a parameter list the way `tokio_postgres::Client::query` wants
/// it.
#[must_use]
pub fn borrow_params(params: &[Value]) -> Vec<&(dyn ToSql + Sync)> {
    params.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;
    use tokio_postgres::types::{IsNull, ToSql, Type};

    use super::Value;

    #[test]
    fn int_narrows_for_int4() {
        let mut wide = BytesMut::new();
        let mut narrow = BytesMut::new();
        let value = Value::Int(7);
        value.to_sql(&Type::INT8, &mut wide).expect("int8 encodes");
        value
            .to_sql(&Type::INT4, &mut narrow)
            .expect("int4 encodes");
        assert_eq!(wide.len(), 8);
        assert_eq!(narrow.len(), 4);
    }

    #[test]
    fn int_refuses_lossy_narrowing() {
        let mut out = BytesMut::new();
        let value = Value::Int(i64::from(i32::MAX) + 1);
        assert!(value.to_sql(&Type::INT4, &mut out).is_err());
    }

    #[test]
    fn jsonb_carries_version_byte() {
        let mut json = BytesMut::new();
        let mut jsonb = BytesMut::new();
        let value = Value::Json(r#"{"a":1}"#.to_string());
        let is_null = value.to_sql(&Type::JSON, &mut json).expect("json encodes");
        assert!(matches!(is_null, IsNull::No));
        value
            .to_sql(&Type::JSONB, &mut jsonb)
            .expect("jsonb encodes");
        assert_eq!(&json[..], br#"{"a":1}"#);
        assert_eq!(jsonb[0], 1);
        assert_eq!(&jsonb[1..], br#"{"a":1}"#);
    }
}
