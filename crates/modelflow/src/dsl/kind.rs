// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Type system of the relational DSL
//!
//! Every column carries a [`Kind`] describing the data type of the values it
//! produces. Literal payloads are held as [`Value`] variants from which the
//! kind is reflected. Kinds are ordered by *cardinality* which drives numeric
//! promotion in arithmetic expressions (the wider operand kind wins).

use chrono::{NaiveDate, NaiveDateTime};
use serde::de::{self, Deserializer, SeqAccess};
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};

/// Data type of a DSL column.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    /// Logical true/false
    Boolean,
    /// Signed integer
    Integer,
    /// Floating point number
    Float,
    /// Fixed precision number
    Decimal,
    /// Character string
    String,
    /// Calendar date
    Date,
    /// Date and time of day
    Timestamp,
    /// Homogeneous array of the element kind
    Array(Box<Kind>),
}

impl Kind {
    /// Promotion rank of this kind.
    ///
    /// Arithmetic expressions assume the kind of their widest operand, where
    /// width is this cardinality order.
    pub fn cardinality(&self) -> u8 {
        match self {
            Self::Boolean => 1,
            Self::Integer => 2,
            Self::Float => 3,
            Self::Decimal => 4,
            Self::String => 5,
            Self::Date => 6,
            Self::Timestamp => 7,
            Self::Array(_) => 8,
        }
    }

    /// True for kinds participating in arithmetic promotion.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer | Self::Float | Self::Decimal)
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Boolean => write!(f, "Boolean"),
            Self::Integer => write!(f, "Integer"),
            Self::Float => write!(f, "Float"),
            Self::Decimal => write!(f, "Decimal"),
            Self::String => write!(f, "String"),
            Self::Date => write!(f, "Date"),
            Self::Timestamp => write!(f, "Timestamp"),
            Self::Array(element) => write!(f, "Array<{element}>"),
        }
    }
}

/// Native payload of a DSL literal (and of ETL ordinal bounds).
///
/// Equality and hashing are structural with floats compared by bit pattern,
/// so values (and the expressions containing them) can be used as map keys.
#[derive(Clone, Debug)]
pub enum Value {
    /// Logical true/false
    Boolean(bool),
    /// Signed integer
    Integer(i64),
    /// Floating point number
    Float(f64),
    /// Character string
    String(String),
    /// Calendar date
    Date(NaiveDate),
    /// Date and time of day
    Timestamp(NaiveDateTime),
    /// Array of values
    Array(Vec<Value>),
}

impl Value {
    /// Reflect the [`Kind`] of this value.
    ///
    /// Array kinds are derived from the first element; the element kind of an
    /// empty array defaults to [`Kind::Integer`].
    pub fn kind(&self) -> Kind {
        match self {
            Self::Boolean(_) => Kind::Boolean,
            Self::Integer(_) => Kind::Integer,
            Self::Float(_) => Kind::Float,
            Self::String(_) => Kind::String,
            Self::Date(_) => Kind::Date,
            Self::Timestamp(_) => Kind::Timestamp,
            Self::Array(values) => Kind::Array(Box::new(
                values.first().map_or(Kind::Integer, Value::kind),
            )),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Date(a), Self::Date(b)) => a == b,
            (Self::Timestamp(a), Self::Timestamp(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl std::hash::Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Boolean(v) => v.hash(state),
            Self::Integer(v) => v.hash(state),
            Self::Float(v) => v.to_bits().hash(state),
            Self::String(v) => v.hash(state),
            Self::Date(v) => v.hash(state),
            Self::Timestamp(v) => v.hash(state),
            Self::Array(v) => v.hash(state),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Integer(value.into())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Self::Timestamp(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(values: Vec<T>) -> Self {
        Self::Array(values.into_iter().map(Into::into).collect())
    }
}

// Values serialize as their native JSON scalar (no type tagging) so that tag
// documents stay bit-exact with the published schema. Dates and timestamps
// render as ISO strings and deserialize back as plain strings.
impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Boolean(v) => serializer.serialize_bool(*v),
            Self::Integer(v) => serializer.serialize_i64(*v),
            Self::Float(v) => serializer.serialize_f64(*v),
            Self::String(v) => serializer.serialize_str(v),
            Self::Date(v) => serializer.serialize_str(&v.format("%Y-%m-%d").to_string()),
            Self::Timestamp(v) => {
                serializer.serialize_str(&v.format("%Y-%m-%dT%H:%M:%S%.6f").to_string())
            }
            Self::Array(values) => {
                let mut seq = serializer.serialize_seq(Some(values.len()))?;
                for value in values {
                    seq.serialize_element(value)?;
                }
                seq.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct NativeVisitor;

        impl<'de> de::Visitor<'de> for NativeVisitor {
            type Value = Value;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a native scalar or an array of native scalars")
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> std::result::Result<Value, E> {
                Ok(Value::Boolean(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Value, E> {
                Ok(Value::Integer(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Value, E> {
                i64::try_from(v)
                    .map(Value::Integer)
                    .map_err(|_| E::custom("integer out of range"))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<Value, E> {
                Ok(Value::Float(v))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Value, E> {
                Ok(Value::String(v.to_string()))
            }

            fn visit_seq<A: SeqAccess<'de>>(
                self,
                mut seq: A,
            ) -> std::result::Result<Value, A::Error> {
                let mut values = Vec::new();
                while let Some(value) = seq.next_element()? {
                    values.push(value);
                }
                Ok(Value::Array(values))
            }
        }

        deserializer.deserialize_any(NativeVisitor)
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cardinality_order() {
        assert!(Kind::Integer.cardinality() < Kind::Float.cardinality());
        assert!(Kind::Float.cardinality() < Kind::Decimal.cardinality());
        assert!(Kind::Boolean.cardinality() < Kind::Integer.cardinality());
    }

    #[test]
    fn test_reflection() {
        assert_eq!(Value::from(42i64).kind(), Kind::Integer);
        assert_eq!(Value::from(1.5).kind(), Kind::Float);
        assert_eq!(Value::from("x").kind(), Kind::String);
        assert_eq!(
            Value::from(vec![1i64, 2]).kind(),
            Kind::Array(Box::new(Kind::Integer))
        );
    }

    #[test]
    fn test_float_identity() {
        assert_eq!(Value::from(0.1 + 0.2), Value::from(0.1 + 0.2));
        assert_ne!(Value::from(1.0), Value::from(2.0));
    }

    #[test]
    fn test_native_serialization() {
        assert_eq!(serde_json::to_string(&Value::from(42i64)).unwrap(), "42");
        assert_eq!(serde_json::to_string(&Value::from("x")).unwrap(), "\"x\"");
        let back: Value = serde_json::from_str("42").unwrap();
        assert_eq!(back, Value::Integer(42));
    }
}
