//! Schema types and schema-typed runtime values.
//!
//! [`WireType`] is the vocabulary a protocol definition is written in;
//! [`Value`] is the dynamically-typed value that travels through the engine.
//! The codec encodes a `Value` *against* a `WireType` — the schema, not the
//! value, is the source of truth on the wire.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A schema type as it appears in a message signature.
///
/// Serde-serializable so a protocol definition can be exchanged as JSON
/// during the handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum WireType {
    /// No value (the response type of a void message).
    Null,
    Boolean,
    Int,
    Long,
    Float,
    Double,
    /// Variable-length byte sequence.
    Bytes,
    String,
    /// Fixed-size byte sequence.
    Fixed { name: String, size: usize },
    /// One symbol out of a closed set.
    Enum { name: String, symbols: Vec<String> },
    /// Named record with ordered fields.
    Record { name: String, fields: Vec<Field> },
    /// Homogeneous sequence.
    Array { items: Box<WireType> },
    /// String-keyed mapping.
    Map { values: Box<WireType> },
}

/// One named, typed record field or request parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "field_type")]
    pub ty: WireType,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: WireType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

impl WireType {
    /// Display name used in logs and codec errors.
    pub fn type_name(&self) -> &str {
        match self {
            WireType::Null => "null",
            WireType::Boolean => "boolean",
            WireType::Int => "int",
            WireType::Long => "long",
            WireType::Float => "float",
            WireType::Double => "double",
            WireType::Bytes => "bytes",
            WireType::String => "string",
            WireType::Fixed { name, .. } => name,
            WireType::Enum { name, .. } => name,
            WireType::Record { name, .. } => name,
            WireType::Array { .. } => "array",
            WireType::Map { .. } => "map",
        }
    }
}

/// A schema-typed runtime value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Bytes(Vec<u8>),
    String(String),
    /// Fixed-size byte sequence; length is checked against the schema.
    Fixed(Vec<u8>),
    /// Enum symbol; must be one of the schema's symbols.
    Enum(String),
    /// Record instance: type name plus fields in declaration order.
    Record {
        name: String,
        fields: Vec<(String, Value)>,
    },
    Array(Vec<Value>),
    Map(Vec<(String, Value)>),
}

impl Value {
    /// Convenience constructor for a record value.
    pub fn record(name: impl Into<String>, fields: Vec<(&str, Value)>) -> Self {
        Value::Record {
            name: name.into(),
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }
    }

    /// Look up a record field by name.
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Record { fields, .. } => {
                fields.iter().find(|(k, _)| k == name).map(|(_, v)| v)
            }
            _ => None,
        }
    }

    /// Shallow check that this value can be encoded with the given type.
    ///
    /// Used to classify handler failures against a message's declared error
    /// set: only a value that is an instance of a declared type crosses the
    /// wire typed.
    pub fn is_instance_of(&self, ty: &WireType) -> bool {
        match (self, ty) {
            (Value::Null, WireType::Null) => true,
            (Value::Boolean(_), WireType::Boolean) => true,
            (Value::Int(_), WireType::Int) => true,
            (Value::Long(_), WireType::Long) => true,
            (Value::Float(_), WireType::Float) => true,
            (Value::Double(_), WireType::Double) => true,
            (Value::Bytes(_), WireType::Bytes) => true,
            (Value::String(_), WireType::String) => true,
            (Value::Fixed(data), WireType::Fixed { size, .. }) => data.len() == *size,
            (Value::Enum(symbol), WireType::Enum { symbols, .. }) => symbols.contains(symbol),
            (Value::Record { name, .. }, WireType::Record { name: ty_name, .. }) => {
                name == ty_name
            }
            (Value::Array(_), WireType::Array { .. }) => true,
            (Value::Map(_), WireType::Map { .. }) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Long(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Bytes(data) | Value::Fixed(data) => write!(f, "<{} bytes>", data.len()),
            Value::String(s) => write!(f, "{s}"),
            Value::Enum(symbol) => write!(f, "{symbol}"),
            Value::Record { name, fields } => {
                write!(f, "{name}{{")?;
                for (i, (k, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Map(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_error_type() -> WireType {
        WireType::Record {
            name: "TestError".to_string(),
            fields: vec![Field::new("message", WireType::String)],
        }
    }

    #[test]
    fn test_instance_checks_primitives() {
        assert!(Value::String("hi".into()).is_instance_of(&WireType::String));
        assert!(Value::Long(1).is_instance_of(&WireType::Long));
        assert!(!Value::Long(1).is_instance_of(&WireType::Int));
        assert!(!Value::String("hi".into()).is_instance_of(&WireType::Bytes));
    }

    #[test]
    fn test_instance_check_record_by_name() {
        let err = Value::record("TestError", vec![("message", "boom".into())]);
        assert!(err.is_instance_of(&test_error_type()));

        let other = Value::record("OtherError", vec![("message", "boom".into())]);
        assert!(!other.is_instance_of(&test_error_type()));
    }

    #[test]
    fn test_instance_check_fixed_size() {
        let ty = WireType::Fixed {
            name: "MD5".to_string(),
            size: 16,
        };
        assert!(Value::Fixed(vec![0u8; 16]).is_instance_of(&ty));
        assert!(!Value::Fixed(vec![0u8; 15]).is_instance_of(&ty));
    }

    #[test]
    fn test_instance_check_enum_symbol() {
        let ty = WireType::Enum {
            name: "Kind".to_string(),
            symbols: vec!["FOO".into(), "BAR".into(), "BAZ".into()],
        };
        assert!(Value::Enum("BAR".into()).is_instance_of(&ty));
        assert!(!Value::Enum("QUX".into()).is_instance_of(&ty));
    }

    #[test]
    fn test_record_field_lookup() {
        let rec = Value::record("R", vec![("a", 1i32.into()), ("b", "x".into())]);
        assert_eq!(rec.field("b"), Some(&Value::String("x".into())));
        assert!(rec.field("c").is_none());
    }

    #[test]
    fn test_display_record() {
        let err = Value::record("TestError", vec![("message", "an error".into())]);
        assert_eq!(err.to_string(), "TestError{message: an error}");
    }

    #[test]
    fn test_wire_type_json_roundtrip() {
        let ty = WireType::Record {
            name: "TestRecord".to_string(),
            fields: vec![
                Field::new("name", WireType::String),
                Field::new(
                    "kind",
                    WireType::Enum {
                        name: "Kind".to_string(),
                        symbols: vec!["FOO".into(), "BAR".into()],
                    },
                ),
                Field::new(
                    "hash",
                    WireType::Fixed {
                        name: "MD5".to_string(),
                        size: 16,
                    },
                ),
            ],
        };

        let json = serde_json::to_string(&ty).unwrap();
        let back: WireType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ty);
    }
}
