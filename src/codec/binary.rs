//! Binary value codec: byte-level primitives and schema-directed
//! encoding/decoding.
//!
//! Integers (and all lengths and counts) are zig-zag varints; floats are
//! little-endian IEEE bits; bytes and strings are length-prefixed; fixed is
//! raw bytes; enums are symbol indices; records are their fields in schema
//! order; arrays and maps are counted blocks ending in a zero count.
//!
//! The schema drives everything: `decode` cannot even begin without the
//! [`WireType`] the bytes were written against.

use crate::error::{Result, RpcError};
use crate::protocol::{Value, WireType};

/// Growable output buffer with the codec's write primitives.
#[derive(Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            buf: Vec::with_capacity(cap),
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn write_raw(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    pub fn write_bool(&mut self, v: bool) {
        self.buf.push(v as u8);
    }

    /// Zig-zag varint, used for ints, longs, lengths, counts, and indices.
    pub fn write_varint(&mut self, v: i64) {
        let mut n = ((v << 1) ^ (v >> 63)) as u64;
        loop {
            let byte = (n & 0x7f) as u8;
            n >>= 7;
            if n == 0 {
                self.buf.push(byte);
                return;
            }
            self.buf.push(byte | 0x80);
        }
    }

    pub fn write_f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Length-prefixed byte sequence.
    pub fn write_bytes(&mut self, data: &[u8]) {
        self.write_varint(data.len() as i64);
        self.write_raw(data);
    }

    pub fn write_string(&mut self, s: &str) {
        self.write_bytes(s.as_bytes());
    }
}

/// Cursor over received bytes with the codec's read primitives.
///
/// Every read is bounds-checked; running past the end is a codec error, not
/// a panic.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn read_raw(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(RpcError::Codec(format!(
                "truncated input: need {len} bytes, have {}",
                self.remaining()
            )));
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        match self.read_raw(1)?[0] {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(RpcError::Codec(format!("invalid boolean byte: {other}"))),
        }
    }

    pub fn read_varint(&mut self) -> Result<i64> {
        let mut n: u64 = 0;
        let mut shift = 0u32;
        loop {
            let byte = self.read_raw(1)?[0];
            if shift >= 64 {
                return Err(RpcError::Codec("varint too long".to_string()));
            }
            n |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
        }
        Ok(((n >> 1) as i64) ^ -((n & 1) as i64))
    }

    /// Varint that must fit a non-negative usize (lengths, counts, indices).
    pub fn read_len(&mut self) -> Result<usize> {
        let v = self.read_varint()?;
        if v < 0 {
            return Err(RpcError::Codec(format!("negative length: {v}")));
        }
        usize::try_from(v).map_err(|_| RpcError::Codec(format!("length out of range: {v}")))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        let bits = self.read_raw(4)?;
        Ok(f32::from_le_bytes([bits[0], bits[1], bits[2], bits[3]]))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        let bits = self.read_raw(8)?;
        Ok(f64::from_le_bytes([
            bits[0], bits[1], bits[2], bits[3], bits[4], bits[5], bits[6], bits[7],
        ]))
    }

    pub fn read_bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.read_len()?;
        self.read_raw(len)
    }

    pub fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| RpcError::Codec(format!("invalid utf-8 string: {e}")))
    }
}

fn type_error(value: &Value, ty: &WireType) -> RpcError {
    RpcError::Codec(format!(
        "value {value} is not an instance of schema type {}",
        ty.type_name()
    ))
}

/// Encode a value against its schema type.
pub fn encode_value(w: &mut Writer, value: &Value, ty: &WireType) -> Result<()> {
    match (value, ty) {
        (Value::Null, WireType::Null) => Ok(()),
        (Value::Boolean(v), WireType::Boolean) => {
            w.write_bool(*v);
            Ok(())
        }
        (Value::Int(v), WireType::Int) => {
            w.write_varint(i64::from(*v));
            Ok(())
        }
        (Value::Long(v), WireType::Long) => {
            w.write_varint(*v);
            Ok(())
        }
        (Value::Float(v), WireType::Float) => {
            w.write_f32(*v);
            Ok(())
        }
        (Value::Double(v), WireType::Double) => {
            w.write_f64(*v);
            Ok(())
        }
        (Value::Bytes(data), WireType::Bytes) => {
            w.write_bytes(data);
            Ok(())
        }
        (Value::String(s), WireType::String) => {
            w.write_string(s);
            Ok(())
        }
        (Value::Fixed(data), WireType::Fixed { size, .. }) => {
            if data.len() != *size {
                return Err(RpcError::Codec(format!(
                    "fixed value has {} bytes, schema says {size}",
                    data.len()
                )));
            }
            w.write_raw(data);
            Ok(())
        }
        (Value::Enum(symbol), WireType::Enum { name, symbols }) => {
            let index = symbols
                .iter()
                .position(|s| s == symbol)
                .ok_or_else(|| {
                    RpcError::Codec(format!("{symbol} is not a symbol of enum {name}"))
                })?;
            w.write_varint(index as i64);
            Ok(())
        }
        (
            Value::Record { name, fields },
            WireType::Record {
                name: ty_name,
                fields: ty_fields,
            },
        ) => {
            if name != ty_name {
                return Err(type_error(value, ty));
            }
            for field in ty_fields {
                let field_value = fields
                    .iter()
                    .find(|(k, _)| k == &field.name)
                    .map(|(_, v)| v)
                    .ok_or_else(|| {
                        RpcError::Codec(format!("record {name} missing field {}", field.name))
                    })?;
                encode_value(w, field_value, &field.ty)?;
            }
            Ok(())
        }
        (Value::Array(items), WireType::Array { items: item_ty }) => {
            if !items.is_empty() {
                w.write_varint(items.len() as i64);
                for item in items {
                    encode_value(w, item, item_ty)?;
                }
            }
            w.write_varint(0);
            Ok(())
        }
        (Value::Map(entries), WireType::Map { values: value_ty }) => {
            if !entries.is_empty() {
                w.write_varint(entries.len() as i64);
                for (key, entry) in entries {
                    w.write_string(key);
                    encode_value(w, entry, value_ty)?;
                }
            }
            w.write_varint(0);
            Ok(())
        }
        _ => Err(type_error(value, ty)),
    }
}

/// Decode a value against the schema type it was written with.
pub fn decode_value(r: &mut Reader<'_>, ty: &WireType) -> Result<Value> {
    match ty {
        WireType::Null => Ok(Value::Null),
        WireType::Boolean => Ok(Value::Boolean(r.read_bool()?)),
        WireType::Int => {
            let v = r.read_varint()?;
            let v = i32::try_from(v)
                .map_err(|_| RpcError::Codec(format!("int out of range: {v}")))?;
            Ok(Value::Int(v))
        }
        WireType::Long => Ok(Value::Long(r.read_varint()?)),
        WireType::Float => Ok(Value::Float(r.read_f32()?)),
        WireType::Double => Ok(Value::Double(r.read_f64()?)),
        WireType::Bytes => Ok(Value::Bytes(r.read_bytes()?.to_vec())),
        WireType::String => Ok(Value::String(r.read_string()?)),
        WireType::Fixed { size, .. } => Ok(Value::Fixed(r.read_raw(*size)?.to_vec())),
        WireType::Enum { name, symbols } => {
            let index = r.read_len()?;
            let symbol = symbols.get(index).ok_or_else(|| {
                RpcError::Codec(format!("enum {name} has no symbol at index {index}"))
            })?;
            Ok(Value::Enum(symbol.clone()))
        }
        WireType::Record { name, fields } => {
            let mut out = Vec::with_capacity(fields.len());
            for field in fields {
                let v = decode_value(r, &field.ty)?;
                out.push((field.name.clone(), v));
            }
            Ok(Value::Record {
                name: name.clone(),
                fields: out,
            })
        }
        WireType::Array { items } => {
            let mut out = Vec::new();
            loop {
                let count = r.read_len()?;
                if count == 0 {
                    break;
                }
                for _ in 0..count {
                    out.push(decode_value(r, items)?);
                }
            }
            Ok(Value::Array(out))
        }
        WireType::Map { values } => {
            let mut out = Vec::new();
            loop {
                let count = r.read_len()?;
                if count == 0 {
                    break;
                }
                for _ in 0..count {
                    let key = r.read_string()?;
                    let v = decode_value(r, values)?;
                    out.push((key, v));
                }
            }
            Ok(Value::Map(out))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Field;

    fn roundtrip(value: &Value, ty: &WireType) -> Value {
        let mut w = Writer::new();
        encode_value(&mut w, value, ty).unwrap();
        let bytes = w.into_bytes();
        let mut r = Reader::new(&bytes);
        let decoded = decode_value(&mut r, ty).unwrap();
        assert!(r.is_empty(), "decoder left {} trailing bytes", r.remaining());
        decoded
    }

    #[test]
    fn test_varint_roundtrip_extremes() {
        for v in [0i64, -1, 1, 63, -64, i64::MAX, i64::MIN, 300, -300] {
            let mut w = Writer::new();
            w.write_varint(v);
            let bytes = w.into_bytes();
            let mut r = Reader::new(&bytes);
            assert_eq!(r.read_varint().unwrap(), v);
        }
    }

    #[test]
    fn test_small_varints_are_one_byte() {
        for v in [0i64, -1, 1, -64, 63] {
            let mut w = Writer::new();
            w.write_varint(v);
            assert_eq!(w.as_bytes().len(), 1, "value {v}");
        }
    }

    #[test]
    fn test_primitive_roundtrips() {
        assert_eq!(roundtrip(&Value::Null, &WireType::Null), Value::Null);
        assert_eq!(
            roundtrip(&Value::Boolean(true), &WireType::Boolean),
            Value::Boolean(true)
        );
        assert_eq!(
            roundtrip(&Value::Int(-42), &WireType::Int),
            Value::Int(-42)
        );
        assert_eq!(
            roundtrip(&Value::Long(1 << 40), &WireType::Long),
            Value::Long(1 << 40)
        );
        assert_eq!(
            roundtrip(&Value::Double(3.5), &WireType::Double),
            Value::Double(3.5)
        );
        assert_eq!(
            roundtrip(&Value::String("hé".into()), &WireType::String),
            Value::String("hé".into())
        );
    }

    #[test]
    fn test_zero_length_bytes_roundtrip() {
        assert_eq!(
            roundtrip(&Value::Bytes(vec![]), &WireType::Bytes),
            Value::Bytes(vec![])
        );
    }

    #[test]
    fn test_record_roundtrip() {
        let ty = WireType::Record {
            name: "TestRecord".to_string(),
            fields: vec![
                Field::new("name", WireType::String),
                Field::new(
                    "kind",
                    WireType::Enum {
                        name: "Kind".to_string(),
                        symbols: vec!["FOO".into(), "BAR".into(), "BAZ".into()],
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
        let value = Value::record(
            "TestRecord",
            vec![
                ("name", "foo".into()),
                ("kind", Value::Enum("BAR".into())),
                ("hash", Value::Fixed(b"0123456789012345".to_vec())),
            ],
        );
        assert_eq!(roundtrip(&value, &ty), value);
    }

    #[test]
    fn test_array_and_map_roundtrip() {
        let array_ty = WireType::Array {
            items: Box::new(WireType::Long),
        };
        let array = Value::Array(vec![Value::Long(1), Value::Long(2), Value::Long(3)]);
        assert_eq!(roundtrip(&array, &array_ty), array);
        assert_eq!(
            roundtrip(&Value::Array(vec![]), &array_ty),
            Value::Array(vec![])
        );

        let map_ty = WireType::Map {
            values: Box::new(WireType::String),
        };
        let map = Value::Map(vec![("a".into(), "x".into()), ("b".into(), "y".into())]);
        assert_eq!(roundtrip(&map, &map_ty), map);
    }

    #[test]
    fn test_fixed_size_enforced_on_encode() {
        let ty = WireType::Fixed {
            name: "MD5".to_string(),
            size: 16,
        };
        let mut w = Writer::new();
        let result = encode_value(&mut w, &Value::Fixed(vec![0u8; 4]), &ty);
        assert!(result.is_err());
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let mut w = Writer::new();
        let result = encode_value(&mut w, &Value::String("x".into()), &WireType::Long);
        assert!(matches!(result, Err(RpcError::Codec(_))));
    }

    #[test]
    fn test_truncated_input_is_error_not_panic() {
        let ty = WireType::String;
        let mut w = Writer::new();
        encode_value(&mut w, &Value::String("hello world".into()), &ty).unwrap();
        let bytes = w.into_bytes();

        let mut r = Reader::new(&bytes[..bytes.len() - 3]);
        assert!(decode_value(&mut r, &ty).is_err());
    }

    #[test]
    fn test_invalid_enum_index_rejected() {
        let ty = WireType::Enum {
            name: "Kind".to_string(),
            symbols: vec!["FOO".into()],
        };
        let mut w = Writer::new();
        w.write_varint(7);
        let bytes = w.into_bytes();
        let mut r = Reader::new(&bytes);
        assert!(decode_value(&mut r, &ty).is_err());
    }
}
