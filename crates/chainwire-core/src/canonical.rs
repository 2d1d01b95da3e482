//! Canonical CBOR wire codec for protocol messages.
//!
//! Every message is a CBOR map keyed by small unsigned integers that match
//! the field numbers of the shared schema. Encoding follows RFC 8949 Core
//! Deterministic Encoding:
//! - Map keys sorted by encoded byte comparison
//! - Integers use smallest valid encoding
//! - Definite lengths only
//! - No floats
//!
//! Fields holding their default value are omitted, and absent fields decode
//! to their default. Zero-length input therefore decodes to the default
//! message, which keeps the codec interchangeable with the schema's
//! reference encoding at the level of observable semantics.

use ciborium::value::{Integer, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Cursor;

use crate::error::CoreError;

/// A protocol message with a canonical wire form.
pub trait Message: Sized {
    /// Name used in decode errors.
    const KIND: &'static str;

    /// Convert to a CBOR value (map with integer keys).
    fn to_value(&self) -> Value;

    /// Convert back from a CBOR value.
    fn from_value(value: &Value) -> Result<Self, CoreError>;

    /// Encode to canonical bytes. Deterministic for equal messages.
    fn encode(&self) -> Vec<u8> {
        encode_canonical(&self.to_value())
    }

    /// Decode from bytes, rejecting malformed input and trailing bytes.
    fn decode(bytes: &[u8]) -> Result<Self, CoreError> {
        let value = decode_value(Self::KIND, bytes)?;
        Self::from_value(&value)
    }

    /// Decode bytes this process produced itself.
    ///
    /// # Panics
    ///
    /// Panics if the bytes are malformed. Only for data whose provenance
    /// is the local encoder; never for data received from peers.
    fn decode_trusted(bytes: &[u8]) -> Self {
        match Self::decode(bytes) {
            Ok(message) => message,
            Err(e) => panic!("locally encoded {} failed to decode: {}", Self::KIND, e),
        }
    }
}

/// Parse bytes into a single CBOR value.
fn decode_value(kind: &'static str, bytes: &[u8]) -> Result<Value, CoreError> {
    if bytes.is_empty() {
        return Ok(Value::Map(Vec::new()));
    }

    let mut cursor = Cursor::new(bytes);
    let value: Value = ciborium::from_reader(&mut cursor)
        .map_err(|e| CoreError::malformed(kind, e.to_string()))?;

    let consumed = cursor.position() as usize;
    if consumed != bytes.len() {
        return Err(CoreError::malformed(
            kind,
            format!("{} trailing bytes", bytes.len() - consumed),
        ));
    }
    Ok(value)
}

/// Builder for a message map that skips default-valued fields.
#[derive(Debug, Default)]
pub struct FieldMap {
    entries: Vec<(Value, Value)>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, key: u64, value: Value) -> Self {
        self.entries.push((Value::Integer(key.into()), value));
        self
    }

    pub fn bytes(self, key: u64, bytes: &[u8]) -> Self {
        if bytes.is_empty() {
            return self;
        }
        self.push(key, Value::Bytes(bytes.to_vec()))
    }

    pub fn text(self, key: u64, text: &str) -> Self {
        if text.is_empty() {
            return self;
        }
        self.push(key, Value::Text(text.to_string()))
    }

    pub fn uint(self, key: u64, n: u64) -> Self {
        if n == 0 {
            return self;
        }
        self.push(key, Value::Integer(n.into()))
    }

    pub fn int(self, key: u64, n: i64) -> Self {
        if n == 0 {
            return self;
        }
        self.push(key, Value::Integer(n.into()))
    }

    pub fn message<M: Message>(self, key: u64, message: Option<&M>) -> Self {
        match message {
            Some(m) => self.push(key, m.to_value()),
            None => self,
        }
    }

    pub fn bytes_list(self, key: u64, items: &[Vec<u8>]) -> Self {
        if items.is_empty() {
            return self;
        }
        let array = items.iter().map(|b| Value::Bytes(b.clone())).collect();
        self.push(key, Value::Array(array))
    }

    pub fn messages<M: Message>(self, key: u64, items: &[M]) -> Self {
        if items.is_empty() {
            return self;
        }
        let array = items.iter().map(Message::to_value).collect();
        self.push(key, Value::Array(array))
    }

    pub fn message_map<M: Message>(self, key: u64, map: &BTreeMap<String, M>) -> Self {
        if map.is_empty() {
            return self;
        }
        let entries = map
            .iter()
            .map(|(name, m)| (Value::Text(name.clone()), m.to_value()))
            .collect();
        self.push(key, Value::Map(entries))
    }

    pub fn bytes_map(self, key: u64, map: &BTreeMap<String, Vec<u8>>) -> Self {
        if map.is_empty() {
            return self;
        }
        let entries = map
            .iter()
            .map(|(name, b)| (Value::Text(name.clone()), Value::Bytes(b.clone())))
            .collect();
        self.push(key, Value::Map(entries))
    }

    pub fn text_set(self, key: u64, set: &BTreeSet<String>) -> Self {
        if set.is_empty() {
            return self;
        }
        let array = set.iter().map(|s| Value::Text(s.clone())).collect();
        self.push(key, Value::Array(array))
    }

    pub fn build(self) -> Value {
        Value::Map(self.entries)
    }
}

/// Typed reader over a decoded message map.
pub struct Fields<'a> {
    kind: &'static str,
    entries: &'a [(Value, Value)],
}

impl<'a> Fields<'a> {
    /// Open a value as a message map, rejecting non-map values and
    /// duplicate or non-integer keys.
    pub fn of(kind: &'static str, value: &'a Value) -> Result<Self, CoreError> {
        let entries = match value {
            Value::Map(entries) => entries.as_slice(),
            _ => return Err(CoreError::malformed(kind, "expected map")),
        };

        let mut seen = BTreeSet::new();
        for (k, _) in entries {
            let key = match k {
                Value::Integer(i) => i128::from(*i),
                _ => return Err(CoreError::malformed(kind, "non-integer field key")),
            };
            if !seen.insert(key) {
                return Err(CoreError::malformed(kind, format!("duplicate field {}", key)));
            }
        }

        Ok(Self { kind, entries })
    }

    fn get(&self, key: u64) -> Option<&'a Value> {
        self.entries
            .iter()
            .find(|(k, _)| matches!(k, Value::Integer(i) if i128::from(*i) == i128::from(key)))
            .map(|(_, v)| v)
    }

    fn invalid(&self, name: &str) -> CoreError {
        CoreError::malformed(self.kind, format!("invalid {}", name))
    }

    pub fn bytes(&self, key: u64, name: &str) -> Result<Vec<u8>, CoreError> {
        match self.get(key) {
            None => Ok(Vec::new()),
            Some(Value::Bytes(b)) => Ok(b.clone()),
            Some(_) => Err(self.invalid(name)),
        }
    }

    pub fn text(&self, key: u64, name: &str) -> Result<String, CoreError> {
        match self.get(key) {
            None => Ok(String::new()),
            Some(Value::Text(s)) => Ok(s.clone()),
            Some(_) => Err(self.invalid(name)),
        }
    }

    pub fn uint(&self, key: u64, name: &str) -> Result<u64, CoreError> {
        match self.get(key) {
            None => Ok(0),
            Some(Value::Integer(i)) => u64::try_from(*i).map_err(|_| self.invalid(name)),
            Some(_) => Err(self.invalid(name)),
        }
    }

    pub fn int(&self, key: u64, name: &str) -> Result<i64, CoreError> {
        match self.get(key) {
            None => Ok(0),
            Some(Value::Integer(i)) => i64::try_from(*i).map_err(|_| self.invalid(name)),
            Some(_) => Err(self.invalid(name)),
        }
    }

    pub fn i32(&self, key: u64, name: &str) -> Result<i32, CoreError> {
        let n = self.int(key, name)?;
        i32::try_from(n).map_err(|_| self.invalid(name))
    }

    pub fn message<M: Message>(&self, key: u64, name: &str) -> Result<Option<M>, CoreError> {
        match self.get(key) {
            None => Ok(None),
            Some(v @ Value::Map(_)) => M::from_value(v).map(Some),
            Some(_) => Err(self.invalid(name)),
        }
    }

    pub fn bytes_list(&self, key: u64, name: &str) -> Result<Vec<Vec<u8>>, CoreError> {
        let items = match self.get(key) {
            None => return Ok(Vec::new()),
            Some(Value::Array(items)) => items,
            Some(_) => return Err(self.invalid(name)),
        };
        items
            .iter()
            .map(|item| match item {
                Value::Bytes(b) => Ok(b.clone()),
                _ => Err(self.invalid(name)),
            })
            .collect()
    }

    pub fn messages<M: Message>(&self, key: u64, name: &str) -> Result<Vec<M>, CoreError> {
        match self.get(key) {
            None => Ok(Vec::new()),
            Some(Value::Array(items)) => items.iter().map(M::from_value).collect(),
            Some(_) => Err(self.invalid(name)),
        }
    }

    pub fn message_map<M: Message>(
        &self,
        key: u64,
        name: &str,
    ) -> Result<BTreeMap<String, M>, CoreError> {
        let entries = match self.get(key) {
            None => return Ok(BTreeMap::new()),
            Some(Value::Map(entries)) => entries,
            Some(_) => return Err(self.invalid(name)),
        };

        let mut map = BTreeMap::new();
        for (k, v) in entries {
            let entry_name = match k {
                Value::Text(s) => s.clone(),
                _ => return Err(self.invalid(name)),
            };
            if map.insert(entry_name, M::from_value(v)?).is_some() {
                return Err(self.invalid(name));
            }
        }
        Ok(map)
    }

    pub fn bytes_map(
        &self,
        key: u64,
        name: &str,
    ) -> Result<BTreeMap<String, Vec<u8>>, CoreError> {
        let entries = match self.get(key) {
            None => return Ok(BTreeMap::new()),
            Some(Value::Map(entries)) => entries,
            Some(_) => return Err(self.invalid(name)),
        };

        let mut map = BTreeMap::new();
        for (k, v) in entries {
            let (Value::Text(entry_name), Value::Bytes(b)) = (k, v) else {
                return Err(self.invalid(name));
            };
            if map.insert(entry_name.clone(), b.clone()).is_some() {
                return Err(self.invalid(name));
            }
        }
        Ok(map)
    }

    pub fn text_set(&self, key: u64, name: &str) -> Result<BTreeSet<String>, CoreError> {
        let items = match self.get(key) {
            None => return Ok(BTreeSet::new()),
            Some(Value::Array(items)) => items,
            Some(_) => return Err(self.invalid(name)),
        };
        items
            .iter()
            .map(|item| match item {
                Value::Text(s) => Ok(s.clone()),
                _ => Err(self.invalid(name)),
            })
            .collect()
    }
}

/// Encode a CBOR value to canonical bytes.
pub fn encode_canonical(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_value_to(&mut buf, value);
    buf
}

fn encode_value_to(buf: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Integer(i) => encode_integer(buf, *i),
        Value::Bytes(b) => encode_bytes(buf, b),
        Value::Text(s) => encode_text(buf, s),
        Value::Array(arr) => encode_array(buf, arr),
        Value::Map(entries) => encode_map_canonical(buf, entries),
        Value::Bool(b) => buf.push(if *b { 0xf5 } else { 0xf4 }),
        Value::Null => buf.push(0xf6),
        Value::Float(_) => panic!("floats not supported in canonical encoding"),
        _ => panic!("unsupported CBOR value type"),
    }
}

/// Encode a CBOR integer (major types 0 and 1).
fn encode_integer(buf: &mut Vec<u8>, i: Integer) {
    let n = i128::from(i);
    if n >= 0 {
        encode_uint(buf, 0, n as u64);
    } else {
        // -1 encodes as 0, -2 as 1, and so on.
        encode_uint(buf, 1, (-1 - n) as u64);
    }
}

/// Encode an unsigned integer with the given major type.
fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | (n as u8));
    } else if n <= 0xff {
        buf.push(mt | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffff_ffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

fn encode_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    encode_uint(buf, 2, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

fn encode_text(buf: &mut Vec<u8>, s: &str) {
    encode_uint(buf, 3, s.len() as u64);
    buf.extend_from_slice(s.as_bytes());
}

fn encode_array(buf: &mut Vec<u8>, arr: &[Value]) {
    encode_uint(buf, 4, arr.len() as u64);
    for item in arr {
        encode_value_to(buf, item);
    }
}

/// Encode a map with keys sorted by their encoded bytes.
fn encode_map_canonical(buf: &mut Vec<u8>, entries: &[(Value, Value)]) {
    let mut pairs: Vec<(Vec<u8>, &Value)> = entries
        .iter()
        .map(|(k, v)| {
            let mut key_buf = Vec::new();
            encode_value_to(&mut key_buf, k);
            (key_buf, v)
        })
        .collect();

    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    encode_uint(buf, 5, pairs.len() as u64);
    for (key_bytes, value) in pairs {
        buf.extend_from_slice(&key_bytes);
        encode_value_to(buf, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Default)]
    struct Sample {
        name: String,
        count: u64,
        delta: i64,
        blob: Vec<u8>,
        tags: BTreeSet<String>,
    }

    impl Message for Sample {
        const KIND: &'static str = "Sample";

        fn to_value(&self) -> Value {
            FieldMap::new()
                .text(1, &self.name)
                .uint(2, self.count)
                .int(3, self.delta)
                .bytes(4, &self.blob)
                .text_set(5, &self.tags)
                .build()
        }

        fn from_value(value: &Value) -> Result<Self, CoreError> {
            let f = Fields::of(Self::KIND, value)?;
            Ok(Self {
                name: f.text(1, "name")?,
                count: f.uint(2, "count")?,
                delta: f.int(3, "delta")?,
                blob: f.bytes(4, "blob")?,
                tags: f.text_set(5, "tags")?,
            })
        }
    }

    #[test]
    fn test_default_message_encodes_to_empty_map() {
        assert_eq!(Sample::default().encode(), vec![0xa0]);
    }

    #[test]
    fn test_empty_input_decodes_to_default() {
        assert_eq!(Sample::decode(&[]).unwrap(), Sample::default());
    }

    #[test]
    fn test_encoding_deterministic() {
        let sample = Sample {
            name: "orderer".into(),
            count: 300,
            delta: -7,
            blob: vec![1, 2, 3],
            tags: ["b".to_string(), "a".to_string()].into_iter().collect(),
        };
        let bytes1 = sample.encode();
        let bytes2 = sample.clone().encode();
        assert_eq!(bytes1, bytes2);
        assert_eq!(Sample::decode(&bytes1).unwrap(), sample);
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = Sample {
            count: 1,
            ..Default::default()
        }
        .encode();
        bytes.push(0x00);

        let err = Sample::decode(&bytes).unwrap_err();
        assert!(matches!(err, CoreError::MalformedMessage { kind: "Sample", .. }));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(Sample::decode(&[0xff, 0x00, 0x13]).is_err());
        assert!(Sample::decode(b"definitely not a message").is_err());
        // A well-formed CBOR value that is not a map.
        assert!(Sample::decode(&[0x01]).is_err());
    }

    #[test]
    fn test_wrong_field_type_rejected() {
        let value = Value::Map(vec![(Value::Integer(2.into()), Value::Text("x".into()))]);
        let bytes = encode_canonical(&value);
        assert!(Sample::decode(&bytes).is_err());
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let value = Value::Map(vec![
            (Value::Integer(2.into()), Value::Integer(1.into())),
            (Value::Integer(2.into()), Value::Integer(2.into())),
        ]);
        let bytes = encode_canonical(&value);
        assert!(Sample::decode(&bytes).is_err());
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let value = Value::Map(vec![
            (Value::Integer(2.into()), Value::Integer(9.into())),
            (Value::Integer(15.into()), Value::Bytes(vec![0xaa])),
        ]);
        let bytes = encode_canonical(&value);
        let decoded = Sample::decode(&bytes).unwrap();
        assert_eq!(decoded.count, 9);
    }

    #[test]
    #[should_panic(expected = "locally encoded Sample failed to decode")]
    fn test_decode_trusted_panics_on_garbage() {
        Sample::decode_trusted(&[0xff, 0xff]);
    }

    #[test]
    fn test_integer_encoding() {
        let mut buf = Vec::new();

        encode_uint(&mut buf, 0, 0);
        assert_eq!(buf, vec![0x00]);

        buf.clear();
        encode_uint(&mut buf, 0, 23);
        assert_eq!(buf, vec![0x17]);

        buf.clear();
        encode_uint(&mut buf, 0, 24);
        assert_eq!(buf, vec![0x18, 24]);

        buf.clear();
        encode_uint(&mut buf, 0, 256);
        assert_eq!(buf, vec![0x19, 0x01, 0x00]);

        buf.clear();
        encode_integer(&mut buf, Integer::from(-1i64));
        assert_eq!(buf, vec![0x20]);
    }

    #[test]
    fn test_map_key_ordering() {
        let mut buf = Vec::new();
        let entries = vec![
            (Value::Integer(8.into()), Value::Integer(80.into())),
            (Value::Integer(0.into()), Value::Integer(0.into())),
            (Value::Integer(5.into()), Value::Integer(50.into())),
        ];
        encode_map_canonical(&mut buf, &entries);

        assert_eq!(buf[0], 0xa3);
        assert_eq!(buf[1], 0x00);
        assert_eq!(buf[2], 0x00);
        assert_eq!(buf[3], 0x05);
        assert_eq!(buf[4], 0x18);
        assert_eq!(buf[5], 50);
        assert_eq!(buf[6], 0x08);
        assert_eq!(buf[7], 0x18);
        assert_eq!(buf[8], 80);
    }
}
