//! Dynamic record value type.

use crate::error::{CodecError, CodecResult};
use std::cmp::Ordering;
use std::fmt;

/// A dynamic record value.
///
/// Object-store records are documents: maps with text field names holding
/// scalars, byte strings, arrays and nested maps. Floats are not part of
/// the model; numbers are 64-bit signed integers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer.
    Integer(i64),
    /// Byte string.
    Bytes(Vec<u8>),
    /// Text string (UTF-8).
    Text(String),
    /// Array of values.
    Array(Vec<Value>),
    /// Map of key-value pairs, kept in canonical key order.
    Map(Vec<(Value, Value)>),
}

impl Value {
    /// Creates a map value with canonically sorted keys.
    pub fn map(mut pairs: Vec<(Value, Value)>) -> Self {
        pairs.sort_by(|a, b| a.0.cmp_canonical(&b.0));
        pairs.dedup_by(|later, earlier| earlier.0 == later.0);
        Value::Map(pairs)
    }

    /// Creates a document from `(field, value)` pairs.
    ///
    /// ```
    /// use shelfdb_codec::Value;
    ///
    /// let book = Value::object([("title", Value::from("Dune")), ("year", Value::from(1965))]);
    /// assert_eq!(book.get_path("year"), Some(&Value::Integer(1965)));
    /// ```
    pub fn object<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self::map(
            fields
                .into_iter()
                .map(|(k, v)| (Value::Text(k.into()), v))
                .collect(),
        )
    }

    /// Canonical ordering: major type first, then length-first content.
    ///
    /// This matches the bytewise order of the canonical CBOR encodings and
    /// is only used to order map keys.
    pub fn cmp_canonical(&self, other: &Self) -> Ordering {
        let by_type = self.major_type().cmp(&other.major_type());
        if by_type != Ordering::Equal {
            return by_type;
        }
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Bool(_), Value::Null) => Ordering::Less,
            (Value::Null, Value::Bool(_)) => Ordering::Greater,
            (Value::Integer(a), Value::Integer(b)) if *a >= 0 => {
                (encoded_len(*a as u64), a).cmp(&(encoded_len(*b as u64), b))
            }
            (Value::Integer(a), Value::Integer(b)) => {
                let (ua, ub) = ((-1 - *a) as u64, (-1 - *b) as u64);
                (encoded_len(ua), ua).cmp(&(encoded_len(ub), ub))
            }
            (Value::Bytes(a), Value::Bytes(b)) => (a.len(), a).cmp(&(b.len(), b)),
            (Value::Text(a), Value::Text(b)) => (a.len(), a).cmp(&(b.len(), b)),
            (Value::Array(a), Value::Array(b)) => a.len().cmp(&b.len()).then_with(|| {
                a.iter()
                    .zip(b)
                    .map(|(x, y)| x.cmp_canonical(y))
                    .find(|o| *o != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            }),
            (Value::Map(a), Value::Map(b)) => a.len().cmp(&b.len()).then_with(|| {
                a.iter()
                    .zip(b)
                    .map(|((ak, av), (bk, bv))| {
                        ak.cmp_canonical(bk).then_with(|| av.cmp_canonical(bv))
                    })
                    .find(|o| *o != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            }),
            _ => Ordering::Equal,
        }
    }

    fn major_type(&self) -> u8 {
        match self {
            Value::Integer(n) if *n >= 0 => 0,
            Value::Integer(_) => 1,
            Value::Bytes(_) => 2,
            Value::Text(_) => 3,
            Value::Array(_) => 4,
            Value::Map(_) => 5,
            Value::Bool(_) | Value::Null => 7,
        }
    }

    /// Short name of the variant, for error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Integer(_) => "integer",
            Value::Bytes(_) => "bytes",
            Value::Text(_) => "text",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
        }
    }

    /// Check if this value is null.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get this value as a boolean, if it is one.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get this value as an integer, if it is one.
    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this value as text, if it is text.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get this value as an array, if it is one.
    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Looks up a text-keyed field of a map.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Map(pairs) => pairs
                .iter()
                .find(|(k, _)| k.as_text() == Some(name))
                .map(|(_, v)| v),
            _ => None,
        }
    }

    /// Resolves a dotted key path such as `"author.last_name"`.
    ///
    /// The empty path addresses the value itself.
    #[must_use]
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        if path.is_empty() {
            return Some(self);
        }
        path.split('.')
            .try_fold(self, |current, segment| current.field(segment))
    }

    /// Writes `value` at a dotted key path, creating missing intermediate maps.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidPath`] if the path is empty or passes
    /// through a non-map value.
    pub fn set_path(&mut self, path: &str, value: Value) -> CodecResult<()> {
        if path.is_empty() {
            return Err(CodecError::invalid_path(path));
        }
        let mut current = self;
        let mut segments = path.split('.').peekable();
        while let Some(segment) = segments.next() {
            let Value::Map(pairs) = current else {
                return Err(CodecError::invalid_path(path));
            };
            if segments.peek().is_none() {
                insert_sorted(pairs, segment, value);
                return Ok(());
            }
            if !pairs.iter().any(|(k, _)| k.as_text() == Some(segment)) {
                insert_sorted(pairs, segment, Value::Map(Vec::new()));
            }
            current = pairs
                .iter_mut()
                .find(|(k, _)| k.as_text() == Some(segment))
                .map(|(_, v)| v)
                .ok_or_else(|| CodecError::invalid_path(path))?;
        }
        Ok(())
    }
}

fn insert_sorted(pairs: &mut Vec<(Value, Value)>, name: &str, value: Value) {
    let key = Value::Text(name.to_string());
    match pairs.binary_search_by(|(k, _)| k.cmp_canonical(&key)) {
        Ok(pos) => pairs[pos].1 = value,
        Err(pos) => pairs.insert(pos, (key, value)),
    }
}

fn encoded_len(n: u64) -> usize {
    match n {
        0..=23 => 1,
        24..=0xFF => 2,
        0x100..=0xFFFF => 3,
        0x1_0000..=0xFFFF_FFFF => 5,
        _ => 9,
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Value::Bytes(bytes)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Value::Null, Into::into)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Integer(n) => write!(f, "{n}"),
            Value::Bytes(bytes) => {
                write!(f, "h'")?;
                for b in bytes {
                    write!(f, "{b:02x}")?;
                }
                write!(f, "'")
            }
            Value::Text(s) => write!(f, "{s:?}"),
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
            Value::Map(pairs) => {
                write!(f, "{{")?;
                for (i, (k, v)) in pairs.iter().enumerate() {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_sorts_and_dedups_keys() {
        let value = Value::object([
            ("zeta", Value::from(1)),
            ("id", Value::from(2)),
            ("id", Value::from(3)),
        ]);
        let Value::Map(pairs) = &value else {
            panic!("expected map");
        };
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].0, Value::from("id"));
        assert_eq!(pairs[1].0, Value::from("zeta"));
    }

    #[test]
    fn canonical_order_is_length_first() {
        assert_eq!(
            Value::from("b").cmp_canonical(&Value::from("aa")),
            Ordering::Less
        );
        assert_eq!(
            Value::from(23).cmp_canonical(&Value::from(24)),
            Ordering::Less
        );
        assert_eq!(
            Value::from(-1).cmp_canonical(&Value::from(-2)),
            Ordering::Less
        );
        assert_eq!(
            Value::from(5).cmp_canonical(&Value::from(-5)),
            Ordering::Less
        );
    }

    #[test]
    fn get_path_walks_nested_maps() {
        let doc = Value::object([(
            "author",
            Value::object([("last", Value::from("Herbert"))]),
        )]);

        assert_eq!(doc.get_path("author.last"), Some(&Value::from("Herbert")));
        assert_eq!(doc.get_path("author.first"), None);
        assert_eq!(doc.get_path("author.last.x"), None);
        assert_eq!(doc.get_path(""), Some(&doc));
    }

    #[test]
    fn set_path_creates_intermediate_maps() {
        let mut doc = Value::object([("title", Value::from("Dune"))]);
        doc.set_path("meta.id", Value::from(7)).unwrap();
        doc.set_path("title", Value::from("Dune Messiah")).unwrap();

        assert_eq!(doc.get_path("meta.id"), Some(&Value::from(7)));
        assert_eq!(doc.get_path("title"), Some(&Value::from("Dune Messiah")));
    }

    #[test]
    fn set_path_rejects_scalars() {
        let mut doc = Value::object([("title", Value::from("Dune"))]);
        assert!(matches!(
            doc.set_path("title.id", Value::from(1)),
            Err(CodecError::InvalidPath { .. })
        ));
        assert!(Value::from(3).set_path("id", Value::Null).is_err());
        assert!(doc.set_path("", Value::Null).is_err());
    }

    #[test]
    fn display_is_json_like() {
        let doc = Value::object([
            ("tags", Value::from(vec![Value::from("a"), Value::Null])),
            ("raw", Value::from(vec![0xabu8, 0x01])),
        ]);
        assert_eq!(doc.to_string(), r#"{"raw": h'ab01', "tags": ["a", null]}"#);
    }
}
