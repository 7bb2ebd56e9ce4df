//! Keys and key paths.

use crate::error::{CoreError, CoreResult};
use shelfdb_codec::Value;
use std::fmt;

/// A primary or index key.
///
/// Keys are totally ordered across types:
/// `Number < Text < Bytes < Array`. Arrays compare element by element,
/// and a proper prefix sorts before the longer array.
///
/// Number keys are 64-bit signed integers. Records hold no floats, so a
/// non-integer number (`1.5`, `NaN`) can never be a key; use a text or
/// array key, or scale the value to an integer.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Key {
    /// Integer key.
    Number(i64),
    /// String key.
    Text(String),
    /// Binary key.
    Bytes(Vec<u8>),
    /// Compound key.
    Array(Vec<Key>),
}

impl Key {
    /// Converts a record value into a key.
    ///
    /// # Errors
    ///
    /// Returns a data error for null, booleans and maps, or arrays
    /// containing them.
    pub fn from_value(value: &Value) -> CoreResult<Self> {
        match value {
            Value::Integer(n) => Ok(Key::Number(*n)),
            Value::Text(s) => Ok(Key::Text(s.clone())),
            Value::Bytes(b) => Ok(Key::Bytes(b.clone())),
            Value::Array(items) => items
                .iter()
                .map(Key::from_value)
                .collect::<CoreResult<Vec<_>>>()
                .map(Key::Array),
            other => Err(CoreError::data(format!(
                "{} is not a valid key",
                other.type_name()
            ))),
        }
    }

    /// Converts the key back into a record value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Key::Number(n) => Value::Integer(*n),
            Key::Text(s) => Value::Text(s.clone()),
            Key::Bytes(b) => Value::Bytes(b.clone()),
            Key::Array(items) => Value::Array(items.iter().map(Key::to_value).collect()),
        }
    }

    /// Returns the integer if this is a number key.
    #[must_use]
    pub fn as_number(&self) -> Option<i64> {
        match self {
            Key::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl TryFrom<&Value> for Key {
    type Error = CoreError;

    fn try_from(value: &Value) -> CoreResult<Self> {
        Key::from_value(value)
    }
}

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        Key::Number(n)
    }
}

impl From<i32> for Key {
    fn from(n: i32) -> Self {
        Key::Number(i64::from(n))
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Text(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Text(s)
    }
}

impl From<Vec<Key>> for Key {
    fn from(items: Vec<Key>) -> Self {
        Key::Array(items)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.to_value().fmt(f)
    }
}

/// Selects the key of a record.
///
/// A single path is a dotted field selector (`"author.name"`); the empty
/// string selects the whole value. A compound path yields an array key
/// built from several fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyPath {
    /// One dotted field path.
    Single(String),
    /// Several field paths combined into an array key.
    Compound(Vec<String>),
}

impl KeyPath {
    /// Evaluates the path against a record.
    ///
    /// Returns `None` when any addressed field is missing.
    #[must_use]
    pub fn evaluate(&self, value: &Value) -> Option<Value> {
        match self {
            KeyPath::Single(path) => value.get_path(path).cloned(),
            KeyPath::Compound(paths) => paths
                .iter()
                .map(|p| value.get_path(p).cloned())
                .collect::<Option<Vec<_>>>()
                .map(Value::Array),
        }
    }

    /// Extracts a key from a record.
    ///
    /// `Ok(None)` means the record has nothing at the path; a present value
    /// that is not a valid key is a data error.
    pub fn extract(&self, value: &Value) -> CoreResult<Option<Key>> {
        self.evaluate(value)
            .map(|v| Key::from_value(&v))
            .transpose()
    }

    /// Encodes the path for the commit log.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            KeyPath::Single(path) => Value::Text(path.clone()),
            KeyPath::Compound(paths) => {
                Value::Array(paths.iter().map(|p| Value::Text(p.clone())).collect())
            }
        }
    }

    /// Decodes a path written by [`KeyPath::to_value`].
    pub fn from_value(value: &Value) -> CoreResult<Self> {
        match value {
            Value::Text(path) => Ok(KeyPath::Single(path.clone())),
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_text()
                        .map(str::to_string)
                        .ok_or_else(|| CoreError::data("key path entries must be text"))
                })
                .collect::<CoreResult<Vec<_>>>()
                .map(KeyPath::Compound),
            other => Err(CoreError::data(format!(
                "{} is not a valid key path",
                other.type_name()
            ))),
        }
    }
}

impl From<&str> for KeyPath {
    fn from(path: &str) -> Self {
        KeyPath::Single(path.to_string())
    }
}

impl From<String> for KeyPath {
    fn from(path: String) -> Self {
        KeyPath::Single(path)
    }
}

impl<const N: usize> From<[&str; N]> for KeyPath {
    fn from(paths: [&str; N]) -> Self {
        KeyPath::Compound(paths.iter().map(|p| (*p).to_string()).collect())
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPath::Single(path) => f.write_str(path),
            KeyPath::Compound(paths) => write!(f, "[{}]", paths.join(", ")),
        }
    }
}
