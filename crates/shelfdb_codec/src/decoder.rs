//! CBOR decoder producing [`Value`]s.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use ciborium::value::Value as Cbor;

/// Decodes exactly one CBOR item from `bytes`.
///
/// # Errors
///
/// Fails on malformed input, floats, tags, integers outside the `i64`
/// range, and trailing bytes after the item.
pub fn from_cbor(bytes: &[u8]) -> CodecResult<Value> {
    let mut reader = bytes;
    let item: Cbor = ciborium::de::from_reader(&mut reader)
        .map_err(|e| CodecError::decoding_failed(format!("{e:?}")))?;
    if !reader.is_empty() {
        return Err(CodecError::TrailingBytes {
            remaining: reader.len(),
        });
    }
    from_item(item)
}

fn from_item(item: Cbor) -> CodecResult<Value> {
    Ok(match item {
        Cbor::Null => Value::Null,
        Cbor::Bool(b) => Value::Bool(b),
        Cbor::Integer(n) => {
            let wide = i128::from(n);
            Value::Integer(i64::try_from(wide).map_err(|_| CodecError::IntegerOverflow)?)
        }
        Cbor::Bytes(b) => Value::Bytes(b),
        Cbor::Text(s) => Value::Text(s),
        Cbor::Array(items) => Value::Array(
            items
                .into_iter()
                .map(from_item)
                .collect::<CodecResult<_>>()?,
        ),
        Cbor::Map(pairs) => Value::map(
            pairs
                .into_iter()
                .map(|(k, v)| Ok((from_item(k)?, from_item(v)?)))
                .collect::<CodecResult<_>>()?,
        ),
        Cbor::Float(_) => return Err(CodecError::FloatForbidden),
        Cbor::Tag(tag, _) => return Err(CodecError::unsupported_type(format!("tag {tag}"))),
        _ => return Err(CodecError::unsupported_type("unknown item")),
    })
}
