//! # ShelfDB Codec
//!
//! Record values and their canonical CBOR form.
//!
//! Object stores hold [`Value`] documents. The commit log stores them as
//! canonical CBOR, so identical values always produce identical bytes:
//!
//! - map keys sorted length-first, then bytewise
//! - integers in their shortest encoding
//! - no floats, tags or indefinite-length items
//!
//! ```
//! use shelfdb_codec::{from_cbor, to_canonical_cbor, Value};
//!
//! let book = Value::object([("isbn", Value::from("123")), ("pages", Value::from(412))]);
//! let bytes = to_canonical_cbor(&book).unwrap();
//! assert_eq!(from_cbor(&bytes).unwrap(), book);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;
mod value;

pub use decoder::from_cbor;
pub use encoder::to_canonical_cbor;
pub use error::{CodecError, CodecResult};
pub use value::Value;

/// Types that can be written to canonical CBOR.
pub trait Encode {
    /// Encode this value to canonical CBOR bytes.
    fn encode(&self) -> CodecResult<Vec<u8>>;
}

/// Types that can be read back from CBOR.
pub trait Decode: Sized {
    /// Decode this value from CBOR bytes.
    fn decode(bytes: &[u8]) -> CodecResult<Self>;
}

impl Encode for Value {
    fn encode(&self) -> CodecResult<Vec<u8>> {
        to_canonical_cbor(self)
    }
}

impl Decode for Value {
    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        from_cbor(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn value_strategy() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::Integer),
            prop::collection::vec(any::<u8>(), 0..16).prop_map(Value::Bytes),
            "[a-z]{0,12}".prop_map(Value::Text),
        ];
        leaf.prop_recursive(3, 32, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                prop::collection::vec(("[a-z]{1,6}", inner), 0..6).prop_map(|fields| {
                    Value::object(fields)
                }),
            ]
        })
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(value in value_strategy()) {
            let bytes = value.encode().unwrap();
            prop_assert_eq!(Value::decode(&bytes).unwrap(), value);
        }

        #[test]
        fn encoding_is_deterministic(value in value_strategy()) {
            prop_assert_eq!(value.encode().unwrap(), to_canonical_cbor(&value.clone()).unwrap());
        }
    }

    #[test]
    fn nested_document_survives_encoding() {
        let doc = Value::object([
            ("title", Value::from("Dune")),
            (
                "authors",
                Value::from(vec![Value::object([("name", Value::from("Frank Herbert"))])]),
            ),
            ("cover", Value::from(vec![1u8, 2, 3])),
            ("stock", Value::from(-4)),
        ]);
        assert_eq!(from_cbor(&to_canonical_cbor(&doc).unwrap()).unwrap(), doc);
    }
}
