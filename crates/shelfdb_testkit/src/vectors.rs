//! Test vectors for the value codec and the commit log format.
//!
//! Value vectors are fixed bytes. Log vectors are built from records at
//! runtime and then damaged in known ways, so the expectations track the
//! format instead of a frozen dump.

use serde::{Deserialize, Serialize};
use shelfdb_codec::Value;
use shelfdb_core::log::{LogOp, LogRecord};
use shelfdb_core::Key;

/// A test vector that can be stored as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestVector {
    /// Unique identifier for this vector.
    pub id: String,
    /// Human-readable description.
    pub description: String,
    /// Input data (hex-encoded).
    pub input_hex: String,
    /// Expected output data (hex-encoded).
    pub expected_hex: String,
    /// Expected error class (if this should fail).
    pub expected_error: Option<String>,
}

impl TestVector {
    fn ok(id: &str, description: &str, input: &[u8], expected: &[u8]) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            input_hex: hex_encode(input),
            expected_hex: hex_encode(expected),
            expected_error: None,
        }
    }

    fn failing(id: &str, description: &str, input: &[u8], error: &str) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            input_hex: hex_encode(input),
            expected_hex: String::new(),
            expected_error: Some(error.into()),
        }
    }
}

/// Lowercase hex encoding.
pub fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Decodes lowercase or uppercase hex. Returns `None` on bad input.
pub fn hex_decode(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok())
        .collect()
}

/// Canonical CBOR encodings of record values.
///
/// The input is the encoding of a value built in code (see
/// [`codec_vector_values`]); expected and input are the same bytes.
pub fn codec_vectors() -> Vec<TestVector> {
    let fixed: [(&str, &str, &str); 10] = [
        ("value_null", "null", "f6"),
        ("value_true", "true", "f5"),
        ("value_int_0", "integer 0", "00"),
        ("value_int_24", "integer 24, first two-byte form", "1818"),
        ("value_int_neg1", "integer -1", "20"),
        ("value_text_a", "text \"a\"", "6161"),
        ("value_empty_array", "empty array", "80"),
        ("value_empty_map", "empty map", "a0"),
        ("value_array_1_2", "array [1, 2]", "820102"),
        ("value_map_sorted", "map {b: 1, a: 2} in canonical key order", "a2616102616201"),
    ];
    fixed
        .iter()
        .map(|(id, description, hex)| TestVector {
            id: (*id).into(),
            description: (*description).into(),
            input_hex: (*hex).into(),
            expected_hex: (*hex).into(),
            expected_error: None,
        })
        .collect()
}

/// The values behind [`codec_vectors`], in the same order.
pub fn codec_vector_values() -> Vec<Value> {
    vec![
        Value::Null,
        Value::Bool(true),
        Value::Integer(0),
        Value::Integer(24),
        Value::Integer(-1),
        Value::from("a"),
        Value::Array(vec![]),
        Value::object(Vec::<(String, Value)>::new()),
        Value::Array(vec![Value::Integer(1), Value::Integer(2)]),
        Value::object([("b", Value::Integer(1)), ("a", Value::Integer(2))]),
    ]
}

fn sample_commit() -> LogRecord {
    LogRecord::Commit {
        database: "library".into(),
        ops: vec![
            LogOp::SetVersion { version: 1 },
            LogOp::CreateStore {
                name: "books".into(),
                key_path: Some("isbn".into()),
                auto_increment: false,
            },
            LogOp::Put {
                store: "books".into(),
                key: Key::from(1),
                value: Value::object([("isbn", Value::from(1)), ("title", Value::from("Dune"))]),
            },
        ],
    }
}

/// Commit log frames, valid and damaged.
///
/// Valid vectors expect the input to scan back unchanged; a torn frame
/// expects an empty result; the rest expect `"corruption"`.
pub fn log_vectors() -> Vec<TestVector> {
    let frame = sample_commit().frame().expect("Failed to frame sample commit");
    let delete = LogRecord::DeleteDatabase {
        database: "library".into(),
    }
    .frame()
    .expect("Failed to frame delete record");

    let mut two = frame.clone();
    two.extend_from_slice(&delete);

    let mut bad_magic = frame.clone();
    bad_magic[0] ^= 0xFF;

    let mut bad_crc = frame.clone();
    let last = bad_crc.len() - 1;
    bad_crc[last] ^= 0x01;

    let mut bad_payload = frame.clone();
    bad_payload[12] ^= 0x40;

    let mut bad_version = frame.clone();
    bad_version[4] = 0x7F;

    vec![
        TestVector::ok("log_commit", "single commit record", &frame, &frame),
        TestVector::ok("log_commit_delete", "commit then delete", &two, &two),
        TestVector::ok("log_torn", "record cut short", &frame[..frame.len() - 2], &[]),
        TestVector::ok("log_short_header", "fewer bytes than a header", &frame[..5], &[]),
        TestVector::failing("log_bad_magic", "magic bytes flipped", &bad_magic, "corruption"),
        TestVector::failing("log_bad_crc", "checksum off by one bit", &bad_crc, "corruption"),
        TestVector::failing("log_bad_payload", "payload bit flipped", &bad_payload, "corruption"),
        TestVector::failing("log_bad_version", "unknown format version", &bad_version, "corruption"),
    ]
}

/// Every vector as pretty JSON.
pub fn all_vectors_json() -> String {
    let mut vectors = codec_vectors();
    vectors.extend(log_vectors());
    serde_json::to_string_pretty(&vectors).expect("Failed to serialize vectors")
}

/// Parses vectors written by [`all_vectors_json`].
pub fn vectors_from_json(json: &str) -> serde_json::Result<Vec<TestVector>> {
    serde_json::from_str(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelfdb_codec::{from_cbor, to_canonical_cbor};
    use shelfdb_core::log::{compute_crc32, scan_log};
    use shelfdb_core::ErrorKind;

    #[test]
    fn hex_round_trip() {
        assert_eq!(hex_encode(&[0x00, 0xab, 0xff]), "00abff");
        assert_eq!(hex_decode("00ABff"), Some(vec![0x00, 0xab, 0xff]));
        assert_eq!(hex_decode("abc"), None);
        assert_eq!(hex_decode("zz"), None);
    }

    #[test]
    fn crc_check_value() {
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn codec_vectors_match_encoder() {
        for (vector, value) in codec_vectors().iter().zip(codec_vector_values()) {
            let bytes = hex_decode(&vector.expected_hex).unwrap();
            assert_eq!(to_canonical_cbor(&value).unwrap(), bytes, "{}", vector.id);
            assert_eq!(from_cbor(&bytes).unwrap(), value, "{}", vector.id);
        }
    }

    #[test]
    fn log_vectors_scan_as_expected() {
        for vector in log_vectors() {
            let input = hex_decode(&vector.input_hex).unwrap();
            match (&vector.expected_error, scan_log(&input)) {
                (None, Ok(scan)) => {
                    let expected = hex_decode(&vector.expected_hex).unwrap();
                    assert_eq!(scan.valid_len as usize, expected.len(), "{}", vector.id);
                    let rebuilt: Vec<u8> = scan
                        .entries
                        .iter()
                        .flat_map(|e| e.record.frame().unwrap())
                        .collect();
                    assert_eq!(rebuilt, expected, "{}", vector.id);
                }
                (Some(_), Err(e)) => assert_eq!(e.kind(), ErrorKind::Internal, "{}", vector.id),
                (expected, got) => panic!("{}: expected {expected:?}, got {got:?}", vector.id),
            }
        }
    }

    #[test]
    fn json_round_trip() {
        let json = all_vectors_json();
        let parsed = vectors_from_json(&json).unwrap();
        assert_eq!(parsed.len(), codec_vectors().len() + log_vectors().len());
        assert_eq!(parsed[0], codec_vectors()[0]);
    }
}
