//! Stored key encoding and comparison.
//!
//! Character keys are the key text space-padded to the key length and
//! compare bytewise. Date keys, and the numeric keys of NDX tags, are
//! 8-byte little-endian doubles. MDX numeric keys are 12-byte packed
//! decimals; the stored key length tells the two numeric forms apart.

use super::bcd::{compare_bcd, decode_bcd, encode_bcd, BCD_KEY_LEN};
use crate::error::{XbError, XbResult};
use crate::expr::{KeyType, KeyValue};
use std::cmp::Ordering;
use xbase_storage::endian::{get_f64, put_f64};

/// Stored length of double-encoded numeric and date keys.
pub const NUMERIC_KEY_LEN: usize = 8;

/// Encodes `value` into exactly `key_len` stored bytes.
///
/// Numeric and date values are interchangeable; character text longer than
/// the key is cut.
///
/// # Errors
///
/// Returns [`XbError::InvalidData`] when a character value meets a numeric
/// tag or the reverse.
pub fn encode_key(tag: &str, value: &KeyValue, key_type: KeyType, key_len: usize) -> XbResult<Vec<u8>> {
    match (value, key_type) {
        (KeyValue::Char(text), KeyType::Char) => {
            let mut out = vec![b' '; key_len];
            let bytes = text.as_bytes();
            let n = bytes.len().min(key_len);
            out[..n].copy_from_slice(&bytes[..n]);
            Ok(out)
        }
        (KeyValue::Numeric(v) | KeyValue::Date(v), KeyType::Numeric) if key_len == BCD_KEY_LEN => {
            Ok(encode_bcd(*v).to_vec())
        }
        (KeyValue::Numeric(v) | KeyValue::Date(v), KeyType::Numeric | KeyType::Date) => {
            let mut out = vec![0u8; NUMERIC_KEY_LEN];
            // Collapse -0.0 so equal keys are equal bytes.
            put_f64(&mut out, 0, if *v == 0.0 { 0.0 } else { *v });
            Ok(out)
        }
        _ => Err(XbError::invalid_data(
            tag,
            format!(
                "{} key for a {} tag",
                value.key_type().as_char(),
                key_type.as_char()
            ),
        )),
    }
}

/// Decodes stored key bytes.
#[must_use]
pub fn decode_key(bytes: &[u8], key_type: KeyType) -> KeyValue {
    match key_type {
        KeyType::Char => KeyValue::Char(String::from_utf8_lossy(bytes).into_owned()),
        KeyType::Numeric if bytes.len() == BCD_KEY_LEN => KeyValue::Numeric(decode_bcd(bytes)),
        KeyType::Numeric => KeyValue::Numeric(get_f64(bytes, 0)),
        KeyType::Date => KeyValue::Date(get_f64(bytes, 0)),
    }
}

/// Compares two stored keys in ascending order.
#[must_use]
pub fn compare_keys(key_type: KeyType, a: &[u8], b: &[u8]) -> Ordering {
    match key_type {
        KeyType::Char => a.cmp(b),
        KeyType::Numeric if a.len() == BCD_KEY_LEN && b.len() == BCD_KEY_LEN => compare_bcd(a, b),
        KeyType::Numeric | KeyType::Date => get_f64(a, 0).total_cmp(&get_f64(b, 0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn char_keys_pad_and_cut() {
        let k = encode_key("T", &KeyValue::Char("AB".into()), KeyType::Char, 4).unwrap();
        assert_eq!(k, b"AB  ");
        let k = encode_key("T", &KeyValue::Char("ABCDEF".into()), KeyType::Char, 4).unwrap();
        assert_eq!(k, b"ABCD");
    }

    #[test]
    fn numeric_keys_order_numerically() {
        let enc = |v: f64| encode_key("T", &KeyValue::Numeric(v), KeyType::Numeric, 8).unwrap();
        assert_eq!(compare_keys(KeyType::Numeric, &enc(-5.0), &enc(2.0)), Ordering::Less);
        assert_eq!(compare_keys(KeyType::Numeric, &enc(10.0), &enc(9.5)), Ordering::Greater);
        assert_eq!(compare_keys(KeyType::Numeric, &enc(-0.0), &enc(0.0)), Ordering::Equal);
        assert_eq!(decode_key(&enc(12.25), KeyType::Numeric), KeyValue::Numeric(12.25));
    }

    #[test]
    fn twelve_byte_numeric_keys_are_packed_decimals() {
        let enc = |v: f64| encode_key("T", &KeyValue::Numeric(v), KeyType::Numeric, BCD_KEY_LEN).unwrap();
        assert_eq!(enc(-3.5).len(), BCD_KEY_LEN);
        assert_eq!(compare_keys(KeyType::Numeric, &enc(-3.5), &enc(0.0)), Ordering::Less);
        assert_eq!(compare_keys(KeyType::Numeric, &enc(0.0), &enc(0.25)), Ordering::Less);
        assert_eq!(compare_keys(KeyType::Numeric, &enc(40.0), &enc(4.0)), Ordering::Greater);
        assert_eq!(decode_key(&enc(-3.5), KeyType::Numeric), KeyValue::Numeric(-3.5));

        let date = encode_key("T", &KeyValue::Date(2_451_545.0), KeyType::Date, NUMERIC_KEY_LEN).unwrap();
        assert_eq!(date.len(), NUMERIC_KEY_LEN);
    }

    #[test]
    fn mismatched_types_are_rejected() {
        assert!(encode_key("T", &KeyValue::Char("1".into()), KeyType::Numeric, 8).is_err());
        assert!(encode_key("T", &KeyValue::Numeric(1.0), KeyType::Char, 8).is_err());
        assert!(encode_key("T", &KeyValue::Date(2_451_545.0), KeyType::Numeric, 8).is_ok());
    }
}
