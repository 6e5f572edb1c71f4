//! Packed-decimal numeric keys of MDX tags.
//!
//! A key is 12 bytes:
//!
//! | Offset | Content |
//! |--------|---------|
//! | 0      | position of the decimal point plus 52 |
//! | 1      | `0x80` sign, digit count in bits 2..=6, bit 0 always set |
//! | 2..12  | up to 20 digits, two per byte, high nibble first |
//!
//! Values are rendered with six decimals before packing, so smaller
//! fractions are lost. Leading integer zeros and trailing fraction zeros
//! are not stored. Date keys of MDX tags stay 8-byte doubles.

use std::cmp::Ordering;

/// Stored length of an MDX numeric key.
pub const BCD_KEY_LEN: usize = 12;

const POINT_BIAS: i32 = 52;
const SIGN_BIT: u8 = 0x80;
const MAX_DIGITS: usize = 20;
const MAX_DIGIT_COUNT: usize = 31;

/// Packs `value` into a 12-byte key. Non-finite values pack as zero.
#[must_use]
pub fn encode_bcd(value: f64) -> [u8; BCD_KEY_LEN] {
    let value = if value.is_finite() { value } else { 0.0 };
    let text = format!("{:.6}", value.abs());
    let (int_part, frac_part) = text.split_once('.').unwrap_or((text.as_str(), ""));
    let int_digits = int_part.trim_start_matches('0');
    let frac_digits = frac_part.trim_end_matches('0');

    let (point, digits) = if int_digits.is_empty() {
        let significant = frac_digits.trim_start_matches('0');
        let leading = frac_digits.len() - significant.len();
        (-(leading as i32), significant.to_string())
    } else {
        (int_digits.len() as i32, format!("{int_digits}{frac_digits}"))
    };
    // The count includes fraction zeros ahead of the first digit even
    // though they are not stored.
    let count = (int_digits.len() + frac_digits.len()).min(MAX_DIGIT_COUNT);

    let mut out = [0u8; BCD_KEY_LEN];
    out[0] = (POINT_BIAS + point) as u8;
    out[1] = ((count as u8) << 2) | 0x01;
    if !digits.is_empty() && value.is_sign_negative() {
        out[1] |= SIGN_BIT;
    }
    for (i, d) in digits.bytes().take(MAX_DIGITS).enumerate() {
        let nibble = d - b'0';
        out[2 + i / 2] |= if i % 2 == 0 { nibble << 4 } else { nibble };
    }
    out
}

fn is_negative(key: &[u8]) -> bool {
    key[1] & SIGN_BIT != 0
}

fn digit_count(key: &[u8]) -> usize {
    usize::from((key[1] & 0x7C) >> 2)
}

fn point(key: &[u8]) -> i32 {
    i32::from(key[0]) - POINT_BIAS
}

fn is_zero(key: &[u8]) -> bool {
    key[2..BCD_KEY_LEN].iter().all(|&b| b == 0)
}

fn digits(key: &[u8]) -> String {
    (0..digit_count(key).min(MAX_DIGITS))
        .map(|i| {
            let byte = key[2 + i / 2];
            let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0F };
            char::from(b'0' + nibble.min(9))
        })
        .collect()
}

/// Unpacks a 12-byte key.
#[must_use]
pub fn decode_bcd(key: &[u8]) -> f64 {
    if key.len() < BCD_KEY_LEN || is_zero(key) {
        return 0.0;
    }
    let sign = if is_negative(key) { "-" } else { "" };
    format!("{sign}0.{}e{}", digits(key), point(key))
        .parse()
        .unwrap_or(0.0)
}

/// Compares two packed keys numerically.
///
/// Zero sorts between the negative and positive keys whatever its point
/// byte says.
#[must_use]
pub fn compare_bcd(a: &[u8], b: &[u8]) -> Ordering {
    let class = |k: &[u8]| -> i8 {
        if is_zero(k) {
            0
        } else if is_negative(k) {
            -1
        } else {
            1
        }
    };
    let (ca, cb) = (class(a), class(b));
    if ca != cb || ca == 0 {
        return ca.cmp(&cb);
    }
    let magnitude = point(a)
        .cmp(&point(b))
        .then_with(|| a[2..BCD_KEY_LEN].cmp(&b[2..BCD_KEY_LEN]));
    if ca < 0 {
        magnitude.reverse()
    } else {
        magnitude
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_of_known_values() {
        let k = encode_bcd(12.25);
        assert_eq!(k[0], 54);
        assert_eq!(k[1], (4 << 2) | 0x01);
        assert_eq!(&k[2..4], &[0x12, 0x25]);
        assert!(k[4..].iter().all(|&b| b == 0));

        let k = encode_bcd(-100.0);
        assert_eq!(k[0], 55);
        assert_eq!(k[1], 0x80 | (3 << 2) | 0x01);
        assert_eq!(&k[2..4], &[0x10, 0x00]);

        let k = encode_bcd(0.05);
        assert_eq!(k[0], 51);
        assert_eq!(k[1], (2 << 2) | 0x01);
        assert_eq!(k[2], 0x50);
    }

    #[test]
    fn zero_has_one_encoding() {
        let zero = encode_bcd(0.0);
        assert_eq!(zero[0], 52);
        assert_eq!(zero[1], 0x01);
        assert_eq!(encode_bcd(-0.0), zero);
        assert_eq!(encode_bcd(-0.000_000_1), zero);
        assert_eq!(decode_bcd(&zero), 0.0);
    }

    #[test]
    fn values_come_back() {
        for v in [1.0, -1.0, 12.25, -12.25, 0.05, -0.05, 0.5, 100.0, 123_456.789, -98_765.4321, 1e15] {
            assert_eq!(decode_bcd(&encode_bcd(v)), v, "{v}");
        }
    }

    #[test]
    fn keys_order_numerically() {
        let values = [-1000.0, -12.5, -12.25, -1.0, -0.05, 0.0, 0.05, 0.5, 1.0, 9.99, 10.0, 12.25, 1e6];
        for pair in values.windows(2) {
            let (lo, hi) = (encode_bcd(pair[0]), encode_bcd(pair[1]));
            assert_eq!(compare_bcd(&lo, &hi), Ordering::Less, "{} < {}", pair[0], pair[1]);
            assert_eq!(compare_bcd(&hi, &lo), Ordering::Greater, "{} > {}", pair[1], pair[0]);
        }
        assert_eq!(compare_bcd(&encode_bcd(7.5), &encode_bcd(7.50)), Ordering::Equal);
    }
}
