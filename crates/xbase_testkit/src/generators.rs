//! Property-based test generators using proptest.
//!
//! Values are generated so they always fit the fields they are meant for;
//! properties then test engine behavior, not input validation.

use proptest::prelude::*;

/// Strategy for valid field names: a letter, then letters, digits or `_`.
pub fn field_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Z][A-Z0-9_]{0,9}").expect("Invalid regex")
}

/// Strategy for printable text of at most `len` characters with no
/// trailing blanks.
pub fn char_value_strategy(len: usize) -> impl Strategy<Value = String> {
    prop::string::string_regex(&format!("[A-Z0-9]{{0,{len}}}")).expect("Invalid regex")
}

/// Strategy for amounts that fit a N(9,2) field.
pub fn amount_strategy() -> impl Strategy<Value = f64> {
    (-99_999i64..999_999).prop_map(|cents| cents as f64 / 100.0)
}

/// Strategy for `CCYYMMDD` dates between 1900 and 2099.
pub fn date8_strategy() -> impl Strategy<Value = String> {
    (1900u32..2100, 1u32..=12, 1u32..=28).prop_map(|(y, m, d)| format!("{y:04}{m:02}{d:02}"))
}

/// One step of a random table workload.
#[derive(Debug, Clone)]
pub enum TableOp {
    /// Append a record.
    Append {
        /// Key text.
        code: String,
        /// Amount.
        amount: f64,
    },
    /// Change the key of an existing record, picked by position modulo the
    /// record count.
    Rekey {
        /// Record selector.
        slot: usize,
        /// New key text.
        code: String,
    },
    /// Toggle the delete flag of an existing record.
    ToggleDelete {
        /// Record selector.
        slot: usize,
    },
}

/// Strategy for a single [`TableOp`] with keys of at most `key_len`
/// characters.
pub fn table_op_strategy(key_len: usize) -> impl Strategy<Value = TableOp> {
    prop_oneof![
        4 => (char_value_strategy(key_len), amount_strategy())
            .prop_map(|(code, amount)| TableOp::Append { code, amount }),
        2 => (any::<usize>(), char_value_strategy(key_len))
            .prop_map(|(slot, code)| TableOp::Rekey { slot, code }),
        1 => any::<usize>().prop_map(|slot| TableOp::ToggleDelete { slot }),
    ]
}

/// Strategy for a workload of up to `max_ops` operations.
pub fn table_ops_strategy(key_len: usize, max_ops: usize) -> impl Strategy<Value = Vec<TableOp>> {
    prop::collection::vec(table_op_strategy(key_len), 1..max_ops)
}

/// Proptest configuration for the slower file-backed properties.
pub fn file_proptest_config() -> ProptestConfig {
    ProptestConfig {
        cases: 24,
        ..ProptestConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn char_values_fit(value in char_value_strategy(6)) {
            prop_assert!(value.len() <= 6);
            prop_assert_eq!(value.trim_end(), value.as_str());
        }

        #[test]
        fn amounts_fit_nine_two(amount in amount_strategy()) {
            let formatted = format!("{amount:>9.2}");
            prop_assert!(formatted.len() <= 9);
        }

        #[test]
        fn dates_parse(text in date8_strategy()) {
            prop_assert!(xbase_core::Date::parse(&text).is_ok());
        }
    }
}
