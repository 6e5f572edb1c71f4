//! Field types and descriptors.

use crate::error::{XbError, XbResult};

/// Longest field name stored in a descriptor.
pub const MAX_FIELD_NAME_LEN: usize = 10;

/// Data type of a table field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// `C`: space padded text.
    Char,
    /// `N`: right-justified decimal text.
    Numeric,
    /// `D`: `CCYYMMDD` date.
    Date,
    /// `L`: `T`/`F`/`?` flag.
    Logical,
    /// `F`: floating decimal text (version 4 only).
    Float,
    /// `M`: memo block reference.
    Memo,
}

impl FieldType {
    /// Type character stored in the field descriptor.
    #[must_use]
    pub const fn as_char(self) -> char {
        match self {
            Self::Char => 'C',
            Self::Numeric => 'N',
            Self::Date => 'D',
            Self::Logical => 'L',
            Self::Float => 'F',
            Self::Memo => 'M',
        }
    }

    /// Parses a descriptor type character.
    #[must_use]
    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'C' => Some(Self::Char),
            'N' => Some(Self::Numeric),
            'D' => Some(Self::Date),
            'L' => Some(Self::Logical),
            'F' => Some(Self::Float),
            'M' => Some(Self::Memo),
            _ => None,
        }
    }

    /// True for the decimal text types.
    #[must_use]
    pub const fn is_numeric(self) -> bool {
        matches!(self, Self::Numeric | Self::Float)
    }
}

/// One field of a table definition, as supplied to `Table::create`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    /// Field name, 1 to 10 characters.
    pub name: String,
    /// Field type.
    pub field_type: FieldType,
    /// Field length in bytes. Forced for date, logical and memo fields.
    pub len: usize,
    /// Decimal count for numeric and float fields.
    pub decimals: usize,
}

impl FieldSpec {
    /// Creates a field definition.
    pub fn new(name: impl Into<String>, field_type: FieldType, len: usize, decimals: usize) -> Self {
        Self {
            name: name.into(),
            field_type,
            len,
            decimals,
        }
    }

    /// Character field of `len` bytes.
    pub fn char(name: impl Into<String>, len: usize) -> Self {
        Self::new(name, FieldType::Char, len, 0)
    }

    /// Numeric field.
    pub fn numeric(name: impl Into<String>, len: usize, decimals: usize) -> Self {
        Self::new(name, FieldType::Numeric, len, decimals)
    }

    /// Float field.
    pub fn float(name: impl Into<String>, len: usize, decimals: usize) -> Self {
        Self::new(name, FieldType::Float, len, decimals)
    }

    /// Date field.
    pub fn date(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Date, 8, 0)
    }

    /// Logical field.
    pub fn logical(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Logical, 1, 0)
    }

    /// Memo field.
    pub fn memo(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Memo, 10, 0)
    }
}

/// A field as laid out in an open table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDesc {
    /// Upper-cased field name.
    pub name: String,
    /// Field type.
    pub field_type: FieldType,
    /// Byte offset in the record, counting the delete flag at offset 0.
    pub offset: usize,
    /// Field length in bytes.
    pub len: usize,
    /// Decimal count.
    pub decimals: usize,
    /// Version 4 production index flag.
    pub index_flag: bool,
}

impl FieldDesc {
    /// Byte range of the field inside a record buffer.
    #[must_use]
    pub fn range(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.len
    }
}

/// Checks a field name: 1 to 10 characters, a letter first, then letters,
/// digits or underscores.
///
/// # Errors
///
/// Returns [`XbError::InvalidFieldName`] for anything else.
pub fn validate_field_name(name: &str) -> XbResult<()> {
    let mut chars = name.chars();
    let ok = name.len() <= MAX_FIELD_NAME_LEN
        && chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if ok {
        Ok(())
    } else {
        Err(XbError::InvalidFieldName(name.to_string()))
    }
}

/// Lays out validated field specs into descriptors, starting after the
/// delete flag byte. Returns the descriptors and the full record length.
#[must_use]
pub fn layout(specs: &[FieldSpec]) -> (Vec<FieldDesc>, usize) {
    let mut offset = 1;
    let fields = specs
        .iter()
        .map(|spec| {
            let desc = FieldDesc {
                name: spec.name.to_ascii_uppercase(),
                field_type: spec.field_type,
                offset,
                len: spec.len,
                decimals: spec.decimals,
                index_flag: false,
            };
            offset += spec.len;
            desc
        })
        .collect();
    (fields, offset)
}

/// Looks up a field number by case-insensitive name.
///
/// # Errors
///
/// Returns [`XbError::InvalidFieldName`] if no field matches.
pub fn field_no(fields: &[FieldDesc], name: &str) -> XbResult<usize> {
    fields
        .iter()
        .position(|f| f.name.eq_ignore_ascii_case(name.trim()))
        .ok_or_else(|| XbError::InvalidFieldName(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_offsets_follow_delete_flag() {
        let (fields, reclen) = layout(&[FieldSpec::char("name", 5), FieldSpec::numeric("amount", 9, 2)]);
        assert_eq!(fields[0].name, "NAME");
        assert_eq!(fields[0].offset, 1);
        assert_eq!(fields[1].offset, 6);
        assert_eq!(reclen, 15);
    }

    #[test]
    fn field_names_are_checked() {
        assert!(validate_field_name("AMOUNT_1").is_ok());
        assert!(validate_field_name("1AMOUNT").is_err());
        assert!(validate_field_name("ELEVENCHARS").is_err());
        assert!(validate_field_name("").is_err());
    }

    #[test]
    fn lookup_ignores_case() {
        let (fields, _) = layout(&[FieldSpec::char("NAME", 5), FieldSpec::date("BORN")]);
        assert_eq!(field_no(&fields, "born").unwrap(), 1);
        assert!(matches!(
            field_no(&fields, "missing"),
            Err(XbError::InvalidFieldName(_))
        ));
    }

    #[test]
    fn type_chars_round_trip() {
        for t in [
            FieldType::Char,
            FieldType::Numeric,
            FieldType::Date,
            FieldType::Logical,
            FieldType::Float,
            FieldType::Memo,
        ] {
            assert_eq!(FieldType::from_char(t.as_char()), Some(t));
        }
        assert_eq!(FieldType::from_char('X'), None);
    }
}
