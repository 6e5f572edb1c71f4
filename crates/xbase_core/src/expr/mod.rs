//! Key-expression provider interface.
//!
//! The index engine never interprets expression text itself. It asks an
//! [`ExpressionProvider`] to compile a tag's key expression into a
//! [`KeyExpression`] and its filter into a [`FilterExpression`], then
//! evaluates those against a [`RecordView`] of the record buffer.
//!
//! [`SimpleExpressions`] is the built-in provider. Applications with a full
//! dBASE expression engine plug in their own implementation through
//! `Table::open_with_provider`.

mod simple;

pub use simple::SimpleExpressions;

use crate::date::{julian_of_field, Date};
use crate::error::{XbError, XbResult};
use crate::schema::{field_no, FieldDesc};
use std::fmt;

/// Data type of an index key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    /// Fixed-length character key, compared bytewise.
    Char,
    /// IEEE double key.
    Numeric,
    /// Julian day number stored as a double.
    Date,
}

impl KeyType {
    /// Type character stored in index headers.
    #[must_use]
    pub const fn as_char(self) -> char {
        match self {
            Self::Char => 'C',
            Self::Numeric => 'N',
            Self::Date => 'D',
        }
    }

    /// Parses an index header type character.
    #[must_use]
    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'C' => Some(Self::Char),
            'N' | 'F' => Some(Self::Numeric),
            'D' => Some(Self::Date),
            _ => None,
        }
    }
}

/// A typed key value.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyValue {
    /// Character key text.
    Char(String),
    /// Numeric key.
    Numeric(f64),
    /// Julian day number.
    Date(f64),
}

impl KeyValue {
    /// Date key from a calendar date.
    #[must_use]
    pub fn date(date: Date) -> Self {
        Self::Date(date.julian() as f64)
    }

    /// Key type of this value.
    #[must_use]
    pub const fn key_type(&self) -> KeyType {
        match self {
            Self::Char(_) => KeyType::Char,
            Self::Numeric(_) => KeyType::Numeric,
            Self::Date(_) => KeyType::Date,
        }
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Char(s) => write!(f, "{s}"),
            Self::Numeric(n) => write!(f, "{n}"),
            Self::Date(j) => write!(f, "{}", Date::from_julian(*j as i64)),
        }
    }
}

/// Read-only view of one record buffer and its schema.
#[derive(Debug, Clone, Copy)]
pub struct RecordView<'a> {
    fields: &'a [FieldDesc],
    buf: &'a [u8],
}

impl<'a> RecordView<'a> {
    /// Wraps a record buffer.
    #[must_use]
    pub fn new(fields: &'a [FieldDesc], buf: &'a [u8]) -> Self {
        Self { fields, buf }
    }

    /// Field descriptors.
    #[must_use]
    pub fn fields(&self) -> &'a [FieldDesc] {
        self.fields
    }

    /// True if the delete flag is set.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.buf.first() == Some(&b'*')
    }

    /// Raw bytes of field `no`.
    ///
    /// # Errors
    ///
    /// Returns [`XbError::InvalidFieldNo`] if `no` is out of range.
    pub fn raw(&self, no: usize) -> XbResult<&'a [u8]> {
        let desc = self.fields.get(no).ok_or(XbError::InvalidFieldNo(no))?;
        Ok(&self.buf[desc.range()])
    }

    /// Field number for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`XbError::InvalidFieldName`] if no field matches.
    pub fn field_no(&self, name: &str) -> XbResult<usize> {
        field_no(self.fields, name)
    }

    /// Field text, untrimmed.
    ///
    /// # Errors
    ///
    /// Returns [`XbError::InvalidFieldNo`] if `no` is out of range.
    pub fn text(&self, no: usize) -> XbResult<String> {
        Ok(String::from_utf8_lossy(self.raw(no)?).into_owned())
    }

    /// Numeric value of a decimal text field; blank is zero.
    ///
    /// # Errors
    ///
    /// Returns [`XbError::InvalidData`] if the text is not a number.
    pub fn number(&self, no: usize) -> XbResult<f64> {
        let text = self.text(no)?;
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(0.0);
        }
        trimmed
            .parse::<f64>()
            .map_err(|_| XbError::invalid_data(&self.fields[no].name, format!("'{trimmed}' is not numeric")))
    }

    /// Julian day number of a date field; blank is zero.
    ///
    /// # Errors
    ///
    /// Returns [`XbError::InvalidDate`] for a malformed date.
    pub fn julian(&self, no: usize) -> XbResult<f64> {
        julian_of_field(self.raw(no)?)
    }
}

/// A compiled key expression.
pub trait KeyExpression: fmt::Debug + Send + Sync {
    /// The expression text as stored in the index header.
    fn source(&self) -> &str;

    /// Type of the produced key.
    fn key_type(&self) -> KeyType;

    /// Length in bytes of the stored key.
    fn key_len(&self) -> usize;

    /// Evaluates the key for a record.
    ///
    /// # Errors
    ///
    /// Returns an error if a referenced field holds data of the wrong shape.
    fn evaluate(&self, record: &RecordView<'_>) -> XbResult<KeyValue>;
}

/// A compiled tag filter.
pub trait FilterExpression: fmt::Debug + Send + Sync {
    /// The expression text as stored in the index header.
    fn source(&self) -> &str;

    /// Whether the record belongs in the tag.
    ///
    /// # Errors
    ///
    /// Returns an error if a referenced field holds data of the wrong shape.
    fn matches(&self, record: &RecordView<'_>) -> XbResult<bool>;
}

/// Compiles key and filter expressions against a table schema.
pub trait ExpressionProvider: fmt::Debug + Send + Sync {
    /// Compiles a key expression.
    ///
    /// # Errors
    ///
    /// Returns [`XbError::Parse`] or [`XbError::InvalidExpression`].
    fn compile_key(&self, source: &str, fields: &[FieldDesc]) -> XbResult<Box<dyn KeyExpression>>;

    /// Compiles a filter expression.
    ///
    /// # Errors
    ///
    /// Returns [`XbError::Parse`] or [`XbError::InvalidExpression`].
    fn compile_filter(
        &self,
        source: &str,
        fields: &[FieldDesc],
    ) -> XbResult<Box<dyn FilterExpression>>;
}
