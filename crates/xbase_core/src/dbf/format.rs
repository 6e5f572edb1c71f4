//! Table format versions.
//!
//! Version 3 and version 4 tables share one header layout and differ in
//! the field types they accept, their version byte and their memo layout.

use crate::error::{XbError, XbResult};
use crate::memo::MemoVersion;
use crate::schema::{validate_field_name, FieldSpec, FieldType};

/// Longest numeric or float field.
pub const MAX_NUMERIC_LEN: usize = 19;
/// Longest character field.
pub const MAX_CHAR_LEN: usize = 254;

/// Rules of one table format version.
pub trait TableFormat: std::fmt::Debug + Send + Sync {
    /// Version byte for a table with or without memo fields.
    fn version_byte(&self, has_memo: bool) -> u8;

    /// Layout of the companion memo file.
    fn memo_version(&self) -> MemoVersion;

    /// Whether `field_type` may appear in a table of this version.
    fn allows(&self, field_type: FieldType) -> bool;

    /// Checks one field and returns it with forced lengths applied.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFieldName`, `InvalidFieldType` or `InvalidFieldLen`.
    fn check_field(&self, spec: &FieldSpec) -> XbResult<FieldSpec> {
        validate_field_name(&spec.name)?;
        if !self.allows(spec.field_type) {
            return Err(XbError::InvalidFieldType {
                field: spec.name.clone(),
                field_type: spec.field_type.as_char(),
            });
        }
        let mut spec = spec.clone();
        match spec.field_type {
            FieldType::Char => {
                if spec.len == 0 || spec.len > MAX_CHAR_LEN {
                    return Err(bad_len(&spec));
                }
                spec.decimals = 0;
            }
            FieldType::Numeric | FieldType::Float => {
                if spec.len == 0 || spec.len > MAX_NUMERIC_LEN || spec.decimals > spec.len {
                    return Err(bad_len(&spec));
                }
            }
            FieldType::Date => {
                spec.len = 8;
                spec.decimals = 0;
            }
            FieldType::Logical => {
                spec.len = 1;
                spec.decimals = 0;
            }
            FieldType::Memo => {
                spec.len = 10;
                spec.decimals = 0;
            }
        }
        Ok(spec)
    }
}

fn bad_len(spec: &FieldSpec) -> XbError {
    XbError::InvalidFieldLen {
        field: spec.name.clone(),
        len: spec.len,
        decimals: spec.decimals,
    }
}

/// dBASE III.
#[derive(Debug, Clone, Copy, Default)]
pub struct Dbase3;

impl TableFormat for Dbase3 {
    fn version_byte(&self, has_memo: bool) -> u8 {
        if has_memo {
            0x83
        } else {
            0x03
        }
    }

    fn memo_version(&self) -> MemoVersion {
        MemoVersion::V3
    }

    fn allows(&self, field_type: FieldType) -> bool {
        field_type != FieldType::Float
    }
}

/// dBASE IV.
#[derive(Debug, Clone, Copy, Default)]
pub struct Dbase4;

impl TableFormat for Dbase4 {
    fn version_byte(&self, has_memo: bool) -> u8 {
        if has_memo {
            0x8B
        } else {
            0x04
        }
    }

    fn memo_version(&self) -> MemoVersion {
        MemoVersion::V4
    }

    fn allows(&self, _field_type: FieldType) -> bool {
        true
    }
}

/// Table format version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TableVersion {
    /// dBASE III: no float fields.
    V3,
    /// dBASE IV.
    #[default]
    V4,
}

impl TableVersion {
    /// Rules of this version.
    #[must_use]
    pub fn format(self) -> &'static dyn TableFormat {
        match self {
            Self::V3 => &Dbase3,
            Self::V4 => &Dbase4,
        }
    }

    /// Recognizes a header version byte and whether it carries memo bits.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOption` for a version byte this engine does not read.
    pub fn from_byte(byte: u8) -> XbResult<(Self, bool)> {
        match byte {
            0x03 => Ok((Self::V3, false)),
            0x83 => Ok((Self::V3, true)),
            0x04 => Ok((Self::V4, false)),
            0x8B => Ok((Self::V4, true)),
            other => Err(XbError::InvalidOption(format!("table version byte {other:#04x}"))),
        }
    }

    /// Numeric version as the maintenance tools print it.
    #[must_use]
    pub const fn number(self) -> u8 {
        match self {
            Self::V3 => 3,
            Self::V4 => 4,
        }
    }
}

impl TryFrom<i16> for TableVersion {
    type Error = XbError;

    fn try_from(value: i16) -> XbResult<Self> {
        match value {
            3 => Ok(Self::V3),
            4 => Ok(Self::V4),
            other => Err(XbError::InvalidOption(format!("table version {other}"))),
        }
    }
}
