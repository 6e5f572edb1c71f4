//! Error types for the table engine.

use std::io;
use std::path::PathBuf;
use thiserror::Error;
use xbase_storage::StorageError;

/// Result type for table and index operations.
pub type XbResult<T> = Result<T, XbError>;

/// Numeric return codes of the classic xBase API.
///
/// Every [`XbError`] maps onto one of these through [`XbError::code`], and the
/// navigation outcomes map onto `Eof`, `Bof` and `Empty`. The values are the
/// signed 16-bit codes existing xBase tooling expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum ErrorCode {
    /// Success.
    NoError = 0,
    /// An option value is not recognized.
    InvalidOption = -101,
    /// Key already present in a unique tag.
    KeyNotUnique = -121,
    /// Object already defined.
    AlreadyDefined = -123,
    /// File already exists.
    FileExists = -200,
    /// File not found.
    FileNotFound = -203,
    /// Table or index is not open.
    NotOpen = -207,
    /// Key or record not found.
    NotFound = -208,
    /// Seek failed.
    SeekError = -211,
    /// Read failed.
    ReadError = -212,
    /// Write failed.
    WriteError = -213,
    /// Past the end of the table or tag.
    Eof = -214,
    /// Before the beginning of the table or tag.
    Bof = -215,
    /// Block size is not valid for the file format.
    InvalidBlockSize = -216,
    /// Block number out of range.
    InvalidBlockNo = -217,
    /// Record number out of range.
    InvalidRecord = -218,
    /// Table has no records.
    Empty = -221,
    /// Field type is not valid for the table version.
    InvalidFieldType = -300,
    /// Field number out of range.
    InvalidFieldNo = -301,
    /// Data does not fit the field.
    InvalidData = -302,
    /// Field name unknown or malformed.
    InvalidFieldName = -303,
    /// Memo field operation on a non-memo field.
    InvalidMemoField = -304,
    /// Field length is not valid for the field type.
    InvalidFieldLen = -306,
    /// Date value is not valid.
    InvalidDate = -307,
    /// Lock option is not recognized.
    InvalidLockOption = -400,
    /// Lock could not be obtained.
    LockFailed = -401,
    /// The operation needs the table lock.
    TableNotLocked = -402,
    /// Expression could not be parsed.
    ParseError = -500,
    /// Expression is not valid for this use.
    InvalidExpression = -507,
    /// Index file is damaged or not an index.
    InvalidIndex = -601,
    /// Tag name unknown or malformed.
    InvalidTag = -602,
}

impl ErrorCode {
    /// Returns the signed 16-bit value of the code.
    #[must_use]
    pub const fn value(self) -> i16 {
        self as i16
    }
}

/// Errors that can occur in table, index, lock and memo operations.
#[derive(Debug, Error)]
pub enum XbError {
    /// File access layer error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O error outside the storage layer (lock files, INF files).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The table or index file already exists.
    #[error("file already exists: {}", path.display())]
    FileExists {
        /// The existing file.
        path: PathBuf,
    },

    /// The table or index file does not exist.
    #[error("file not found: {}", path.display())]
    FileNotFound {
        /// The missing file.
        path: PathBuf,
    },

    /// The table is closed.
    #[error("table is not open")]
    NotOpen,

    /// Field type not valid for the table version.
    #[error("invalid field type '{field_type}' for field {field}")]
    InvalidFieldType {
        /// Field name.
        field: String,
        /// Offending type character.
        field_type: char,
    },

    /// Field length or decimal count out of range.
    #[error("invalid length {len}.{decimals} for field {field}")]
    InvalidFieldLen {
        /// Field name.
        field: String,
        /// Requested length.
        len: usize,
        /// Requested decimal count.
        decimals: usize,
    },

    /// Field number out of range.
    #[error("invalid field number {0}")]
    InvalidFieldNo(usize),

    /// Field name unknown or malformed.
    #[error("invalid field name: {0}")]
    InvalidFieldName(String),

    /// Value does not fit the field.
    #[error("invalid data for field {field}: {message}")]
    InvalidData {
        /// Field name.
        field: String,
        /// What was wrong.
        message: String,
    },

    /// Date string is not a valid CCYYMMDD date.
    #[error("invalid date: {0}")]
    InvalidDate(String),

    /// Memo operation on a field that is not a memo field, or no memo file.
    #[error("invalid memo field: {0}")]
    InvalidMemoField(String),

    /// A name is defined twice.
    #[error("already defined: {0}")]
    AlreadyDefined(String),

    /// Record number out of range.
    #[error("invalid record number {recno} (record count {count})")]
    InvalidRecord {
        /// Requested record.
        recno: u32,
        /// Records in the table.
        count: u32,
    },

    /// Lock option value not recognized.
    #[error("invalid lock option {0}")]
    InvalidLockOption(i16),

    /// Option value not recognized.
    #[error("invalid option: {0}")]
    InvalidOption(String),

    /// A lock could not be obtained without waiting.
    #[error("lock failed: {resource}")]
    LockFailed {
        /// The resource that could not be locked.
        resource: String,
    },

    /// The operation requires the table lock.
    #[error("table lock required for {0}")]
    TableNotLocked(&'static str),

    /// Key already present in a unique tag.
    #[error("key not unique in tag {tag}")]
    KeyNotUnique {
        /// Tag name.
        tag: String,
    },

    /// Tag unknown, malformed or not allowed here.
    #[error("invalid tag: {0}")]
    InvalidTag(String),

    /// Index file unknown, damaged or of the wrong kind.
    #[error("invalid index: {message}")]
    InvalidIndex {
        /// Description of the problem.
        message: String,
    },

    /// Block size not valid for the file format.
    #[error("invalid block size {0}")]
    InvalidBlockSize(usize),

    /// Node or memo block number out of range.
    #[error("invalid block number {0}")]
    InvalidBlockNo(u32),

    /// Key expression or filter could not be parsed.
    #[error("parse error in '{expression}': {message}")]
    Parse {
        /// Source text.
        expression: String,
        /// Description of the problem.
        message: String,
    },

    /// Expression parsed but cannot be used here.
    #[error("invalid expression '{expression}': {message}")]
    InvalidExpression {
        /// Source text.
        expression: String,
        /// Description of the problem.
        message: String,
    },

    /// Requested key or record does not exist.
    #[error("not found")]
    NotFound,
}

impl XbError {
    /// Creates an invalid data error.
    pub fn invalid_data(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidData {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid index error.
    pub fn invalid_index(message: impl Into<String>) -> Self {
        Self::InvalidIndex {
            message: message.into(),
        }
    }

    /// Creates a lock failure for `resource`.
    pub fn lock_failed(resource: impl Into<String>) -> Self {
        Self::LockFailed {
            resource: resource.into(),
        }
    }

    /// Creates a parse error.
    pub fn parse(expression: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            expression: expression.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid expression error.
    pub fn invalid_expression(expression: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidExpression {
            expression: expression.into(),
            message: message.into(),
        }
    }

    /// Returns true for the duplicate-key business rule failure.
    #[must_use]
    pub fn is_key_not_unique(&self) -> bool {
        matches!(self, Self::KeyNotUnique { .. })
    }

    /// Returns true if the failure was a lock conflict.
    #[must_use]
    pub fn is_lock_failed(&self) -> bool {
        matches!(self, Self::LockFailed { .. })
    }

    /// Maps the error onto its classic numeric return code.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Storage(e) => storage_code(e),
            Self::Io(_) => ErrorCode::ReadError,
            Self::FileExists { .. } => ErrorCode::FileExists,
            Self::FileNotFound { .. } => ErrorCode::FileNotFound,
            Self::NotOpen => ErrorCode::NotOpen,
            Self::InvalidFieldType { .. } => ErrorCode::InvalidFieldType,
            Self::InvalidFieldLen { .. } => ErrorCode::InvalidFieldLen,
            Self::InvalidFieldNo(_) => ErrorCode::InvalidFieldNo,
            Self::InvalidFieldName(_) => ErrorCode::InvalidFieldName,
            Self::InvalidData { .. } => ErrorCode::InvalidData,
            Self::InvalidDate(_) => ErrorCode::InvalidDate,
            Self::InvalidMemoField(_) => ErrorCode::InvalidMemoField,
            Self::AlreadyDefined(_) => ErrorCode::AlreadyDefined,
            Self::InvalidRecord { .. } => ErrorCode::InvalidRecord,
            Self::InvalidLockOption(_) => ErrorCode::InvalidLockOption,
            Self::InvalidOption(_) => ErrorCode::InvalidOption,
            Self::LockFailed { .. } => ErrorCode::LockFailed,
            Self::TableNotLocked(_) => ErrorCode::TableNotLocked,
            Self::KeyNotUnique { .. } => ErrorCode::KeyNotUnique,
            Self::InvalidTag(_) => ErrorCode::InvalidTag,
            Self::InvalidIndex { .. } => ErrorCode::InvalidIndex,
            Self::InvalidBlockSize(_) => ErrorCode::InvalidBlockSize,
            Self::InvalidBlockNo(_) => ErrorCode::InvalidBlockNo,
            Self::Parse { .. } => ErrorCode::ParseError,
            Self::InvalidExpression { .. } => ErrorCode::InvalidExpression,
            Self::NotFound => ErrorCode::NotFound,
        }
    }
}

fn storage_code(error: &StorageError) -> ErrorCode {
    match error {
        StorageError::Seek { .. } => ErrorCode::SeekError,
        StorageError::Write { .. } | StorageError::Rename { .. } => ErrorCode::WriteError,
        StorageError::FileExists { .. } => ErrorCode::FileExists,
        StorageError::FileNotFound { .. } => ErrorCode::FileNotFound,
        StorageError::Read { .. } | StorageError::ReadPastEnd { .. } | StorageError::Io(_) => {
            ErrorCode::ReadError
        }
    }
}

/// Lifts storage create/open failures into the table-level variants.
pub(crate) fn from_storage(error: StorageError) -> XbError {
    match error {
        StorageError::FileExists { path } => XbError::FileExists { path },
        StorageError::FileNotFound { path } => XbError::FileNotFound { path },
        other => XbError::Storage(other),
    }
}
