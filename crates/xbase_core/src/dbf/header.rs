//! DBF file header and field descriptors.
//!
//! ```text
//! 0      version byte
//! 1..4   last update YY MM DD (YY = year - 1900)
//! 4..8   record count
//! 8..10  header length = 32 + 32 * fields + 1
//! 10..12 record length, delete flag included
//! 14     transaction flag
//! 15     encryption flag
//! 28     production MDX flag
//! 29     language driver
//! 32..   field descriptors, 0x0D terminator
//! ```

use super::format::TableVersion;
use crate::date::Date;
use crate::error::{XbError, XbResult};
use crate::schema::{FieldDesc, FieldType};
use xbase_storage::endian::{get_u16, get_u32, put_u16, put_u32};

/// Length of the fixed header and of each field descriptor.
pub const DESCRIPTOR_LEN: usize = 32;
/// Ends the field descriptor array.
pub const HEADER_TERMINATOR: u8 = 0x0D;
/// Follows the last record.
pub const EOF_MARKER: u8 = 0x1A;

/// The fixed 32-byte table header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableHeader {
    /// Format version.
    pub version: TableVersion,
    /// Whether the version byte carries the memo bit.
    pub has_memo: bool,
    /// Last update as YY MM DD.
    pub updated: [u8; 3],
    /// Records in the file, deleted ones included.
    pub record_count: u32,
    /// Bytes before the first record.
    pub header_len: u16,
    /// Bytes per record.
    pub record_len: u16,
    /// Incomplete transaction flag.
    pub transaction: u8,
    /// Encryption flag.
    pub encryption: u8,
    /// Production MDX present.
    pub production_mdx: bool,
    /// Language driver id.
    pub language_driver: u8,
}

/// YY MM DD bytes for `date`.
#[must_use]
pub fn update_stamp(date: Date) -> [u8; 3] {
    [
        (date.year() - 1900).clamp(0, 255) as u8,
        date.month() as u8,
        date.day() as u8,
    ]
}

impl TableHeader {
    /// Header for a new, empty table.
    #[must_use]
    pub fn new(version: TableVersion, fields: &[FieldDesc], record_len: usize) -> Self {
        Self {
            version,
            has_memo: fields.iter().any(|f| f.field_type == FieldType::Memo),
            updated: update_stamp(Date::today()),
            record_count: 0,
            header_len: (DESCRIPTOR_LEN + DESCRIPTOR_LEN * fields.len() + 1) as u16,
            record_len: record_len as u16,
            transaction: 0,
            encryption: 0,
            production_mdx: false,
            language_driver: 0,
        }
    }

    /// Decodes the first 32 bytes of a table file.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOption` for an unknown version byte and `InvalidData`
    /// for impossible lengths.
    pub fn decode(buf: &[u8]) -> XbResult<Self> {
        let (version, has_memo) = TableVersion::from_byte(buf[0])?;
        let header = Self {
            version,
            has_memo,
            updated: [buf[1], buf[2], buf[3]],
            record_count: get_u32(buf, 4),
            header_len: get_u16(buf, 8),
            record_len: get_u16(buf, 10),
            transaction: buf[14],
            encryption: buf[15],
            production_mdx: buf[28] != 0,
            language_driver: buf[29],
        };
        if usize::from(header.header_len) < DESCRIPTOR_LEN * 2 + 1 || header.record_len < 2 {
            return Err(XbError::invalid_data(
                "header",
                format!(
                    "header length {} record length {}",
                    header.header_len, header.record_len
                ),
            ));
        }
        Ok(header)
    }

    /// Encodes the 32-byte header.
    #[must_use]
    pub fn encode(&self) -> [u8; DESCRIPTOR_LEN] {
        let mut buf = [0u8; DESCRIPTOR_LEN];
        buf[0] = self.version.format().version_byte(self.has_memo);
        buf[1..4].copy_from_slice(&self.updated);
        put_u32(&mut buf, 4, self.record_count);
        put_u16(&mut buf, 8, self.header_len);
        put_u16(&mut buf, 10, self.record_len);
        buf[14] = self.transaction;
        buf[15] = self.encryption;
        buf[28] = u8::from(self.production_mdx);
        buf[29] = self.language_driver;
        buf
    }

    /// The first eight bytes: version, update date and record count. This
    /// is the part that changes on append.
    #[must_use]
    pub fn prolog(&self) -> [u8; 8] {
        let mut out = [0u8; 8];
        out.copy_from_slice(&self.encode()[..8]);
        out
    }

    /// Number of field descriptors implied by the header length.
    #[must_use]
    pub fn field_count(&self) -> usize {
        (usize::from(self.header_len) - DESCRIPTOR_LEN - 1) / DESCRIPTOR_LEN
    }

    /// Byte offset of record `recno` (1-based).
    #[must_use]
    pub fn record_offset(&self, recno: u32) -> u64 {
        u64::from(self.header_len) + u64::from(recno.saturating_sub(1)) * u64::from(self.record_len)
    }
}

/// Encodes the field descriptor array and its terminator.
#[must_use]
pub fn encode_fields(fields: &[FieldDesc]) -> Vec<u8> {
    let mut out = Vec::with_capacity(fields.len() * DESCRIPTOR_LEN + 1);
    for field in fields {
        let mut desc = [0u8; DESCRIPTOR_LEN];
        let name = field.name.as_bytes();
        let n = name.len().min(10);
        desc[..n].copy_from_slice(&name[..n]);
        desc[11] = field.field_type.as_char() as u8;
        desc[16] = field.len as u8;
        desc[17] = field.decimals as u8;
        desc[31] = u8::from(field.index_flag);
        out.extend_from_slice(&desc);
    }
    out.push(HEADER_TERMINATOR);
    out
}

/// Decodes `count` field descriptors and checks them against the record
/// length.
///
/// # Errors
///
/// Returns `InvalidFieldType` for an unknown type character and
/// `InvalidFieldLen` if the lengths do not add up to `record_len`.
pub fn decode_fields(buf: &[u8], count: usize, record_len: usize) -> XbResult<Vec<FieldDesc>> {
    let mut fields = Vec::with_capacity(count);
    let mut offset = 1;
    for chunk in buf.chunks_exact(DESCRIPTOR_LEN).take(count) {
        if chunk[0] == HEADER_TERMINATOR {
            break;
        }
        let end = chunk[..11].iter().position(|&b| b == 0).unwrap_or(11);
        let name = String::from_utf8_lossy(&chunk[..end]).trim().to_ascii_uppercase();
        let type_char = char::from(chunk[11]);
        let field_type = FieldType::from_char(type_char).ok_or_else(|| XbError::InvalidFieldType {
            field: name.clone(),
            field_type: type_char,
        })?;
        let len = usize::from(chunk[16]);
        fields.push(FieldDesc {
            name,
            field_type,
            offset,
            len,
            decimals: usize::from(chunk[17]),
            index_flag: chunk[31] != 0,
        });
        offset += len;
    }
    if offset != record_len {
        return Err(XbError::InvalidFieldLen {
            field: "*".into(),
            len: offset,
            decimals: 0,
        });
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{layout, FieldSpec};

    #[test]
    fn header_layout() {
        let (fields, reclen) = layout(&[FieldSpec::char("NAME", 5), FieldSpec::numeric("AMOUNT", 9, 2)]);
        let mut header = TableHeader::new(TableVersion::V3, &fields, reclen);
        header.record_count = 3;
        let buf = header.encode();
        assert_eq!(buf[0], 0x03);
        assert_eq!(get_u32(&buf, 4), 3);
        assert_eq!(get_u16(&buf, 8), 32 + 64 + 1);
        assert_eq!(get_u16(&buf, 10), 15);
        assert_eq!(TableHeader::decode(&buf).unwrap(), header);
        assert_eq!(header.record_offset(2), 97 + 15);
        assert_eq!(header.field_count(), 2);
    }

    #[test]
    fn descriptors_round_trip() {
        let (fields, reclen) = layout(&[
            FieldSpec::char("NAME", 5),
            FieldSpec::date("BORN"),
            FieldSpec::memo("NOTES"),
        ]);
        let bytes = encode_fields(&fields);
        assert_eq!(bytes.len(), 3 * 32 + 1);
        assert_eq!(bytes[11], b'C');
        assert_eq!(*bytes.last().unwrap(), HEADER_TERMINATOR);
        assert_eq!(decode_fields(&bytes, 3, reclen).unwrap(), fields);
    }

    #[test]
    fn mismatched_record_length_is_rejected() {
        let (fields, reclen) = layout(&[FieldSpec::char("NAME", 5)]);
        let bytes = encode_fields(&fields);
        assert!(decode_fields(&bytes, 1, reclen + 1).is_err());
    }

    #[test]
    fn memo_bit_follows_fields() {
        let (fields, reclen) = layout(&[FieldSpec::memo("NOTES")]);
        let header = TableHeader::new(TableVersion::V4, &fields, reclen);
        assert_eq!(header.encode()[0], 0x8B);
    }
}
