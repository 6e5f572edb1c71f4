//! Typed field access on the current record buffer.

use super::{Table, TableStatus};
use crate::date::Date;
use crate::error::{XbError, XbResult};
use crate::schema::{field_no, FieldDesc, FieldType};

/// Names a field by 0-based number or by case-insensitive name.
pub trait FieldRef {
    /// Field number within `fields`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFieldNo` or `InvalidFieldName` if nothing matches.
    fn resolve(&self, fields: &[FieldDesc]) -> XbResult<usize>;
}

impl FieldRef for usize {
    fn resolve(&self, fields: &[FieldDesc]) -> XbResult<usize> {
        if *self < fields.len() {
            Ok(*self)
        } else {
            Err(XbError::InvalidFieldNo(*self))
        }
    }
}

impl FieldRef for &str {
    fn resolve(&self, fields: &[FieldDesc]) -> XbResult<usize> {
        field_no(fields, self)
    }
}

impl FieldRef for &String {
    fn resolve(&self, fields: &[FieldDesc]) -> XbResult<usize> {
        field_no(fields, self)
    }
}

/// Right-justifies a number in `desc.len` bytes with `desc.decimals`
/// decimals.
fn format_number(desc: &FieldDesc, value: f64) -> XbResult<Vec<u8>> {
    if !value.is_finite() {
        return Err(XbError::invalid_data(&desc.name, format!("{value} is not finite")));
    }
    let text = format!("{:>width$.prec$}", value, width = desc.len, prec = desc.decimals);
    if text.len() > desc.len {
        return Err(XbError::invalid_data(
            &desc.name,
            format!("{text} does not fit {} bytes", desc.len),
        ));
    }
    Ok(text.into_bytes())
}

fn require_numeric(desc: &FieldDesc) -> XbResult<()> {
    if desc.field_type.is_numeric() {
        Ok(())
    } else {
        Err(XbError::InvalidFieldType {
            field: desc.name.clone(),
            field_type: desc.field_type.as_char(),
        })
    }
}

fn require_type(desc: &FieldDesc, field_type: FieldType) -> XbResult<()> {
    if desc.field_type == field_type {
        Ok(())
    } else {
        Err(XbError::InvalidFieldType {
            field: desc.name.clone(),
            field_type: desc.field_type.as_char(),
        })
    }
}

impl Table {
    fn field_index<F: FieldRef>(&self, field: F) -> XbResult<usize> {
        self.ensure_open()?;
        field.resolve(&self.fields)
    }

    /// Saves the original buffer before the first change to a record.
    pub(crate) fn begin_edit(&mut self) {
        if self.status == TableStatus::Open {
            self.original.clone_from(&self.current);
            self.status = TableStatus::Updated;
        }
    }

    fn write_field(&mut self, no: usize, bytes: &[u8]) {
        self.begin_edit();
        let range = self.fields[no].range();
        self.current[range].copy_from_slice(bytes);
    }

    fn raw(&self, no: usize) -> &[u8] {
        &self.current[self.fields[no].range()]
    }

    /// Descriptor of a field.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFieldNo` or `InvalidFieldName` for an unknown field.
    pub fn field<F: FieldRef>(&self, field: F) -> XbResult<&FieldDesc> {
        let no = self.field_index(field)?;
        Ok(&self.fields[no])
    }

    /// Field bytes as text, padding included.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFieldNo` or `InvalidFieldName` for an unknown field.
    pub fn get_field<F: FieldRef>(&self, field: F) -> XbResult<String> {
        let no = self.field_index(field)?;
        Ok(String::from_utf8_lossy(self.raw(no)).into_owned())
    }

    /// Stores text in any non-memo field, justified and validated for its
    /// type: character text is left-justified, numbers right-justified,
    /// dates must be `CCYYMMDD` and logicals one of `TtFfYyNn?`. Blank is
    /// accepted for every type.
    ///
    /// # Errors
    ///
    /// Returns `InvalidData` or `InvalidDate` for a value the field cannot
    /// hold and `InvalidMemoField` for a memo field.
    pub fn put_field<F: FieldRef>(&mut self, field: F, value: &str) -> XbResult<()> {
        let no = self.field_index(field)?;
        let desc = &self.fields[no];
        let trimmed = value.trim();
        let bytes = match desc.field_type {
            FieldType::Char => {
                let mut bytes = value.as_bytes().to_vec();
                bytes.resize(desc.len, b' ');
                bytes
            }
            FieldType::Numeric | FieldType::Float => {
                if !trimmed.is_empty() && trimmed.parse::<f64>().is_err() {
                    return Err(XbError::invalid_data(&desc.name, format!("'{trimmed}' is not numeric")));
                }
                if trimmed.len() > desc.len {
                    return Err(XbError::invalid_data(
                        &desc.name,
                        format!("'{trimmed}' does not fit {} bytes", desc.len),
                    ));
                }
                format!("{trimmed:>width$}", width = desc.len).into_bytes()
            }
            FieldType::Date => {
                if !trimmed.is_empty() {
                    Date::parse(trimmed)?;
                }
                format!("{trimmed:<8}").into_bytes()
            }
            FieldType::Logical => match trimmed.chars().next() {
                None => vec![b' '],
                Some(c) if "TtFfYyNn?".contains(c) => vec![c.to_ascii_uppercase() as u8],
                Some(_) => {
                    return Err(XbError::invalid_data(&desc.name, format!("'{trimmed}' is not logical")))
                }
            },
            FieldType::Memo => return Err(XbError::InvalidMemoField(desc.name.clone())),
        };
        self.write_field(no, &bytes);
        Ok(())
    }

    /// Character field text without trailing blanks.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFieldNo` or `InvalidFieldName` for an unknown field.
    pub fn get_char<F: FieldRef>(&self, field: F) -> XbResult<String> {
        Ok(self.get_field(field)?.trim_end().to_string())
    }

    /// Stores character text, padding with blanks or cutting to length.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFieldType` if the field is not a character field.
    pub fn put_char<F: FieldRef>(&mut self, field: F, value: &str) -> XbResult<()> {
        let no = self.field_index(field)?;
        require_type(&self.fields[no], FieldType::Char)?;
        self.put_field(no, value)
    }

    /// Numeric field value; blank is zero.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFieldType` for a non-numeric field and `InvalidData`
    /// if the stored text is not a number.
    pub fn get_double<F: FieldRef>(&self, field: F) -> XbResult<f64> {
        let no = self.field_index(field)?;
        require_numeric(&self.fields[no])?;
        self.view(&self.current).number(no)
    }

    /// Numeric field value as `f32`.
    ///
    /// # Errors
    ///
    /// See [`Table::get_double`].
    pub fn get_float<F: FieldRef>(&self, field: F) -> XbResult<f32> {
        Ok(self.get_double(field)? as f32)
    }

    /// Numeric field value truncated to an integer.
    ///
    /// # Errors
    ///
    /// See [`Table::get_double`]; also `InvalidData` when the value does
    /// not fit an `i32`.
    pub fn get_long<F: FieldRef>(&self, field: F) -> XbResult<i32> {
        let no = self.field_index(field)?;
        let value = self.get_double(no)?.trunc();
        if value < f64::from(i32::MIN) || value > f64::from(i32::MAX) {
            return Err(XbError::invalid_data(&self.fields[no].name, format!("{value} exceeds i32")));
        }
        Ok(value as i32)
    }

    /// Stores a number, right-justified with the field's decimal count.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFieldType` for a non-numeric field and `InvalidData`
    /// if the formatted value does not fit.
    pub fn put_double<F: FieldRef>(&mut self, field: F, value: f64) -> XbResult<()> {
        let no = self.field_index(field)?;
        let desc = &self.fields[no];
        require_numeric(desc)?;
        let bytes = format_number(desc, value)?;
        self.write_field(no, &bytes);
        Ok(())
    }

    /// Stores an `f32`.
    ///
    /// # Errors
    ///
    /// See [`Table::put_double`].
    pub fn put_float<F: FieldRef>(&mut self, field: F, value: f32) -> XbResult<()> {
        self.put_double(field, f64::from(value))
    }

    /// Stores an integer.
    ///
    /// # Errors
    ///
    /// See [`Table::put_double`].
    pub fn put_long<F: FieldRef>(&mut self, field: F, value: i32) -> XbResult<()> {
        self.put_double(field, f64::from(value))
    }

    /// Date field as `CCYYMMDD` text, blank for an empty date.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFieldType` if the field is not a date field.
    pub fn get_date_str<F: FieldRef>(&self, field: F) -> XbResult<String> {
        let no = self.field_index(field)?;
        require_type(&self.fields[no], FieldType::Date)?;
        self.get_field(no)
    }

    /// Date field value; `None` when blank.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFieldType` for a non-date field and `InvalidDate`
    /// for malformed contents.
    pub fn get_date<F: FieldRef>(&self, field: F) -> XbResult<Option<Date>> {
        let text = self.get_date_str(field)?;
        let text = text.trim();
        if text.is_empty() {
            Ok(None)
        } else {
            Date::parse(text).map(Some)
        }
    }

    /// Stores a `CCYYMMDD` date; blank clears the field.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFieldType` for a non-date field and `InvalidDate`
    /// for an impossible date.
    pub fn put_date_str<F: FieldRef>(&mut self, field: F, value: &str) -> XbResult<()> {
        let no = self.field_index(field)?;
        require_type(&self.fields[no], FieldType::Date)?;
        self.put_field(no, value)
    }

    /// Stores a date.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFieldType` for a non-date field.
    pub fn put_date<F: FieldRef>(&mut self, field: F, value: Date) -> XbResult<()> {
        self.put_date_str(field, &value.to_date8())
    }

    /// Logical field value: true for `T`, `t`, `Y` or `y`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFieldType` if the field is not a logical field.
    pub fn get_logical<F: FieldRef>(&self, field: F) -> XbResult<bool> {
        let no = self.field_index(field)?;
        require_type(&self.fields[no], FieldType::Logical)?;
        Ok(matches!(self.raw(no).first(), Some(b'T' | b't' | b'Y' | b'y')))
    }

    /// Stores `T` or `F`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFieldType` if the field is not a logical field.
    pub fn put_logical<F: FieldRef>(&mut self, field: F, value: bool) -> XbResult<()> {
        let no = self.field_index(field)?;
        require_type(&self.fields[no], FieldType::Logical)?;
        self.write_field(no, if value { b"T" } else { b"F" });
        Ok(())
    }

    /// Memo text, including an edit not yet committed.
    ///
    /// # Errors
    ///
    /// Returns `InvalidMemoField` for a non-memo field or a table without
    /// a memo file.
    pub fn get_memo<F: FieldRef>(&mut self, field: F) -> XbResult<String> {
        let no = self.field_index(field)?;
        let name = &self.fields[no].name;
        let memo = self
            .memo
            .as_mut()
            .ok_or_else(|| XbError::InvalidMemoField(name.clone()))?;
        memo.get(&self.fields, no, &self.current)
    }

    /// Byte length of the memo text.
    ///
    /// # Errors
    ///
    /// See [`Table::get_memo`].
    pub fn memo_len<F: FieldRef>(&mut self, field: F) -> XbResult<usize> {
        Ok(self.get_memo(field)?.len())
    }

    /// Queues new memo text, written on commit. Empty text clears the memo.
    ///
    /// # Errors
    ///
    /// See [`Table::get_memo`].
    pub fn put_memo<F: FieldRef>(&mut self, field: F, text: &str) -> XbResult<()> {
        let no = self.field_index(field)?;
        let name = &self.fields[no].name;
        let memo = self
            .memo
            .as_mut()
            .ok_or_else(|| XbError::InvalidMemoField(name.clone()))?;
        memo.put(&self.fields, no, text)?;
        self.begin_edit();
        Ok(())
    }
}
