//! Tags: one ordered key over the records of a table.

use super::btree::Cursor;
use super::key::{compare_keys, encode_key};
use super::node::{NodeCache, NodeLayout};
use super::TagId;
use crate::config::IndexMode;
use crate::error::{XbError, XbResult};
use crate::expr::{ExpressionProvider, FilterExpression, KeyExpression, KeyType, KeyValue, RecordView};
use crate::schema::FieldDesc;
use std::cmp::Ordering;

/// Longest MDX/TDX tag name.
pub const MAX_TAG_NAME_LEN: usize = 10;
/// Longest key expression stored in an index header.
pub const MAX_KEY_EXPR_LEN: usize = 100;
/// Longest filter expression stored in an MDX tag header.
pub const MAX_FILTER_LEN: usize = 220;

/// A request to create a tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagDef {
    /// Tag name; for NDX the file name.
    pub name: String,
    /// Key expression.
    pub key_expr: String,
    /// Optional filter expression (MDX/TDX only).
    pub filter: Option<String>,
    /// Descending order (MDX/TDX only).
    pub descending: bool,
    /// Reject or skip duplicate keys.
    pub unique: bool,
}

impl TagDef {
    /// An ascending, non-unique, unfiltered tag.
    pub fn new(name: impl Into<String>, key_expr: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_expr: key_expr.into(),
            filter: None,
            descending: false,
            unique: false,
        }
    }

    /// Sets the filter expression.
    #[must_use]
    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Sets descending order.
    #[must_use]
    pub fn descending(mut self, value: bool) -> Self {
        self.descending = value;
        self
    }

    /// Sets uniqueness.
    #[must_use]
    pub fn unique(mut self, value: bool) -> Self {
        self.unique = value;
        self
    }

    /// Checks lengths and the tag name against the stored header limits.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTag` for a bad name and `InvalidExpression` for an
    /// expression too long to store.
    pub fn validate(&self, named: bool) -> XbResult<()> {
        if named {
            let mut chars = self.name.chars();
            let ok = !self.name.is_empty()
                && self.name.len() <= MAX_TAG_NAME_LEN
                && chars.next().is_some_and(|c| c.is_ascii_alphabetic())
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
            if !ok {
                return Err(XbError::InvalidTag(self.name.clone()));
            }
        }
        if self.key_expr.trim().is_empty() || self.key_expr.len() > MAX_KEY_EXPR_LEN {
            return Err(XbError::invalid_expression(&self.key_expr, "key expression length"));
        }
        if let Some(filter) = &self.filter {
            if filter.len() > MAX_FILTER_LEN {
                return Err(XbError::invalid_expression(filter, "filter expression length"));
            }
        }
        Ok(())
    }
}

/// Stored tag properties, read back from an index header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TagHeader {
    pub name: String,
    pub key_expr: String,
    pub filter: Option<String>,
    pub key_type: KeyType,
    pub key_len: usize,
    pub descending: bool,
    pub unique: bool,
    pub root: u32,
    pub stamp: u32,
    pub header_page: u32,
}

/// An open tag.
#[derive(Debug)]
pub struct Tag {
    pub(crate) id: TagId,
    name: String,
    key: Box<dyn KeyExpression>,
    filter: Option<Box<dyn FilterExpression>>,
    key_type: KeyType,
    descending: bool,
    unique: bool,
    pub(crate) root: u32,
    pub(crate) stamp: u32,
    pub(crate) header_page: u32,
    pub(crate) layout: NodeLayout,
    pub(crate) cache: NodeCache,
    pub(crate) cursor: Option<Cursor>,
}

impl Tag {
    /// Compiles a tag from its stored header.
    pub(crate) fn compile(
        id: TagId,
        header: TagHeader,
        layout: NodeLayout,
        fields: &[FieldDesc],
        provider: &dyn ExpressionProvider,
        cache_capacity: usize,
    ) -> XbResult<Self> {
        let key = provider.compile_key(&header.key_expr, fields)?;
        let filter = match &header.filter {
            Some(f) if !f.trim().is_empty() => Some(provider.compile_filter(f, fields)?),
            _ => None,
        };
        Ok(Self {
            id,
            name: header.name,
            key,
            filter,
            key_type: header.key_type,
            descending: header.descending,
            unique: header.unique,
            root: header.root,
            stamp: header.stamp,
            header_page: header.header_page,
            layout,
            cache: NodeCache::new(cache_capacity),
            cursor: None,
        })
    }

    /// Tag id within its index.
    #[must_use]
    pub fn id(&self) -> TagId {
        self.id
    }

    /// Tag name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Key expression text.
    #[must_use]
    pub fn key_expr(&self) -> &str {
        self.key.source()
    }

    /// Filter expression text, if any.
    #[must_use]
    pub fn filter_expr(&self) -> Option<&str> {
        self.filter.as_ref().map(|f| f.source())
    }

    /// Key type.
    #[must_use]
    pub fn key_type(&self) -> KeyType {
        self.key_type
    }

    /// Stored key length.
    #[must_use]
    pub fn key_len(&self) -> usize {
        self.layout.key_len
    }

    /// Keys per node.
    #[must_use]
    pub fn keys_per_block(&self) -> usize {
        self.layout.keys_per_block
    }

    /// Descending order.
    #[must_use]
    pub fn is_descending(&self) -> bool {
        self.descending
    }

    /// Unique keys.
    #[must_use]
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Root block.
    #[must_use]
    pub fn root(&self) -> u32 {
        self.root
    }

    /// Compares stored keys in tag order.
    #[must_use]
    pub fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        let ord = compare_keys(self.key_type, a, b);
        if self.descending {
            ord.reverse()
        } else {
            ord
        }
    }

    /// Encodes a search value for this tag.
    ///
    /// # Errors
    ///
    /// Returns `InvalidData` if the value type does not match the key type.
    pub fn encode(&self, value: &KeyValue) -> XbResult<Vec<u8>> {
        encode_key(&self.name, value, self.key_type, self.layout.key_len)
    }

    /// Stored key for a record.
    ///
    /// # Errors
    ///
    /// Returns an error if the key expression cannot be evaluated.
    pub fn key_for(&self, record: &RecordView<'_>) -> XbResult<Vec<u8>> {
        self.encode(&self.key.evaluate(record)?)
    }

    /// Whether a record belongs in this tag under `mode`.
    ///
    /// # Errors
    ///
    /// Returns an error if the filter cannot be evaluated.
    pub fn includes(&self, record: &RecordView<'_>, mode: IndexMode) -> XbResult<bool> {
        if record.is_deleted() && !mode.indexes_deleted() {
            return Ok(false);
        }
        match &self.filter {
            Some(filter) => filter.matches(record),
            None => Ok(true),
        }
    }

    /// Drops cached nodes after the tag changed elsewhere.
    pub(crate) fn invalidate(&mut self) {
        self.cache.clear();
    }
}

/// Builds the stored header for a new tag, compiling the key to learn its
/// type and length.
pub(crate) fn new_header(
    def: &TagDef,
    fields: &[FieldDesc],
    provider: &dyn ExpressionProvider,
) -> XbResult<TagHeader> {
    let key = provider.compile_key(&def.key_expr, fields)?;
    if let Some(filter) = &def.filter {
        provider.compile_filter(filter, fields)?;
    }
    let key_len = key.key_len();
    if key_len == 0 || key_len > MAX_KEY_EXPR_LEN {
        return Err(XbError::invalid_expression(&def.key_expr, format!("key length {key_len}")));
    }
    Ok(TagHeader {
        name: def.name.to_ascii_uppercase(),
        key_expr: def.key_expr.trim().to_string(),
        filter: def.filter.clone().filter(|f| !f.trim().is_empty()),
        key_type: key.key_type(),
        key_len,
        descending: def.descending,
        unique: def.unique,
        root: 0,
        stamp: 0,
        header_page: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::SimpleExpressions;
    use crate::schema::{layout, FieldSpec};

    fn fields() -> Vec<FieldDesc> {
        layout(&[FieldSpec::char("NAME", 5), FieldSpec::numeric("AMOUNT", 9, 2)]).0
    }

    fn tag(def: &TagDef) -> Tag {
        let f = fields();
        let header = new_header(def, &f, &SimpleExpressions).unwrap();
        let layout = NodeLayout::mdx(header.key_len, 1024);
        Tag::compile(TagId(0), header, layout, &f, &SimpleExpressions, 8).unwrap()
    }

    #[test]
    fn tag_names_are_checked() {
        assert!(TagDef::new("BYNAME", "NAME").validate(true).is_ok());
        assert!(TagDef::new("TOO_LONG_NAME", "NAME").validate(true).is_err());
        assert!(TagDef::new("9X", "NAME").validate(true).is_err());
        assert!(TagDef::new("9X.NDX", "NAME").validate(false).is_ok());
        assert!(TagDef::new("X", "").validate(false).is_err());
    }

    #[test]
    fn descending_reverses_order() {
        let up = tag(&TagDef::new("UP", "AMOUNT"));
        let down = tag(&TagDef::new("DOWN", "AMOUNT").descending(true));
        let a = up.encode(&KeyValue::Numeric(1.0)).unwrap();
        let b = up.encode(&KeyValue::Numeric(2.0)).unwrap();
        assert_eq!(up.compare(&a, &b), Ordering::Less);
        assert_eq!(down.compare(&a, &b), Ordering::Greater);
        assert_eq!(up.key_type(), KeyType::Numeric);
    }

    #[test]
    fn deleted_records_follow_index_mode() {
        let f = fields();
        let t = tag(&TagDef::new("NAME", "NAME"));
        let mut buf = b" ANN      12.00".to_vec();
        buf[0] = b'*';
        let view = RecordView::new(&f, &buf);
        assert!(t.includes(&view, IndexMode::EmulateDbase).unwrap());
        assert!(!t.includes(&view, IndexMode::HaltOnDupKey).unwrap());
        assert_eq!(t.key_for(&view).unwrap(), b"ANN  ");
    }

    #[test]
    fn filters_limit_membership() {
        let f = fields();
        let t = tag(&TagDef::new("BIG", "NAME").filter("AMOUNT > 20"));
        let small = b" ANN      12.00".to_vec();
        let big = b" BOB      22.00".to_vec();
        assert!(!t.includes(&RecordView::new(&f, &small), IndexMode::EmulateDbase).unwrap());
        assert!(t.includes(&RecordView::new(&f, &big), IndexMode::EmulateDbase).unwrap());
        assert_eq!(t.filter_expr(), Some("AMOUNT > 20"));
    }
}
