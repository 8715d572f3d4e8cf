//! Schema and field layout
//!
//! A schema is the ordered list of fixed-length fields of a database. The
//! per-field offset table is computed once here; every field access goes
//! through it.

use std::ops::Range;

use crate::error::{ArenaError, Result};
use crate::storage::COUNT_SIZE;

/// Maximum number of fields in a schema
pub const MAX_FIELDS: usize = 16;

/// Largest length a field can have (bit 15 of the header word is the kind flag)
pub const MAX_FIELD_LEN: u16 = 0x7FFF;

/// Largest ordered field, in bytes (holds a u64)
pub const MAX_ORDERED_LEN: u16 = 8;

const ORDERED_FLAG: u16 = 0x8000;

/// Header: count + field_count (1), followed by one u16 per field
const FIELD_COUNT_SIZE: usize = 1;
const FIELD_WORD_SIZE: usize = 2;

/// How the bytes of a field are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Stored and compared exactly as supplied
    Raw,

    /// Unsigned integer stored big-endian, so byte-wise order is numeric order
    Ordered,
}

/// One field of a schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub len: u16,
    pub kind: FieldKind,
}

impl FieldSpec {
    pub fn raw(len: u16) -> Self {
        Self { len, kind: FieldKind::Raw }
    }

    pub fn ordered(len: u16) -> Self {
        Self { len, kind: FieldKind::Ordered }
    }

    fn to_word(self) -> u16 {
        match self.kind {
            FieldKind::Raw => self.len,
            FieldKind::Ordered => self.len | ORDERED_FLAG,
        }
    }

    fn from_word(word: u16) -> Self {
        let len = word & MAX_FIELD_LEN;
        if word & ORDERED_FLAG != 0 {
            Self::ordered(len)
        } else {
            Self::raw(len)
        }
    }
}

/// Ordered list of fixed-length fields plus their precomputed offsets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<FieldSpec>,
    offsets: Vec<usize>,
    entry_len: usize,
}

impl Schema {
    /// Build a schema, validating field count and lengths
    pub fn new(fields: Vec<FieldSpec>) -> Result<Self> {
        if fields.is_empty() || fields.len() > MAX_FIELDS {
            return Err(ArenaError::SchemaMismatch(format!(
                "field count must be between 1 and {}, got {}",
                MAX_FIELDS,
                fields.len()
            )));
        }

        let mut offsets = Vec::with_capacity(fields.len());
        let mut entry_len = 0usize;
        for (i, spec) in fields.iter().enumerate() {
            if spec.len == 0 || spec.len > MAX_FIELD_LEN {
                return Err(ArenaError::SchemaMismatch(format!(
                    "field {} has invalid length {}",
                    i, spec.len
                )));
            }
            if spec.kind == FieldKind::Ordered && spec.len > MAX_ORDERED_LEN {
                return Err(ArenaError::SchemaMismatch(format!(
                    "ordered field {} is {} bytes, maximum is {}",
                    i, spec.len, MAX_ORDERED_LEN
                )));
            }
            offsets.push(entry_len);
            entry_len += spec.len as usize;
        }

        Ok(Self { fields, offsets, entry_len })
    }

    /// Create a new schema builder
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    pub fn field_count(&self) -> u8 {
        self.fields.len() as u8
    }

    /// Length of one record in bytes
    pub fn entry_len(&self) -> usize {
        self.entry_len
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, field: u8) -> Result<FieldSpec> {
        self.fields
            .get(field as usize)
            .copied()
            .ok_or(ArenaError::OutOfRange {
                field,
                field_count: self.field_count(),
            })
    }

    /// Byte offset of `field` inside a record
    pub fn field_offset(&self, field: u8) -> Result<usize> {
        self.field(field)?;
        Ok(self.offsets[field as usize])
    }

    pub fn field_len(&self, field: u8) -> Result<usize> {
        Ok(self.field(field)?.len as usize)
    }

    /// Byte range of `field` inside a record
    pub fn field_range(&self, field: u8) -> Result<Range<usize>> {
        let start = self.field_offset(field)?;
        Ok(start..start + self.fields[field as usize].len as usize)
    }

    /// Read view of a field
    pub fn get_field<'a>(&self, record: &'a [u8], field: u8) -> Result<&'a [u8]> {
        let range = self.field_range(field)?;
        self.check_record_len(record.len())?;
        Ok(&record[range])
    }

    /// Overwrite a field; `value` must be exactly the field's length
    pub fn set_field(&self, record: &mut [u8], field: u8, value: &[u8]) -> Result<()> {
        let range = self.field_range(field)?;
        self.check_record_len(record.len())?;
        if value.len() != range.len() {
            return Err(ArenaError::InvalidInput(format!(
                "field {} is {} bytes, value is {}",
                field,
                range.len(),
                value.len()
            )));
        }
        record[range].copy_from_slice(value);
        Ok(())
    }

    /// Encode `value` as the big-endian key bytes of an ordered field
    pub fn ordered_key(&self, field: u8, value: u64) -> Result<Vec<u8>> {
        let len = self.ordered_len(field)?;
        if len < 8 && value >> (8 * len) != 0 {
            return Err(ArenaError::InvalidInput(format!(
                "value {} does not fit in {}-byte field {}",
                value, len, field
            )));
        }
        Ok(value.to_be_bytes()[8 - len..].to_vec())
    }

    /// Decode the bytes of an ordered field back into an integer
    pub fn decode_ordered(&self, field: u8, bytes: &[u8]) -> Result<u64> {
        let len = self.ordered_len(field)?;
        if bytes.len() != len {
            return Err(ArenaError::InvalidInput(format!(
                "field {} is {} bytes, value is {}",
                field,
                len,
                bytes.len()
            )));
        }
        let mut word = [0u8; 8];
        word[8 - len..].copy_from_slice(bytes);
        Ok(u64::from_be_bytes(word))
    }

    fn ordered_len(&self, field: u8) -> Result<usize> {
        let spec = self.field(field)?;
        if spec.kind != FieldKind::Ordered {
            return Err(ArenaError::InvalidInput(format!(
                "field {} is not an ordered field",
                field
            )));
        }
        Ok(spec.len as usize)
    }

    fn check_record_len(&self, len: usize) -> Result<()> {
        if len != self.entry_len {
            return Err(ArenaError::InvalidInput(format!(
                "record is {} bytes, schema requires {}",
                len, self.entry_len
            )));
        }
        Ok(())
    }

    // =========================================================================
    // Header Encoding
    // =========================================================================

    /// Size of the on-disk header for this schema
    pub fn header_len(&self) -> usize {
        COUNT_SIZE + FIELD_COUNT_SIZE + self.fields.len() * FIELD_WORD_SIZE
    }

    /// Encode `[count][field_count][field words...]`
    pub(crate) fn encode_header(&self, count: u32) -> Vec<u8> {
        let mut header = Vec::with_capacity(self.header_len());
        header.extend_from_slice(&count.to_le_bytes());
        header.push(self.field_count());
        for spec in &self.fields {
            header.extend_from_slice(&spec.to_word().to_le_bytes());
        }
        header
    }

    /// Decode a header, returning the record count and the schema.
    ///
    /// Rejects anything a corrupted or foreign file could produce before any
    /// offset is derived from it.
    pub(crate) fn decode_header(bytes: &[u8]) -> Result<(u32, Schema)> {
        let fixed = COUNT_SIZE + FIELD_COUNT_SIZE;
        if bytes.len() < fixed {
            return Err(ArenaError::SchemaMismatch(format!(
                "file is {} bytes, too short for a header",
                bytes.len()
            )));
        }

        let count = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let field_count = bytes[COUNT_SIZE] as usize;
        if field_count == 0 || field_count > MAX_FIELDS {
            return Err(ArenaError::SchemaMismatch(format!(
                "header declares {} fields, must be between 1 and {}",
                field_count, MAX_FIELDS
            )));
        }

        let words_end = fixed + field_count * FIELD_WORD_SIZE;
        if bytes.len() < words_end {
            return Err(ArenaError::SchemaMismatch(
                "file truncated inside the field table".to_string(),
            ));
        }

        let fields = bytes[fixed..words_end]
            .chunks_exact(FIELD_WORD_SIZE)
            .map(|w| FieldSpec::from_word(u16::from_le_bytes([w[0], w[1]])))
            .collect();

        Ok((count, Schema::new(fields)?))
    }
}

/// Builder for Schema
#[derive(Default)]
pub struct SchemaBuilder {
    fields: Vec<FieldSpec>,
}

impl SchemaBuilder {
    /// Append a raw field of `len` bytes
    pub fn raw(mut self, len: u16) -> Self {
        self.fields.push(FieldSpec::raw(len));
        self
    }

    /// Append an ordered (big-endian integer) field of `len` bytes
    pub fn ordered(mut self, len: u16) -> Self {
        self.fields.push(FieldSpec::ordered(len));
        self
    }

    pub fn build(self) -> Result<Schema> {
        Schema::new(self.fields)
    }
}
