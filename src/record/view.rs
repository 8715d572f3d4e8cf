//! Record views
//!
//! `Record` borrows one slot of the mapped arena; `RecordBuf` is an owned
//! scratch buffer that callers fill before `Database::add`.

use std::sync::Arc;

use crate::error::{ArenaError, Result};

use super::{is_zeroed, Schema};

/// Read-only view of one record inside the arena
///
/// Valid only while the owning `Database` is borrowed; any mutation of the
/// database requires `&mut` and so ends every outstanding view.
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    schema: &'a Schema,
    ordinal: u32,
    bytes: &'a [u8],
}

impl<'a> Record<'a> {
    pub(crate) fn new(schema: &'a Schema, ordinal: u32, bytes: &'a [u8]) -> Self {
        debug_assert_eq!(bytes.len(), schema.entry_len());
        Self { schema, ordinal, bytes }
    }

    /// Position of this record in the arena (append order)
    pub fn ordinal(&self) -> u32 {
        self.ordinal
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn get_field(&self, field: u8) -> Result<&'a [u8]> {
        self.schema.get_field(self.bytes, field)
    }

    /// Integer value of an ordered field
    pub fn get_ordered(&self, field: u8) -> Result<u64> {
        self.schema.decode_ordered(field, self.get_field(field)?)
    }

    /// Text value of a raw field, with trailing zero padding removed
    pub fn get_str(&self, field: u8) -> Result<&'a str> {
        let bytes = self.get_field(field)?;
        let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        std::str::from_utf8(&bytes[..end])
            .map_err(|e| ArenaError::InvalidInput(format!("field {} is not UTF-8: {}", field, e)))
    }

    /// True for a deleted (zero-filled) slot
    pub fn is_tombstone(&self) -> bool {
        is_zeroed(self.bytes)
    }
}

/// Owned, zero-initialised record buffer
#[derive(Debug, Clone)]
pub struct RecordBuf {
    schema: Arc<Schema>,
    bytes: Vec<u8>,
}

impl RecordBuf {
    pub fn new(schema: Arc<Schema>) -> Self {
        let bytes = vec![0u8; schema.entry_len()];
        Self { schema, bytes }
    }

    /// Overwrite a field with exactly `length(field)` bytes
    pub fn set_field(&mut self, field: u8, value: &[u8]) -> Result<&mut Self> {
        self.schema.set_field(&mut self.bytes, field, value)?;
        Ok(self)
    }

    /// Store an integer in an ordered field (big-endian)
    pub fn set_ordered(&mut self, field: u8, value: u64) -> Result<&mut Self> {
        let key = self.schema.ordered_key(field, value)?;
        self.set_field(field, &key)
    }

    /// Store text in a raw field, zero-padded to the field length
    pub fn set_str(&mut self, field: u8, value: &str) -> Result<&mut Self> {
        let len = self.schema.field_len(field)?;
        if value.len() > len {
            return Err(ArenaError::InvalidInput(format!(
                "text is {} bytes, field {} holds {}",
                value.len(),
                field,
                len
            )));
        }
        let mut padded = vec![0u8; len];
        padded[..value.len()].copy_from_slice(value.as_bytes());
        self.set_field(field, &padded)
    }

    pub fn get_field(&self, field: u8) -> Result<&[u8]> {
        self.schema.get_field(&self.bytes, field)
    }

    pub fn get_ordered(&self, field: u8) -> Result<u64> {
        self.schema.decode_ordered(field, self.get_field(field)?)
    }

    /// Reset every byte to zero for reuse
    pub fn clear(&mut self) {
        self.bytes.fill(0);
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }
}

impl AsRef<[u8]> for RecordBuf {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}
