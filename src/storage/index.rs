//! Index Map
//!
//! Sorted array of `(key, ordinal)` pairs for one field, stored in its own
//! mapped file. Keys are unique and strictly ascending under byte-wise
//! comparison, so lookups and range boundaries are binary searches.

use std::cmp::Ordering;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::config::MappingMode;
use crate::error::{ArenaError, Result};

use super::mmap::MappedFile;
use super::{COUNT_SIZE, ORDINAL_SIZE};

/// Sorted secondary index over one field
#[derive(Debug)]
pub struct IndexMap {
    field: u8,
    key_len: usize,
    file: MappedFile,
}

impl IndexMap {
    /// `<database path>map<X>`, X = 0-9 then A-Z by field number
    pub fn path_for(db_path: &Path, field: u8) -> PathBuf {
        let suffix = if field < 10 {
            (b'0' + field) as char
        } else {
            (b'A' + field - 10) as char
        };
        let mut name = OsString::from(db_path.as_os_str());
        name.push("map");
        name.push(suffix.to_string());
        PathBuf::from(name)
    }

    /// Create an empty index file
    pub(crate) fn create(
        path: &Path,
        field: u8,
        key_len: usize,
        initial_len: u64,
        mode: MappingMode,
    ) -> Result<Self> {
        let mut file = MappedFile::create(path, initial_len, mode)?;
        file.bytes_mut()[..COUNT_SIZE].copy_from_slice(&0u32.to_le_bytes());
        Ok(Self { field, key_len, file })
    }

    /// Open the index file for `field` if it exists.
    ///
    /// A missing file is not an error: the field is simply unindexed.
    pub(crate) fn open(
        path: &Path,
        field: u8,
        key_len: usize,
        mode: MappingMode,
    ) -> Result<Option<Self>> {
        if !path.try_exists()? {
            return Ok(None);
        }

        let file = MappedFile::open(path, mode)?;
        let index = Self { field, key_len, file };
        index.validate()?;
        Ok(Some(index))
    }

    fn validate(&self) -> Result<()> {
        if self.file.len() < COUNT_SIZE {
            return Err(ArenaError::SchemaMismatch(format!(
                "index file for field {} is too short",
                self.field
            )));
        }

        let declared = self.raw_count() as usize;
        if declared > self.capacity() {
            return Err(ArenaError::SchemaMismatch(format!(
                "index file for field {} declares {} entries but holds {}",
                self.field,
                declared,
                self.capacity()
            )));
        }

        for i in 1..declared {
            if self.key_at(i - 1) >= self.key_at(i) {
                return Err(ArenaError::SchemaMismatch(format!(
                    "index file for field {} is not sorted at entry {}",
                    self.field, i
                )));
            }
        }
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn field(&self) -> u8 {
        self.field
    }

    pub fn key_len(&self) -> usize {
        self.key_len
    }

    /// Number of entries (clamped to what is currently mapped)
    pub fn len(&self) -> usize {
        (self.raw_count() as usize).min(self.capacity())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn key_at(&self, i: usize) -> &[u8] {
        let start = self.entry_offset(i);
        &self.file.bytes()[start..start + self.key_len]
    }

    pub fn ordinal_at(&self, i: usize) -> u32 {
        let start = self.entry_offset(i) + self.key_len;
        let b = &self.file.bytes()[start..start + ORDINAL_SIZE];
        u32::from_le_bytes([b[0], b[1], b[2], b[3]])
    }

    /// All entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], u32)> + '_ {
        (0..self.len()).map(move |i| (self.key_at(i), self.ordinal_at(i)))
    }

    // =========================================================================
    // Search
    // =========================================================================

    /// Position of the first entry whose key is `>= key`, and whether that
    /// entry equals `key`
    pub fn find_insertion_point(&self, key: &[u8]) -> (usize, bool) {
        let (mut lo, mut hi) = (0, self.len());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.key_at(mid).cmp(key) {
                Ordering::Less => lo = mid + 1,
                Ordering::Equal => return (mid, true),
                Ordering::Greater => hi = mid,
            }
        }
        (lo, false)
    }

    /// Position of the first entry whose key is `> key`
    fn upper_bound(&self, key: &[u8]) -> usize {
        match self.find_insertion_point(key) {
            (pos, true) => pos + 1,
            (pos, false) => pos,
        }
    }

    pub fn lookup(&self, key: &[u8]) -> Result<u32> {
        match self.find_insertion_point(key) {
            (pos, true) => Ok(self.ordinal_at(pos)),
            (_, false) => Err(ArenaError::NotFound),
        }
    }

    /// Ordinals of every entry with `key0 <= key <= key1`, in key order
    pub fn range(&self, key0: &[u8], key1: &[u8]) -> impl Iterator<Item = u32> + '_ {
        let start = self.find_insertion_point(key0).0;
        let end = self.upper_bound(key1).max(start);
        (start..end).map(move |i| self.ordinal_at(i))
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Insert a new key, growing the file if needed. Fails with
    /// `DuplicateKey` (and changes nothing) if the key is already present.
    pub(crate) fn insert(&mut self, key: &[u8], ordinal: u32) -> Result<()> {
        let (pos, exact) = self.find_insertion_point(key);
        if exact {
            return Err(ArenaError::DuplicateKey { field: self.field });
        }
        self.reserve_one()?;
        self.insert_at(pos, key, ordinal);
        Ok(())
    }

    /// Make room for one more entry without changing the logical content
    pub(crate) fn reserve_one(&mut self) -> Result<()> {
        let logical = self.logical_len();
        self.file.reserve(logical + self.entry_len(), logical)?;
        Ok(())
    }

    /// Shift entries `[pos, len)` right by one and write the new entry at
    /// `pos`. Capacity must already be reserved.
    ///
    /// Unchecked half of `insert`, for callers that validate several indices
    /// before mutating any of them.
    pub(crate) fn insert_at(&mut self, pos: usize, key: &[u8], ordinal: u32) {
        let len = self.len();
        debug_assert!(pos <= len && len < self.capacity());
        debug_assert_eq!(key.len(), self.key_len);

        let start = self.entry_offset(pos);
        let end = self.entry_offset(len);
        let entry_len = self.entry_len();
        let key_len = self.key_len;

        let bytes = self.file.bytes_mut();
        bytes.copy_within(start..end, start + entry_len);
        bytes[start..start + key_len].copy_from_slice(key);
        bytes[start + key_len..start + entry_len].copy_from_slice(&ordinal.to_le_bytes());

        self.set_count(len as u32 + 1);
    }

    /// Remove the entry at `pos`, shifting the tail left
    pub(crate) fn remove_at(&mut self, pos: usize) {
        let len = self.len();
        debug_assert!(pos < len);

        let start = self.entry_offset(pos);
        let end = self.entry_offset(len);
        let entry_len = self.entry_len();

        self.file.bytes_mut().copy_within(start + entry_len..end, start);
        self.set_count(len as u32 - 1);
    }

    /// Fill an empty index with entries already sorted by key
    pub(crate) fn bulk_load(&mut self, entries: &[(Vec<u8>, u32)]) -> Result<()> {
        debug_assert!(self.is_empty());
        debug_assert!(entries.windows(2).all(|w| w[0].0 < w[1].0));

        let needed = COUNT_SIZE + entries.len() * self.entry_len();
        self.file.reserve(needed, COUNT_SIZE)?;

        let key_len = self.key_len;
        let entry_len = self.entry_len();
        let bytes = self.file.bytes_mut();
        for (i, (key, ordinal)) in entries.iter().enumerate() {
            let start = COUNT_SIZE + i * entry_len;
            bytes[start..start + key_len].copy_from_slice(key);
            bytes[start + key_len..start + entry_len].copy_from_slice(&ordinal.to_le_bytes());
        }
        self.set_count(entries.len() as u32);
        Ok(())
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    pub(crate) fn refresh(&mut self) -> Result<bool> {
        self.file.refresh()
    }

    pub(crate) fn flush_async(&self) -> Result<()> {
        self.file.flush_async(self.logical_len())
    }

    pub(crate) fn sync(&self) -> Result<()> {
        self.file.sync(self.logical_len())
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn entry_len(&self) -> usize {
        self.key_len + ORDINAL_SIZE
    }

    fn entry_offset(&self, i: usize) -> usize {
        COUNT_SIZE + i * self.entry_len()
    }

    fn capacity(&self) -> usize {
        self.file.len().saturating_sub(COUNT_SIZE) / self.entry_len()
    }

    fn logical_len(&self) -> usize {
        self.entry_offset(self.len())
    }

    fn raw_count(&self) -> u32 {
        let b = &self.file.bytes()[..COUNT_SIZE];
        u32::from_le_bytes([b[0], b[1], b[2], b[3]])
    }

    fn set_count(&mut self, count: u32) {
        self.file.bytes_mut()[..COUNT_SIZE].copy_from_slice(&count.to_le_bytes());
    }
}
