//! Engine Module
//!
//! The storage engine: schema, record arena and index maps.
//!
//! ## Responsibilities
//! - Create and load database files (validating the header)
//! - Append records, checking every index before mutating anything
//! - Point, range and neighbour lookups through indices or linear scans
//! - Tombstone deletes (zero-fill in place, index entries kept)
//! - Flush and persist according to the mapping mode
//!
//! ## Durability
//! Each successful mutation starts an asynchronous flush. A crash can lose
//! the mutations issued since the last completed flush; the file itself
//! stays structurally valid because the record count is bumped only after
//! the record bytes are written.

use std::fs;
use std::io;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::{Config, MappingMode};
use crate::error::{ArenaError, Result};
use crate::record::{is_zeroed, Record, RecordBuf, Schema};
use crate::storage::{FileStamp, IndexMap, MappedFile, WriteLock, COUNT_SIZE};

/// An open database
///
/// ## Concurrency Model
///
/// - Reads take `&self`, mutations take `&mut self`: one handle is never
///   used concurrently, and no `Record` view outlives a mutation or a remap.
/// - Across processes, mutations hold an advisory exclusive lock on the
///   database file (`Config::lock_writes`) and catch up with other handles
///   before checking anything.
/// - Reads use the mapping as it is. Records appended by another handle past
///   the mapped length show up after `refresh()`; `ConsistencyGuard` does
///   this before every operation.
///
/// ## Closing
///
/// `close()` consumes the handle, so no operation is possible afterwards.
/// Dropping without `close()` still unmaps, but skips the final sync.
#[derive(Debug)]
pub struct Database {
    /// Path of the arena file (index maps are siblings of it)
    path: PathBuf,

    config: Config,

    /// Shared with every `RecordBuf` created from this handle
    schema: Arc<Schema>,

    /// Header + records
    arena: MappedFile,

    /// One slot per field; `Some` when that field is indexed
    indices: Vec<Option<IndexMap>>,

    /// Arena file stamp at load time or after our own last persist
    stamp: FileStamp,
}

impl Database {
    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Create a new database with the default config
    pub fn create(path: impl AsRef<Path>, schema: Schema) -> Result<Self> {
        Self::create_with_config(path, schema, Config::default())
    }

    /// Create (or truncate) a database file.
    ///
    /// The new database has no indices; index-map files left behind by a
    /// previous database at the same path are removed.
    pub fn create_with_config(
        path: impl AsRef<Path>,
        schema: Schema,
        config: Config,
    ) -> Result<Self> {
        config.validate()?;
        let path = path.as_ref().to_path_buf();

        for field in 0..schema.field_count() {
            match fs::remove_file(IndexMap::path_for(&path, field)) {
                Ok(()) => debug!(field, "Removed stale index map"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        let header = schema.encode_header(0);
        let mut arena = MappedFile::create(&path, config.initial_file_size, config.mapping_mode)?;
        arena.bytes_mut()[..header.len()].copy_from_slice(&header);
        arena.flush_async(header.len())?;
        let stamp = arena.stamp()?;

        info!(
            path = %path.display(),
            fields = schema.field_count(),
            entry_len = schema.entry_len(),
            mode = ?config.mapping_mode,
            "Created database"
        );

        let indices = (0..schema.field_count()).map(|_| None).collect();
        Ok(Self {
            path,
            config,
            schema: Arc::new(schema),
            arena,
            indices,
            stamp,
        })
    }

    /// Load an existing database with the default config
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_with_config(path, Config::default())
    }

    /// Load an existing database and every index map present next to it.
    ///
    /// Validation:
    /// 1. The header declares 1..=16 fields with sane lengths
    /// 2. The file holds every record the header counts
    /// 3. Each index file holds its declared entries, sorted
    pub fn load_with_config(path: impl AsRef<Path>, config: Config) -> Result<Self> {
        let db = Self::open_files(path.as_ref(), config)?;

        info!(
            path = %db.path.display(),
            records = db.count(),
            fields = db.schema.field_count(),
            indexed = db.indices.iter().flatten().count(),
            mode = ?db.config.mapping_mode,
            "Loaded database"
        );
        Ok(db)
    }

    fn open_files(path: &Path, config: Config) -> Result<Self> {
        let path = path.to_path_buf();

        let arena = MappedFile::open(&path, config.mapping_mode)?;
        let stamp = arena.stamp()?;
        let (count, schema) = Schema::decode_header(arena.bytes())?;

        let needed = schema.header_len() as u64 + count as u64 * schema.entry_len() as u64;
        if needed > arena.len() as u64 {
            return Err(ArenaError::SchemaMismatch(format!(
                "header declares {} records ({} bytes) but '{}' holds {} bytes",
                count,
                needed,
                path.display(),
                arena.len()
            )));
        }

        let indices = (0..schema.field_count()).map(|_| None).collect();
        let mut db = Self {
            path,
            config,
            schema: Arc::new(schema),
            arena,
            indices,
            stamp,
        };
        db.open_new_indices()?;
        Ok(db)
    }

    /// Flush everything synchronously and unmap (the "free" operation).
    ///
    /// Networked handles wrote every change when it was made, so closing
    /// only waits for the device and never rewrites the files.
    pub fn close(self) -> Result<()> {
        self.sync_all()?;

        info!(path = %self.path.display(), records = self.count(), "Closed database");
        Ok(())
    }

    /// Replace this handle with a freshly loaded one (same path and config)
    pub fn reload(&mut self) -> Result<()> {
        let fresh = Self::open_files(&self.path, self.config.clone())?;
        *self = fresh;
        debug!(path = %self.path.display(), records = self.count(), "Reloaded database");
        Ok(())
    }

    /// Pick up changes other handles made to the files.
    ///
    /// Reads never remap on their own: a `Record` borrows the current
    /// mapping. Call this (or go through `ConsistencyGuard`) before reading
    /// records another handle may have appended.
    ///
    /// - Shared: remap files that grew and open index maps created since
    /// - Networked: reload if the arena stamp changed
    ///
    /// Returns whether anything was remapped, opened or reloaded.
    pub fn refresh(&mut self) -> Result<bool> {
        let _lock = self.write_lock()?;
        match self.config.mapping_mode {
            MappingMode::Shared => self.refresh_mappings(),
            MappingMode::Networked => {
                if !self.is_stale()? {
                    return Ok(false);
                }
                self.reload()?;
                Ok(true)
            }
        }
    }

    /// True when the arena file changed since it was loaded or last persisted
    /// by this handle
    pub fn is_stale(&self) -> Result<bool> {
        Ok(self.arena.stamp()? != self.stamp)
    }

    // =========================================================================
    // Index Management
    // =========================================================================

    /// Create an index on `field`, back-filled from every live record.
    ///
    /// Fails with `DuplicateKey` (and creates nothing) if two live records
    /// already share a value in that field.
    pub fn create_index(&mut self, field: u8) -> Result<()> {
        let key_range = self.schema.field_range(field)?;

        let _lock = self.write_lock()?;
        self.catch_up()?;
        // Another handle may have created it since we loaded
        if self.indices[field as usize].is_some() {
            return Err(ArenaError::IndexExists { field });
        }

        let mut entries: Vec<(Vec<u8>, u32)> = self
            .live_slots()
            .map(|(ordinal, bytes)| (bytes[key_range.clone()].to_vec(), ordinal))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        if entries.windows(2).any(|w| w[0].0 == w[1].0) {
            debug!(field, "Rejected index over duplicate values");
            return Err(ArenaError::DuplicateKey { field });
        }

        let index_path = IndexMap::path_for(&self.path, field);
        let mut index = IndexMap::create(
            &index_path,
            field,
            key_range.len(),
            self.config.initial_file_size,
            self.config.mapping_mode,
        )?;
        index.bulk_load(&entries)?;
        self.indices[field as usize] = Some(index);

        // In networked mode this also touches the arena, so other hosts reload
        self.flush_async()?;

        info!(field, backfilled = entries.len(), "Created index");
        Ok(())
    }

    pub fn is_indexed(&self, field: u8) -> bool {
        self.index(field).is_some()
    }

    /// The index map of `field`, if it has one
    pub fn index(&self, field: u8) -> Option<&IndexMap> {
        self.indices.get(field as usize).and_then(Option::as_ref)
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Append a record, returning its ordinal.
    ///
    /// Steps:
    /// 1. Validate the record (length, not all-zero)
    /// 2. Find the insertion point in every index; any duplicate rejects the
    ///    whole add before anything is modified
    /// 3. Reserve space in the arena and every index
    /// 4. Write the record, bump the count, insert the index entries
    /// 5. Flush asynchronously
    pub fn add(&mut self, record: impl AsRef<[u8]>) -> Result<u32> {
        let record = record.as_ref();
        self.check_record(record)?;

        let _lock = self.write_lock()?;
        self.catch_up()?;

        let count = self.count();
        if count == u32::MAX {
            return Err(ArenaError::CapacityExceeded);
        }

        // Step 2: check every index before touching anything
        let mut placements: Vec<(u8, usize, Range<usize>)> = Vec::new();
        for index in self.indices.iter().flatten() {
            let range = self.schema.field_range(index.field())?;
            let (pos, exact) = index.find_insertion_point(&record[range.clone()]);
            if exact {
                debug!(field = index.field(), "Rejected duplicate key");
                return Err(ArenaError::DuplicateKey { field: index.field() });
            }
            placements.push((index.field(), pos, range));
        }

        // Step 3: growth happens here, with no logical change yet
        let slot = self.slot_range(count);
        self.arena.reserve(slot.end, slot.start)?;
        for index in self.indices.iter_mut().flatten() {
            index.reserve_one()?;
        }

        // Step 4: nothing below can fail
        self.arena.bytes_mut()[slot].copy_from_slice(record);
        self.set_count(count + 1);
        for (field, pos, range) in placements {
            if let Some(index) = self.indices[field as usize].as_mut() {
                index.insert_at(pos, &record[range], count);
            }
        }

        self.flush_async()?;
        debug!(ordinal = count, "Added record");
        Ok(count)
    }

    /// Zero-fill the live record whose `field` equals `key`, returning its
    /// ordinal. Index entries are left in place.
    pub fn delete(&mut self, field: u8, key: &[u8]) -> Result<u32> {
        let _lock = self.write_lock()?;
        self.catch_up()?;

        let ordinal = self.locate(field, key)?;
        let slot = self.slot_range(ordinal);
        self.arena.bytes_mut()[slot].fill(0);

        self.flush_async()?;
        debug!(field, ordinal, "Deleted record");
        Ok(ordinal)
    }

    /// Overwrite `valfield` of the live record whose `keyfield` equals `key`.
    ///
    /// If `valfield` is indexed its entry moves to the new sorted position;
    /// a value already used by another record fails with `DuplicateKey`.
    pub fn update_field(
        &mut self,
        keyfield: u8,
        key: &[u8],
        valfield: u8,
        value: &[u8],
    ) -> Result<()> {
        let val_range = self.schema.field_range(valfield)?;
        self.check_key(valfield, value)?;

        let _lock = self.write_lock()?;
        self.catch_up()?;

        let ordinal = self.locate(keyfield, key)?;
        let slot = self.slot_range(ordinal);
        let mut updated = self.arena.bytes()[slot.clone()].to_vec();
        let old = updated[val_range.clone()].to_vec();
        if old == value {
            return Ok(());
        }
        updated[val_range].copy_from_slice(value);
        if is_zeroed(&updated) {
            return Err(ArenaError::InvalidInput(
                "update would leave an all-zero record".to_string(),
            ));
        }

        if let Some(index) = self.indices[valfield as usize].as_mut() {
            match index.find_insertion_point(&old) {
                (pos, true) if index.ordinal_at(pos) == ordinal => {}
                _ => {
                    return Err(ArenaError::SchemaMismatch(format!(
                        "index of field {} has no entry for record {}",
                        valfield, ordinal
                    )))
                }
            }
            // Fails on a duplicate before anything is modified
            index.insert(value, ordinal)?;
            let (old_pos, _) = index.find_insertion_point(&old);
            index.remove_at(old_pos);
        }

        self.arena.bytes_mut()[slot].copy_from_slice(&updated);

        self.flush_async()?;
        debug!(keyfield, valfield, ordinal, "Updated field");
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// The live record whose `field` equals `key`
    pub fn get(&self, field: u8, key: &[u8]) -> Result<Record<'_>> {
        let ordinal = self.locate(field, key)?;
        self.record_at(ordinal)
    }

    /// The record `offset` slots away from the one whose `field` equals `key`.
    ///
    /// # Append-order precondition
    ///
    /// Neighbours are taken in *physical append order*, not in the order of
    /// any index. The result is the logical neighbour only when records were
    /// added in the order the caller navigates by (e.g. date-keyed articles
    /// added chronologically).
    ///
    /// Fails with `NotFound` if the anchor is missing, or the target slot is
    /// outside the arena or deleted.
    pub fn get_offset(&self, field: u8, key: &[u8], offset: i64) -> Result<Record<'_>> {
        let anchor = self.locate(field, key)?;
        let target = (anchor as i64)
            .checked_add(offset)
            .ok_or(ArenaError::NotFound)?;
        if target < 0 || target >= self.count() as i64 {
            return Err(ArenaError::NotFound);
        }

        let record = self.record_at(target as u32)?;
        if record.is_tombstone() {
            return Err(ArenaError::NotFound);
        }
        Ok(record)
    }

    /// Live records with `key0 <= field <= key1` (byte-wise).
    ///
    /// Indexed fields return records in ascending key order; unindexed
    /// fields are scanned and return records in arena order.
    pub fn get_range(&self, field: u8, key0: &[u8], key1: &[u8]) -> Result<Vec<Record<'_>>> {
        self.check_key(field, key0)?;
        self.check_key(field, key1)?;
        if key0 > key1 {
            return Ok(Vec::new());
        }

        match self.index(field) {
            Some(index) => self.live_records(index.range(key0, key1)),
            None => {
                let range = self.schema.field_range(field)?;
                Ok(self
                    .live_slots()
                    .filter(|(_, bytes)| {
                        let value = &bytes[range.clone()];
                        key0 <= value && value <= key1
                    })
                    .map(|(ordinal, bytes)| Record::new(&self.schema, ordinal, bytes))
                    .collect())
            }
        }
    }

    /// Every live record, in key order when `field` is indexed and in arena
    /// order otherwise
    pub fn get_all(&self, field: u8) -> Result<Vec<Record<'_>>> {
        self.schema.field(field)?;
        match self.index(field) {
            Some(index) => self.live_records(index.iter().map(|(_, ordinal)| ordinal)),
            None => Ok(self
                .live_slots()
                .map(|(ordinal, bytes)| Record::new(&self.schema, ordinal, bytes))
                .collect()),
        }
    }

    /// Read view of one field of a fetched record
    pub fn get_field<'a>(&self, record: &Record<'a>, field: u8) -> Result<&'a [u8]> {
        record.get_field(field)
    }

    /// Write one field of a caller-owned record buffer
    pub fn set_field(&self, buf: &mut [u8], field: u8, value: &[u8]) -> Result<()> {
        self.schema.set_field(buf, field, value)
    }

    /// A zeroed record buffer for this schema
    pub fn new_record(&self) -> RecordBuf {
        RecordBuf::new(Arc::clone(&self.schema))
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Number of slots in the arena, tombstones included.
    ///
    /// Capped at what this handle has mapped; see `refresh`.
    pub fn count(&self) -> u32 {
        let mapped = (self.arena.len() - self.schema.header_len()) / self.schema.entry_len();
        self.declared_count().min(mapped.min(u32::MAX as usize) as u32)
    }

    /// Number of records that are not tombstones
    pub fn live_count(&self) -> u32 {
        self.live_slots().count() as u32
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn mapping_mode(&self) -> MappingMode {
        self.config.mapping_mode
    }

    /// Push changes toward disk.
    ///
    /// Shared mappings start an asynchronous msync. Networked handles wrote
    /// every change with ordinary writes already, so their files are synced.
    pub fn flush(&self) -> Result<()> {
        match self.config.mapping_mode {
            MappingMode::Shared => {
                for index in self.indices.iter().flatten() {
                    index.flush_async()?;
                }
                self.arena.flush_async(self.logical_len())
            }
            MappingMode::Networked => self.sync_all(),
        }
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Persist a mutation. Index maps go first so that, in networked mode, a
    /// changed arena stamp means every file has been written.
    fn flush_async(&mut self) -> Result<()> {
        for index in self.indices.iter().flatten() {
            index.flush_async()?;
        }
        self.arena.flush_async(self.logical_len())?;

        if self.config.mapping_mode == MappingMode::Networked {
            // Our own persist must not look like another host's write
            self.stamp = self.arena.stamp()?;
        }
        Ok(())
    }

    fn write_lock(&self) -> Result<Option<WriteLock>> {
        if !self.config.lock_writes {
            return Ok(None);
        }
        WriteLock::acquire(self.arena.file()).map(Some)
    }

    fn sync_all(&self) -> Result<()> {
        for index in self.indices.iter().flatten() {
            index.sync()?;
        }
        self.arena.sync(self.logical_len())
    }

    /// Bring this handle up to date before a mutation. Runs under the write
    /// lock, so the checks that follow see every committed change.
    ///
    /// A networked handle reloads unconditionally: stamps have coarse
    /// granularity and two writes within one tick look identical.
    fn catch_up(&mut self) -> Result<()> {
        match self.config.mapping_mode {
            MappingMode::Shared => self.refresh_mappings().map(|_| ()),
            MappingMode::Networked => self.reload(),
        }
    }

    /// Remap files grown by other handles and open their new index maps
    /// (shared mode)
    fn refresh_mappings(&mut self) -> Result<bool> {
        let mut changed = self.arena.refresh()?;
        for index in self.indices.iter_mut().flatten() {
            changed |= index.refresh()?;
        }
        changed |= self.open_new_indices()?;
        Ok(changed)
    }

    /// Open the index map of every unindexed field whose file now exists
    fn open_new_indices(&mut self) -> Result<bool> {
        let mut opened = false;
        for field in 0..self.schema.field_count() {
            if self.indices[field as usize].is_some() {
                continue;
            }
            let path = IndexMap::path_for(&self.path, field);
            let key_len = self.schema.field_len(field)?;
            if let Some(index) = IndexMap::open(&path, field, key_len, self.config.mapping_mode)? {
                debug!(field, entries = index.len(), "Opened index map");
                self.indices[field as usize] = Some(index);
                opened = true;
            }
        }
        Ok(opened)
    }

    /// Ordinal of the live record whose `field` equals `key`
    fn locate(&self, field: u8, key: &[u8]) -> Result<u32> {
        self.check_key(field, key)?;

        match self.index(field) {
            Some(index) => {
                let ordinal = index.lookup(key)?;
                if self.record_at(ordinal)?.is_tombstone() {
                    return Err(ArenaError::NotFound);
                }
                Ok(ordinal)
            }
            None => {
                let range = self.schema.field_range(field)?;
                self.live_slots()
                    .find(|(_, bytes)| &bytes[range.clone()] == key)
                    .map(|(ordinal, _)| ordinal)
                    .ok_or(ArenaError::NotFound)
            }
        }
    }

    fn record_at(&self, ordinal: u32) -> Result<Record<'_>> {
        if ordinal >= self.count() {
            if ordinal < self.declared_count() {
                return Err(ArenaError::StaleMapping);
            }
            return Err(ArenaError::SchemaMismatch(format!(
                "ordinal {} is past the end of the arena ({} records)",
                ordinal,
                self.count()
            )));
        }
        let bytes = &self.arena.bytes()[self.slot_range(ordinal)];
        Ok(Record::new(&self.schema, ordinal, bytes))
    }

    /// Dereference ordinals, dropping tombstones
    fn live_records(&self, ordinals: impl Iterator<Item = u32>) -> Result<Vec<Record<'_>>> {
        let mut records = Vec::new();
        for ordinal in ordinals {
            let record = self.record_at(ordinal)?;
            if !record.is_tombstone() {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// `(ordinal, bytes)` of every non-tombstone slot, in arena order
    fn live_slots(&self) -> impl Iterator<Item = (u32, &[u8])> + '_ {
        let bytes = self.arena.bytes();
        (0..self.count())
            .map(move |ordinal| (ordinal, &bytes[self.slot_range(ordinal)]))
            .filter(|(_, slot)| !is_zeroed(slot))
    }

    fn slot_range(&self, ordinal: u32) -> Range<usize> {
        let start = self.schema.header_len() + ordinal as usize * self.schema.entry_len();
        start..start + self.schema.entry_len()
    }

    /// Record count as written in the header, ignoring the mapped length
    fn declared_count(&self) -> u32 {
        let b = &self.arena.bytes()[..COUNT_SIZE];
        u32::from_le_bytes([b[0], b[1], b[2], b[3]])
    }

    fn logical_len(&self) -> usize {
        self.slot_range(self.count()).start
    }

    fn set_count(&mut self, count: u32) {
        self.arena.bytes_mut()[..COUNT_SIZE].copy_from_slice(&count.to_le_bytes());
    }

    fn check_key(&self, field: u8, key: &[u8]) -> Result<()> {
        let len = self.schema.field_len(field)?;
        if key.len() != len {
            return Err(ArenaError::InvalidInput(format!(
                "key for field {} must be {} bytes, got {}",
                field,
                len,
                key.len()
            )));
        }
        Ok(())
    }

    fn check_record(&self, record: &[u8]) -> Result<()> {
        if record.len() != self.schema.entry_len() {
            return Err(ArenaError::InvalidInput(format!(
                "record is {} bytes, schema requires {}",
                record.len(),
                self.schema.entry_len()
            )));
        }
        if is_zeroed(record) {
            return Err(ArenaError::InvalidInput(
                "an all-zero record is indistinguishable from a deleted one".to_string(),
            ));
        }
        Ok(())
    }
}
