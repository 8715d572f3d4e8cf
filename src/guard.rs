//! Consistency Guard
//!
//! Cross-host visibility for databases on networked filesystems.
//!
//! In `MappingMode::Networked` each host works on a private mapping, so a
//! write made on another host is never visible through it. The guard checks
//! the arena file's stamp (modification time and length) before every
//! operation; when it differs from the stamp of the last load (or of our own
//! last persist), the database is reloaded and the operation runs against
//! the fresh mapping.
//!
//! ```text
//!   read/write ──► stamp changed? ──no──► Database
//!                        │
//!                       yes
//!                        ▼
//!               load fresh handle, drop old
//! ```
//!
//! Stamps have the timestamp granularity of the filesystem: two writes that
//! land within the same tick on different hosts are not told apart by a
//! read. Writes do not depend on the stamp, since `Database` reloads under
//! its write lock before every mutation.
//!
//! Under `MappingMode::Shared` writes are visible through the page cache, so
//! the guard only remaps files another handle grew and opens index maps
//! another handle created.

use std::path::Path;

use tracing::warn;

use crate::config::{Config, MappingMode};
use crate::engine::Database;
use crate::error::Result;
use crate::record::Record;

/// A `Database` that reloads itself when another host changed its file
#[derive(Debug)]
pub struct ConsistencyGuard {
    db: Database,
    reloads: u64,
}

impl ConsistencyGuard {
    pub fn new(db: Database) -> Self {
        Self { db, reloads: 0 }
    }

    /// Load a database and wrap it
    pub fn load(path: impl AsRef<Path>, config: Config) -> Result<Self> {
        Ok(Self::new(Database::load_with_config(path, config)?))
    }

    /// Bring the database up to date with its files.
    ///
    /// Networked handles reload when the file changed since we last saw it;
    /// shared handles remap grown files and open new index maps.
    pub fn ensure_fresh(&mut self) -> Result<bool> {
        let refreshed = self.db.refresh()?;
        if refreshed && self.db.mapping_mode() == MappingMode::Networked {
            warn!(
                path = %self.db.path().display(),
                "Database file changed on another host, reloaded"
            );
            self.reloads += 1;
        }
        Ok(refreshed)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn get(&mut self, field: u8, key: &[u8]) -> Result<Record<'_>> {
        self.ensure_fresh()?;
        self.db.get(field, key)
    }

    pub fn get_offset(&mut self, field: u8, key: &[u8], offset: i64) -> Result<Record<'_>> {
        self.ensure_fresh()?;
        self.db.get_offset(field, key, offset)
    }

    pub fn get_range(&mut self, field: u8, key0: &[u8], key1: &[u8]) -> Result<Vec<Record<'_>>> {
        self.ensure_fresh()?;
        self.db.get_range(field, key0, key1)
    }

    pub fn get_all(&mut self, field: u8) -> Result<Vec<Record<'_>>> {
        self.ensure_fresh()?;
        self.db.get_all(field)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    pub fn add(&mut self, record: impl AsRef<[u8]>) -> Result<u32> {
        self.ensure_fresh()?;
        self.db.add(record)
    }

    pub fn delete(&mut self, field: u8, key: &[u8]) -> Result<u32> {
        self.ensure_fresh()?;
        self.db.delete(field, key)
    }

    pub fn update_field(
        &mut self,
        keyfield: u8,
        key: &[u8],
        valfield: u8,
        value: &[u8],
    ) -> Result<()> {
        self.ensure_fresh()?;
        self.db.update_field(keyfield, key, valfield, value)
    }

    pub fn create_index(&mut self, field: u8) -> Result<()> {
        self.ensure_fresh()?;
        self.db.create_index(field)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// The wrapped database, without a staleness check
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Number of networked reloads triggered by a changed stamp
    pub fn reload_count(&self) -> u64 {
        self.reloads
    }

    pub fn into_inner(self) -> Database {
        self.db
    }

    pub fn close(self) -> Result<()> {
        self.db.close()
    }
}
