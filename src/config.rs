//! Configuration for arenadb
//!
//! Centralized configuration with sensible defaults.

use crate::error::{ArenaError, Result};

/// Smallest file a database or index map may be created with
pub const MIN_FILE_SIZE: u64 = 4096;

/// Main configuration for a database handle
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Mapping Configuration
    // -------------------------------------------------------------------------
    /// How the arena and index files are mapped and made visible to others
    pub mapping_mode: MappingMode,

    /// Size (in bytes) a new database or index file is preallocated to.
    /// Files double in size whenever an append would overflow them.
    pub initial_file_size: u64,

    // -------------------------------------------------------------------------
    // Concurrency Configuration
    // -------------------------------------------------------------------------
    /// Take an advisory exclusive lock on the database file around every
    /// mutation (add/delete/update/create_index)
    pub lock_writes: bool,
}

/// Mapping strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingMode {
    /// Shared mapping: other processes on this host see writes through the
    /// page cache; mutations are flushed with an async msync
    Shared,

    /// Private copy-on-write mapping for filesystems without shared-mapping
    /// coherency (NFS and friends): every mutation is persisted with ordinary
    /// writes, and readers reload when the file changes underneath them
    Networked,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mapping_mode: MappingMode::Shared,
            initial_file_size: 32 * 1024, // 32 KiB
            lock_writes: true,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check that the configuration can be used to create files
    pub fn validate(&self) -> Result<()> {
        if self.initial_file_size < MIN_FILE_SIZE {
            return Err(ArenaError::Config(format!(
                "initial_file_size must be at least {} bytes, got {}",
                MIN_FILE_SIZE, self.initial_file_size
            )));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the mapping mode
    pub fn mapping_mode(mut self, mode: MappingMode) -> Self {
        self.config.mapping_mode = mode;
        self
    }

    /// Set the preallocated size of new files (in bytes)
    pub fn initial_file_size(mut self, size: u64) -> Self {
        self.config.initial_file_size = size;
        self
    }

    /// Enable or disable the advisory write lock
    pub fn lock_writes(mut self, enabled: bool) -> Self {
        self.config.lock_writes = enabled;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
