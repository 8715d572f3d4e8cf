//! Mapped File
//!
//! One memory-mapped file (the arena or an index map).
//!
//! Views handed out by `bytes()` borrow `&self`, while `reserve()` and
//! `refresh()` (which may remap) need `&mut self`, so the borrow checker
//! guarantees no view survives a remap.

use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use memmap2::{MmapMut, MmapOptions};
use tracing::debug;

use crate::config::MappingMode;
use crate::error::{ArenaError, Result};

/// Last-modified time and length of a backing file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStamp {
    pub modified: SystemTime,
    pub len: u64,
}

#[derive(Debug)]
pub(crate) struct MappedFile {
    path: PathBuf,
    file: File,
    mmap: MmapMut,
    mode: MappingMode,
}

impl MappedFile {
    /// Create (or truncate) a file of `len` bytes and map it
    pub fn create(path: &Path, len: u64, mode: MappingMode) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(len)?;

        let mmap = Self::map(&file, mode)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            mmap,
            mode,
        })
    }

    /// Open and map an existing file
    pub fn open(path: &Path, mode: MappingMode) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        if file.metadata()?.len() == 0 {
            return Err(ArenaError::SchemaMismatch(format!(
                "'{}' is empty",
                path.display()
            )));
        }

        let mmap = Self::map(&file, mode)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            mmap,
            mode,
        })
    }

    fn map(file: &File, mode: MappingMode) -> Result<MmapMut> {
        // SAFETY: mapping a file is unsafe because another process may change
        // it underneath us. The mapping is owned by MappedFile, every slice is
        // bounds-checked against its length, and remapping requires &mut self
        // so no outstanding slice can observe an unmapped region. Concurrent
        // writers on the same file are serialized by the advisory write lock.
        let mmap = unsafe {
            match mode {
                MappingMode::Shared => MmapMut::map_mut(file)?,
                MappingMode::Networked => MmapOptions::new().map_copy(file)?,
            }
        };
        Ok(mmap)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.mmap
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.mmap
    }

    /// Mapped length in bytes
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file(&self) -> &File {
        &self.file
    }

    /// Grow the file so at least `needed` bytes are mapped.
    ///
    /// `logical_len` is the prefix that holds live data; in networked mode it
    /// is persisted first, since the private mapping is discarded on remap.
    /// Returns whether a remap happened.
    pub fn reserve(&mut self, needed: usize, logical_len: usize) -> Result<bool> {
        if needed <= self.len() {
            return Ok(false);
        }

        match self.mode {
            MappingMode::Shared => self.mmap.flush()?,
            MappingMode::Networked => self.persist(logical_len)?,
        }

        // Never shrink a file another process already grew
        let file_len = self.file.metadata()?.len();
        let target = (self.len() as u64 * 2).max(needed as u64).max(file_len);
        if target > file_len {
            self.file.set_len(target)?;
        }
        self.mmap = Self::map(&self.file, self.mode)?;

        debug!(
            path = %self.path.display(),
            new_len = self.len(),
            "Grew mapped file"
        );
        Ok(true)
    }

    /// Remap if another process grew the file (shared mode only)
    pub fn refresh(&mut self) -> Result<bool> {
        if self.mode != MappingMode::Shared {
            return Ok(false);
        }
        let file_len = self.file.metadata()?.len();
        if file_len as usize <= self.len() {
            return Ok(false);
        }
        self.mmap = Self::map(&self.file, self.mode)?;
        debug!(path = %self.path.display(), new_len = self.len(), "Remapped grown file");
        Ok(true)
    }

    /// Start writing the first `logical_len` bytes back without waiting
    pub fn flush_async(&self, logical_len: usize) -> Result<()> {
        let len = logical_len.min(self.len());
        match self.mode {
            MappingMode::Shared => self.mmap.flush_async_range(0, len)?,
            MappingMode::Networked => self.persist(len)?,
        }
        Ok(())
    }

    /// Write the first `logical_len` bytes back and wait for the device.
    ///
    /// A private mapping is not written again here: its changes were
    /// persisted by `flush_async`, and the file may hold newer data from
    /// another host by now.
    pub fn sync(&self, logical_len: usize) -> Result<()> {
        match self.mode {
            MappingMode::Shared => self.mmap.flush_range(0, logical_len.min(self.len()))?,
            MappingMode::Networked => self.file.sync_data()?,
        }
        Ok(())
    }

    /// Copy the logical prefix of a private mapping into the file with
    /// ordinary writes, so other hosts can see it
    fn persist(&self, logical_len: usize) -> Result<()> {
        let mut file = &self.file;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&self.mmap[..logical_len])?;
        file.flush()?;
        Ok(())
    }

    /// Current stamp of the file on disk (looked up by path, so a replaced
    /// file is noticed too)
    pub fn stamp(&self) -> Result<FileStamp> {
        let metadata = fs::metadata(&self.path)?;
        Ok(FileStamp {
            modified: metadata.modified()?,
            len: metadata.len(),
        })
    }
}
