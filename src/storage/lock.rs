//! Write Lock
//!
//! Advisory exclusive lock on the database file, held for the duration of
//! one check-then-mutate sequence so that two processes cannot both pass the
//! duplicate-key check for the same key.

use std::fs::File;

use fs2::FileExt;
use tracing::warn;

use crate::error::Result;

/// Held while a mutation runs; released on drop
#[derive(Debug)]
pub(crate) struct WriteLock {
    file: File,
}

impl WriteLock {
    /// Block until the exclusive lock on `file` is acquired.
    ///
    /// Locks a duplicated handle, so the guard owns no borrow of the database.
    pub fn acquire(file: &File) -> Result<Self> {
        let file = file.try_clone()?;
        FileExt::lock_exclusive(&file)?;
        Ok(Self { file })
    }
}

impl Drop for WriteLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(error = %e, "Failed to release database write lock");
        }
    }
}
