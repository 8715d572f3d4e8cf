//! Storage Module
//!
//! Memory-mapped files backing the record arena and its index maps.
//!
//! ## Responsibilities
//! - Map, grow, flush and persist files (`MappedFile`)
//! - Sorted per-field index maps with binary search (`IndexMap`)
//! - Advisory cross-process write lock (`WriteLock`)
//!
//! ## Arena File Format
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ Header                                                   │
//! │ ┌───────────┬─────────────────┬────────────────────────┐ │
//! │ │ Count (4) │ FieldCount (1)  │ FieldCount x Word (2)  │ │
//! │ └───────────┴─────────────────┴────────────────────────┘ │
//! │   Word = length (bits 0-14) | ordered flag (bit 15)      │
//! ├──────────────────────────────────────────────────────────┤
//! │ Records (Count x entry_length bytes, append order)       │
//! ├──────────────────────────────────────────────────────────┤
//! │ Preallocated space (file doubles when full)              │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Index Map File Format (`<db path>map<X>`)
//! ```text
//! ┌───────────┬──────────────────────────────────────────────┐
//! │ Count (4) │ Count x [Key (field length) | Ordinal (4)]   │
//! └───────────┴──────────────────────────────────────────────┘
//!   entries sorted strictly ascending by byte-wise key
//! ```
//!
//! All integers outside record bytes are little-endian.

mod index;
mod lock;
mod mmap;

pub use index::IndexMap;
pub use mmap::FileStamp;

pub(crate) use lock::WriteLock;
pub(crate) use mmap::MappedFile;

/// Size of the leading count in both file kinds
pub(crate) const COUNT_SIZE: usize = 4;

/// Size of a record ordinal stored in an index entry
pub(crate) const ORDINAL_SIZE: usize = 4;
