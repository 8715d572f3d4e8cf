//! # arenadb
//!
//! A memory-mapped record store with:
//! - Fixed-width, multi-field records in an append-only arena
//! - Optional sorted index map per field (binary-searched point/range lookups)
//! - Tombstone deletes (zero-fill in place)
//! - Shared mappings for local use, explicit persist + reload for networked
//!   filesystems
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Domain layer (articles, comments)           │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                  Consistency Guard                           │
//! │     (remap grown files / stamp check + reload)               │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                  Database (engine)                           │
//! │     add / delete / get / get_range / get_offset / ...        │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │   Arena     │          │ Index Maps  │
//!   │  (mmap)     │          │ (mmap, 0-16)│
//!   └─────────────┘          └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use arenadb::{Database, Schema};
//!
//! # fn main() -> arenadb::Result<()> {
//! let schema = Schema::builder().ordered(4).raw(64).build()?;
//! let mut db = Database::create("articles.db", schema)?;
//! db.create_index(0)?;
//!
//! let mut article = db.new_record();
//! article.set_ordered(0, 2020_01_01)?.set_str(1, "Hello")?;
//! db.add(&article)?;
//!
//! let key = db.schema().ordered_key(0, 2020_01_01)?;
//! assert_eq!(db.get(0, &key)?.get_str(1)?, "Hello");
//! db.close()
//! # }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod record;
pub mod storage;
pub mod engine;
pub mod guard;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{ArenaError, ErrorClass, Result};
pub use config::{Config, MappingMode};
pub use engine::Database;
pub use guard::ConsistencyGuard;
pub use record::{FieldKind, FieldSpec, Record, RecordBuf, Schema};
pub use storage::IndexMap;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of arenadb
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
