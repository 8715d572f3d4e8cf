//! Record Module
//!
//! Fixed-width record layout and field access.
//!
//! ## Responsibilities
//! - Describe the ordered, fixed-length fields of a database (`Schema`)
//! - Compute field offsets once, never with ad hoc pointer math
//! - Borrowed views into the arena (`Record`) and owned buffers (`RecordBuf`)
//! - Big-endian encoding of ordered fields
//!
//! ## Record Layout
//! ```text
//! ┌──────────────┬──────────────┬─────┬──────────────┐
//! │ Field 0      │ Field 1      │ ... │ Field n-1    │
//! │ len(0) bytes │ len(1) bytes │     │ len(n-1)     │
//! └──────────────┴──────────────┴─────┴──────────────┘
//!   offset(i) = len(0) + ... + len(i-1)
//! ```
//!
//! A record with every byte zero is a tombstone (deleted).

mod schema;
mod view;

pub use schema::{
    FieldKind, FieldSpec, Schema, SchemaBuilder, MAX_FIELDS, MAX_FIELD_LEN, MAX_ORDERED_LEN,
};
pub use view::{Record, RecordBuf};

/// True when every byte is zero (a tombstone)
pub(crate) fn is_zeroed(bytes: &[u8]) -> bool {
    bytes.iter().all(|&b| b == 0)
}
