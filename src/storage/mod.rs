//! # Storage Interface
//!
//! The engine consumes storage through a narrow, byte-level contract: an
//! ordered key space per [`Index`], range scans returning keys in
//! lexicographic order, and forward-only cursors with `seek`. Keys are the
//! self-describing encodings produced by [`crate::index`]; the engine never
//! reads stored values.
//!
//! The on-disk engine lives behind this interface. The crate ships
//! [`MemStore`], an in-memory ordered store, as the reference implementation
//! used by tests and embedded callers.

pub mod memory;

pub use memory::{MemStore, Snapshot};

use crate::index::Index;
use std::io;
use thiserror::Error;

/// Storage layer errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O error from the underlying engine
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The engine returned data it should not have
    #[error("storage corruption: {0}")]
    Corrupt(String),

    /// Operation on a closed cursor
    #[error("cursor is closed")]
    CursorClosed,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// A forward-only cursor over an index key range.
///
/// Cursors are single-owner and must never be shared across workers. A
/// cursor may block on I/O at every advance.
pub trait Cursor {
    /// The next key in order, or `None` when the range is exhausted.
    fn next_key(&mut self) -> StorageResult<Option<Vec<u8>>>;

    /// Position at the first key `>= key` within the cursor's range.
    ///
    /// Seeking backward past keys already returned is not supported; the
    /// matcher reopens instead.
    fn seek(&mut self, key: &[u8]) -> StorageResult<()>;

    /// The last key this cursor returned, if any.
    fn position(&self) -> Option<&[u8]>;

    /// Release resources. Further calls return `CursorClosed` / `None`.
    fn close(&mut self);
}

/// A read-only, point-in-time view of the datom indexes.
pub trait KvStore {
    /// Open a cursor over `[start, end)` in the given index.
    ///
    /// An empty `end` means "to the end of the index". Keys are yielded in
    /// lexicographic order.
    fn scan(&self, index: Index, start: &[u8], end: &[u8]) -> StorageResult<Box<dyn Cursor + '_>>;
}
