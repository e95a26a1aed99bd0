//! In-Memory Ordered Store
//!
//! Reference implementation of the storage contract: one ordered key set per
//! index, copy-on-write snapshots, and range cursors over `BTreeSet` ranges.
//!
//! ## Snapshot discipline
//!
//! Writers mutate through [`MemStore`]; every query runs against a
//! [`Snapshot`] taken at a basis transaction. Snapshots share the underlying
//! sets via `Arc`, so taking one is O(1) and a snapshot never observes later
//! writes (the store clones a set before its first post-snapshot mutation).

use crate::index::Index;
use crate::storage::{Cursor, KvStore, StorageError, StorageResult};
use std::collections::BTreeSet;
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Mutable in-memory store: four ordered key sets, one per index.
#[derive(Default)]
pub struct MemStore {
    indexes: [Arc<BTreeSet<Vec<u8>>>; 4],
    version: u64,
}

impl MemStore {
    pub fn new() -> Self {
        MemStore::default()
    }

    fn set_mut(&mut self, index: Index) -> &mut BTreeSet<Vec<u8>> {
        Arc::make_mut(&mut self.indexes[index_slot(index)])
    }

    /// Insert an encoded key into one index.
    pub fn insert_key(&mut self, index: Index, key: Vec<u8>) {
        self.set_mut(index).insert(key);
        self.version += 1;
    }

    /// Number of keys in an index.
    pub fn index_len(&self, index: Index) -> usize {
        self.indexes[index_slot(index)].len()
    }

    /// Take a read-only snapshot of the current state.
    pub fn snapshot(&self, basis_tx: u64) -> Snapshot {
        Snapshot {
            indexes: [
                Arc::clone(&self.indexes[0]),
                Arc::clone(&self.indexes[1]),
                Arc::clone(&self.indexes[2]),
                Arc::clone(&self.indexes[3]),
            ],
            version: self.version,
            basis_tx,
            scans_opened: Arc::new(AtomicU64::new(0)),
        }
    }
}

fn index_slot(index: Index) -> usize {
    match index {
        Index::Eavt => 0,
        Index::Aevt => 1,
        Index::Avet => 2,
        Index::Vaet => 3,
    }
}

/// Immutable point-in-time view over the four indexes.
#[derive(Clone)]
pub struct Snapshot {
    indexes: [Arc<BTreeSet<Vec<u8>>>; 4],
    version: u64,
    basis_tx: u64,
    scans_opened: Arc<AtomicU64>,
}

impl Snapshot {
    /// Store version this snapshot was taken at.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Highest committed transaction visible in this snapshot.
    pub fn basis_tx(&self) -> u64 {
        self.basis_tx
    }

    /// Cursors opened against this snapshot (diagnostics and tests).
    pub fn scans_opened(&self) -> u64 {
        self.scans_opened.load(Ordering::Relaxed)
    }
}

impl KvStore for Snapshot {
    fn scan(&self, index: Index, start: &[u8], end: &[u8]) -> StorageResult<Box<dyn Cursor + '_>> {
        self.scans_opened.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(MemCursor::new(
            &self.indexes[index_slot(index)],
            start,
            end,
        )))
    }
}

/// Cursor over a `BTreeSet` range.
struct MemCursor<'a> {
    set: &'a BTreeSet<Vec<u8>>,
    /// Exclusive upper bound; empty = unbounded
    end: Vec<u8>,
    /// Next key to resume from (inclusive)
    resume: Vec<u8>,
    last: Option<Vec<u8>>,
    closed: bool,
}

impl<'a> MemCursor<'a> {
    fn new(set: &'a BTreeSet<Vec<u8>>, start: &[u8], end: &[u8]) -> Self {
        MemCursor {
            set,
            end: end.to_vec(),
            resume: start.to_vec(),
            last: None,
            closed: false,
        }
    }

    fn upper_bound(&self) -> Bound<&[u8]> {
        if self.end.is_empty() {
            Bound::Unbounded
        } else {
            Bound::Excluded(self.end.as_slice())
        }
    }
}

impl Cursor for MemCursor<'_> {
    fn next_key(&mut self) -> StorageResult<Option<Vec<u8>>> {
        if self.closed {
            return Ok(None);
        }
        let lower: Bound<&[u8]> = Bound::Included(self.resume.as_slice());
        let upper = self.upper_bound();
        match self.set.range::<[u8], _>((lower, upper)).next() {
            Some(key) => {
                // Next resume point is the successor of the returned key
                let mut resume = key.clone();
                resume.push(0);
                self.resume = resume;
                self.last = Some(key.clone());
                Ok(Some(key.clone()))
            }
            None => Ok(None),
        }
    }

    fn seek(&mut self, key: &[u8]) -> StorageResult<()> {
        if self.closed {
            return Err(StorageError::CursorClosed);
        }
        self.resume = key.to_vec();
        Ok(())
    }

    fn position(&self) -> Option<&[u8]> {
        self.last.as_deref()
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
