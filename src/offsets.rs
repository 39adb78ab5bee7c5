//! Tail offsets for every watched file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

/// Maps an absolute file path to the byte offset up to which it has been read
/// and reported.
///
/// A path that was never seeded reads as offset `0`. Entries live for the
/// lifetime of the store.
#[derive(Debug, Default)]
pub struct OffsetStore {
    offsets: Mutex<HashMap<PathBuf, u64>>,
}

impl OffsetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stored offset for `path`, or `0` if absent.
    pub fn get(&self, path: impl AsRef<Path>) -> u64 {
        self.offsets
            .lock()
            .get(path.as_ref())
            .copied()
            .unwrap_or(0)
    }

    /// Records `offset` for `path`, returning the previous value if any.
    pub fn set(&self, path: impl Into<PathBuf>, offset: u64) -> Option<u64> {
        self.offsets.lock().insert(path.into(), offset)
    }

    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.offsets.lock().contains_key(path.as_ref())
    }

    /// Returns the number of tracked files.
    pub fn len(&self) -> usize {
        self.offsets.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.lock().is_empty()
    }
}
