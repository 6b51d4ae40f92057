//! Validation Cache
//!
//! Remembers transactions that passed full validation, keyed by full hash.
//! Entries are only trusted at the height they were computed at: fee floors
//! and the economic-cluster binding can change with every block.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;

pub struct ValidationCache {
    entries: Mutex<LruCache<[u8; 32], i32>>,
}

impl ValidationCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity is at least 1");
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Whether the transaction was validated at exactly this height.
    pub fn is_validated(&self, full_hash: &[u8; 32], height: i32) -> bool {
        self.entries
            .lock()
            .expect("cache lock poisoned")
            .get(full_hash)
            .is_some_and(|cached| *cached == height)
    }

    pub fn note_validated(&self, full_hash: [u8; 32], height: i32) {
        self.entries
            .lock()
            .expect("cache lock poisoned")
            .put(full_hash, height);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
