//! Round-robin API key ring.
//!
//! The cursor is shared by every request on the process, so a key that
//! fails for one caller is skipped by the next caller as well.

use std::sync::atomic::{AtomicUsize, Ordering};

pub struct KeyRing {
    keys: Vec<String>,
    cursor: AtomicUsize,
}

impl KeyRing {
    #[must_use]
    pub fn new(keys: Vec<String>) -> Self {
        let keys = keys
            .into_iter()
            .map(|k| k.trim().to_owned())
            .filter(|k| !k.is_empty())
            .collect();
        Self { keys, cursor: AtomicUsize::new(0) }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Index of the active key. Always `< len()` when the ring is non-empty.
    #[must_use]
    pub fn current_index(&self) -> usize {
        if self.keys.is_empty() {
            return 0;
        }
        self.cursor.load(Ordering::Relaxed) % self.keys.len()
    }

    #[must_use]
    pub fn current(&self) -> Option<&str> {
        self.keys.get(self.current_index()).map(String::as_str)
    }

    /// Advance the cursor and return the new active index.
    pub fn rotate(&self) -> usize {
        if self.keys.is_empty() {
            return 0;
        }
        let len = self.keys.len();
        let previous = self
            .cursor
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |c| Some((c + 1) % len))
            .unwrap_or_else(|c| c);
        (previous + 1) % len
    }
}
