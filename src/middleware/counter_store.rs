//! Per-key request counters for the fixed-window rate limiter.
//!
//! The store only counts. Deciding when a window ends is the limiter's job:
//! it calls [`CounterStore::reset`] on every window boundary, which drops all
//! counts at once.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Storage for per-client request counts within the current window.
///
/// Implementations must be safe to call from any number of request tasks at
/// once, including concurrent calls for the same key, and concurrently with
/// the limiter's reset task.
pub trait CounterStore: Send + Sync {
    /// Discard every count.
    fn reset(&self);

    /// Add one request for `key` and return the count after the increment.
    fn increment(&self, key: &str) -> u64;
}

/// Default [`CounterStore`] keeping counts in a `HashMap` behind one mutex.
///
/// The same lock guards both the map and its contents, and `reset` replaces
/// the whole map while holding it. A concurrent `increment` therefore lands
/// either in the window that just ended or in the fresh one.
#[derive(Debug, Default)]
pub struct InMemoryCounterStore {
    counts: Mutex<HashMap<String, u64>>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current count for `key` (0 when unseen in this window).
    pub fn count(&self, key: &str) -> u64 {
        self.lock().get(key).copied().unwrap_or(0)
    }

    /// Number of distinct keys seen in this window.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A panic while holding the lock cannot leave a half-written counter,
    // so a poisoned map is still usable.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, u64>> {
        self.counts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CounterStore for InMemoryCounterStore {
    fn reset(&self) {
        *self.lock() = HashMap::new();
    }

    fn increment(&self, key: &str) -> u64 {
        let mut counts = self.lock();
        if let Some(count) = counts.get_mut(key) {
            *count = count.saturating_add(1);
            return *count;
        }
        counts.insert(key.to_owned(), 1);
        1
    }
}
