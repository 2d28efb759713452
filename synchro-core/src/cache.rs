/// Time-bounded read-through cache
///
/// A generic TTL cache used by the user directory to absorb bursts of
/// identity lookups (rendering a member list fires one lookup per
/// member). Entries expire after a fixed duration and are purged
/// before every lookup, so a caller never observes a value older than
/// the TTL.
///
/// The cache is owned by the service instance that needs it, not a
/// process-wide singleton, which keeps tests isolated and lets two
/// service instances carry independent caches.
///
/// Negative results are cached the same way as positive ones by
/// choosing `V = Option<T>`: a `Some(None)` hit means "we asked
/// recently and the record does not exist".
///
/// # Example
///
/// ```
/// use synchro_core::cache::TimedCache;
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let cache: TimedCache<String, Option<u32>> = TimedCache::new(Duration::from_secs(300));
/// cache.put("alice@example.com".to_string(), Some(7));
/// assert_eq!(cache.get(&"alice@example.com".to_string()), Some(Some(7)));
/// # }
/// ```

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Snapshot of cache occupancy, split by entry freshness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// All entries currently held, fresh or not.
    pub total_entries: usize,

    /// Entries still within the TTL window.
    pub valid_entries: usize,

    /// Entries past the TTL that have not been purged yet.
    pub expired_entries: usize,
}

/// A TTL-bounded map from `K` to `V`.
///
/// Uses `tokio::time::Instant` for timestamps so tests can drive
/// expiry with paused time instead of sleeping.
pub struct TimedCache<K, V> {
    ttl: Duration,
    entries: Mutex<HashMap<K, (V, Instant)>>,
}

impl<K, V> TimedCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Creates a cache whose entries live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        TimedCache {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the configured time-to-live.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Looks up `key`, purging expired entries first.
    ///
    /// Returns `None` when the key was never cached or its entry aged out.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.retain(|_, (_, stamp)| now.duration_since(*stamp) < self.ttl);
        entries.get(key).map(|(value, _)| value.clone())
    }

    /// Stores `value` under `key`, restarting its TTL window.
    pub fn put(&self, key: K, value: V) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key, (value, Instant::now()));
    }

    /// Drops every entry, fresh or not.
    pub fn invalidate_all(&self) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.clear();
    }

    /// Number of entries held, including expired ones awaiting purge.
    pub fn len(&self) -> usize {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.len()
    }

    /// True when the cache holds no entries at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Occupancy snapshot without purging, for debugging.
    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let total_entries = entries.len();
        let valid_entries = entries
            .values()
            .filter(|(_, stamp)| now.duration_since(*stamp) < self.ttl)
            .count();
        CacheStats {
            total_entries,
            valid_entries,
            expired_entries: total_entries - valid_entries,
        }
    }
}
