//! A small expiring map with an injectable clock.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Time source for [`TtlCache`].
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Map whose entries expire `ttl` after insertion.
///
/// The lock is a `std::sync::Mutex` and is never held across an `.await`:
/// callers look up, fetch on a miss, then insert.
pub struct TtlCache<K, V, C = SystemClock> {
    entries: Mutex<HashMap<K, (Instant, V)>>,
    ttl: Duration,
    clock: C,
}

impl<K, V> TtlCache<K, V, SystemClock>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, SystemClock)
    }
}

impl<K, V, C> TtlCache<K, V, C>
where
    K: Eq + Hash,
    V: Clone,
    C: Clock,
{
    pub fn with_clock(ttl: Duration, clock: C) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    /// Fresh value for `key`, if any. Expired entries are evicted on access.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get(key) {
            Some((inserted_at, value)) if now.duration_since(*inserted_at) < self.ttl => {
                Some(value.clone())
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Insert `value`, dropping every expired entry first so keys that are
    /// never read again do not accumulate.
    pub fn insert(&self, key: K, value: V) {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.retain(|_, (inserted_at, _)| now.duration_since(*inserted_at) < self.ttl);
        entries.insert(key, (now, value));
    }

    pub fn invalidate(&self, key: &K) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_expire_after_ttl() {
        let clock = ManualClock::new();
        let cache = TtlCache::with_clock(Duration::from_secs(300), clock.clone());
        cache.insert("mlbb", 1);

        clock.advance(Duration::from_secs(299));
        assert_eq!(cache.get(&"mlbb"), Some(1));

        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.get(&"mlbb"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_reinsert_restarts_ttl() {
        let clock = ManualClock::new();
        let cache = TtlCache::with_clock(Duration::from_secs(10), clock.clone());
        cache.insert("a", "old");
        clock.advance(Duration::from_secs(8));
        cache.insert("a", "new");
        clock.advance(Duration::from_secs(8));
        assert_eq!(cache.get(&"a"), Some("new"));
    }

    #[test]
    fn test_insert_drops_expired_entries() {
        let clock = ManualClock::new();
        let cache = TtlCache::with_clock(Duration::from_secs(60), clock.clone());
        for i in 0..1000u32 {
            cache.insert(i, i);
        }
        assert_eq!(cache.len(), 1000);

        clock.advance(Duration::from_secs(61));
        cache.insert(5000, 5000);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&5000), Some(5000));
    }

    #[test]
    fn test_invalidate() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.insert(1u8, "x");
        cache.invalidate(&1);
        assert_eq!(cache.get(&1), None);
    }
}
