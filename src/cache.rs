//! Object cache with per-entry expiration
//!
//! Keeps fetched chain objects for a short window so repeated lookups of the
//! same identifier do not hit the node again. Expiry is checked lazily on
//! access; there is no background sweeper.
//!
//! - `auto_clean = true`: every `set`, membership test, key listing, `len` and
//!   `Display` first purges expired entries
//! - `auto_clean = false`: expired entries stay in the map (and are counted by
//!   `len`/`Display`) but are never returned

use parking_lot::Mutex;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Default entry lifetime in seconds
pub const DEFAULT_EXPIRATION_SECS: u64 = 10;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    /// `None` when the lifetime reaches past what `Instant` can represent
    expires_at: Option<Instant>,
}

impl<V> CacheEntry<V> {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// Time-expiring key/value store
pub struct ObjectCache<K, V> {
    entries: Mutex<HashMap<K, CacheEntry<V>>>,
    default_expiration: Duration,
    auto_clean: bool,
}

impl<K, V> ObjectCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a new cache
    ///
    /// # Arguments
    /// * `default_expiration` - Lifetime of entries inserted with [`set`](Self::set)
    /// * `auto_clean` - Purge expired entries opportunistically
    pub fn new(default_expiration: Duration, auto_clean: bool) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            default_expiration,
            auto_clean,
        }
    }

    pub fn default_expiration(&self) -> Duration {
        self.default_expiration
    }

    /// Change the lifetime used for future inserts
    pub fn set_default_expiration(&mut self, expiration: Duration) {
        self.default_expiration = expiration;
    }

    pub fn auto_clean(&self) -> bool {
        self.auto_clean
    }

    /// Get a live value, `None` on miss or expiry
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let entries = self.entries.lock();
        let now = Instant::now();
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Some(entry.value.clone()),
            _ => None,
        }
    }

    /// Get a live value or return `default`
    pub fn get_or<Q>(&self, key: &Q, default: V) -> V
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(key).unwrap_or(default)
    }

    /// Insert or overwrite with the default lifetime
    pub fn set(&self, key: K, value: V) {
        self.set_with_expiration(key, value, self.default_expiration);
    }

    /// Insert or overwrite with a lifetime for this entry only
    pub fn set_with_expiration(&self, key: K, value: V, expiration: Duration) {
        let mut entries = self.entries.lock();
        let now = Instant::now();
        entries.insert(
            key,
            CacheEntry {
                value,
                expires_at: now.checked_add(expiration),
            },
        );
        if self.auto_clean {
            Self::purge(&mut entries, now);
        }
    }

    /// `true` iff the key is present and unexpired
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut entries = self.entries.lock();
        let now = Instant::now();
        if self.auto_clean {
            Self::purge(&mut entries, now);
        }
        entries.get(key).is_some_and(|entry| entry.is_live(now))
    }

    /// Remove an entry, returning it if it was still live
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut entries = self.entries.lock();
        let now = Instant::now();
        entries
            .remove(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value)
    }

    /// Keys of all live entries
    pub fn keys(&self) -> Vec<K> {
        let mut entries = self.entries.lock();
        let now = Instant::now();
        if self.auto_clean {
            Self::purge(&mut entries, now);
        }
        entries
            .iter()
            .filter(|(_, entry)| entry.is_live(now))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Number of stored entries
    ///
    /// Without auto-clean this still counts expired entries that nothing has
    /// removed yet.
    pub fn len(&self) -> usize {
        let mut entries = self.entries.lock();
        if self.auto_clean {
            Self::purge(&mut entries, Instant::now());
        }
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop expired entries, returning how many were removed
    pub fn clear_expired(&self) -> usize {
        let mut entries = self.entries.lock();
        Self::purge(&mut entries, Instant::now())
    }

    /// Empty the cache
    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        let dropped = entries.len();
        entries.clear();
        tracing::debug!(dropped = dropped, "Object cache cleared");
    }

    fn purge(entries: &mut HashMap<K, CacheEntry<V>>, now: Instant) -> usize {
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        let purged = before - entries.len();
        if purged > 0 {
            tracing::trace!(purged = purged, "Purged expired cache entries");
        }
        purged
    }
}

impl<K, V> Default for ObjectCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_EXPIRATION_SECS), true)
    }
}

impl<K, V> std::fmt::Display for ObjectCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ObjectCache(n={}, default_expiration={})",
            self.len(),
            self.default_expiration.as_secs()
        )
    }
}

impl<K, V> std::fmt::Debug for ObjectCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}
