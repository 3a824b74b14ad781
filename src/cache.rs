use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::BoxError;
use crate::rules::RuleSet;

/// What the filter remembers under a cache key: the verdict for a client
/// identity, or the rules parsed from a filter string.
///
/// `NotBlocked` is distinct from a missing entry. A miss triggers rule
/// evaluation; `NotBlocked` short-circuits straight to the inner handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheEntry {
    NotBlocked,
    RedirectTo(String),
    Rules(RuleSet),
}

/// Boundary to the host application's cache.
///
/// A missing key is `Ok(None)`; transport failures propagate to the
/// caller untouched.
pub trait Cache {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, BoxError>;
    fn put(&self, key: &str, entry: CacheEntry, ttl: Duration) -> Result<(), BoxError>;
}

impl<T: Cache + ?Sized> Cache for &T {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, BoxError> {
        (**self).get(key)
    }

    fn put(&self, key: &str, entry: CacheEntry, ttl: Duration) -> Result<(), BoxError> {
        (**self).put(key, entry, ttl)
    }
}

/// In-process cache with lazy expiry, for tests and single-process hosts.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (CacheEntry, Option<Instant>)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, BoxError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| BoxError::from("memory cache mutex poisoned"))?;
        match entries.get(key) {
            Some((_, Some(expires_at))) if *expires_at <= Instant::now() => {
                entries.remove(key);
                Ok(None)
            }
            Some((entry, _)) => Ok(Some(entry.clone())),
            None => Ok(None),
        }
    }

    fn put(&self, key: &str, entry: CacheEntry, ttl: Duration) -> Result<(), BoxError> {
        // A ttl too large to represent never expires.
        let expires_at = Instant::now().checked_add(ttl);
        self.entries
            .lock()
            .map_err(|_| BoxError::from("memory cache mutex poisoned"))?
            .insert(key.to_string(), (entry, expires_at));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Cache, CacheEntry, MemoryCache};
    use crate::dsl::parse_filter_string;
    use std::time::Duration;

    #[test]
    fn a_missing_key_is_distinct_from_a_stored_not_blocked() {
        let cache = MemoryCache::new();
        assert_eq!(cache.get("verdict").unwrap(), None);
        cache
            .put("verdict", CacheEntry::NotBlocked, Duration::from_secs(60))
            .unwrap();
        assert_eq!(cache.get("verdict").unwrap(), Some(CacheEntry::NotBlocked));
    }

    #[test]
    fn entries_expire_after_their_ttl() {
        let cache = MemoryCache::new();
        cache
            .put(
                "verdict",
                CacheEntry::RedirectTo("incompatible_browser".into()),
                Duration::ZERO,
            )
            .unwrap();
        assert_eq!(cache.get("verdict").unwrap(), None);
    }

    #[test]
    fn later_stores_overwrite_earlier_ones() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_secs(60);
        cache.put("verdict", CacheEntry::NotBlocked, ttl).unwrap();
        cache
            .put("verdict", CacheEntry::RedirectTo("upgrade".into()), ttl)
            .unwrap();
        assert_eq!(
            cache.get("verdict").unwrap(),
            Some(CacheEntry::RedirectTo("upgrade".into()))
        );
    }

    #[test]
    fn entries_survive_a_serde_round_trip() {
        let rules = parse_filter_string("Tablet;Other/IE/<9").unwrap();
        for entry in [
            CacheEntry::NotBlocked,
            CacheEntry::RedirectTo("upgrade".into()),
            CacheEntry::Rules(rules),
        ] {
            let yaml = serde_yaml::to_string(&entry).unwrap();
            let back: CacheEntry = serde_yaml::from_str(&yaml).unwrap();
            assert_eq!(back, entry, "through {yaml:?}");
        }
    }
}
