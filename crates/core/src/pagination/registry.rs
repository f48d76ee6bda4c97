use std::collections::HashMap;

use super::page_cache::IncrementalPageCache;

/// Page caches keyed by query identity (one per mounted screen instance).
///
/// Owned by the session or screen scope that created it, never process-global.
#[derive(Debug)]
pub struct PageCacheRegistry<T> {
    caches: HashMap<String, IncrementalPageCache<T>>,
}

impl<T> Default for PageCacheRegistry<T> {
    fn default() -> Self {
        Self {
            caches: HashMap::new(),
        }
    }
}

impl<T> PageCacheRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache for `identity`, created empty on first use.
    pub fn entry(&mut self, identity: &str) -> &mut IncrementalPageCache<T> {
        self.caches.entry(identity.to_string()).or_default()
    }

    pub fn get(&self, identity: &str) -> Option<&IncrementalPageCache<T>> {
        self.caches.get(identity)
    }

    /// Drops the cache of an unmounted screen. Late results for it are simply not applied.
    pub fn discard(&mut self, identity: &str) -> Option<IncrementalPageCache<T>> {
        self.caches.remove(identity)
    }

    pub fn len(&self) -> usize {
        self.caches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.caches.is_empty()
    }

    pub fn clear(&mut self) {
        self.caches.clear();
    }
}
