//! LRU cache for rendered frames

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;

use super::request::{Generation, RenderTicket};
use super::surface::Frame;

/// Cache key for rendered frames
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub generation: Generation,
    /// 1-based page number
    pub page: usize,
    /// Zoom factor in ten-thousandths
    pub zoom_key: u32,
}

impl CacheKey {
    #[must_use]
    pub fn from_ticket(ticket: &RenderTicket) -> Self {
        Self {
            generation: ticket.generation,
            page: ticket.page,
            zoom_key: ticket.zoom_key,
        }
    }
}

/// LRU cache of frames for the current document
pub struct FrameCache {
    cache: LruCache<CacheKey, Arc<Frame>>,
}

impl FrameCache {
    /// Create a new cache with the given capacity
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
        }
    }

    /// Get a cached frame, promoting it in the LRU order
    #[must_use]
    pub fn get(&mut self, key: &CacheKey) -> Option<Arc<Frame>> {
        self.cache.get(key).cloned()
    }

    /// Check if a key is in the cache without promoting it
    #[must_use]
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.cache.contains(key)
    }

    pub fn insert(&mut self, key: CacheKey, frame: Arc<Frame>) {
        self.cache.put(key, frame);
    }

    /// Clear all cached frames
    pub fn invalidate_all(&mut self) {
        self.cache.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.cache.cap().get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(generation: u64, page: usize) -> CacheKey {
        CacheKey {
            generation: Generation(generation),
            page,
            zoom_key: 10_000,
        }
    }

    fn frame(shade: u8) -> Arc<Frame> {
        Arc::new(Frame::filled(1, 1, [shade; 3]))
    }

    #[test]
    fn zero_capacity_becomes_one() {
        let cache = FrameCache::new(0);
        assert_eq!(cache.capacity(), 1);
    }

    #[test]
    fn evicts_least_recently_used() {
        let mut cache = FrameCache::new(2);
        cache.insert(key(1, 1), frame(1));
        cache.insert(key(1, 2), frame(2));

        // touch page 1 so page 2 is the eviction candidate
        assert!(cache.get(&key(1, 1)).is_some());
        cache.insert(key(1, 3), frame(3));

        assert!(cache.contains(&key(1, 1)));
        assert!(!cache.contains(&key(1, 2)));
        assert!(cache.contains(&key(1, 3)));
    }

    #[test]
    fn invalidate_all_clears_every_generation() {
        let mut cache = FrameCache::new(8);
        cache.insert(key(1, 1), frame(1));
        cache.insert(key(2, 1), frame(2));
        cache.insert(key(2, 2), frame(3));
        assert_eq!(cache.len(), 3);

        cache.invalidate_all();
        assert!(cache.is_empty());
        assert!(!cache.contains(&key(2, 2)));
        assert_eq!(cache.capacity(), 8);
    }
}
