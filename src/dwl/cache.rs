use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use parking_lot::Mutex;

use crate::errors::Result;

/// Normalized probability per target phrase id.
pub type Predictions = BTreeMap<usize, f32>;

pub const DEFAULT_CAPACITY: usize = 100;

#[derive(Debug, Default)]
struct Lru {
    entries: HashMap<String, (u64, Arc<Predictions>)>,
    order: BTreeMap<u64, String>,
    tick: u64,
    hits: u64,
    misses: u64,
}

impl Lru {
    fn get(&mut self, key: &str) -> Option<Arc<Predictions>> {
        self.tick += 1;
        let tick = self.tick;
        let (used, value) = self.entries.get_mut(key)?;
        self.order.remove(&*used);
        *used = tick;
        self.order.insert(tick, key.to_string());
        Some(Arc::clone(value))
    }

    fn insert(&mut self, key: String, value: Arc<Predictions>, capacity: usize) {
        self.tick += 1;
        while self.entries.len() >= capacity {
            let Some((_, oldest)) = self.order.pop_first() else {
                break;
            };
            self.entries.remove(&oldest);
        }
        self.order.insert(self.tick, key.clone());
        self.entries.insert(key, (self.tick, value));
    }
}

/// Fixed-capacity LRU store of classifier predictions, shared by every
/// sentence task.
///
/// The lock is never held while predictions are computed. Two tasks that miss
/// on the same key at once may both compute; the first to store wins and
/// both get the stored value.
#[derive(Debug)]
pub struct PredictionCache {
    capacity: usize,
    inner: Mutex<Lru>,
}

impl Default for PredictionCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl PredictionCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Lru::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn get(&self, key: &str) -> Option<Arc<Predictions>> {
        self.inner.lock().get(key)
    }

    /// Returns the stored predictions for `key`, computing them with
    /// `compute` on a miss.
    pub fn get_or_insert_with<F>(&self, key: &str, compute: F) -> Result<Arc<Predictions>>
    where
        F: FnOnce() -> Result<Predictions>,
    {
        {
            let mut lru = self.inner.lock();
            if let Some(hit) = lru.get(key) {
                lru.hits += 1;
                return Ok(hit);
            }
            lru.misses += 1;
        }
        log::debug!("prediction cache miss: {:?}", key);
        let computed = Arc::new(compute()?);

        let mut lru = self.inner.lock();
        if let Some(stored) = lru.get(key) {
            return Ok(stored);
        }
        lru.insert(key.to_string(), Arc::clone(&computed), self.capacity);
        Ok(computed)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(hits, misses)` since construction.
    pub fn stats(&self) -> (u64, u64) {
        let lru = self.inner.lock();
        (lru.hits, lru.misses)
    }

    pub fn clear(&self) {
        let mut lru = self.inner.lock();
        lru.entries.clear();
        lru.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preds(id: usize, p: f32) -> Predictions {
        BTreeMap::from([(id, p)])
    }

    #[test]
    fn hit_skips_compute() {
        let cache = PredictionCache::default();
        let first = cache.get_or_insert_with("a", || Ok(preds(1, 0.5))).unwrap();
        let second = cache
            .get_or_insert_with("a", || panic!("computed twice"))
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.stats(), (1, 1));
    }

    #[test]
    fn evicts_least_recently_used() {
        let cache = PredictionCache::new(2);
        cache.get_or_insert_with("a", || Ok(preds(1, 0.1))).unwrap();
        cache.get_or_insert_with("b", || Ok(preds(2, 0.2))).unwrap();
        // touch "a" so "b" is the oldest
        assert!(cache.get("a").is_some());
        cache.get_or_insert_with("c", || Ok(preds(3, 0.3))).unwrap();
        assert_eq!(cache.len(), 2);
        assert!(cache.get("b").is_none());
        assert!(cache.get("a").is_some());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn failed_compute_is_not_stored() {
        let cache = PredictionCache::default();
        let err = cache.get_or_insert_with("a", || Err(crate::Error::NullAlignedSpan));
        assert!(err.is_err());
        assert!(cache.is_empty());
        cache.clear();
        assert_eq!(cache.capacity(), DEFAULT_CAPACITY);
    }
}
