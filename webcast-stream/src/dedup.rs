//! Per-session deduplication of event identifiers.

use std::collections::{HashSet, VecDeque};

/// Deterministic identifier for recognizing repeated delivery of logically
/// the same event. Scoped to one session; the cache holding these is reset
/// whenever a session is torn down or replaced.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey(pub String);

impl DedupKey {
    /// Create a key from its string form.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Tracks dedup keys already delivered for the active session.
///
/// Bounded: within one long-lived session the cache would otherwise grow
/// without bound, so once `capacity` keys are held the oldest-recorded key
/// is evicted for each new one. An evicted key's event could in principle be
/// re-delivered, which is an accepted trade-off of best-effort dedup.
#[derive(Debug)]
pub struct DedupCache {
    seen: HashSet<DedupKey>,
    order: VecDeque<DedupKey>,
    capacity: usize,
}

impl DedupCache {
    /// Create a cache retaining at most `capacity` keys.
    pub fn new(capacity: usize) -> Self {
        Self {
            seen: HashSet::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Whether `key` was already recorded this session.
    pub fn seen(&self, key: &DedupKey) -> bool {
        self.seen.contains(key)
    }

    /// Record `key`, returning false if it was already recorded.
    ///
    /// Evicts the oldest key when the cache is full.
    pub fn record(&mut self, key: DedupKey) -> bool {
        if self.seen.contains(&key) {
            return false;
        }
        if self.seen.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.order.push_back(key.clone());
        self.seen.insert(key);
        true
    }

    /// Clear all entries. Called exactly once per transition into
    /// Connecting so a new session never inherits dedup state.
    pub fn reset(&mut self) {
        self.seen.clear();
        self.order.clear();
    }

    /// Number of keys currently recorded.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether no keys are recorded.
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_detects_duplicates() {
        let mut cache = DedupCache::new(16);
        assert!(cache.record(DedupKey::new("a")));
        assert!(!cache.record(DedupKey::new("a")));
        assert!(cache.seen(&DedupKey::new("a")));
        assert!(!cache.seen(&DedupKey::new("b")));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn reset_clears_everything() {
        let mut cache = DedupCache::new(16);
        cache.record(DedupKey::new("a"));
        cache.record(DedupKey::new("b"));
        cache.reset();
        assert!(cache.is_empty());
        assert!(cache.record(DedupKey::new("a")));
    }

    #[test]
    fn oldest_key_is_evicted_at_capacity() {
        let mut cache = DedupCache::new(2);
        cache.record(DedupKey::new("a"));
        cache.record(DedupKey::new("b"));
        cache.record(DedupKey::new("c"));
        assert_eq!(cache.len(), 2);
        assert!(!cache.seen(&DedupKey::new("a")));
        assert!(cache.seen(&DedupKey::new("b")));
        assert!(cache.seen(&DedupKey::new("c")));
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut cache = DedupCache::new(0);
        assert!(cache.record(DedupKey::new("a")));
        assert!(!cache.record(DedupKey::new("a")));
    }
}
