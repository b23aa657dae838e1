//! Bounded, expiring set of recently handled request ids

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Default number of ids remembered
pub const DEFAULT_RECENCY_CAPACITY: usize = 1024;

/// Default time an id is remembered
pub const DEFAULT_RECENCY_TTL: Duration = Duration::from_secs(600);

/// Request ids seen recently
///
/// Entries expire after `ttl`; when full, the oldest entry is evicted.
/// Both bounds are strict: an id is never forgotten early except by
/// capacity eviction.
#[derive(Debug)]
pub struct RecencySet {
    capacity: usize,
    ttl: Duration,
    order: VecDeque<(String, Instant)>,
    entries: HashMap<String, Instant>,
}

impl RecencySet {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            ttl,
            order: VecDeque::with_capacity(capacity),
            entries: HashMap::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Whether `id` was recorded within the last `ttl`
    pub fn contains(&mut self, id: &str) -> bool {
        self.contains_at(id, Instant::now())
    }

    /// Remember `id` as seen now
    pub fn insert(&mut self, id: &str) {
        self.insert_at(id, Instant::now());
    }

    fn contains_at(&mut self, id: &str, now: Instant) -> bool {
        self.expire(now);
        self.entries.contains_key(id)
    }

    fn insert_at(&mut self, id: &str, now: Instant) {
        self.expire(now);
        if self.entries.insert(id.to_string(), now).is_some() {
            self.order.retain(|(seen, _)| seen != id);
        }
        self.order.push_back((id.to_string(), now));

        while self.order.len() > self.capacity {
            if let Some((evicted, _)) = self.order.pop_front() {
                self.entries.remove(&evicted);
            }
        }
    }

    fn expire(&mut self, now: Instant) {
        while let Some((id, seen_at)) = self.order.front() {
            if now.saturating_duration_since(*seen_at) < self.ttl {
                break;
            }
            self.entries.remove(id);
            self.order.pop_front();
        }
    }
}

impl Default for RecencySet {
    fn default() -> Self {
        Self::new(DEFAULT_RECENCY_CAPACITY, DEFAULT_RECENCY_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seen_within_ttl() {
        let mut set = RecencySet::new(4, Duration::from_secs(60));
        let t0 = Instant::now();
        set.insert_at("a", t0);
        assert!(set.contains_at("a", t0 + Duration::from_secs(59)));
        assert!(!set.contains_at("b", t0));
    }

    #[test]
    fn test_expires_after_ttl() {
        let mut set = RecencySet::new(4, Duration::from_secs(60));
        let t0 = Instant::now();
        set.insert_at("a", t0);
        set.insert_at("b", t0 + Duration::from_secs(30));
        assert!(!set.contains_at("a", t0 + Duration::from_secs(61)));
        assert!(set.contains_at("b", t0 + Duration::from_secs(61)));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_evicts_oldest_at_capacity() {
        let mut set = RecencySet::new(2, Duration::from_secs(60));
        let t0 = Instant::now();
        set.insert_at("a", t0);
        set.insert_at("b", t0);
        set.insert_at("c", t0);
        assert_eq!(set.len(), 2);
        assert!(!set.contains_at("a", t0));
        assert!(set.contains_at("b", t0));
        assert!(set.contains_at("c", t0));
    }

    #[test]
    fn test_reinsert_refreshes_entry() {
        let mut set = RecencySet::new(2, Duration::from_secs(60));
        let t0 = Instant::now();
        set.insert_at("a", t0);
        set.insert_at("b", t0 + Duration::from_secs(1));
        set.insert_at("a", t0 + Duration::from_secs(2));
        set.insert_at("c", t0 + Duration::from_secs(3));
        assert!(set.contains_at("a", t0 + Duration::from_secs(3)));
        assert!(!set.contains_at("b", t0 + Duration::from_secs(3)));
        assert!(set.contains_at("a", t0 + Duration::from_secs(61)));
    }
}
