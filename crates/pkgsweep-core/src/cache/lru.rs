//! Recency/size-bounded cache over package identities.
//!
//! Eviction here only changes "in-cache" status — it reports identities,
//! it never touches the filesystem. The downstream plan decides what
//! actually happens to an evicted package.

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::records::PackageId;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct LruEntry {
    size_bytes: u64,
    last_touch: DateTime<Utc>,
    /// Strict touch order, for deterministic candidate ordering.
    seq: u64,
}

pub struct PackageLruCache {
    entries: HashMap<PackageId, LruEntry>,
    max_entries: usize,
    max_bytes: u64,
    total_bytes: u64,
    next_seq: u64,
    /// Identities evicted by bound enforcement, oldest-evicted first.
    evicted: Vec<PackageId>,
}

impl PackageLruCache {
    pub fn new(max_entries: usize, max_bytes: u64) -> Result<Self> {
        if max_entries < 1 {
            return Err(Error::Config("LRU cache needs max_entries >= 1".into()));
        }
        if max_bytes < 1 {
            return Err(Error::Config("LRU cache needs max_bytes >= 1".into()));
        }
        Ok(Self {
            entries: HashMap::new(),
            max_entries,
            max_bytes,
            total_bytes: 0,
            next_seq: 0,
            evicted: Vec::new(),
        })
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        Self::new(config.lru_max_packages, config.lru_max_size_bytes)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Mark a package as most-recently-used, inserting if absent, then
    /// enforce both bounds. Returns the identities evicted by this call.
    pub fn touch(&mut self, id: &PackageId, size_bytes: u64) -> Vec<PackageId> {
        self.touch_at(id, size_bytes, Utc::now())
    }

    /// Same as [`touch`](Self::touch) but with an explicit recency stamp,
    /// so replaying a scan snapshot preserves the observed access times.
    pub fn touch_at(
        &mut self,
        id: &PackageId,
        size_bytes: u64,
        at: DateTime<Utc>,
    ) -> Vec<PackageId> {
        self.next_seq += 1;
        let seq = self.next_seq;

        if let Some(entry) = self.entries.get_mut(id) {
            self.total_bytes = self.total_bytes - entry.size_bytes + size_bytes;
            entry.size_bytes = size_bytes;
            entry.last_touch = at;
            entry.seq = seq;
        } else {
            self.entries.insert(
                id.clone(),
                LruEntry {
                    size_bytes,
                    last_touch: at,
                    seq,
                },
            );
            self.total_bytes += size_bytes;
        }

        self.enforce_bounds()
    }

    fn enforce_bounds(&mut self) -> Vec<PackageId> {
        let mut evicted = Vec::new();
        while self.entries.len() > self.max_entries || self.total_bytes > self.max_bytes {
            let Some(victim) = self.tail_id() else { break };
            if let Some(entry) = self.entries.remove(&victim) {
                self.total_bytes = self.total_bytes.saturating_sub(entry.size_bytes);
            }
            evicted.push(victim);
        }
        self.evicted.extend(evicted.iter().cloned());
        evicted
    }

    /// Oldest entry; ties on recency are broken by evicting the larger
    /// package first (bytes-saved heuristic), then by insertion order.
    fn tail_id(&self) -> Option<PackageId> {
        self.entries
            .iter()
            .min_by(|(_, a), (_, b)| {
                a.last_touch
                    .cmp(&b.last_touch)
                    .then(b.size_bytes.cmp(&a.size_bytes))
                    .then(a.seq.cmp(&b.seq))
            })
            .map(|(id, _)| id.clone())
    }

    /// Whether the identity lies in the preserved (resident) set.
    pub fn should_keep(&self, id: &PackageId) -> bool {
        self.entries.contains_key(id)
    }

    /// Snapshot of eviction order: identities already evicted by bound
    /// enforcement first (in eviction order), then resident entries from
    /// the LRU tail upward. One pass per call.
    pub fn eviction_candidates(&self) -> Vec<PackageId> {
        let mut resident: Vec<(&PackageId, &LruEntry)> = self.entries.iter().collect();
        resident.sort_by(|(_, a), (_, b)| {
            a.last_touch
                .cmp(&b.last_touch)
                .then(b.size_bytes.cmp(&a.size_bytes))
                .then(a.seq.cmp(&b.seq))
        });

        let mut candidates = self.evicted.clone();
        candidates.extend(resident.into_iter().map(|(id, _)| id.clone()));
        candidates
    }

    /// Identities evicted by bound enforcement since construction.
    pub fn evicted(&self) -> &[PackageId] {
        &self.evicted
    }

    /// True when the byte bound forced evictions, i.e. the configured
    /// budget cannot hold the touched working set.
    pub fn under_size_pressure(&self) -> bool {
        !self.evicted.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn id(name: &str) -> PackageId {
        PackageId::new(name, "1.0.0")
    }

    #[test]
    fn test_bounds_hold_after_every_touch() {
        let mut cache = PackageLruCache::new(3, 100).unwrap();
        for i in 0..20 {
            cache.touch(&id(&format!("pkg{}", i)), 40);
            assert!(cache.len() <= 3);
            assert!(cache.total_bytes() <= 100);
        }
    }

    #[test]
    fn test_retouch_moves_to_head() {
        // touches A, B, C, A: next eviction candidate is B, not A
        let mut cache = PackageLruCache::new(10, u64::MAX).unwrap();
        let base = Utc::now();
        cache.touch_at(&id("a"), 1, base);
        cache.touch_at(&id("b"), 1, base + Duration::seconds(1));
        cache.touch_at(&id("c"), 1, base + Duration::seconds(2));
        cache.touch_at(&id("a"), 1, base + Duration::seconds(3));

        let candidates = cache.eviction_candidates();
        assert_eq!(candidates[0], id("b"));
    }

    #[test]
    fn test_count_bound_evicts_oldest_first() {
        // maxEntries=2: touch A, B, C -> A is the first eviction candidate
        let mut cache = PackageLruCache::new(2, u64::MAX).unwrap();
        let base = Utc::now();
        cache.touch_at(&id("a"), 10 << 20, base);
        cache.touch_at(&id("b"), 10 << 20, base + Duration::seconds(1));
        let evicted = cache.touch_at(&id("c"), 10 << 20, base + Duration::seconds(2));

        assert_eq!(evicted, vec![id("a")]);
        assert!(!cache.should_keep(&id("a")));
        assert!(cache.should_keep(&id("b")));
        assert_eq!(cache.eviction_candidates()[0], id("a"));
    }

    #[test]
    fn test_equal_recency_evicts_larger_first() {
        let mut cache = PackageLruCache::new(10, u64::MAX).unwrap();
        let at = Utc::now();
        cache.touch_at(&id("small"), 10, at);
        cache.touch_at(&id("large"), 1000, at);

        let candidates = cache.eviction_candidates();
        assert_eq!(candidates[0], id("large"));
    }

    #[test]
    fn test_byte_bound_enforced() {
        let mut cache = PackageLruCache::new(100, 50).unwrap();
        let base = Utc::now();
        cache.touch_at(&id("a"), 30, base);
        let evicted = cache.touch_at(&id("b"), 30, base + Duration::seconds(1));

        assert_eq!(evicted, vec![id("a")]);
        assert_eq!(cache.total_bytes(), 30);
        assert!(cache.under_size_pressure());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(PackageLruCache::new(0, 100).is_err());
        assert!(PackageLruCache::new(10, 0).is_err());
    }
}
