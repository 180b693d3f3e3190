use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use dashmap::DashMap;
use tracing::debug;

use crate::models::{CompositionChangeEvent, ConstituentWeight, DateRange, IndexLevelPoint};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheOperation {
    Performance,
    Composition,
    Changes,
}

/// Request signature: every cached result is a pure function of this key and the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub operation: CacheOperation,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl CacheKey {
    pub fn range(operation: CacheOperation, range: DateRange) -> Self {
        Self {
            operation,
            start: range.start,
            end: range.end,
        }
    }

    pub fn date(operation: CacheOperation, date: NaiveDate) -> Self {
        Self::range(operation, DateRange::single(date))
    }
}

#[derive(Debug, Clone)]
pub enum CachedResult {
    Performance(Arc<Vec<IndexLevelPoint>>),
    Composition(Arc<Vec<ConstituentWeight>>),
    Changes(Arc<Vec<CompositionChangeEvent>>),
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: CachedResult,
    cached_at: DateTime<Utc>,
}

/// Thread-safe keyed response cache with a fixed TTL.
/// Only successful results are stored, so errors are always recomputed.
#[derive(Clone)]
pub struct QueryCache {
    enabled: bool,
    ttl: Duration,
    entries: Arc<DashMap<CacheKey, CacheEntry>>,
}

impl QueryCache {
    pub fn new(enabled: bool, ttl_seconds: i64) -> Self {
        Self {
            enabled,
            ttl: Duration::seconds(ttl_seconds),
            entries: Arc::new(DashMap::new()),
        }
    }

    pub fn disabled() -> Self {
        Self::new(false, 0)
    }

    pub fn get(&self, key: &CacheKey) -> Option<CachedResult> {
        if !self.enabled {
            return None;
        }

        let now = Utc::now();
        if let Some(entry) = self.entries.get(key) {
            if now < entry.cached_at + self.ttl {
                debug!("Cache hit for {:?}", key);
                return Some(entry.value.clone());
            }
        }
        self.remove_if_expired(key, now);
        None
    }

    /// Evicts `key` only if the entry stored now is stale at `now`; an entry written by a
    /// concurrent request after the lookup survives.
    fn remove_if_expired(&self, key: &CacheKey, now: DateTime<Utc>) -> bool {
        let ttl = self.ttl;
        self.entries
            .remove_if(key, |_, entry| now >= entry.cached_at + ttl)
            .is_some()
    }

    pub fn insert(&self, key: CacheKey, value: CachedResult) {
        if !self.enabled {
            return;
        }
        self.entries.insert(
            key,
            CacheEntry {
                value,
                cached_at: Utc::now(),
            },
        );
    }

    pub fn get_performance(&self, range: DateRange) -> Option<Vec<IndexLevelPoint>> {
        match self.get(&CacheKey::range(CacheOperation::Performance, range)) {
            Some(CachedResult::Performance(points)) => Some(points.as_ref().clone()),
            _ => None,
        }
    }

    pub fn put_performance(&self, range: DateRange, points: &[IndexLevelPoint]) {
        self.insert(
            CacheKey::range(CacheOperation::Performance, range),
            CachedResult::Performance(Arc::new(points.to_vec())),
        );
    }

    pub fn get_composition(&self, date: NaiveDate) -> Option<Vec<ConstituentWeight>> {
        match self.get(&CacheKey::date(CacheOperation::Composition, date)) {
            Some(CachedResult::Composition(rows)) => Some(rows.as_ref().clone()),
            _ => None,
        }
    }

    pub fn put_composition(&self, date: NaiveDate, rows: &[ConstituentWeight]) {
        self.insert(
            CacheKey::date(CacheOperation::Composition, date),
            CachedResult::Composition(Arc::new(rows.to_vec())),
        );
    }

    pub fn get_changes(&self, range: DateRange) -> Option<Vec<CompositionChangeEvent>> {
        match self.get(&CacheKey::range(CacheOperation::Changes, range)) {
            Some(CachedResult::Changes(events)) => Some(events.as_ref().clone()),
            _ => None,
        }
    }

    pub fn put_changes(&self, range: DateRange, events: &[CompositionChangeEvent]) {
        self.insert(
            CacheKey::range(CacheOperation::Changes, range),
            CachedResult::Changes(Arc::new(events.to_vec())),
        );
    }

    /// Drops every expired entry.
    pub fn cleanup_expired(&self) {
        let now = Utc::now();
        let ttl = self.ttl;
        self.entries.retain(|_, entry| now < entry.cached_at + ttl);
    }

    /// Drops every entry. Called after new data is published.
    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn point(date: &str) -> IndexLevelPoint {
        IndexLevelPoint {
            date: d(date),
            index_level: 100.0,
            daily_return: 0.0,
            cumulative_return: 0.0,
        }
    }

    #[test]
    fn test_cache_round_trips_by_operation_and_range() {
        let cache = QueryCache::new(true, 3600);
        let range = DateRange::new(d("2025-05-12"), d("2025-05-13")).unwrap();

        cache.put_performance(range, &[point("2025-05-12")]);

        assert_eq!(cache.get_performance(range).unwrap().len(), 1);
        // Same dates under another operation are a different key.
        assert!(cache.get_changes(range).is_none());
        let other = DateRange::new(d("2025-05-12"), d("2025-05-14")).unwrap();
        assert!(cache.get_performance(other).is_none());
    }

    #[test]
    fn test_disabled_cache_stores_nothing() {
        let cache = QueryCache::disabled();
        cache.put_composition(d("2025-05-12"), &[]);
        assert!(cache.is_empty());
        assert!(cache.get_composition(d("2025-05-12")).is_none());
    }

    #[test]
    fn test_fresh_entry_survives_stale_eviction() {
        let cache = QueryCache::new(true, 60);
        let key = CacheKey::date(CacheOperation::Composition, d("2025-05-12"));
        let lookup_time = Utc::now();

        // Written after the lookup that found nothing fresh.
        cache.put_composition(d("2025-05-12"), &[]);

        assert!(!cache.remove_if_expired(&key, lookup_time));
        assert!(cache.get_composition(d("2025-05-12")).is_some());

        assert!(cache.remove_if_expired(&key, Utc::now() + Duration::seconds(61)));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_clear_drops_everything() {
        let cache = QueryCache::new(true, 3600);
        cache.put_composition(d("2025-05-12"), &[]);
        cache.put_changes(DateRange::single(d("2025-05-12")), &[]);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_expired_entries_are_dropped() {
        let cache = QueryCache::new(true, 0);
        cache.put_changes(DateRange::single(d("2025-05-12")), &[]);
        assert_eq!(cache.len(), 1);

        assert!(cache.get_changes(DateRange::single(d("2025-05-12"))).is_none());
        cache.cleanup_expired();
        assert!(cache.is_empty());
    }
}
