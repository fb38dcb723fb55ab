//! Selector cache and performance tracking (C4).
//!
//! Both structures are producer-side from the provider and read-only from
//! the metrics sink; both are safe to share across concurrent runs within
//! one process via an `Arc`.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Default cache TTL, matching the original implementation's 5-minute default.
pub const DEFAULT_TTL_SECONDS: u64 = 300;

struct CacheEntry {
    selector: String,
    inserted_at: Instant,
}

/// Thread-safe memo of resolved selectors, keyed by an opaque string (the
/// caller combines `(named_element, cms_kind)` into the key).
pub struct SelectorCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl SelectorCache {
    /// Construct a cache with the given entry TTL.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look up a cached selector, counting the access as a hit or miss.
    /// Expired entries are evicted on access.
    pub fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() <= self.ttl => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.selector.clone())
            }
            Some(_) => {
                entries.remove(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Memoize a resolved selector under `key`.
    pub fn set(&self, key: impl Into<String>, selector: impl Into<String>) {
        self.entries.lock().insert(
            key.into(),
            CacheEntry {
                selector: selector.into(),
                inserted_at: Instant::now(),
            },
        );
    }

    /// Invalidate a single key, or the whole cache (and its hit/miss
    /// counters) when `key` is `None`.
    pub fn invalidate(&self, key: Option<&str>) {
        match key {
            Some(key) => {
                self.entries.lock().remove(key);
            }
            None => {
                self.entries.lock().clear();
                self.hits.store(0, Ordering::Relaxed);
                self.misses.store(0, Ordering::Relaxed);
            }
        }
    }

    /// Hit rate as a percentage (0.0 if no accesses have occurred).
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            (hits as f64 / total as f64) * 100.0
        }
    }

    /// Snapshot of cache statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            hit_rate: self.hit_rate(),
            cached_items: self.entries.lock().len(),
        }
    }
}

impl Default for SelectorCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_TTL_SECONDS))
    }
}

/// Point-in-time snapshot of cache hit/miss behavior.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStats {
    /// Total cache hits since the last reset.
    pub hits: u64,
    /// Total cache misses since the last reset.
    pub misses: u64,
    /// `hits / (hits + misses) * 100`, or 0.0 with no accesses.
    pub hit_rate: f64,
    /// Number of live (non-expired) entries.
    pub cached_items: usize,
}

/// Aggregate statistics for one named operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OperationStats {
    /// Number of successful recordings.
    pub count: usize,
    /// Average duration in milliseconds.
    pub avg_ms: f64,
    /// Minimum duration in milliseconds.
    pub min_ms: f64,
    /// Maximum duration in milliseconds.
    pub max_ms: f64,
    /// Sum of all durations in milliseconds.
    pub total_ms: f64,
}

/// Aggregate summary across every operation recorded by a tracker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    /// Total number of operations started.
    pub total_operations: usize,
    /// Number that completed successfully.
    pub successful: usize,
    /// Number that completed with failure.
    pub failed: usize,
    /// `successful / total_operations * 100`, or 0.0 with no operations.
    pub success_rate: f64,
    /// Sum of all recorded durations in milliseconds.
    pub total_duration_ms: f64,
}

struct RecordedOp {
    success: bool,
    duration_ms: f64,
}

/// Records per-operation latency and outcome, exposing aggregate stats.
/// Only successful operations feed per-operation duration stats, matching
/// the original tracker's accounting.
pub struct PerformanceTracker {
    records: Mutex<Vec<RecordedOp>>,
    by_operation: Mutex<HashMap<String, Vec<f64>>>,
}

impl PerformanceTracker {
    /// Construct an empty tracker.
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            by_operation: Mutex::new(HashMap::new()),
        }
    }

    /// Record the outcome of one operation.
    pub fn record(&self, operation_name: &str, duration: Duration, success: bool) {
        let duration_ms = duration.as_secs_f64() * 1000.0;
        self.records.lock().push(RecordedOp {
            success,
            duration_ms,
        });
        if success {
            self.by_operation
                .lock()
                .entry(operation_name.to_string())
                .or_default()
                .push(duration_ms);
        }
    }

    /// Aggregate stats for one operation, or `None` if it has no
    /// successful recordings.
    pub fn stats(&self, operation_name: &str) -> Option<OperationStats> {
        let by_operation = self.by_operation.lock();
        let durations = by_operation.get(operation_name)?;
        if durations.is_empty() {
            return None;
        }
        let count = durations.len();
        let total_ms: f64 = durations.iter().sum();
        let min_ms = durations.iter().cloned().fold(f64::INFINITY, f64::min);
        let max_ms = durations.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        Some(OperationStats {
            count,
            avg_ms: total_ms / count as f64,
            min_ms,
            max_ms,
            total_ms,
        })
    }

    /// Total duration across every recorded operation (success or failure).
    pub fn total_duration_ms(&self) -> f64 {
        self.records.lock().iter().map(|r| r.duration_ms).sum()
    }

    /// Aggregate summary across all operations.
    pub fn summary(&self) -> Summary {
        let records = self.records.lock();
        let total_operations = records.len();
        let successful = records.iter().filter(|r| r.success).count();
        let failed = total_operations - successful;
        let total_duration_ms: f64 = records.iter().map(|r| r.duration_ms).sum();
        let success_rate = if total_operations == 0 {
            0.0
        } else {
            (successful as f64 / total_operations as f64) * 100.0
        };
        Summary {
            total_operations,
            successful,
            failed,
            success_rate,
            total_duration_ms,
        }
    }

    /// Clear all recorded data.
    pub fn reset(&self) {
        self.records.lock().clear();
        self.by_operation.lock().clear();
    }
}

impl Default for PerformanceTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Run a batch of independent futures with bounded concurrency, collecting
/// results in input order. Used by the DOM provider's media-upload path
/// when uploading multiple images before sequential in-body insertion.
pub async fn run_bounded<T, F, Fut>(
    items: Vec<T>,
    max_concurrent: usize,
    f: F,
) -> Vec<Result<Fut::Output, tokio::task::JoinError>>
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: Send + 'static,
{
    use std::sync::Arc;
    use tokio::sync::Semaphore;

    let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
    let f = Arc::new(f);
    let mut handles = Vec::with_capacity(items.len());

    for item in items {
        let semaphore = Arc::clone(&semaphore);
        let f = Arc::clone(&f);
        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
            f(item).await
        }));
    }

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(handle.await);
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_miss_then_hit() {
        let cache = SelectorCache::new(Duration::from_secs(60));
        assert_eq!(cache.get("new_post_title"), None);
        cache.set("new_post_title", "#title-field");
        assert_eq!(
            cache.get("new_post_title"),
            Some("#title-field".to_string())
        );
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn cache_entry_expires_after_ttl() {
        let cache = SelectorCache::new(Duration::from_millis(1));
        cache.set("k", "v");
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn cache_invalidate_single_key() {
        let cache = SelectorCache::new(Duration::from_secs(60));
        cache.set("a", "1");
        cache.set("b", "2");
        cache.invalidate(Some("a"));
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some("2".to_string()));
    }

    #[test]
    fn cache_invalidate_all_resets_counters() {
        let cache = SelectorCache::new(Duration::from_secs(60));
        cache.set("a", "1");
        cache.get("a");
        cache.get("missing");
        cache.invalidate(None);
        let stats = cache.stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.cached_items, 0);
    }

    #[test]
    fn hit_rate_zero_with_no_accesses() {
        let cache = SelectorCache::default();
        assert_eq!(cache.hit_rate(), 0.0);
    }

    #[test]
    fn tracker_stats_only_include_successes() {
        let tracker = PerformanceTracker::new();
        tracker.record("login", Duration::from_millis(100), true);
        tracker.record("login", Duration::from_millis(200), false);
        tracker.record("login", Duration::from_millis(300), true);

        let stats = tracker.stats("login").unwrap();
        assert_eq!(stats.count, 2);
        assert!((stats.avg_ms - 200.0).abs() < 1e-6);
        assert!((stats.min_ms - 100.0).abs() < 1e-6);
        assert!((stats.max_ms - 300.0).abs() < 1e-6);
    }

    #[test]
    fn tracker_summary_counts_all_operations() {
        let tracker = PerformanceTracker::new();
        tracker.record("login", Duration::from_millis(100), true);
        tracker.record("fill_content", Duration::from_millis(50), false);

        let summary = tracker.summary();
        assert_eq!(summary.total_operations, 2);
        assert_eq!(summary.successful, 1);
        assert_eq!(summary.failed, 1);
        assert!((summary.success_rate - 50.0).abs() < 1e-6);
    }

    #[test]
    fn tracker_reset_clears_everything() {
        let tracker = PerformanceTracker::new();
        tracker.record("login", Duration::from_millis(100), true);
        tracker.reset();
        assert_eq!(tracker.summary().total_operations, 0);
        assert!(tracker.stats("login").is_none());
    }

    #[tokio::test]
    async fn run_bounded_preserves_order_and_bounds_concurrency() {
        let items = vec![3u32, 1, 2];
        let results = run_bounded(items, 2, |n| async move {
            tokio::time::sleep(Duration::from_millis(n as u64)).await;
            n * 10
        })
        .await;
        let values: Vec<u32> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(values, vec![30, 10, 20]);
    }
}
