//! Metrics sink (C8).
//!
//! A thread-safe in-process registry for the counters/histograms named in
//! §4.8, shared across concurrent runs via an `Arc`. `serve` exposes the
//! registry in Prometheus text format as an ambient/optional surface —
//! `publish()` itself never depends on it being mounted.

pub mod serve;

use crate::error::ErrorKind;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Histogram bucket boundaries for `publish_duration_seconds`.
pub const PUBLISH_DURATION_BUCKETS: &[f64] = &[30.0, 60.0, 90.0, 120.0, 180.0, 240.0, 300.0];
/// Histogram bucket boundaries for `operation_duration_seconds`.
pub const OPERATION_DURATION_BUCKETS: &[f64] = &[0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0];

#[derive(Default)]
struct Histogram {
    buckets: Vec<(f64, AtomicU64)>,
    sum: Mutex<f64>,
    count: AtomicU64,
}

impl Histogram {
    fn new(bounds: &[f64]) -> Self {
        Self {
            buckets: bounds.iter().map(|&b| (b, AtomicU64::new(0))).collect(),
            sum: Mutex::new(0.0),
            count: AtomicU64::new(0),
        }
    }

    fn observe(&self, value: f64) {
        for (bound, counter) in &self.buckets {
            if value <= *bound {
                counter.fetch_add(1, Ordering::Relaxed);
            }
        }
        *self.sum.lock() += value;
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    fn render(&self, name: &str, labels: &str) -> String {
        let mut out = String::new();
        for (bound, counter) in &self.buckets {
            out.push_str(&format!(
                "{name}_bucket{{{labels}le=\"{bound}\"}} {}\n",
                counter.load(Ordering::Relaxed)
            ));
        }
        out.push_str(&format!(
            "{name}_bucket{{{labels}le=\"+Inf\"}} {}\n",
            self.count.load(Ordering::Relaxed)
        ));
        out.push_str(&format!("{name}_sum{{{}}} {}\n", labels.trim_end_matches(','), *self.sum.lock()));
        out.push_str(&format!(
            "{name}_count{{{}}} {}\n",
            labels.trim_end_matches(','),
            self.count.load(Ordering::Relaxed)
        ));
        out
    }
}

/// Thread-safe counters and histograms backing §4.8's metric surface.
/// Constructed once per process and shared via `Arc` with every
/// orchestrator run and the optional HTTP exposition router.
#[derive(Default)]
pub struct Registry {
    articles_total: Mutex<HashMap<(String, String), u64>>,
    publish_duration: Mutex<HashMap<String, Histogram>>,
    operation_duration: Mutex<HashMap<(String, String), Histogram>>,
    operation_errors: Mutex<HashMap<(String, String, ErrorKind), u64>>,
    fallback_total: Mutex<HashMap<(String, String, String), u64>>,
    selector_cache_hits: AtomicU64,
    selector_cache_misses: AtomicU64,
    selector_cache_size: AtomicU64,
    cost_estimate_dollars: Mutex<HashMap<(String, String), f64>>,
    pipeline_success_rate: Mutex<f64>,
}

impl Registry {
    /// Construct an empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Increment `articles_total{outcome, provider}`.
    pub fn record_article(&self, outcome: &str, provider: &str) {
        *self
            .articles_total
            .lock()
            .entry((outcome.to_string(), provider.to_string()))
            .or_insert(0) += 1;
    }

    /// Observe `publish_duration_seconds{provider}`.
    pub fn observe_publish_duration(&self, provider: &str, seconds: f64) {
        self.publish_duration
            .lock()
            .entry(provider.to_string())
            .or_insert_with(|| Histogram::new(PUBLISH_DURATION_BUCKETS))
            .observe(seconds);
    }

    /// Observe `operation_duration_seconds{operation, provider}`.
    pub fn observe_operation_duration(&self, operation: &str, provider: &str, seconds: f64) {
        self.operation_duration
            .lock()
            .entry((operation.to_string(), provider.to_string()))
            .or_insert_with(|| Histogram::new(OPERATION_DURATION_BUCKETS))
            .observe(seconds);
    }

    /// Increment `operation_errors_total{operation, provider, error_kind}`.
    pub fn record_operation_error(&self, operation: &str, provider: &str, kind: ErrorKind) {
        *self
            .operation_errors
            .lock()
            .entry((operation.to_string(), provider.to_string(), kind))
            .or_insert(0) += 1;
    }

    /// Increment `fallback_total{from, to, reason}`.
    pub fn record_fallback(&self, from: &str, to: &str, reason: &str) {
        *self
            .fallback_total
            .lock()
            .entry((from.to_string(), to.to_string(), reason.to_string()))
            .or_insert(0) += 1;
    }

    /// Report the current selector cache statistics into the registry's
    /// gauges/counters (hits and misses are cumulative, size is a gauge).
    pub fn report_cache_stats(&self, stats: crate::perf::CacheStats) {
        self.selector_cache_hits.store(stats.hits, Ordering::Relaxed);
        self.selector_cache_misses.store(stats.misses, Ordering::Relaxed);
        self.selector_cache_size
            .store(stats.cached_items as u64, Ordering::Relaxed);
    }

    /// Report a performance tracker's aggregate summary into the
    /// `pipeline_success_rate` gauge.
    pub fn report_performance_summary(&self, summary: crate::perf::Summary) {
        *self.pipeline_success_rate.lock() = summary.success_rate;
    }

    /// Accumulate `cost_estimate_dollars{provider, op_kind}`.
    pub fn record_cost(&self, provider: &str, op_kind: &str, dollars: f64) {
        *self
            .cost_estimate_dollars
            .lock()
            .entry((provider.to_string(), op_kind.to_string()))
            .or_insert(0.0) += dollars;
    }

    /// Render the registry in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut out = String::new();

        out.push_str("# TYPE articles_total counter\n");
        for ((outcome, provider), value) in self.articles_total.lock().iter() {
            out.push_str(&format!(
                "articles_total{{outcome=\"{outcome}\",provider=\"{provider}\"}} {value}\n"
            ));
        }

        out.push_str("# TYPE publish_duration_seconds histogram\n");
        for (provider, hist) in self.publish_duration.lock().iter() {
            out.push_str(&hist.render("publish_duration_seconds", &format!("provider=\"{provider}\",")));
        }

        out.push_str("# TYPE operation_duration_seconds histogram\n");
        for ((operation, provider), hist) in self.operation_duration.lock().iter() {
            out.push_str(&hist.render(
                "operation_duration_seconds",
                &format!("operation=\"{operation}\",provider=\"{provider}\","),
            ));
        }

        out.push_str("# TYPE operation_errors_total counter\n");
        for ((operation, provider, kind), value) in self.operation_errors.lock().iter() {
            out.push_str(&format!(
                "operation_errors_total{{operation=\"{operation}\",provider=\"{provider}\",error_kind=\"{kind}\"}} {value}\n"
            ));
        }

        out.push_str("# TYPE fallback_total counter\n");
        for ((from, to, reason), value) in self.fallback_total.lock().iter() {
            out.push_str(&format!(
                "fallback_total{{from=\"{from}\",to=\"{to}\",reason=\"{reason}\"}} {value}\n"
            ));
        }

        out.push_str("# TYPE selector_cache_hits_total counter\n");
        out.push_str(&format!(
            "selector_cache_hits_total {}\n",
            self.selector_cache_hits.load(Ordering::Relaxed)
        ));
        out.push_str("# TYPE selector_cache_misses_total counter\n");
        out.push_str(&format!(
            "selector_cache_misses_total {}\n",
            self.selector_cache_misses.load(Ordering::Relaxed)
        ));
        out.push_str("# TYPE selector_cache_size gauge\n");
        out.push_str(&format!(
            "selector_cache_size {}\n",
            self.selector_cache_size.load(Ordering::Relaxed)
        ));

        out.push_str("# TYPE cost_estimate_dollars counter\n");
        for ((provider, op_kind), value) in self.cost_estimate_dollars.lock().iter() {
            out.push_str(&format!(
                "cost_estimate_dollars{{provider=\"{provider}\",op_kind=\"{op_kind}\"}} {value}\n"
            ));
        }

        out.push_str("# TYPE pipeline_success_rate gauge\n");
        out.push_str(&format!("pipeline_success_rate {}\n", *self.pipeline_success_rate.lock()));

        out
    }
}

/// Per-provider cost-estimation function: `f(has_images, token_count)`,
/// per §4.8. The DOM provider's cost is a small constant; the vision
/// provider's is a base plus per-image and per-token charge.
pub fn estimate_cost(provider: &str, has_images: bool, token_count: u32) -> f64 {
    match provider {
        "dom" => 0.002,
        "vision" => {
            let base = 0.01;
            let image_cost = if has_images { 0.015 } else { 0.0 };
            let token_cost = token_count as f64 * 0.000003;
            base + image_cost + token_cost
        }
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn articles_total_increments_per_label_pair() {
        let registry = Registry::new();
        registry.record_article("success", "dom");
        registry.record_article("success", "dom");
        registry.record_article("failure", "vision");
        let rendered = registry.render();
        assert!(rendered.contains("articles_total{outcome=\"success\",provider=\"dom\"} 2"));
        assert!(rendered.contains("articles_total{outcome=\"failure\",provider=\"vision\"} 1"));
    }

    #[test]
    fn publish_duration_histogram_buckets_cumulative() {
        let registry = Registry::new();
        registry.observe_publish_duration("dom", 45.0);
        let rendered = registry.render();
        assert!(rendered.contains("publish_duration_seconds_bucket{provider=\"dom\",le=\"60\""));
        assert!(rendered.contains("publish_duration_seconds_count{provider=\"dom\"} 1"));
    }

    #[test]
    fn cache_stats_populate_gauges() {
        let registry = Registry::new();
        registry.report_cache_stats(crate::perf::CacheStats {
            hits: 10,
            misses: 2,
            hit_rate: 83.3,
            cached_items: 5,
        });
        let rendered = registry.render();
        assert!(rendered.contains("selector_cache_hits_total 10"));
        assert!(rendered.contains("selector_cache_size 5"));
    }

    #[test]
    fn performance_summary_sets_success_rate_gauge() {
        let registry = Registry::new();
        registry.report_performance_summary(crate::perf::Summary {
            total_operations: 4,
            successful: 3,
            failed: 1,
            success_rate: 75.0,
            total_duration_ms: 400.0,
        });
        let rendered = registry.render();
        assert!(rendered.contains("pipeline_success_rate 75"));
    }

    #[test]
    fn cost_estimate_dom_is_small_constant() {
        assert!(estimate_cost("dom", true, 0) < estimate_cost("vision", true, 0));
    }

    #[test]
    fn cost_estimate_vision_scales_with_tokens() {
        let low = estimate_cost("vision", false, 100);
        let high = estimate_cost("vision", false, 10_000);
        assert!(high > low);
    }
}
