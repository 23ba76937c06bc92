//! Cache Metrics
//!
//! Prometheus counters for a single view cache instance. Each instance owns
//! its registry so several clients can live in one process.

use crate::domain::ports::UpdateSource;
use crate::error::Result;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Metrics for one view cache client
pub struct CacheMetrics {
    registry: Registry,
    /// Local writes acknowledged by the authority
    writes_forwarded: IntCounter,
    /// Local writes the authority did not acknowledge
    write_failures: IntCounter,
    /// Pushed views applied, by source
    updates_applied: IntCounterVec,
    /// Inbound pushes rejected before reaching the cache
    dispatch_failures: IntCounter,
    /// Entries in the cached view
    view_entries: IntGauge,
}

impl std::fmt::Debug for CacheMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheMetrics")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

impl CacheMetrics {
    /// Create and register all metrics
    pub fn new() -> Result<Self> {
        let registry = Registry::new_custom(Some("view_cache".to_string()), None)?;

        let writes_forwarded = IntCounter::new(
            "writes_forwarded_total",
            "Local writes acknowledged by the authority",
        )?;
        let write_failures = IntCounter::new(
            "write_through_failures_total",
            "Local writes the authority did not acknowledge",
        )?;
        let updates_applied = IntCounterVec::new(
            Opts::new("updates_applied_total", "Pushed views applied to the cache"),
            &["source"],
        )?;
        let dispatch_failures = IntCounter::new(
            "dispatch_failures_total",
            "Inbound pushes rejected by the listener",
        )?;
        let view_entries = IntGauge::new("view_entries", "Entries in the cached view")?;

        registry.register(Box::new(writes_forwarded.clone()))?;
        registry.register(Box::new(write_failures.clone()))?;
        registry.register(Box::new(updates_applied.clone()))?;
        registry.register(Box::new(dispatch_failures.clone()))?;
        registry.register(Box::new(view_entries.clone()))?;

        Ok(Self {
            registry,
            writes_forwarded,
            write_failures,
            updates_applied,
            dispatch_failures,
            view_entries,
        })
    }

    #[inline]
    pub fn record_write_forwarded(&self) {
        self.writes_forwarded.inc();
    }

    #[inline]
    pub fn record_write_failure(&self) {
        self.write_failures.inc();
    }

    #[inline]
    pub fn record_update(&self, source: UpdateSource) {
        self.updates_applied
            .with_label_values(&[&source.to_string()])
            .inc();
    }

    #[inline]
    pub fn record_dispatch_failure(&self) {
        self.dispatch_failures.inc();
    }

    #[inline]
    pub fn set_view_entries(&self, entries: usize) {
        self.view_entries.set(entries as i64);
    }

    /// Plain values of every metric
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        let updates = |source: UpdateSource| {
            self.updates_applied
                .with_label_values(&[&source.to_string()])
                .get()
        };

        CacheStatsSnapshot {
            writes_forwarded: self.writes_forwarded.get(),
            write_failures: self.write_failures.get(),
            authority_updates: updates(UpdateSource::Authority),
            platform_updates: updates(UpdateSource::Platform),
            dispatch_failures: self.dispatch_failures.get(),
            view_entries: self.view_entries.get().max(0) as u64,
        }
    }

    /// Render all metrics in the Prometheus text format
    pub fn encode_text(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| crate::error::Error::Internal(e.to_string()))
    }
}

/// Point-in-time copy of cache metrics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStatsSnapshot {
    pub writes_forwarded: u64,
    pub write_failures: u64,
    pub authority_updates: u64,
    pub platform_updates: u64,
    pub dispatch_failures: u64,
    pub view_entries: u64,
}

impl CacheStatsSnapshot {
    /// Total pushed views applied from any source
    pub fn updates_applied(&self) -> u64 {
        self.authority_updates + self.platform_updates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_snapshot() {
        let metrics = CacheMetrics::new().unwrap();
        metrics.record_write_forwarded();
        metrics.record_write_forwarded();
        metrics.record_write_failure();
        metrics.record_update(UpdateSource::Authority);
        metrics.record_update(UpdateSource::Platform);
        metrics.record_dispatch_failure();
        metrics.set_view_entries(3);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.writes_forwarded, 2);
        assert_eq!(snapshot.write_failures, 1);
        assert_eq!(snapshot.updates_applied(), 2);
        assert_eq!(snapshot.dispatch_failures, 1);
        assert_eq!(snapshot.view_entries, 3);
    }

    #[test]
    fn test_encode_text() {
        let metrics = CacheMetrics::new().unwrap();
        metrics.record_write_forwarded();

        let text = metrics.encode_text().unwrap();
        assert!(text.contains("view_cache_writes_forwarded_total 1"));
        assert!(text.contains("view_cache_view_entries 0"));
    }

    #[test]
    fn test_independent_registries() {
        let first = CacheMetrics::new().unwrap();
        let second = CacheMetrics::new().unwrap();
        first.record_write_failure();

        assert_eq!(first.snapshot().write_failures, 1);
        assert_eq!(second.snapshot().write_failures, 0);
    }
}
