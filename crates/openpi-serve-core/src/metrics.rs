//! Global atomic counters for serving.
//!
//! Counters are incremented silently at the call site. Call
//! [`ServingMetrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. when a connection closes).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: ServingMetrics = ServingMetrics::new();

/// Lightweight atomic counters.
pub struct ServingMetrics {
    connections_opened: AtomicU64,
    requests_served: AtomicU64,
    inference_failures: AtomicU64,
    records_written: AtomicU64,
    record_failures: AtomicU64,
}

impl Default for ServingMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ServingMetrics {
    pub const fn new() -> Self {
        Self {
            connections_opened: AtomicU64::new(0),
            requests_served: AtomicU64::new(0),
            inference_failures: AtomicU64::new(0),
            records_written: AtomicU64::new(0),
            record_failures: AtomicU64::new(0),
        }
    }

    pub fn inc_connections(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_requests_served(&self) {
        self.requests_served.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "requests_served", "counter incremented");
    }

    pub fn inc_inference_failures(&self) {
        self.inference_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "inference_failures", "counter incremented");
    }

    pub fn inc_records_written(&self) {
        self.records_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_record_failures(&self) {
        self.record_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "record_failures", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            connections_opened = self.connections_opened(),
            requests_served = self.requests_served(),
            inference_failures = self.inference_failures(),
            records_written = self.records_written(),
            record_failures = self.record_failures(),
        );
    }

    pub fn connections_opened(&self) -> u64 {
        self.connections_opened.load(Ordering::Relaxed)
    }

    pub fn requests_served(&self) -> u64 {
        self.requests_served.load(Ordering::Relaxed)
    }

    pub fn inference_failures(&self) -> u64 {
        self.inference_failures.load(Ordering::Relaxed)
    }

    pub fn records_written(&self) -> u64 {
        self.records_written.load(Ordering::Relaxed)
    }

    pub fn record_failures(&self) -> u64 {
        self.record_failures.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment_independently() {
        let m = ServingMetrics::new();
        m.inc_requests_served();
        m.inc_requests_served();
        m.inc_inference_failures();
        m.inc_record_failures();
        m.inc_connections();

        assert_eq!(m.requests_served(), 2);
        assert_eq!(m.inference_failures(), 1);
        assert_eq!(m.record_failures(), 1);
        assert_eq!(m.records_written(), 0);
        assert_eq!(m.connections_opened(), 1);
        m.flush();
    }
}
