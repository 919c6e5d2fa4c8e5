//! Gateway counters.

use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Manager gateway metrics
#[derive(Debug, Default)]
pub struct GatewayMetrics {
    // Call counters
    pub calls_total: AtomicU64,
    pub calls_success: AtomicU64,
    pub calls_fault: AtomicU64,
    pub calls_deferred: AtomicU64,

    // Authorization
    pub access_denied: AtomicU64,

    // Signals
    pub signals_emitted: AtomicU64,
    pub signal_send_failures: AtomicU64,

    // Subscribers currently registered
    pub subscribers: AtomicU64,

    // Latency tracking
    pub total_latency_us: AtomicU64,
}

impl GatewayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finished call
    pub fn record_call(&self, outcome: CallOutcome, latency_us: u64) {
        self.calls_total.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            CallOutcome::Success => &self.calls_success,
            CallOutcome::Fault => &self.calls_fault,
            CallOutcome::Deferred => &self.calls_deferred,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.total_latency_us
            .fetch_add(latency_us, Ordering::Relaxed);
    }

    pub fn record_access_denied(&self) {
        self.access_denied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_signal(&self, failures: usize) {
        self.signals_emitted.fetch_add(1, Ordering::Relaxed);
        self.signal_send_failures
            .fetch_add(failures as u64, Ordering::Relaxed);
    }

    pub fn set_subscribers(&self, count: usize) {
        self.subscribers.store(count as u64, Ordering::Relaxed);
    }

    /// Get average call latency in microseconds
    pub fn average_latency_us(&self) -> f64 {
        let total = self.total_latency_us.load(Ordering::Relaxed);
        let count = self.calls_total.load(Ordering::Relaxed);
        if count == 0 {
            0.0
        } else {
            total as f64 / count as f64
        }
    }

    /// Export as JSON
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "calls": {
                "total": self.calls_total.load(Ordering::Relaxed),
                "success": self.calls_success.load(Ordering::Relaxed),
                "fault": self.calls_fault.load(Ordering::Relaxed),
                "deferred": self.calls_deferred.load(Ordering::Relaxed),
            },
            "access_denied": self.access_denied.load(Ordering::Relaxed),
            "signals": {
                "emitted": self.signals_emitted.load(Ordering::Relaxed),
                "send_failures": self.signal_send_failures.load(Ordering::Relaxed),
            },
            "subscribers": self.subscribers.load(Ordering::Relaxed),
            "latency": {
                "average_us": self.average_latency_us(),
            },
        })
    }
}

/// How a call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Success,
    Fault,
    /// Reply held until later.
    Deferred,
}

/// Call timer helper
pub struct CallTimer {
    start: Instant,
}

impl CallTimer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn finish(self, metrics: &GatewayMetrics, outcome: CallOutcome) {
        let latency_us = u64::try_from(self.start.elapsed().as_micros()).unwrap_or(u64::MAX);
        metrics.record_call(outcome, latency_us);
    }
}
