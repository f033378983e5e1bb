//! Decision counters and latency percentiles for policy observability

use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::time::Duration;

use crate::types::{AuthorizationResult, Verdict};

/// Engine performance metrics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineMetrics {
    /// Total number of authorize calls, including failed ones
    pub total_requests: u64,

    /// Number of allowed decisions
    pub allowed_decisions: u64,

    /// Number of denied decisions (rule or default)
    pub denied_decisions: u64,

    /// Denies where no rule decided
    pub default_denies: u64,

    /// Calls aborted by a fetcher failure
    pub fetch_failures: u64,

    /// Latency percentiles in microseconds
    pub latency_p50_us: f64,
    pub latency_p90_us: f64,
    pub latency_p99_us: f64,

    /// Average latency in microseconds
    pub avg_latency_us: f64,
}

impl EngineMetrics {
    /// Share of decisions that allowed
    pub fn allow_rate(&self) -> f64 {
        let total = self.allowed_decisions + self.denied_decisions;
        if total == 0 {
            0.0
        } else {
            self.allowed_decisions as f64 / total as f64
        }
    }
}

/// Thread-safe metrics collector shared by all calls on a policy
#[derive(Debug)]
pub struct MetricsCollector {
    metrics: RwLock<EngineMetrics>,

    /// Most recent latency samples (ring buffer)
    latency_samples: Mutex<VecDeque<f64>>,

    max_samples: usize,
}

impl MetricsCollector {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self::with_capacity(10_000)
    }

    /// Create a collector keeping at most `max_samples` latency samples
    pub fn with_capacity(max_samples: usize) -> Self {
        Self {
            metrics: RwLock::new(EngineMetrics::default()),
            latency_samples: Mutex::new(VecDeque::with_capacity(max_samples.min(10_000))),
            max_samples: max_samples.max(1),
        }
    }

    /// Record a completed decision
    pub fn record_decision(&self, result: &AuthorizationResult) {
        let mut metrics = self.metrics.write();
        metrics.total_requests += 1;

        match result.verdict {
            Verdict::Allow => metrics.allowed_decisions += 1,
            Verdict::Deny => metrics.denied_decisions += 1,
        }
        if result.is_default_deny() {
            metrics.default_denies += 1;
        }
    }

    /// Record a call aborted during context building
    pub fn record_fetch_failure(&self) {
        let mut metrics = self.metrics.write();
        metrics.total_requests += 1;
        metrics.fetch_failures += 1;
    }

    /// Record one call's latency; percentiles are computed on [`snapshot`](Self::snapshot)
    pub fn record_latency(&self, latency: Duration) {
        let latency_us = latency.as_secs_f64() * 1_000_000.0;

        let mut samples = self.latency_samples.lock();
        if samples.len() == self.max_samples {
            samples.pop_front();
        }
        samples.push_back(latency_us);
    }

    /// Current metrics snapshot
    pub fn snapshot(&self) -> EngineMetrics {
        let mut sorted: Vec<f64> = self.latency_samples.lock().iter().copied().collect();
        sorted.sort_by(f64::total_cmp);

        let mut metrics = self.metrics.read().clone();
        if !sorted.is_empty() {
            metrics.avg_latency_us = sorted.iter().sum::<f64>() / sorted.len() as f64;
            metrics.latency_p50_us = Self::percentile(&sorted, 0.50);
            metrics.latency_p90_us = Self::percentile(&sorted, 0.90);
            metrics.latency_p99_us = Self::percentile(&sorted, 0.99);
        }
        metrics
    }

    /// Clear counters and latency samples
    pub fn reset(&self) {
        *self.metrics.write() = EngineMetrics::default();
        self.latency_samples.lock().clear();
    }

    fn percentile(sorted: &[f64], p: f64) -> f64 {
        if sorted.is_empty() {
            return 0.0;
        }

        let idx = ((sorted.len() as f64) * p) as usize;
        sorted[idx.min(sorted.len() - 1)]
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
