//! Observability: histogram metrics and timing spans for the detector
//! pipeline. Histograms track p50/p95/p99 for all timing points.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// A span measuring elapsed time from creation to explicit end.
pub struct TimingSpan {
    name: &'static str,
    start: Instant,
    registry: Arc<MetricsRegistry>,
}

impl TimingSpan {
    pub fn new(name: &'static str, registry: Arc<MetricsRegistry>) -> Self {
        Self {
            name,
            start: Instant::now(),
            registry,
        }
    }

    /// End the span, recording elapsed duration in microseconds.
    pub fn finish(self) -> f64 {
        let elapsed_us = self.start.elapsed().as_micros() as f64;
        self.registry.record(self.name, elapsed_us);
        elapsed_us
    }
}

/// Fixed-capacity ring buffer for histogram samples.
struct SampleRing {
    samples: Vec<f64>,
    pos: usize,
    count: usize,
    capacity: usize,
}

impl SampleRing {
    fn new(capacity: usize) -> Self {
        Self {
            samples: vec![0.0; capacity],
            pos: 0,
            count: 0,
            capacity,
        }
    }

    fn push(&mut self, value: f64) {
        self.samples[self.pos] = value;
        self.pos = (self.pos + 1) % self.capacity;
        if self.count < self.capacity {
            self.count += 1;
        }
    }

    fn percentile(&self, p: f64) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let mut sorted: Vec<f64> = self.samples[..self.count].to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let idx = ((p / 100.0) * (self.count as f64 - 1.0)).round() as usize;
        let idx = idx.min(self.count - 1);
        sorted[idx]
    }
}

/// Stores histograms for all named metrics.
pub struct MetricsRegistry {
    histograms: Mutex<HashMap<&'static str, SampleRing>>,
    ring_capacity: usize,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            histograms: Mutex::new(HashMap::new()),
            ring_capacity: 1024,
        }
    }

    /// Record a sample for the named metric. Timing metrics are recorded in
    /// microseconds; counter-style metrics (back-fill burst length) as counts.
    pub fn record(&self, name: &'static str, value: f64) {
        let mut hists = self.histograms.lock();
        hists
            .entry(name)
            .or_insert_with(|| SampleRing::new(self.ring_capacity))
            .push(value);
        tracing::debug!(metric = name, value = value, "metric_recorded");
    }

    /// Start a timing span that records on finish.
    pub fn span(self: &Arc<Self>, name: &'static str) -> TimingSpan {
        TimingSpan::new(name, Arc::clone(self))
    }

    /// Get percentile for a metric (p value 0-100).
    pub fn percentile(&self, name: &str, p: f64) -> f64 {
        let hists = self.histograms.lock();
        hists
            .get(name)
            .map(|ring| ring.percentile(p))
            .unwrap_or(0.0)
    }

    /// Generate a summary of all metrics at p50/p95/p99.
    pub fn summary(&self) -> HashMap<String, MetricSummary> {
        let hists = self.histograms.lock();
        let mut out = HashMap::new();
        for (&name, ring) in hists.iter() {
            out.insert(
                name.to_string(),
                MetricSummary {
                    p50: ring.percentile(50.0),
                    p95: ring.percentile(95.0),
                    p99: ring.percentile(99.0),
                    count: ring.count,
                },
            );
        }
        out
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricSummary {
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
    pub count: usize,
}

/// Well-known metric names (constants to avoid typos).
pub mod metric_names {
    pub const CLASSIFIER_RUN: &str = "t_classifier_run";
    pub const EVENT_QUEUE_WAIT: &str = "queue_wait_event";
    pub const BACKFILL_SLOTS: &str = "backfill_slots";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentiles_over_recorded_samples() {
        let registry = MetricsRegistry::new();
        for v in 1..=100 {
            registry.record(metric_names::CLASSIFIER_RUN, v as f64);
        }
        assert_eq!(registry.percentile(metric_names::CLASSIFIER_RUN, 50.0), 50.0);
        assert_eq!(registry.percentile(metric_names::CLASSIFIER_RUN, 99.0), 99.0);
        assert_eq!(registry.percentile("unknown", 50.0), 0.0);
    }

    #[test]
    fn summary_counts_samples() {
        let registry = MetricsRegistry::new();
        registry.record(metric_names::BACKFILL_SLOTS, 3.0);
        registry.record(metric_names::BACKFILL_SLOTS, 5.0);
        let summary = registry.summary();
        assert_eq!(summary["backfill_slots"].count, 2);
    }
}
