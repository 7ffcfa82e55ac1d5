//! Check duration histogram: navigation + quiescence + extraction.

use std::time::Duration;

use hdrhistogram::Histogram;

/// Values stored in milliseconds.
pub struct CheckLatency {
    histogram: Option<Histogram<u64>>,
}

impl CheckLatency {
    /// Tracks 1ms to 10 minutes, 3 significant figures.
    pub fn new() -> Self {
        Self {
            histogram: Histogram::new_with_bounds(1, 600_000, 3).ok(),
        }
    }

    pub fn record(&mut self, d: Duration) {
        let ms = d.as_millis().clamp(1, 600_000) as u64;
        if let Some(h) = self.histogram.as_mut() {
            let _ = h.record(ms);
        }
    }

    /// (p50_ms, p95_ms). None if no samples.
    pub fn percentiles(&self) -> (Option<u64>, Option<u64>) {
        match &self.histogram {
            Some(h) if h.len() > 0 => (
                Some(h.value_at_quantile(0.5)),
                Some(h.value_at_quantile(0.95)),
            ),
            _ => (None, None),
        }
    }
}

impl Default for CheckLatency {
    fn default() -> Self {
        Self::new()
    }
}
