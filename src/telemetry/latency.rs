use dashmap::DashMap;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::info;

/// Rolling per-instrument timings of tick evaluation.
pub struct LatencyTracker {
    samples: DashMap<String, VecDeque<Duration>>,
    window: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencySummary {
    pub p50: Duration,
    pub p95: Duration,
    pub p99: Duration,
    pub samples: usize,
}

impl LatencyTracker {
    pub fn new(window: usize) -> Self {
        Self {
            samples: DashMap::new(),
            window: window.max(1),
        }
    }

    pub fn record(&self, key: &str, elapsed: Duration) {
        let mut entry = self.samples.entry(key.to_string()).or_default();
        if entry.len() >= self.window {
            entry.pop_front();
        }
        entry.push_back(elapsed);
    }

    /// Timer that records into `key` when dropped.
    pub fn start_timer(&self, key: &str) -> Timer<'_> {
        Timer {
            key: key.to_string(),
            start: Instant::now(),
            tracker: self,
        }
    }

    pub fn summary(&self, key: &str) -> Option<LatencySummary> {
        let entry = self.samples.get(key)?;
        let mut sorted: Vec<Duration> = entry.iter().copied().collect();
        drop(entry);
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_unstable();

        Some(LatencySummary {
            p50: nearest_rank(&sorted, 0.50),
            p95: nearest_rank(&sorted, 0.95),
            p99: nearest_rank(&sorted, 0.99),
            samples: sorted.len(),
        })
    }

    pub fn log_summary(&self) {
        let mut keys: Vec<String> = self.samples.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        for key in keys {
            if let Some(s) = self.summary(&key) {
                info!(
                    "Tick latency [{key}]: p50={:.2}ms p95={:.2}ms p99={:.2}ms samples={}",
                    ms(s.p50),
                    ms(s.p95),
                    ms(s.p99),
                    s.samples
                );
            }
        }
    }
}

fn nearest_rank(sorted: &[Duration], q: f64) -> Duration {
    let rank = (q * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

fn ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

pub struct Timer<'a> {
    key: String,
    start: Instant,
    tracker: &'a LatencyTracker,
}

impl Drop for Timer<'_> {
    fn drop(&mut self) {
        self.tracker.record(&self.key, self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentiles() {
        let tracker = LatencyTracker::new(1000);
        for i in 1..=100 {
            tracker.record("gdax-BTC-EUR", Duration::from_millis(i));
        }

        let s = tracker.summary("gdax-BTC-EUR").unwrap();
        assert_eq!(s.p50, Duration::from_millis(50));
        assert_eq!(s.p95, Duration::from_millis(95));
        assert_eq!(s.p99, Duration::from_millis(99));
        assert_eq!(s.samples, 100);
        assert!(tracker.summary("gdax-ETH-EUR").is_none());
    }

    #[test]
    fn test_window_drops_oldest() {
        let tracker = LatencyTracker::new(3);
        for i in 1..=5 {
            tracker.record("k", Duration::from_millis(i));
        }
        let s = tracker.summary("k").unwrap();
        assert_eq!(s.samples, 3);
        assert_eq!(s.p50, Duration::from_millis(4));
    }

    #[test]
    fn test_timer_records_on_drop() {
        let tracker = LatencyTracker::new(10);
        {
            let _t = tracker.start_timer("k");
        }
        assert_eq!(tracker.summary("k").unwrap().samples, 1);
    }
}
