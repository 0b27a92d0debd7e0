use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::RwLock;

use super::regression::{self, SignalError, TrendType};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub time: i64,
    pub value: f64,
}

/// Capacity-bounded price history for one instrument.
///
/// Points are kept in the order they were added (the caller supplies
/// non-decreasing times); once full, the oldest point is evicted. Readers
/// always get a copy taken under the lock.
pub struct Timeseries {
    capacity: usize,
    points: RwLock<VecDeque<DataPoint>>,
}

impl Timeseries {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            points: RwLock::new(VecDeque::with_capacity(capacity.min(8192))),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn add(&self, time: i64, value: f64) {
        let mut points = self.points.write().await;
        points.push_back(DataPoint { time, value });
        while points.len() > self.capacity {
            points.pop_front();
        }
    }

    pub async fn size(&self) -> usize {
        self.points.read().await.len()
    }

    pub async fn keys(&self) -> Vec<i64> {
        self.points.read().await.iter().map(|p| p.time).collect()
    }

    pub async fn values(&self) -> Vec<f64> {
        self.points.read().await.iter().map(|p| p.value).collect()
    }

    pub async fn all(&self) -> Vec<DataPoint> {
        self.points.read().await.iter().copied().collect()
    }

    /// Largest value held, floored at 0 (an empty series reports 0).
    pub async fn max_value(&self) -> f64 {
        self.points
            .read()
            .await
            .iter()
            .fold(0.0, |max, p| f64::max(max, p.value))
    }

    /// The last `n` values in order, or everything if fewer are held.
    pub async fn latest_values(&self, n: usize) -> Vec<f64> {
        let points = self.points.read().await;
        let skip = points.len().saturating_sub(n);
        points.iter().skip(skip).map(|p| p.value).collect()
    }

    /// Trend of the last `n` values. An error means indeterminate, not neutral.
    pub async fn trending(&self, n: usize) -> Result<TrendType, SignalError> {
        let values = self.latest_values(n).await;
        regression::classify(&values)
    }
}
