//! In-memory metric storage backed by per-name ring buffers.
//!
//! Each metric name owns a bounded buffer. Once the buffer reaches capacity
//! the oldest point is evicted before the new one is appended, so memory per
//! metric is fixed regardless of recording rate.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MetricsError, Result};
use crate::types::{Aggregation, Metric, MetricName};

/// Start of a window reaching `minutes_back` into the past; unbounded on overflow.
fn window_start(minutes_back: i64) -> DateTime<Utc> {
    Duration::try_minutes(minutes_back)
        .and_then(|window| Utc::now().checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Aggregate view of one metric, as returned by [`MetricStore::summary`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    /// The metric name.
    pub name: MetricName,
    /// Most recent value.
    pub latest: f64,
    /// Average over the summary window, if any point falls inside it.
    pub average: Option<f64>,
    /// Minimum value in the buffer.
    pub min: f64,
    /// Maximum value in the buffer.
    pub max: f64,
    /// Number of buffered points.
    pub count: usize,
    /// Unit of the most recent point.
    pub unit: Option<String>,
}

/// Thread-safe in-memory storage for metrics.
///
/// Cloning the store shares the underlying buffers.
#[derive(Debug)]
pub struct MetricStore {
    capacity: usize,
    data: Arc<RwLock<HashMap<MetricName, VecDeque<Metric>>>>,
}

impl MetricStore {
    /// Default number of points kept per metric.
    pub const DEFAULT_CAPACITY: usize = 1_000;

    /// Creates a store keeping at most `capacity` points per metric.
    ///
    /// A capacity of zero is treated as one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            data: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Returns the per-metric capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends a point to its metric's buffer, evicting the oldest point when full.
    ///
    /// # Errors
    ///
    /// Returns `MetricsError::InvalidValue` if the value is NaN or infinite.
    #[allow(clippy::significant_drop_tightening)] // eviction and append are one critical section
    pub fn push(&self, metric: Metric) -> Result<()> {
        if !metric.value.is_finite() {
            return Err(MetricsError::InvalidValue {
                name: metric.name.to_string(),
                value: metric.value,
            });
        }

        let mut data = self.data.write();
        let buffer = data
            .entry(metric.name.clone())
            .or_insert_with(|| VecDeque::with_capacity(self.capacity.min(64)));

        while buffer.len() >= self.capacity {
            buffer.pop_front();
        }
        buffer.push_back(metric);

        debug!(points = buffer.len(), "pushed metric point");
        Ok(())
    }

    /// Returns the most recent point for a metric.
    #[must_use]
    pub fn latest(&self, name: &str) -> Option<Metric> {
        let data = self.data.read();
        data.get(name).and_then(|buffer| buffer.back().cloned())
    }

    /// Returns the most recent point of every metric, ordered by name.
    #[must_use]
    pub fn latest_all(&self) -> Vec<Metric> {
        let data = self.data.read();
        let mut latest: Vec<Metric> = data
            .values()
            .filter_map(|buffer| buffer.back().cloned())
            .collect();
        latest.sort_by(|a, b| a.name.cmp(&b.name));
        latest
    }

    /// Averages the points recorded within the last `minutes_back` minutes.
    ///
    /// Returns `None` if the metric is unknown or no point falls in the window.
    #[must_use]
    pub fn average(&self, name: &str, minutes_back: i64) -> Option<f64> {
        self.aggregate(name, minutes_back, Aggregation::Avg)
    }

    /// Applies an aggregation to the points recorded within the last `minutes_back` minutes.
    #[must_use]
    pub fn aggregate(&self, name: &str, minutes_back: i64, aggregation: Aggregation) -> Option<f64> {
        let cutoff = window_start(minutes_back);
        let data = self.data.read();
        let values: Vec<f64> = data
            .get(name)?
            .iter()
            .filter(|m| m.timestamp >= cutoff)
            .map(|m| m.value)
            .collect();
        aggregation.apply(&values)
    }

    /// Returns a copy of every buffered point for a metric, oldest first.
    #[must_use]
    pub fn points(&self, name: &str) -> Vec<Metric> {
        let data = self.data.read();
        data.get(name)
            .map(|buffer| buffer.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the number of buffered points for a metric (0 if unknown).
    #[must_use]
    pub fn len(&self, name: &str) -> usize {
        let data = self.data.read();
        data.get(name).map_or(0, VecDeque::len)
    }

    /// Returns true if no metric has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Returns all metric names, sorted.
    #[must_use]
    pub fn metric_names(&self) -> Vec<MetricName> {
        let data = self.data.read();
        let mut names: Vec<MetricName> = data.keys().cloned().collect();
        names.sort();
        names
    }

    /// Summarizes every metric; averages cover the last `window_minutes`.
    #[must_use]
    pub fn summary(&self, window_minutes: i64) -> Vec<MetricSummary> {
        let cutoff = window_start(window_minutes);
        let data = self.data.read();

        let mut summaries: Vec<MetricSummary> = data
            .iter()
            .filter_map(|(name, buffer)| {
                let last = buffer.back()?;
                let all: Vec<f64> = buffer.iter().map(|m| m.value).collect();
                let windowed: Vec<f64> = buffer
                    .iter()
                    .filter(|m| m.timestamp >= cutoff)
                    .map(|m| m.value)
                    .collect();

                Some(MetricSummary {
                    name: name.clone(),
                    latest: last.value,
                    average: Aggregation::Avg.apply(&windowed),
                    min: Aggregation::Min.apply(&all)?,
                    max: Aggregation::Max.apply(&all)?,
                    count: buffer.len(),
                    unit: last.unit.clone(),
                })
            })
            .collect();

        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    /// Removes all points for a metric. Returns `true` if it existed.
    pub fn remove(&self, name: &str) -> bool {
        self.data.write().remove(name).is_some()
    }

    /// Clears all metrics from the store.
    pub fn clear(&self) {
        self.data.write().clear();
    }
}

impl Clone for MetricStore {
    fn clone(&self) -> Self {
        Self {
            capacity: self.capacity,
            data: Arc::clone(&self.data),
        }
    }
}

impl Default for MetricStore {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}
