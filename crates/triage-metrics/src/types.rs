//! Core types for the metrics system.
//!
//! - [`Metric`]: A single recorded value with timestamp, tags and unit
//! - [`MetricName`]: A validated metric name
//! - [`Aggregation`]: Aggregation functions used by summaries and queries

use std::borrow::Borrow;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MetricsError, Result};

/// Dimensional tags attached to a metric. Ordered so label rendering is stable.
pub type Tags = BTreeMap<String, String>;

/// A validated metric name.
///
/// Names are free-form application identifiers (`response_time`,
/// `api.checkout.latency`). They must be non-empty, at most
/// [`MetricName::MAX_LENGTH`] bytes and free of control characters; the
/// Prometheus-safe form is derived on export.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MetricName(String);

impl MetricName {
    /// Maximum allowed length for a metric name.
    pub const MAX_LENGTH: usize = 256;

    /// Creates a new validated metric name.
    ///
    /// # Errors
    ///
    /// Returns `MetricsError::InvalidMetricName` if the name is invalid.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let trimmed = name.trim();

        if trimmed.is_empty() {
            return Err(MetricsError::InvalidMetricName {
                reason: "metric name cannot be empty".to_string(),
            });
        }

        if trimmed.len() > Self::MAX_LENGTH {
            return Err(MetricsError::InvalidMetricName {
                reason: format!(
                    "metric name exceeds maximum length of {} characters",
                    Self::MAX_LENGTH
                ),
            });
        }

        if let Some(c) = trimmed.chars().find(|c| c.is_control()) {
            return Err(MetricsError::InvalidMetricName {
                reason: format!("control character {c:?} in metric name"),
            });
        }

        Ok(Self(trimmed.to_string()))
    }

    /// Returns the metric name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MetricName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for MetricName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for MetricName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for MetricName {
    type Error = MetricsError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<MetricName> for String {
    fn from(name: MetricName) -> Self {
        name.0
    }
}

/// A single recorded metric value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    /// The metric name.
    pub name: MetricName,
    /// The measured value.
    pub value: f64,
    /// When the value was recorded.
    pub timestamp: DateTime<Utc>,
    /// Dimensional tags (e.g. `route`, `region`).
    #[serde(default)]
    pub tags: Tags,
    /// Optional unit of measurement (e.g. `ms`, `bytes`, `percent`).
    #[serde(default)]
    pub unit: Option<String>,
}

impl Metric {
    /// Creates a metric recorded now.
    #[must_use]
    pub fn now(name: MetricName, value: f64) -> Self {
        Self {
            name,
            value,
            timestamp: Utc::now(),
            tags: Tags::new(),
            unit: None,
        }
    }

    /// Parses the name and creates a metric recorded now.
    ///
    /// # Errors
    ///
    /// Returns `MetricsError::InvalidMetricName` if the name is invalid.
    pub fn named(name: impl Into<String>, value: f64) -> Result<Self> {
        Ok(Self::now(MetricName::new(name)?, value))
    }

    /// Sets the timestamp.
    #[must_use]
    pub const fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Adds a tag and returns self for chaining.
    #[must_use]
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Replaces the tag set.
    #[must_use]
    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.tags = tags;
        self
    }

    /// Sets the unit.
    #[must_use]
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }
}

/// How a window of buffered points is reduced to one number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    /// Total.
    Sum,
    /// Arithmetic mean.
    Avg,
    /// Smallest value.
    Min,
    /// Largest value.
    Max,
    /// Newest value.
    Last,
    /// Number of points.
    Count,
}

impl Aggregation {
    /// Reduces `values`, oldest first. An empty window has no value.
    #[must_use]
    pub fn apply(&self, values: &[f64]) -> Option<f64> {
        let (&newest, _) = values.split_last()?;
        let n = values.len() as f64;
        let total: f64 = values.iter().sum();

        let reduced = match self {
            Self::Sum => total,
            Self::Avg => total / n,
            Self::Min => values.iter().fold(f64::INFINITY, |acc, v| acc.min(*v)),
            Self::Max => values.iter().fold(f64::NEG_INFINITY, |acc, v| acc.max(*v)),
            Self::Last => newest,
            Self::Count => n,
        };
        Some(reduced)
    }
}
