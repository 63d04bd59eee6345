//! Warning/critical thresholds evaluated against recorded metrics.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{MetricsError, Result};
use crate::types::{Metric, MetricName};

/// How a recorded value is compared against threshold levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparison {
    /// Breach when the value is at or above a level.
    Gt,
    /// Breach when the value is at or below a level.
    Lt,
    /// Breach when the value equals a level.
    Eq,
}

impl Comparison {
    /// Returns true if `value` breaches `level` under this comparison.
    #[must_use]
    pub fn breaches(&self, value: f64, level: f64) -> bool {
        match self {
            Self::Gt => value >= level,
            Self::Lt => value <= level,
            Self::Eq => (value - level).abs() < f64::EPSILON,
        }
    }

    /// Returns the comparison as a short symbol.
    #[must_use]
    pub const fn as_symbol(&self) -> &'static str {
        match self {
            Self::Gt => ">=",
            Self::Lt => "<=",
            Self::Eq => "==",
        }
    }
}

impl std::fmt::Display for Comparison {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_symbol())
    }
}

/// Which level of a threshold was breached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreachLevel {
    /// The warning level was breached.
    Warning,
    /// The critical level was breached.
    Critical,
}

impl std::fmt::Display for BreachLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Warning => f.write_str("warning"),
            Self::Critical => f.write_str("critical"),
        }
    }
}

/// Warning and critical levels for one metric.
///
/// The metric name is trimmed when the threshold is created or registered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricThreshold {
    /// The metric this threshold applies to.
    pub metric: String,
    /// Warning level.
    pub warning: f64,
    /// Critical level.
    pub critical: f64,
    /// Comparison operator.
    pub comparison: Comparison,
}

impl MetricThreshold {
    /// Creates a validated threshold.
    ///
    /// # Errors
    ///
    /// Returns `MetricsError::InvalidThreshold` if the metric name is empty, a
    /// level is not finite, or the levels are ordered against the comparison
    /// (e.g. `gt` with warning above critical). Returns
    /// `MetricsError::InvalidMetricName` if the name is otherwise not a valid
    /// [`MetricName`].
    pub fn new(
        metric: impl Into<String>,
        warning: f64,
        critical: f64,
        comparison: Comparison,
    ) -> Result<Self> {
        Self {
            metric: metric.into(),
            warning,
            critical,
            comparison,
        }
        .normalized()
    }

    /// Validates the threshold and trims its metric name.
    fn normalized(mut self) -> Result<Self> {
        self.validate()?;
        self.metric = MetricName::new(self.metric)?.into();
        Ok(self)
    }

    /// Validates the threshold.
    ///
    /// # Errors
    ///
    /// See [`MetricThreshold::new`].
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| MetricsError::InvalidThreshold {
            metric: self.metric.clone(),
            reason: reason.to_string(),
        };

        if self.metric.trim().is_empty() {
            return Err(invalid("metric name cannot be empty"));
        }
        if !self.warning.is_finite() || !self.critical.is_finite() {
            return Err(invalid("levels must be finite"));
        }
        match self.comparison {
            Comparison::Gt if self.warning > self.critical => {
                Err(invalid("warning level above critical level"))
            }
            Comparison::Lt if self.warning < self.critical => {
                Err(invalid("warning level below critical level"))
            }
            _ => Ok(()),
        }
    }

    /// Evaluates a value; critical takes precedence over warning.
    #[must_use]
    pub fn evaluate(&self, value: f64) -> Option<BreachLevel> {
        if self.comparison.breaches(value, self.critical) {
            Some(BreachLevel::Critical)
        } else if self.comparison.breaches(value, self.warning) {
            Some(BreachLevel::Warning)
        } else {
            None
        }
    }

    /// Returns the level value for a breach level.
    #[must_use]
    pub const fn level_value(&self, level: BreachLevel) -> f64 {
        match level {
            BreachLevel::Warning => self.warning,
            BreachLevel::Critical => self.critical,
        }
    }
}

/// A recorded metric that breached its threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdBreach {
    /// The offending point.
    pub metric: Metric,
    /// The threshold that was breached.
    pub threshold: MetricThreshold,
    /// The breached level.
    pub level: BreachLevel,
}

/// Registry of thresholds, one per metric name; the last registration wins.
#[derive(Debug, Clone, Default)]
pub struct ThresholdRegistry {
    thresholds: Arc<RwLock<HashMap<MetricName, MetricThreshold>>>,
}

impl ThresholdRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a threshold, returning the one it replaced.
    ///
    /// # Errors
    ///
    /// Returns `MetricsError::InvalidThreshold` if the threshold is invalid.
    pub fn set(&self, threshold: MetricThreshold) -> Result<Option<MetricThreshold>> {
        let threshold = threshold.normalized()?;
        let name = MetricName::new(threshold.metric.as_str())?;
        info!(
            metric = %threshold.metric,
            warning = threshold.warning,
            critical = threshold.critical,
            comparison = %threshold.comparison,
            "threshold registered"
        );
        Ok(self
            .thresholds
            .write()
            .insert(name, threshold))
    }

    /// Removes a threshold. Returns `true` if one was registered.
    pub fn remove(&self, metric: &str) -> bool {
        let metric = metric.trim();
        let removed = self.thresholds.write().remove(metric).is_some();
        if removed {
            info!(metric = %metric, "threshold removed");
        }
        removed
    }

    /// Returns the threshold for a metric.
    #[must_use]
    pub fn get(&self, metric: &str) -> Option<MetricThreshold> {
        self.thresholds.read().get(metric.trim()).cloned()
    }

    /// Returns all thresholds, ordered by metric name.
    #[must_use]
    pub fn list(&self) -> Vec<MetricThreshold> {
        let mut all: Vec<MetricThreshold> = self.thresholds.read().values().cloned().collect();
        all.sort_by(|a, b| a.metric.cmp(&b.metric));
        all
    }

    /// Evaluates a recorded metric against its registered threshold, if any.
    #[must_use]
    pub fn evaluate(&self, metric: &Metric) -> Option<ThresholdBreach> {
        let threshold = self.get(metric.name.as_str())?;
        let level = threshold.evaluate(metric.value)?;
        Some(ThresholdBreach {
            metric: metric.clone(),
            threshold,
            level,
        })
    }
}
