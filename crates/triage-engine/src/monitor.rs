//! Metric recording with threshold alerting.
//!
//! [`MetricsMonitor::record`] appends to the metric's ring buffer, evaluates
//! the registered threshold and, on a breach, sends a `metrics` alert through
//! the alert manager. Reads never touch the alert path.

use serde::Serialize;
use tracing::{debug, warn};
use triage_alerts::{Alert, AlertManager, DispatchReport};
use triage_metrics::{
    Metric, MetricStore, MetricSummary, MetricThreshold, Tags, ThresholdBreach, ThresholdRegistry,
};

use crate::error::Result;

/// Result of recording a batch of metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchResult {
    /// Points stored.
    pub recorded: usize,
    /// Points rejected (non-finite values).
    pub rejected: usize,
    /// Thresholds breached by stored points.
    pub breaches: Vec<ThresholdBreach>,
}

/// Records metrics and raises alerts on threshold breaches.
///
/// Cloning shares the store, thresholds and alert manager.
#[derive(Debug, Clone)]
pub struct MetricsMonitor {
    store: MetricStore,
    thresholds: ThresholdRegistry,
    alerts: AlertManager,
    summary_window_minutes: i64,
}

impl MetricsMonitor {
    /// Creates a monitor with a store of `capacity` points per metric.
    #[must_use]
    pub fn new(capacity: usize, summary_window_minutes: i64, alerts: AlertManager) -> Self {
        Self {
            store: MetricStore::new(capacity),
            thresholds: ThresholdRegistry::new(),
            alerts,
            summary_window_minutes,
        }
    }

    /// Returns the metric store.
    #[must_use]
    pub const fn store(&self) -> &MetricStore {
        &self.store
    }

    /// Records a value.
    ///
    /// Returns the breach, if the value crossed its threshold.
    ///
    /// # Errors
    ///
    /// Returns an error if the name or value is invalid.
    pub async fn record(
        &self,
        name: &str,
        value: f64,
        tags: Option<Tags>,
        unit: Option<&str>,
    ) -> Result<Option<ThresholdBreach>> {
        let mut metric = Metric::named(name, value)?;
        if let Some(tags) = tags {
            metric = metric.with_tags(tags);
        }
        if let Some(unit) = unit {
            metric = metric.with_unit(unit);
        }
        self.record_metric(metric).await
    }

    /// Records a prepared point.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not finite.
    pub async fn record_metric(&self, metric: Metric) -> Result<Option<ThresholdBreach>> {
        self.store.push(metric.clone())?;

        let Some(breach) = self.thresholds.evaluate(&metric) else {
            return Ok(None);
        };
        let report = self.raise(&breach).await;
        debug!(
            metric = %metric.name,
            value = metric.value,
            level = %breach.level,
            suppressed = report.suppressed,
            "threshold breached"
        );
        Ok(Some(breach))
    }

    /// Records a batch; invalid points are logged and counted.
    pub async fn record_batch(&self, metrics: Vec<Metric>) -> BatchResult {
        let mut result = BatchResult::default();
        for metric in metrics {
            let name = metric.name.to_string();
            match self.record_metric(metric).await {
                Ok(breach) => {
                    result.recorded += 1;
                    result.breaches.extend(breach);
                }
                Err(e) => {
                    result.rejected += 1;
                    warn!(metric = %name, error = %e, "metric rejected");
                }
            }
        }
        result
    }

    async fn raise(&self, breach: &ThresholdBreach) -> DispatchReport {
        self.alerts.send_alert(Alert::from_breach(breach)).await
    }

    /// Registers a threshold, replacing any existing one for the metric.
    ///
    /// # Errors
    ///
    /// Returns an error if the threshold is invalid.
    pub fn set_threshold(&self, threshold: MetricThreshold) -> Result<Option<MetricThreshold>> {
        Ok(self.thresholds.set(threshold)?)
    }

    /// Removes a threshold. Returns `true` if one existed.
    pub fn remove_threshold(&self, metric: &str) -> bool {
        self.thresholds.remove(metric)
    }

    /// Returns all thresholds, ordered by metric name.
    #[must_use]
    pub fn thresholds(&self) -> Vec<MetricThreshold> {
        self.thresholds.list()
    }

    /// Most recent point of a metric.
    #[must_use]
    pub fn latest(&self, name: &str) -> Option<Metric> {
        self.store.latest(name)
    }

    /// Average over the last `minutes_back` minutes.
    #[must_use]
    pub fn average(&self, name: &str, minutes_back: i64) -> Option<f64> {
        self.store.average(name, minutes_back)
    }

    /// Summary of every metric over the configured window.
    #[must_use]
    pub fn summary(&self) -> Vec<MetricSummary> {
        self.store.summary(self.summary_window_minutes)
    }

    /// Latest values in Prometheus text format.
    #[must_use]
    pub fn export_prometheus(&self) -> String {
        self.store.export_prometheus()
    }
}
