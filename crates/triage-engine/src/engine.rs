//! The engine facade.
//!
//! [`Engine`] wires the alert manager, the error categorizer, the metrics
//! monitor and the collection scheduler from one [`EngineConfig`]. It is the
//! single entry point a host application holds; every handle it returns
//! shares state with the engine.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use triage_alerts::{
    Alert, AlertChannel, AlertManager, AlertStats, HttpTransport, ReqwestTransport,
};
use triage_incidents::{
    Categorizer, ErrorContext, ErrorReport, HttpIssueSink, Incident, IncidentId, IncidentStats,
    IssueSink, LogIssueSink, ReportOutcome,
};
use triage_metrics::{
    BusinessSource, GaugeSet, MetricSource, MetricSummary, MetricThreshold, PerformanceSource,
    SystemSource, Tags, ThresholdBreach,
};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::monitor::MetricsMonitor;
use crate::scheduler::{CollectionReport, CollectionScheduler};

/// Counts removed by a retention sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    /// Incidents removed.
    pub incidents: usize,
    /// Alerts dropped from history.
    pub alerts: usize,
}

/// Point-in-time view of the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineStatus {
    /// Incident statistics.
    pub incidents: IncidentStats,
    /// Alert statistics.
    pub alerts: AlertStats,
    /// Number of metrics with buffered points.
    pub metrics: usize,
    /// Registered channel names.
    pub channels: Vec<String>,
}

/// The Triage engine.
///
/// Cloning shares all state.
#[derive(Debug, Clone)]
pub struct Engine {
    config: Arc<EngineConfig>,
    alerts: AlertManager,
    categorizer: Categorizer,
    monitor: MetricsMonitor,
    scheduler: CollectionScheduler,
    business: GaugeSet,
    performance: GaugeSet,
}

impl Engine {
    /// Builds an engine delivering over HTTP with `reqwest`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client, a channel, a threshold or the rule
    /// file cannot be set up.
    pub fn from_config(config: EngineConfig) -> Result<Self> {
        let transport = ReqwestTransport::new(ReqwestTransport::DEFAULT_TIMEOUT)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Builds an engine delivering through `transport`.
    ///
    /// # Errors
    ///
    /// See [`Engine::from_config`].
    pub fn with_transport(config: EngineConfig, transport: Arc<dyn HttpTransport>) -> Result<Self> {
        config.validate()?;

        let alerts = AlertManager::new(config.alerts.manager_config());
        for channel in &config.channels {
            let name = channel.name().to_string();
            let channel = channel.clone().build(Arc::clone(&transport))?;
            if !alerts.register_channel(channel) {
                return Err(EngineError::Config(format!("duplicate channel name '{name}'")));
            }
        }

        let issues: Arc<dyn IssueSink> = match &config.issues.url {
            Some(url) => {
                let mut sink = HttpIssueSink::new(url.clone(), Arc::clone(&transport));
                for (key, value) in &config.issues.headers {
                    sink = sink.with_header(key.clone(), value.clone());
                }
                Arc::new(sink)
            }
            None => Arc::new(LogIssueSink),
        };

        let rules = config.load_rules()?;
        let categorizer = Categorizer::new(rules, config.tracker_config(), alerts.clone(), issues);

        let monitor = MetricsMonitor::new(
            config.metrics.capacity,
            config.metrics.summary_window_minutes,
            alerts.clone(),
        );
        for threshold in &config.thresholds {
            monitor.set_threshold(threshold.clone())?;
        }

        let business = BusinessSource::new();
        let performance = Arc::new(PerformanceSource::new());
        let business_gauges = business.gauges().clone();
        let performance_gauges = performance.gauges().clone();

        let mut scheduler = CollectionScheduler::new(
            monitor.clone(),
            config.scheduler.interval(),
            config.scheduler.source_timeout(),
        );
        let mut business = Some(business);
        for name in &config.scheduler.sources {
            let source: Option<Arc<dyn MetricSource>> = match name.as_str() {
                "system" => Some(Arc::new(SystemSource::new())),
                "business" => business.take().map(|b| Arc::new(b) as Arc<dyn MetricSource>),
                "performance" => Some(Arc::clone(&performance) as Arc<dyn MetricSource>),
                _ => None,
            };
            match source {
                Some(source) => scheduler.add_source(source),
                None => warn!(source = %name, "metric source skipped"),
            }
        }

        info!(
            environment = %config.environment,
            channels = ?alerts.channel_names(),
            categories = categorizer.rules().len(),
            thresholds = config.thresholds.len(),
            "engine configured"
        );

        Ok(Self {
            config: Arc::new(config),
            alerts,
            categorizer,
            monitor,
            scheduler,
            business: business_gauges,
            performance: performance_gauges,
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the alert manager.
    #[must_use]
    pub const fn alerts(&self) -> &AlertManager {
        &self.alerts
    }

    /// Returns the categorizer.
    #[must_use]
    pub const fn categorizer(&self) -> &Categorizer {
        &self.categorizer
    }

    /// Returns the metrics monitor.
    #[must_use]
    pub const fn monitor(&self) -> &MetricsMonitor {
        &self.monitor
    }

    /// Gauges reported by the business source.
    #[must_use]
    pub const fn business_gauges(&self) -> &GaugeSet {
        &self.business
    }

    /// Gauges reported by the performance source.
    #[must_use]
    pub const fn performance_gauges(&self) -> &GaugeSet {
        &self.performance
    }

    // ============ Errors ============

    /// Reports an application error. Never fails.
    pub async fn report_error(
        &self,
        error: ErrorReport,
        category_hint: Option<&str>,
        context: ErrorContext,
        user_id: Option<&str>,
    ) -> IncidentId {
        self.categorizer
            .report_error(error, category_hint, context, user_id)
            .await
    }

    /// Reports an application error and returns the full outcome.
    pub async fn report(
        &self,
        error: ErrorReport,
        category_hint: Option<&str>,
        context: ErrorContext,
        user_id: Option<&str>,
    ) -> ReportOutcome {
        self.categorizer
            .report(error, category_hint, context, user_id)
            .await
    }

    /// Incident statistics.
    #[must_use]
    pub fn error_stats(&self) -> IncidentStats {
        self.categorizer.error_stats()
    }

    /// All incidents, most recently seen first.
    #[must_use]
    pub fn all_incidents(&self) -> Vec<Incident> {
        self.categorizer.all_incidents()
    }

    /// One incident.
    #[must_use]
    pub fn incident(&self, id: &str) -> Option<Incident> {
        self.categorizer.incident(id)
    }

    /// Resolves an incident. Returns `false` if it is unknown.
    pub fn resolve_incident(
        &self,
        id: &str,
        action: &str,
        description: &str,
        resolved_by: &str,
    ) -> bool {
        self.categorizer
            .resolve_incident(id, action, description, resolved_by)
    }

    /// Ignores an incident. Returns `false` if it is unknown.
    pub fn ignore_incident(&self, id: &str, reason: &str, ignored_by: &str) -> bool {
        self.categorizer.ignore_incident(id, reason, ignored_by)
    }

    // ============ Metrics ============

    /// Records a metric value and alerts on threshold breach.
    ///
    /// # Errors
    ///
    /// Returns an error if the name or value is invalid.
    pub async fn record_metric(
        &self,
        name: &str,
        value: f64,
        tags: Option<Tags>,
        unit: Option<&str>,
    ) -> Result<Option<ThresholdBreach>> {
        self.monitor.record(name, value, tags, unit).await
    }

    /// Registers a threshold.
    ///
    /// # Errors
    ///
    /// Returns an error if the threshold is invalid.
    pub fn set_threshold(&self, threshold: MetricThreshold) -> Result<Option<MetricThreshold>> {
        self.monitor.set_threshold(threshold)
    }

    /// Removes a threshold. Returns `true` if one existed.
    pub fn remove_threshold(&self, metric: &str) -> bool {
        self.monitor.remove_threshold(metric)
    }

    /// Summary of every metric.
    #[must_use]
    pub fn metrics_summary(&self) -> Vec<MetricSummary> {
        self.monitor.summary()
    }

    /// Latest metric values in Prometheus text format.
    #[must_use]
    pub fn export_prometheus(&self) -> String {
        self.monitor.export_prometheus()
    }

    /// Runs one collection cycle over the configured sources.
    pub async fn collect_once(&self) -> CollectionReport {
        self.scheduler.collect_once().await
    }

    /// Starts periodic collection if the scheduler is enabled.
    pub fn start_scheduler(&self, shutdown: watch::Receiver<bool>) -> Option<JoinHandle<()>> {
        if !self.config.scheduler.enabled {
            info!("collection scheduler disabled");
            return None;
        }
        Some(self.scheduler.clone().spawn(shutdown))
    }

    // ============ Alerts ============

    /// Registers an alert channel. Returns `false` if the name is taken.
    pub fn register_channel(&self, channel: Arc<dyn AlertChannel>) -> bool {
        self.alerts.register_channel(channel)
    }

    /// Alert statistics.
    #[must_use]
    pub fn alert_stats(&self) -> AlertStats {
        self.alerts.stats()
    }

    /// Alerts raised in the last `hours`, newest first.
    #[must_use]
    pub fn recent_alerts(&self, hours: u64) -> Vec<Alert> {
        self.alerts.recent_alerts(hours)
    }

    /// Resolves an alert. Returns `false` if it is unknown.
    pub fn resolve_alert(&self, id: &str) -> bool {
        self.alerts.resolve_alert(id)
    }

    // ============ Maintenance ============

    /// Applies incident retention and alert history retention.
    pub fn prune(&self) -> PruneReport {
        PruneReport {
            incidents: self.categorizer.prune(),
            alerts: self.alerts.prune(),
        }
    }

    /// Current engine status.
    #[must_use]
    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            incidents: self.error_stats(),
            alerts: self.alert_stats(),
            metrics: self.monitor.store().metric_names().len(),
            channels: self.alerts.channel_names(),
        }
    }
}
