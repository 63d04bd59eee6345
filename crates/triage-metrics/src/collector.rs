//! Metric sources polled by the collection scheduler.
//!
//! A [`MetricSource`] produces a batch of [`Metric`]s per poll. Three sources
//! ship with the crate:
//! - [`SystemSource`]: host CPU, load and memory via `sysinfo`
//! - [`BusinessSource`]: application-maintained gauges (bookings, signups, ...)
//! - [`PerformanceSource`]: process memory/CPU, runtime scheduling lag and
//!   application-maintained performance gauges

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::debug;

use crate::error::{MetricsError, Result};
use crate::types::{Metric, MetricName, Tags};

/// Trait for metric sources.
///
/// Implement this trait to feed custom measurements into the scheduler.
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Returns the name of this source for logging purposes.
    fn name(&self) -> &str;

    /// Polls the source once.
    ///
    /// # Errors
    ///
    /// Returns `MetricsError::CollectionError` if the source cannot be read.
    async fn collect(&self) -> Result<Vec<Metric>>;
}

#[derive(Debug, Clone)]
struct Gauge {
    value: f64,
    unit: Option<String>,
    tags: Tags,
}

/// A shared set of named gauges maintained by the application.
///
/// Cloning shares the underlying values.
#[derive(Debug, Clone, Default)]
pub struct GaugeSet {
    gauges: Arc<RwLock<BTreeMap<String, Gauge>>>,
}

impl GaugeSet {
    /// Creates an empty gauge set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a gauge value.
    pub fn set(&self, name: impl Into<String>, value: f64) {
        self.set_with(name, value, None, Tags::new());
    }

    /// Sets a gauge value with unit and tags.
    pub fn set_with(&self, name: impl Into<String>, value: f64, unit: Option<String>, tags: Tags) {
        self.gauges
            .write()
            .insert(name.into(), Gauge { value, unit, tags });
    }

    /// Adds `delta` to a gauge, creating it at zero if missing.
    pub fn add(&self, name: impl Into<String>, delta: f64) {
        let mut gauges = self.gauges.write();
        let gauge = gauges.entry(name.into()).or_insert_with(|| Gauge {
            value: 0.0,
            unit: None,
            tags: Tags::new(),
        });
        gauge.value += delta;
    }

    /// Removes a gauge. Returns `true` if it existed.
    pub fn remove(&self, name: &str) -> bool {
        self.gauges.write().remove(name).is_some()
    }

    /// Returns the current value of a gauge.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<f64> {
        self.gauges.read().get(name).map(|g| g.value)
    }

    /// Returns the number of gauges.
    #[must_use]
    pub fn len(&self) -> usize {
        self.gauges.read().len()
    }

    /// Returns true if no gauge is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.gauges.read().is_empty()
    }

    fn snapshot(&self, prefix: &str) -> Result<Vec<Metric>> {
        let gauges = self.gauges.read().clone();
        gauges
            .into_iter()
            .map(|(name, gauge)| {
                let name = MetricName::new(format!("{prefix}{name}"))?;
                let mut metric = Metric::now(name, gauge.value).with_tags(gauge.tags);
                metric.unit = gauge.unit;
                Ok(metric)
            })
            .collect()
    }
}

/// Host-level metrics read through `sysinfo`.
pub struct SystemSource {
    system: Mutex<System>,
}

impl std::fmt::Debug for SystemSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemSource").finish_non_exhaustive()
    }
}

impl SystemSource {
    /// Creates a system source.
    #[must_use]
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }

    fn sample(&self) -> Result<Vec<Metric>> {
        let mut sys = self.system.lock();
        sys.refresh_cpu_usage();
        sys.refresh_memory();

        let load = System::load_average();
        let total = sys.total_memory() as f64;
        let used = sys.used_memory() as f64;

        let mut metrics = vec![
            Metric::named("system_cpu_percent", f64::from(sys.global_cpu_usage()))?
                .with_unit("percent"),
            Metric::named("system_load_1m", load.one)?,
            Metric::named("system_load_5m", load.five)?,
            Metric::named("system_load_15m", load.fifteen)?,
            Metric::named("system_memory_used_bytes", used)?.with_unit("bytes"),
        ];
        if total > 0.0 {
            metrics.push(
                Metric::named("system_memory_percent", used / total * 100.0)?.with_unit("percent"),
            );
        }
        Ok(metrics)
    }
}

impl Default for SystemSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetricSource for SystemSource {
    fn name(&self) -> &str {
        "system"
    }

    async fn collect(&self) -> Result<Vec<Metric>> {
        let metrics = self.sample()?;
        debug!(source = "system", metric_count = metrics.len(), "collected system metrics");
        Ok(metrics)
    }
}

/// Business metrics maintained by the host application.
///
/// The application updates the shared [`GaugeSet`]; each poll reports every
/// gauge under the `business_` prefix.
#[derive(Debug, Clone, Default)]
pub struct BusinessSource {
    gauges: GaugeSet,
}

impl BusinessSource {
    /// Creates a business source with an empty gauge set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a business source over an existing gauge set.
    #[must_use]
    pub const fn with_gauges(gauges: GaugeSet) -> Self {
        Self { gauges }
    }

    /// Returns the gauge set the application should update.
    #[must_use]
    pub const fn gauges(&self) -> &GaugeSet {
        &self.gauges
    }
}

#[async_trait]
impl MetricSource for BusinessSource {
    fn name(&self) -> &str {
        "business"
    }

    async fn collect(&self) -> Result<Vec<Metric>> {
        self.gauges.snapshot("business_")
    }
}

/// Process and runtime performance metrics.
pub struct PerformanceSource {
    pid: Option<Pid>,
    system: Mutex<System>,
    gauges: GaugeSet,
}

impl std::fmt::Debug for PerformanceSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerformanceSource")
            .field("pid", &self.pid)
            .field("gauges", &self.gauges.len())
            .finish_non_exhaustive()
    }
}

impl PerformanceSource {
    /// Creates a performance source for the current process.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pid: sysinfo::get_current_pid().ok(),
            system: Mutex::new(System::new()),
            gauges: GaugeSet::new(),
        }
    }

    /// Returns the gauge set for application-measured performance values
    /// (e.g. request latency percentiles).
    #[must_use]
    pub const fn gauges(&self) -> &GaugeSet {
        &self.gauges
    }

    fn process_sample(&self) -> Result<Vec<Metric>> {
        let Some(pid) = self.pid else {
            return Err(MetricsError::CollectionError {
                source_name: "performance".to_string(),
                reason: "current process id unavailable".to_string(),
            });
        };

        let mut sys = self.system.lock();
        sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        let process = sys.process(pid).ok_or_else(|| MetricsError::CollectionError {
            source_name: "performance".to_string(),
            reason: format!("process {pid} not found"),
        })?;

        Ok(vec![
            Metric::named("process_memory_bytes", process.memory() as f64)?.with_unit("bytes"),
            Metric::named("process_cpu_percent", f64::from(process.cpu_usage()))?
                .with_unit("percent"),
        ])
    }
}

impl Default for PerformanceSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetricSource for PerformanceSource {
    fn name(&self) -> &str {
        "performance"
    }

    async fn collect(&self) -> Result<Vec<Metric>> {
        let started = Instant::now();
        tokio::task::yield_now().await;
        let lag_ms = started.elapsed().as_secs_f64() * 1000.0;

        let mut metrics = self.process_sample()?;
        metrics.push(Metric::named("runtime_scheduling_lag_ms", lag_ms)?.with_unit("ms"));
        metrics.extend(self.gauges.snapshot("performance_")?);
        Ok(metrics)
    }
}
