//! Periodic metric collection.
//!
//! The scheduler ticks on a fixed interval (missed ticks are skipped, not
//! bunched). Each tick spawns one collection cycle that polls every source
//! concurrently, each under a timeout; a failing or slow source is logged and
//! skipped without affecting the others.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, timeout};
use tracing::{debug, info, warn};
use triage_metrics::MetricSource;

use crate::monitor::MetricsMonitor;

/// Outcome of polling one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceStatus {
    /// The source produced samples.
    Collected {
        /// Points stored.
        recorded: usize,
        /// Points rejected.
        rejected: usize,
        /// Threshold breaches.
        breaches: usize,
    },
    /// The source returned an error.
    Failed {
        /// Failure description.
        reason: String,
    },
    /// The source did not answer in time.
    TimedOut,
}

/// Per-source outcome of one cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceOutcome {
    /// Source name.
    pub source: String,
    /// What happened.
    #[serde(flatten)]
    pub status: SourceStatus,
}

/// Outcome of one collection cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CollectionReport {
    /// One entry per source, in registration order.
    pub sources: Vec<SourceOutcome>,
}

impl CollectionReport {
    /// Total points stored.
    #[must_use]
    pub fn recorded(&self) -> usize {
        self.sources
            .iter()
            .map(|s| match s.status {
                SourceStatus::Collected { recorded, .. } => recorded,
                _ => 0,
            })
            .sum()
    }

    /// Sources that failed or timed out.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.sources
            .iter()
            .filter(|s| !matches!(s.status, SourceStatus::Collected { .. }))
            .count()
    }
}

/// Polls metric sources into a [`MetricsMonitor`].
#[derive(Clone)]
pub struct CollectionScheduler {
    monitor: MetricsMonitor,
    sources: Vec<Arc<dyn MetricSource>>,
    interval: Duration,
    source_timeout: Duration,
}

impl std::fmt::Debug for CollectionScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.sources.iter().map(|s| s.name()).collect();
        f.debug_struct("CollectionScheduler")
            .field("sources", &names)
            .field("interval", &self.interval)
            .field("source_timeout", &self.source_timeout)
            .finish_non_exhaustive()
    }
}

impl CollectionScheduler {
    /// Creates a scheduler with no sources.
    #[must_use]
    pub fn new(monitor: MetricsMonitor, interval: Duration, source_timeout: Duration) -> Self {
        Self {
            monitor,
            sources: Vec::new(),
            interval,
            source_timeout,
        }
    }

    /// Adds a source.
    #[must_use]
    pub fn with_source(mut self, source: Arc<dyn MetricSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Adds a source.
    pub fn add_source(&mut self, source: Arc<dyn MetricSource>) {
        self.sources.push(source);
    }

    /// Names of the registered sources.
    #[must_use]
    pub fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_string()).collect()
    }

    /// Collection interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Runs one collection cycle.
    pub async fn collect_once(&self) -> CollectionReport {
        let polls = self.sources.iter().map(|source| {
            let source = Arc::clone(source);
            let monitor = self.monitor.clone();
            let limit = self.source_timeout;
            async move {
                let name = source.name().to_string();
                let status = match timeout(limit, source.collect()).await {
                    Ok(Ok(metrics)) => {
                        let batch = monitor.record_batch(metrics).await;
                        debug!(
                            source = %name,
                            recorded = batch.recorded,
                            breaches = batch.breaches.len(),
                            "source collected"
                        );
                        SourceStatus::Collected {
                            recorded: batch.recorded,
                            rejected: batch.rejected,
                            breaches: batch.breaches.len(),
                        }
                    }
                    Ok(Err(e)) => {
                        warn!(source = %name, error = %e, "metric source failed");
                        SourceStatus::Failed {
                            reason: e.to_string(),
                        }
                    }
                    Err(_) => {
                        warn!(source = %name, timeout = ?limit, "metric source timed out");
                        SourceStatus::TimedOut
                    }
                };
                SourceOutcome {
                    source: name,
                    status,
                }
            }
        });

        CollectionReport {
            sources: join_all(polls).await,
        }
    }

    /// Starts periodic collection until `shutdown` turns true.
    ///
    /// The first cycle runs immediately.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(
                sources = ?self.source_names(),
                interval_secs = self.interval.as_secs(),
                "collection scheduler started"
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let scheduler = self.clone();
                        tokio::spawn(async move {
                            let report = scheduler.collect_once().await;
                            debug!(
                                recorded = report.recorded(),
                                failed = report.failed(),
                                "collection cycle complete"
                            );
                        });
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!("collection scheduler stopped");
                            break;
                        }
                    }
                }
            }
        })
    }
}
