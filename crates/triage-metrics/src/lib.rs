//! Bounded in-memory metrics for the Triage engine.
#![forbid(unsafe_code)]
//!
//! `triage-metrics` keeps a fixed-size time series per metric name, evaluates
//! recorded values against warning/critical thresholds, and renders the
//! latest values in Prometheus text format.
//!
//! # Features
//!
//! - **Ring Buffers**: Each metric keeps at most N points; oldest evicted first
//! - **Thresholds**: `gt` / `lt` / `eq` warning and critical levels per metric
//! - **Prometheus Export**: Gauge exposition with tags rendered as labels
//! - **Sources**: System, business and performance pollers for the scheduler
//!
//! # Example
//!
//! ```rust
//! use triage_metrics::{Comparison, Metric, MetricStore, MetricThreshold, ThresholdRegistry, BreachLevel};
//!
//! let store = MetricStore::default();
//! let thresholds = ThresholdRegistry::new();
//! thresholds
//!     .set(MetricThreshold::new("response_time", 3000.0, 5000.0, Comparison::Gt).unwrap())
//!     .unwrap();
//!
//! let metric = Metric::named("response_time", 6000.0).unwrap().with_unit("ms");
//! store.push(metric.clone()).unwrap();
//!
//! let breach = thresholds.evaluate(&metric).unwrap();
//! assert_eq!(breach.level, BreachLevel::Critical);
//! assert_eq!(store.latest("response_time").map(|m| m.value), Some(6000.0));
//! ```

#![doc(html_root_url = "https://docs.rs/triage-metrics/0.1.0")]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod collector;
pub mod error;
pub mod prometheus;
pub mod storage;
pub mod threshold;
pub mod types;

// Re-export main types at crate root
pub use collector::{BusinessSource, GaugeSet, MetricSource, PerformanceSource, SystemSource};
pub use error::{MetricsError, Result};
pub use storage::{MetricStore, MetricSummary};
pub use threshold::{BreachLevel, Comparison, MetricThreshold, ThresholdBreach, ThresholdRegistry};
pub use types::{Aggregation, Metric, MetricName, Tags};
