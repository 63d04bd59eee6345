//! Prometheus text exposition of the latest value of every metric.
//!
//! Every metric is exported as a gauge family built with `prometheus_client`.
//! Stored names are mapped to valid exposition names first; names that map to
//! the same exposition name share one family, and each of their series carries
//! a `metric` label holding the stored name.
//!
//! ```rust
//! use triage_metrics::{Metric, MetricStore};
//!
//! let store = MetricStore::default();
//! store
//!     .push(Metric::named("api.latency", 42.0).unwrap().tag("route", "/checkout"))
//!     .unwrap();
//!
//! let text = store.export_prometheus();
//! assert!(text.contains("# TYPE api_latency gauge"));
//! assert!(text.contains("api_latency{route=\"/checkout\"} 42"));
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::AtomicU64;

use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

use crate::storage::MetricStore;
use crate::types::Metric;

/// Label added to series whose stored names collide after sanitizing.
pub const SOURCE_NAME_LABEL: &str = "metric";

/// Labels of one exported series.
pub type LabelSet = Vec<(String, String)>;

/// A gauge family keyed by label set.
pub type GaugeFamily = Family<LabelSet, Gauge<f64, AtomicU64>>;

/// Converts an arbitrary metric name into a valid Prometheus metric name.
///
/// Characters outside `[a-zA-Z0-9_:]` become `_`; a leading digit gets a `_` prefix.
#[must_use]
pub fn sanitize_metric_name(name: &str) -> String {
    sanitize(name, true)
}

/// Converts an arbitrary tag key into a valid Prometheus label name.
#[must_use]
pub fn sanitize_label_name(name: &str) -> String {
    sanitize(name, false)
}

fn sanitize(name: &str, allow_colon: bool) -> String {
    let mut out: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || (allow_colon && c == ':') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

/// Builds the label set for a series.
///
/// Tag keys that sanitize to the same label name keep the first tag in key
/// order. `source` adds the [`SOURCE_NAME_LABEL`] label, which wins over a tag
/// of the same name.
fn labels(metric: &Metric, source: Option<&str>) -> LabelSet {
    let mut out: BTreeMap<String, String> = BTreeMap::new();
    if let Some(name) = source {
        out.insert(SOURCE_NAME_LABEL.to_string(), name.to_string());
    }
    for (key, value) in &metric.tags {
        out.entry(sanitize_label_name(key))
            .or_insert_with(|| value.clone());
    }
    out.into_iter().collect()
}

fn help(metrics: &[&Metric]) -> String {
    let names: Vec<&str> = metrics.iter().map(|m| m.name.as_str()).collect();
    let mut help = names.join(", ");
    if let Some(unit) = metrics.iter().find_map(|m| m.unit.as_deref()) {
        help.push_str(&format!(" ({unit})"));
    }
    help
}

/// Builds a registry holding one gauge family per exposition name.
///
/// Each input metric should be the latest point of a distinct stored name.
#[must_use]
pub fn registry(metrics: &[Metric]) -> Registry {
    let mut families: BTreeMap<String, Vec<&Metric>> = BTreeMap::new();
    for metric in metrics {
        families
            .entry(sanitize_metric_name(metric.name.as_str()))
            .or_default()
            .push(metric);
    }

    let mut registry = Registry::default();
    for (name, members) in families {
        let family = GaugeFamily::default();
        let clashing = members.len() > 1;
        for metric in &members {
            let source = clashing.then(|| metric.name.as_str());
            family
                .get_or_create(&labels(metric, source))
                .set(metric.value);
        }
        registry.register(name, help(&members), family);
    }
    registry
}

/// Renders metrics in the Prometheus text exposition format.
#[must_use]
pub fn render(metrics: &[Metric]) -> String {
    let mut buffer = String::new();
    if encode(&mut buffer, &registry(metrics)).is_err() {
        tracing::error!("failed to encode prometheus metrics");
        return String::new();
    }
    buffer
}

impl MetricStore {
    /// Exports the latest value of every metric in Prometheus text format.
    #[must_use]
    pub fn export_prometheus(&self) -> String {
        render(&self.latest_all())
    }
}
