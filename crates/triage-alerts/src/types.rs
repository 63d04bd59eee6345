//! Core types for the alerting system.
//!
//! - [`Severity`]: Ordered urgency level shared by alerts and incidents
//! - [`Alert`]: A point-in-time notification

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use triage_metrics::{BreachLevel, ThresholdBreach};
use uuid::Uuid;

/// Ordered severity level: `Low < Medium < High < Critical`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Low impact, informational.
    Low,
    /// Should be looked at.
    #[default]
    Medium,
    /// Needs prompt attention.
    High,
    /// Requires immediate attention.
    Critical,
}

impl Severity {
    /// All severities in ascending order.
    pub const ALL: [Self; 4] = [Self::Low, Self::Medium, Self::High, Self::Critical];

    /// Returns the severity as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Returns the next severity up, saturating at critical.
    #[must_use]
    pub const fn escalate(self) -> Self {
        match self {
            Self::Low => Self::Medium,
            Self::Medium => Self::High,
            Self::High | Self::Critical => Self::Critical,
        }
    }

    /// Escalates `steps` times.
    #[must_use]
    pub fn escalate_by(self, steps: u8) -> Self {
        (0..steps).fold(self, |s, _| s.escalate())
    }

    /// Parses a severity name (case-insensitive).
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<BreachLevel> for Severity {
    fn from(level: BreachLevel) -> Self {
        match level {
            BreachLevel::Critical => Self::Critical,
            BreachLevel::Warning => Self::High,
        }
    }
}

/// A point-in-time notification.
///
/// Alerts are immutable once sent except for resolution marking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Unique identifier.
    pub id: String,
    /// Severity, used for channel routing.
    pub severity: Severity,
    /// Short title; part of the rate-limit key.
    pub title: String,
    /// Human-readable message.
    pub message: String,
    /// Origin of the alert (`errors`, `metrics`, ...); part of the rate-limit key.
    pub source: String,
    /// When the alert was raised.
    pub timestamp: DateTime<Utc>,
    /// Free-form structured context.
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
    /// Whether the alert has been resolved.
    #[serde(default)]
    pub resolved: bool,
    /// When the alert was resolved.
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Alert {
    /// Creates a new unresolved alert stamped now.
    #[must_use]
    pub fn new(
        severity: Severity,
        title: impl Into<String>,
        message: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            severity,
            title: title.into(),
            message: message.into(),
            source: source.into(),
            timestamp: Utc::now(),
            metadata: BTreeMap::new(),
            resolved: false,
            resolved_at: None,
        }
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Builds the alert raised for a metric threshold breach.
    #[must_use]
    pub fn from_breach(breach: &ThresholdBreach) -> Self {
        let metric = &breach.metric;
        let unit = metric.unit.as_deref().unwrap_or("");
        let level_value = breach.threshold.level_value(breach.level);
        let message = format!(
            "{} is {}{unit}, breaching the {} threshold ({} {level_value}{unit})",
            metric.name, metric.value, breach.level, breach.threshold.comparison,
        );

        let tags: serde_json::Map<String, Value> = metric
            .tags
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();

        Self::new(
            breach.level.into(),
            format!("Threshold breached: {}", metric.name),
            message,
            "metrics",
        )
        .with_metadata("metric", metric.name.as_str())
        .with_metadata("value", metric.value)
        .with_metadata("level", breach.level.to_string())
        .with_metadata("warning", breach.threshold.warning)
        .with_metadata("critical", breach.threshold.critical)
        .with_metadata("comparison", breach.threshold.comparison.to_string())
        .with_metadata("tags", Value::Object(tags))
    }

    /// Returns the rate-limit key (`source|title`).
    #[must_use]
    pub fn rate_limit_key(&self) -> String {
        format!("{}|{}", self.source, self.title)
    }

    /// Marks the alert resolved. Returns `false` if it already was.
    pub fn resolve(&mut self) -> bool {
        if self.resolved {
            return false;
        }
        self.resolved = true;
        self.resolved_at = Some(Utc::now());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use triage_metrics::{Comparison, Metric, MetricThreshold};

    mod severity_tests {
        use super::*;
        use proptest::prelude::*;
        use test_case::test_case;

        #[test]
        fn ordering() {
            assert!(Severity::Low < Severity::Medium);
            assert!(Severity::Medium < Severity::High);
            assert!(Severity::High < Severity::Critical);
        }

        #[test]
        fn escalate_saturates() {
            assert_eq!(Severity::Low.escalate(), Severity::Medium);
            assert_eq!(Severity::High.escalate(), Severity::Critical);
            assert_eq!(Severity::Critical.escalate(), Severity::Critical);
            assert_eq!(Severity::Low.escalate_by(2), Severity::High);
            assert_eq!(Severity::Medium.escalate_by(0), Severity::Medium);
        }

        #[test_case("HIGH", Some(Severity::High) ; "upper case")]
        #[test_case(" low ", Some(Severity::Low) ; "padded")]
        #[test_case("Critical", Some(Severity::Critical) ; "title case")]
        #[test_case("urgent", None ; "unknown")]
        #[test_case("", None ; "empty")]
        fn parse_is_case_insensitive(input: &str, expected: Option<Severity>) {
            assert_eq!(Severity::parse(input), expected);
        }

        proptest! {
            #[test]
            fn escalate_by_is_monotone_and_bounded(start in 0usize..4, a in 0u8..6, b in 0u8..6) {
                let sev = Severity::ALL[start];
                let (lo, hi) = (a.min(b), a.max(b));

                prop_assert!(sev.escalate_by(lo) >= sev);
                prop_assert!(sev.escalate_by(lo) <= sev.escalate_by(hi));
                prop_assert!(sev.escalate_by(hi) <= Severity::Critical);
            }
        }

        #[test]
        fn serializes_lowercase() {
            for sev in Severity::ALL {
                let json = serde_json::to_string(&sev).unwrap();
                assert_eq!(json, format!("\"{sev}\""));
            }
        }

        #[test]
        fn breach_level_mapping() {
            assert_eq!(Severity::from(BreachLevel::Critical), Severity::Critical);
            assert_eq!(Severity::from(BreachLevel::Warning), Severity::High);
        }
    }

    mod alert_tests {
        use super::*;
        use proptest::prelude::*;

        #[test]
        fn rate_limit_key_joins_source_and_title() {
            let alert = Alert::new(Severity::High, "DB down", "primary unreachable", "errors");
            assert_eq!(alert.rate_limit_key(), "errors|DB down");
        }

        proptest! {
            #[test]
            fn rate_limit_key_ignores_severity_and_message(
                title in "[a-zA-Z ]{1,20}",
                first in "[a-z ]{0,20}",
                second in "[a-z ]{0,20}",
            ) {
                let a = Alert::new(Severity::Low, title.as_str(), first, "errors");
                let b = Alert::new(Severity::Critical, title.as_str(), second, "errors");
                let other = Alert::new(Severity::Low, title.as_str(), "m", "metrics");

                prop_assert_eq!(a.rate_limit_key(), b.rate_limit_key());
                prop_assert_ne!(a.rate_limit_key(), other.rate_limit_key());
            }
        }

        #[test]
        fn resolve_is_idempotent() {
            let mut alert = Alert::new(Severity::Low, "t", "m", "s");
            assert!(alert.resolve());
            let first = alert.resolved_at;
            assert!(!alert.resolve());
            assert_eq!(alert.resolved_at, first);
        }

        #[test]
        fn from_breach_builds_metric_alert() {
            let threshold =
                MetricThreshold::new("response_time", 3000.0, 5000.0, Comparison::Gt).unwrap();
            let metric = Metric::named("response_time", 6000.0)
                .unwrap()
                .with_unit("ms")
                .tag("route", "/checkout");
            let breach = ThresholdBreach {
                metric,
                threshold,
                level: BreachLevel::Critical,
            };

            let alert = Alert::from_breach(&breach);

            assert_eq!(alert.severity, Severity::Critical);
            assert_eq!(alert.source, "metrics");
            assert_eq!(alert.title, "Threshold breached: response_time");
            assert!(alert.message.contains("6000ms"));
            assert!(alert.message.contains(">= 5000ms"));
            assert_eq!(alert.metadata["tags"]["route"], "/checkout");
        }
    }
}
