//! Engine configuration.
//!
//! Configuration for the Triage engine, including:
//! - Deployment environment
//! - Alert delivery (cooldown, timeouts, history, routing) and channels
//! - Incident escalation thresholds and retention
//! - Metric buffers, thresholds and the collection scheduler
//! - Optional category rule file and issue tracker endpoint

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use triage_alerts::{AlertManagerConfig, ChannelConfig, SeverityRouting};
use triage_incidents::{
    CategoryRuleSet, Environment, EscalationPolicy, RetentionPolicy, TrackerConfig,
};
use triage_metrics::MetricThreshold;

use crate::error::{EngineError, Result};

/// Sample configuration written by `triaged init-config`.
pub const SAMPLE_CONFIG: &str = include_str!("../config/triaged.example.toml");

/// Alert delivery settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsSection {
    /// Minimum seconds between two sends of the same alert.
    pub cooldown_secs: u64,
    /// Upper bound on a single channel send, in milliseconds.
    pub channel_timeout_ms: u64,
    /// Alerts older than this are dropped from history.
    pub history_max_age_hours: u64,
    /// Maximum alerts kept in history.
    pub history_max_entries: usize,
    /// Severity to channel routing.
    pub routing: SeverityRouting,
}

impl Default for AlertsSection {
    fn default() -> Self {
        let defaults = AlertManagerConfig::default();
        Self {
            cooldown_secs: defaults.cooldown_ms / 1000,
            channel_timeout_ms: defaults.channel_timeout_ms,
            history_max_age_hours: defaults.history_max_age_hours,
            history_max_entries: defaults.history_max_entries,
            routing: defaults.routing,
        }
    }
}

impl AlertsSection {
    /// Builds the alert manager configuration.
    #[must_use]
    pub fn manager_config(&self) -> AlertManagerConfig {
        AlertManagerConfig {
            cooldown_ms: self.cooldown_secs.saturating_mul(1000),
            channel_timeout_ms: self.channel_timeout_ms,
            history_max_age_hours: self.history_max_age_hours,
            history_max_entries: self.history_max_entries,
            routing: self.routing.clone(),
        }
    }
}

/// Metric buffer settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSection {
    /// Points kept per metric.
    pub capacity: usize,
    /// Window for summary averages, in minutes.
    pub summary_window_minutes: i64,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            capacity: 1_000,
            summary_window_minutes: 60,
        }
    }
}

/// Collection scheduler settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    /// Whether periodic collection runs.
    pub enabled: bool,
    /// Seconds between collection cycles.
    pub interval_secs: u64,
    /// Upper bound on one source poll, in milliseconds.
    pub source_timeout_ms: u64,
    /// Sources to poll: `system`, `business`, `performance`.
    pub sources: Vec<String>,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 60,
            source_timeout_ms: 5_000,
            sources: KNOWN_SOURCES.iter().map(ToString::to_string).collect(),
        }
    }
}

impl SchedulerSection {
    /// Returns the interval as a duration.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Returns the source timeout as a duration.
    #[must_use]
    pub const fn source_timeout(&self) -> Duration {
        Duration::from_millis(self.source_timeout_ms)
    }
}

/// Names of the built-in metric sources.
pub const KNOWN_SOURCES: [&str; 3] = ["system", "business", "performance"];

/// Issue tracker settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IssuesSection {
    /// Tracker endpoint; issues are only logged when absent.
    pub url: Option<String>,
    /// Extra request headers.
    pub headers: BTreeMap<String, String>,
}

/// Main engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Deployment environment.
    pub environment: Environment,
    /// Category rule file replacing the built-in table.
    pub rules_file: Option<PathBuf>,
    /// Alert delivery.
    pub alerts: AlertsSection,
    /// Incident escalation thresholds.
    pub escalation: EscalationPolicy,
    /// Incident retention.
    pub incidents: RetentionPolicy,
    /// Metric buffers.
    pub metrics: MetricsSection,
    /// Collection scheduler.
    pub scheduler: SchedulerSection,
    /// Issue tracker.
    pub issues: IssuesSection,
    /// Metric thresholds registered at startup.
    pub thresholds: Vec<MetricThreshold>,
    /// Alert channels registered at startup.
    pub channels: Vec<ChannelConfig>,
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            EngineError::Config(format!(
                "failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or fails validation.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| EngineError::Config(format!("invalid TOML: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.alerts.channel_timeout_ms == 0 {
            return Err(EngineError::Config(
                "alerts.channel_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.alerts.history_max_entries == 0 {
            return Err(EngineError::Config(
                "alerts.history_max_entries must be greater than 0".to_string(),
            ));
        }

        if self.escalation.users_threshold == 0 || self.escalation.frequency_threshold == 0 {
            return Err(EngineError::Config(
                "escalation thresholds must be greater than 0".to_string(),
            ));
        }

        if self.incidents.max_incidents == 0 {
            return Err(EngineError::Config(
                "incidents.max_incidents must be greater than 0".to_string(),
            ));
        }

        if self.metrics.capacity == 0 {
            return Err(EngineError::Config(
                "metrics.capacity must be greater than 0".to_string(),
            ));
        }

        if self.metrics.summary_window_minutes <= 0 {
            return Err(EngineError::Config(
                "metrics.summary_window_minutes must be greater than 0".to_string(),
            ));
        }

        if self.scheduler.interval_secs == 0 {
            return Err(EngineError::Config(
                "scheduler.interval_secs must be greater than 0".to_string(),
            ));
        }

        if self.scheduler.source_timeout_ms == 0 {
            return Err(EngineError::Config(
                "scheduler.source_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if let Some(unknown) = self
            .scheduler
            .sources
            .iter()
            .find(|s| !KNOWN_SOURCES.contains(&s.as_str()))
        {
            return Err(EngineError::Config(format!(
                "unknown metric source '{unknown}', expected one of {}",
                KNOWN_SOURCES.join(", ")
            )));
        }

        for threshold in &self.thresholds {
            threshold
                .validate()
                .map_err(|e| EngineError::Config(e.to_string()))?;
        }

        let mut names = std::collections::HashSet::new();
        for channel in &self.channels {
            if !names.insert(channel.name()) {
                return Err(EngineError::Config(format!(
                    "duplicate channel name '{}'",
                    channel.name()
                )));
            }
        }

        if let Some(url) = &self.issues.url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(EngineError::Config(
                    "issues.url must start with http:// or https://".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Builds the incident tracker configuration.
    #[must_use]
    pub const fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            environment: self.environment,
            escalation: self.escalation,
            retention: self.incidents,
        }
    }

    /// Loads the category rules: the rule file when set, else the built-in table.
    ///
    /// # Errors
    ///
    /// Returns an error if the rule file cannot be read or is invalid.
    pub fn load_rules(&self) -> Result<CategoryRuleSet> {
        let rules = match &self.rules_file {
            Some(path) => CategoryRuleSet::from_file(path)?,
            None => CategoryRuleSet::builtin()?,
        };
        Ok(rules)
    }
}
