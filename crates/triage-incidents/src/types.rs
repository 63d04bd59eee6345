//! Core types for error ingestion and incident tracking.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use triage_alerts::Severity;

/// Incident identifier; equal to the error fingerprint.
pub type IncidentId = String;

/// Deployment environment of the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development.
    #[default]
    Development,
    /// Pre-production.
    Staging,
    /// Production.
    Production,
}

impl Environment {
    /// Returns true for production.
    #[must_use]
    pub const fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    /// Returns the environment as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error as reported by the application.
///
/// Missing fields default to empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorReport {
    /// Error type name (`TypeError`, `PaymentError`, ...).
    pub name: String,
    /// Error message.
    pub message: String,
    /// Stack trace, if captured.
    pub stack: String,
}

impl ErrorReport {
    /// Creates a report without a stack.
    #[must_use]
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: String::new(),
        }
    }

    /// Sets the stack trace.
    #[must_use]
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = stack.into();
        self
    }
}

/// Context attached to a reported error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Request path or route.
    #[serde(default)]
    pub path: Option<String>,
    /// Affected user, if known.
    #[serde(default, alias = "userId")]
    pub user_id: Option<String>,
    /// Whether the error happened in a production deployment.
    #[serde(default)]
    pub production: bool,
    /// Any other context.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ErrorContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the path.
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Sets the user id.
    #[must_use]
    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Sets the production flag.
    #[must_use]
    pub const fn production(mut self, production: bool) -> Self {
        self.production = production;
        self
    }

    /// Adds a free-form field.
    #[must_use]
    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Returns true if a non-empty user id is present.
    #[must_use]
    pub fn has_user(&self) -> bool {
        self.user_id.as_deref().is_some_and(|u| !u.trim().is_empty())
    }

    /// Flattens the context into `key=value` lines for pattern matching.
    #[must_use]
    pub fn text(&self) -> String {
        let mut out = String::new();
        if let Some(path) = &self.path {
            let _ = writeln!(out, "path={path}");
        }
        if let Some(user) = &self.user_id {
            let _ = writeln!(out, "user_id={user}");
        }
        if self.production {
            out.push_str("production=true\n");
        }
        for (key, value) in &self.extra {
            match value {
                Value::String(s) => {
                    let _ = writeln!(out, "{key}={s}");
                }
                other => {
                    let _ = writeln!(out, "{key}={other}");
                }
            }
        }
        out
    }
}

/// Lifecycle status of an incident.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    /// Seen, not yet triaged.
    #[default]
    New,
    /// Someone is looking at it.
    Investigating,
    /// Fixed.
    Resolved,
    /// Deliberately ignored.
    Ignored,
}

impl IncidentStatus {
    /// Returns true for resolved and ignored incidents.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Resolved | Self::Ignored)
    }

    /// Returns the status as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Investigating => "investigating",
            Self::Resolved => "resolved",
            Self::Ignored => "ignored",
        }
    }
}

impl std::fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an incident was closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// What was done (`fixed`, `ignored`, `wont_fix`, ...).
    pub action: String,
    /// Free-text description.
    pub description: String,
    /// When it was closed.
    pub resolved_at: DateTime<Utc>,
    /// Who closed it.
    pub resolved_by: String,
}

/// The tracked record of all occurrences sharing one fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    /// Fingerprint.
    pub id: IncidentId,
    /// The first reported error.
    pub error: ErrorReport,
    /// Matched category id.
    pub category_id: String,
    /// Matched category display name.
    pub category_name: String,
    /// Current severity.
    pub severity: Severity,
    /// Severity at creation, after overrides.
    pub baseline_severity: Severity,
    /// Number of sightings.
    pub frequency: u64,
    /// First sighting.
    pub first_seen: DateTime<Utc>,
    /// Latest sighting.
    pub last_seen: DateTime<Utc>,
    /// Distinct users that hit this error.
    pub affected_users: BTreeSet<String>,
    /// Context of the first sighting.
    pub context: ErrorContext,
    /// Lifecycle status.
    pub status: IncidentStatus,
    /// Set when resolved or ignored.
    pub resolution: Option<Resolution>,
}

impl Incident {
    /// Number of distinct affected users.
    #[must_use]
    pub fn affected_user_count(&self) -> usize {
        self.affected_users.len()
    }
}

/// Aggregate incident statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentStats {
    /// Tracked incidents.
    pub total_incidents: usize,
    /// Sum of all incident frequencies.
    pub total_occurrences: u64,
    /// Distinct users across all incidents.
    pub affected_users: usize,
    /// Incidents by status.
    pub by_status: BTreeMap<IncidentStatus, usize>,
    /// Incidents by severity.
    pub by_severity: BTreeMap<Severity, usize>,
    /// Incidents by category id.
    pub by_category: BTreeMap<String, usize>,
}
