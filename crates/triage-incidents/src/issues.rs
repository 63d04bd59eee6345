//! Issue-tracking sinks for `create_issue` actions.

use std::collections::BTreeMap;
use std::fmt::{self, Write as _};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;
use triage_alerts::{HttpRequest, HttpTransport, Severity};

use crate::category::IssueConfig;
use crate::error::{IncidentError, Result};
use crate::types::Incident;

/// A structured issue handed to a tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuePayload {
    /// Issue title.
    pub title: String,
    /// Markdown body.
    pub body: String,
    /// Tracker project.
    pub project: String,
    /// Issue priority.
    pub priority: Severity,
    /// Labels.
    pub labels: Vec<String>,
}

impl IssuePayload {
    /// Builds the issue for an incident.
    #[must_use]
    pub fn for_incident(incident: &Incident, config: &IssueConfig) -> Self {
        let mut labels = config.labels.clone();
        for extra in [incident.category_id.clone(), format!("severity:{}", incident.severity)] {
            if !labels.contains(&extra) {
                labels.push(extra);
            }
        }

        Self {
            title: format!(
                "[{}] {}: {}",
                incident.category_name, incident.error.name, incident.error.message
            ),
            body: render_body(incident),
            project: config.project.clone(),
            priority: config.priority,
            labels,
        }
    }
}

fn render_body(incident: &Incident) -> String {
    let mut body = String::new();
    let _ = writeln!(body, "## Error Details\n");
    let _ = writeln!(body, "- **Incident:** `{}`", incident.id);
    let _ = writeln!(
        body,
        "- **Category:** {} (`{}`)",
        incident.category_name, incident.category_id
    );
    let _ = writeln!(body, "- **Severity:** {}", incident.severity);
    let _ = writeln!(body, "- **Frequency:** {}", incident.frequency);
    let _ = writeln!(body, "- **Affected users:** {}", incident.affected_users.len());
    let _ = writeln!(body, "- **First seen:** {}", incident.first_seen.to_rfc3339());
    let _ = writeln!(body, "- **Last seen:** {}", incident.last_seen.to_rfc3339());

    let _ = writeln!(body, "\n## Message\n\n```\n{}: {}\n```", incident.error.name, incident.error.message);

    let _ = writeln!(body, "\n## Stack Trace\n");
    if incident.error.stack.is_empty() {
        let _ = writeln!(body, "_No stack trace captured._");
    } else {
        let _ = writeln!(body, "```\n{}\n```", incident.error.stack);
    }

    let _ = writeln!(body, "\n## Context\n");
    let context = incident.context.text();
    if context.is_empty() {
        let _ = writeln!(body, "_No context._");
    } else {
        let _ = writeln!(body, "```\n{}```", context);
    }

    let _ = writeln!(body, "\n## Investigation Checklist\n");
    for step in [
        "Reproduce the error using the context above",
        "Check recent deployments touching the affected path",
        "Identify the root cause from the stack trace",
        "Add a regression test",
        "Deploy the fix and resolve the incident",
    ] {
        let _ = writeln!(body, "- [ ] {step}");
    }
    body
}

/// Destination for filed issues.
#[async_trait]
pub trait IssueSink: Send + Sync + fmt::Debug {
    /// Returns the sink name for logging.
    fn name(&self) -> &str;

    /// Files an issue.
    ///
    /// # Errors
    ///
    /// Returns `IncidentError::IssueSink` if the tracker rejected the issue.
    async fn file_issue(&self, issue: &IssuePayload) -> Result<()>;
}

/// Writes issues to the log.
#[derive(Debug, Clone, Default)]
pub struct LogIssueSink;

#[async_trait]
impl IssueSink for LogIssueSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn file_issue(&self, issue: &IssuePayload) -> Result<()> {
        info!(
            project = %issue.project,
            priority = %issue.priority,
            labels = ?issue.labels,
            title = %issue.title,
            "issue filed"
        );
        Ok(())
    }
}

/// Posts issues as JSON to a tracker endpoint.
#[derive(Debug, Clone)]
pub struct HttpIssueSink {
    url: String,
    headers: BTreeMap<String, String>,
    transport: Arc<dyn HttpTransport>,
}

impl HttpIssueSink {
    /// Creates a sink posting to `url`.
    #[must_use]
    pub fn new(url: impl Into<String>, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            url: url.into(),
            headers: BTreeMap::new(),
            transport,
        }
    }

    /// Adds a request header.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}

#[async_trait]
impl IssueSink for HttpIssueSink {
    fn name(&self) -> &str {
        "http"
    }

    async fn file_issue(&self, issue: &IssuePayload) -> Result<()> {
        let body = serde_json::to_value(issue).map_err(|e| IncidentError::IssueSink {
            sink: self.url.clone(),
            reason: e.to_string(),
        })?;
        let request = HttpRequest::new(&self.url, body).headers(&self.headers);
        let response = self.transport.post_json(request).await?;
        if !response.is_success() {
            return Err(IncidentError::IssueSink {
                sink: self.url.clone(),
                reason: format!("tracker returned {}", response.status),
            });
        }
        info!(url = %self.url, project = %issue.project, "issue filed");
        Ok(())
    }
}
