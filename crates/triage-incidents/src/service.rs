//! The error-reporting entry point.

use std::sync::Arc;

use tracing::{debug, warn};
use triage_alerts::{AlertManager, Severity};

use crate::category::CategoryRuleSet;
use crate::executor::{ActionExecutor, ExecutionReport};
use crate::fingerprint::fingerprint;
use crate::issues::IssueSink;
use crate::tracker::{IncidentTracker, TrackerConfig};
use crate::types::{ErrorContext, ErrorReport, Incident, IncidentId, IncidentStats};

/// Everything that happened for one reported error.
#[derive(Debug, Clone)]
pub struct ReportOutcome {
    /// The incident after the update.
    pub incident: Incident,
    /// True on the first sighting.
    pub is_new: bool,
    /// Severity before this sighting, if it escalated.
    pub escalated_from: Option<Severity>,
    /// Action outcomes.
    pub execution: ExecutionReport,
}

/// Fingerprints, categorizes and tracks errors, then runs category actions.
///
/// Cloning shares the tracker and the rule set.
#[derive(Debug, Clone)]
pub struct Categorizer {
    rules: Arc<CategoryRuleSet>,
    tracker: IncidentTracker,
    executor: ActionExecutor,
}

impl Categorizer {
    /// Creates a categorizer delivering alerts through `alerts` and issues to `issues`.
    #[must_use]
    pub fn new(
        rules: CategoryRuleSet,
        config: TrackerConfig,
        alerts: AlertManager,
        issues: Arc<dyn IssueSink>,
    ) -> Self {
        let tracker = IncidentTracker::new(config);
        let executor = ActionExecutor::new(alerts, issues, tracker.clone());
        Self {
            rules: Arc::new(rules),
            tracker,
            executor,
        }
    }

    /// Returns the rule set.
    #[must_use]
    pub fn rules(&self) -> &CategoryRuleSet {
        &self.rules
    }

    /// Returns the incident tracker.
    #[must_use]
    pub const fn tracker(&self) -> &IncidentTracker {
        &self.tracker
    }

    /// Reports an error and returns its incident id.
    ///
    /// `user_id`, when given, takes precedence over the context's user.
    pub async fn report_error(
        &self,
        error: ErrorReport,
        category_hint: Option<&str>,
        context: ErrorContext,
        user_id: Option<&str>,
    ) -> IncidentId {
        self.report(error, category_hint, context, user_id)
            .await
            .incident
            .id
    }

    /// Reports an error and returns the full outcome.
    pub async fn report(
        &self,
        error: ErrorReport,
        category_hint: Option<&str>,
        mut context: ErrorContext,
        user_id: Option<&str>,
    ) -> ReportOutcome {
        if let Some(user) = user_id.filter(|u| !u.trim().is_empty()) {
            context.user_id = Some(user.to_string());
        }

        let id = fingerprint(&error, &context);
        let rules = Arc::clone(&self.rules);
        let sighting = self.tracker.record(&id, &error, &context, || {
            rules.categorize(&error, &context, category_hint)
        });

        let category = match self.rules.get(&sighting.incident.category_id) {
            Some(category) => category,
            None => {
                warn!(
                    incident = %id,
                    category = %sighting.incident.category_id,
                    "incident category no longer in rule set"
                );
                self.rules.uncategorized()
            }
        };

        let execution = self
            .executor
            .execute(&sighting.incident, &category, sighting.is_new)
            .await;
        debug!(
            incident = %id,
            frequency = sighting.incident.frequency,
            actions = execution.actions.len(),
            "error reported"
        );

        ReportOutcome {
            incident: self.tracker.get(&id).unwrap_or(sighting.incident),
            is_new: sighting.is_new,
            escalated_from: sighting.escalated_from,
            execution,
        }
    }

    /// Aggregate incident statistics.
    #[must_use]
    pub fn error_stats(&self) -> IncidentStats {
        self.tracker.stats()
    }

    /// All incidents, most recently seen first.
    #[must_use]
    pub fn all_incidents(&self) -> Vec<Incident> {
        self.tracker.all()
    }

    /// Returns one incident.
    #[must_use]
    pub fn incident(&self, id: &str) -> Option<Incident> {
        self.tracker.get(id)
    }

    /// Resolves an incident. Returns `false` if it is unknown.
    pub fn resolve_incident(
        &self,
        id: &str,
        action: &str,
        description: &str,
        resolved_by: &str,
    ) -> bool {
        self.tracker.resolve(id, action, description, resolved_by)
    }

    /// Ignores an incident. Returns `false` if it is unknown.
    pub fn ignore_incident(&self, id: &str, reason: &str, ignored_by: &str) -> bool {
        self.tracker.ignore(id, reason, ignored_by)
    }

    /// Moves a new incident to investigating.
    pub fn mark_investigating(&self, id: &str) -> bool {
        self.tracker.mark_investigating(id)
    }

    /// Applies incident retention. Returns the number removed.
    pub fn prune(&self) -> usize {
        self.tracker.prune()
    }
}
