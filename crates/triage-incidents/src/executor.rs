//! Runs category actions for incidents.
//!
//! On the first sighting every action runs in declared order. On repeat
//! sightings only `alert` actions run. Closed incidents run nothing. Each
//! action's guard is evaluated against the incident first; a guard that fails
//! to parse or evaluate counts as not met.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};
use triage_alerts::{Alert, AlertManager};

use crate::category::{ActionKind, AlertConfig, ErrorCategory};
use crate::condition::ConditionVars;
use crate::issues::{IssuePayload, IssueSink};
use crate::tracker::IncidentTracker;
use crate::types::Incident;

/// Source name on alerts raised for incidents.
pub const ERROR_ALERT_SOURCE: &str = "errors";

/// What happened to one action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ActionOutcome {
    /// The alert went to the alert manager.
    AlertSent {
        /// Channels that delivered it.
        delivered: usize,
        /// Whether the rate limiter dropped it.
        suppressed: bool,
    },
    /// The issue was filed.
    IssueFiled,
    /// The issue sink failed.
    IssueFailed {
        /// Failure description.
        reason: String,
    },
    /// Remediation intent was logged.
    AutoFixLogged,
    /// The incident was marked ignored.
    Ignored,
    /// The guard condition did not hold.
    ConditionNotMet,
    /// Not an alert action on a repeat sighting.
    SkippedOnRepeat,
    /// An earlier `ignore` action closed the incident.
    SkippedIgnored,
}

/// Outcome of one action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionRecord {
    /// Action type name.
    pub action: &'static str,
    /// What happened.
    #[serde(flatten)]
    pub outcome: ActionOutcome,
}

/// Outcomes of all actions for one sighting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionReport {
    /// One record per declared action, in order.
    pub actions: Vec<ActionRecord>,
}

impl ExecutionReport {
    /// Number of alerts handed to the alert manager and not suppressed.
    #[must_use]
    pub fn alerts_sent(&self) -> usize {
        self.actions
            .iter()
            .filter(|a| matches!(a.outcome, ActionOutcome::AlertSent { suppressed: false, .. }))
            .count()
    }

    /// Number of issues filed.
    #[must_use]
    pub fn issues_filed(&self) -> usize {
        self.actions
            .iter()
            .filter(|a| a.outcome == ActionOutcome::IssueFiled)
            .count()
    }

    /// Returns true if any action produced the outcome.
    #[must_use]
    pub fn contains(&self, outcome: &ActionOutcome) -> bool {
        self.actions.iter().any(|a| &a.outcome == outcome)
    }
}

/// Executes category actions against the alert manager and issue sink.
#[derive(Debug, Clone)]
pub struct ActionExecutor {
    alerts: AlertManager,
    issues: Arc<dyn IssueSink>,
    tracker: IncidentTracker,
}

impl ActionExecutor {
    /// Creates an executor.
    #[must_use]
    pub fn new(alerts: AlertManager, issues: Arc<dyn IssueSink>, tracker: IncidentTracker) -> Self {
        Self {
            alerts,
            issues,
            tracker,
        }
    }

    /// Builds the alert raised for an incident.
    #[must_use]
    pub fn incident_alert(incident: &Incident, config: &AlertConfig) -> Alert {
        let mut alert = Alert::new(
            incident.severity,
            format!("{}: {}", incident.category_name, incident.error.name),
            incident.error.message.clone(),
            ERROR_ALERT_SOURCE,
        )
        .with_metadata("incident", incident.id.as_str())
        .with_metadata("category", incident.category_id.as_str())
        .with_metadata("frequency", incident.frequency)
        .with_metadata("affected_users", incident.affected_users.len())
        .with_metadata("first_seen", incident.first_seen.to_rfc3339())
        .with_metadata("immediate", config.immediate);
        if let Some(path) = &incident.context.path {
            alert = alert.with_metadata("path", path.as_str());
        }
        alert
    }

    /// Runs the category's actions for a sighting.
    pub async fn execute(
        &self,
        incident: &Incident,
        category: &ErrorCategory,
        is_new: bool,
    ) -> ExecutionReport {
        let mut report = ExecutionReport::default();
        if incident.status.is_closed() {
            debug!(incident = %incident.id, status = %incident.status, "closed incident, no actions");
            return report;
        }

        let vars = ConditionVars {
            frequency: incident.frequency,
            affected_users: incident.affected_users.len(),
            severity: incident.severity,
        };

        let mut ignored = false;
        for action in &category.actions {
            let name = action.kind.as_str();
            let is_alert = matches!(action.kind, ActionKind::Alert(_));

            if ignored {
                report.actions.push(ActionRecord {
                    action: name,
                    outcome: ActionOutcome::SkippedIgnored,
                });
                continue;
            }

            if !is_new && !is_alert {
                report.actions.push(ActionRecord {
                    action: name,
                    outcome: ActionOutcome::SkippedOnRepeat,
                });
                continue;
            }

            if let Some(condition) = &action.condition {
                if !condition.evaluate(&vars) {
                    debug!(incident = %incident.id, action = name, condition = %condition, "condition not met");
                    report.actions.push(ActionRecord {
                        action: name,
                        outcome: ActionOutcome::ConditionNotMet,
                    });
                    continue;
                }
            }

            let outcome = match &action.kind {
                ActionKind::Alert(config) => {
                    let alert = Self::incident_alert(incident, config);
                    let dispatch = self.alerts.dispatch(alert, config.channels.as_deref()).await;
                    ActionOutcome::AlertSent {
                        delivered: dispatch.delivered_count(),
                        suppressed: dispatch.suppressed,
                    }
                }
                ActionKind::CreateIssue(config) => {
                    let issue = IssuePayload::for_incident(incident, config);
                    match self.issues.file_issue(&issue).await {
                        Ok(()) => ActionOutcome::IssueFiled,
                        Err(e) => {
                            warn!(
                                incident = %incident.id,
                                sink = %self.issues.name(),
                                error = %e,
                                "failed to file issue"
                            );
                            ActionOutcome::IssueFailed {
                                reason: e.to_string(),
                            }
                        }
                    }
                }
                ActionKind::AutoFix(config) => {
                    info!(
                        incident = %incident.id,
                        strategy = %config.strategy,
                        params = %serde_json::Value::Object(config.params.clone()),
                        "auto-fix requested"
                    );
                    ActionOutcome::AutoFixLogged
                }
                ActionKind::Ignore => {
                    self.tracker
                        .ignore(&incident.id, "ignored by category rule", "triage");
                    ignored = true;
                    ActionOutcome::Ignored
                }
            };
            report.actions.push(ActionRecord {
                action: name,
                outcome,
            });
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::{Action, IssueConfig};
    use crate::error::{IncidentError, Result};
    use crate::tracker::TrackerConfig;
    use crate::types::{ErrorContext, ErrorReport, IncidentStatus};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use triage_alerts::{AlertManagerConfig, LogChannel, Severity};

    #[derive(Debug, Default)]
    struct MemorySink {
        filed: Mutex<Vec<IssuePayload>>,
        fail: bool,
    }

    #[async_trait]
    impl IssueSink for MemorySink {
        fn name(&self) -> &str {
            "memory"
        }

        async fn file_issue(&self, issue: &IssuePayload) -> Result<()> {
            if self.fail {
                return Err(IncidentError::IssueSink {
                    sink: "memory".to_string(),
                    reason: "tracker down".to_string(),
                });
            }
            self.filed.lock().push(issue.clone());
            Ok(())
        }
    }

    fn category(actions: Vec<Action>) -> ErrorCategory {
        ErrorCategory {
            id: "db".to_string(),
            name: "Database".to_string(),
            description: String::new(),
            priority: Severity::High,
            patterns: Vec::new(),
            actions,
        }
    }

    fn issue_action() -> Action {
        Action::new(ActionKind::CreateIssue(IssueConfig {
            project: "platform".to_string(),
            priority: Severity::High,
            labels: Vec::new(),
        }))
    }

    fn alert_action() -> Action {
        Action::new(ActionKind::Alert(AlertConfig {
            channels: Some(vec!["log".to_string()]),
            immediate: true,
        }))
    }

    struct Fixture {
        executor: ActionExecutor,
        tracker: IncidentTracker,
        alerts: AlertManager,
        sink: Arc<MemorySink>,
    }

    fn fixture(fail_sink: bool) -> Fixture {
        let alerts = AlertManager::new(AlertManagerConfig::default());
        alerts.register_channel(Arc::new(LogChannel::new("log")));
        let tracker = IncidentTracker::new(TrackerConfig::default());
        let sink = Arc::new(MemorySink {
            filed: Mutex::new(Vec::new()),
            fail: fail_sink,
        });
        let executor = ActionExecutor::new(alerts.clone(), sink.clone(), tracker.clone());
        Fixture {
            executor,
            tracker,
            alerts,
            sink,
        }
    }

    fn record(tracker: &IncidentTracker, cat: &ErrorCategory, fp: &str) -> (Incident, bool) {
        let cat = Arc::new(cat.clone());
        let sighting = tracker.record(
            fp,
            &ErrorReport::new("QueryError", "relation missing"),
            &ErrorContext::new().path("/orders"),
            || cat,
        );
        (sighting.incident, sighting.is_new)
    }

    #[tokio::test]
    async fn first_sighting_runs_all_actions() {
        let f = fixture(false);
        let cat = category(vec![alert_action(), issue_action()]);
        let (incident, is_new) = record(&f.tracker, &cat, "fp1");

        let report = f.executor.execute(&incident, &cat, is_new).await;

        assert_eq!(report.alerts_sent(), 1);
        assert_eq!(report.issues_filed(), 1);
        assert_eq!(f.sink.filed.lock().len(), 1);
        let alert = &f.alerts.recent_alerts(1)[0];
        assert_eq!(alert.source, ERROR_ALERT_SOURCE);
        assert_eq!(alert.title, "Database: QueryError");
        assert_eq!(alert.metadata["incident"], "fp1");
        assert_eq!(alert.metadata["path"], "/orders");
    }

    #[tokio::test]
    async fn repeat_sighting_runs_only_alerts() {
        let f = fixture(false);
        let cat = category(vec![issue_action(), alert_action()]);
        record(&f.tracker, &cat, "fp1");
        let (incident, is_new) = record(&f.tracker, &cat, "fp1");

        let report = f.executor.execute(&incident, &cat, is_new).await;

        assert_eq!(report.actions[0].outcome, ActionOutcome::SkippedOnRepeat);
        assert!(matches!(report.actions[1].outcome, ActionOutcome::AlertSent { .. }));
        assert!(f.sink.filed.lock().is_empty());
    }

    #[tokio::test]
    async fn guard_condition_skips_action() {
        let f = fixture(false);
        let cat = category(vec![alert_action().when("frequency > 5"), issue_action().when("nonsense ==")]);
        let (incident, is_new) = record(&f.tracker, &cat, "fp1");

        let report = f.executor.execute(&incident, &cat, is_new).await;

        assert!(report.actions.iter().all(|a| a.outcome == ActionOutcome::ConditionNotMet));
        assert!(f.alerts.recent_alerts(1).is_empty());
    }

    #[tokio::test]
    async fn ignore_action_closes_incident() {
        let f = fixture(false);
        let cat = category(vec![Action::new(ActionKind::Ignore), alert_action()]);
        let (incident, is_new) = record(&f.tracker, &cat, "fp1");

        let report = f.executor.execute(&incident, &cat, is_new).await;

        assert!(report.contains(&ActionOutcome::Ignored));
        assert_eq!(report.actions[1].outcome, ActionOutcome::SkippedIgnored);
        assert_eq!(report.alerts_sent(), 0);
        assert!(f.alerts.recent_alerts(1).is_empty(), "ignored incident must not notify");
        assert_eq!(f.tracker.get("fp1").unwrap().status, IncidentStatus::Ignored);

        let (incident, is_new) = record(&f.tracker, &cat, "fp1");
        let report = f.executor.execute(&incident, &cat, is_new).await;
        assert!(report.actions.is_empty());
    }

    #[tokio::test]
    async fn actions_before_ignore_still_run() {
        let f = fixture(false);
        let cat = category(vec![
            issue_action(),
            Action::new(ActionKind::Ignore),
            alert_action(),
            issue_action(),
        ]);
        let (incident, is_new) = record(&f.tracker, &cat, "fp1");

        let report = f.executor.execute(&incident, &cat, is_new).await;

        assert_eq!(report.actions[0].outcome, ActionOutcome::IssueFiled);
        assert_eq!(report.actions[1].outcome, ActionOutcome::Ignored);
        assert_eq!(report.actions[2].outcome, ActionOutcome::SkippedIgnored);
        assert_eq!(report.actions[3].outcome, ActionOutcome::SkippedIgnored);
        assert_eq!(f.sink.filed.lock().len(), 1);
        assert!(f.alerts.recent_alerts(1).is_empty());
    }

    #[tokio::test]
    async fn sink_failure_is_contained() {
        let f = fixture(true);
        let cat = category(vec![issue_action(), alert_action()]);
        let (incident, is_new) = record(&f.tracker, &cat, "fp1");

        let report = f.executor.execute(&incident, &cat, is_new).await;

        assert!(matches!(report.actions[0].outcome, ActionOutcome::IssueFailed { .. }));
        assert_eq!(report.alerts_sent(), 1);
    }

    #[tokio::test]
    async fn auto_fix_only_logs() {
        let f = fixture(false);
        let cat = category(vec![Action::new(ActionKind::AutoFix(crate::category::AutoFixConfig {
            strategy: "restart_pool".to_string(),
            params: serde_json::Map::new(),
        }))]);
        let (incident, is_new) = record(&f.tracker, &cat, "fp1");

        let report = f.executor.execute(&incident, &cat, is_new).await;

        assert_eq!(report.actions[0].outcome, ActionOutcome::AutoFixLogged);
        assert_eq!(f.tracker.get("fp1").unwrap().status, IncidentStatus::New);
    }
}
