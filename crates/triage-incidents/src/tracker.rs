//! Incident tracking: one record per fingerprint.
//!
//! The tracker owns the incident map. [`IncidentTracker::record`] creates or
//! updates an incident in a single critical section, so concurrent reports of
//! the same fingerprint never lose frequency counts or affected users.
//!
//! Severity rules:
//! - At creation severity starts at the category priority, then payment and
//!   security overrides and the user/production context promotions apply
//! - On every sighting of an open incident, crossing the user or frequency
//!   threshold raises severity one step above the creation severity, and
//!   crossing twice a threshold raises it two steps
//! - Severity never decreases

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use triage_alerts::Severity;

use crate::category::ErrorCategory;
use crate::types::{
    Environment, ErrorContext, ErrorReport, Incident, IncidentId, IncidentStats, IncidentStatus,
    Resolution,
};

static PAYMENT_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)(payment|billing)").ok());
static SECURITY_RE: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(
        r"(?i)(unauthori[sz]ed|forbidden|permission denied|access denied|security|csrf|xss|authentication|authorization)",
    )
    .ok()
});

fn mentions(re: &Lazy<Option<Regex>>, error: &ErrorReport) -> bool {
    re.as_ref()
        .is_some_and(|re| re.is_match(&error.name) || re.is_match(&error.message))
}

/// Thresholds for frequency/impact escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationPolicy {
    /// Escalate when more than this many distinct users are affected.
    pub users_threshold: usize,
    /// Escalate when the incident was seen more than this many times.
    pub frequency_threshold: u64,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            users_threshold: 10,
            frequency_threshold: 50,
        }
    }
}

impl EscalationPolicy {
    /// Number of steps above the creation severity warranted by impact.
    #[must_use]
    pub fn steps(&self, affected_users: usize, frequency: u64) -> u8 {
        let doubled_users = self.users_threshold.saturating_mul(2);
        let doubled_frequency = self.frequency_threshold.saturating_mul(2);
        if affected_users > doubled_users || frequency > doubled_frequency {
            2
        } else if affected_users > self.users_threshold || frequency > self.frequency_threshold {
            1
        } else {
            0
        }
    }
}

/// Bounds on the incident map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionPolicy {
    /// Maximum tracked incidents.
    pub max_incidents: usize,
    /// Resolved/ignored incidents idle longer than this are dropped.
    pub closed_retention_hours: u64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_incidents: 10_000,
            closed_retention_hours: 7 * 24,
        }
    }
}

/// Tracker configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Engine environment; the context `production` flag only counts in production.
    pub environment: Environment,
    /// Escalation thresholds.
    pub escalation: EscalationPolicy,
    /// Retention bounds.
    pub retention: RetentionPolicy,
}

/// Computes the severity of a new incident.
#[must_use]
pub fn initial_severity(
    priority: Severity,
    error: &ErrorReport,
    context: &ErrorContext,
    environment: Environment,
) -> Severity {
    if mentions(&PAYMENT_RE, error) {
        return Severity::Critical;
    }

    let mut severity = priority;
    if mentions(&SECURITY_RE, error) {
        severity = severity.max(Severity::High);
    }

    let promote = |s: Severity| match s {
        Severity::Low => Severity::Medium,
        Severity::Medium => Severity::High,
        other => other,
    };
    if context.has_user() {
        severity = promote(severity);
    }
    if context.production && environment.is_production() {
        severity = promote(severity);
    }
    severity
}

/// Result of recording one sighting.
#[derive(Debug, Clone, PartialEq)]
pub struct Sighting {
    /// Incident state after the update.
    pub incident: Incident,
    /// True on the first sighting of the fingerprint.
    pub is_new: bool,
    /// Severity before this sighting, if it escalated.
    pub escalated_from: Option<Severity>,
}

/// Thread-safe incident map.
///
/// Cloning shares the map.
#[derive(Debug, Clone)]
pub struct IncidentTracker {
    config: TrackerConfig,
    incidents: Arc<RwLock<HashMap<IncidentId, Incident>>>,
}

impl IncidentTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            incidents: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Returns the tracker configuration.
    #[must_use]
    pub const fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Records a sighting of `fingerprint`.
    ///
    /// `categorize` runs only when the fingerprint is new.
    pub fn record<F>(
        &self,
        fingerprint: &str,
        error: &ErrorReport,
        context: &ErrorContext,
        categorize: F,
    ) -> Sighting
    where
        F: FnOnce() -> Arc<ErrorCategory>,
    {
        let now = Utc::now();
        let mut incidents = self.incidents.write();

        if let Some(incident) = incidents.get_mut(fingerprint) {
            incident.frequency += 1;
            incident.last_seen = now;
            if let Some(user) = context.user_id.as_ref().filter(|u| !u.trim().is_empty()) {
                incident.affected_users.insert(user.clone());
            }

            let before = incident.severity;
            if !incident.status.is_closed() {
                self.escalate(incident);
            }
            let escalated_from = (incident.severity > before).then_some(before);
            if let Some(from) = escalated_from {
                info!(
                    incident = %incident.id,
                    from = %from,
                    to = %incident.severity,
                    frequency = incident.frequency,
                    affected_users = incident.affected_users.len(),
                    "incident escalated"
                );
            } else {
                debug!(incident = %incident.id, frequency = incident.frequency, "incident seen again");
            }

            return Sighting {
                incident: incident.clone(),
                is_new: false,
                escalated_from,
            };
        }

        let category = categorize();
        let severity = initial_severity(category.priority, error, context, self.config.environment);
        let affected_users: BTreeSet<String> = context
            .user_id
            .iter()
            .filter(|u| !u.trim().is_empty())
            .cloned()
            .collect();

        let mut incident = Incident {
            id: fingerprint.to_string(),
            error: error.clone(),
            category_id: category.id.clone(),
            category_name: category.name.clone(),
            severity,
            baseline_severity: severity,
            frequency: 1,
            first_seen: now,
            last_seen: now,
            affected_users,
            context: context.clone(),
            status: IncidentStatus::New,
            resolution: None,
        };
        self.escalate(&mut incident);

        info!(
            incident = %incident.id,
            category = %incident.category_id,
            severity = %incident.severity,
            error_name = %incident.error.name,
            "incident created"
        );

        incidents.insert(incident.id.clone(), incident.clone());
        if incidents.len() > self.config.retention.max_incidents {
            Self::evict_one(&mut incidents, &incident.id);
        }

        Sighting {
            incident,
            is_new: true,
            escalated_from: None,
        }
    }

    fn escalate(&self, incident: &mut Incident) {
        let steps = self
            .config
            .escalation
            .steps(incident.affected_users.len(), incident.frequency);
        let target = incident.baseline_severity.escalate_by(steps);
        incident.severity = incident.severity.max(target);
    }

    /// Drops the least recently seen incident, preferring closed ones.
    fn evict_one(incidents: &mut HashMap<IncidentId, Incident>, keep: &str) {
        let victim = incidents
            .values()
            .filter(|i| i.id != keep)
            .min_by_key(|i| (!i.status.is_closed(), i.last_seen))
            .map(|i| i.id.clone());
        if let Some(id) = victim {
            warn!(incident = %id, "incident evicted by retention limit");
            incidents.remove(&id);
        }
    }

    /// Returns an incident.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Incident> {
        self.incidents.read().get(id).cloned()
    }

    /// Returns all incidents, most recently seen first.
    #[must_use]
    pub fn all(&self) -> Vec<Incident> {
        let mut all: Vec<Incident> = self.incidents.read().values().cloned().collect();
        all.sort_by(|a, b| b.last_seen.cmp(&a.last_seen).then_with(|| a.id.cmp(&b.id)));
        all
    }

    /// Number of tracked incidents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.incidents.read().len()
    }

    /// Returns true if no incident is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.incidents.read().is_empty()
    }

    fn close(
        &self,
        id: &str,
        status: IncidentStatus,
        action: &str,
        description: &str,
        by: &str,
    ) -> bool {
        let mut incidents = self.incidents.write();
        let Some(incident) = incidents.get_mut(id) else {
            return false;
        };
        if incident.status == status {
            return true;
        }
        incident.status = status;
        incident.resolution = Some(Resolution {
            action: action.to_string(),
            description: description.to_string(),
            resolved_at: Utc::now(),
            resolved_by: by.to_string(),
        });
        info!(incident = %id, status = %status, by = %by, "incident closed");
        true
    }

    /// Resolves an incident. Returns `false` if it is unknown.
    pub fn resolve(&self, id: &str, action: &str, description: &str, resolved_by: &str) -> bool {
        self.close(id, IncidentStatus::Resolved, action, description, resolved_by)
    }

    /// Ignores an incident. Returns `false` if it is unknown.
    pub fn ignore(&self, id: &str, reason: &str, ignored_by: &str) -> bool {
        self.close(id, IncidentStatus::Ignored, "ignored", reason, ignored_by)
    }

    /// Moves a new incident to investigating.
    ///
    /// Returns `false` if the incident is unknown or not new.
    pub fn mark_investigating(&self, id: &str) -> bool {
        let mut incidents = self.incidents.write();
        match incidents.get_mut(id) {
            Some(incident) if incident.status == IncidentStatus::New => {
                incident.status = IncidentStatus::Investigating;
                true
            }
            _ => false,
        }
    }

    /// Returns aggregate statistics.
    #[must_use]
    pub fn stats(&self) -> IncidentStats {
        let incidents = self.incidents.read();
        let mut stats = IncidentStats {
            total_incidents: incidents.len(),
            ..IncidentStats::default()
        };
        let mut users = BTreeSet::new();

        for incident in incidents.values() {
            stats.total_occurrences += incident.frequency;
            *stats.by_status.entry(incident.status).or_default() += 1;
            *stats.by_severity.entry(incident.severity).or_default() += 1;
            *stats
                .by_category
                .entry(incident.category_id.clone())
                .or_default() += 1;
            users.extend(incident.affected_users.iter().map(String::as_str));
        }
        stats.affected_users = users.len();
        stats
    }

    /// Applies retention: drops idle closed incidents, then trims to the
    /// maximum count. Returns the number removed.
    pub fn prune(&self) -> usize {
        self.prune_at(Utc::now())
    }

    fn prune_at(&self, now: DateTime<Utc>) -> usize {
        let retention = self.config.retention;
        let cutoff = i64::try_from(retention.closed_retention_hours)
            .ok()
            .and_then(chrono::Duration::try_hours)
            .and_then(|age| now.checked_sub_signed(age));

        let mut incidents = self.incidents.write();
        let before = incidents.len();

        if let Some(cutoff) = cutoff {
            incidents.retain(|_, i| !(i.status.is_closed() && i.last_seen < cutoff));
        }

        if incidents.len() > retention.max_incidents {
            let mut order: Vec<(bool, DateTime<Utc>, IncidentId)> = incidents
                .values()
                .map(|i| (!i.status.is_closed(), i.last_seen, i.id.clone()))
                .collect();
            order.sort();
            let excess = incidents.len() - retention.max_incidents;
            for (_, _, id) in order.into_iter().take(excess) {
                incidents.remove(&id);
            }
        }

        let removed = before - incidents.len();
        if removed > 0 {
            info!(removed, remaining = incidents.len(), "pruned incidents");
        }
        removed
    }
}

impl Default for IncidentTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::CategoryRuleSet;
    use crate::fingerprint::fingerprint;

    fn low_category() -> Arc<ErrorCategory> {
        let mut category = ErrorCategory::uncategorized();
        category.id = "ui_errors".to_string();
        category.name = "UI Errors".to_string();
        category.priority = Severity::Low;
        Arc::new(category)
    }

    fn report(tracker: &IncidentTracker, error: &ErrorReport, ctx: &ErrorContext) -> Sighting {
        let fp = fingerprint(error, ctx);
        tracker.record(&fp, error, ctx, low_category)
    }

    mod creation_tests {
        use super::*;
        use test_case::test_case;

        #[test]
        fn first_sighting_creates_incident() {
            let tracker = IncidentTracker::default();
            let error = ErrorReport::new("TypeError", "x is undefined");

            let sighting = report(&tracker, &error, &ErrorContext::new().path("/a"));

            assert!(sighting.is_new);
            assert_eq!(sighting.incident.frequency, 1);
            assert_eq!(sighting.incident.severity, Severity::Low);
            assert_eq!(sighting.incident.status, IncidentStatus::New);
            assert!(sighting.incident.affected_users.is_empty());
            assert_eq!(tracker.len(), 1);
        }

        #[test]
        fn categorize_runs_once() {
            let tracker = IncidentTracker::default();
            let error = ErrorReport::new("E", "m");
            let ctx = ErrorContext::new();
            let calls = std::cell::Cell::new(0);

            for _ in 0..3 {
                tracker.record("fp", &error, &ctx, || {
                    calls.set(calls.get() + 1);
                    low_category()
                });
            }

            assert_eq!(calls.get(), 1);
            assert_eq!(tracker.get("fp").unwrap().frequency, 3);
        }

        #[test_case("Error", "payment failed" ; "plain word")]
        #[test_case("PaymentError", "card declined" ; "error name")]
        #[test_case("Error", "Payments API returned 500" ; "plural")]
        #[test_case("BillingServiceError", "timeout" ; "compound name")]
        #[test_case("Error", "checkout:billing-address invalid" ; "punctuated")]
        fn payment_text_forces_critical(name: &str, message: &str) {
            let sev = initial_severity(
                Severity::Low,
                &ErrorReport::new(name, message),
                &ErrorContext::new(),
                Environment::Development,
            );
            assert_eq!(sev, Severity::Critical);
        }

        #[test_case("Error", "403 Forbidden" ; "status text")]
        #[test_case("UnauthorizedError", "token rejected" ; "error name")]
        #[test_case("AuthenticationFailed", "bad password" ; "compound name")]
        #[test_case("Error", "SecurityException thrown" ; "embedded word")]
        fn security_text_forces_at_least_high(name: &str, message: &str) {
            let sev = initial_severity(
                Severity::Low,
                &ErrorReport::new(name, message),
                &ErrorContext::new(),
                Environment::Development,
            );
            assert_eq!(sev, Severity::High);
        }

        #[test]
        fn unrelated_text_keeps_priority() {
            let sev = initial_severity(
                Severity::Low,
                &ErrorReport::new("TypeError", "x is undefined"),
                &ErrorContext::new(),
                Environment::Development,
            );
            assert_eq!(sev, Severity::Low);
        }

        #[test]
        fn user_and_production_each_promote_once() {
            let error = ErrorReport::new("E", "m");
            let ctx = ErrorContext::new().user("u1").production(true);

            assert_eq!(
                initial_severity(Severity::Low, &error, &ctx, Environment::Production),
                Severity::High
            );
            assert_eq!(
                initial_severity(Severity::Low, &error, &ctx, Environment::Staging),
                Severity::Medium
            );
            assert_eq!(
                initial_severity(Severity::High, &error, &ctx, Environment::Production),
                Severity::High
            );
        }
    }

    mod repeat_tests {
        use super::*;

        #[test]
        fn frequency_and_users_accumulate() {
            let tracker = IncidentTracker::default();
            let error = ErrorReport::new("TypeError", "Cannot read property 'id' of undefined");

            let mut last = None;
            for user in ["u1", "u2", "u3", "u2"] {
                last = Some(report(&tracker, &error, &ErrorContext::new().path("/checkout").user(user)));
            }
            let incident = last.unwrap().incident;

            assert_eq!(tracker.len(), 1);
            assert_eq!(incident.frequency, 4);
            assert_eq!(incident.affected_user_count(), 3);
            assert!(incident.last_seen >= incident.first_seen);
        }

        #[test]
        fn eleven_users_escalate_low_to_medium() {
            let tracker = IncidentTracker::default();
            let error = ErrorReport::new("TypeError", "boom");
            let ctx = ErrorContext::new().path("/x");
            let fp = fingerprint(&error, &ctx);

            let mut sighting = None;
            for i in 0..11 {
                let ctx = ctx.clone().user(format!("user-{i}"));
                sighting = Some(tracker.record(&fp, &error, &ctx, low_category));
            }
            let sighting = sighting.unwrap();

            assert_eq!(sighting.incident.affected_user_count(), 11);
            assert!(sighting.incident.severity >= Severity::Medium);
            // user present at creation already promoted low to medium
            assert_eq!(sighting.incident.baseline_severity, Severity::Medium);
            assert_eq!(sighting.escalated_from, Some(Severity::Medium));
            assert_eq!(sighting.incident.severity, Severity::High);
        }

        #[test]
        fn doubled_threshold_escalates_two_steps() {
            let tracker = IncidentTracker::new(TrackerConfig {
                escalation: EscalationPolicy {
                    users_threshold: 10,
                    frequency_threshold: 2,
                },
                ..TrackerConfig::default()
            });
            let error = ErrorReport::new("E", "m");
            let ctx = ErrorContext::new();

            for _ in 0..5 {
                tracker.record("fp", &error, &ctx, low_category);
            }

            assert_eq!(tracker.get("fp").unwrap().severity, Severity::High);
        }

        #[test]
        fn closed_incidents_count_but_do_not_escalate() {
            let tracker = IncidentTracker::new(TrackerConfig {
                escalation: EscalationPolicy {
                    users_threshold: 10,
                    frequency_threshold: 1,
                },
                ..TrackerConfig::default()
            });
            let error = ErrorReport::new("E", "m");
            let ctx = ErrorContext::new();
            tracker.record("fp", &error, &ctx, low_category);
            assert!(tracker.resolve("fp", "fixed", "deployed fix", "alice"));

            let sighting = tracker.record("fp", &error, &ctx, low_category);

            assert_eq!(sighting.incident.frequency, 2);
            assert_eq!(sighting.incident.severity, Severity::Low);
            assert_eq!(sighting.incident.status, IncidentStatus::Resolved);
        }
    }

    mod lifecycle_tests {
        use super::*;

        #[test]
        fn resolve_ignore_and_investigate() {
            let tracker = IncidentTracker::default();
            let error = ErrorReport::new("E", "m");
            tracker.record("a", &error, &ErrorContext::new(), low_category);
            tracker.record("b", &error, &ErrorContext::new(), low_category);

            assert!(tracker.mark_investigating("a"));
            assert!(!tracker.mark_investigating("a"));
            assert!(tracker.resolve("a", "fixed", "patched", "bob"));
            assert!(tracker.ignore("b", "known flake", "bob"));
            assert!(!tracker.resolve("missing", "fixed", "", "bob"));

            let a = tracker.get("a").unwrap();
            assert_eq!(a.status, IncidentStatus::Resolved);
            assert_eq!(a.resolution.unwrap().resolved_by, "bob");
            assert_eq!(tracker.get("b").unwrap().status, IncidentStatus::Ignored);
        }

        #[test]
        fn stats_aggregate() {
            let tracker = IncidentTracker::default();
            let rules = CategoryRuleSet::builtin().unwrap();
            let err = ErrorReport::new("TypeError", "Cannot read property 'id' of undefined");
            for user in ["u1", "u2"] {
                let ctx = ErrorContext::new().path("/checkout").user(user);
                let fp = fingerprint(&err, &ctx);
                tracker.record(&fp, &err, &ctx, || rules.match_error(&err, &ctx));
            }
            tracker.record("other", &ErrorReport::new("E", "m"), &ErrorContext::new().user("u1"), low_category);

            let stats = tracker.stats();
            assert_eq!(stats.total_incidents, 2);
            assert_eq!(stats.total_occurrences, 3);
            assert_eq!(stats.affected_users, 2);
            assert_eq!(stats.by_category["ui_errors"], 2);
            assert_eq!(stats.by_status[&IncidentStatus::New], 2);
        }
    }

    mod retention_tests {
        use super::*;

        #[test]
        fn old_closed_incidents_are_pruned() {
            let tracker = IncidentTracker::new(TrackerConfig {
                retention: RetentionPolicy {
                    max_incidents: 100,
                    closed_retention_hours: 1,
                },
                ..TrackerConfig::default()
            });
            let error = ErrorReport::new("E", "m");
            tracker.record("open", &error, &ErrorContext::new(), low_category);
            tracker.record("closed", &error, &ErrorContext::new(), low_category);
            tracker.resolve("closed", "fixed", "", "ops");

            let later = Utc::now() + chrono::Duration::hours(2);
            assert_eq!(tracker.prune_at(later), 1);
            assert!(tracker.get("open").is_some());
            assert!(tracker.get("closed").is_none());
        }

        #[test]
        fn max_incidents_evicts_closed_first() {
            let tracker = IncidentTracker::new(TrackerConfig {
                retention: RetentionPolicy {
                    max_incidents: 2,
                    closed_retention_hours: 1_000,
                },
                ..TrackerConfig::default()
            });
            let error = ErrorReport::new("E", "m");
            tracker.record("a", &error, &ErrorContext::new(), low_category);
            tracker.record("b", &error, &ErrorContext::new(), low_category);
            tracker.ignore("b", "noise", "ops");
            tracker.record("c", &error, &ErrorContext::new(), low_category);

            assert_eq!(tracker.len(), 2);
            assert!(tracker.get("b").is_none());
            assert!(tracker.get("a").is_some());
            assert!(tracker.get("c").is_some());
        }
    }

    #[test]
    fn escalation_steps() {
        let policy = EscalationPolicy::default();
        assert_eq!(policy.steps(10, 50), 0);
        assert_eq!(policy.steps(11, 1), 1);
        assert_eq!(policy.steps(1, 51), 1);
        assert_eq!(policy.steps(21, 1), 2);
        assert_eq!(policy.steps(1, 101), 2);
    }
}
