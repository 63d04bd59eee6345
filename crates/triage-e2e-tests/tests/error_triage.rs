//! End-to-end tests for error triage (triage-incidents through triage-engine).
//!
//! These tests verify:
//! 1. Repeated errors collapse into one incident
//! 2. Category matching and severity overrides
//! 3. Escalation by affected users and frequency
//! 4. Category actions reaching channels and the issue tracker
//! 5. Incident lifecycle

mod helpers;

use helpers::{CHAT_URL, EMAIL_URL, ISSUES_URL, SMS_URL, TestEngine, WEBHOOK_URL};
use triage_alerts::Severity;
use triage_incidents::{ErrorContext, ErrorReport, IncidentStatus};

// ============================================================================
// Deduplication
// ============================================================================

#[tokio::test]
async fn test_checkout_type_error_scenario() {
    let t = TestEngine::new();
    let error = ErrorReport::new("TypeError", "Cannot read property 'id' of undefined");

    let mut ids = Vec::new();
    for user in ["alice", "bob", "carol"] {
        let id = t
            .engine
            .report_error(error.clone(), None, ErrorContext::new().path("/checkout"), Some(user))
            .await;
        ids.push(id);
    }

    assert!(ids.iter().all(|id| *id == ids[0]), "one incident for all reports");
    assert_eq!(t.engine.all_incidents().len(), 1);

    let incident = t.engine.incident(&ids[0]).unwrap();
    assert_eq!(incident.frequency, 3);
    assert_eq!(incident.affected_user_count(), 3);
    assert_eq!(incident.category_id, "ui_errors");
    assert!(incident.severity >= Severity::Medium);
    assert!(incident.last_seen >= incident.first_seen);
}

#[tokio::test]
async fn test_embedded_ids_share_an_incident() {
    let t = TestEngine::new();

    let a = t
        .engine
        .report_error(
            ErrorReport::new("NotFoundError", "order 12345 not found"),
            None,
            ErrorContext::new().path("/orders"),
            None,
        )
        .await;
    let b = t
        .engine
        .report_error(
            ErrorReport::new("NotFoundError", "order 98 not found"),
            None,
            ErrorContext::new().path("/orders"),
            None,
        )
        .await;
    let c = t
        .engine
        .report_error(
            ErrorReport::new("NotFoundError", "order 98 not found"),
            None,
            ErrorContext::new().path("/account"),
            None,
        )
        .await;

    assert_eq!(a, b);
    assert_ne!(a, c, "a different path is a different incident");
    assert_eq!(t.engine.incident(&a).unwrap().frequency, 2);
}

// ============================================================================
// Categories and severity
// ============================================================================

#[tokio::test]
async fn test_payment_failure_is_critical_everywhere() {
    let t = TestEngine::new();

    let outcome = t
        .engine
        .report(
            ErrorReport::new("Error", "Payment failed: card declined"),
            None,
            ErrorContext::new().path("/checkout/pay"),
            Some("alice"),
        )
        .await;

    assert_eq!(outcome.incident.category_id, "payment_errors");
    assert_eq!(outcome.incident.severity, Severity::Critical);

    // critical alerts reach every channel
    for url in [EMAIL_URL, CHAT_URL, SMS_URL, WEBHOOK_URL] {
        assert_eq!(t.sent_to(url).len(), 1, "expected one request to {url}");
    }

    let issues = t.sent_to(ISSUES_URL);
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].body["project"], "payments");
    let labels = issues[0].body["labels"].as_array().unwrap();
    assert!(labels.iter().any(|l| l == "payment_errors"));
}

#[tokio::test]
async fn test_security_text_is_at_least_high() {
    let t = TestEngine::new();

    let outcome = t
        .engine
        .report(
            ErrorReport::new("Error", "Permission denied for resource"),
            None,
            ErrorContext::new(),
            None,
        )
        .await;

    assert_eq!(outcome.incident.category_id, "auth_errors");
    assert!(outcome.incident.severity >= Severity::High);
}

#[tokio::test]
async fn test_category_hint_bypasses_matching() {
    let t = TestEngine::new();

    let outcome = t
        .engine
        .report(
            ErrorReport::new("Error", "Cannot read property 'x' of undefined"),
            Some("third_party_errors"),
            ErrorContext::new(),
            None,
        )
        .await;

    assert_eq!(outcome.incident.category_id, "third_party_errors");
}

#[tokio::test]
async fn test_unmatched_error_is_uncategorized() {
    let t = TestEngine::new();

    let outcome = t
        .engine
        .report(ErrorReport::new("Weird", "zzz"), None, ErrorContext::new(), None)
        .await;

    assert_eq!(outcome.incident.category_id, "uncategorized");
    assert_eq!(outcome.incident.severity, Severity::Medium);
    assert_eq!(t.sent_to(ISSUES_URL)[0].body["project"], "triage");
}

// ============================================================================
// Escalation
// ============================================================================

#[tokio::test]
async fn test_eleven_users_escalate_low_category() {
    let t = TestEngine::new();
    let error = ErrorReport::new("ValidationError", "invalid email");

    let mut last = None;
    for i in 0..11 {
        let user = format!("user-{i}");
        last = Some(
            t.engine
                .report(error.clone(), None, ErrorContext::new().path("/signup"), Some(&user))
                .await,
        );
    }

    let incident = last.unwrap().incident;
    assert_eq!(incident.category_id, "validation_errors");
    assert_eq!(incident.affected_user_count(), 11);
    assert!(incident.severity >= Severity::Medium);
    assert!(incident.severity > incident.baseline_severity);
}

#[tokio::test]
async fn test_frequency_escalation_and_guarded_alert() {
    let t = TestEngine::new();
    let error = ErrorReport::new("ValidationError", "invalid email");

    let mut severities = Vec::new();
    for _ in 0..101 {
        let outcome = t
            .engine
            .report(error.clone(), None, ErrorContext::new(), None)
            .await;
        severities.push(outcome.incident.severity);
    }

    assert_eq!(severities[0], Severity::Low);
    assert_eq!(severities[50], Severity::Medium, "51 sightings cross the threshold");
    assert_eq!(severities[100], Severity::High, "101 sightings cross twice the threshold");
    assert!(severities.windows(2).all(|w| w[0] <= w[1]), "severity never decreases");

    // validation alerts only fire past 100 sightings, to the webhook
    let hooks = t.sent_to(WEBHOOK_URL);
    assert_eq!(hooks.len(), 1);
    assert_eq!(hooks[0].body["alert"]["severity"], "high");
    assert!(t.sent_to(CHAT_URL).is_empty());
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_resolved_incident_stays_quiet() {
    let t = TestEngine::with_cooldown(0);
    let error = ErrorReport::new("Error", "Payment failed");

    let id = t
        .engine
        .report_error(error.clone(), None, ErrorContext::new(), None)
        .await;
    assert_eq!(t.sent_to(WEBHOOK_URL).len(), 1);

    assert!(t.engine.resolve_incident(&id, "fixed", "retry on 502", "oncall"));
    t.engine
        .report_error(error, None, ErrorContext::new(), None)
        .await;

    let incident = t.engine.incident(&id).unwrap();
    assert_eq!(incident.status, IncidentStatus::Resolved);
    assert_eq!(incident.frequency, 2);
    assert_eq!(incident.resolution.unwrap().resolved_by, "oncall");
    assert_eq!(t.sent_to(WEBHOOK_URL).len(), 1, "no alert after resolution");
}

#[tokio::test]
async fn test_error_stats() {
    let t = TestEngine::new();
    t.engine
        .report_error(ErrorReport::new("Error", "fetch failed"), None, ErrorContext::new(), Some("a"))
        .await;
    t.engine
        .report_error(ErrorReport::new("Error", "fetch failed"), None, ErrorContext::new(), Some("b"))
        .await;
    let id = t
        .engine
        .report_error(ErrorReport::new("Error", "deadlock detected"), None, ErrorContext::new(), None)
        .await;
    assert!(t.engine.ignore_incident(&id, "known", "oncall"));

    let stats = t.engine.error_stats();
    assert_eq!(stats.total_incidents, 2);
    assert_eq!(stats.total_occurrences, 3);
    assert_eq!(stats.affected_users, 2);
    assert_eq!(stats.by_category.get("network_errors"), Some(&1));
    assert_eq!(stats.by_status.get(&IncidentStatus::Ignored), Some(&1));
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reports_lose_no_sightings() {
    let t = TestEngine::new();
    let error = ErrorReport::new("TypeError", "Cannot read property 'total' of undefined");

    let tasks = (0..64).map(|i| {
        let engine = t.engine.clone();
        let error = error.clone();
        tokio::spawn(async move {
            let user = format!("shopper-{}", i % 16);
            engine
                .report_error(error, None, ErrorContext::new().path("/cart"), Some(&user))
                .await
        })
    });
    let ids: Vec<_> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

    assert!(ids.iter().all(|id| *id == ids[0]));
    assert_eq!(t.engine.all_incidents().len(), 1);

    let incident = t.engine.incident(&ids[0]).unwrap();
    assert_eq!(incident.frequency, 64);
    assert_eq!(incident.affected_user_count(), 16);
    assert_eq!(t.engine.error_stats().total_occurrences, 64);
}
