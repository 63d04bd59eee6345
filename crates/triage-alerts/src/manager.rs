//! Alert manager: rate limiting, routing and concurrent delivery.
//!
//! [`AlertManager`] is the single entry point for outbound alerts. For each
//! alert it:
//! 1. Checks the `source|title` cooldown and drops the alert if suppressed
//! 2. Records the attempt time and appends the alert to history
//! 3. Resolves target channels (explicit list or severity routing)
//! 4. Sends to every enabled target concurrently, each under a timeout
//! 5. Returns a [`DispatchReport`] with one outcome per target

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::channels::AlertChannel;
use crate::types::{Alert, Severity};

/// Number of rate-limit keys kept before expired keys are swept.
const RATE_LIMIT_SWEEP_AT: usize = 1_024;

/// Returns `now - hours`, or `None` if that is out of range.
fn cutoff_hours_ago(hours: u64) -> Option<DateTime<Utc>> {
    let hours = i64::try_from(hours).ok()?;
    Utc::now().checked_sub_signed(chrono::Duration::try_hours(hours)?)
}

/// Channel names targeted per severity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityRouting {
    /// Targets for low alerts.
    pub low: Vec<String>,
    /// Targets for medium alerts.
    pub medium: Vec<String>,
    /// Targets for high alerts.
    pub high: Vec<String>,
    /// Targets for critical alerts.
    pub critical: Vec<String>,
}

impl Default for SeverityRouting {
    fn default() -> Self {
        let names = |list: &[&str]| list.iter().map(ToString::to_string).collect();
        Self {
            low: names(&["webhook"]),
            medium: names(&["chat", "webhook"]),
            high: names(&["email", "chat", "webhook"]),
            critical: names(&["email", "chat", "sms", "webhook"]),
        }
    }
}

impl SeverityRouting {
    /// Returns the channel names for a severity.
    #[must_use]
    pub fn targets(&self, severity: Severity) -> &[String] {
        match severity {
            Severity::Low => &self.low,
            Severity::Medium => &self.medium,
            Severity::High => &self.high,
            Severity::Critical => &self.critical,
        }
    }
}

/// Configuration for the alert manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertManagerConfig {
    /// Minimum time between two sends with the same `source|title`.
    pub cooldown_ms: u64,
    /// Upper bound on a single channel send.
    pub channel_timeout_ms: u64,
    /// Alerts older than this are dropped from history.
    pub history_max_age_hours: u64,
    /// Maximum number of alerts kept in history.
    pub history_max_entries: usize,
    /// Severity to channel routing table.
    pub routing: SeverityRouting,
}

impl Default for AlertManagerConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: 5 * 60 * 1000,
            channel_timeout_ms: 10_000,
            history_max_age_hours: 24,
            history_max_entries: 1_000,
            routing: SeverityRouting::default(),
        }
    }
}

impl AlertManagerConfig {
    /// Sets the cooldown.
    #[must_use]
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown_ms = u64::try_from(cooldown.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the per-channel timeout.
    #[must_use]
    pub fn with_channel_timeout(mut self, timeout: Duration) -> Self {
        self.channel_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the history bound.
    #[must_use]
    pub const fn with_history_max_entries(mut self, max: usize) -> Self {
        self.history_max_entries = max;
        self
    }

    /// Returns the cooldown as a duration.
    #[must_use]
    pub const fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    /// Returns the channel timeout as a duration.
    #[must_use]
    pub const fn channel_timeout(&self) -> Duration {
        Duration::from_millis(self.channel_timeout_ms)
    }
}

/// What happened to an alert on one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// The provider accepted the alert.
    Delivered,
    /// The channel was not invoked or chose not to deliver.
    Skipped {
        /// Why the channel was skipped.
        reason: String,
    },
    /// The send failed.
    Failed {
        /// Failure description.
        reason: String,
    },
    /// The send did not finish within the channel timeout.
    TimedOut,
}

/// Outcome for one target channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelOutcome {
    /// Channel name.
    pub channel: String,
    /// Delivery status.
    #[serde(flatten)]
    pub status: DeliveryStatus,
}

/// Result of dispatching one alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReport {
    /// The alert id.
    pub alert_id: String,
    /// True if the alert was dropped by the rate limiter.
    pub suppressed: bool,
    /// One entry per target channel.
    pub outcomes: Vec<ChannelOutcome>,
}

impl DispatchReport {
    fn suppressed(alert_id: String) -> Self {
        Self {
            alert_id,
            suppressed: true,
            outcomes: Vec::new(),
        }
    }

    /// Number of channels that delivered the alert.
    #[must_use]
    pub fn delivered_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == DeliveryStatus::Delivered)
            .count()
    }

    /// Number of channels that failed or timed out.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| {
                matches!(
                    o.status,
                    DeliveryStatus::Failed { .. } | DeliveryStatus::TimedOut
                )
            })
            .count()
    }

    /// Returns the status for a channel, if it was targeted.
    #[must_use]
    pub fn status_of(&self, channel: &str) -> Option<&DeliveryStatus> {
        self.outcomes
            .iter()
            .find(|o| o.channel == channel)
            .map(|o| &o.status)
    }
}

/// Per-channel delivery counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelCounters {
    /// Successful deliveries.
    pub delivered: u64,
    /// Failed deliveries (including timeouts).
    pub failed: u64,
}

#[derive(Debug, Default)]
struct DeliveryCounters {
    suppressed: u64,
    timed_out: u64,
    per_channel: BTreeMap<String, ChannelCounters>,
}

/// Aggregate alert statistics over the history window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertStats {
    /// Alerts in history.
    pub total: usize,
    /// Alerts in history by severity.
    pub by_severity: BTreeMap<Severity, usize>,
    /// Resolved alerts in history.
    pub resolved: usize,
    /// Unresolved alerts in history.
    pub unresolved: usize,
    /// Alerts dropped by the rate limiter since startup.
    pub suppressed: u64,
    /// Successful channel deliveries since startup.
    pub delivered: u64,
    /// Failed channel deliveries since startup.
    pub failed: u64,
    /// Channel sends that timed out since startup.
    pub timed_out: u64,
    /// Delivery counters per channel.
    pub per_channel: BTreeMap<String, ChannelCounters>,
}

/// Rate-limited, severity-routed alert dispatcher.
///
/// Cloning shares channels, history and counters.
#[derive(Debug, Clone)]
pub struct AlertManager {
    config: AlertManagerConfig,
    /// Registered channels by name.
    channels: Arc<RwLock<BTreeMap<String, Arc<dyn AlertChannel>>>>,
    /// Sent alerts, oldest first.
    history: Arc<RwLock<VecDeque<Alert>>>,
    /// Last send attempt per `source|title`.
    last_sent: Arc<Mutex<HashMap<String, Instant>>>,
    counters: Arc<Mutex<DeliveryCounters>>,
}

impl AlertManager {
    /// Creates an alert manager with no channels.
    #[must_use]
    pub fn new(config: AlertManagerConfig) -> Self {
        Self {
            config,
            channels: Arc::new(RwLock::new(BTreeMap::new())),
            history: Arc::new(RwLock::new(VecDeque::new())),
            last_sent: Arc::new(Mutex::new(HashMap::new())),
            counters: Arc::new(Mutex::new(DeliveryCounters::default())),
        }
    }

    /// Returns the manager configuration.
    #[must_use]
    pub const fn config(&self) -> &AlertManagerConfig {
        &self.config
    }

    // ============ Channels ============

    /// Registers a channel. Returns `false` if the name is taken.
    pub fn register_channel(&self, channel: Arc<dyn AlertChannel>) -> bool {
        let name = channel.name().to_string();
        let mut channels = self.channels.write();
        if channels.contains_key(&name) {
            warn!(channel = %name, "channel already registered");
            return false;
        }
        info!(channel = %name, enabled = channel.is_enabled(), "registered alert channel");
        channels.insert(name, channel);
        true
    }

    /// Removes a channel. Returns `true` if it existed.
    pub fn unregister_channel(&self, name: &str) -> bool {
        self.channels.write().remove(name).is_some()
    }

    /// Returns the registered channel names.
    #[must_use]
    pub fn channel_names(&self) -> Vec<String> {
        self.channels.read().keys().cloned().collect()
    }

    // ============ Dispatch ============

    /// Sends an alert to the channels routed for its severity.
    pub async fn send_alert(&self, alert: Alert) -> DispatchReport {
        self.dispatch(alert, None).await
    }

    /// Sends an alert to an explicit list of channels.
    pub async fn send_alert_to(&self, alert: Alert, channels: &[String]) -> DispatchReport {
        self.dispatch(alert, Some(channels)).await
    }

    /// Sends an alert, optionally overriding severity routing.
    pub async fn dispatch(&self, alert: Alert, channels: Option<&[String]>) -> DispatchReport {
        let key = alert.rate_limit_key();
        if !self.try_acquire(&key) {
            self.counters.lock().suppressed += 1;
            info!(alert_id = %alert.id, key = %key, "alert suppressed by rate limit");
            return DispatchReport::suppressed(alert.id);
        }

        let targets: Vec<String> = channels.map_or_else(
            || self.config.routing.targets(alert.severity).to_vec(),
            <[String]>::to_vec,
        );
        self.record_history(alert.clone());

        let (runnable, mut outcomes) = self.resolve_targets(&targets);
        let alert = Arc::new(alert);
        let timeout = self.config.channel_timeout();

        let (names, handles): (Vec<String>, Vec<_>) = runnable
            .into_iter()
            .map(|channel| {
                let alert = Arc::clone(&alert);
                let name = channel.name().to_string();
                let handle = tokio::spawn(async move {
                    match tokio::time::timeout(timeout, channel.send(&alert)).await {
                        Ok(Ok(result)) if result.skipped => DeliveryStatus::Skipped {
                            reason: result.message.unwrap_or_default(),
                        },
                        Ok(Ok(result)) if result.success => DeliveryStatus::Delivered,
                        Ok(Ok(result)) => DeliveryStatus::Failed {
                            reason: result
                                .message
                                .unwrap_or_else(|| "delivery failed".to_string()),
                        },
                        Ok(Err(e)) => DeliveryStatus::Failed {
                            reason: e.to_string(),
                        },
                        Err(_) => DeliveryStatus::TimedOut,
                    }
                });
                (name, handle)
            })
            .unzip();

        let results = join_all(handles).await;
        for (channel, joined) in names.into_iter().zip(results) {
            let status = joined.unwrap_or_else(|e| DeliveryStatus::Failed {
                reason: format!("channel task aborted: {e}"),
            });
            outcomes.push(ChannelOutcome { channel, status });
        }

        self.count_outcomes(&alert, &outcomes);

        DispatchReport {
            alert_id: alert.id.clone(),
            suppressed: false,
            outcomes,
        }
    }

    /// Checks and records the cooldown for `key` in one critical section.
    fn try_acquire(&self, key: &str) -> bool {
        let cooldown = self.config.cooldown();
        let now = Instant::now();
        let mut last_sent = self.last_sent.lock();

        match last_sent.get(key) {
            Some(prev) if now.duration_since(*prev) < cooldown => return false,
            _ => {}
        }
        last_sent.insert(key.to_string(), now);

        if last_sent.len() > RATE_LIMIT_SWEEP_AT {
            last_sent.retain(|_, at| now.duration_since(*at) < cooldown);
        }
        true
    }

    fn resolve_targets(
        &self,
        targets: &[String],
    ) -> (Vec<Arc<dyn AlertChannel>>, Vec<ChannelOutcome>) {
        let channels = self.channels.read();
        let mut runnable = Vec::new();
        let mut skipped = Vec::new();
        let mut seen = Vec::new();

        for name in targets {
            if seen.contains(name) {
                continue;
            }
            seen.push(name.clone());

            match channels.get(name) {
                None => {
                    debug!(channel = %name, "target channel not registered");
                    skipped.push(ChannelOutcome {
                        channel: name.clone(),
                        status: DeliveryStatus::Skipped {
                            reason: "channel not registered".to_string(),
                        },
                    });
                }
                Some(channel) if !channel.is_enabled() => {
                    skipped.push(ChannelOutcome {
                        channel: name.clone(),
                        status: DeliveryStatus::Skipped {
                            reason: "channel disabled".to_string(),
                        },
                    });
                }
                Some(channel) => runnable.push(Arc::clone(channel)),
            }
        }
        (runnable, skipped)
    }

    fn count_outcomes(&self, alert: &Alert, outcomes: &[ChannelOutcome]) {
        let mut counters = self.counters.lock();
        for outcome in outcomes {
            match &outcome.status {
                DeliveryStatus::Delivered => {
                    counters
                        .per_channel
                        .entry(outcome.channel.clone())
                        .or_default()
                        .delivered += 1;
                }
                DeliveryStatus::Failed { reason } => {
                    warn!(
                        alert_id = %alert.id,
                        channel = %outcome.channel,
                        reason = %reason,
                        "alert delivery failed"
                    );
                    counters
                        .per_channel
                        .entry(outcome.channel.clone())
                        .or_default()
                        .failed += 1;
                }
                DeliveryStatus::TimedOut => {
                    warn!(
                        alert_id = %alert.id,
                        channel = %outcome.channel,
                        timeout_ms = self.config.channel_timeout_ms,
                        "alert delivery timed out"
                    );
                    counters.timed_out += 1;
                    counters
                        .per_channel
                        .entry(outcome.channel.clone())
                        .or_default()
                        .failed += 1;
                }
                DeliveryStatus::Skipped { .. } => {}
            }
        }
        info!(
            alert_id = %alert.id,
            severity = %alert.severity,
            title = %alert.title,
            targets = outcomes.len(),
            "alert dispatched"
        );
    }

    // ============ History ============

    fn record_history(&self, alert: Alert) {
        let mut history = self.history.write();
        history.push_back(alert);
        self.trim_history(&mut history);
    }

    fn trim_history(&self, history: &mut VecDeque<Alert>) -> usize {
        let before = history.len();

        if let Some(cutoff) = cutoff_hours_ago(self.config.history_max_age_hours) {
            while history.front().is_some_and(|a| a.timestamp < cutoff) {
                history.pop_front();
            }
        }
        while history.len() > self.config.history_max_entries {
            history.pop_front();
        }
        before - history.len()
    }

    /// Applies history retention and sweeps expired rate-limit keys.
    ///
    /// Returns the number of alerts dropped from history.
    pub fn prune(&self) -> usize {
        let removed = {
            let mut history = self.history.write();
            self.trim_history(&mut history)
        };

        let cooldown = self.config.cooldown();
        let now = Instant::now();
        self.last_sent
            .lock()
            .retain(|_, at| now.duration_since(*at) < cooldown);

        if removed > 0 {
            debug!(removed, "pruned alert history");
        }
        removed
    }

    /// Returns alerts raised in the last `hours`, newest first.
    #[must_use]
    pub fn recent_alerts(&self, hours: u64) -> Vec<Alert> {
        let cutoff = cutoff_hours_ago(hours);
        self.history
            .read()
            .iter()
            .rev()
            .filter(|a| cutoff.is_none_or(|c| a.timestamp >= c))
            .cloned()
            .collect()
    }

    /// Returns an alert from history.
    #[must_use]
    pub fn alert(&self, id: &str) -> Option<Alert> {
        self.history.read().iter().find(|a| a.id == id).cloned()
    }

    /// Marks an alert resolved.
    ///
    /// Returns `false` if no such alert is in history. Resolving twice is a
    /// no-op that still returns `true`.
    pub fn resolve_alert(&self, id: &str) -> bool {
        let mut history = self.history.write();
        match history.iter_mut().find(|a| a.id == id) {
            Some(alert) => {
                if alert.resolve() {
                    info!(alert_id = %id, "alert resolved");
                }
                true
            }
            None => false,
        }
    }

    /// Returns aggregate statistics.
    #[must_use]
    pub fn stats(&self) -> AlertStats {
        let mut stats = AlertStats::default();
        {
            let history = self.history.read();
            stats.total = history.len();
            for alert in history.iter() {
                *stats.by_severity.entry(alert.severity).or_default() += 1;
                if alert.resolved {
                    stats.resolved += 1;
                } else {
                    stats.unresolved += 1;
                }
            }
        }

        let counters = self.counters.lock();
        stats.suppressed = counters.suppressed;
        stats.timed_out = counters.timed_out;
        stats.per_channel = counters.per_channel.clone();
        stats.delivered = counters.per_channel.values().map(|c| c.delivered).sum();
        stats.failed = counters.per_channel.values().map(|c| c.failed).sum();
        stats
    }
}

impl Default for AlertManager {
    fn default() -> Self {
        Self::new(AlertManagerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::NotificationResult;
    use crate::error::{AlertError, Result};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    enum Behavior {
        Succeed,
        Fail,
        Error,
        Slow(Duration),
        Panic,
    }

    #[derive(Debug)]
    struct TestChannel {
        name: String,
        enabled: bool,
        behavior: Behavior,
        calls: AtomicUsize,
    }

    impl TestChannel {
        fn new(name: &str, behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                enabled: true,
                behavior,
                calls: AtomicUsize::new(0),
            })
        }

        fn disabled(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                enabled: false,
                behavior: Behavior::Succeed,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AlertChannel for TestChannel {
        fn name(&self) -> &str {
            &self.name
        }

        fn is_enabled(&self) -> bool {
            self.enabled
        }

        async fn send(&self, _alert: &Alert) -> Result<NotificationResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behavior {
                Behavior::Succeed => Ok(NotificationResult::success(&self.name)),
                Behavior::Fail => Ok(NotificationResult::failure(&self.name, "rejected")),
                Behavior::Error => Err(AlertError::NotificationFailed {
                    reason: "boom".to_string(),
                }),
                Behavior::Slow(d) => {
                    tokio::time::sleep(*d).await;
                    Ok(NotificationResult::success(&self.name))
                }
                Behavior::Panic => panic!("channel exploded"),
            }
        }
    }

    fn manager_with_cooldown(cooldown: Duration) -> AlertManager {
        AlertManager::new(
            AlertManagerConfig::default()
                .with_cooldown(cooldown)
                .with_channel_timeout(Duration::from_millis(100)),
        )
    }

    fn register_all(manager: &AlertManager) -> Vec<Arc<TestChannel>> {
        let channels: Vec<Arc<TestChannel>> = ["email", "chat", "sms", "webhook"]
            .iter()
            .map(|n| TestChannel::new(n, Behavior::Succeed))
            .collect();
        for c in &channels {
            assert!(manager.register_channel(c.clone()));
        }
        channels
    }

    mod routing_tests {
        use super::*;

        #[tokio::test]
        async fn critical_goes_everywhere() {
            let manager = AlertManager::default();
            let channels = register_all(&manager);

            let report = manager
                .send_alert(Alert::new(Severity::Critical, "down", "m", "errors"))
                .await;

            assert!(!report.suppressed);
            assert_eq!(report.delivered_count(), 4);
            assert!(channels.iter().all(|c| c.calls() == 1));
        }

        #[tokio::test]
        async fn low_goes_to_webhook_only() {
            let manager = AlertManager::default();
            let channels = register_all(&manager);

            let report = manager
                .send_alert(Alert::new(Severity::Low, "minor", "m", "errors"))
                .await;

            assert_eq!(report.outcomes.len(), 1);
            assert_eq!(report.status_of("webhook"), Some(&DeliveryStatus::Delivered));
            assert_eq!(channels[0].calls(), 0);
            assert_eq!(channels[3].calls(), 1);
        }

        #[tokio::test]
        async fn explicit_channels_override_routing() {
            let manager = AlertManager::default();
            let channels = register_all(&manager);

            let report = manager
                .send_alert_to(
                    Alert::new(Severity::Low, "t", "m", "errors"),
                    &["sms".to_string(), "sms".to_string()],
                )
                .await;

            assert_eq!(report.outcomes.len(), 1);
            assert_eq!(channels[2].calls(), 1);
            assert_eq!(channels[3].calls(), 0);
        }

        #[tokio::test]
        async fn missing_and_disabled_channels_are_skipped() {
            let manager = AlertManager::default();
            manager.register_channel(TestChannel::disabled("chat"));

            let report = manager
                .send_alert(Alert::new(Severity::Medium, "t", "m", "errors"))
                .await;

            assert!(matches!(
                report.status_of("chat"),
                Some(DeliveryStatus::Skipped { reason }) if reason == "channel disabled"
            ));
            assert!(matches!(
                report.status_of("webhook"),
                Some(DeliveryStatus::Skipped { reason }) if reason == "channel not registered"
            ));
            assert_eq!(report.delivered_count(), 0);
        }
    }

    mod rate_limit_tests {
        use super::*;

        #[tokio::test]
        async fn same_key_suppressed_within_cooldown() {
            let manager = manager_with_cooldown(Duration::from_secs(60));
            let channels = register_all(&manager);

            let first = manager
                .send_alert(Alert::new(Severity::High, "DB down", "m", "errors"))
                .await;
            let second = manager
                .send_alert(Alert::new(Severity::High, "DB down", "m", "errors"))
                .await;

            assert!(!first.suppressed);
            assert!(second.suppressed);
            assert!(second.outcomes.is_empty());
            assert_eq!(channels[0].calls(), 1);
            assert_eq!(manager.stats().suppressed, 1);
            assert_eq!(manager.recent_alerts(1).len(), 1);
        }

        #[tokio::test]
        async fn different_title_not_suppressed() {
            let manager = manager_with_cooldown(Duration::from_secs(60));
            register_all(&manager);

            manager
                .send_alert(Alert::new(Severity::High, "DB down", "m", "errors"))
                .await;
            let other = manager
                .send_alert(Alert::new(Severity::High, "Cache down", "m", "errors"))
                .await;

            assert!(!other.suppressed);
        }

        #[tokio::test]
        async fn resent_after_cooldown() {
            let manager = manager_with_cooldown(Duration::from_millis(50));
            let channels = register_all(&manager);

            manager
                .send_alert(Alert::new(Severity::Low, "flap", "m", "metrics"))
                .await;
            tokio::time::sleep(Duration::from_millis(80)).await;
            let again = manager
                .send_alert(Alert::new(Severity::Low, "flap", "m", "metrics"))
                .await;

            assert!(!again.suppressed);
            assert_eq!(channels[3].calls(), 2);
        }

        #[tokio::test]
        async fn cooldown_applies_even_when_delivery_fails() {
            let manager = manager_with_cooldown(Duration::from_secs(60));
            manager.register_channel(TestChannel::new("webhook", Behavior::Fail));

            let first = manager
                .send_alert(Alert::new(Severity::Low, "t", "m", "errors"))
                .await;
            let second = manager
                .send_alert(Alert::new(Severity::Low, "t", "m", "errors"))
                .await;

            assert_eq!(first.failed_count(), 1);
            assert!(second.suppressed);
        }
    }

    mod failure_isolation_tests {
        use super::*;

        #[tokio::test]
        async fn one_failure_does_not_block_others() {
            let manager = manager_with_cooldown(Duration::from_secs(60));
            manager.register_channel(TestChannel::new("email", Behavior::Error));
            manager.register_channel(TestChannel::new("chat", Behavior::Slow(Duration::from_secs(5))));
            manager.register_channel(TestChannel::new("sms", Behavior::Panic));
            manager.register_channel(TestChannel::new("webhook", Behavior::Succeed));

            let report = manager
                .send_alert(Alert::new(Severity::Critical, "t", "m", "errors"))
                .await;

            assert_eq!(report.status_of("webhook"), Some(&DeliveryStatus::Delivered));
            assert_eq!(report.status_of("chat"), Some(&DeliveryStatus::TimedOut));
            assert!(matches!(report.status_of("email"), Some(DeliveryStatus::Failed { .. })));
            assert!(matches!(report.status_of("sms"), Some(DeliveryStatus::Failed { .. })));

            let stats = manager.stats();
            assert_eq!(stats.delivered, 1);
            assert_eq!(stats.failed, 3);
            assert_eq!(stats.timed_out, 1);
            assert_eq!(stats.per_channel["webhook"].delivered, 1);
        }
    }

    mod history_tests {
        use super::*;

        #[tokio::test]
        async fn resolve_alert_is_idempotent() {
            let manager = AlertManager::default();
            let report = manager
                .send_alert(Alert::new(Severity::Medium, "t", "m", "errors"))
                .await;

            assert!(manager.resolve_alert(&report.alert_id));
            let resolved_at = manager.alert(&report.alert_id).unwrap().resolved_at;
            assert!(manager.resolve_alert(&report.alert_id));
            assert_eq!(manager.alert(&report.alert_id).unwrap().resolved_at, resolved_at);
            assert!(!manager.resolve_alert("missing"));
        }

        #[tokio::test]
        async fn history_is_bounded() {
            let manager = AlertManager::new(AlertManagerConfig::default().with_history_max_entries(3));
            for i in 0..5 {
                manager
                    .send_alert(Alert::new(Severity::Low, format!("alert {i}"), "m", "errors"))
                    .await;
            }

            let recent = manager.recent_alerts(24);
            assert_eq!(recent.len(), 3);
            assert_eq!(recent[0].title, "alert 4");
            assert_eq!(recent[2].title, "alert 2");
        }

        #[tokio::test]
        async fn stats_count_by_severity() {
            let manager = AlertManager::default();
            let report = manager
                .send_alert(Alert::new(Severity::High, "a", "m", "errors"))
                .await;
            manager
                .send_alert(Alert::new(Severity::High, "b", "m", "errors"))
                .await;
            manager
                .send_alert(Alert::new(Severity::Low, "c", "m", "errors"))
                .await;
            manager.resolve_alert(&report.alert_id);

            let stats = manager.stats();
            assert_eq!(stats.total, 3);
            assert_eq!(stats.by_severity[&Severity::High], 2);
            assert_eq!(stats.by_severity[&Severity::Low], 1);
            assert_eq!(stats.resolved, 1);
            assert_eq!(stats.unresolved, 2);
        }

        #[tokio::test]
        async fn prune_keeps_recent_alerts() {
            let manager = AlertManager::default();
            manager
                .send_alert(Alert::new(Severity::Low, "t", "m", "errors"))
                .await;
            assert_eq!(manager.prune(), 0);
            assert_eq!(manager.recent_alerts(24).len(), 1);
        }
    }

    #[test]
    fn duplicate_registration_rejected() {
        let manager = AlertManager::default();
        assert!(manager.register_channel(TestChannel::new("email", Behavior::Succeed)));
        assert!(!manager.register_channel(TestChannel::new("email", Behavior::Fail)));
        assert_eq!(manager.channel_names(), vec!["email".to_string()]);
        assert!(manager.unregister_channel("email"));
        assert!(manager.channel_names().is_empty());
    }

    #[test_case::test_case(Severity::Critical, &["email", "chat", "sms", "webhook"] ; "critical")]
    #[test_case::test_case(Severity::High, &["email", "chat", "webhook"] ; "high")]
    #[test_case::test_case(Severity::Medium, &["chat", "webhook"] ; "medium")]
    #[test_case::test_case(Severity::Low, &["webhook"] ; "low")]
    fn default_routing_table(severity: Severity, expected: &[&str]) {
        let routing = SeverityRouting::default();
        assert_eq!(routing.targets(severity), expected);
    }

    #[test]
    fn config_deserializes_partial() {
        let config: AlertManagerConfig =
            serde_json::from_str(r#"{"cooldown_ms": 1000, "routing": {"low": ["log"]}}"#).unwrap();
        assert_eq!(config.cooldown(), Duration::from_secs(1));
        assert_eq!(config.routing.low, vec!["log".to_string()]);
        assert_eq!(config.routing.critical.len(), 4);
        assert_eq!(config.history_max_entries, 1_000);
    }
}
