//! Delivery channels for alerts.
//!
//! This module provides the [`AlertChannel`] trait and the built-in channels.
//! Each channel renders its own payload from the canonical [`Alert`] and never
//! mutates it:
//!
//! | channel | format |
//! |---|---|
//! | [`EmailChannel`] | HTML body posted to an email API |
//! | [`ChatChannel`] | Slack-style attachment posted to an incoming webhook |
//! | [`SmsChannel`] | Plain text, critical alerts only |
//! | [`WebhookChannel`] | JSON envelope with the full alert |
//! | [`LogChannel`] | `tracing` event, no network |

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use crate::error::{AlertError, Result};
use crate::transport::{HttpRequest, HttpTransport};
use crate::types::{Alert, Severity};

/// Maximum SMS body length in characters.
pub const SMS_MAX_CHARS: usize = 160;

/// Result of sending an alert through one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationResult {
    /// Whether the alert was delivered (or deliberately skipped).
    pub success: bool,
    /// Whether the channel chose not to deliver this alert.
    pub skipped: bool,
    /// The channel that processed this alert.
    pub channel: String,
    /// Optional message or error description.
    pub message: Option<String>,
    /// Response status code (if applicable).
    pub status_code: Option<u16>,
}

impl NotificationResult {
    /// Creates a successful result.
    #[must_use]
    pub fn success(channel: impl Into<String>) -> Self {
        Self {
            success: true,
            skipped: false,
            channel: channel.into(),
            message: None,
            status_code: None,
        }
    }

    /// Creates a failed result.
    #[must_use]
    pub fn failure(channel: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            skipped: false,
            channel: channel.into(),
            message: Some(message.into()),
            status_code: None,
        }
    }

    /// Creates a result for an alert the channel filtered out.
    #[must_use]
    pub fn skipped(channel: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            success: true,
            skipped: true,
            channel: channel.into(),
            message: Some(reason.into()),
            status_code: None,
        }
    }

    /// Sets the status code.
    #[must_use]
    pub const fn with_status_code(mut self, code: u16) -> Self {
        self.status_code = Some(code);
        self
    }
}

/// Trait for alert delivery channels.
#[async_trait]
pub trait AlertChannel: Send + Sync + fmt::Debug {
    /// Returns the unique name of this channel.
    fn name(&self) -> &str;

    /// Returns true if this channel is enabled.
    fn is_enabled(&self) -> bool {
        true
    }

    /// Sends an alert through this channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the alert could not be handed to the provider.
    async fn send(&self, alert: &Alert) -> Result<NotificationResult>;
}

async fn deliver(
    transport: &dyn HttpTransport,
    channel: &str,
    request: HttpRequest,
) -> Result<NotificationResult> {
    let url = request.url.clone();
    let response = transport
        .post_json(request)
        .await
        .map_err(|e| AlertError::NotificationFailed {
            reason: format!("{channel}: {e}"),
        })?;

    if response.is_success() {
        debug!(channel, url = %url, status = response.status, "alert delivered");
        Ok(NotificationResult::success(channel).with_status_code(response.status))
    } else {
        warn!(channel, url = %url, status = response.status, "provider rejected alert");
        Ok(
            NotificationResult::failure(channel, format!("provider returned {}", response.status))
                .with_status_code(response.status),
        )
    }
}

fn require(value: &str, what: &str, channel: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AlertError::InvalidChannel {
            reason: format!("{channel}: {what} cannot be empty"),
        });
    }
    Ok(())
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn severity_color(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "#d32f2f",
        Severity::High => "#f57c00",
        Severity::Medium => "#fbc02d",
        Severity::Low => "#1976d2",
    }
}

fn metadata_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ============ Email ============

/// Configuration for an email channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailConfig {
    /// Channel name.
    #[serde(default = "default_email_name")]
    pub name: String,
    /// Email API endpoint accepting `{from, to, subject, html}`.
    pub url: String,
    /// Bearer token for the email API.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Sender address.
    pub from: String,
    /// Recipient addresses.
    pub recipients: Vec<String>,
    /// Whether this channel is enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_email_name() -> String {
    "email".to_string()
}

const fn default_true() -> bool {
    true
}

/// A rendered email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    /// Subject line.
    pub subject: String,
    /// HTML body.
    pub html: String,
}

/// Sends alerts as HTML email through an HTTP email API.
#[derive(Debug, Clone)]
pub struct EmailChannel {
    config: EmailConfig,
    transport: Arc<dyn HttpTransport>,
}

impl EmailChannel {
    /// Creates an email channel.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::InvalidChannel` if the URL, sender or recipients are missing.
    pub fn new(config: EmailConfig, transport: Arc<dyn HttpTransport>) -> Result<Self> {
        require(&config.url, "email API URL", &config.name)?;
        require(&config.from, "sender address", &config.name)?;
        if config.recipients.is_empty() {
            return Err(AlertError::InvalidChannel {
                reason: format!("{}: at least one recipient is required", config.name),
            });
        }
        Ok(Self { config, transport })
    }

    /// Renders the email for an alert.
    #[must_use]
    pub fn render(alert: &Alert) -> EmailMessage {
        let subject = format!(
            "[{}] {}",
            alert.severity.as_str().to_uppercase(),
            alert.title
        );

        let mut rows = String::new();
        for (key, value) in &alert.metadata {
            rows.push_str(&format!(
                "<tr><td><strong>{}</strong></td><td>{}</td></tr>",
                escape_html(key),
                escape_html(&metadata_value(value)),
            ));
        }

        let html = format!(
            "<html><body>\
             <h2 style=\"color:{color}\">{title}</h2>\
             <p>{message}</p>\
             <table>\
             <tr><td><strong>Severity</strong></td><td>{severity}</td></tr>\
             <tr><td><strong>Source</strong></td><td>{source}</td></tr>\
             <tr><td><strong>Time</strong></td><td>{time}</td></tr>\
             {rows}\
             </table>\
             <p style=\"color:#888\">Alert ID: {id}</p>\
             </body></html>",
            color = severity_color(alert.severity),
            title = escape_html(&alert.title),
            message = escape_html(&alert.message),
            severity = alert.severity,
            source = escape_html(&alert.source),
            time = alert.timestamp.to_rfc3339(),
            id = escape_html(&alert.id),
        );

        EmailMessage { subject, html }
    }
}

#[async_trait]
impl AlertChannel for EmailChannel {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    async fn send(&self, alert: &Alert) -> Result<NotificationResult> {
        let message = Self::render(alert);
        let mut request = HttpRequest::new(
            &self.config.url,
            json!({
                "from": self.config.from,
                "to": self.config.recipients,
                "subject": message.subject,
                "html": message.html,
            }),
        );
        if let Some(key) = &self.config.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }
        deliver(self.transport.as_ref(), self.name(), request).await
    }
}

// ============ Chat ============

/// Configuration for a chat (incoming-webhook) channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Channel name.
    #[serde(default = "default_chat_name")]
    pub name: String,
    /// Incoming webhook URL.
    pub url: String,
    /// Target room, if the webhook accepts an override.
    #[serde(default)]
    pub room: Option<String>,
    /// Display name of the bot.
    #[serde(default)]
    pub username: Option<String>,
    /// Whether this channel is enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_chat_name() -> String {
    "chat".to_string()
}

/// Posts alerts as chat attachments.
#[derive(Debug, Clone)]
pub struct ChatChannel {
    config: ChatConfig,
    transport: Arc<dyn HttpTransport>,
}

impl ChatChannel {
    /// Creates a chat channel.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::InvalidChannel` if the webhook URL is empty.
    pub fn new(config: ChatConfig, transport: Arc<dyn HttpTransport>) -> Result<Self> {
        require(&config.url, "webhook URL", &config.name)?;
        Ok(Self { config, transport })
    }

    /// Builds the attachment payload for an alert.
    #[must_use]
    pub fn payload(&self, alert: &Alert) -> Value {
        let mut fields = vec![
            json!({"title": "Severity", "value": alert.severity.as_str(), "short": true}),
            json!({"title": "Source", "value": alert.source, "short": true}),
        ];
        fields.extend(alert.metadata.iter().map(|(key, value)| {
            json!({"title": key, "value": metadata_value(value), "short": true})
        }));

        let mut payload = json!({
            "text": format!("*{}*", alert.title),
            "attachments": [{
                "color": severity_color(alert.severity),
                "text": alert.message,
                "fields": fields,
                "footer": format!("alert {}", alert.id),
                "ts": alert.timestamp.timestamp(),
            }],
        });
        if let Some(room) = &self.config.room {
            payload["channel"] = Value::String(room.clone());
        }
        if let Some(username) = &self.config.username {
            payload["username"] = Value::String(username.clone());
        }
        payload
    }
}

#[async_trait]
impl AlertChannel for ChatChannel {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    async fn send(&self, alert: &Alert) -> Result<NotificationResult> {
        let request = HttpRequest::new(&self.config.url, self.payload(alert));
        deliver(self.transport.as_ref(), self.name(), request).await
    }
}

// ============ SMS ============

/// Configuration for an SMS channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsConfig {
    /// Channel name.
    #[serde(default = "default_sms_name")]
    pub name: String,
    /// SMS gateway endpoint accepting `{from, to, body}`.
    pub url: String,
    /// Bearer token for the gateway.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Sender number.
    pub from: String,
    /// Recipient numbers.
    pub recipients: Vec<String>,
    /// Whether this channel is enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_sms_name() -> String {
    "sms".to_string()
}

/// Sends critical alerts as text messages.
///
/// Non-critical alerts are skipped regardless of routing.
#[derive(Debug, Clone)]
pub struct SmsChannel {
    config: SmsConfig,
    transport: Arc<dyn HttpTransport>,
}

impl SmsChannel {
    /// Creates an SMS channel.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::InvalidChannel` if the URL, sender or recipients are missing.
    pub fn new(config: SmsConfig, transport: Arc<dyn HttpTransport>) -> Result<Self> {
        require(&config.url, "gateway URL", &config.name)?;
        require(&config.from, "sender number", &config.name)?;
        if config.recipients.is_empty() {
            return Err(AlertError::InvalidChannel {
                reason: format!("{}: at least one recipient is required", config.name),
            });
        }
        Ok(Self { config, transport })
    }

    /// Renders the message text, truncated to [`SMS_MAX_CHARS`].
    #[must_use]
    pub fn text(alert: &Alert) -> String {
        let full = format!(
            "[{}] {}: {}",
            alert.severity.as_str().to_uppercase(),
            alert.title,
            alert.message
        );
        if full.chars().count() <= SMS_MAX_CHARS {
            return full;
        }
        let mut truncated: String = full.chars().take(SMS_MAX_CHARS - 3).collect();
        truncated.push_str("...");
        truncated
    }
}

#[async_trait]
impl AlertChannel for SmsChannel {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    async fn send(&self, alert: &Alert) -> Result<NotificationResult> {
        if alert.severity != Severity::Critical {
            debug!(channel = %self.name(), severity = %alert.severity, "sms skipped for non-critical alert");
            return Ok(NotificationResult::skipped(
                self.name(),
                "sms is reserved for critical alerts",
            ));
        }

        let text = Self::text(alert);
        let mut last = NotificationResult::success(self.name());
        for recipient in &self.config.recipients {
            let mut request = HttpRequest::new(
                &self.config.url,
                json!({"from": self.config.from, "to": recipient, "body": text}),
            );
            if let Some(key) = &self.config.api_key {
                request = request.header("Authorization", format!("Bearer {key}"));
            }
            last = deliver(self.transport.as_ref(), self.name(), request).await?;
            if !last.success {
                return Ok(last);
            }
        }
        Ok(last)
    }
}

// ============ Webhook ============

/// Configuration for a generic webhook channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Channel name.
    #[serde(default = "default_webhook_name")]
    pub name: String,
    /// The URL to POST alerts to.
    pub url: String,
    /// HTTP headers to include with requests.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Whether this channel is enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_webhook_name() -> String {
    "webhook".to_string()
}

impl WebhookConfig {
    /// Creates a webhook configuration.
    #[must_use]
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            headers: BTreeMap::new(),
            enabled: true,
        }
    }

    /// Adds a header to the configuration.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}

/// JSON envelope posted by [`WebhookChannel`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEnvelope {
    /// Envelope format version.
    pub version: String,
    /// Event type.
    pub event: String,
    /// When the envelope was built.
    pub sent_at: DateTime<Utc>,
    /// The alert.
    pub alert: Alert,
}

impl WebhookEnvelope {
    /// Wraps an alert.
    #[must_use]
    pub fn new(alert: &Alert) -> Self {
        Self {
            version: "1".to_string(),
            event: if alert.resolved {
                "alert.resolved".to_string()
            } else {
                "alert.fired".to_string()
            },
            sent_at: Utc::now(),
            alert: alert.clone(),
        }
    }
}

/// Posts the full alert as JSON to a URL.
#[derive(Debug, Clone)]
pub struct WebhookChannel {
    config: WebhookConfig,
    transport: Arc<dyn HttpTransport>,
}

impl WebhookChannel {
    /// Creates a webhook channel.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::InvalidChannel` if the URL is empty.
    pub fn new(config: WebhookConfig, transport: Arc<dyn HttpTransport>) -> Result<Self> {
        require(&config.url, "webhook URL", &config.name)?;
        Ok(Self { config, transport })
    }

    /// Returns the webhook URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.config.url
    }
}

#[async_trait]
impl AlertChannel for WebhookChannel {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    async fn send(&self, alert: &Alert) -> Result<NotificationResult> {
        let body = serde_json::to_value(WebhookEnvelope::new(alert))?;
        let request = HttpRequest::new(&self.config.url, body).headers(&self.config.headers);
        deliver(self.transport.as_ref(), self.name(), request).await
    }
}

// ============ Log ============

/// Writes alerts to the `tracing` log.
#[derive(Debug, Clone)]
pub struct LogChannel {
    name: String,
}

impl LogChannel {
    /// Creates a log channel.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for LogChannel {
    fn default() -> Self {
        Self::new("log")
    }
}

#[async_trait]
impl AlertChannel for LogChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, alert: &Alert) -> Result<NotificationResult> {
        match alert.severity {
            Severity::Critical | Severity::High => error!(
                alert_id = %alert.id,
                severity = %alert.severity,
                source = %alert.source,
                title = %alert.title,
                message = %alert.message,
                "ALERT"
            ),
            Severity::Medium | Severity::Low => info!(
                alert_id = %alert.id,
                severity = %alert.severity,
                source = %alert.source,
                title = %alert.title,
                message = %alert.message,
                "ALERT"
            ),
        }
        Ok(NotificationResult::success(&self.name))
    }
}

// ============ Configuration ============

/// Declarative channel configuration, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ChannelConfig {
    /// HTML email.
    Email(EmailConfig),
    /// Chat attachment.
    Chat(ChatConfig),
    /// Text message.
    Sms(SmsConfig),
    /// JSON webhook.
    Webhook(WebhookConfig),
    /// Local log.
    Log {
        /// Channel name.
        #[serde(default = "default_log_name")]
        name: String,
    },
}

fn default_log_name() -> String {
    "log".to_string()
}

impl ChannelConfig {
    /// Returns the configured channel name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Email(c) => &c.name,
            Self::Chat(c) => &c.name,
            Self::Sms(c) => &c.name,
            Self::Webhook(c) => &c.name,
            Self::Log { name } => name,
        }
    }

    /// Builds the channel.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::InvalidChannel` if the configuration is incomplete.
    pub fn build(self, transport: Arc<dyn HttpTransport>) -> Result<Arc<dyn AlertChannel>> {
        let channel: Arc<dyn AlertChannel> = match self {
            Self::Email(c) => Arc::new(EmailChannel::new(c, transport)?),
            Self::Chat(c) => Arc::new(ChatChannel::new(c, transport)?),
            Self::Sms(c) => Arc::new(SmsChannel::new(c, transport)?),
            Self::Webhook(c) => Arc::new(WebhookChannel::new(c, transport)?),
            Self::Log { name } => Arc::new(LogChannel::new(name)),
        };
        Ok(channel)
    }
}
