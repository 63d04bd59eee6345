//! Test helpers for E2E tests.

#![allow(dead_code)]

use std::sync::Arc;

use triage_alerts::{HttpRequest, RecordingTransport};
use triage_engine::{Engine, EngineConfig};

pub const EMAIL_URL: &str = "https://mail.test/send";
pub const CHAT_URL: &str = "https://chat.test/hook";
pub const SMS_URL: &str = "https://sms.test/messages";
pub const WEBHOOK_URL: &str = "https://hooks.test/triage";
pub const ISSUES_URL: &str = "https://tracker.test/issues";

/// Config with all four HTTP channels, an issue tracker and no scheduler.
pub fn config_toml(cooldown_secs: u64) -> String {
    format!(
        r#"
        [alerts]
        cooldown_secs = {cooldown_secs}
        channel_timeout_ms = 1000

        [scheduler]
        enabled = false
        sources = ["business"]

        [issues]
        url = "{ISSUES_URL}"

        [[thresholds]]
        metric = "response_time"
        warning = 3000
        critical = 5000
        comparison = "gt"

        [[channels]]
        kind = "email"
        url = "{EMAIL_URL}"
        from = "alerts@test"
        recipients = ["oncall@test"]

        [[channels]]
        kind = "chat"
        url = "{CHAT_URL}"

        [[channels]]
        kind = "sms"
        url = "{SMS_URL}"
        from = "+15550000000"
        recipients = ["+15551234567"]

        [[channels]]
        kind = "webhook"
        url = "{WEBHOOK_URL}"
        "#
    )
}

/// Engine wired to a recording transport.
pub struct TestEngine {
    pub engine: Engine,
    pub transport: RecordingTransport,
}

impl TestEngine {
    pub fn new() -> Self {
        Self::with_cooldown(300)
    }

    pub fn with_cooldown(cooldown_secs: u64) -> Self {
        Self::from_toml(&config_toml(cooldown_secs))
    }

    pub fn from_toml(toml: &str) -> Self {
        let config = EngineConfig::from_toml(toml).expect("test config is valid");
        let transport = RecordingTransport::new();
        let engine = Engine::with_transport(config, Arc::new(transport.clone()))
            .expect("engine builds");
        Self { engine, transport }
    }

    pub fn sent_to(&self, url: &str) -> Vec<HttpRequest> {
        self.transport.requests_to(url)
    }
}
