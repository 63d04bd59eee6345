//! Alert delivery for the Triage engine.
#![forbid(unsafe_code)]
//!
//! `triage-alerts` turns [`Alert`]s into notifications on email, chat, SMS,
//! webhook and log channels.
//!
//! # Features
//!
//! - **Rate Limiting**: One send per `source|title` per cooldown window
//! - **Severity Routing**: Critical alerts reach every channel, low ones only webhooks
//! - **Concurrent Delivery**: Channels are sent to in parallel, each under a timeout
//! - **Failure Isolation**: A failing or slow channel never affects the others
//! - **Bounded History**: Recent alerts kept for stats and resolution
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use triage_alerts::{Alert, AlertManager, AlertManagerConfig, LogChannel, Severity};
//!
//! # async fn example() {
//! let manager = AlertManager::new(AlertManagerConfig::default());
//! manager.register_channel(Arc::new(LogChannel::new("webhook")));
//!
//! let report = manager
//!     .send_alert(Alert::new(Severity::Low, "Disk filling", "80% used", "metrics"))
//!     .await;
//! assert_eq!(report.delivered_count(), 1);
//! # }
//! ```

#![doc(html_root_url = "https://docs.rs/triage-alerts/0.1.0")]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod channels;
pub mod error;
pub mod manager;
pub mod transport;
pub mod types;

// Re-export main types at crate root
pub use channels::{
    AlertChannel, ChannelConfig, ChatChannel, ChatConfig, EmailChannel, EmailConfig, EmailMessage,
    LogChannel, NotificationResult, SmsChannel, SmsConfig, WebhookChannel, WebhookConfig,
    WebhookEnvelope,
};
pub use error::{AlertError, Result};
pub use manager::{
    AlertManager, AlertManagerConfig, AlertStats, ChannelCounters, ChannelOutcome, DeliveryStatus,
    DispatchReport, SeverityRouting,
};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, RecordingTransport, ReqwestTransport};
pub use types::{Alert, Severity};
