//! Error categorization and incident tracking for the Triage engine.
#![forbid(unsafe_code)]
//!
//! `triage-incidents` turns raw application errors into incidents: each error
//! is fingerprinted, matched against a weighted rule table once per new
//! fingerprint, tracked with frequency and affected users, escalated as its
//! impact grows, and handed to the category's actions.
//!
//! # Features
//!
//! - **Fingerprints**: Messages differing only by ids or numbers share an incident
//! - **Rule Table**: Weighted literal/regex patterns, built in or loaded from TOML
//! - **Escalation**: Severity rises with affected users and frequency, never falls
//! - **Guarded Actions**: `alert`, `create_issue`, `auto_fix` and `ignore`, each
//!   optionally guarded by a condition such as `frequency > 5 || affectedUsers > 3`
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use triage_alerts::{AlertManager, AlertManagerConfig};
//! use triage_incidents::{
//!     Categorizer, CategoryRuleSet, ErrorContext, ErrorReport, LogIssueSink, TrackerConfig,
//! };
//!
//! # async fn example() -> triage_incidents::Result<()> {
//! let categorizer = Categorizer::new(
//!     CategoryRuleSet::builtin()?,
//!     TrackerConfig::default(),
//!     AlertManager::new(AlertManagerConfig::default()),
//!     Arc::new(LogIssueSink),
//! );
//!
//! let id = categorizer
//!     .report_error(
//!         ErrorReport::new("TypeError", "Cannot read property 'id' of undefined"),
//!         None,
//!         ErrorContext::new().path("/checkout"),
//!         Some("user-1"),
//!     )
//!     .await;
//! assert_eq!(categorizer.incident(&id).map(|i| i.frequency), Some(1));
//! # Ok(())
//! # }
//! ```

#![doc(html_root_url = "https://docs.rs/triage-incidents/0.1.0")]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod category;
pub mod condition;
pub mod error;
pub mod executor;
pub mod fingerprint;
pub mod issues;
pub mod service;
pub mod tracker;
pub mod types;

// Re-export main types at crate root
pub use category::{
    Action, ActionKind, AlertConfig, AutoFixConfig, BUILTIN_RULES, CategoryRuleSet, ErrorCategory,
    IssueConfig, MatchField, Pattern, PatternRule, UNCATEGORIZED_ID,
};
pub use condition::{Condition, ConditionVars};
pub use error::{IncidentError, Result};
pub use executor::{ActionExecutor, ActionOutcome, ActionRecord, ERROR_ALERT_SOURCE, ExecutionReport};
pub use fingerprint::{FINGERPRINT_LEN, fingerprint, normalize_message};
pub use issues::{HttpIssueSink, IssuePayload, IssueSink, LogIssueSink};
pub use service::{Categorizer, ReportOutcome};
pub use tracker::{
    EscalationPolicy, IncidentTracker, RetentionPolicy, Sighting, TrackerConfig, initial_severity,
};
pub use types::{
    Environment, ErrorContext, ErrorReport, Incident, IncidentId, IncidentStats, IncidentStatus,
    Resolution,
};
