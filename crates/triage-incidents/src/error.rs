//! Error types for the triage-incidents crate.

use thiserror::Error;

/// Errors raised while loading rules or delivering incident side effects.
///
/// Error ingestion itself never fails; these surface at configuration time
/// or inside sinks, where they are logged.
#[derive(Debug, Error)]
pub enum IncidentError {
    /// A category pattern failed to compile.
    #[error("invalid pattern in category {category}: {reason}")]
    InvalidPattern {
        /// The category id.
        category: String,
        /// Why the pattern is invalid.
        reason: String,
    },

    /// A guard condition does not parse.
    #[error("invalid condition '{condition}': {reason}")]
    InvalidCondition {
        /// The condition source text.
        condition: String,
        /// Parse error.
        reason: String,
    },

    /// The rule set is inconsistent.
    #[error("invalid rule set: {reason}")]
    InvalidRules {
        /// What is wrong.
        reason: String,
    },

    /// An issue sink could not file an issue.
    #[error("issue sink {sink} failed: {reason}")]
    IssueSink {
        /// The sink name.
        sink: String,
        /// Failure description.
        reason: String,
    },

    /// Alerting error.
    #[error("alert error: {0}")]
    Alert(#[from] triage_alerts::AlertError),

    /// Rule file could not be parsed.
    #[error("rule file parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// I/O error reading a rule file.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for incident operations.
pub type Result<T> = std::result::Result<T, IncidentError>;
