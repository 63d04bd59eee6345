//! Error types for the triage engine.

use thiserror::Error;

/// Errors that can occur while configuring or running the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Metrics error.
    #[error("metrics error: {0}")]
    Metrics(#[from] triage_metrics::MetricsError),

    /// Alerting error.
    #[error("alert error: {0}")]
    Alert(#[from] triage_alerts::AlertError),

    /// Incident rules or sink error.
    #[error("incident error: {0}")]
    Incident(#[from] triage_incidents::IncidentError),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
