//! Error types for the triage-metrics crate.

use thiserror::Error;

/// Errors that can occur in the metrics system.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// The metric name is invalid (empty, too long or contains control characters).
    #[error("invalid metric name: {reason}")]
    InvalidMetricName {
        /// The reason the name is invalid.
        reason: String,
    },

    /// The metric value is not a finite number.
    #[error("invalid metric value for {name}: {value}")]
    InvalidValue {
        /// The metric the value was recorded for.
        name: String,
        /// The rejected value.
        value: f64,
    },

    /// A threshold definition is inconsistent.
    #[error("invalid threshold for {metric}: {reason}")]
    InvalidThreshold {
        /// The metric the threshold applies to.
        metric: String,
        /// The reason the threshold is invalid.
        reason: String,
    },

    /// A metric source failed to produce samples.
    #[error("collection error in {source_name}: {reason}")]
    CollectionError {
        /// The source that failed.
        source_name: String,
        /// The reason the collection failed.
        reason: String,
    },
}

/// Result type for metrics operations.
pub type Result<T> = std::result::Result<T, MetricsError>;
