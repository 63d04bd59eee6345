//! The Triage engine.
#![forbid(unsafe_code)]
//!
//! `triage-engine` assembles the metrics, alerting and incident crates into
//! one service configured from a TOML file, and ships the `triaged` daemon.
//!
//! # Example
//!
//! ```rust,no_run
//! use triage_engine::{Engine, EngineConfig};
//! use triage_incidents::{ErrorContext, ErrorReport};
//!
//! # async fn example() -> triage_engine::Result<()> {
//! let engine = Engine::from_config(EngineConfig::from_file("triaged.toml")?)?;
//!
//! engine
//!     .report_error(
//!         ErrorReport::new("TypeError", "Cannot read property 'id' of undefined"),
//!         None,
//!         ErrorContext::new().path("/checkout"),
//!         Some("user-1"),
//!     )
//!     .await;
//! engine.record_metric("response_time", 6000.0, None, Some("ms")).await?;
//!
//! println!("{}", engine.export_prometheus());
//! # Ok(())
//! # }
//! ```

#![doc(html_root_url = "https://docs.rs/triage-engine/0.1.0")]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod engine;
pub mod error;
pub mod monitor;
pub mod scheduler;

// Re-export main types at crate root
pub use config::{
    AlertsSection, EngineConfig, IssuesSection, KNOWN_SOURCES, MetricsSection, SAMPLE_CONFIG,
    SchedulerSection,
};
pub use engine::{Engine, EngineStatus, PruneReport};
pub use error::{EngineError, Result};
pub use monitor::{BatchResult, MetricsMonitor};
pub use scheduler::{CollectionReport, CollectionScheduler, SourceOutcome, SourceStatus};
