//! # Beacon
//!
//! Durable telemetry for a host process. Events are appended to files on
//! disk by [`spool`] and shipped in batches by [`uplink`], so nothing written
//! before a crash or an outage is lost as long as it fits the storage budget
//! and age limits.

pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;

pub use config::PipelineConfig;
pub use error::{Error, Result};
pub use pipeline::{LogEvent, TelemetryPipeline};
