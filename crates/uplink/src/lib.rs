//! # Uplink
//!
//! Ships spooled batches to a collector. A [`DataUploadWorker`] wakes after the
//! interval chosen by [`DataUploadDelay`], checks [`DataUploadConditions`], and
//! hands the oldest readable batch to a [`DataUploader`]. Delivered and rejected
//! batches are deleted from the spool; transient failures leave them in place
//! and back the interval off.

pub mod conditions;
pub mod delay;
pub mod error;
pub mod http;
pub mod uploader;
pub mod worker;

pub use conditions::{
    BatteryState, BatteryStatus, BatteryStatusProvider, Blocker, DataUploadConditions,
    ManualStatus, NetworkConnectionInfo, NetworkInfoProvider, Reachability,
};
pub use delay::{DataUploadDelay, UploadDelayConfig};
pub use error::{ConfigError, UploadError};
pub use http::{HttpUploader, HttpUploaderConfig, default_headers, install_rustls_provider};
pub use uploader::DataUploader;
pub use worker::{CycleOutcome, DataUploadWorker, UploadWorkerHandle};
