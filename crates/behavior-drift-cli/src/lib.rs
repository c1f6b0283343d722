//! Behavior drift command line and HTTP query service.

pub mod commands;
pub mod config;
pub mod session;
pub mod transport;
pub mod types;

pub use config::{resolve_data_dir, PipelineDraft, PipelineOverrides};
pub use session::DriftStore;
#[cfg(feature = "http")]
pub use transport::HttpTransport;
pub use types::{ServiceError, ServiceResult};
