//! Shared types for Cobalt Fetch.
//!
//! Everything here is free of network and filesystem I/O: download options,
//! the resolution wire protocol, the error taxonomy and result values.
pub mod config;
pub mod errors;
pub mod models;
pub mod options;
pub mod protocol;

pub use config::ClientConfig;
pub use errors::{describe, ErrorKind, Stage};
pub use models::{DownloadResult, ResolutionOutcome};
pub use options::{AudioFormat, DownloadOptions, VideoCodec, VideoQuality};
pub use protocol::{build_request, classify_response, ResolutionRequest};
