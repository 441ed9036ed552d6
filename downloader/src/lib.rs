//! Cobalt Fetch downloader.
//!
//! Resolves a media link through a Cobalt API endpoint and streams the result
//! to disk. The single entry point for callers is
//! [`DownloadOrchestrator::run`]; everything a presentation layer needs to
//! supply (destination choice, progress display, cancellation) is injected.
pub mod client;
pub mod destination;
pub mod orchestrator;
pub mod stream;
pub mod task_queue;

pub use client::{http_client, ResolutionClient};
pub use destination::{DestinationResolver, DirectoryDestination};
pub use orchestrator::{resolve_and_download, DownloadOrchestrator};
pub use stream::{PartialFile, ProgressCallback, StreamDownloader};
pub use task_queue::{JobQueue, JobState, QueueStats};

pub use cobalt_shared::{
    AudioFormat, ClientConfig, DownloadOptions, DownloadResult, ErrorKind, ResolutionOutcome, Stage,
    VideoCodec, VideoQuality,
};
pub use tokio_util::sync::CancellationToken;
