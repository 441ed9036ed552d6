/// Resolve-then-download pipeline.
///
/// `run` builds the request, resolves it, asks the destination resolver for a
/// path and streams the media there. The downloader is only ever reached with
/// a `Resolved` outcome.
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cobalt_shared::config::ClientConfig;
use cobalt_shared::protocol::build_request;
use cobalt_shared::{DownloadOptions, DownloadResult, ErrorKind, Stage};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::client::{http_client, ResolutionClient};
use crate::destination::DestinationResolver;
use crate::stream::{ProgressCallback, StreamDownloader};

pub struct DownloadOrchestrator {
    client: ResolutionClient,
    downloader: StreamDownloader,
    destinations: Arc<dyn DestinationResolver>,
    progress: Option<ProgressCallback>,
    resolve_timeout: Duration,
    /// Normalized destinations currently being written by a `run` on this
    /// orchestrator. Separate orchestrators do not see each other's claims.
    in_flight: Arc<Mutex<HashSet<PathBuf>>>,
}

impl DownloadOrchestrator {
    pub fn new(
        config: &ClientConfig,
        destinations: Arc<dyn DestinationResolver>,
    ) -> reqwest::Result<Self> {
        let http = http_client(config)?;
        Ok(Self::from_parts(
            ResolutionClient::new(http.clone(), config),
            StreamDownloader::new(http, config),
            destinations,
            config.resolve_timeout,
        ))
    }

    pub fn from_parts(
        client: ResolutionClient,
        downloader: StreamDownloader,
        destinations: Arc<dyn DestinationResolver>,
        resolve_timeout: Duration,
    ) -> Self {
        Self {
            client,
            downloader,
            destinations,
            progress: None,
            resolve_timeout,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Default progress callback for runs that don't pass their own.
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub async fn run(
        &self,
        options: &DownloadOptions,
        cancel: &CancellationToken,
    ) -> DownloadResult {
        self.run_with_progress(options, cancel, self.progress.as_ref()).await
    }

    pub async fn run_with_progress(
        &self,
        options: &DownloadOptions,
        cancel: &CancellationToken,
        progress: Option<&ProgressCallback>,
    ) -> DownloadResult {
        if cancel.is_cancelled() {
            info!("Run for {} canceled before start", options.url);
            return DownloadResult::Canceled;
        }

        let request = match build_request(options) {
            Ok(r) => r,
            Err(e) => {
                warn!("Rejected options for {:?}: {}", options.url, e);
                return DownloadResult::Failed(e);
            }
        };

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Resolution of {} canceled", request.url());
                return DownloadResult::Canceled;
            }
            outcome = self.client.resolve(&request, self.resolve_timeout) => outcome,
        };

        let media_url = match outcome.into_media_url() {
            Ok(url) => url,
            Err(e) => return DownloadResult::Failed(e),
        };

        let Some(destination) = self.destinations.destination(options, &media_url) else {
            info!("No destination chosen for {}, canceling", request.url());
            return DownloadResult::Canceled;
        };

        let _claim = match self.claim(&destination) {
            Some(claim) => claim,
            None => {
                warn!("{} is already being written by another run", destination.display());
                return DownloadResult::Failed(ErrorKind::Io {
                    kind: std::io::ErrorKind::AlreadyExists,
                    path: destination,
                    message: "another download is writing to this destination".to_string(),
                });
            }
        };

        if cancel.is_cancelled() {
            return DownloadResult::Canceled;
        }

        self.downloader
            .download(&media_url, &destination, cancel, progress)
            .await
    }

    fn claim(&self, destination: &Path) -> Option<DestinationClaim> {
        let key = claim_key(destination);
        let mut active = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !active.insert(key.clone()) {
            return None;
        }
        Some(DestinationClaim {
            path: key,
            in_flight: self.in_flight.clone(),
        })
    }
}

/// Absolute form of `destination` with `.` components dropped, so `a.mp3`
/// and `./a.mp3` claim the same slot. Symlinks are not resolved.
fn claim_key(destination: &Path) -> PathBuf {
    let absolute = if destination.is_relative() {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(destination),
            Err(_) => destination.to_path_buf(),
        }
    } else {
        destination.to_path_buf()
    };
    absolute
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// Marks a destination busy until dropped.
struct DestinationClaim {
    path: PathBuf,
    in_flight: Arc<Mutex<HashSet<PathBuf>>>,
}

impl Drop for DestinationClaim {
    fn drop(&mut self) {
        let mut active = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        active.remove(&self.path);
    }
}

/// One-shot convenience: build an orchestrator from `config` and run `options`.
///
/// Each call gets a fresh orchestrator, so concurrent calls are not guarded
/// against sharing a destination. Reuse one [`DownloadOrchestrator`] for that.
pub async fn resolve_and_download(
    config: &ClientConfig,
    options: &DownloadOptions,
    destinations: Arc<dyn DestinationResolver>,
    cancel: &CancellationToken,
) -> DownloadResult {
    match DownloadOrchestrator::new(config, destinations) {
        Ok(orchestrator) => orchestrator.run(options, cancel).await,
        Err(e) => DownloadResult::Failed(ErrorKind::Transport {
            stage: Stage::Resolution,
            status: None,
            detail: format!("failed to build HTTP client: {}", e),
        }),
    }
}
