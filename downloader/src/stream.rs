/// Streamed media download with atomic finalization.
///
/// The body is written to a hidden `.part` file next to the destination and
/// renamed into place only after the whole transfer succeeded. Every other exit
/// path removes the partial file and leaves the destination untouched.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cobalt_shared::config::ClientConfig;
use cobalt_shared::protocol::truncate_utf8;
use cobalt_shared::{DownloadResult, ErrorKind, Stage};
use futures::StreamExt;
use reqwest::{Client, Response};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::diagnostic_text;

/// Called with the cumulative number of bytes written so far.
pub type ProgressCallback = Arc<dyn Fn(u64) + Send + Sync>;

/// Bytes of the destination name kept in a partial file name.
const PARTIAL_NAME_PREFIX: usize = 128;

/// Temporary file owned by one transfer.
///
/// Removed on drop unless [`PartialFile::commit`] succeeded, so the file
/// disappears even when the owning future is dropped mid-transfer.
pub struct PartialFile {
    path: PathBuf,
    file: Option<fs::File>,
    written: u64,
}

impl PartialFile {
    /// Create a uniquely named partial file in `destination`'s directory.
    pub async fn create(destination: &Path) -> std::io::Result<Self> {
        let path = partial_path(destination);
        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        debug!("Created partial file {}", path.display());
        Ok(Self {
            path,
            file: Some(file),
            written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub async fn write(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        let file = self.file.as_mut().ok_or_else(closed)?;
        file.write_all(bytes).await?;
        self.written += bytes.len() as u64;
        Ok(())
    }

    /// Flush to disk and rename onto `destination`.
    pub async fn commit(mut self, destination: &Path) -> std::io::Result<u64> {
        let mut file = self.file.take().ok_or_else(closed)?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&self.path, destination).await?;
        // Renamed away; nothing left for Drop to clean up.
        self.path = PathBuf::new();
        Ok(self.written)
    }

    /// Remove the partial file now instead of waiting for drop.
    pub async fn discard(mut self) {
        drop(self.file.take());
        if let Err(e) = fs::remove_file(&self.path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove partial file {}: {}", self.path.display(), e);
            }
        }
        self.path = PathBuf::new();
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if self.path.as_os_str().is_empty() {
            return;
        }
        drop(self.file.take());
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed abandoned partial file {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove partial file {}: {}", self.path.display(), e),
        }
    }
}

fn closed() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, "partial file already closed")
}

/// `dir/.name.<uuid>.part` for `dir/name`, with `name` cut to
/// [`PARTIAL_NAME_PREFIX`] bytes so the result stays within NAME_MAX.
fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "download".to_string());
    truncate_utf8(&mut name, PARTIAL_NAME_PREFIX);
    let partial_name = format!(".{}.{}.part", name, uuid::Uuid::new_v4().simple());
    match destination.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join(partial_name),
        _ => PathBuf::from(partial_name),
    }
}

/// Downloads a resolved media URL to a local path.
#[derive(Clone)]
pub struct StreamDownloader {
    http: Client,
    chunk_size: usize,
    error_body_limit: usize,
}

impl StreamDownloader {
    pub fn new(http: Client, config: &ClientConfig) -> Self {
        let config = config.clone().normalized();
        Self {
            http,
            chunk_size: config.chunk_size,
            error_body_limit: config.error_body_limit,
        }
    }

    /// Stream `media_url` into `destination`.
    ///
    /// The caller has already confirmed that overwriting `destination` is fine.
    pub async fn download(
        &self,
        media_url: &str,
        destination: &Path,
        cancel: &CancellationToken,
        progress: Option<&ProgressCallback>,
    ) -> DownloadResult {
        info!("Downloading {} -> {}", media_url, destination.display());

        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Download of {} canceled before response", media_url);
                return DownloadResult::Canceled;
            }
            sent = self.http.get(media_url).send() => sent,
        };

        let mut response = match sent {
            Ok(r) => r,
            Err(e) => {
                warn!("Download request for {} failed: {}", media_url, e);
                return DownloadResult::Failed(ErrorKind::Transport {
                    stage: Stage::Download,
                    status: e.status().map(|s| s.as_u16()),
                    detail: e.to_string(),
                });
            }
        };

        let status = response.status();
        if !status.is_success() {
            let detail = diagnostic_text(&mut response, self.error_body_limit).await;
            warn!("Download of {} answered {}", media_url, status);
            return DownloadResult::Failed(ErrorKind::Transport {
                stage: Stage::Download,
                status: Some(status.as_u16()),
                detail,
            });
        }
        debug!("Download response {} (length: {:?})", status, response.content_length());

        let partial = match PartialFile::create(destination).await {
            Ok(p) => p,
            Err(e) => {
                warn!("Cannot create partial file for {}: {}", destination.display(), e);
                return DownloadResult::Failed(ErrorKind::io(destination, &e));
            }
        };

        self.transfer(response, partial, media_url, destination, cancel, progress).await
    }

    /// Copy the body of `response` into `partial`, then move it onto
    /// `destination`.
    async fn transfer(
        &self,
        response: Response,
        mut partial: PartialFile,
        media_url: &str,
        destination: &Path,
        cancel: &CancellationToken,
        progress: Option<&ProgressCallback>,
    ) -> DownloadResult {
        let mut stream = response.bytes_stream();
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Download of {} canceled after {} bytes", media_url, partial.written());
                    partial.discard().await;
                    return DownloadResult::Canceled;
                }
                next = stream.next() => next,
            };

            let bytes = match next {
                None => break,
                Some(Ok(bytes)) => bytes,
                Some(Err(e)) => {
                    warn!("Read error after {} bytes of {}: {}", partial.written(), media_url, e);
                    let err = std::io::Error::new(std::io::ErrorKind::Other, e);
                    partial.discard().await;
                    return DownloadResult::Failed(ErrorKind::io(destination, &err));
                }
            };

            for piece in bytes.chunks(self.chunk_size) {
                if cancel.is_cancelled() {
                    info!("Download of {} canceled after {} bytes", media_url, partial.written());
                    partial.discard().await;
                    return DownloadResult::Canceled;
                }
                if let Err(e) = partial.write(piece).await {
                    warn!("Write error on {}: {}", partial.path().display(), e);
                    let failure = ErrorKind::io(partial.path(), &e);
                    partial.discard().await;
                    return DownloadResult::Failed(failure);
                }
                if let Some(report) = progress {
                    report(partial.written());
                }
            }
        }

        if cancel.is_cancelled() {
            partial.discard().await;
            return DownloadResult::Canceled;
        }

        // commit consumes the guard; a failed rename still removes the file on drop
        match partial.commit(destination).await {
            Ok(bytes_written) => {
                info!("Saved {} bytes to {}", bytes_written, destination.display());
                DownloadResult::Saved {
                    path: destination.to_path_buf(),
                    bytes_written,
                }
            }
            Err(e) => {
                warn!("Failed to finalize {}: {}", destination.display(), e);
                DownloadResult::Failed(ErrorKind::io(destination, &e))
            }
        }
    }
}
