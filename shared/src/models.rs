/// Result values shared between the resolution client, the downloader and callers.
use std::path::PathBuf;

use crate::errors::{ErrorKind, Stage};

/// Classified reply from the resolution service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionOutcome {
    /// The service returned a downloadable media location.
    Resolved { media_url: String },
    /// Well-formed 2xx reply reporting a logical failure.
    RemoteError { status: String, detail: String },
    /// Non-2xx reply (`http_status` set) or no reply at all (`None`).
    TransportError { http_status: Option<u16>, body: String },
}

impl ResolutionOutcome {
    pub fn is_resolved(&self) -> bool {
        matches!(self, ResolutionOutcome::Resolved { .. })
    }

    /// The media URL of a `Resolved` outcome, or the error a failed one
    /// surfaces as.
    pub fn into_media_url(self) -> Result<String, ErrorKind> {
        match self {
            ResolutionOutcome::Resolved { media_url } => Ok(media_url),
            ResolutionOutcome::RemoteError { status, detail } => {
                Err(ErrorKind::Remote { status, detail })
            }
            ResolutionOutcome::TransportError { http_status, body } => Err(ErrorKind::Transport {
                stage: Stage::Resolution,
                status: http_status,
                detail: body,
            }),
        }
    }
}

/// Terminal value of one resolve-and-download operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadResult {
    Saved { path: PathBuf, bytes_written: u64 },
    Canceled,
    Failed(ErrorKind),
}

impl DownloadResult {
    pub fn is_saved(&self) -> bool {
        matches!(self, DownloadResult::Saved { .. })
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, DownloadResult::Canceled)
    }

    pub fn error(&self) -> Option<&ErrorKind> {
        match self {
            DownloadResult::Failed(err) => Some(err),
            _ => None,
        }
    }
}

impl std::fmt::Display for DownloadResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DownloadResult::Saved { path, .. } => {
                write!(f, "Download successful. Saved to: {}", path.display())
            }
            DownloadResult::Canceled => write!(f, "Download canceled."),
            DownloadResult::Failed(err) => write!(f, "Error: {}", err),
        }
    }
}
