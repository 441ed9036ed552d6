/// Error taxonomy for resolve-and-download operations.
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Fallback message when the service gives no `text`.
pub const UNKNOWN_ERROR: &str = "Unknown error";

/// Which network call a transport failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resolution,
    Download,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Resolution => write!(f, "resolution"),
            Stage::Download => write!(f, "download"),
        }
    }
}

/// Terminal failure carried by `DownloadResult::Failed`.
///
/// Each variant keeps enough structured detail for a presentation layer
/// to render its own message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ErrorKind {
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    #[error("{}", transport_message(.stage, .status, .detail))]
    Transport {
        stage: Stage,
        /// `None` when no HTTP response was received.
        status: Option<u16>,
        detail: String,
    },

    #[error("{status} - {detail}")]
    Remote { status: String, detail: String },

    #[error("I/O error on {}: {message}", .path.display())]
    Io {
        kind: std::io::ErrorKind,
        path: PathBuf,
        message: String,
    },
}

fn transport_message(stage: &Stage, status: &Option<u16>, detail: &str) -> String {
    match status {
        Some(code) => format!("{} - {}", code, detail),
        None => format!("{} request failed: {}", stage, detail),
    }
}

impl ErrorKind {
    pub fn io(path: &Path, err: &std::io::Error) -> Self {
        ErrorKind::Io {
            kind: err.kind(),
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }

    /// Whether a caller-side retry could plausibly succeed.
    pub fn is_retriable(&self) -> bool {
        match self {
            ErrorKind::Transport { status: None, .. } => true,
            ErrorKind::Transport { status: Some(code), .. } => *code == 429 || *code >= 500,
            ErrorKind::Remote { status, .. } => status == "rate-limit",
            ErrorKind::InvalidOptions(_) | ErrorKind::Io { .. } => false,
        }
    }
}

/// Render a failed resolution response body as a readable message.
///
/// Uses the top-level `text` (or [`UNKNOWN_ERROR`]) and appends one
/// `"<field>: <message>"` line per `errorDetails` entry, in order.
/// Malformed pieces are skipped rather than failing the whole message.
pub fn describe(body: &serde_json::Value) -> String {
    let mut message = body
        .get("text")
        .and_then(|v| v.as_str())
        .unwrap_or(UNKNOWN_ERROR)
        .to_string();

    if let Some(details) = body.get("errorDetails").and_then(|v| v.as_array()) {
        for detail in details {
            let Some(text) = detail.get("message").and_then(|v| v.as_str()) else {
                continue;
            };
            match detail.get("field").and_then(|v| v.as_str()) {
                Some(field) => {
                    message.push('\n');
                    message.push_str(field);
                    message.push_str(": ");
                    message.push_str(text);
                }
                None => {
                    message.push('\n');
                    message.push_str(text);
                }
            }
        }
    }

    message
}
