/// Wire protocol for the Cobalt resolution API.
///
/// Requests are a single JSON object POSTed to the API endpoint; replies are
/// JSON objects carrying a `status` field.
use serde::Serialize;
use tracing::debug;

use crate::errors::{describe, ErrorKind};
use crate::models::ResolutionOutcome;
use crate::options::{AudioFormat, DownloadOptions, VideoCodec, VideoQuality};

pub const STATUS_SUCCESS: &str = "success";
/// Status reported when a 2xx body is not a JSON object.
pub const STATUS_INVALID_RESPONSE: &str = "invalid-response";
/// Status reported when the reply has no string `status` field.
pub const STATUS_UNKNOWN: &str = "unknown";
pub const MISSING_MEDIA_URL: &str = "missing media url";

// ====== REQUEST ======

/// Body of a resolution request.
///
/// `isAudioOnly` is always present. `vCodec`/`vQuality` are present only for
/// video downloads; the service treats an absent field differently from a
/// default one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolutionRequest {
    url: String,
    #[serde(rename = "aFormat")]
    audio_format: AudioFormat,
    #[serde(rename = "isAudioOnly")]
    is_audio_only: bool,
    #[serde(rename = "vCodec", skip_serializing_if = "Option::is_none")]
    video_codec: Option<VideoCodec>,
    #[serde(rename = "vQuality", skip_serializing_if = "Option::is_none")]
    video_quality: Option<VideoQuality>,
}

impl ResolutionRequest {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn audio_format(&self) -> AudioFormat {
        self.audio_format
    }

    pub fn is_audio_only(&self) -> bool {
        self.is_audio_only
    }

    pub fn video_codec(&self) -> Option<VideoCodec> {
        self.video_codec
    }

    pub fn video_quality(&self) -> Option<VideoQuality> {
        self.video_quality
    }
}

/// Build the request body for `options`.
///
/// Fails with `InvalidOptions` unless the URL is an absolute http(s) URL
/// with a host.
pub fn build_request(options: &DownloadOptions) -> Result<ResolutionRequest, ErrorKind> {
    let url = validate_media_url(&options.url)?;

    let (video_codec, video_quality) = if options.audio_only {
        (None, None)
    } else {
        (Some(options.video_codec), Some(options.video_quality))
    };

    Ok(ResolutionRequest {
        url,
        audio_format: options.audio_format,
        is_audio_only: options.audio_only,
        video_codec,
        video_quality,
    })
}

fn validate_media_url(raw: &str) -> Result<String, ErrorKind> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ErrorKind::InvalidOptions("Please enter a valid URL.".into()));
    }

    let parsed = url::Url::parse(trimmed)
        .map_err(|e| ErrorKind::InvalidOptions(format!("'{}' is not a URL: {}", trimmed, e)))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ErrorKind::InvalidOptions(format!(
            "unsupported URL scheme '{}'",
            parsed.scheme()
        )));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(ErrorKind::InvalidOptions(format!("'{}' has no host", trimmed)));
    }

    Ok(trimmed.to_string())
}

// ====== RESPONSE ======

/// Classify a resolution reply from its HTTP status and (already bounded) body.
pub fn classify_response(http_status: u16, body: &[u8]) -> ResolutionOutcome {
    if !(200..300).contains(&http_status) {
        return ResolutionOutcome::TransportError {
            http_status: Some(http_status),
            body: String::from_utf8_lossy(body).into_owned(),
        };
    }

    let value: serde_json::Value = match serde_json::from_slice(body) {
        Ok(v @ serde_json::Value::Object(_)) => v,
        Ok(other) => {
            return ResolutionOutcome::RemoteError {
                status: STATUS_INVALID_RESPONSE.to_string(),
                detail: format!("expected a JSON object, got {}", json_kind(&other)),
            };
        }
        Err(e) => {
            return ResolutionOutcome::RemoteError {
                status: STATUS_INVALID_RESPONSE.to_string(),
                detail: format!("malformed JSON: {}", e),
            };
        }
    };

    let status = value
        .get("status")
        .and_then(|v| v.as_str())
        .unwrap_or(STATUS_UNKNOWN);

    if status != STATUS_SUCCESS {
        debug!("Resolution failed with status {}", status);
        return ResolutionOutcome::RemoteError {
            status: status.to_string(),
            detail: describe(&value),
        };
    }

    match value.get("url").and_then(|v| v.as_str()) {
        Some(media_url) if !media_url.trim().is_empty() => ResolutionOutcome::Resolved {
            media_url: media_url.to_string(),
        },
        _ => ResolutionOutcome::RemoteError {
            status: STATUS_SUCCESS.to_string(),
            detail: MISSING_MEDIA_URL.to_string(),
        },
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// Cut `text` to at most `limit` bytes without splitting a character.
pub fn truncate_utf8(text: &mut String, limit: usize) {
    if text.len() <= limit {
        return;
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body_of(req: &ResolutionRequest) -> serde_json::Value {
        serde_json::to_value(req).unwrap()
    }

    #[test]
    fn test_audio_only_omits_video_fields() {
        for format in AudioFormat::ALL {
            for codec in VideoCodec::ALL {
                let opts = DownloadOptions::new("https://youtu.be/dQw4w9WgXcQ")
                    .with_video(codec, VideoQuality::P1080)
                    .audio_only(format);
                let body = body_of(&build_request(&opts).unwrap());
                assert_eq!(
                    body,
                    json!({
                        "url": "https://youtu.be/dQw4w9WgXcQ",
                        "aFormat": format.as_str(),
                        "isAudioOnly": true,
                    })
                );
            }
        }
    }

    #[test]
    fn test_video_includes_codec_and_quality() {
        for quality in VideoQuality::ALL {
            let opts = DownloadOptions::new("https://youtu.be/dQw4w9WgXcQ")
                .with_audio_format(AudioFormat::Opus)
                .with_video(VideoCodec::Av1, quality);
            let req = build_request(&opts).unwrap();
            assert_eq!(req.video_quality(), Some(quality));
            let body = body_of(&req);
            assert_eq!(body["isAudioOnly"], json!(false));
            assert_eq!(body["aFormat"], json!("opus"));
            assert_eq!(body["vCodec"], json!("av1"));
            assert_eq!(body["vQuality"], json!(quality.to_string()));
        }
    }

    #[test]
    fn test_invalid_urls_rejected() {
        let rejected = [
            "",
            "   ",
            "not a url",
            "ftp://example.com/a",
            "mailto:me@example.com",
            "http://",
        ];
        for bad in rejected {
            let result = build_request(&DownloadOptions::new(bad));
            assert!(
                matches!(result, Err(ErrorKind::InvalidOptions(_))),
                "expected rejection for {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_url_is_trimmed() {
        let req = build_request(&DownloadOptions::new("  https://example.com/v  ")).unwrap();
        assert_eq!(req.url(), "https://example.com/v");
    }

    #[test]
    fn test_classify_success() {
        let outcome = classify_response(200, br#"{"status":"success","url":"http://x/y.mp3"}"#);
        assert_eq!(
            outcome,
            ResolutionOutcome::Resolved {
                media_url: "http://x/y.mp3".into()
            }
        );
    }

    #[test]
    fn test_classify_success_missing_url() {
        let bodies = [
            r#"{"status":"success"}"#,
            r#"{"status":"success","url":""}"#,
            r#"{"status":"success","url":3}"#,
        ];
        for body in bodies {
            let outcome = classify_response(200, body.as_bytes());
            assert_eq!(
                outcome,
                ResolutionOutcome::RemoteError {
                    status: "success".into(),
                    detail: MISSING_MEDIA_URL.into(),
                }
            );
        }
    }

    #[test]
    fn test_classify_remote_error() {
        let body = br#"{"status":"error","text":"bad",
            "errorDetails":[{"field":"url","message":"malformed"}]}"#;
        assert_eq!(
            classify_response(200, body),
            ResolutionOutcome::RemoteError {
                status: "error".into(),
                detail: "bad\nurl: malformed".into(),
            }
        );
    }

    #[test]
    fn test_classify_non_2xx() {
        assert_eq!(
            classify_response(500, b"server down"),
            ResolutionOutcome::TransportError {
                http_status: Some(500),
                body: "server down".into(),
            }
        );
    }

    #[test]
    fn test_classify_garbage_2xx() {
        for body in [&b"<html>oops</html>"[..], &b"[1,2]"[..]] {
            let outcome = classify_response(200, body);
            assert!(matches!(
                outcome,
                ResolutionOutcome::RemoteError { ref status, .. }
                    if status == STATUS_INVALID_RESPONSE
            ));
        }

        let outcome = classify_response(200, br#"{"text":"who knows"}"#);
        assert_eq!(
            outcome,
            ResolutionOutcome::RemoteError {
                status: STATUS_UNKNOWN.into(),
                detail: "who knows".into(),
            }
        );
    }

    #[test]
    fn test_truncate_utf8() {
        let mut s = "héllo".to_string();
        truncate_utf8(&mut s, 2);
        assert_eq!(s, "h");
        let mut s = "short".to_string();
        truncate_utf8(&mut s, 100);
        assert_eq!(s, "short");
    }
}
