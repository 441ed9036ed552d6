/// Resolution API client.
///
/// Sends exactly one POST per `resolve` call and classifies the reply.
/// Retrying is left to callers.
use std::time::Duration;

use cobalt_shared::config::ClientConfig;
use cobalt_shared::protocol::{classify_response, truncate_utf8, ResolutionRequest};
use cobalt_shared::ResolutionOutcome;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Response};
use tracing::{debug, info, warn};

/// Build the HTTP client shared by the resolver and the downloader.
pub fn http_client(config: &ClientConfig) -> reqwest::Result<Client> {
    Client::builder().user_agent(config.user_agent.as_str()).build()
}

/// Talks to a Cobalt resolution endpoint.
#[derive(Clone)]
pub struct ResolutionClient {
    http: Client,
    api_url: String,
    error_body_limit: usize,
    response_body_limit: usize,
}

impl ResolutionClient {
    pub fn new(http: Client, config: &ClientConfig) -> Self {
        Self {
            http,
            api_url: config.api_url.clone(),
            error_body_limit: config.error_body_limit,
            response_body_limit: config.response_body_limit,
        }
    }

    /// Send `request` and classify the reply.
    ///
    /// Network failures and an expired `deadline` come back as
    /// `TransportError` with no HTTP status.
    pub async fn resolve(
        &self,
        request: &ResolutionRequest,
        deadline: Duration,
    ) -> ResolutionOutcome {
        info!("Resolving {} via {}", request.url(), self.api_url);

        let outcome = match tokio::time::timeout(deadline, self.round_trip(request)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!("Resolution of {} timed out after {:?}", request.url(), deadline);
                ResolutionOutcome::TransportError {
                    http_status: None,
                    body: format!("request timed out after {}s", deadline.as_secs_f32()),
                }
            }
        };

        match &outcome {
            ResolutionOutcome::Resolved { media_url } => {
                info!("Resolved {} -> {}", request.url(), media_url)
            }
            ResolutionOutcome::RemoteError { status, detail } => {
                warn!("Resolution rejected ({}): {}", status, detail)
            }
            ResolutionOutcome::TransportError { http_status, body } => {
                warn!("Resolution transport error ({:?}): {}", http_status, body)
            }
        }
        outcome
    }

    async fn round_trip(&self, request: &ResolutionRequest) -> ResolutionOutcome {
        let sent = self
            .http
            .post(&self.api_url)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .json(request)
            .send()
            .await;

        let mut response = match sent {
            Ok(r) => r,
            Err(e) => {
                return ResolutionOutcome::TransportError {
                    http_status: e.status().map(|s| s.as_u16()),
                    body: e.to_string(),
                };
            }
        };

        let status = response.status();
        debug!("Resolution endpoint answered {}", status);

        if !status.is_success() {
            let text = diagnostic_text(&mut response, self.error_body_limit).await;
            return classify_response(status.as_u16(), text.as_bytes());
        }

        let mut body = Vec::new();
        if let Err(e) = read_bounded(&mut response, self.response_body_limit, &mut body).await {
            return ResolutionOutcome::TransportError {
                http_status: None,
                body: format!("failed to read response body: {}", e),
            };
        }
        classify_response(status.as_u16(), &body)
    }
}

/// Append at most `limit` bytes of the response body to `buf`.
///
/// Stops pulling from the connection once the limit is reached.
pub(crate) async fn read_bounded(
    response: &mut Response,
    limit: usize,
    buf: &mut Vec<u8>,
) -> Result<(), reqwest::Error> {
    while buf.len() < limit {
        match response.chunk().await? {
            Some(chunk) => {
                let take = (limit - buf.len()).min(chunk.len());
                buf.extend_from_slice(&chunk[..take]);
            }
            None => break,
        }
    }
    Ok(())
}

/// Body of a failed response as text, cut to `limit` bytes.
pub(crate) async fn diagnostic_text(response: &mut Response, limit: usize) -> String {
    let mut buf = Vec::new();
    if let Err(e) = read_bounded(response, limit, &mut buf).await {
        debug!("Error body read cut short: {}", e);
    }
    let mut text = String::from_utf8_lossy(&buf).into_owned();
    truncate_utf8(&mut text, limit);
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use cobalt_shared::protocol::{build_request, STATUS_INVALID_RESPONSE};
    use cobalt_shared::{AudioFormat, DownloadOptions, VideoCodec, VideoQuality};
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DEADLINE: Duration = Duration::from_secs(10);

    fn client_for(api_url: String) -> ResolutionClient {
        let config = ClientConfig {
            api_url,
            ..ClientConfig::default()
        };
        ResolutionClient::new(http_client(&config).unwrap(), &config)
    }

    fn audio_request() -> ResolutionRequest {
        let options =
            DownloadOptions::new("https://youtu.be/dQw4w9WgXcQ").audio_only(AudioFormat::Mp3);
        build_request(&options).unwrap()
    }

    #[tokio::test]
    async fn test_resolved() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/json"))
            .and(header("accept", "application/json"))
            .and(header("content-type", "application/json"))
            .and(body_json(json!({
                "url": "https://youtu.be/dQw4w9WgXcQ",
                "aFormat": "mp3",
                "isAudioOnly": true,
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "url": "http://x/y.mp3",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(format!("{}/api/json", server.uri()));
        let outcome = client.resolve(&audio_request(), DEADLINE).await;
        assert_eq!(
            outcome,
            ResolutionOutcome::Resolved {
                media_url: "http://x/y.mp3".into()
            }
        );
    }

    #[tokio::test]
    async fn test_video_request_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_json(json!({
                "url": "https://youtu.be/dQw4w9WgXcQ",
                "aFormat": "ogg",
                "isAudioOnly": false,
                "vCodec": "vp9",
                "vQuality": "1080",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "url": "http://x/y.webm",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let request = build_request(
            &DownloadOptions::new("https://youtu.be/dQw4w9WgXcQ")
                .with_audio_format(AudioFormat::Ogg)
                .with_video(VideoCodec::Vp9, VideoQuality::P1080),
        )
        .unwrap();
        let outcome = client_for(server.uri()).resolve(&request, DEADLINE).await;
        assert!(outcome.is_resolved());
    }

    #[tokio::test]
    async fn test_server_error_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("server down"))
            .mount(&server)
            .await;

        let outcome = client_for(server.uri()).resolve(&audio_request(), DEADLINE).await;
        assert_eq!(
            outcome,
            ResolutionOutcome::TransportError {
                http_status: Some(500),
                body: "server down".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_error_body_truncated() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("x".repeat(100_000)))
            .mount(&server)
            .await;

        let outcome = client_for(server.uri()).resolve(&audio_request(), DEADLINE).await;
        match outcome {
            ResolutionOutcome::TransportError { http_status, body } => {
                assert_eq!(http_status, Some(503));
                assert_eq!(body.len(), cobalt_shared::config::DEFAULT_ERROR_BODY_LIMIT);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_remote_error_with_details() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "error",
                "text": "bad",
                "errorDetails": [{"field": "url", "message": "malformed"}],
            })))
            .mount(&server)
            .await;

        let outcome = client_for(server.uri()).resolve(&audio_request(), DEADLINE).await;
        assert_eq!(
            outcome,
            ResolutionOutcome::RemoteError {
                status: "error".into(),
                detail: "bad\nurl: malformed".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_oversized_success_body_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "url": "http://x/y.mp3",
                "padding": "p".repeat(100_000),
            })))
            .mount(&server)
            .await;

        let outcome = client_for(server.uri()).resolve(&audio_request(), DEADLINE).await;
        match outcome {
            ResolutionOutcome::RemoteError { status, .. } => {
                assert_eq!(status, STATUS_INVALID_RESPONSE);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_success_without_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "success"})))
            .mount(&server)
            .await;

        let outcome = client_for(server.uri()).resolve(&audio_request(), DEADLINE).await;
        assert_eq!(
            outcome,
            ResolutionOutcome::RemoteError {
                status: "success".into(),
                detail: "missing media url".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let outcome = client_for(format!("http://{}/api/json", addr))
            .resolve(&audio_request(), DEADLINE)
            .await;
        assert!(matches!(
            outcome,
            ResolutionOutcome::TransportError { http_status: None, .. }
        ));
    }

    #[tokio::test]
    async fn test_deadline_expiry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(5))
                    .set_body_json(json!({"status": "success", "url": "http://x/y"})),
            )
            .mount(&server)
            .await;

        let outcome = client_for(server.uri())
            .resolve(&audio_request(), Duration::from_millis(100))
            .await;
        assert!(matches!(
            outcome,
            ResolutionOutcome::TransportError { http_status: None, .. }
        ));
    }
}
