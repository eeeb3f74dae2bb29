use futures::TryStreamExt as _;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use tracing::{debug, warn};

use crate::errors::{StreamError, TransportError};

use super::{ClientConfig, RunRequest, Transport, TransportResponse};

/// Transport posting run requests to an HTTP endpoint.
pub struct HttpTransport {
    client: reqwest::Client,
    config: ClientConfig,
}

impl HttpTransport {
    /// Creates a transport from explicit configuration.
    pub fn new(config: ClientConfig) -> Result<Self, StreamError> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| StreamError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Creates a transport using `AGENT_STREAM_URL`.
    pub fn from_env() -> Result<Self, StreamError> {
        Self::new(ClientConfig::from_env()?)
    }

    /// Returns the configuration this transport was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn open(&self, request: &RunRequest) -> Result<TransportResponse, TransportError> {
        debug!(run_id = %request.run_id, thread_id = %request.thread_id, endpoint = %self.config.endpoint, "opening agent run");

        let response = self
            .client
            .post(&self.config.endpoint)
            .header(ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await
            .map_err(|e| TransportError::io(format!("agent request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            warn!(run_id = %request.run_id, status = status.as_u16(), "agent endpoint rejected run");
            return Err(TransportError::status(status.as_u16(), body));
        }

        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("application/json"));
        if is_json {
            let payload = response.json::<serde_json::Value>().await.map_err(|e| {
                TransportError::protocol(format!("invalid JSON response body: {e}"))
            })?;
            return Ok(TransportResponse::Json(payload));
        }

        let stream = response
            .bytes_stream()
            .map_err(|e| TransportError::io(format!("agent stream read failed: {e}")));
        Ok(TransportResponse::EventStream(Box::pin(stream)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_invalid_config() {
        let result = HttpTransport::new(ClientConfig::new(""));
        assert!(matches!(result, Err(StreamError::Config(_))));
    }

    #[test]
    fn new_keeps_config() {
        let transport =
            HttpTransport::new(ClientConfig::new("http://localhost:8000/agent")).expect("transport");
        assert_eq!(transport.config().endpoint, "http://localhost:8000/agent");
    }

    #[tokio::test]
    async fn env_gated_smoke_open_if_endpoint_present() {
        if std::env::var("AGENT_STREAM_URL")
            .unwrap_or_default()
            .trim()
            .is_empty()
        {
            eprintln!("skipping agent endpoint smoke test (AGENT_STREAM_URL missing)");
            return;
        }
        let transport = HttpTransport::from_env().expect("transport");
        let request = RunRequest::user_message("smoke", "smoke-msg", "hello");
        let result = transport.open(&request).await;
        assert!(result.is_ok(), "agent smoke failed: {:?}", result.err());
    }
}
