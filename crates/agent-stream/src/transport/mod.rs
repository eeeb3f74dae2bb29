//! Transport seam between the run driver and the agent endpoint.
//!
//! The run driver only needs either a byte stream of frames or one JSON
//! document; [`HttpTransport`] provides both over HTTP and tests substitute
//! in-memory implementations.
mod config;
pub(crate) mod frame;
mod http;

use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::errors::TransportError;

pub use config::ClientConfig;
pub use frame::{FrameDecoder, parse_frame};
pub use http::HttpTransport;

/// Raw response body chunks.
pub type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, TransportError>> + Send + 'static>>;

/// What the endpoint answered with.
pub enum TransportResponse {
    /// Framed event stream (SSE `data:` frames or bare JSON lines).
    EventStream(ByteStream),
    /// Non-streamed mode: exactly one JSON document.
    Json(serde_json::Value),
}

/// One chat message in the run request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMessage {
    pub id: String,
    pub role: String,
    pub content: String,
}

/// Body posted to the agent endpoint to start a run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub thread_id: String,
    pub run_id: uuid::Uuid,
    pub state: serde_json::Value,
    pub messages: Vec<RequestMessage>,
    pub tools: Vec<serde_json::Value>,
    pub context: Vec<serde_json::Value>,
    pub forwarded_props: serde_json::Value,
}

impl RunRequest {
    /// Creates a request carrying a single user message.
    pub fn user_message(
        thread_id: impl Into<String>,
        message_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            thread_id: thread_id.into(),
            run_id: uuid::Uuid::new_v4(),
            state: serde_json::json!({}),
            messages: vec![RequestMessage {
                id: message_id.into(),
                role: "user".to_string(),
                content: content.into(),
            }],
            tools: Vec::new(),
            context: Vec::new(),
            forwarded_props: serde_json::json!({}),
        }
    }
}

/// Opens a run against an agent endpoint.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Sends the request and returns the response body.
    ///
    /// Non-success responses must be reported as [`TransportError::Status`]
    /// with the raw body, before any frame is handed out.
    async fn open(&self, request: &RunRequest) -> Result<TransportResponse, TransportError>;
}
