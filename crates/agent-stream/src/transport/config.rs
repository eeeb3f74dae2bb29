use std::time::Duration;

use crate::errors::StreamError;
use crate::run::DEFAULT_STREAM_BUFFER_CAPACITY;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for the HTTP transport and the runs it starts.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Agent endpoint that accepts the run request (for example
    /// `http://localhost:8000/agent`).
    pub endpoint: String,
    /// Timeout for establishing the connection.
    ///
    /// Streams are long-lived, so there is no overall request timeout; stall
    /// detection is left to the consumer.
    pub connect_timeout: Duration,
    /// Bounded event buffer size between the run task and the consumer.
    pub stream_buffer_capacity: usize,
}

impl ClientConfig {
    /// Creates a config with defaults for the given endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            stream_buffer_capacity: DEFAULT_STREAM_BUFFER_CAPACITY,
        }
    }

    /// Builds a config from `AGENT_STREAM_URL` and, optionally,
    /// `AGENT_STREAM_CONNECT_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, StreamError> {
        let endpoint = std::env::var("AGENT_STREAM_URL").unwrap_or_default();
        if endpoint.trim().is_empty() {
            return Err(StreamError::Config(
                "missing AGENT_STREAM_URL for agent endpoint".into(),
            ));
        }
        let mut config = Self::new(endpoint.trim());
        if let Ok(raw) = std::env::var("AGENT_STREAM_CONNECT_TIMEOUT_SECS") {
            let secs = raw.trim().parse::<u64>().map_err(|e| {
                StreamError::Config(format!(
                    "invalid AGENT_STREAM_CONNECT_TIMEOUT_SECS {raw:?}: {e}"
                ))
            })?;
            config.connect_timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }

    /// Overrides the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Overrides the stream buffer capacity.
    pub fn stream_buffer_capacity(mut self, capacity: usize) -> Self {
        self.stream_buffer_capacity = capacity;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), StreamError> {
        if self.endpoint.trim().is_empty() {
            return Err(StreamError::Config("endpoint must not be empty".into()));
        }
        if self.stream_buffer_capacity == 0 {
            return Err(StreamError::Config(
                "stream_buffer_capacity must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}
