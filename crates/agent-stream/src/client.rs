use std::sync::Arc;

use crate::errors::StreamError;
use crate::run::RunOptions;
use crate::thread::{Thread, ThreadConfig};
use crate::transport::{ClientConfig, HttpTransport, Transport};

pub(crate) struct ClientInner {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) run_options: RunOptions,
}

/// Entry point for opening threads and streaming agent runs.
#[derive(Clone)]
pub struct AgentClient {
    pub(crate) inner: Arc<ClientInner>,
}

impl AgentClient {
    /// Starts a builder for configuring the transport and run defaults.
    pub fn builder() -> AgentClientBuilder {
        AgentClientBuilder::default()
    }

    /// Creates a client over an HTTP transport.
    pub fn from_config(config: ClientConfig) -> Result<Self, StreamError> {
        let capacity = config.stream_buffer_capacity;
        Self::builder()
            .transport(Arc::new(HttpTransport::new(config)?))
            .stream_buffer_capacity(capacity)
            .build()
    }

    /// Creates an HTTP client from `AGENT_STREAM_*` environment variables.
    pub fn from_env() -> Result<Self, StreamError> {
        Self::from_config(ClientConfig::from_env()?)
    }

    /// Opens a conversation thread; runs started from it share a thread id.
    pub fn thread(&self, config: ThreadConfig) -> Thread {
        Thread::new(self.inner.clone(), config)
    }
}

/// Builder used to wire a transport before creating an `AgentClient`.
#[derive(Default)]
pub struct AgentClientBuilder {
    transport: Option<Arc<dyn Transport>>,
    run_options: RunOptions,
}

impl AgentClientBuilder {
    /// Sets the transport used to open runs.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Default event buffer size for runs started by this client.
    pub fn stream_buffer_capacity(mut self, capacity: usize) -> Self {
        self.run_options.stream_buffer_capacity = capacity;
        self
    }

    /// Emit raw payload events on every run by default.
    pub fn emit_raw_events(mut self, enabled: bool) -> Self {
        self.run_options.emit_raw_events = enabled;
        self
    }

    /// Builds the client, checking that a transport was provided.
    pub fn build(self) -> Result<AgentClient, StreamError> {
        let transport = self
            .transport
            .ok_or_else(|| StreamError::Config("no transport configured".into()))?;
        if self.run_options.stream_buffer_capacity == 0 {
            return Err(StreamError::Config(
                "stream_buffer_capacity must be greater than 0".into(),
            ));
        }
        Ok(AgentClient {
            inner: Arc::new(ClientInner {
                transport,
                run_options: self.run_options,
            }),
        })
    }
}
