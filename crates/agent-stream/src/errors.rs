/// Errors returned by a transport before they are normalized for the public
/// run stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The endpoint answered with a non-success status.
    #[error("request failed with status {status}: {body}")]
    Status { status: u16, body: String },
    /// Connecting, sending, or reading the body failed.
    #[error("transport error: {message}")]
    Io { message: String },
    /// The response could not be interpreted (for example an unreadable JSON
    /// document in single-payload mode).
    #[error("protocol error: {message}")]
    Protocol { message: String },
}

impl TransportError {
    /// Creates a status error carrying the raw response body.
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::Status {
            status,
            body: body.into(),
        }
    }

    /// Creates an I/O-level error.
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Creates a protocol-level error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }
}

/// Terminal run failure sent through `StreamEvent::Error`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, serde::Serialize, serde::Deserialize)]
pub enum RunFailure {
    /// Endpoint rejected the run before any frame was read.
    #[error("request failed with status {status}: {body}")]
    Status { status: u16, body: String },
    /// Network or body read failed.
    #[error("transport failure: {message}")]
    Transport { message: String },
    /// The run driver detected a protocol or invariant error.
    #[error("protocol failure: {message}")]
    Protocol { message: String },
    /// The run was cancelled by the caller.
    #[error("run cancelled")]
    Cancelled,
}

impl RunFailure {
    /// Returns `true` for an intentional stop rather than a real error.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Top-level error type for the public client API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// Invalid client configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Invalid input to the run builder.
    #[error("validation error: {0}")]
    Validation(String),
    /// Terminal failure returned from a started run.
    #[error(transparent)]
    RunFailed(RunFailure),
    /// Internal protocol misuse or invariant violation.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl StreamError {
    /// Returns `true` when the error stems from caller cancellation.
    ///
    /// Consumers use this to suppress user-facing error messaging for
    /// intentional stops; it never inspects message text.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::RunFailed(RunFailure::Cancelled))
    }

    pub(crate) fn run_failed(failure: RunFailure) -> Self {
        Self::RunFailed(failure)
    }

    pub(crate) fn protocol_msg(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }
}

impl From<RunFailure> for StreamError {
    fn from(value: RunFailure) -> Self {
        StreamError::RunFailed(value)
    }
}

pub(crate) fn run_failure_from_transport_error(err: &TransportError) -> RunFailure {
    match err {
        TransportError::Status { status, body } => RunFailure::Status {
            status: *status,
            body: body.clone(),
        },
        TransportError::Io { message } => RunFailure::Transport {
            message: message.clone(),
        },
        TransportError::Protocol { message } => RunFailure::Protocol {
            message: message.clone(),
        },
    }
}
