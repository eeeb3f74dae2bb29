//! Common imports for typical client usage.
pub use crate::{
    AbortHandle, AgentClient, ClientConfig, RunBuilder, RunFailure, RunStream, SessionState,
    StreamError, StreamEvent, StreamUpdate, Thread, ThreadConfig, ToolStatus,
};
