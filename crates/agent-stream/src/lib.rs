//! Decoding and reduction of streamed AI agent runs.
//!
//! An agent endpoint pushes a chunked stream of SSE `data:` frames (or bare
//! JSON lines) describing one turn: answer text, thinking narration, tool
//! calls, task lists, and embedded product results. This crate frames the
//! bytes, interprets each payload under the many field-naming conventions in
//! the wild, and folds the results into one [`SessionState`].
//!
//! The decode path is synchronous and transport-free ([`StreamPipeline`]);
//! the client layer adds an HTTP transport and a cancellable run task.
//!
//! # Streaming a run
//!
//! ```no_run
//! use agent_stream::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), StreamError> {
//! let client = AgentClient::from_env()?;
//! let mut stream = client
//!     .thread(ThreadConfig::new())
//!     .run()
//!     .user_message("Find trail shoes under 150")
//!     .start_stream()
//!     .await?;
//!
//! while let Some(event) = stream.next_event().await {
//!     if let StreamEvent::Update { state, .. } = &event {
//!         println!("{}", state.display_text());
//!     }
//!     if event.is_terminal() {
//!         break;
//!     }
//! }
//! let state = stream.finish().await?;
//! println!("{} tool calls", state.tool_calls().len());
//! # Ok(())
//! # }
//! ```
//!
//! # Decoding recorded bytes
//!
//! ```
//! use agent_stream::StreamPipeline;
//!
//! let mut pipeline = StreamPipeline::new();
//! let body = b"data: {\"type\":\"TEXT_MESSAGE_CONTENT\",\"delta\":\"hi\"}\n\n";
//! for payload in pipeline.decode_chunk(body) {
//!     pipeline.apply_payload(&payload);
//! }
//! assert_eq!(pipeline.state().running_text(), "hi");
//! ```

/// Session state and the update accumulator.
pub mod accumulator;
/// Client entry point and builder.
pub mod client;
/// Content normalization helpers.
pub mod content;
/// Public error types.
pub mod errors;
/// Payload interpretation into partial updates.
pub mod interpret;
/// Tool calls, todos and product cards.
pub mod model;
/// Process-wide logging setup.
pub mod observability;
/// Byte-to-state decode pipeline.
pub mod pipeline;
/// Common imports for typical usage.
pub mod prelude;
/// `<products>` block extraction.
pub mod products;
/// Run builder, streaming handle, and cancellation handle.
pub mod run;
/// User-facing mapping of run errors.
pub mod run_error;
/// Partial updates and public stream events.
pub mod stream;
/// Thread configuration and thread handle.
pub mod thread;
/// Transport seam, HTTP implementation and frame decoding.
pub mod transport;

pub use accumulator::{SessionState, StreamAccumulator, ThinkingPhase, merge_tool_calls};
pub use client::{AgentClient, AgentClientBuilder};
pub use content::normalize_content;
pub use errors::{RunFailure, StreamError, TransportError};
pub use interpret::{extract_update, status_from_tool_name};
pub use model::{ProductCard, TextOrNumber, TodoItem, ToolCall, ToolStatus};
pub use observability::init_observability;
pub use pipeline::{StreamPipeline, consume_byte_stream};
pub use products::{ProductExtraction, extract_products};
pub use run::{AbortHandle, RunBuilder, RunOptions, RunStream};
pub use run_error::{MappedRunError, map_run_error, map_transport_failure};
pub use stream::{StreamEvent, StreamUpdate, ToolCallPatch};
pub use thread::{Thread, ThreadConfig};
pub use transport::{ClientConfig, HttpTransport, RunRequest, Transport, TransportResponse};
