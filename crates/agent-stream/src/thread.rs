use std::sync::Arc;

use crate::client::ClientInner;
use crate::run::RunBuilder;

/// Configuration used to open a `Thread`.
#[derive(Clone, Debug, Default)]
pub struct ThreadConfig {
    /// Existing thread id to continue. A fresh id is generated when unset.
    pub thread_id: Option<String>,
}

impl ThreadConfig {
    /// Config for a new thread with a generated id.
    pub fn new() -> Self {
        Self::default()
    }

    /// Config continuing the thread with the given id.
    pub fn resume(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: Some(thread_id.into()),
        }
    }
}

/// Conversation thread; every run started from it carries the same
/// `threadId` so the agent can keep its history.
///
/// Threads are in-memory handles only; history lives on the agent side.
#[derive(Clone)]
pub struct Thread {
    client: Arc<ClientInner>,
    thread_id: String,
}

impl Thread {
    pub(crate) fn new(client: Arc<ClientInner>, config: ThreadConfig) -> Self {
        let thread_id = config
            .thread_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        Self { client, thread_id }
    }

    pub fn id(&self) -> &str {
        &self.thread_id
    }

    /// Starts building a run in this thread.
    pub fn run(&self) -> RunBuilder {
        RunBuilder::new(
            self.client.transport.clone(),
            self.thread_id.clone(),
            self.client.run_options.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AgentClient;
    use crate::errors::TransportError;
    use crate::stream::StreamEvent;
    use crate::transport::{RunRequest, Transport, TransportResponse};

    struct NullTransport;

    #[async_trait::async_trait]
    impl Transport for NullTransport {
        async fn open(&self, _request: &RunRequest) -> Result<TransportResponse, TransportError> {
            Ok(TransportResponse::Json(serde_json::json!({})))
        }
    }

    fn client() -> AgentClient {
        AgentClient::builder()
            .transport(Arc::new(NullTransport))
            .build()
            .expect("client")
    }

    #[test]
    fn new_threads_get_distinct_ids() {
        let client = client();
        let a = client.thread(ThreadConfig::new());
        let b = client.thread(ThreadConfig::new());
        assert_ne!(a.id(), b.id());
        assert!(uuid::Uuid::parse_str(a.id()).is_ok());
    }

    #[test]
    fn resume_keeps_id_unless_blank() {
        let client = client();
        assert_eq!(client.thread(ThreadConfig::resume("t-42")).id(), "t-42");
        assert_ne!(client.thread(ThreadConfig::resume("  ")).id(), "  ");
    }

    #[tokio::test]
    async fn runs_report_the_thread_id() {
        let thread = client().thread(ThreadConfig::resume("t-1"));
        let mut stream = thread
            .run()
            .user_message("hi")
            .start_stream()
            .await
            .expect("start");
        assert_eq!(stream.thread_id(), "t-1");
        assert!(matches!(
            stream.next_event().await,
            Some(StreamEvent::RunStarted { thread_id, .. }) if thread_id == "t-1"
        ));
    }
}
