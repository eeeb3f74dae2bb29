use std::sync::Arc;

use futures::StreamExt as _;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

use crate::accumulator::SessionState;
use crate::errors::{RunFailure, StreamError, run_failure_from_transport_error};
use crate::pipeline::StreamPipeline;
use crate::stream::{StreamEvent, StreamUpdate};
use crate::transport::{RunRequest, Transport, TransportResponse};

/// Default bound of the event channel between the run task and the consumer.
pub const DEFAULT_STREAM_BUFFER_CAPACITY: usize = 128;

/// Per-run runtime options.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunOptions {
    /// Bound of the event channel between the run task and the consumer.
    pub stream_buffer_capacity: usize,
    /// Emit `StreamEvent::Payload` for every decoded payload.
    pub emit_raw_events: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            stream_buffer_capacity: DEFAULT_STREAM_BUFFER_CAPACITY,
            emit_raw_events: false,
        }
    }
}

/// Handle used to request cancellation of a running stream.
#[derive(Clone)]
pub struct AbortHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl AbortHandle {
    /// Requests cancellation.
    ///
    /// Cancellation is best-effort and becomes visible as a terminal
    /// `StreamEvent::Error` with `RunFailure::Cancelled`. No update is
    /// delivered after the request is observed.
    pub fn abort(&self) {
        let _ = self.tx.send(true);
    }

    /// Returns `true` once `abort` has been called.
    pub fn is_aborted(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Builder for one run: the user message plus request and runtime options.
pub struct RunBuilder {
    transport: Arc<dyn Transport>,
    thread_id: String,
    message: Option<String>,
    message_id: Option<String>,
    state: Value,
    forwarded_props: Value,
    options: RunOptions,
}

impl RunBuilder {
    pub(crate) fn new(transport: Arc<dyn Transport>, thread_id: String, options: RunOptions) -> Self {
        Self {
            transport,
            thread_id,
            message: None,
            message_id: None,
            state: Value::Object(Default::default()),
            forwarded_props: Value::Object(Default::default()),
            options,
        }
    }

    /// Sets the user message sent with the run.
    pub fn user_message(mut self, text: impl Into<String>) -> Self {
        self.message = Some(text.into());
        self
    }

    /// Sets the id of the user message. A random id is used otherwise.
    pub fn message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    /// Sets the agent state object sent with the request.
    pub fn state(mut self, state: Value) -> Self {
        self.state = state;
        self
    }

    /// Sets the `forwardedProps` object sent with the request.
    pub fn forwarded_props(mut self, props: Value) -> Self {
        self.forwarded_props = props;
        self
    }

    /// Sets the bounded stream buffer size used between the runtime task and
    /// the consumer.
    pub fn stream_buffer_capacity(mut self, capacity: usize) -> Self {
        self.options.stream_buffer_capacity = capacity;
        self
    }

    /// Emits every decoded payload as `StreamEvent::Payload` before its update.
    pub fn emit_raw_events(mut self, enabled: bool) -> Self {
        self.options.emit_raw_events = enabled;
        self
    }

    /// Validates the builder state and starts a streaming run.
    ///
    /// The returned `RunStream` yields `RunStarted`, then one `Update` per
    /// delivered update, then a terminal `Completed` or `Error` event.
    pub async fn start_stream(self) -> Result<RunStream, StreamError> {
        let transport = self.transport.clone();
        let (request, options) = self.validate_and_build_request()?;

        let (tx, rx) = mpsc::channel(options.stream_buffer_capacity);
        let (final_tx, final_rx) = oneshot::channel();
        let (abort_tx, abort_rx) = watch::channel(false);

        let abort_handle = AbortHandle {
            tx: Arc::new(abort_tx),
        };
        let run_id = request.run_id;
        let thread_id = request.thread_id.clone();
        tokio::spawn(run_task(transport, request, options, tx, final_tx, abort_rx));

        Ok(RunStream {
            run_id,
            thread_id,
            rx,
            final_rx,
            abort_handle,
            saw_terminal: false,
        })
    }

    /// Runs to completion and returns the final session state.
    pub async fn collect_state(self) -> Result<SessionState, StreamError> {
        let stream = self.start_stream().await?;
        stream.finish().await
    }

    /// Runs to completion and returns the answer text with any product block
    /// removed.
    pub async fn collect_text(self) -> Result<String, StreamError> {
        Ok(self.collect_state().await?.display_text().to_string())
    }

    fn validate_and_build_request(self) -> Result<(RunRequest, RunOptions), StreamError> {
        if self.thread_id.trim().is_empty() {
            return Err(StreamError::Validation("thread id must not be empty".into()));
        }
        if self.options.stream_buffer_capacity == 0 {
            return Err(StreamError::Validation(
                "stream_buffer_capacity must be greater than 0".into(),
            ));
        }
        let Some(message) = self.message.filter(|m| !m.trim().is_empty()) else {
            return Err(StreamError::Validation(
                "user message must not be empty".into(),
            ));
        };
        if !self.state.is_object() {
            return Err(StreamError::Validation("state must be a JSON object".into()));
        }
        if !self.forwarded_props.is_object() {
            return Err(StreamError::Validation(
                "forwarded_props must be a JSON object".into(),
            ));
        }

        let message_id = self
            .message_id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let mut request = RunRequest::user_message(self.thread_id, message_id, message);
        request.state = self.state;
        request.forwarded_props = self.forwarded_props;
        Ok((request, self.options))
    }
}

/// Streaming handle returned by `RunBuilder::start_stream`.
///
/// Use `next_event()` to consume events as they arrive and `finish()` to obtain
/// the final result after the terminal event.
pub struct RunStream {
    run_id: uuid::Uuid,
    thread_id: String,
    rx: mpsc::Receiver<StreamEvent>,
    final_rx: oneshot::Receiver<Result<SessionState, StreamError>>,
    abort_handle: AbortHandle,
    saw_terminal: bool,
}

impl RunStream {
    pub fn run_id(&self) -> uuid::Uuid {
        self.run_id
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    /// Returns a handle that can cancel the run.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort_handle.clone()
    }

    /// Waits for and returns the next stream event.
    ///
    /// Returns `None` after the stream channel is closed.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        let event = self.rx.recv().await;
        if event.as_ref().is_some_and(StreamEvent::is_terminal) {
            self.saw_terminal = true;
        }
        event
    }

    /// Drains the stream (if needed) and returns the terminal run result.
    ///
    /// This is safe to call after consuming events manually with `next_event()`.
    pub async fn finish(mut self) -> Result<SessionState, StreamError> {
        while !self.saw_terminal {
            match self.rx.recv().await {
                Some(event) if event.is_terminal() => self.saw_terminal = true,
                Some(_) => {}
                None => break,
            }
        }

        match self.final_rx.await {
            Ok(result) => result,
            Err(_) => Err(StreamError::protocol_msg(format!(
                "run task ended without final result (run_id={})",
                self.run_id
            ))),
        }
    }
}

/// Why the read loop stopped before the body ended.
enum Interrupt {
    Failed(RunFailure),
    ReceiverDropped,
}

impl From<RunFailure> for Interrupt {
    fn from(value: RunFailure) -> Self {
        Self::Failed(value)
    }
}

/// Sends pipeline output to the consumer, numbering updates.
struct Emitter {
    tx: mpsc::Sender<StreamEvent>,
    run_id: uuid::Uuid,
    seq: u64,
    emit_raw_events: bool,
}

impl Emitter {
    async fn send(&self, event: StreamEvent) -> bool {
        self.tx.send(event).await.is_ok()
    }

    async fn payload(&self, payload: &Value, abort_rx: &watch::Receiver<bool>) -> Result<(), Interrupt> {
        if !self.emit_raw_events {
            return Ok(());
        }
        ensure_not_aborted(abort_rx)?;
        let sent = self
            .send(StreamEvent::Payload {
                run_id: self.run_id,
                payload: payload.clone(),
            })
            .await;
        if sent { Ok(()) } else { Err(Interrupt::ReceiverDropped) }
    }

    async fn update(
        &mut self,
        update: StreamUpdate,
        state: &SessionState,
        abort_rx: &watch::Receiver<bool>,
    ) -> Result<(), Interrupt> {
        ensure_not_aborted(abort_rx)?;
        let seq = self.seq;
        debug!(run_id = %self.run_id, seq, "delivering update");
        let sent = self
            .send(StreamEvent::Update {
                run_id: self.run_id,
                seq,
                update,
                state: state.clone(),
            })
            .await;
        self.seq = self.seq.saturating_add(1);
        if sent { Ok(()) } else { Err(Interrupt::ReceiverDropped) }
    }

    /// Interprets one payload and delivers what it produced.
    async fn apply(
        &mut self,
        pipeline: &mut StreamPipeline,
        payload: &Value,
        abort_rx: &watch::Receiver<bool>,
    ) -> Result<(), Interrupt> {
        self.payload(payload, abort_rx).await?;
        match pipeline.apply_payload(payload) {
            Some(update) => self.update(update, pipeline.state(), abort_rx).await,
            None => Ok(()),
        }
    }
}

fn ensure_not_aborted(abort_rx: &watch::Receiver<bool>) -> Result<(), Interrupt> {
    if *abort_rx.borrow() {
        Err(RunFailure::Cancelled.into())
    } else {
        Ok(())
    }
}

/// Resolves once an abort is requested. Never resolves if every handle is
/// dropped without aborting.
async fn abort_requested(abort_rx: &mut watch::Receiver<bool>) {
    loop {
        if *abort_rx.borrow_and_update() {
            return;
        }
        if abort_rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

async fn run_task(
    transport: Arc<dyn Transport>,
    request: RunRequest,
    options: RunOptions,
    tx: mpsc::Sender<StreamEvent>,
    final_tx: oneshot::Sender<Result<SessionState, StreamError>>,
    mut abort_rx: watch::Receiver<bool>,
) {
    let run_id = request.run_id;
    let mut emitter = Emitter {
        tx,
        run_id,
        seq: 0,
        emit_raw_events: options.emit_raw_events,
    };

    if !emitter
        .send(StreamEvent::RunStarted {
            run_id,
            thread_id: request.thread_id.clone(),
        })
        .await
    {
        let _ = final_tx.send(Err(StreamError::protocol_msg(
            "run stream receiver dropped before RunStarted",
        )));
        return;
    }

    match drive(transport.as_ref(), &request, &mut emitter, &mut abort_rx).await {
        Ok(state) => {
            debug!(run_id = %run_id, updates = emitter.seq, "run completed");
            let sent = emitter
                .send(StreamEvent::Completed {
                    run_id,
                    state: state.clone(),
                })
                .await;
            let _ = final_tx.send(if sent {
                Ok(state)
            } else {
                Err(StreamError::protocol_msg(
                    "run stream receiver dropped before completion",
                ))
            });
        }
        Err(Interrupt::Failed(failure)) => {
            debug!(run_id = %run_id, error = %failure, "run failed");
            let _ = emitter
                .send(StreamEvent::Error {
                    run_id,
                    error: failure.clone(),
                })
                .await;
            let _ = final_tx.send(Err(StreamError::run_failed(failure)));
        }
        Err(Interrupt::ReceiverDropped) => {
            debug!(run_id = %run_id, "run stream receiver dropped");
            let _ = final_tx.send(Err(StreamError::protocol_msg(
                "run stream receiver dropped during output",
            )));
        }
    }
}

async fn drive(
    transport: &dyn Transport,
    request: &RunRequest,
    emitter: &mut Emitter,
    abort_rx: &mut watch::Receiver<bool>,
) -> Result<SessionState, Interrupt> {
    let run_id = request.run_id;
    let opened = tokio::select! {
        biased;
        _ = abort_requested(abort_rx) => return Err(RunFailure::Cancelled.into()),
        opened = transport.open(request) => opened,
    };
    let response = opened.map_err(|err| {
        debug!(run_id = %run_id, thread_id = %request.thread_id, error = %err, "run could not be opened");
        run_failure_from_transport_error(&err)
    })?;

    let mut pipeline = StreamPipeline::new();
    match response {
        TransportResponse::Json(payload) => {
            debug!(run_id = %run_id, "single json response");
            emitter.apply(&mut pipeline, &payload, abort_rx).await?;
        }
        TransportResponse::EventStream(mut body) => loop {
            let next = tokio::select! {
                biased;
                _ = abort_requested(abort_rx) => return Err(RunFailure::Cancelled.into()),
                next = body.next() => next,
            };
            match next {
                Some(Ok(chunk)) => {
                    for payload in pipeline.decode_chunk(&chunk) {
                        emitter.apply(&mut pipeline, &payload, abort_rx).await?;
                    }
                }
                Some(Err(err)) => {
                    debug!(run_id = %run_id, error = %err, "body read failed");
                    return Err(run_failure_from_transport_error(&err).into());
                }
                None => {
                    for payload in pipeline.decode_remainder() {
                        emitter.apply(&mut pipeline, &payload, abort_rx).await?;
                    }
                    break;
                }
            }
        },
    }

    if let Some(update) = pipeline.finish() {
        emitter.update(update, pipeline.state(), abort_rx).await?;
    }
    Ok(pipeline.into_state())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::TransportError;
    use crate::transport::ByteStream;
    use futures::{StreamExt as _, stream};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeTransport {
        calls: Arc<AtomicUsize>,
        last_request: Arc<Mutex<Option<RunRequest>>>,
        behavior: FakeBehavior,
    }

    enum FakeBehavior {
        Reject(TransportError),
        Chunks(Vec<Result<&'static str, TransportError>>),
        Json(Value),
        PendingOpen,
        PendingBody(&'static str),
    }

    impl FakeTransport {
        fn new(behavior: FakeBehavior) -> Self {
            Self {
                calls: Arc::new(AtomicUsize::new(0)),
                last_request: Arc::new(Mutex::new(None)),
                behavior,
            }
        }
    }

    #[async_trait::async_trait]
    impl Transport for FakeTransport {
        async fn open(&self, request: &RunRequest) -> Result<TransportResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().expect("lock") = Some(request.clone());
            match &self.behavior {
                FakeBehavior::Reject(err) => Err(err.clone()),
                FakeBehavior::Chunks(chunks) => {
                    let chunks: Vec<Result<bytes::Bytes, TransportError>> = chunks
                        .iter()
                        .map(|chunk| chunk.clone().map(|text| bytes::Bytes::from_static(text.as_bytes())))
                        .collect();
                    let body: ByteStream = Box::pin(stream::iter(chunks));
                    Ok(TransportResponse::EventStream(body))
                }
                FakeBehavior::Json(value) => Ok(TransportResponse::Json(value.clone())),
                FakeBehavior::PendingOpen => std::future::pending().await,
                FakeBehavior::PendingBody(first) => {
                    let head = stream::iter(vec![Ok(bytes::Bytes::from_static(first.as_bytes()))]);
                    let body: ByteStream = Box::pin(head.chain(stream::pending()));
                    Ok(TransportResponse::EventStream(body))
                }
            }
        }
    }

    fn builder(transport: FakeTransport) -> RunBuilder {
        RunBuilder::new(Arc::new(transport), "thread-1".into(), RunOptions::default())
            .user_message("find shoes")
    }

    async fn collect_events(stream: &mut RunStream) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(event) = stream.next_event().await {
            let terminal = event.is_terminal();
            events.push(event);
            if terminal {
                break;
            }
        }
        events
    }

    #[tokio::test]
    async fn validation_rejects_missing_message() {
        let transport = FakeTransport::new(FakeBehavior::Json(serde_json::json!({})));
        let calls = transport.calls.clone();
        let result = RunBuilder::new(Arc::new(transport), "t".into(), RunOptions::default())
            .user_message("   ")
            .start_stream()
            .await;
        let err = match result {
            Ok(_) => panic!("blank message should fail"),
            Err(err) => err,
        };
        assert!(matches!(err, StreamError::Validation(msg) if msg.contains("user message")));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn validation_rejects_zero_capacity_and_non_object_state() {
        let err = builder(FakeTransport::new(FakeBehavior::Json(serde_json::json!({}))))
            .stream_buffer_capacity(0)
            .start_stream()
            .await;
        assert!(matches!(err, Err(StreamError::Validation(msg)) if msg.contains("stream_buffer_capacity")));

        let err = builder(FakeTransport::new(FakeBehavior::Json(serde_json::json!({}))))
            .state(serde_json::json!([1, 2]))
            .start_stream()
            .await;
        assert!(matches!(err, Err(StreamError::Validation(msg)) if msg.contains("state")));
    }

    #[tokio::test]
    async fn request_carries_thread_message_and_props() {
        let transport = FakeTransport::new(FakeBehavior::Json(serde_json::json!({"content": "ok"})));
        let last = transport.last_request.clone();
        builder(transport)
            .message_id("msg-7")
            .forwarded_props(serde_json::json!({"locale": "ko"}))
            .collect_state()
            .await
            .expect("run");

        let request = last.lock().expect("lock").clone().expect("request sent");
        assert_eq!(request.thread_id, "thread-1");
        assert_eq!(request.messages[0].id, "msg-7");
        assert_eq!(request.messages[0].content, "find shoes");
        assert_eq!(request.forwarded_props["locale"], "ko");
    }

    #[tokio::test]
    async fn streams_updates_in_order_then_completes() {
        let mut stream = builder(FakeTransport::new(FakeBehavior::Chunks(vec![
            Ok("data: {\"type\":\"TEXT_MESSAGE_CONTENT\",\"delta\":\"Hel"),
            Ok("lo\"}\n\ndata: {\"type\":\"TEXT_MESSAGE_CONTENT\",\"delta\":\" there\"}\n\n"),
            Ok("data: {\"type\":\"RUN_FINISHED\"}"),
        ])))
        .start_stream()
        .await
        .expect("start");

        let events = collect_events(&mut stream).await;
        assert!(matches!(&events[0], StreamEvent::RunStarted { thread_id, .. } if thread_id == "thread-1"));

        let mut seqs = Vec::new();
        let mut texts = Vec::new();
        for event in &events {
            if let StreamEvent::Update { seq, update, state, .. } = event {
                seqs.push(*seq);
                if let Some(text) = &update.text {
                    texts.push(text.clone());
                    assert_eq!(state.running_text(), text);
                }
            }
        }
        assert_eq!(seqs, vec![0, 1, 2]);
        assert_eq!(texts, vec!["Hello", "Hello there"]);
        assert!(matches!(events.last(), Some(StreamEvent::Completed { .. })));

        let state = stream.finish().await.expect("finish");
        assert_eq!(state.running_text(), "Hello there");
        assert_eq!(state.thinking_done(), Some(true));
    }

    #[tokio::test]
    async fn raw_payload_events_precede_their_update() {
        let mut stream = builder(FakeTransport::new(FakeBehavior::Chunks(vec![Ok(
            "data: {\"type\":\"ACTIVITY_DELTA\"}\n\ndata: {\"type\":\"THINKING_START\"}\n\n",
        )])))
        .emit_raw_events(true)
        .start_stream()
        .await
        .expect("start");

        let kinds: Vec<&'static str> = collect_events(&mut stream)
            .await
            .iter()
            .map(|event| match event {
                StreamEvent::RunStarted { .. } => "started",
                StreamEvent::Payload { .. } => "payload",
                StreamEvent::Update { .. } => "update",
                StreamEvent::Completed { .. } => "completed",
                StreamEvent::Error { .. } => "error",
            })
            .collect();
        // the closing thinking-done update comes after the last payload
        assert_eq!(
            kinds,
            vec!["started", "payload", "payload", "update", "update", "completed"]
        );
    }

    #[tokio::test]
    async fn single_json_response_is_interpreted_once() {
        let state = builder(FakeTransport::new(FakeBehavior::Json(serde_json::json!({
            "messages": [{"role": "assistant", "content": "All done"}]
        }))))
        .collect_state()
        .await
        .expect("run");
        assert_eq!(state.running_text(), "All done");
        assert_eq!(state.thinking_done(), None);
    }

    #[tokio::test]
    async fn non_success_status_fails_before_any_update() {
        let mut stream = builder(FakeTransport::new(FakeBehavior::Reject(TransportError::status(
            503,
            "upstream unavailable",
        ))))
        .start_stream()
        .await
        .expect("start");

        let events = collect_events(&mut stream).await;
        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[1],
            StreamEvent::Error { error: RunFailure::Status { status: 503, body }, .. } if body == "upstream unavailable"
        ));
        assert!(matches!(
            stream.finish().await,
            Err(StreamError::RunFailed(RunFailure::Status { status: 503, .. }))
        ));
    }

    #[tokio::test]
    async fn body_error_is_terminal_after_earlier_updates() {
        let mut stream = builder(FakeTransport::new(FakeBehavior::Chunks(vec![
            Ok("data: {\"type\":\"TEXT_MESSAGE_CONTENT\",\"delta\":\"partial\"}\n\n"),
            Err(TransportError::io("connection reset by peer")),
        ])))
        .start_stream()
        .await
        .expect("start");

        let events = collect_events(&mut stream).await;
        assert!(events.iter().any(|e| matches!(e, StreamEvent::Update { .. })));
        assert!(matches!(
            events.last(),
            Some(StreamEvent::Error { error: RunFailure::Transport { message }, .. }) if message.contains("reset")
        ));
        let err = stream.finish().await.expect_err("failed run");
        assert!(!err.is_cancelled());
    }

    #[tokio::test]
    async fn cancellation_during_open_emits_terminal_error() {
        let mut stream = builder(FakeTransport::new(FakeBehavior::PendingOpen))
            .start_stream()
            .await
            .expect("start");

        let abort = stream.abort_handle();
        let started = stream.next_event().await;
        assert!(matches!(started, Some(StreamEvent::RunStarted { .. })));
        abort.abort();
        assert!(abort.is_aborted());

        let events = collect_events(&mut stream).await;
        assert!(matches!(
            events.as_slice(),
            [StreamEvent::Error { error: RunFailure::Cancelled, .. }]
        ));
        let err = stream.finish().await.expect_err("cancelled");
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn cancellation_mid_body_stops_updates() {
        let mut stream = builder(FakeTransport::new(FakeBehavior::PendingBody(
            "data: {\"type\":\"TEXT_MESSAGE_CONTENT\",\"delta\":\"first\"}\n\n",
        )))
        .start_stream()
        .await
        .expect("start");

        let abort = stream.abort_handle();
        let _ = stream.next_event().await;
        let first = stream.next_event().await;
        assert!(matches!(first, Some(StreamEvent::Update { seq: 0, .. })));
        abort.abort();

        let events = collect_events(&mut stream).await;
        assert!(matches!(
            events.as_slice(),
            [StreamEvent::Error { error: RunFailure::Cancelled, .. }]
        ));
        assert!(matches!(
            stream.finish().await,
            Err(StreamError::RunFailed(RunFailure::Cancelled))
        ));
    }
}
