//! Synchronous decode pipeline: bytes to frames to payloads to session state.

use futures::{Stream, StreamExt as _};
use serde_json::Value;
use tracing::debug;

use crate::accumulator::{SessionState, StreamAccumulator};
use crate::interpret::extract_update;
use crate::stream::StreamUpdate;
use crate::transport::{FrameDecoder, parse_frame};

/// Frame decoder and accumulator for one stream.
///
/// Decoding and applying are separate steps so callers can observe the
/// state after each payload: feed chunks with
/// [`decode_chunk`](Self::decode_chunk), apply each returned payload with
/// [`apply_payload`](Self::apply_payload), and flush with
/// [`decode_remainder`](Self::decode_remainder) once the body ends.
#[derive(Debug, Default)]
pub struct StreamPipeline {
    decoder: FrameDecoder,
    accumulator: StreamAccumulator,
}

impl StreamPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one body chunk and returns the payloads of every frame it
    /// completed, in frame order.
    pub fn decode_chunk(&mut self, chunk: &[u8]) -> Vec<Value> {
        let frames = self.decoder.push_chunk(chunk);
        decode_frames(frames)
    }

    /// Flushes the trailing frame left in the decoder at end of input.
    pub fn decode_remainder(&mut self) -> Vec<Value> {
        let decoder = std::mem::take(&mut self.decoder);
        decode_frames(decoder.finish().into_iter().collect())
    }

    /// Interprets one payload and folds it into the state.
    ///
    /// Returns the update to deliver, if the payload changed anything a
    /// consumer renders.
    pub fn apply_payload(&mut self, payload: &Value) -> Option<StreamUpdate> {
        self.accumulator.apply(extract_update(payload))
    }

    /// Marks a started thinking phase as done. See [`StreamAccumulator::finish`].
    pub fn finish(&mut self) -> Option<StreamUpdate> {
        self.accumulator.finish()
    }

    pub fn state(&self) -> &SessionState {
        self.accumulator.state()
    }

    pub fn into_state(self) -> SessionState {
        self.accumulator.into_state()
    }
}

fn decode_frames(frames: Vec<String>) -> Vec<Value> {
    let mut payloads = Vec::new();
    for frame in frames {
        let decoded = parse_frame(&frame);
        debug!(frame_len = frame.len(), payloads = decoded.len(), "decoded frame");
        payloads.extend(decoded);
    }
    payloads
}

/// Drains a chunked body through a [`StreamPipeline`].
///
/// `on_update` sees every delivered update with the state right after it was
/// applied, including the closing thinking-done update. The first stream
/// error ends consumption; updates already delivered stay delivered.
pub async fn consume_byte_stream<S, B, E, F>(mut stream: S, mut on_update: F) -> Result<SessionState, E>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    F: FnMut(&StreamUpdate, &SessionState),
{
    let mut pipeline = StreamPipeline::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        for payload in pipeline.decode_chunk(chunk.as_ref()) {
            if let Some(update) = pipeline.apply_payload(&payload) {
                on_update(&update, pipeline.state());
            }
        }
    }
    for payload in pipeline.decode_remainder() {
        if let Some(update) = pipeline.apply_payload(&payload) {
            on_update(&update, pipeline.state());
        }
    }
    if let Some(update) = pipeline.finish() {
        on_update(&update, pipeline.state());
    }
    Ok(pipeline.into_state())
}
