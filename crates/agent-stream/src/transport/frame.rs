use serde_json::Value;
use tracing::debug;

const DATA_PREFIX: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";

/// Splits a chunked byte stream into blank-line delimited frames.
///
/// Frames may be split across chunks at any byte, including inside a
/// multi-byte UTF-8 sequence; the emitted frame sequence does not depend on
/// where the chunk boundaries fall.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// Bytes of an incomplete UTF-8 sequence held back from the last chunk.
    pending: Vec<u8>,
    buf: String,
    /// Set right after a delimiter; extra blank lines belong to that delimiter.
    at_boundary: bool,
}

impl FrameDecoder {
    /// Feeds one chunk and returns every frame it completed.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut decoded = String::new();
        let mut consumed = 0;
        while consumed < self.pending.len() {
            let rest = &self.pending[consumed..];
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    decoded.push_str(text);
                    consumed = self.pending.len();
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    decoded.push_str(&String::from_utf8_lossy(&rest[..valid]));
                    match err.error_len() {
                        Some(invalid) => {
                            decoded.push(char::REPLACEMENT_CHARACTER);
                            consumed += valid + invalid;
                        }
                        // Truncated sequence at the end: wait for the rest of it.
                        None => {
                            consumed += valid;
                            break;
                        }
                    }
                }
            }
        }
        self.pending.drain(..consumed);
        self.push_text(&decoded);
        self.drain_frames()
    }

    /// Signals end of input and returns the trimmed remainder, if any.
    pub fn finish(mut self) -> Option<String> {
        if !self.pending.is_empty() {
            let tail = String::from_utf8_lossy(&self.pending).into_owned();
            self.pending.clear();
            self.push_text(&tail);
        }
        let remaining = self.buf.trim();
        (!remaining.is_empty()).then(|| remaining.to_string())
    }

    fn push_text(&mut self, text: &str) {
        self.buf.push_str(text);
        if self.buf.contains('\r') {
            self.buf = self.buf.replace("\r\n", "\n");
        }
    }

    fn drain_frames(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        loop {
            if self.at_boundary {
                let rest = self.buf.trim_start_matches('\n').len();
                let skipped = self.buf.len() - rest;
                self.buf.drain(..skipped);
                // A lone `\r` may still become the first half of a CRLF.
                if self.buf.is_empty() || self.buf == "\r" {
                    break;
                }
                self.at_boundary = false;
            }
            let Some(idx) = self.buf.find("\n\n") else {
                break;
            };
            let frame: String = self.buf.drain(..idx).collect();
            self.buf.drain(..2);
            self.at_boundary = true;
            if !frame.trim().is_empty() {
                frames.push(frame);
            }
        }
        frames
    }
}

/// Extracts the JSON payloads carried by one frame.
///
/// Frames with `data:` lines are joined into a single payload; `[DONE]` and
/// unparseable data yield nothing. Frames without any `data:` line are read
/// as bare JSON lines, each parsed on its own so one bad line does not
/// discard its siblings.
pub fn parse_frame(frame: &str) -> Vec<Value> {
    let data_lines: Vec<&str> = frame
        .split('\n')
        .filter_map(|line| line.strip_prefix(DATA_PREFIX))
        .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
        .collect();

    if !data_lines.is_empty() {
        let data = data_lines.join("\n");
        let data = data.trim();
        if data.is_empty() || data == DONE_SENTINEL {
            return Vec::new();
        }
        return match serde_json::from_str(data) {
            Ok(value) => vec![value],
            Err(err) => {
                debug!(frame_len = frame.len(), error = %err, "skipping malformed data frame");
                Vec::new()
            }
        };
    }

    let mut payloads = Vec::new();
    for line in frame.split('\n') {
        let trimmed = line.trim();
        if !trimmed.starts_with('{') && !trimmed.starts_with('[') {
            continue;
        }
        match serde_json::from_str(trimmed) {
            Ok(value) => payloads.push(value),
            Err(err) => {
                debug!(line_len = trimmed.len(), error = %err, "skipping malformed json line");
            }
        }
    }
    payloads
}
