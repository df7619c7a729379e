//! Server-sent event decoding and the plain-text adapter over a completion
//! stream.

use std::{
    collections::VecDeque,
    pin::Pin,
    task::{Context, Poll},
};

use bytes::Bytes;
use futures::{Stream, StreamExt, ready};
use tracing::debug;

use super::{CompletionError, RawCompletionStream};
use crate::protocol::ChatCompletionChunk;

const DONE_MARKER: &str = "[DONE]";

/// One decoded SSE block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

/// Incremental SSE block splitter. Input may be cut at any byte.
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every block it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.pending
            .extend(chunk.iter().copied().filter(|&b| b != b'\r'));

        let mut events = Vec::new();
        while let Some(pos) = find_block_end(&self.pending) {
            let block: Vec<u8> = self.pending.drain(..pos + 2).collect();
            if let Some(event) = parse_sse_block(&String::from_utf8_lossy(&block[..pos])) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a trailing block that was not terminated by a blank line.
    pub fn finish(&mut self) -> Option<SseEvent> {
        let block = std::mem::take(&mut self.pending);
        parse_sse_block(&String::from_utf8_lossy(&block))
    }
}

fn find_block_end(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\n\n")
}

/// Parse a block into event name and data. Blocks without data lines carry
/// nothing to relay.
fn parse_sse_block(block: &str) -> Option<SseEvent> {
    let mut event = None;
    let mut data_lines: Vec<&str> = Vec::new();

    for line in block.lines() {
        if let Some(rest) = line.strip_prefix("event:") {
            event = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }

    if data_lines.is_empty() {
        return None;
    }
    Some(SseEvent {
        event,
        data: data_lines.join("\n"),
    })
}

enum Decoded {
    Text(String),
    Skip,
    Done,
    Failed(CompletionError),
}

fn decode_event(event: &SseEvent) -> Decoded {
    let data = event.data.trim();
    if data == DONE_MARKER {
        return Decoded::Done;
    }

    let chunk: ChatCompletionChunk = match serde_json::from_str(data) {
        Ok(chunk) => chunk,
        Err(e) => {
            debug!("Skipping unparseable stream payload: {}", e);
            return Decoded::Skip;
        }
    };

    if let Some(error) = chunk.error {
        let message = error
            .message
            .unwrap_or_else(|| "Completion stream reported an error".to_string());
        return Decoded::Failed(CompletionError::Stream(message));
    }

    match chunk.content() {
        Some(text) => Decoded::Text(text.to_string()),
        None => Decoded::Skip,
    }
}

/// Plain-text view of a completion stream: yields the assistant's content
/// deltas in order and ends at `[DONE]`, at the end of the upstream body, or
/// after the first error.
pub struct TextStream {
    upstream: RawCompletionStream,
    decoder: SseDecoder,
    ready: VecDeque<Result<Bytes, CompletionError>>,
    finished: bool,
}

impl TextStream {
    pub fn new(upstream: RawCompletionStream) -> Self {
        Self {
            upstream,
            decoder: SseDecoder::new(),
            ready: VecDeque::new(),
            finished: false,
        }
    }

    fn handle(&mut self, event: &SseEvent) {
        match decode_event(event) {
            Decoded::Text(text) => self.ready.push_back(Ok(Bytes::from(text))),
            Decoded::Skip => {}
            Decoded::Done => self.finished = true,
            Decoded::Failed(err) => {
                self.ready.push_back(Err(err));
                self.finished = true;
            }
        }
    }
}

impl Stream for TextStream {
    type Item = Result<Bytes, CompletionError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(item) = this.ready.pop_front() {
                return Poll::Ready(Some(item));
            }
            if this.finished {
                return Poll::Ready(None);
            }

            match ready!(this.upstream.poll_next_unpin(cx)) {
                Some(Ok(chunk)) => {
                    for event in this.decoder.push(&chunk) {
                        this.handle(&event);
                        if this.finished {
                            break;
                        }
                    }
                }
                Some(Err(err)) => {
                    this.ready.push_back(Err(err));
                    this.finished = true;
                }
                None => {
                    if let Some(event) = this.decoder.finish() {
                        this.handle(&event);
                    }
                    this.finished = true;
                }
            }
        }
    }
}
