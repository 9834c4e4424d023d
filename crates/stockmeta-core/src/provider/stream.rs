//! Line-buffered decoding of streaming HTTP bodies.
//!
//! Server-sent events and newline-delimited JSON both arrive as arbitrary
//! byte chunks. Lines are reassembled across chunk boundaries (including split
//! UTF-8 sequences) before each complete line is handed to a parser.

use futures_util::stream::{self, BoxStream, StreamExt};
use std::collections::VecDeque;

use super::TextStream;
use crate::error::ProviderError;

/// What a parser made of one complete line.
pub(crate) enum Frame {
    /// A text delta to yield.
    Text(String),
    /// Nothing to yield (keep-alive, metadata event, blank delta).
    Skip,
    /// The backend signalled completion.
    Done,
    /// The backend reported an error mid-stream.
    Error(ProviderError),
}

pub(crate) type ByteStream = BoxStream<'static, Result<Vec<u8>, ProviderError>>;

/// Adapt a reqwest body into a byte-chunk stream.
pub(crate) fn byte_stream(resp: reqwest::Response, provider: &str) -> ByteStream {
    let provider = provider.to_string();
    resp.bytes_stream()
        .map(move |chunk| {
            chunk
                .map(|b| b.to_vec())
                .map_err(|e| ProviderError::api(&provider, format!("stream interrupted: {e}")))
        })
        .boxed()
}

/// Payload of an SSE `data:` line, if this is one.
pub(crate) fn sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

struct LineDecoder<F> {
    bytes: ByteStream,
    buffer: Vec<u8>,
    pending: VecDeque<Result<String, ProviderError>>,
    finished: bool,
    parse: F,
}

impl<F> LineDecoder<F>
where
    F: FnMut(&str) -> Frame,
{
    fn handle_line(&mut self, raw: &[u8]) {
        if self.finished {
            return;
        }
        let line = String::from_utf8_lossy(raw);
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        match (self.parse)(line) {
            Frame::Text(text) if !text.is_empty() => self.pending.push_back(Ok(text)),
            Frame::Text(_) | Frame::Skip => {}
            Frame::Done => self.finished = true,
            Frame::Error(e) => {
                self.pending.push_back(Err(e));
                self.finished = true;
            }
        }
    }

    fn drain_complete_lines(&mut self) {
        while let Some(idx) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=idx).collect();
            self.handle_line(&line[..idx]);
        }
    }
}

/// Decode a byte stream line by line into text deltas.
pub(crate) fn decode_lines<F>(bytes: ByteStream, parse: F) -> TextStream
where
    F: FnMut(&str) -> Frame + Send + 'static,
{
    let decoder = LineDecoder {
        bytes,
        buffer: Vec::new(),
        pending: VecDeque::new(),
        finished: false,
        parse,
    };

    stream::unfold(decoder, |mut dec| async move {
        loop {
            if let Some(item) = dec.pending.pop_front() {
                return Some((item, dec));
            }
            if dec.finished {
                return None;
            }
            match dec.bytes.next().await {
                Some(Ok(chunk)) => {
                    dec.buffer.extend_from_slice(&chunk);
                    dec.drain_complete_lines();
                }
                Some(Err(e)) => {
                    dec.finished = true;
                    return Some((Err(e), dec));
                }
                None => {
                    let rest = std::mem::take(&mut dec.buffer);
                    dec.handle_line(&rest);
                    dec.finished = true;
                }
            }
        }
    })
    .boxed()
}

/// Stream that yields one already-complete text.
pub(crate) fn single_chunk(text: String) -> TextStream {
    stream::iter(vec![Ok(text)]).boxed()
}
