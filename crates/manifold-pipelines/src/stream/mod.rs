//! Streaming response normalization.
//!
//! Vendors stream their replies in different shapes, but the host only ever
//! sees one thing: a lazy sequence of text fragments.  The pieces are:
//!
//! - [`StreamNormalizer`] -- per-wire-format state machine turning one raw
//!   line into zero or more fragments.
//! - [`LineBuffer`] -- reassembles lines from arbitrarily split body chunks.
//! - [`FragmentStream`] -- the pull-based [`Stream`] handed to the host.  It
//!   owns the HTTP body, so dropping it closes the connection.
//!
//! Implementations:
//!
//! - [`anthropic`] -- SSE with content-block framing and thinking markers.
//! - [`chat_completions`] -- `data: {json}` frames with `choices[].delta`.

pub mod anthropic;
pub mod chat_completions;

use std::collections::VecDeque;
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::{self, BoxStream, Stream, StreamExt};

use crate::error::Result;

pub use anthropic::{AnthropicNormalizer, SseParser, ThinkingState};
pub use chat_completions::ChatCompletionsNormalizer;

/// Fragment emitted before the first fragment of a reasoning block.
pub const THINK_OPEN: &str = "<think>";

/// Fragment emitted after the last fragment of a reasoning block.
pub const THINK_CLOSE: &str = "</think>";

/// Raw body chunks as they come off the wire.
pub type ByteChunks = BoxStream<'static, Result<Vec<u8>>>;

// ---------------------------------------------------------------------------
// Normalizer capability
// ---------------------------------------------------------------------------

/// Whether a normalizer wants more input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep feeding lines.
    Continue,
    /// The vendor signalled the end of the message.
    Done,
}

/// Turns the lines of one vendor's streaming body into text fragments.
///
/// Implementations must never fail: a line that cannot be decoded is logged
/// and skipped so the rest of the stream still comes through.
pub trait StreamNormalizer: Send {
    /// Feed a single line (without its trailing newline), appending any
    /// resulting fragments to `out` in emission order.
    fn feed_line(&mut self, line: &str, out: &mut Vec<String>) -> Flow;

    /// Called once when the body ends without a terminal event.
    fn finish(&mut self, _out: &mut Vec<String>) {}
}

// ---------------------------------------------------------------------------
// Line reassembly
// ---------------------------------------------------------------------------

/// Buffers body bytes and yields complete lines.
///
/// Bytes are kept undecoded until a full line is available so multi-byte
/// characters split across chunks survive intact.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk of body bytes.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Pop the next complete line, with `\n` / `\r\n` stripped.
    pub fn next_line(&mut self) -> Option<Vec<u8>> {
        let newline_pos = self.buf.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.buf.drain(..=newline_pos).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(line)
    }

    /// Take whatever is left once the body has ended.
    pub fn take_remainder(&mut self) -> Option<Vec<u8>> {
        if self.buf.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buf))
        }
    }
}

// ---------------------------------------------------------------------------
// Fragment stream
// ---------------------------------------------------------------------------

/// A lazy, forward-only sequence of reply fragments.
///
/// The stream pulls body chunks only when the host polls it.  Once the vendor
/// signals the end of the message, the body is released immediately; any
/// remaining bytes are never read.  A transport failure while reading ends
/// the sequence with a single `"Error: <message>"` fragment.
pub struct FragmentStream {
    chunks: ByteChunks,
    lines: LineBuffer,
    normalizer: Box<dyn StreamNormalizer>,
    pending: VecDeque<String>,
    scratch: Vec<String>,
    finished: bool,
}

impl FragmentStream {
    /// Wrap a body chunk stream with the given normalizer.
    pub fn new(chunks: ByteChunks, normalizer: Box<dyn StreamNormalizer>) -> Self {
        Self {
            chunks,
            lines: LineBuffer::new(),
            normalizer,
            pending: VecDeque::new(),
            scratch: Vec::new(),
            finished: false,
        }
    }

    /// Build a stream from an in-memory list of chunks.
    pub fn from_chunks<I>(chunks: I, normalizer: Box<dyn StreamNormalizer>) -> Self
    where
        I: IntoIterator<Item = Result<Vec<u8>>>,
        I::IntoIter: Send + 'static,
    {
        Self::new(stream::iter(chunks).boxed(), normalizer)
    }

    fn feed(&mut self, raw: Vec<u8>) {
        let line = match String::from_utf8(raw) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "skipping stream line with invalid UTF-8");
                return;
            }
        };

        let flow = self.normalizer.feed_line(&line, &mut self.scratch);
        self.pending.extend(self.scratch.drain(..));
        if flow == Flow::Done {
            self.finish();
        }
    }

    fn close_normalizer(&mut self) {
        self.normalizer.finish(&mut self.scratch);
        self.pending.extend(self.scratch.drain(..));
    }

    /// Stop reading and drop the body so the connection is released.
    fn finish(&mut self) {
        self.finished = true;
        self.chunks = stream::empty().boxed();
        self.lines = LineBuffer::new();
    }
}

impl Stream for FragmentStream {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<String>> {
        let this = &mut *self;

        loop {
            if let Some(fragment) = this.pending.pop_front() {
                return Poll::Ready(Some(fragment));
            }
            if this.finished {
                return Poll::Ready(None);
            }

            if let Some(line) = this.lines.next_line() {
                this.feed(line);
                continue;
            }

            match this.chunks.poll_next_unpin(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Some(Ok(chunk))) => this.lines.extend(&chunk),
                Poll::Ready(Some(Err(e))) => {
                    tracing::error!(error = %e, "stream read failed");
                    this.close_normalizer();
                    this.pending.push_back(e.to_host_string());
                    this.finish();
                }
                Poll::Ready(None) => {
                    if let Some(rest) = this.lines.take_remainder() {
                        this.feed(rest);
                    }
                    if !this.finished {
                        this.close_normalizer();
                        this.finish();
                    }
                }
            }
        }
    }
}

impl fmt::Debug for FragmentStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FragmentStream")
            .field("pending", &self.pending)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
