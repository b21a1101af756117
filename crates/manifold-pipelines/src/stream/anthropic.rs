//! SSE stream normalization for the Anthropic Messages API.
//!
//! The Anthropic streaming format sends `event:` and `data:` lines in
//! standard SSE format.  [`SseParser`] turns those lines into typed
//! [`StreamEvent`] values; [`ThinkingState`] turns events into text
//! fragments, wrapping every thinking block in [`THINK_OPEN`] /
//! [`THINK_CLOSE`] markers.

use serde_json::Value;

use super::{Flow, StreamNormalizer, THINK_CLOSE, THINK_OPEN};
use crate::error::{PipelineError, Result};

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// The kind of a content block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// Final answer text.
    Text,
    /// Extended-thinking (reasoning) content.
    Thinking,
    /// Anything else (tool use, redacted thinking, ...); never emitted.
    Other,
}

impl BlockKind {
    fn from_block_type(block_type: &str) -> Self {
        match block_type {
            "text" => Self::Text,
            "thinking" => Self::Thinking,
            _ => Self::Other,
        }
    }
}

/// Events of the Anthropic Messages stream that matter for normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// The stream has started.
    MessageStart { message_id: String, model: String },

    /// A new content block has started, possibly carrying initial content.
    BlockStart {
        kind: BlockKind,
        initial: Option<String>,
    },

    /// An incremental fragment within the current content block.
    Delta { kind: BlockKind, fragment: String },

    /// The current content block has finished.
    BlockStop,

    /// Top-level message metadata changed (stop reason, usage).
    MessageDelta { stop_reason: Option<String> },

    /// The message is complete.
    MessageStop,

    /// A keepalive event.
    Ping,

    /// The API reported an error mid-stream.
    Error { message: String },
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Parses raw SSE lines from the Anthropic Messages API stream.
///
/// The event type is taken from the JSON payload's `type` field, falling back
/// to the most recent `event:` line when the payload has none.
#[derive(Debug, Default)]
pub struct SseParser {
    /// The most recently seen `event:` type.
    current_event_type: Option<String>,
}

impl SseParser {
    /// Create a new parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a single line from the SSE stream.
    ///
    /// Returns `Some(event)` when a complete event has been parsed, `None` for
    /// comment lines, blank lines, unknown events, or the `event:` line itself.
    pub fn parse_line(&mut self, line: &str) -> Result<Option<StreamEvent>> {
        let line = line.trim_end();

        if line.is_empty() {
            self.current_event_type = None;
            return Ok(None);
        }

        // SSE comment lines start with `:`.
        if line.starts_with(':') {
            return Ok(None);
        }

        if let Some(event_type) = field_value(line, "event") {
            self.current_event_type = Some(event_type.to_owned());
            return Ok(None);
        }

        if let Some(data) = field_value(line, "data") {
            let event_type = self.current_event_type.take();
            return self.parse_data(event_type.as_deref(), data);
        }

        tracing::trace!(line, "ignoring unrecognised SSE line");
        Ok(None)
    }

    /// Parse a `data:` payload into a [`StreamEvent`].
    fn parse_data(&self, event_type: Option<&str>, data: &str) -> Result<Option<StreamEvent>> {
        if data.trim() == "[DONE]" {
            return Ok(Some(StreamEvent::MessageStop));
        }

        let v: Value = serde_json::from_str(data)
            .map_err(|e| PipelineError::decode(format!("invalid JSON in SSE data: {e}")))?;

        let kind = v["type"]
            .as_str()
            .or(event_type)
            .ok_or_else(|| PipelineError::decode("SSE event without a type"))?;

        let event = match kind {
            "message_start" => {
                let message = &v["message"];
                StreamEvent::MessageStart {
                    message_id: json_string(message, "id"),
                    model: json_string(message, "model"),
                }
            }

            "content_block_start" => {
                let block = require(&v, "content_block")?;
                let kind = BlockKind::from_block_type(block["type"].as_str().unwrap_or_default());
                let initial = match kind {
                    BlockKind::Text => block["text"].as_str(),
                    BlockKind::Thinking => block["thinking"].as_str(),
                    BlockKind::Other => None,
                };
                StreamEvent::BlockStart {
                    kind,
                    initial: initial.map(str::to_owned),
                }
            }

            "content_block_delta" => {
                let delta = require(&v, "delta")?;
                match delta["type"].as_str().unwrap_or_default() {
                    "text_delta" => StreamEvent::Delta {
                        kind: BlockKind::Text,
                        fragment: require_str(delta, "text")?,
                    },
                    "thinking_delta" => StreamEvent::Delta {
                        kind: BlockKind::Thinking,
                        fragment: require_str(delta, "thinking")?,
                    },
                    other => {
                        tracing::trace!(delta_type = other, "ignoring non-text delta");
                        return Ok(None);
                    }
                }
            }

            "content_block_stop" => StreamEvent::BlockStop,

            "message_delta" => StreamEvent::MessageDelta {
                stop_reason: v["delta"]["stop_reason"].as_str().map(String::from),
            },

            "message_stop" => StreamEvent::MessageStop,

            "ping" => StreamEvent::Ping,

            "error" => StreamEvent::Error {
                message: v["error"]["message"]
                    .as_str()
                    .unwrap_or("unknown stream error")
                    .to_owned(),
            },

            other => {
                tracing::trace!(event_type = other, "ignoring unknown SSE event type");
                return Ok(None);
            }
        };

        Ok(Some(event))
    }
}

// ---------------------------------------------------------------------------
// Thinking state machine
// ---------------------------------------------------------------------------

/// Tracks the open content block and emits fragments for each event.
#[derive(Debug, Default)]
pub struct ThinkingState {
    current: Option<BlockKind>,
}

impl ThinkingState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event, appending the fragments it produces to `out`.
    pub fn apply(&mut self, event: StreamEvent, out: &mut Vec<String>) -> Flow {
        match event {
            StreamEvent::BlockStart { kind, initial } => {
                self.close_thinking(out);
                self.current = Some(kind);
                if kind == BlockKind::Thinking {
                    out.push(THINK_OPEN.to_owned());
                }
                if kind != BlockKind::Other {
                    push_fragment(out, initial);
                }
            }

            StreamEvent::Delta { kind, fragment } => {
                if kind != BlockKind::Other {
                    push_fragment(out, Some(fragment));
                }
            }

            StreamEvent::BlockStop => {
                self.close_thinking(out);
                self.current = None;
            }

            StreamEvent::MessageStop => {
                self.finish(out);
                return Flow::Done;
            }

            StreamEvent::Error { message } => {
                tracing::error!(reason = %message, "anthropic stream reported an error");
                self.finish(out);
                out.push(format!("Error: {message}"));
                return Flow::Done;
            }

            StreamEvent::MessageStart { message_id, model } => {
                tracing::debug!(
                    message_id = %message_id,
                    model = %model,
                    "anthropic stream started"
                );
            }

            StreamEvent::MessageDelta { stop_reason } => {
                tracing::debug!(stop_reason = ?stop_reason, "anthropic message delta");
            }

            StreamEvent::Ping => {}
        }

        Flow::Continue
    }

    /// Close a thinking block left open when the stream ends.
    pub fn finish(&mut self, out: &mut Vec<String>) {
        self.close_thinking(out);
        self.current = None;
    }

    fn close_thinking(&mut self, out: &mut Vec<String>) {
        if self.current == Some(BlockKind::Thinking) {
            out.push(THINK_CLOSE.to_owned());
            self.current = None;
        }
    }
}

// ---------------------------------------------------------------------------
// Normalizer
// ---------------------------------------------------------------------------

/// [`StreamNormalizer`] for Anthropic SSE bodies.
#[derive(Debug, Default)]
pub struct AnthropicNormalizer {
    parser: SseParser,
    state: ThinkingState,
}

impl AnthropicNormalizer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StreamNormalizer for AnthropicNormalizer {
    fn feed_line(&mut self, line: &str, out: &mut Vec<String>) -> Flow {
        match self.parser.parse_line(line) {
            Ok(Some(event)) => self.state.apply(event, out),
            Ok(None) => Flow::Continue,
            Err(e) => {
                tracing::warn!(error = %e, line, "skipping malformed anthropic stream event");
                Flow::Continue
            }
        }
    }

    fn finish(&mut self, out: &mut Vec<String>) {
        self.state.finish(out);
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Return the value of an SSE `<name>:` field line, minus one leading space.
fn field_value<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(name)?.strip_prefix(':')?;
    Some(rest.strip_prefix(' ').unwrap_or(rest))
}

/// Look up a key that must be present.
fn require<'a>(v: &'a Value, field: &str) -> Result<&'a Value> {
    v.get(field)
        .filter(|value| !value.is_null())
        .ok_or_else(|| PipelineError::decode(format!("missing `{field}` in SSE event")))
}

/// Look up a string key that must be present.
fn require_str(v: &Value, field: &str) -> Result<String> {
    require(v, field)?
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| PipelineError::decode(format!("`{field}` is not a string")))
}

/// Extract a string field, returning an empty string if missing.
fn json_string(v: &Value, field: &str) -> String {
    v[field].as_str().unwrap_or_default().to_owned()
}

fn push_fragment(out: &mut Vec<String>, fragment: Option<String>) {
    if let Some(fragment) = fragment.filter(|f| !f.is_empty()) {
        out.push(fragment);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
