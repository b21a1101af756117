//! Stream normalization for OpenAI-style chat completion bodies.
//!
//! Fireworks and OpenRouter stream `data: {json}` lines whose payload carries
//! `choices[0].delta.content`.  There is no block framing: each line yields at
//! most one text fragment, and `data: [DONE]` ends the message.

use serde_json::Value;

use super::{Flow, StreamNormalizer};

/// [`StreamNormalizer`] for `data: {json}` chat completion chunks.
#[derive(Debug, Default)]
pub struct ChatCompletionsNormalizer {
    /// Also accept `choices[0].message.content` (OpenRouter sends full
    /// messages in place of deltas for some upstream providers).
    accept_message_content: bool,
}

impl ChatCompletionsNormalizer {
    /// Normalizer that only reads `choices[0].delta.content`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalizer that falls back to `choices[0].message.content`.
    pub fn with_message_fallback() -> Self {
        Self {
            accept_message_content: true,
        }
    }

    fn fragment(&self, v: &Value) -> Option<String> {
        let choice = v.get("choices")?.get(0)?;

        let delta = choice.get("delta");
        let content = match delta.and_then(|d| d.get("content")) {
            Some(content) => Some(content),
            None if self.accept_message_content => {
                choice.get("message").and_then(|m| m.get("content"))
            }
            None => {
                if delta.is_none() {
                    tracing::warn!(chunk = %v, "chat completion chunk without `delta`");
                }
                return None;
            }
        };

        content
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
    }
}

impl StreamNormalizer for ChatCompletionsNormalizer {
    fn feed_line(&mut self, line: &str, out: &mut Vec<String>) -> Flow {
        let line = line.trim_end();

        let Some(data) = line.strip_prefix("data:") else {
            // Blank lines, SSE comments and other fields carry no content.
            return Flow::Continue;
        };
        let data = data.trim();

        if data == "[DONE]" {
            return Flow::Done;
        }

        let v: Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, line, "skipping malformed chat completion chunk");
                return Flow::Continue;
            }
        };

        if let Some(error) = v.get("error").filter(|e| !e.is_null()) {
            let message = error["message"].as_str().unwrap_or("unknown stream error");
            tracing::error!(reason = message, "chat completion stream reported an error");
            out.push(format!("Error: {message}"));
            return Flow::Done;
        }

        if let Some(fragment) = self.fragment(&v) {
            out.push(fragment);
        }
        Flow::Continue
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
