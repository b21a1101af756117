//! Non-streaming completion extraction.
//!
//! Walks a vendor's JSON response body and assembles the reply text.  Missing
//! or empty content is not an error: it yields an empty string.

use serde_json::Value;

use crate::stream::{THINK_CLOSE, THINK_OPEN};

/// Concatenate the content blocks of an Anthropic Messages API response.
///
/// Thinking blocks are wrapped in the same markers used while streaming and
/// stay in document order with the text blocks.
pub fn anthropic_text(v: &Value) -> String {
    let Some(blocks) = v["content"].as_array() else {
        return String::new();
    };

    let mut output = String::new();
    for block in blocks {
        match block["type"].as_str() {
            Some("thinking") => {
                output.push_str(THINK_OPEN);
                output.push_str(block["thinking"].as_str().unwrap_or_default());
                output.push_str(THINK_CLOSE);
            }
            Some("text") => output.push_str(block["text"].as_str().unwrap_or_default()),
            _ => {}
        }
    }
    output
}

/// Extract `choices[0].message.content` from a chat completions response.
pub fn chat_completion_text(v: &Value) -> String {
    v["choices"][0]["message"]["content"]
        .as_str()
        .unwrap_or_default()
        .to_owned()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
