//! Core types shared by every manifold adapter.
//!
//! These types model the data flowing between the host and the adapters.  They
//! are vendor-agnostic at this layer; each adapter translates them into its
//! vendor's wire format.

use std::fmt;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::stream::FragmentStream;

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// The role of a participant in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System-level instructions that shape model behavior.
    System,
    /// Input from the human user.
    User,
    /// Output from the model.
    Assistant,
}

/// Content of a message: either plain text or an ordered list of parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl Default for MessageContent {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl MessageContent {
    /// Concatenate every text-bearing part, ignoring images.
    pub fn text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect(),
        }
    }
}

/// A single element of list-typed message content, as submitted by the host.
///
/// The `type` tag is mandatory: an untagged element fails to deserialize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// A run of text.
    Text { text: String },
    /// An image referenced by URL, which may be a `data:` URI.
    ImageUrl { image_url: ImageUrl },
}

impl ContentPart {
    /// Create a text part.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Create an image part from a remote URL or a `data:` URI.
    pub fn image_url(url: impl Into<String>) -> Self {
        Self::ImageUrl {
            image_url: ImageUrl { url: url.into() },
        }
    }
}

/// The `image_url` payload of an image part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

/// Normalized image reference produced by the request translator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Inline image data decoded from a `data:` URI.
    Base64 { media_type: String, data: String },
    /// A remote image the vendor fetches itself.
    Url { url: String },
}

/// A single message in a conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who produced this message.
    pub role: Role,

    /// Text or list content; missing content reads as an empty string.
    #[serde(default)]
    pub content: MessageContent,
}

impl ChatMessage {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: MessageContent::Text(content.into()),
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(content.into()),
        }
    }

    /// Create a user message made of several content parts.
    pub fn user_parts(parts: Vec<ContentPart>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Parts(parts),
        }
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(content.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Host request options
// ---------------------------------------------------------------------------

/// The request body handed over by the host alongside the message list.
///
/// Every sampling field is optional; each adapter fills gaps with its own
/// vendor defaults.  `user`, `chat_id` and `title` are host bookkeeping and
/// are cleared before translation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestOptions {
    /// Whether the host wants a lazy fragment stream.
    #[serde(default)]
    pub stream: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,

    /// Stop sequences.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,

    /// Host user record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<Value>,

    /// Host chat identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,

    /// Host chat title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

// ---------------------------------------------------------------------------
// Translated request
// ---------------------------------------------------------------------------

/// Sampling parameters after vendor defaults have been applied.
///
/// `None` means the field is not sent to the vendor at all.
#[derive(Debug, Clone, PartialEq)]
pub struct Sampling {
    pub max_tokens: u32,
    pub temperature: f64,
    pub top_k: Option<u32>,
    pub top_p: Option<f64>,
    pub stop: Option<Vec<String>>,
    pub presence_penalty: Option<f64>,
    pub frequency_penalty: Option<f64>,
}

/// Extended-thinking settings for a reasoning-enabled request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reasoning {
    pub budget_tokens: u32,
}

/// A host request after alias resolution, system extraction and defaulting.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Fully-qualified vendor model identifier.
    pub model: String,
    /// The leading system prompt, lifted out of `messages`.
    pub system: Option<String>,
    /// Remaining conversation, with every system message removed.
    pub messages: Vec<ChatMessage>,
    pub sampling: Sampling,
    pub stream: bool,
    pub reasoning: Option<Reasoning>,
}

// ---------------------------------------------------------------------------
// Model catalog
// ---------------------------------------------------------------------------

/// Prices advertised by a catalog entry, as the vendor formats them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub completion: Option<String>,
}

/// A model the host can route a conversation to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Vendor-native identifier (or alias the adapter resolves).
    pub id: String,

    /// Human-readable name shown by the host.
    #[serde(rename = "name")]
    pub display_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_length: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing: Option<Pricing>,
}

impl ModelDescriptor {
    /// Create a descriptor carrying only an id and a display name.
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            description: None,
            context_length: None,
            pricing: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Completion result
// ---------------------------------------------------------------------------

/// What an adapter hands back to the host for a single request.
pub enum Completion {
    /// The fully assembled reply of a non-streaming request.
    Text(String),
    /// A lazy, forward-only sequence of reply fragments.
    Stream(FragmentStream),
    /// A failure, already rendered as `"Error: <message>"`.
    Error(String),
}

impl Completion {
    /// Returns `true` for [`Completion::Error`].
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Drain the completion into a single string.
    ///
    /// Streams are pulled to the end and their fragments concatenated; error
    /// strings are returned as-is.
    pub async fn collect_text(self) -> String {
        match self {
            Self::Text(text) | Self::Error(text) => text,
            Self::Stream(stream) => stream.collect::<Vec<String>>().await.concat(),
        }
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
            Self::Error(message) => f.debug_tuple("Error").field(message).finish(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_content_deserializes_text_and_parts() {
        let text: ChatMessage = serde_json::from_str(r#"{"role":"user","content":"hi"}"#).unwrap();
        assert_eq!(text.content, MessageContent::Text("hi".into()));

        let parts: ChatMessage = serde_json::from_str(
            r#"{"role":"user","content":[{"type":"text","text":"look"},{"type":"image_url","image_url":{"url":"https://x/y.png"}}]}"#,
        )
        .unwrap();
        assert_eq!(
            parts.content,
            MessageContent::Parts(vec![
                ContentPart::text("look"),
                ContentPart::image_url("https://x/y.png"),
            ])
        );
    }

    #[test]
    fn untagged_content_part_is_rejected() {
        let result: std::result::Result<ChatMessage, _> =
            serde_json::from_str(r#"{"role":"user","content":[{"text":"no tag"}]}"#);
        assert!(result.is_err());
    }

    #[test]
    fn missing_content_reads_as_empty_text() {
        let msg: ChatMessage = serde_json::from_str(r#"{"role":"assistant"}"#).unwrap();
        assert_eq!(msg.content.text(), "");
    }

    #[test]
    fn parts_text_skips_images() {
        let content = MessageContent::Parts(vec![
            ContentPart::text("a"),
            ContentPart::image_url("https://x/y.png"),
            ContentPart::text("b"),
        ]);
        assert_eq!(content.text(), "ab");
    }

    #[test]
    fn request_options_accepts_host_fields() {
        let options: RequestOptions = serde_json::from_str(
            r#"{"stream":true,"max_tokens":10,"user":{"id":"u1"},"chat_id":"c1","title":"t"}"#,
        )
        .unwrap();
        assert!(options.stream);
        assert_eq!(options.max_tokens, Some(10));
        assert_eq!(options.chat_id.as_deref(), Some("c1"));
    }

    #[test]
    fn model_descriptor_serializes_display_name_as_name() {
        let model = ModelDescriptor::new("deepseek-v3", "deepseek-v3");
        let v = serde_json::to_value(&model).unwrap();
        assert_eq!(v["id"], "deepseek-v3");
        assert_eq!(v["name"], "deepseek-v3");
        assert!(v.get("pricing").is_none());
    }
}
