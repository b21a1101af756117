//! Anthropic Messages API adapter.
//!
//! The system prompt moves to the top-level `system` field, every message is
//! sent as a list of content blocks, and image parts are re-encoded into
//! Anthropic's `image.source` shape.  The `claude-3-7-sonnet-think` alias
//! enables extended thinking on Claude 3.7 Sonnet.

use std::sync::RwLock;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::{Map, Value, json};

use super::{Manifold, check_status, header_value, into_completion, read_lock, settle, write_lock};
use crate::catalog;
use crate::config::AnthropicConfig;
use crate::error::{PipelineError, Result};
use crate::extract;
use crate::stream::AnthropicNormalizer;
use crate::translate::{self, ImageBudget, SamplingDefaults};
use crate::types::{
    ChatMessage, Completion, CompletionRequest, ContentPart, ImageSource, MessageContent,
    ModelDescriptor, Reasoning, RequestOptions, Sampling,
};

/// Anthropic API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Model alias that turns on extended thinking.
pub const THINK_ALIAS: &str = "claude-3-7-sonnet-think";

/// Model the thinking alias resolves to.
pub const THINK_MODEL: &str = "claude-3-7-sonnet-20250219";

const DEFAULTS: SamplingDefaults = SamplingDefaults {
    max_tokens: 4096,
    temperature: 0.8,
    top_k: Some(40),
    top_p: Some(0.9),
    stop: true,
    presence_penalty: None,
    frequency_penalty: None,
};

/// Resolve a host model id to the vendor model and whether it wants thinking.
pub fn resolve_model(model_id: &str) -> (&str, bool) {
    if model_id == THINK_ALIAS {
        (THINK_MODEL, true)
    } else {
        (model_id, false)
    }
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

/// Adapter for the Anthropic Messages API.
pub struct AnthropicManifold {
    http: reqwest::Client,
    config: RwLock<AnthropicConfig>,
    headers: RwLock<HeaderMap>,
}

impl AnthropicManifold {
    /// Create the adapter.  An empty API key is only warned about: the
    /// vendor rejects the request with a 401 that the host then sees.
    pub fn new(config: AnthropicConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            tracing::warn!("ANTHROPIC_API_KEY is not set, requests will be rejected");
        }

        let headers = build_headers(&config)?;
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| PipelineError::Config {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            config: RwLock::new(config),
            headers: RwLock::new(headers),
        })
    }

    /// Create the adapter from `ANTHROPIC_API_KEY` and `THINKING_BUDGET`.
    pub fn from_env() -> Result<Self> {
        Self::new(AnthropicConfig::from_env()?)
    }

    /// Snapshot of the current configuration.
    pub fn config(&self) -> AnthropicConfig {
        read_lock(&self.config).clone()
    }

    /// Replace the configuration.  Call [`Manifold::on_config_updated`]
    /// afterwards so the headers follow.
    pub fn update_config(&self, config: AnthropicConfig) {
        *write_lock(&self.config) = config;
    }

    /// Apply the translation pipeline to a host request.
    pub fn prepare(
        &self,
        model_id: &str,
        messages: Vec<ChatMessage>,
        mut options: RequestOptions,
    ) -> CompletionRequest {
        translate::strip_host_fields(&mut options);
        let (system, messages) = translate::pop_system_message(messages);

        let (model, thinking) = resolve_model(model_id);
        let mut sampling = Sampling::resolve(&options, &DEFAULTS);
        let reasoning = thinking.then(|| {
            let budget_tokens = read_lock(&self.config).thinking_budget;
            sampling.enable_reasoning(budget_tokens);
            Reasoning { budget_tokens }
        });

        CompletionRequest {
            model: model.to_owned(),
            system,
            messages,
            sampling,
            stream: options.stream,
            reasoning,
        }
    }

    async fn send(&self, payload: &Value) -> Result<reqwest::Response> {
        let url = format!("{}/v1/messages", read_lock(&self.config).base_url);
        let headers = read_lock(&self.headers).clone();

        tracing::debug!(url = %url, model = %payload["model"], "sending anthropic request");

        let resp = self
            .http
            .post(&url)
            .headers(headers)
            .json(payload)
            .send()
            .await?;
        check_status(resp).await
    }

    async fn run(
        &self,
        model_id: &str,
        messages: Vec<ChatMessage>,
        options: RequestOptions,
    ) -> Result<Completion> {
        let request = self.prepare(model_id, messages, options);
        let payload = build_payload(&request)?;
        let resp = self.send(&payload).await?;

        into_completion(
            resp,
            request.stream,
            || Box::new(AnthropicNormalizer::new()),
            extract::anthropic_text,
        )
        .await
    }
}

#[async_trait]
impl Manifold for AnthropicManifold {
    fn id(&self) -> &str {
        "anthropic"
    }

    fn name(&self) -> &str {
        "anthropic/"
    }

    async fn list_models(&self) -> Vec<ModelDescriptor> {
        catalog::anthropic_models()
    }

    async fn complete(
        &self,
        user_message: &str,
        model_id: &str,
        messages: Vec<ChatMessage>,
        options: RequestOptions,
    ) -> Completion {
        tracing::debug!(
            model = model_id,
            prompt_len = user_message.len(),
            "anthropic completion requested"
        );
        settle(self.id(), self.run(model_id, messages, options).await)
    }

    fn on_config_updated(&self) -> Result<()> {
        let headers = build_headers(&read_lock(&self.config))?;
        *write_lock(&self.headers) = headers;
        tracing::info!(manifold = self.id(), "headers rebuilt from updated config");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

fn build_headers(config: &AnthropicConfig) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(
        "anthropic-version",
        HeaderValue::from_static(ANTHROPIC_VERSION),
    );
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert("x-api-key", header_value("x-api-key", &config.api_key)?);
    Ok(headers)
}

/// Build the Messages API request body.
///
/// Fails when the conversation exceeds the image limits; this happens before
/// anything is sent.
pub fn build_payload(request: &CompletionRequest) -> Result<Value> {
    let mut budget = ImageBudget::new();
    let messages = request
        .messages
        .iter()
        .map(|msg| -> Result<Value> {
            Ok(json!({
                "role": msg.role,
                "content": content_blocks(&msg.content, &mut budget)?,
            }))
        })
        .collect::<Result<Vec<Value>>>()?;

    let sampling = &request.sampling;
    let mut payload = Map::new();
    payload.insert("model".into(), json!(request.model));
    payload.insert("messages".into(), Value::Array(messages));
    payload.insert("max_tokens".into(), json!(sampling.max_tokens));
    payload.insert("temperature".into(), json!(sampling.temperature));
    if let Some(top_k) = sampling.top_k {
        payload.insert("top_k".into(), json!(top_k));
    }
    if let Some(top_p) = sampling.top_p {
        payload.insert("top_p".into(), json!(top_p));
    }
    payload.insert(
        "stop_sequences".into(),
        json!(sampling.stop.clone().unwrap_or_default()),
    );
    if let Some(system) = request.system.as_deref().filter(|s| !s.is_empty()) {
        payload.insert("system".into(), json!(system));
    }
    payload.insert("stream".into(), json!(request.stream));
    if let Some(reasoning) = &request.reasoning {
        payload.insert(
            "thinking".into(),
            json!({"type": "enabled", "budget_tokens": reasoning.budget_tokens}),
        );
    }

    Ok(Value::Object(payload))
}

fn content_blocks(content: &MessageContent, budget: &mut ImageBudget) -> Result<Vec<Value>> {
    let parts = match content {
        MessageContent::Text(text) => return Ok(vec![json!({"type": "text", "text": text})]),
        MessageContent::Parts(parts) => parts,
    };

    parts
        .iter()
        .map(|part| match part {
            ContentPart::Text { text } => Ok(json!({"type": "text", "text": text})),
            ContentPart::ImageUrl { image_url } => {
                let source = translate::process_image(&image_url.url)?;
                budget.admit(&source)?;
                Ok(image_block(source))
            }
        })
        .collect()
}

fn image_block(source: ImageSource) -> Value {
    let source = match source {
        ImageSource::Base64 { media_type, data } => {
            json!({"type": "base64", "media_type": media_type, "data": data})
        }
        ImageSource::Url { url } => json!({"type": "url", "url": url}),
    };
    json!({"type": "image", "source": source})
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    fn manifold() -> AnthropicManifold {
        AnthropicManifold::new(AnthropicConfig {
            api_key: "sk-ant-test".into(),
            ..AnthropicConfig::default()
        })
        .unwrap()
    }

    fn host_options() -> RequestOptions {
        RequestOptions {
            user: Some(json!({"id": "u1", "name": "Ada"})),
            chat_id: Some("chat-1".into()),
            title: Some("Greeting".into()),
            ..RequestOptions::default()
        }
    }

    #[test]
    fn alias_resolution() {
        assert_eq!(resolve_model(THINK_ALIAS), (THINK_MODEL, true));
        assert_eq!(
            resolve_model("claude-3-5-haiku-20241022"),
            ("claude-3-5-haiku-20241022", false)
        );
    }

    #[test]
    fn payload_defaults_and_system_slot() {
        let request = manifold().prepare(
            "claude-3-5-sonnet-20241022",
            vec![ChatMessage::system("Be brief."), ChatMessage::user("Hi")],
            host_options(),
        );
        let payload = build_payload(&request).unwrap();

        assert_eq!(payload["model"], "claude-3-5-sonnet-20241022");
        assert_eq!(payload["system"], "Be brief.");
        assert_eq!(payload["max_tokens"], 4096);
        assert_eq!(payload["temperature"], 0.8);
        assert_eq!(payload["top_k"], 40);
        assert_eq!(payload["top_p"], 0.9);
        assert_eq!(payload["stop_sequences"], json!([]));
        assert_eq!(payload["stream"], false);
        assert!(payload.get("thinking").is_none());
        assert_eq!(
            payload["messages"],
            json!([{"role": "user", "content": [{"type": "text", "text": "Hi"}]}])
        );

        for field in ["user", "chat_id", "title"] {
            assert!(payload.get(field).is_none(), "{field} leaked into payload");
        }
    }

    #[test]
    fn host_sampling_overrides_defaults() {
        let options = RequestOptions {
            max_tokens: Some(512),
            temperature: Some(0.2),
            stop: Some(vec!["\n\nHuman:".into()]),
            stream: true,
            ..RequestOptions::default()
        };
        let request = manifold().prepare("m", vec![ChatMessage::user("x")], options);
        let payload = build_payload(&request).unwrap();

        assert_eq!(payload["max_tokens"], 512);
        assert_eq!(payload["temperature"], 0.2);
        assert_eq!(payload["stop_sequences"], json!(["\n\nHuman:"]));
        assert_eq!(payload["stream"], true);
        assert!(payload.get("system").is_none());
    }

    #[test]
    fn think_alias_enables_reasoning() {
        let payload = build_payload(&manifold().prepare(
            THINK_ALIAS,
            vec![ChatMessage::user("Why?")],
            RequestOptions::default(),
        ))
        .unwrap();

        assert_eq!(payload["model"], THINK_MODEL);
        assert_eq!(payload["thinking"], json!({"type": "enabled", "budget_tokens": 16000}));
        assert_eq!(payload["temperature"], 1.0);
        assert!(payload.get("top_k").is_none());
        assert!(payload.get("top_p").is_none());
        assert_eq!(payload["max_tokens"], 17_000);
    }

    #[test]
    fn reasoning_keeps_larger_max_tokens() {
        let options = RequestOptions {
            max_tokens: Some(32_000),
            ..RequestOptions::default()
        };
        let request = manifold().prepare(THINK_ALIAS, vec![ChatMessage::user("x")], options);
        assert_eq!(request.sampling.max_tokens, 32_000);
    }

    #[test]
    fn oversized_budget_does_not_overflow_max_tokens() {
        let manifold = manifold();
        manifold.update_config(AnthropicConfig {
            thinking_budget: 4_294_967_000,
            ..manifold.config()
        });
        let request =
            manifold.prepare(THINK_ALIAS, vec![ChatMessage::user("x")], RequestOptions::default());
        assert_eq!(request.sampling.max_tokens, u32::MAX);
        assert!(request.sampling.max_tokens > 4_294_967_000);
    }

    #[test]
    fn images_are_reencoded() {
        let request = manifold().prepare(
            "m",
            vec![ChatMessage::user_parts(vec![
                ContentPart::text("What is this?"),
                ContentPart::image_url("data:image/png;base64,AAAA"),
                ContentPart::image_url("https://example.com/cat.jpg"),
            ])],
            RequestOptions::default(),
        );
        let payload = build_payload(&request).unwrap();
        let content = &payload["messages"][0]["content"];

        assert_eq!(content[0], json!({"type": "text", "text": "What is this?"}));
        assert_eq!(
            content[1],
            json!({
                "type": "image",
                "source": {"type": "base64", "media_type": "image/png", "data": "AAAA"}
            })
        );
        assert_eq!(
            content[2],
            json!({
                "type": "image",
                "source": {"type": "url", "url": "https://example.com/cat.jpg"}
            })
        );
    }

    #[test]
    fn sixth_image_is_rejected() {
        let parts = (0..6)
            .map(|_| ContentPart::image_url("data:image/png;base64,AAAA"))
            .collect();
        let request = manifold().prepare(
            "m",
            vec![ChatMessage::user_parts(parts)],
            RequestOptions::default(),
        );

        let err = build_payload(&request).unwrap_err();
        assert_eq!(err.to_string(), "Maximum of 5 images per API call exceeded");
    }

    #[test]
    fn headers_follow_config_updates() {
        let manifold = manifold();
        assert_eq!(read_lock(&manifold.headers)["x-api-key"], "sk-ant-test");
        assert_eq!(read_lock(&manifold.headers)["anthropic-version"], "2023-06-01");

        manifold.update_config(AnthropicConfig {
            api_key: "sk-ant-rotated".into(),
            ..manifold.config()
        });
        manifold.on_config_updated().unwrap();
        assert_eq!(read_lock(&manifold.headers)["x-api-key"], "sk-ant-rotated");
    }

    #[test]
    fn invalid_key_is_a_config_error() {
        let manifold = manifold();
        manifold.update_config(AnthropicConfig {
            api_key: "bad\nkey".into(),
            ..manifold.config()
        });
        assert!(matches!(
            manifold.on_config_updated(),
            Err(PipelineError::Config { .. })
        ));
    }

    #[test]
    fn assistant_turns_keep_their_role() {
        let request = manifold().prepare(
            "m",
            vec![ChatMessage::user("a"), ChatMessage::assistant("b")],
            RequestOptions::default(),
        );
        assert_eq!(request.messages[1].role, Role::Assistant);
        let payload = build_payload(&request).unwrap();
        assert_eq!(payload["messages"][1]["role"], "assistant");
    }

    #[tokio::test]
    async fn lists_static_catalog() {
        let models = manifold().list_models().await;
        assert_eq!(models.len(), 4);
    }
}
