//! Fireworks AI adapter (OpenAI-compatible chat completions).
//!
//! The host addresses models by short name, optionally prefixed with
//! `fireworks_pipe.`; they are expanded to `accounts/fireworks/models/<name>`.

use std::sync::RwLock;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::Value;

use super::{
    Manifold, chat_completions_payload, check_status, header_value, into_completion, read_lock,
    settle, write_lock,
};
use crate::catalog;
use crate::config::FireworksConfig;
use crate::error::{PipelineError, Result};
use crate::extract;
use crate::stream::ChatCompletionsNormalizer;
use crate::translate::{self, SamplingDefaults};
use crate::types::{
    ChatMessage, Completion, CompletionRequest, ModelDescriptor, RequestOptions, Sampling,
};

/// Prefix the host puts in front of this adapter's model ids.
const HOST_PREFIX: &str = "fireworks_pipe.";

const DEFAULTS: SamplingDefaults = SamplingDefaults {
    max_tokens: 16_384,
    temperature: 0.6,
    top_k: Some(40),
    top_p: Some(1.0),
    stop: false,
    presence_penalty: Some(0.0),
    frequency_penalty: Some(0.0),
};

/// Map a host model id to the fully-qualified Fireworks model path.
///
/// Unknown names pass through unchanged.
pub fn resolve_model(model_id: &str) -> String {
    let short = model_id.strip_prefix(HOST_PREFIX).unwrap_or(model_id);
    match short {
        "llama-v3p1-405b-instruct" | "deepseek-v3" | "deepseek-r1" => {
            format!("accounts/fireworks/models/{short}")
        }
        other => other.to_owned(),
    }
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

/// Adapter for the Fireworks inference API.
pub struct FireworksManifold {
    http: reqwest::Client,
    config: RwLock<FireworksConfig>,
    headers: RwLock<HeaderMap>,
}

impl FireworksManifold {
    pub fn new(config: FireworksConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            tracing::warn!("FIREWORKS_API_KEY is not set, requests will be rejected");
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

    /// Create the adapter from `FIREWORKS_API_KEY`.
    pub fn from_env() -> Result<Self> {
        Self::new(FireworksConfig::from_env())
    }

    pub fn config(&self) -> FireworksConfig {
        read_lock(&self.config).clone()
    }

    /// Replace the configuration.  Call [`Manifold::on_config_updated`]
    /// afterwards so the headers follow.
    pub fn update_config(&self, config: FireworksConfig) {
        *write_lock(&self.config) = config;
    }

    /// Apply the translation pipeline to a host request.
    ///
    /// Fails when the conversation exceeds the image limits.
    pub fn prepare(
        &self,
        model_id: &str,
        messages: Vec<ChatMessage>,
        mut options: RequestOptions,
    ) -> Result<CompletionRequest> {
        translate::strip_host_fields(&mut options);
        let (system, messages) = translate::pop_system_message(messages);
        translate::validate_images(&messages)?;

        Ok(CompletionRequest {
            model: resolve_model(model_id),
            system,
            messages,
            sampling: Sampling::resolve(&options, &DEFAULTS),
            stream: options.stream,
            reasoning: None,
        })
    }

    async fn send(&self, payload: &Value) -> Result<reqwest::Response> {
        let url = format!("{}/chat/completions", read_lock(&self.config).base_url);
        let headers = read_lock(&self.headers).clone();

        tracing::debug!(url = %url, model = %payload["model"], "sending fireworks request");

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
        let request = self.prepare(model_id, messages, options)?;
        let payload = chat_completions_payload(&request)?;
        let resp = self.send(&payload).await?;

        into_completion(
            resp,
            request.stream,
            || Box::new(ChatCompletionsNormalizer::new()),
            extract::chat_completion_text,
        )
        .await
    }
}

#[async_trait]
impl Manifold for FireworksManifold {
    fn id(&self) -> &str {
        "fireworks"
    }

    fn name(&self) -> &str {
        "fireworks/"
    }

    async fn list_models(&self) -> Vec<ModelDescriptor> {
        catalog::fireworks_models()
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
            "fireworks completion requested"
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

fn build_headers(config: &FireworksConfig) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        header_value("authorization", &format!("Bearer {}", config.api_key))?,
    );
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    Ok(headers)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
