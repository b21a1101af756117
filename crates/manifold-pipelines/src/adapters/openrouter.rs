//! OpenRouter adapter (OpenAI-compatible chat completions).
//!
//! Model ids are passed through untouched.  The model list comes from
//! OpenRouter's `/models` endpoint and is cached per adapter instance.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::Value;

use super::{
    Manifold, chat_completions_payload, check_status, header_value, into_completion, read_lock,
    settle, write_lock,
};
use crate::catalog::{CachedCatalog, ModelSource, RemoteCatalog};
use crate::config::OpenRouterConfig;
use crate::error::{PipelineError, Result};
use crate::extract;
use crate::stream::ChatCompletionsNormalizer;
use crate::translate::{self, SamplingDefaults};
use crate::types::{
    ChatMessage, Completion, CompletionRequest, ModelDescriptor, RequestOptions, Sampling,
};

/// Timeout for the `/models` catalog fetch.
const CATALOG_TIMEOUT: Duration = Duration::from_secs(10);

const DEFAULTS: SamplingDefaults = SamplingDefaults {
    max_tokens: 4096,
    temperature: 0.8,
    top_k: None,
    top_p: Some(0.9),
    stop: true,
    presence_penalty: None,
    frequency_penalty: None,
};

// ---------------------------------------------------------------------------
// Shared endpoint state
// ---------------------------------------------------------------------------

/// HTTP client, configuration and derived headers, shared between the
/// adapter and its catalog source.
struct Endpoint {
    http: reqwest::Client,
    config: RwLock<OpenRouterConfig>,
    headers: RwLock<HeaderMap>,
}

impl Endpoint {
    fn url(&self, path: &str) -> String {
        format!("{}{path}", read_lock(&self.config).base_url)
    }

    fn headers(&self) -> HeaderMap {
        read_lock(&self.headers).clone()
    }
}

/// Fetches the remote catalog through the adapter's endpoint.
struct RemoteModels(Arc<Endpoint>);

#[async_trait]
impl ModelSource for RemoteModels {
    async fn fetch_models(&self) -> Result<Vec<ModelDescriptor>> {
        let url = self.0.url("/models");
        tracing::debug!(url = %url, "fetching openrouter model catalog");

        let resp = self
            .0
            .http
            .get(&url)
            .headers(self.0.headers())
            .timeout(CATALOG_TIMEOUT)
            .send()
            .await?;
        let catalog: RemoteCatalog = check_status(resp).await?.json().await?;
        Ok(catalog.into_descriptors())
    }
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

/// Adapter for the OpenRouter API.
pub struct OpenRouterManifold {
    endpoint: Arc<Endpoint>,
    catalog: CachedCatalog<RemoteModels>,
}

impl OpenRouterManifold {
    pub fn new(config: OpenRouterConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            tracing::warn!("OPENROUTER_API_KEY is not set, requests will be rejected");
        }

        let headers = build_headers(&config)?;
        let connect_timeout =
            Duration::try_from_secs_f64(config.connect_timeout_secs).map_err(|e| {
                PipelineError::Config {
                    reason: format!("invalid connect timeout: {e}"),
                }
            })?;
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .read_timeout(Duration::from_secs(config.read_timeout_secs))
            .build()
            .map_err(|e| PipelineError::Config {
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        let window = Duration::from_secs(config.catalog_ttl_secs);

        let endpoint = Arc::new(Endpoint {
            http,
            config: RwLock::new(config),
            headers: RwLock::new(headers),
        });
        let catalog = CachedCatalog::new(RemoteModels(Arc::clone(&endpoint)), window);

        Ok(Self { endpoint, catalog })
    }

    /// Create the adapter from `OPENROUTER_API_KEY`, `SITE_URL` and
    /// `APP_NAME`.
    pub fn from_env() -> Result<Self> {
        Self::new(OpenRouterConfig::from_env())
    }

    pub fn config(&self) -> OpenRouterConfig {
        read_lock(&self.endpoint.config).clone()
    }

    /// Replace the configuration.  Call [`Manifold::on_config_updated`]
    /// afterwards so the headers follow.  Timeouts and the cache window are
    /// fixed at construction.
    pub fn update_config(&self, config: OpenRouterConfig) {
        *write_lock(&self.endpoint.config) = config;
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
            model: model_id.to_owned(),
            system,
            messages,
            sampling: Sampling::resolve(&options, &DEFAULTS),
            stream: options.stream,
            reasoning: None,
        })
    }

    async fn send(&self, payload: &Value) -> Result<reqwest::Response> {
        let url = self.endpoint.url("/chat/completions");
        tracing::debug!(url = %url, model = %payload["model"], "sending openrouter request");

        let resp = self
            .endpoint
            .http
            .post(&url)
            .headers(self.endpoint.headers())
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
            || Box::new(ChatCompletionsNormalizer::with_message_fallback()),
            extract::chat_completion_text,
        )
        .await
    }
}

#[async_trait]
impl Manifold for OpenRouterManifold {
    fn id(&self) -> &str {
        "openrouter"
    }

    fn name(&self) -> &str {
        "openrouter/"
    }

    async fn list_models(&self) -> Vec<ModelDescriptor> {
        self.catalog.models().await
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
            "openrouter completion requested"
        );
        settle(self.id(), self.run(model_id, messages, options).await)
    }

    fn on_config_updated(&self) -> Result<()> {
        let headers = build_headers(&read_lock(&self.endpoint.config))?;
        *write_lock(&self.endpoint.headers) = headers;
        tracing::info!(manifold = self.id(), "headers rebuilt from updated config");
        Ok(())
    }
}

fn build_headers(config: &OpenRouterConfig) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        header_value("authorization", &format!("Bearer {}", config.api_key))?,
    );
    headers.insert("http-referer", header_value("HTTP-Referer", &config.site_url)?);
    headers.insert("x-title", header_value("X-Title", &config.app_name)?);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(headers)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
