//! Vendor adapters.
//!
//! Every vendor implements the [`Manifold`] trait, giving the host one uniform
//! way to list models and run completions.  The helpers in this module cover
//! what all adapters share: header construction, the JSON POST with status
//! checking, and turning a response body into a [`FragmentStream`].

pub mod anthropic;
pub mod fireworks;
pub mod openrouter;

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::HeaderValue;
use serde_json::{Map, Value, json};

use crate::error::{PipelineError, Result};
use crate::stream::{ByteChunks, FragmentStream, StreamNormalizer};
use crate::types::{ChatMessage, Completion, CompletionRequest, ModelDescriptor, RequestOptions};

pub use anthropic::AnthropicManifold;
pub use fireworks::FireworksManifold;
pub use openrouter::OpenRouterManifold;

// ---------------------------------------------------------------------------
// Manifold trait
// ---------------------------------------------------------------------------

/// A vendor adapter exposing several models to the host.
///
/// Implementations must be safe to share across concurrent requests.
#[async_trait]
pub trait Manifold: Send + Sync {
    /// Stable identifier of the adapter (e.g. `"anthropic"`).
    fn id(&self) -> &str;

    /// Display prefix the host puts in front of model names.
    fn name(&self) -> &str;

    /// Models this adapter can route to.
    async fn list_models(&self) -> Vec<ModelDescriptor>;

    /// Run one completion.
    ///
    /// Never fails: any error is rendered into [`Completion::Error`] as
    /// `"Error: <message>"`.
    async fn complete(
        &self,
        user_message: &str,
        model_id: &str,
        messages: Vec<ChatMessage>,
        options: RequestOptions,
    ) -> Completion;

    /// Called once when the host loads the adapter.
    async fn on_startup(&self) {
        tracing::info!(manifold = self.id(), "manifold starting");
    }

    /// Called once when the host unloads the adapter.
    async fn on_shutdown(&self) {
        tracing::info!(manifold = self.id(), "manifold shutting down");
    }

    /// Re-derive HTTP headers from the current configuration.
    fn on_config_updated(&self) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Build a header value, reporting invalid characters as a config error.
pub(crate) fn header_value(name: &str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| PipelineError::Config {
        reason: format!("invalid {name} header: {e}"),
    })
}

pub(crate) fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Fail with [`PipelineError::Http`] unless the response status is 2xx.
pub(crate) async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    tracing::error!(status = status.as_u16(), body = %body, "vendor returned an error status");
    Err(PipelineError::Http {
        status: status.as_u16(),
        body,
    })
}

/// Adapt a response body into the chunk stream a [`FragmentStream`] reads.
pub(crate) fn body_chunks(resp: reqwest::Response) -> ByteChunks {
    resp.bytes_stream()
        .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(PipelineError::from))
        .boxed()
}

/// Turn a successful response into the host-facing completion.
///
/// Streaming responses are wrapped lazily; others are read whole and passed
/// to `extract`.
pub(crate) async fn into_completion(
    resp: reqwest::Response,
    stream: bool,
    normalizer: impl FnOnce() -> Box<dyn StreamNormalizer>,
    extract: fn(&Value) -> String,
) -> Result<Completion> {
    if stream {
        return Ok(Completion::Stream(FragmentStream::new(
            body_chunks(resp),
            normalizer(),
        )));
    }

    let body: Value = resp.json().await?;
    Ok(Completion::Text(extract(&body)))
}

/// Build an OpenAI-style chat completions body.
///
/// The system prompt goes back in as the first message.  Sampling fields the
/// vendor does not take are already `None` and are left out.
pub fn chat_completions_payload(request: &CompletionRequest) -> Result<Value> {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    if let Some(system) = request.system.as_deref().filter(|s| !s.is_empty()) {
        messages.push(serde_json::to_value(ChatMessage::system(system))?);
    }
    for msg in &request.messages {
        messages.push(serde_json::to_value(msg)?);
    }

    let sampling = &request.sampling;
    let mut payload = Map::new();
    payload.insert("model".into(), json!(request.model));
    payload.insert("messages".into(), Value::Array(messages));
    payload.insert("max_tokens".into(), json!(sampling.max_tokens));
    payload.insert("temperature".into(), json!(sampling.temperature));

    let optional = [
        ("top_k", sampling.top_k.map(|v| json!(v))),
        ("top_p", sampling.top_p.map(|v| json!(v))),
        ("stop", sampling.stop.as_ref().map(|v| json!(v))),
        ("presence_penalty", sampling.presence_penalty.map(|v| json!(v))),
        ("frequency_penalty", sampling.frequency_penalty.map(|v| json!(v))),
    ];
    for (key, value) in optional {
        if let Some(value) = value {
            payload.insert(key.into(), value);
        }
    }

    payload.insert("stream".into(), json!(request.stream));
    Ok(Value::Object(payload))
}

/// Collapse an adapter result into the host's failure convention.
pub(crate) fn settle(manifold: &str, result: Result<Completion>) -> Completion {
    result.unwrap_or_else(|e| {
        tracing::error!(manifold, error = %e, "completion failed");
        Completion::Error(e.to_host_string())
    })
}
