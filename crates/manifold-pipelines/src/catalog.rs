//! Model catalogs.
//!
//! Anthropic and Fireworks advertise fixed, compiled-in model lists.
//! OpenRouter's list is fetched from its API and cached for a time window by
//! [`CachedCatalog`], which serves the last good list when a refresh fails.

use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::error::Result;
use crate::types::{ModelDescriptor, Pricing};

// ---------------------------------------------------------------------------
// Static catalogs
// ---------------------------------------------------------------------------

/// Models offered by the Anthropic adapter.
///
/// `claude-3-7-sonnet-think` is an alias the adapter resolves to
/// `claude-3-7-sonnet-20250219` with extended thinking enabled.
pub fn anthropic_models() -> Vec<ModelDescriptor> {
    [
        ("claude-3-5-haiku-20241022", "claude-3.5-haiku"),
        ("claude-3-5-sonnet-20241022", "claude-3.5-sonnet"),
        ("claude-3-7-sonnet-20250219", "claude-3.7-sonnet"),
        ("claude-3-7-sonnet-think", "claude-3.7-sonnet-think"),
    ]
    .into_iter()
    .map(|(id, name)| ModelDescriptor::new(id, name))
    .collect()
}

/// Models offered by the Fireworks adapter, by short name.
pub fn fireworks_models() -> Vec<ModelDescriptor> {
    ["llama-v3p1-405b-instruct", "deepseek-v3", "deepseek-r1"]
        .into_iter()
        .map(|id| ModelDescriptor::new(id, id))
        .collect()
}

/// Served by OpenRouter when no catalog has ever been fetched successfully.
pub fn openrouter_fallback_models() -> Vec<ModelDescriptor> {
    [
        ("openai/gpt-3.5-turbo", "gpt-3.5-turbo"),
        ("openai/gpt-4", "gpt-4"),
        ("anthropic/claude-3.5-sonnet", "claude-3.5-sonnet"),
    ]
    .into_iter()
    .map(|(id, name)| ModelDescriptor::new(id, name))
    .collect()
}

// ---------------------------------------------------------------------------
// OpenRouter catalog records
// ---------------------------------------------------------------------------

/// Body of `GET /models`.
#[derive(Debug, Deserialize)]
pub struct RemoteCatalog {
    #[serde(default)]
    pub data: Vec<RemoteModel>,
}

/// One entry of the remote catalog.
///
/// Fields are read leniently: a record with a missing id or oddly typed
/// values still decodes, so one bad entry cannot sink the whole list.
#[derive(Debug, Deserialize)]
pub struct RemoteModel {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub name: Value,
    #[serde(default)]
    pub description: Value,
    #[serde(default)]
    pub context_length: Value,
    #[serde(default)]
    pub pricing: Value,
}

impl From<RemoteModel> for ModelDescriptor {
    fn from(remote: RemoteModel) -> Self {
        let id = lenient_string(&remote.id).unwrap_or_default();
        let display_name = match lenient_string(&remote.name) {
            Some(name) if !name.is_empty() => last_segment(&name).to_owned(),
            _ => last_segment(&id).to_owned(),
        };
        let pricing = remote.pricing.is_object().then(|| Pricing {
            prompt: lenient_string(&remote.pricing["prompt"]),
            completion: lenient_string(&remote.pricing["completion"]),
        });

        Self {
            id,
            display_name,
            description: lenient_string(&remote.description),
            context_length: remote.context_length.as_u64(),
            pricing,
        }
    }
}

/// Strings as-is, numbers and booleans rendered, anything else dropped.
fn lenient_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

impl RemoteCatalog {
    pub fn into_descriptors(self) -> Vec<ModelDescriptor> {
        self.data.into_iter().map(ModelDescriptor::from).collect()
    }
}

/// `"anthropic/claude-3.5-sonnet"` -> `"claude-3.5-sonnet"`.
fn last_segment(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name).trim()
}

// ---------------------------------------------------------------------------
// Time-windowed cache
// ---------------------------------------------------------------------------

/// Holds the last successfully fetched catalog and when it was fetched.
///
/// Time is passed in explicitly so freshness can be tested without sleeping.
#[derive(Debug)]
pub struct ModelCache {
    window: Duration,
    entry: Option<(Instant, Vec<ModelDescriptor>)>,
}

impl ModelCache {
    /// Create an empty cache whose entries stay fresh for `window`.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entry: None,
        }
    }

    /// Return the cached list and whether it is stale at `now`.
    pub fn get(&self, now: Instant) -> Option<(Vec<ModelDescriptor>, bool)> {
        let (fetched_at, models) = self.entry.as_ref()?;
        let is_stale = now.saturating_duration_since(*fetched_at) >= self.window;
        Some((models.clone(), is_stale))
    }

    /// Record the outcome of a fetch attempt and return the list to serve.
    ///
    /// A successful fetch replaces the entry.  A failed one leaves it
    /// untouched and serves it anyway; with nothing cached the fixed
    /// fallback list is served.
    pub fn refresh(
        &mut self,
        now: Instant,
        result: Result<Vec<ModelDescriptor>>,
    ) -> Vec<ModelDescriptor> {
        match result {
            Ok(models) => {
                self.entry = Some((now, models.clone()));
                models
            }
            Err(e) => match &self.entry {
                Some((_, models)) => {
                    tracing::warn!(error = %e, "model catalog refresh failed, serving stale list");
                    models.clone()
                }
                None => {
                    tracing::warn!(error = %e, "model catalog fetch failed, serving fallback list");
                    openrouter_fallback_models()
                }
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Cached catalog
// ---------------------------------------------------------------------------

/// Where a fetched catalog comes from.
#[async_trait]
pub trait ModelSource: Send + Sync {
    async fn fetch_models(&self) -> Result<Vec<ModelDescriptor>>;
}

/// A [`ModelSource`] fronted by a [`ModelCache`].
///
/// Concurrent refreshes are not coalesced; the last one to finish wins.
pub struct CachedCatalog<S> {
    source: S,
    cache: RwLock<ModelCache>,
}

impl<S: ModelSource> CachedCatalog<S> {
    pub fn new(source: S, window: Duration) -> Self {
        Self {
            source,
            cache: RwLock::new(ModelCache::new(window)),
        }
    }

    /// The catalog as of now.
    pub async fn models(&self) -> Vec<ModelDescriptor> {
        self.models_at(Instant::now()).await
    }

    /// The catalog as of `now`, fetching when the cache is empty or stale.
    pub async fn models_at(&self, now: Instant) -> Vec<ModelDescriptor> {
        let cached = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(now);
        if let Some((models, false)) = cached {
            tracing::debug!(count = models.len(), "serving cached model catalog");
            return models;
        }

        let result = self.source.fetch_models().await;
        if let Ok(models) = &result {
            tracing::info!(count = models.len(), "model catalog refreshed");
        }

        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .refresh(now, result)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
