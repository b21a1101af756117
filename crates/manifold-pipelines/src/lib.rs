//! Provider manifold pipelines.
//!
//! Each manifold adapts one LLM vendor (Anthropic, Fireworks, OpenRouter) to a
//! single host-facing interface: list the vendor's models, and turn a host
//! chat request into either a complete reply or a lazy stream of text
//! fragments.
//!
//! ## Architecture
//!
//! ```text
//! host request ──> translate ──> vendor payload ──> HTTP POST
//!                                                      │
//!        ┌─────────────── non-streaming ───────────────┤
//!        v                                             v
//!    extract                                 stream normalizer
//!        │                                             │
//!        └──────────> Completion (text | fragments | "Error: ...")
//! ```
//!
//! ## Modules
//!
//! - [`adapters`] -- the [`Manifold`] trait and the three vendor adapters.
//! - [`translate`] -- host field stripping, system prompt, images, sampling.
//! - [`stream`] -- line reassembly and per-vendor stream normalizers.
//! - [`extract`] -- reply text from non-streaming response bodies.
//! - [`catalog`] -- static model lists and the cached OpenRouter catalog.
//! - [`config`] -- per-adapter configuration read from the environment.
//! - [`error`] -- pipeline error types.

pub mod adapters;
pub mod catalog;
pub mod config;
pub mod error;
pub mod extract;
pub mod stream;
pub mod translate;
pub mod types;

// Re-export the most commonly used types at the crate root.
pub use adapters::{AnthropicManifold, FireworksManifold, Manifold, OpenRouterManifold};
pub use catalog::{CachedCatalog, ModelCache, ModelSource};
pub use config::{AnthropicConfig, FireworksConfig, OpenRouterConfig};
pub use error::{PipelineError, Result};
pub use stream::{FragmentStream, StreamNormalizer};
pub use types::{
    ChatMessage, Completion, ContentPart, MessageContent, ModelDescriptor, RequestOptions, Role,
};
