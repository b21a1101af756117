//! CLI argument definitions for the `manifold` binary.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use clap::{Parser, Subcommand, ValueEnum};

/// Talk to LLM vendors through the provider manifolds.
#[derive(Parser)]
#[command(
    name = "manifold",
    version,
    about = "Provider manifold pipelines for Anthropic, Fireworks and OpenRouter",
    long_about = "List vendor models and run chat completions through the same adapters \
                  a chat host would load. API keys are read from the environment or a \
                  .env file."
)]
pub struct Cli {
    /// Log level when RUST_LOG is not set [default: info, warn for `chat`].
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the models a vendor offers.
    Models {
        #[arg(long, short, value_enum)]
        vendor: Vendor,

        /// Print the catalog as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Send one prompt and print the reply.
    Chat {
        #[arg(long, short, value_enum)]
        vendor: Vendor,

        /// Model id, as listed by `manifold models`.
        #[arg(long, short)]
        model: String,

        /// System prompt.
        #[arg(long, short)]
        system: Option<String>,

        /// Print fragments as they arrive.
        #[arg(long)]
        stream: bool,

        #[arg(long)]
        max_tokens: Option<u32>,

        #[arg(long)]
        temperature: Option<f64>,

        /// Image URL or `data:` URI to attach (repeatable).
        #[arg(long = "image")]
        images: Vec<String>,

        /// The user message.
        prompt: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Vendor {
    Anthropic,
    Fireworks,
    Openrouter,
}
