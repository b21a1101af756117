//! CLI entry point for the provider manifolds.
//!
//! This binary provides the `manifold` command with subcommands for listing a
//! vendor's models and running a single chat completion.

mod cli;

use std::io::{self, Write};

use anyhow::{Context, Result, bail};
use clap::Parser;
use futures::StreamExt;
use manifold_pipelines::{
    AnthropicManifold, ChatMessage, Completion, ContentPart, FireworksManifold, Manifold,
    OpenRouterManifold, RequestOptions,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands, Vendor};

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_level = match cli.command {
        Commands::Chat { .. } => "warn",
        Commands::Models { .. } => "info",
    };
    init_tracing(cli.log_level.as_deref().unwrap_or(default_level));

    match dotenvy::dotenv() {
        Ok(path) => debug!(path = %path.display(), "loaded .env"),
        Err(e) if e.not_found() => {}
        Err(e) => return Err(e).context("failed to read .env"),
    }

    match cli.command {
        Commands::Models { vendor, json } => cmd_models(vendor, json).await,
        Commands::Chat {
            vendor,
            model,
            system,
            stream,
            max_tokens,
            temperature,
            images,
            prompt,
        } => {
            let options = RequestOptions {
                stream,
                max_tokens,
                temperature,
                ..RequestOptions::default()
            };
            cmd_chat(vendor, &model, system, images, &prompt, options).await
        }
    }
}

fn build_manifold(vendor: Vendor) -> Result<Box<dyn Manifold>> {
    let manifold: Box<dyn Manifold> = match vendor {
        Vendor::Anthropic => {
            Box::new(AnthropicManifold::from_env().context("failed to configure anthropic")?)
        }
        Vendor::Fireworks => {
            Box::new(FireworksManifold::from_env().context("failed to configure fireworks")?)
        }
        Vendor::Openrouter => {
            Box::new(OpenRouterManifold::from_env().context("failed to configure openrouter")?)
        }
    };
    Ok(manifold)
}

// ---------------------------------------------------------------------------
// Subcommand: models
// ---------------------------------------------------------------------------

async fn cmd_models(vendor: Vendor, json: bool) -> Result<()> {
    let manifold = build_manifold(vendor)?;
    manifold.on_startup().await;

    let models = manifold.list_models().await;
    info!(manifold = manifold.id(), count = models.len(), "catalog loaded");

    if json {
        let rendered =
            serde_json::to_string_pretty(&models).context("failed to serialize catalog")?;
        println!("{rendered}");
    } else {
        for model in &models {
            println!("{:<48} {}{}", model.id, manifold.name(), model.display_name);
        }
    }

    manifold.on_shutdown().await;
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: chat
// ---------------------------------------------------------------------------

async fn cmd_chat(
    vendor: Vendor,
    model: &str,
    system: Option<String>,
    images: Vec<String>,
    prompt: &str,
    options: RequestOptions,
) -> Result<()> {
    let manifold = build_manifold(vendor)?;
    manifold.on_startup().await;

    let mut messages = Vec::new();
    if let Some(system) = system {
        messages.push(ChatMessage::system(system));
    }
    if images.is_empty() {
        messages.push(ChatMessage::user(prompt));
    } else {
        let mut parts = vec![ContentPart::text(prompt)];
        parts.extend(images.into_iter().map(ContentPart::image_url));
        messages.push(ChatMessage::user_parts(parts));
    }

    let completion = manifold.complete(prompt, model, messages, options).await;
    let outcome = print_completion(completion).await;

    manifold.on_shutdown().await;
    outcome
}

async fn print_completion(completion: Completion) -> Result<()> {
    match completion {
        Completion::Text(text) => println!("{text}"),
        Completion::Stream(mut fragments) => {
            let mut stdout = io::stdout().lock();
            while let Some(fragment) = fragments.next().await {
                stdout
                    .write_all(fragment.as_bytes())
                    .context("failed to write to stdout")?;
                stdout.flush().context("failed to flush stdout")?;
            }
            writeln!(stdout).context("failed to write to stdout")?;
        }
        Completion::Error(message) => bail!("{message}"),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Logs go to stderr so streamed replies on stdout stay clean.
fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .compact()
        .init();
}
