//! alter-server - the HTTP chat proxy
//!
//! Sits between browser surfaces and the upstream completions API. It
//! exists so the API key stays server-side: the browser posts
//! `{messages, systemPrompt}` to `/api/chat` and gets `{reply}` back,
//! rate limited per client and bounded to the same limits the client
//! enforces.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod rate_limit;
mod routes;
mod upstream;

use config::{ConfigOverrides, ServerConfig};
use rate_limit::{FixedWindowLimiter, RateLimitConfig};
use routes::AppState;
use upstream::OpenAiUpstream;

#[derive(Debug, Parser)]
#[command(name = "alter-server", about = "Chat proxy for alter surfaces")]
struct Args {
    /// Address to listen on (overrides config and env)
    #[arg(long)]
    bind: Option<String>,

    /// Path to a TOML config file
    #[arg(long, env = "ALTER_CONFIG")]
    config: Option<PathBuf>,

    /// Upstream completions endpoint (overrides config and env)
    #[arg(long)]
    upstream_url: Option<String>,

    /// Model name sent with every completion
    #[arg(long)]
    model: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("alter_server=info,alter_core=info")),
        )
        .init();

    let args = Args::parse();
    let overrides = ConfigOverrides {
        bind: args.bind,
        upstream_url: args.upstream_url,
        model: args.model,
    };
    let config = ServerConfig::load(args.config.as_deref(), &overrides)
        .context("failed to load configuration")?;

    if config.api_key.is_none() {
        warn!("no API key configured (GROQ_API_KEY / ALTER_API_KEY); upstream calls will fail");
    }

    let state = Arc::new(AppState {
        upstream: Arc::new(OpenAiUpstream::new(&config)),
        limiter: FixedWindowLimiter::new(RateLimitConfig {
            max_per_window: config.rate_limit_per_minute,
            window: Duration::from_secs(60),
        }),
    });

    // Periodically drop expired rate-limit windows.
    let sweeper_state = Arc::clone(&state);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            sweeper_state.limiter.sweep();
        }
    });

    let app = routes::router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    info!(addr = %config.bind, model = %config.model, "alter proxy listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
    }
}
