//! rvp-ingest - Review pipeline service
//!
//! Fetches a paginated review collection with a bounded worker pool,
//! scores every review, and serves progress, results and charts over
//! HTTP + SSE.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use rvp_common::config::TomlConfig;
use rvp_common::events::EventBus;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rvp_ingest::pipeline::{PipelineConfig, PipelineController};
use rvp_ingest::services::{HttpExtractor, LexiconScorer, SvgRenderer};
use rvp_ingest::AppState;

/// Command-line arguments for rvp-ingest
#[derive(Parser, Debug)]
#[command(name = "rvp-ingest")]
#[command(about = "Bounded-concurrency review ingest and scoring service")]
#[command(version)]
struct Args {
    /// Config file (overrides RVP_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "RVP_PORT")]
    port: Option<u16>,

    /// Default number of fetch workers
    #[arg(long)]
    concurrency: Option<usize>,

    /// Page URL template containing {page}
    #[arg(long)]
    url_template: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    fn apply(&self, config: &mut TomlConfig) {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(url_template) = &self.url_template {
            config.source.url_template = url_template.clone();
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (mut config, config_path) =
        TomlConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    args.apply(&mut config);

    // RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("rvp_ingest={0},rvp_common={0},tower_http=info", config.logging.level)
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    config.validate().context("Invalid configuration")?;

    info!("Starting rvp-ingest (Review Pipeline)");
    info!(
        "Version: {} (git {}, built {}, {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    match &config_path {
        Some(path) => info!("Config: {}", path.display()),
        None => info!("Config: built-in defaults"),
    }
    info!("Source: {}", config.source.url_template);

    let pipeline_config = PipelineConfig::from(&config);

    let extractor = HttpExtractor::new(
        config.source.url_template.clone(),
        pipeline_config.fetch_timeout,
    )
    .context("Failed to build extractor")?;

    let scorer = match &config.scorer.lexicon_path {
        Some(path) => LexiconScorer::from_path(path).context("Failed to load lexicon")?,
        None => LexiconScorer::builtin(),
    };
    info!("Scorer ready ({} lexicon words)", scorer.len());

    let event_bus = EventBus::new(config.event_capacity);
    info!("Event bus initialized (capacity {})", event_bus.capacity());

    let controller = Arc::new(PipelineController::new(
        pipeline_config,
        Arc::new(extractor),
        Arc::new(scorer),
        Arc::new(SvgRenderer::new()),
        event_bus,
    ));

    let state = AppState::new(Arc::clone(&controller));
    let app = rvp_ingest::build_router(state).layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Let an active run finish its in-flight pages
    if controller.stop().await.is_ok() {
        info!("Draining active pipeline run");
    }
    controller.drain().await;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
