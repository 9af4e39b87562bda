//! HTTP service binary for kloudvin-docx2md.
//!
//! Serves `POST /api/convertDocx` for the CMS editor. The image sink is
//! built once at startup from the environment and shared by all requests.

use anyhow::{Context, Result};
use clap::Parser;
use kloudvin_docx2md::server::{router, MAX_BODY_BYTES};
use kloudvin_docx2md::sink::{self, AZURE_CONNECTION_ENV, IMAGE_DIR_ENV};
use kloudvin_docx2md::{ConversionConfig, StyleMap};
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Serve DOCX → Markdown conversion over HTTP.
#[derive(Parser, Debug)]
#[command(name = "docx2md-server", version, about)]
struct Cli {
    /// Address to listen on.
    #[arg(long, env = "DOCX2MD_LISTEN", default_value = "127.0.0.1:7071")]
    listen: SocketAddr,

    /// File of extra style-map rules, applied before the defaults.
    #[arg(long, env = "DOCX2MD_STYLE_MAP")]
    style_map: Option<PathBuf>,

    /// Number of concurrent image uploads per request.
    #[arg(long, env = "DOCX2MD_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Per-image upload timeout in seconds.
    #[arg(long, env = "DOCX2MD_UPLOAD_TIMEOUT", default_value_t = 30)]
    upload_timeout: u64,

    /// Retries per image after a failed upload.
    #[arg(long, env = "DOCX2MD_UPLOAD_RETRIES", default_value_t = 0)]
    upload_retries: u32,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOCX2MD_VERBOSE")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let mut builder = ConversionConfig::builder()
        .upload_concurrency(cli.concurrency)
        .upload_timeout_secs(cli.upload_timeout)
        .max_upload_retries(cli.upload_retries);

    if let Some(ref path) = cli.style_map {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read style map from {:?}", path))?;
        builder = builder.style_overrides(StyleMap::parse(&text)?);
    }

    // A missing sink is not fatal at startup: every request then fails with
    // 503, which is what the editor expects while storage is misconfigured.
    match sink::from_env()? {
        Some(s) => {
            info!("Image sink: {}", s.name());
            builder = builder.sink(s);
        }
        None => warn!(
            "No image sink configured; set {} or {}",
            AZURE_CONNECTION_ENV, IMAGE_DIR_ENV
        ),
    }

    let config = Arc::new(builder.build().context("Invalid configuration")?);
    let app = router(config);

    info!("docx2md-server listening on http://{}", cli.listen);
    info!("  POST /api/convertDocx  (body limit {} MB)", MAX_BODY_BYTES / (1024 * 1024));
    info!("  GET  /health");

    let listener = tokio::net::TcpListener::bind(cli.listen)
        .await
        .with_context(|| format!("Failed to bind {}", cli.listen))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("docx2md-server shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}
