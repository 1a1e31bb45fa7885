//! Server binary for docu-classifier.
//!
//! A thin shim over the library crate: parse flags, load `.env` and the
//! TOML settings, build the services, serve.

use anyhow::{Context, Result};
use clap::Parser;
use docu_classifier::config::DEFAULT_CONFIG_PATH;
use docu_classifier::{server, Services, Settings};
use std::io;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Classify uploaded clinical PDFs by medical domain.
#[derive(Parser, Debug)]
#[command(
    name = "docu-classifier",
    version,
    about = "Classify uploaded clinical PDFs by medical domain",
    long_about = "HTTP service that OCRs uploaded PDF documents with Mistral, splits the \
text into clinical notes with an LLM (Vertex AI Gemini by default), and labels each note \
with a locally loaded domain classifier.",
    color = clap::ColorChoice::Auto
)]
struct Cli {
    /// Path to the TOML settings file.
    #[arg(short, long, env = "DOCU_CLASSIFIER_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Bind address (overrides `server.host`).
    #[arg(long, env = "DOCU_CLASSIFIER_HOST")]
    host: Option<String>,

    /// Bind port (overrides `server.port`).
    #[arg(short, long, env = "DOCU_CLASSIFIER_PORT")]
    port: Option<u16>,

    /// Debug-level logging.
    #[arg(short, long, env = "DOCU_CLASSIFIER_VERBOSE")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is normal in production.
    let dotenv = dotenvy::dotenv();

    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    if let Ok(path) = dotenv {
        info!("Loaded environment from {}", path.display());
    }

    // ── Settings ─────────────────────────────────────────────────────────
    let mut settings = Settings::load(&cli.config)
        .await
        .with_context(|| format!("Failed to load settings from {}", cli.config.display()))?;
    if let Some(host) = cli.host {
        settings.server.host = host;
    }
    if let Some(port) = cli.port {
        settings.server.port = port;
    }

    // ── Services (fail fast) ─────────────────────────────────────────────
    let services = Services::from_settings(&settings).context("Failed to initialise services")?;

    server::serve(services, &settings.server)
        .await
        .context("Server terminated with an error")?;
    Ok(())
}
