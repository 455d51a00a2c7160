//! Media job engine binary.
//!
//! Reads newline-delimited JSON commands on stdin and writes one JSON
//! response per line on stdout. EOF or Ctrl+C shuts the engine down.

use anyhow::Context;
use std::net::SocketAddr;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mediadl_worker::{driver, metrics, Engine, EngineConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    info!("Starting mediadl-worker");

    if let Ok(addr) = std::env::var("METRICS_ADDR") {
        let addr: SocketAddr = addr
            .parse()
            .with_context(|| format!("invalid METRICS_ADDR: {}", addr))?;
        metrics::install_exporter(addr).context("failed to install metrics exporter")?;
        info!("Metrics exporter listening on {}", addr);
    }

    let config = EngineConfig::from_env();
    info!("Engine config: {:?}", config);

    let engine = Engine::with_tools(config);
    engine.start().await.context("failed to start engine")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    info!("Input closed");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }

                let response = driver::handle_line(&engine, &line).await;
                let mut out = serde_json::to_string(&response)?;
                out.push('\n');
                if let Err(e) = stdout.write_all(out.as_bytes()).await {
                    warn!("Failed to write response: {}", e);
                    break;
                }
                stdout.flush().await.ok();
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            }
        }
    }

    engine.shutdown().await;
    info!("mediadl-worker stopped");
    Ok(())
}

/// Colored output for dev, JSON for production.
fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("mediadl_worker=info,mediadl_media=info,mediadl_queue=info"));

    // Logs go to stderr; stdout carries responses
    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}
