//! range-serve server
//!
//! Loads configuration, sets up logging, and serves `root_dir` with
//! byte-range support.

use anyhow::Context;
use range_serve::{
    file_handler, MetricsEndpoint, PathRouter, RangeConfig, RangeMetrics, RangeServer,
};
use std::env;
use std::sync::Arc;
use tracing::{error, info};

/// # Usage
/// ```bash
/// # Start with default config (range_serve.yaml)
/// range-serve
///
/// # Start with custom config
/// range-serve /path/to/config.yaml
/// ```
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    info!("Starting range-serve");

    let config_path = env::args()
        .nth(1)
        .unwrap_or_else(|| "range_serve.yaml".to_string());
    info!("Loading configuration from: {}", config_path);

    let config = RangeConfig::from_file(&config_path)
        .with_context(|| format!("failed to load configuration from {}", config_path))?;

    info!("Configuration loaded successfully");
    info!("  - Root directory: {}", config.root_dir);
    info!("  - Execution mode: {:?}", config.execution_mode);
    info!("  - Accept-Ranges: {}", config.send_accept_ranges);
    info!("  - Entity tags: {}", config.generate_etags);
    info!("  - Cache enabled: {}", config.cache.enabled);
    if config.cache.enabled {
        info!(
            "  - Cache limits: {} entries, {} bytes, {} bytes per entry",
            config.cache.max_entries, config.cache.max_bytes, config.cache.max_entry_size
        );
    }

    let metrics = Arc::new(RangeMetrics::new());
    let (files, cache) = file_handler(&config);

    if let Some(addr) = config.metrics_addr()? {
        let mut endpoint = MetricsEndpoint::new(Arc::clone(&metrics), addr);
        if let Some(cache) = &cache {
            endpoint = endpoint.with_cache(Arc::clone(cache));
        }
        tokio::spawn(async move {
            if let Err(e) = endpoint.start().await {
                error!("Metrics endpoint failed: {}", e);
            }
        });
    }

    let router = PathRouter::new().add_prefix_path("/", files);
    let server = RangeServer::bind(config.listen_addr()?, Arc::new(router), metrics)
        .await
        .context("failed to bind listen address")?;

    server.run().await?;
    Ok(())
}
