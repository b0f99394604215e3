//! # Pushkin Relay
//!
//! Directory-to-HTTP relay for media segmenter output. Watches a cache
//! directory, queues every finished segment and manifest, and POSTs each
//! file to the configured targets, retrying until every target has
//! acknowledged it.
//!
//! Settings come from a JSON file (default `settings.json`); all fields are
//! optional and fall back to built-in defaults. Override log verbosity with
//! `--log-level` or `RUST_LOG`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use pushkin_core::upload::RetryPolicy;
use pushkin_core::{CacheWatcher, PendingQueue, RelayConfig, Uploader, scan};

#[derive(Parser, Debug)]
#[command(name = "pushkin-relay")]
#[command(about = "Relay media segments from a watched directory to HTTP targets")]
struct Cli {
    /// Path to the JSON settings file.
    #[arg(long, default_value = "settings.json")]
    settings: PathBuf,

    /// Log filter directive (e.g. `debug`, `pushkin_core=debug`). Takes
    /// precedence over `RUST_LOG`.
    #[arg(long)]
    log_level: Option<String>,
}

/// Filter precedence: CLI flag, then `RUST_LOG`, then `info`.
fn log_filter(override_level: Option<&str>) -> EnvFilter {
    match override_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(log_filter(cli.log_level.as_deref()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = RelayConfig::from_file(&cli.settings)
        .with_context(|| format!("unable to load settings from {}", cli.settings.display()))?;
    config.ensure_directories().context("directory bootstrap failed")?;

    // Canonicalize once so everything downstream deals in absolute paths.
    let cache_dir = std::fs::canonicalize(&config.cache_dir)
        .with_context(|| format!("cannot resolve cache dir {}", config.cache_dir.display()))?;
    let config = Arc::new(config);
    let queue = Arc::new(PendingQueue::new());

    // Backlog first, so files dropped before the watcher attached are not
    // lost; anything the watcher also reports is a tolerated duplicate.
    let backlog = scan::enqueue_backlog(&cache_dir, &config, &queue);
    if backlog > 0 {
        info!(backlog, "enqueued files already present in cache");
    }

    let watcher = CacheWatcher::spawn(&cache_dir, Arc::clone(&config), Arc::clone(&queue))
        .context("failed to start filesystem watcher")?;

    info!(dir = %cache_dir.display(), targets = config.target_urls.len(), "starting pushkin relay");

    let uploader = Uploader::new(Arc::clone(&config), queue, RetryPolicy::unbounded())
        .context("failed to build HTTP client")?;

    tokio::select! {
        _ = uploader.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
        }
    }

    watcher.shutdown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_settings_json_and_no_override() {
        let cli = Cli::try_parse_from(["pushkin-relay"]).unwrap();

        assert_eq!(cli.settings, PathBuf::from("settings.json"));
        assert_eq!(cli.log_level, None);
    }

    #[test]
    fn log_level_flag_is_parsed() {
        let cli =
            Cli::try_parse_from(["pushkin-relay", "--log-level", "debug"]).unwrap();

        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn log_level_override_wins_over_default() {
        let filter = log_filter(Some("pushkin_core=debug"));

        assert_eq!(filter.to_string(), "pushkin_core=debug");
    }

    #[test]
    fn missing_override_falls_back_to_info() {
        // RUST_LOG is not set under `cargo test`, so the fallback applies.
        if std::env::var_os("RUST_LOG").is_none() {
            assert_eq!(log_filter(None).to_string(), "info");
        }
    }
}
