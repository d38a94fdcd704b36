//! Who's Online client
//!
//! Keeps a live list of a site's online users and logs every change.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::{broadcast, watch};
use tracing_subscriber::{EnvFilter, fmt};

use whosonline_core::config::AppConfig;
use whosonline_i18n::Localizer;
use whosonline_realtime::PresenceTracker;
use whosonline_realtime::binding::AvatarListView;
use whosonline_realtime::bridge::LongPollBus;
use whosonline_realtime::presence::PresenceSnapshot;
use whosonline_realtime::sync::{HttpSnapshotSource, RetryPolicy};

/// Follow a site's who's-online list.
#[derive(Debug, Parser)]
#[command(name = "whosonline-client", version, about)]
struct Cli {
    /// Directory holding `default.toml` and environment overlays.
    #[arg(long, default_value = "config")]
    config_dir: String,

    /// Environment overlay to load.
    #[arg(long, env = "WHOSONLINE_ENV", default_value = "development")]
    env: String,

    /// Override `client.base_url`.
    #[arg(long)]
    base_url: Option<String>,

    /// Override the viewer's trust level.
    #[arg(long)]
    viewer_trust_level: Option<u8>,

    /// Print the current list once and exit.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_configuration(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {e:#}");
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config, cli.once).await {
        tracing::error!("Client error: {e:#}");
        std::process::exit(1);
    }
}

/// Load configuration from files and environment, then apply CLI overrides
fn load_configuration(cli: &Cli) -> anyhow::Result<AppConfig> {
    let mut config =
        AppConfig::load_from(&cli.config_dir, &cli.env).context("Config load error")?;

    if let Some(base_url) = &cli.base_url {
        config.client.base_url = base_url.clone();
    }
    if let Some(level) = cli.viewer_trust_level {
        config.client.viewer_trust_level = Some(level);
    }
    config.validate()?;
    Ok(config)
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt().pretty().with_env_filter(filter).with_target(true).init();
        }
    }
}

async fn run(config: AppConfig, once: bool) -> anyhow::Result<()> {
    tracing::info!(
        base_url = %config.client.base_url,
        "Starting whosonline-client v{}",
        env!("CARGO_PKG_VERSION")
    );

    let localizer = Arc::new(Localizer::new(
        &config.client.locale,
        config.client.fallback_locale.as_deref(),
        whosonline_i18n::BASE_LOCALE,
    )?);

    let http = reqwest::Client::builder()
        .user_agent(concat!("whosonline-client/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;

    let source = Arc::new(HttpSnapshotSource::new(http.clone(), &config.client));
    let bus = Arc::new(LongPollBus::new(http, &config.client));
    tracing::debug!(client_id = %bus.client_id(), "Message bus client ready");

    let tracker = Arc::new(PresenceTracker::new(
        source,
        bus,
        RetryPolicy::from_config(&config.client.retry),
    ));

    let mut changes = tracker.subscribe_changes();

    match &config.client.bootstrap_snapshot {
        Some(path) => {
            let snapshot = PresenceSnapshot::load(path)
                .await
                .with_context(|| format!("Failed to read bootstrap snapshot {path}"))?;
            tracker.bootstrap(snapshot).await?;
        }
        None => tracker.start().await?,
    }

    if once {
        let view = render(&tracker, &config, &localizer).await;
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let runner = {
        let tracker = Arc::clone(&tracker);
        tokio::spawn(async move { tracker.run(shutdown_rx).await })
    };

    let reporter = {
        let tracker = Arc::clone(&tracker);
        let config = config.clone();
        let localizer = Arc::clone(&localizer);
        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(event) => {
                        let view = render(&tracker, &config, &localizer).await;
                        tracing::info!(
                            cause = ?event.cause,
                            changed = ?event.user_ids,
                            count = view.count,
                            visible = view.visible,
                            "{}",
                            view.title
                        );
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "Change reporter lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    };

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutting down");
    let _ = shutdown_tx.send(true);

    runner.await.context("Presence tracker task panicked")??;
    reporter.abort();
    Ok(())
}

async fn render(
    tracker: &PresenceTracker,
    config: &AppConfig,
    localizer: &Localizer,
) -> AvatarListView {
    let users = tracker.online_users().await;
    AvatarListView::build(
        &users,
        &config.presence,
        config.client.viewer_trust_level,
        localizer,
    )
}
