//! # reactrack
//!
//! Medication-adherence companion bot. Wires settings, telemetry, the
//! SQLite store, the Messenger and intent-engine clients, the turn
//! engine and the webhook server, then runs until interrupted.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use reactrack_core::channel::SendChannel;
use reactrack_core::fulfillment::FulfillmentEngine;
use reactrack_core::identity::{IdentityProvider, SubscriberDirectory};
use reactrack_engine::{
    ActionHandler, DeliveryScheduler, IdentityCache, SchedulerConfig, TurnController,
};
use reactrack_messenger::{
    http_client, ApiAiConfig, ApiAiEngine, GraphConfig, GraphIdentityProvider, GraphSendChannel,
};
use reactrack_server::ServerConfig;
use reactrack_settings::ReactrackSettings;
use reactrack_store::{Database, SubscriberRepo};
use reactrack_telemetry::{init_telemetry, TelemetryConfig};

/// ReaCTrack Messenger bot.
#[derive(Parser, Debug)]
#[command(name = "reactrack", about = "Medication-adherence Messenger bot")]
struct Cli {
    /// Settings file (defaults to ~/.reactrack/settings.json).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Port to bind (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// SQLite database path (overrides settings).
    #[arg(long)]
    db_path: Option<PathBuf>,
}

fn load(cli: &Cli) -> Result<ReactrackSettings> {
    let path = cli
        .config
        .clone()
        .unwrap_or_else(reactrack_settings::settings_path);
    let mut settings = reactrack_settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;

    if let Some(port) = cli.port {
        settings.server.port = port;
    }
    if let Some(host) = &cli.host {
        settings.server.host.clone_from(host);
    }
    if let Some(db_path) = &cli.db_path {
        settings.store.path = db_path.display().to_string();
    }

    reactrack_settings::validate_required(&settings).context("Incomplete settings")?;
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load(&cli)?;

    let _telemetry = init_telemetry(TelemetryConfig {
        log_level: TelemetryConfig::level_from_str(&settings.telemetry.level),
        module_levels: Vec::new(),
        json: settings.telemetry.json,
    });
    tracing::info!("Starting reactrack");

    let db_path = settings.store.resolved_path();
    let db = Database::open(&db_path)
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;
    tracing::info!(path = %db_path.display(), "Database opened");

    let messenger = &settings.messenger;
    let client = http_client(Duration::from_secs(messenger.request_timeout_secs))
        .context("Failed to build HTTP client")?;

    let page_token = messenger.page_token.clone().context("page token missing")?;
    let graph = GraphConfig {
        send_api_version: messenger.send_api_version.clone(),
        profile_api_version: messenger.profile_api_version.clone(),
        ..GraphConfig::new(messenger.graph_base_url.clone(), page_token)
    };
    let channel: Arc<dyn SendChannel> =
        Arc::new(GraphSendChannel::new(client.clone(), graph.clone()));
    let identity: Arc<dyn IdentityProvider> =
        Arc::new(GraphIdentityProvider::new(client.clone(), graph));

    let fulfillment = &settings.fulfillment;
    let client_token = fulfillment
        .client_token
        .clone()
        .context("fulfillment client token missing")?;
    let engine: Arc<dyn FulfillmentEngine> = Arc::new(ApiAiEngine::new(
        client,
        ApiAiConfig {
            language: fulfillment.language.clone(),
            protocol_version: fulfillment.protocol_version.clone(),
            ..ApiAiConfig::new(fulfillment.base_url.clone(), client_token)
        },
    ));

    let directory: Arc<dyn SubscriberDirectory> = Arc::new(SubscriberRepo::new(db.clone()));
    let sessions = Arc::new(IdentityCache::new(
        settings.sessions.capacity,
        identity,
        directory,
    ));
    let scheduler = Arc::new(DeliveryScheduler::new(
        Arc::clone(&channel),
        SchedulerConfig {
            spacing: Duration::from_millis(settings.delivery.spacing_ms),
            lane_idle: Duration::from_secs(settings.delivery.lane_idle_secs),
        },
    ));
    let controller = Arc::new(TurnController::new(
        sessions,
        scheduler,
        ActionHandler::new(db),
        engine,
        channel,
    ));

    let config = ServerConfig {
        host: settings.server.host.clone(),
        port: settings.server.port,
        ..ServerConfig::new(
            messenger.verify_token.clone().context("verify token missing")?,
            messenger.app_secret.clone().context("app secret missing")?,
        )
    };
    let handle = reactrack_server::start(config, controller)
        .await
        .context("Failed to start server")?;
    tracing::info!(port = handle.port(), "reactrack ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl+c")?;
    tracing::info!("Shutting down");
    handle.shutdown().await;
    Ok(())
}
