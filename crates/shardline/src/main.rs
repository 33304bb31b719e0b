//! Gateway probe
//!
//! Connects the configured fleet, logs readiness and shard closures, and
//! stays connected until Ctrl-C.
//!
//! ```bash
//! BOT_TOKEN=... cargo run -p shardline --bin shardline-probe
//! ```

use shardline::{Client, ClientConfig, Event, EventKind, FleetEvent, TracingConfig};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!(error = %e, "Probe failed");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config = ClientConfig::from_env()?;
    if let Err(e) = shardline_common::try_init_tracing_with_config(TracingConfig::for_environment(
        config.app.env,
    )) {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    info!(app = %config.app.name, intents = %config.gateway.intents, "Starting probe");
    let client = Client::new(config)?;

    client.on(EventKind::ShardReady, |event| async move {
        if let Event::ShardReady { unavailable } = &event.event {
            info!(shard = %event.shard, unavailable = unavailable.len(), "Shard ready");
        }
        Ok(())
    });
    client.on(EventKind::Ready, |event| async move {
        if let Event::Ready { user, shards } = &event.event {
            let name = user.as_ref().and_then(|u| u.username()).unwrap_or("unknown");
            info!(user = name, shards, "Fleet ready");
        }
        Ok(())
    });

    let mut fleet = client.fleet_events();
    tokio::spawn(async move {
        while let Ok(FleetEvent::ShardClosed { shard, reason }) = fleet.recv().await {
            warn!(shard = %shard, reason = %reason, "Shard closed");
        }
    });

    let plan = client.start().await?;
    info!(plan = %plan, "Fleet started");

    tokio::select! {
        result = client.wait_until_ready(None) => result?,
        _ = tokio::signal::ctrl_c() => {
            client.shutdown().await;
            return Ok(());
        }
    }

    let stats = client.cache().stats();
    info!(guilds = stats.guilds, channels = stats.channels, users = stats.users, "Cache warm");

    tokio::signal::ctrl_c().await?;
    info!("Interrupted, shutting down");
    client.shutdown().await;
    Ok(())
}
