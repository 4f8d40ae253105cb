//! Entry point: the reaper daemon.
//!
//! Builds the presence services from the environment and runs the eviction
//! sweep on an interval until interrupted.

use palaver::services::{EventFanout, PresenceRegistry, Reaper};
use palaver::store::RedisStore;
use palaver::Config;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("config: {}", e))?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let store = Arc::new(RedisStore::connect(&config.redis_url).await?);
    let reaper = Reaper::new(
        PresenceRegistry::new(store.clone(), config.liveness_ttl),
        EventFanout::new(store),
    );

    tracing::info!(interval = ?config.reap_interval, "reaper started");
    let mut ticker = tokio::time::interval(config.reap_interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = reaper.sweep().await {
                    tracing::warn!(error = %e, "sweep failed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                break;
            }
        }
    }
    Ok(())
}
