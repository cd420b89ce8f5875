use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use tracing::info;

use tollgate_core::auth::{KvStore, RedisStore};
use tollgate_core::clock::SystemClock;
use tollgate_core::config::GateConfig;
use tollgate_core::middleware::GateState;
use tollgate_core::{server, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // logging comes up before the config so its warnings are not lost
    let log_format = std::env::var("TOLLGATE_LOG_FORMAT")
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or_default();
    telemetry::init(log_format)?;

    let config = GateConfig::from_env().context("Failed to load configuration")?;

    info!(
        environment = ?config.environment,
        rules = config.rules.rules.len(),
        bans = config.rules.ban.is_some(),
        "Starting tollgate"
    );

    let store = RedisStore::connect_with(
        &config.store.url,
        config.store.namespace.clone(),
        config.store.op_timeout,
    )
    .await
    .context("Failed to connect to the shared store")?;
    let store: Arc<dyn KvStore> = Arc::new(store);

    let state = GateState::from_config(&config, store, Arc::new(SystemClock))?;
    let router = server::build_router(state, Router::new(), Router::new());

    server::serve(config.server.listen_addr, router).await?;
    Ok(())
}
