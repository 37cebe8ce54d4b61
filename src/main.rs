//! tender-agents service
//!
//! Entry point. Loads configuration, initialises structured logging, opens
//! the store, schedules the expiry sweep, launches the configured agents and
//! waits for Ctrl+C before shutting them down.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use tender_agents::auction::sweeper::Sweeper;
use tender_agents::config::{self, StoreBackend};
use tender_agents::engine::scheduler::AgentScheduler;
use tender_agents::storage::memory::InMemoryStore;
use tender_agents::storage::sqlite::SqliteStore;
use tender_agents::storage::AuctionStore;
use tender_agents::strategy::presets;

const BANNER: &str = r#"
  _                 _                                     _
 | |_ ___ _ __   __| | ___ _ __    __ _  __ _  ___ _ __ | |_ ___
 | __/ _ \ '_ \ / _` |/ _ \ '__|  / _` |/ _` |/ _ \ '_ \| __/ __|
 | ||  __/ | | | (_| |  __/ |    | (_| | (_| |  __/ | | | |_\__ \
  \__\___|_| |_|\__,_|\___|_|     \__,_|\__, |\___|_| |_|\__|___/
                                        |___/
  Automated bidding for quotation sessions
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let mut cfg = config::AppConfig::load("config.toml")?;
    cfg.apply_env_overrides()
        .context("Invalid environment override")?;

    init_logging();

    println!("{BANNER}");
    info!(
        service = %cfg.service.name,
        backend = ?cfg.store.backend,
        sweep_enabled = cfg.sweep.enabled,
        sweep_interval_secs = cfg.sweep.interval_secs,
        strategies = ?presets::NAMES,
        "tender-agents starting up"
    );

    match cfg.store.backend {
        StoreBackend::Sqlite => {
            let store = SqliteStore::connect(&cfg.store.database_url)
                .await
                .with_context(|| format!("Failed to open store at {}", cfg.store.database_url))?;
            run(cfg, Arc::new(store)).await
        }
        StoreBackend::Memory => run(cfg, Arc::new(InMemoryStore::new())).await,
    }
}

/// Wire the sweep and the scheduler to `store` and run until Ctrl+C.
async fn run<S: AuctionStore + 'static>(cfg: config::AppConfig, store: Arc<S>) -> Result<()> {
    let sweep = if cfg.sweep.enabled {
        let sweeper = Sweeper::new(store.clone());
        Some(sweeper.spawn(Duration::from_secs(cfg.sweep.interval_secs)))
    } else {
        info!("Session sweep disabled");
        None
    };

    let scheduler = AgentScheduler::new(store);
    for request in cfg.agents {
        let key = request.key();
        if let Err(e) = scheduler.start(request).await {
            error!(
                session_id = key.session_id,
                user_id = key.user_id,
                kind = ?e.kind(),
                error = %e,
                "Failed to start configured agent"
            );
        }
    }

    info!(
        agents = scheduler.running().await.len(),
        "Running. Press Ctrl+C to stop."
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received.");

    if let Some(handle) = sweep {
        handle.abort();
    }
    scheduler.shutdown().await;
    info!("tender-agents shut down cleanly.");

    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("tender_agents=info"));

    let json_logging = std::env::var("TENDER_AGENTS_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
