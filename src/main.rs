//! Game Server Watcher daemon.

use game_server_watcher::config::{load_servers, WatcherConfig};
use game_server_watcher::query::{DnsResolver, ServerQuery, SourceQuery, SteamDirectory};
use game_server_watcher::scheduler::Scheduler;
use game_server_watcher::{Fallback, GameServer, JsonFilePersistence, StatusResolver, Store};

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("game_server_watcher=info".parse()?))
        .init();

    // Load configuration
    let cfg = WatcherConfig::load();
    tracing::info!("Using data directory {}", cfg.data_path.display());
    tracing::info!("Keeping {} hours of population history", cfg.history_hours);

    let servers = load_servers(&cfg.servers_path)?;
    tracing::info!("Loaded {} servers from {}", servers.len(), cfg.servers_path.display());

    // Initialize history store
    let store = Arc::new(Store::new(JsonFilePersistence::new(cfg.population_file())));
    store.load().await?;

    let primary: Arc<dyn ServerQuery> = Arc::new(SourceQuery::new(cfg.query_timeout));
    let directory = match &cfg.steam_api_key {
        Some(key) => Some(Arc::new(SteamDirectory::new(key.clone(), cfg.query_timeout)?)),
        None => {
            tracing::info!("STEAM_WEB_API_KEY not set, Steam Web API fallback disabled");
            None
        }
    };
    let dns = Arc::new(DnsResolver);

    let watched = servers
        .into_iter()
        .map(|server| {
            let mut resolver = StatusResolver::new(server, primary.clone());
            if let Some(directory) = &directory {
                resolver = resolver.with_fallback(Fallback {
                    directory: directory.clone(),
                    resolver: dns.clone(),
                });
            }
            GameServer::new(resolver, store.clone(), cfg.history_hours)
        })
        .collect();

    let scheduler = Scheduler::new(watched, store, cfg.refresh_interval, cfg.flush_interval);
    scheduler.start().await;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down...");
    scheduler.stop().await;

    for server in scheduler.servers() {
        let server = server.lock().await;
        let peak = server.stats().iter().map(|s| s.max).max().unwrap_or(0);
        tracing::info!(
            "{} [{}]: {:?}, peak {} players over the retained window",
            server.display_name(),
            server.id(),
            server.state(),
            peak
        );
    }

    Ok(())
}
