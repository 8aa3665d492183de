//! Scheduler module for refreshing servers and persisting history.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

use crate::server::GameServer;
use crate::store::Store;

/// A server shared between its refresh loop and readers.
pub type SharedServer = Arc<Mutex<GameServer>>;

/// Runs one refresh loop per server and one flush loop for the store.
pub struct Scheduler {
    servers: Vec<SharedServer>,
    store: Arc<Store>,
    refresh_interval: Duration,
    flush_interval: Duration,
    stop_tx: broadcast::Sender<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(
        servers: Vec<GameServer>,
        store: Arc<Store>,
        refresh_interval: Duration,
        flush_interval: Duration,
    ) -> Self {
        let (stop_tx, _) = broadcast::channel(1);

        Self {
            servers: servers
                .into_iter()
                .map(|s| Arc::new(Mutex::new(s)))
                .collect(),
            store,
            refresh_interval,
            flush_interval,
            stop_tx,
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn servers(&self) -> &[SharedServer] {
        &self.servers
    }

    /// Spawn the refresh and flush loops.
    pub async fn start(&self) {
        let mut tasks = self.tasks.lock().await;
        if !tasks.is_empty() {
            return; // Already running
        }

        tracing::info!("Starting scheduler with {} servers", self.servers.len());

        for server in &self.servers {
            tasks.push(tokio::spawn(run_refresh_loop(
                server.clone(),
                self.refresh_interval,
                self.stop_tx.subscribe(),
            )));
        }

        tasks.push(tokio::spawn(run_flush_loop(
            self.store.clone(),
            self.flush_interval,
            self.stop_tx.subscribe(),
        )));
    }

    /// Stop all loops, wait for them to finish, then flush once more.
    pub async fn stop(&self) {
        let _ = self.stop_tx.send(());

        let tasks: Vec<_> = self.tasks.lock().await.drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                tracing::error!("Scheduler: task ended abnormally: {}", e);
            }
        }

        flush_store(&self.store).await;
        tracing::info!("Scheduler stopped");
    }
}

/// Refresh one server on every tick until stopped.
async fn run_refresh_loop(
    server: SharedServer,
    refresh_interval: Duration,
    mut stop_rx: broadcast::Receiver<()>,
) {
    // Spread the first refreshes so servers are not all queried at once.
    let jitter_ms = rand::random::<u64>() % (refresh_interval.as_millis().clamp(1, 1000) as u64);
    tokio::select! {
        _ = stop_rx.recv() => return,
        _ = tokio::time::sleep(Duration::from_millis(jitter_ms)) => {}
    }

    let mut interval = tokio::time::interval(refresh_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = stop_rx.recv() => break,
            _ = interval.tick() => {
                // Resolve without the server lock so readers are not held up by the network.
                let resolver = server.lock().await.resolver();
                let lookup = resolver.lock().await.resolve().await;

                let mut server = server.lock().await;
                let state = server.apply(lookup, Utc::now());
                tracing::debug!(
                    "Refreshed {} ({}): {:?}",
                    server.id(),
                    server.display_name(),
                    state
                );
            }
        }
    }
}

/// Flush the store on every tick until stopped.
async fn run_flush_loop(
    store: Arc<Store>,
    flush_interval: Duration,
    mut stop_rx: broadcast::Receiver<()>,
) {
    let mut interval = tokio::time::interval(flush_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick fires immediately; nothing has changed since load.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = stop_rx.recv() => break,
            _ = interval.tick() => flush_store(&store).await,
        }
    }
}

/// Write the store, logging instead of propagating failures.
pub async fn flush_store(store: &Store) {
    if let Err(e) = store.flush().await {
        tracing::error!("Failed to save population history: {}", e);
    }
}
