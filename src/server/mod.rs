//! A watched game server: configuration, current status and population history.

mod name;

pub use name::*;

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Mutex as AsyncMutex;

use crate::config::ServerConfig;
use crate::history::{HistoryBuffer, HourlyStat};
use crate::status::{Lookup, StatusResolver, StatusSnapshot};
use crate::store::Store;

/// Reachability as of the last refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Not refreshed yet.
    Unknown,
    Online,
    Offline,
}

/// Display name cached against the snapshot version it was computed from.
#[derive(Debug)]
struct CachedName {
    version: u64,
    name: String,
}

pub struct GameServer {
    config: ServerConfig,
    resolver: Arc<AsyncMutex<StatusResolver>>,
    history: HistoryBuffer,
    state: ServerState,
    snapshot: Option<Arc<StatusSnapshot>>,
    snapshot_version: u64,
    display: Mutex<CachedName>,
}

impl GameServer {
    /// Bind a resolver to the history kept for its server in `store`.
    pub fn new(resolver: StatusResolver, store: Arc<Store>, history_hours: u32) -> Self {
        let config = resolver.config().clone();
        let id = config.id();

        tracing::info!(
            "Watching {} (type {}, app id {:?})",
            id,
            config.query_type,
            config.app_id
        );

        Self {
            config,
            resolver: Arc::new(AsyncMutex::new(resolver)),
            history: HistoryBuffer::new(id.clone(), store, history_hours),
            state: ServerState::Unknown,
            snapshot: None,
            snapshot_version: 0,
            display: Mutex::new(CachedName { version: 0, name: id }),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// `host:port`.
    pub fn id(&self) -> &str {
        self.history.server_id()
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn is_online(&self) -> bool {
        self.state == ServerState::Online
    }

    /// Last successful snapshot. Stays in place (stale) while the server is offline.
    pub fn snapshot(&self) -> Option<Arc<StatusSnapshot>> {
        self.snapshot.clone()
    }

    pub fn history(&self) -> &HistoryBuffer {
        &self.history
    }

    pub fn stats(&self) -> Vec<HourlyStat> {
        self.history.stats()
    }

    /// Resolver handle, so a caller can run the network lookup without
    /// holding a lock on the server.
    pub fn resolver(&self) -> Arc<AsyncMutex<StatusResolver>> {
        self.resolver.clone()
    }

    /// Refresh status now.
    pub async fn refresh(&mut self) -> ServerState {
        self.refresh_at(Utc::now()).await
    }

    /// Refresh status, recording any population sample at `now`.
    pub async fn refresh_at(&mut self, now: DateTime<Utc>) -> ServerState {
        let lookup = self.resolver.lock().await.resolve().await;
        self.apply(lookup, now)
    }

    /// Record the outcome of a lookup made at `now`.
    pub fn apply(&mut self, lookup: Lookup, now: DateTime<Utc>) -> ServerState {
        match lookup.into_snapshot() {
            Some(snapshot) => {
                self.history.add(snapshot.players_num, now);
                self.snapshot = Some(Arc::new(snapshot));
                self.snapshot_version += 1;
                self.state = ServerState::Online;
            }
            None => {
                self.state = ServerState::Offline;
                tracing::error!("Server not available: {}", self.id());
            }
        }
        self.state
    }

    /// Cleaned-up server name for display.
    ///
    /// Falls back to the last computed name, or `host:port` before any snapshot.
    pub fn display_name(&self) -> String {
        let mut cached = self.display.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(snapshot) = &self.snapshot {
            if cached.version != self.snapshot_version {
                if !snapshot.name.is_empty() {
                    cached.name = sanitize_name(&snapshot.name);
                }
                cached.version = self.snapshot_version;
            }
        }

        cached.name.clone()
    }
}
