//! Status resolution: direct query first, Steam directory second.

use regex::Regex;
use std::sync::{Arc, OnceLock};
use thiserror::Error;

use crate::config::ServerConfig;
use crate::query::{
    DirectoryEntry, HostResolver, PlayerInfo, QueryError, QueryResponse, ServerDirectory,
    ServerQuery,
};

/// Normalized point-in-time status of one server.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    pub connect: String,
    /// Server name as reported, before display sanitization.
    pub name: String,
    pub game: String,
    pub map: String,
    pub players_num: u32,
    pub players_max: u32,
    pub players: Vec<PlayerInfo>,
}

impl StatusSnapshot {
    /// Normalize a direct query response.
    pub fn from_query(res: QueryResponse, query_type: &str) -> Self {
        let game = first_non_empty([res.raw.game, res.raw.folder])
            .unwrap_or_else(|| query_type.to_string());

        // A reported count of zero falls through to the list length as well.
        let players_num = res
            .num_players
            .filter(|n| *n > 0)
            .unwrap_or(res.players.len() as u32);

        Self {
            connect: res.connect,
            name: res.name,
            game,
            map: res.map,
            players_num,
            players_max: res.max_players,
            players: res.players,
        }
    }

    /// Normalize a Steam directory record. The directory never lists players.
    pub fn from_directory(entry: DirectoryEntry, query_type: &str) -> Self {
        let game = first_non_empty([Some(entry.gamedir)]).unwrap_or_else(|| query_type.to_string());

        Self {
            connect: entry.addr,
            name: entry.name,
            game,
            map: entry.map,
            players_num: entry.players,
            players_max: entry.max_players,
            players: Vec::new(),
        }
    }
}

fn first_non_empty<const N: usize>(candidates: [Option<String>; N]) -> Option<String> {
    candidates.into_iter().flatten().find(|s| !s.is_empty())
}

/// Why a strategy produced no snapshot.
#[derive(Error, Debug)]
pub enum MissReason {
    #[error("query failed: {0}")]
    QueryFailed(QueryError),
    #[error("no Steam Web API key configured")]
    FallbackDisabled,
    #[error("no app id configured")]
    NoAppId,
    #[error("host could not be resolved to an IPv4 address")]
    Unresolvable,
    #[error("server list request failed: {0}")]
    Transport(QueryError),
    #[error("no listed server with game port {0}")]
    NoMatchingPort(u16),
}

/// Outcome of one lookup strategy.
#[derive(Debug)]
pub enum Lookup {
    Found(StatusSnapshot),
    Missed(MissReason),
}

impl Lookup {
    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }

    pub fn into_snapshot(self) -> Option<StatusSnapshot> {
        match self {
            Lookup::Found(snapshot) => Some(snapshot),
            Lookup::Missed(_) => None,
        }
    }
}

/// Collaborators for the Steam directory fallback.
pub struct Fallback {
    pub directory: Arc<dyn ServerDirectory>,
    pub resolver: Arc<dyn HostResolver>,
}

/// Whether `host` is an IPv4 address in dotted-quad form.
pub fn is_dotted_quad(host: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"^(25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)(\.(25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)){3}$")
            .unwrap()
    });
    re.is_match(host)
}

/// Produces snapshots for one configured server.
pub struct StatusResolver {
    config: ServerConfig,
    primary: Arc<dyn ServerQuery>,
    fallback: Option<Fallback>,
    ip: Option<String>,
}

impl StatusResolver {
    /// Resolver with only the direct query strategy.
    pub fn new(config: ServerConfig, primary: Arc<dyn ServerQuery>) -> Self {
        Self {
            config,
            primary,
            fallback: None,
            ip: None,
        }
    }

    /// Enable the Steam directory fallback.
    pub fn with_fallback(mut self, fallback: Fallback) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Address used for directory lookups, once known.
    pub fn cached_ip(&self) -> Option<&str> {
        self.ip.as_deref()
    }

    /// Try the direct query, then the directory if the query missed.
    ///
    /// Never fails: every error is folded into [`Lookup::Missed`].
    pub async fn resolve(&mut self) -> Lookup {
        let reason = match self.query_primary().await {
            Lookup::Found(snapshot) => return Lookup::Found(snapshot),
            Lookup::Missed(reason) => reason,
        };

        tracing::warn!(
            "Direct query of {}:{} missed: {}",
            self.config.host,
            self.config.port,
            reason
        );

        if self.fallback.is_none() {
            return Lookup::Missed(reason);
        }

        let fallback = self.query_fallback().await;
        if let Lookup::Missed(reason) = &fallback {
            tracing::warn!(
                "Steam directory lookup of {}:{} missed: {}",
                self.config.host,
                self.config.port,
                reason
            );
        }
        fallback
    }

    async fn query_primary(&self) -> Lookup {
        let cfg = &self.config;
        match self
            .primary
            .query(&cfg.host, cfg.port, &cfg.query_type)
            .await
        {
            Ok(res) => Lookup::Found(StatusSnapshot::from_query(res, &cfg.query_type)),
            Err(e) => Lookup::Missed(MissReason::QueryFailed(e)),
        }
    }

    async fn query_fallback(&mut self) -> Lookup {
        let Some(fallback) = &self.fallback else {
            return Lookup::Missed(MissReason::FallbackDisabled);
        };
        let Some(app_id) = self.config.app_id else {
            return Lookup::Missed(MissReason::NoAppId);
        };
        let directory = fallback.directory.clone();

        let Some(ip) = self.server_ip().await else {
            return Lookup::Missed(MissReason::Unresolvable);
        };

        let entries = match directory.servers_at(&ip, app_id).await {
            Ok(entries) => entries,
            Err(e) => return Lookup::Missed(MissReason::Transport(e)),
        };

        match entries.into_iter().find(|s| s.gameport == self.config.port) {
            Some(entry) => {
                Lookup::Found(StatusSnapshot::from_directory(entry, &self.config.query_type))
            }
            None => Lookup::Missed(MissReason::NoMatchingPort(self.config.port)),
        }
    }

    /// The configured host as an IPv4 address, resolving and caching on first use.
    async fn server_ip(&mut self) -> Option<String> {
        if let Some(ip) = &self.ip {
            return Some(ip.clone());
        }

        let ip = if is_dotted_quad(&self.config.host) {
            self.config.host.clone()
        } else {
            let resolver = self.fallback.as_ref()?.resolver.clone();
            resolver.resolve(&self.config.host).await?
        };

        tracing::debug!("Resolved {} to {}", self.config.host, ip);
        self.ip = Some(ip.clone());
        Some(ip)
    }
}
