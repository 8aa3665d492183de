//! Status sources for game servers.
//!
//! The primary source speaks the server query protocol directly; the directory
//! source asks the Steam Web API about every server registered from one address.

mod dns;
mod player;
mod source;
mod steam;

pub use dns::*;
pub use player::*;
pub use source::*;
pub use steam::*;

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Query error types.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("query timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("malformed response: {0}")]
    Decode(String),
}

/// Game identifiers reported by the query protocol.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawGameIds {
    pub game: Option<String>,
    pub folder: Option<String>,
}

/// Result of a direct protocol query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResponse {
    pub connect: String,
    pub name: String,
    pub raw: RawGameIds,
    pub map: String,
    pub num_players: Option<u32>,
    pub max_players: u32,
    pub players: Vec<PlayerInfo>,
}

/// One server record from the Steam server directory.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct DirectoryEntry {
    pub addr: String,
    pub name: String,
    pub gamedir: String,
    pub map: String,
    pub players: u32,
    pub max_players: u32,
    pub gameport: u16,
}

/// Direct server query (primary strategy).
#[async_trait]
pub trait ServerQuery: Send + Sync {
    async fn query(&self, host: &str, port: u16, query_type: &str)
        -> Result<QueryResponse, QueryError>;
}

/// Server directory lookup by address (fallback strategy).
///
/// Implementations carry their own API credential.
#[async_trait]
pub trait ServerDirectory: Send + Sync {
    async fn servers_at(&self, ip: &str, app_id: u32) -> Result<Vec<DirectoryEntry>, QueryError>;
}

/// Hostname to IPv4 resolution.
#[async_trait]
pub trait HostResolver: Send + Sync {
    /// Returns the address as a dotted quad, or `None` if it cannot be resolved.
    async fn resolve(&self, host: &str) -> Option<String>;
}
