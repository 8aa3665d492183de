//! Steam Web API server directory.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use super::{DirectoryEntry, QueryError, ServerDirectory};

const GET_SERVER_LIST_URL: &str =
    "https://api.steampowered.com/IGameServersService/GetServerList/v1/";
const USER_AGENT: &str = "game-server-watcher/1.0";

#[derive(Debug, Deserialize)]
struct ServerListEnvelope {
    response: ServerListBody,
}

#[derive(Debug, Deserialize)]
struct ServerListBody {
    #[serde(default)]
    servers: Option<Vec<DirectoryEntry>>,
}

/// `IGameServersService/GetServerList` client holding the Web API key.
#[derive(Clone)]
pub struct SteamDirectory {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    timeout: Duration,
}

impl std::fmt::Debug for SteamDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SteamDirectory")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl SteamDirectory {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, QueryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| QueryError::Network(e.to_string()))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: GET_SERVER_LIST_URL.to_string(),
            timeout,
        })
    }

    /// Point the client at a different endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// Steam master server filter selecting one app on one address.
pub fn server_filter(app_id: u32, ip: &str) -> String {
    format!("\\appid\\{}\\addr\\{}", app_id, ip)
}

/// Decode a `GetServerList` response body. A body without a `servers` array means
/// nothing is registered at that address.
pub fn parse_server_list(body: &str) -> Result<Vec<DirectoryEntry>, QueryError> {
    let envelope: ServerListEnvelope =
        serde_json::from_str(body).map_err(|e| QueryError::Decode(e.to_string()))?;
    Ok(envelope.response.servers.unwrap_or_default())
}

#[async_trait]
impl ServerDirectory for SteamDirectory {
    async fn servers_at(&self, ip: &str, app_id: u32) -> Result<Vec<DirectoryEntry>, QueryError> {
        let filter = server_filter(app_id, ip);

        let response = self
            .client
            .get(&self.base_url)
            .query(&[("filter", filter.as_str()), ("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    QueryError::Timeout(self.timeout)
                } else {
                    // Drop the URL so the key never reaches the logs.
                    QueryError::Network(e.without_url().to_string())
                }
            })?
            .error_for_status()
            .map_err(|e| QueryError::Http(e.without_url().to_string()))?;

        let body = response
            .text()
            .await
            .map_err(|e| QueryError::Network(e.without_url().to_string()))?;

        parse_server_list(&body)
    }
}
