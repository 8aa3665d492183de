//! Game Server Watcher - polls game servers for live status and keeps a rolling
//! per-server population history for hourly statistics.
//!
//! Status comes from a direct server query, falling back to the Steam Web API
//! server list when the query fails and a Web API key is configured.

pub mod config;
pub mod history;
pub mod query;
pub mod scheduler;
pub mod server;
pub mod status;
pub mod store;

pub use config::{ServerConfig, WatcherConfig};
pub use history::{HistoryBuffer, HourlyStat};
pub use server::{GameServer, ServerState};
pub use status::{Fallback, Lookup, StatusResolver, StatusSnapshot};
pub use store::{JsonFilePersistence, PopulationSample, Store};
