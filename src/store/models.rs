//! Persisted document types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One population reading for a server, bucketed by hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopulationSample {
    /// Hour bucket encoded as `YYYYMMDDHH` (UTC).
    #[serde(rename = "dateHour")]
    pub date_hour: u32,
    #[serde(rename = "playersNum")]
    pub players_num: u32,
}

/// The whole persisted document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PopulationDocument {
    /// Samples per server identity (`host:port`), oldest first.
    #[serde(default)]
    pub population: BTreeMap<String, Vec<PopulationSample>>,
}
