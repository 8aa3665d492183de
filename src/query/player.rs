//! Per-player attribute bags.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Named attribute lookup over a player record.
pub trait AttributeLookup {
    /// The attribute rendered as a string, or `None` if the player does not carry it.
    fn attribute(&self, name: &str) -> Option<String>;
}

/// A player as reported by the query protocol.
///
/// Common fields (such as `name`) sit at the top level; protocol specific
/// extras live in `raw`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerInfo {
    #[serde(default)]
    pub raw: Map<String, Value>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl PlayerInfo {
    pub fn new(fields: Map<String, Value>, raw: Map<String, Value>) -> Self {
        Self { raw, fields }
    }

    /// Shorthand for `attribute("name")`.
    pub fn name(&self) -> Option<String> {
        self.attribute("name")
    }
}

impl AttributeLookup for PlayerInfo {
    fn attribute(&self, name: &str) -> Option<String> {
        self.fields
            .get(name)
            .or_else(|| self.raw.get(name))
            .map(stringify)
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
