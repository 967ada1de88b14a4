//! Cross-resource reference markers.
//!
//! On the wire a reference is the object
//! `{"type": "reference", "id": <string>, "value": <revision>}`. Inside a
//! resource graph the marker is kept as a plain watchized object with exactly
//! those three keys, so it serializes back unchanged.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use wbind_core::{Node, WatchConfig, watchize_with};

pub const REFERENCE_TYPE: &str = "reference";

/// Points at resource `id`, at least at `revision`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceReference {
    pub id: String,
    pub revision: u64,
}

impl ResourceReference {
    pub fn new(id: impl Into<String>, revision: u64) -> Self {
        Self {
            id: id.into(),
            revision,
        }
    }

    /// The wire marker.
    #[must_use]
    pub fn to_value(&self) -> Value {
        json!({"type": REFERENCE_TYPE, "id": self.id, "value": self.revision})
    }

    /// Parse a wire marker. Anything else, including objects carrying extra
    /// keys, is not a reference.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        let map = value.as_object()?;
        if map.len() != 3 || map.get("type")?.as_str()? != REFERENCE_TYPE {
            return None;
        }
        Some(Self {
            id: map.get("id")?.as_str()?.to_owned(),
            revision: map.get("value")?.as_u64()?,
        })
    }

    /// Marker as an observable object node.
    #[must_use]
    pub fn to_node(&self, config: &WatchConfig) -> Node {
        watchize_with(&self.to_value(), config)
    }

    /// Recognise a marker object inside a graph.
    #[must_use]
    pub fn from_node(node: &Node) -> Option<Self> {
        let object = node.as_object()?;
        if object.len() != 3 {
            return None;
        }
        let scalar = |key: &str| object.peek(key).and_then(|n| n.scalar_value());
        if scalar("type")?.as_str()? != REFERENCE_TYPE {
            return None;
        }
        Some(Self {
            id: scalar("id")?.as_str()?.to_owned(),
            revision: scalar("value")?.as_u64()?,
        })
    }
}
