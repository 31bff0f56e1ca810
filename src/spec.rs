//! Topology specification collaborator types
//!
//! The surrounding framework owns the topology graph model; this crate only
//! needs the shapes that cross the node boundary: the specification node that
//! spawned an engine node, the bidirectional ports declared on it, and the
//! bidirectional links attached to those ports. Metadata is schemaless in the
//! specification language, so it is carried as a JSON object map.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A node in the topology specification graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyNode {
    /// Unique identifier of the specification node
    pub identifier: String,

    /// Arbitrary specification metadata
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl TopologyNode {
    /// Create a specification node with empty metadata
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            metadata: Map::new(),
        }
    }
}

/// A bidirectional port declared on a specification node
///
/// Prior to topology build this is purely logical; the engine node decides
/// what interface name realizes it (see
/// [`ContainerNode::notify_add_biport`](crate::node::ContainerNode::notify_add_biport)).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BidirectionalPort {
    /// Unique identifier of the port within the specification
    pub identifier: String,

    /// Arbitrary specification metadata; a `"label"` entry, when present,
    /// names the interface the port should map to
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl BidirectionalPort {
    /// Create a port with empty metadata
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            metadata: Map::new(),
        }
    }

    /// Create a port carrying an explicit interface label
    pub fn with_label(identifier: impl Into<String>, label: impl Into<String>) -> Self {
        let mut metadata = Map::new();
        metadata.insert("label".to_string(), Value::String(label.into()));
        Self {
            identifier: identifier.into(),
            metadata,
        }
    }

    /// The explicit interface label, if one is set in the metadata
    pub fn label(&self) -> Option<&str> {
        self.metadata.get("label").and_then(Value::as_str)
    }
}

/// A bidirectional link between two ports in the specification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BidirectionalLink {
    /// Unique identifier of the link within the specification
    pub identifier: String,

    /// Arbitrary specification metadata
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl BidirectionalLink {
    /// Create a link with empty metadata
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            metadata: Map::new(),
        }
    }
}
