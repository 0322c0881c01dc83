use std::collections::HashSet;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// A candidate workflow graph as emitted by a producer.
///
/// Identifiers are kept as plain strings: producers routinely emit ids that
/// are not canonical, and the fixer is responsible for repairing them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDocument {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub input_schema: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub output_schema: Map<String, Value>,
    /// Fields the engine does not interpret, carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_version() -> u32 {
    1
}

/// Producers sometimes send `null` where an object is expected.
pub(crate) fn null_as_empty<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

impl Default for GraphDocument {
    fn default() -> Self {
        Self {
            id: crate::ident::new_id(),
            name: "New Graph".to_string(),
            description: String::new(),
            version: default_version(),
            is_active: true,
            nodes: vec![],
            links: vec![],
            input_schema: Map::new(),
            output_schema: Map::new(),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub block_id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub input_default: Map<String, Value>,
    #[serde(default)]
    pub metadata: NodeMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph_version: Option<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customized_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
}

/// A directed data connection from an output field to an input field.
///
/// Missing endpoints deserialize to empty strings so the validator can
/// report them instead of the whole document being rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Link {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub source_id: String,
    #[serde(default)]
    pub source_name: String,
    #[serde(default)]
    pub sink_id: String,
    #[serde(default)]
    pub sink_name: String,
    #[serde(default)]
    pub is_static: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Node {
    pub fn new(id: impl Into<String>, block_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            block_id: block_id.into(),
            ..Default::default()
        }
    }

    pub fn with_defaults(mut self, input_default: Value) -> Self {
        if let Value::Object(map) = input_default {
            self.input_default = map;
        }
        self
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.metadata.position = Some(position);
        self
    }

    pub fn position(&self) -> Position {
        self.metadata.position.unwrap_or_default()
    }
}

impl Link {
    pub fn new(
        id: impl Into<String>,
        source_id: impl Into<String>,
        source_name: impl Into<String>,
        sink_id: impl Into<String>,
        sink_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source_id: source_id.into(),
            source_name: source_name.into(),
            sink_id: sink_id.into(),
            sink_name: sink_name.into(),
            is_static: false,
            extra: Map::new(),
        }
    }

    pub fn is_self_loop(&self) -> bool {
        self.source_id == self.sink_id
    }

    pub fn touches(&self, node_id: &str) -> bool {
        self.source_id == node_id || self.sink_id == node_id
    }
}

impl GraphDocument {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn from_json(value: Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }

    pub fn find_node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn find_node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    pub fn find_link(&self, id: &str) -> Option<&Link> {
        self.links.iter().find(|l| l.id == id)
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.nodes.iter().any(|n| n.id == id)
    }

    /// Block id of the node with the given id, if the node exists.
    pub fn block_of(&self, node_id: &str) -> Option<&str> {
        self.find_node(node_id).map(|n| n.block_id.as_str())
    }

    pub fn incoming_links<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Link> + 'a {
        self.links.iter().filter(move |l| l.sink_id == node_id)
    }

    pub fn outgoing_links<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Link> + 'a {
        self.links.iter().filter(move |l| l.source_id == node_id)
    }

    /// Links feeding the named input of a node.
    pub fn links_into<'a>(
        &'a self,
        node_id: &'a str,
        sink_name: &'a str,
    ) -> impl Iterator<Item = &'a Link> + 'a {
        self.incoming_links(node_id)
            .filter(move |l| l.sink_name == sink_name)
    }

    pub fn add_node(&mut self, node: Node) {
        self.nodes.push(node);
    }

    pub fn add_link(&mut self, link: Link) {
        self.links.push(link);
    }

    /// Remove links by position. Used where producer ids cannot be trusted
    /// to be unique.
    pub fn remove_links_at(&mut self, indices: &HashSet<usize>) {
        if indices.is_empty() {
            return;
        }
        let mut index = 0;
        self.links.retain(|_| {
            let keep = !indices.contains(&index);
            index += 1;
            keep
        });
    }

    /// Remove nodes and every link touching them.
    pub fn remove_nodes(&mut self, ids: &HashSet<String>) {
        if ids.is_empty() {
            return;
        }
        self.nodes.retain(|n| !ids.contains(&n.id));
        self.links
            .retain(|l| !ids.contains(&l.source_id) && !ids.contains(&l.sink_id));
    }
}
