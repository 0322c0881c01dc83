//! Typed graph patches and their atomic application.
//!
//! A [`PatchIntent`] is parsed once at the boundary; [`apply_patch`] works on
//! a copy and either returns the whole patched graph or an error with the
//! caller's graph untouched.

use std::collections::HashSet;
use std::fmt;

use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info};

use crate::ident::new_id;
use crate::layout;
use crate::{GraphDocument, Link, Node, NodeMetadata};

/// Reserved string asking for a value to be taken from the enclosing graph.
pub const INHERIT: &str = "inherit";

#[derive(Debug, Error, PartialEq)]
pub enum PatchError {
    #[error("malformed patch: {0}")]
    Malformed(String),
    #[error("node {node_id} not found")]
    NodeNotFound { node_id: String },
    #[error("node {node_id} already exists")]
    DuplicateNode { node_id: String },
    #[error("link {link_id} references missing node {node_id}")]
    DanglingLink { link_id: String, node_id: String },
    #[error("link {link_id} not found")]
    LinkNotFound { link_id: String },
    #[error("link {link_id} already exists")]
    DuplicateLink { link_id: String },
    #[error("invalid changes for {target}: {reason}")]
    InvalidChanges { target: String, reason: String },
}

/// A producer's proposed edit: a description plus operations applied in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatchIntent {
    #[serde(default)]
    pub intent: String,
    #[serde(rename = "patches")]
    pub operations: Vec<PatchOp>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PatchOp {
    Modify {
        node_id: String,
        changes: Map<String, Value>,
    },
    Add {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        insert_after_node_id: Option<String>,
        #[serde(default)]
        new_nodes: Vec<NewNode>,
        #[serde(default)]
        new_links: Vec<Link>,
    },
    Delete {
        node_ids: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reconnect: Option<Reconnect>,
    },
    Replace {
        node_id: String,
        new_node: NewNode,
        #[serde(default)]
        update_links: Vec<LinkUpdate>,
    },
}

/// A node as written in a patch: graph membership may be `"inherit"`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewNode {
    #[serde(default)]
    pub id: String,
    pub block_id: String,
    #[serde(default, deserialize_with = "crate::graph::null_as_empty")]
    pub input_default: Map<String, Value>,
    #[serde(default)]
    pub metadata: NodeMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph_id: Option<Inheritable<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph_version: Option<Inheritable<u32>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inheritable<T> {
    Inherit,
    Value(T),
}

impl<T> Inheritable<T> {
    pub fn resolve(self, parent: T) -> T {
        match self {
            Inheritable::Inherit => parent,
            Inheritable::Value(value) => value,
        }
    }
}

impl<T: Serialize> Serialize for Inheritable<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Inheritable::Inherit => serializer.serialize_str(INHERIT),
            Inheritable::Value(value) => value.serialize(serializer),
        }
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Inheritable<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        if value.as_str() == Some(INHERIT) {
            return Ok(Inheritable::Inherit);
        }
        serde_json::from_value(value)
            .map(Inheritable::Value)
            .map_err(de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reconnect {
    pub from_node_id: String,
    pub to_node_id: String,
    #[serde(default)]
    pub maintain_data_flow: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkUpdate {
    pub link_id: String,
    pub changes: Map<String, Value>,
}

impl PatchIntent {
    pub fn from_value(value: Value) -> Result<Self, PatchError> {
        serde_json::from_value(value).map_err(|e| PatchError::Malformed(e.to_string()))
    }

    pub fn from_json_str(text: &str) -> Result<Self, PatchError> {
        serde_json::from_str(text).map_err(|e| PatchError::Malformed(e.to_string()))
    }
}

impl PatchOp {
    pub fn kind(&self) -> &'static str {
        match self {
            PatchOp::Modify { .. } => "modify",
            PatchOp::Add { .. } => "add",
            PatchOp::Delete { .. } => "delete",
            PatchOp::Replace { .. } => "replace",
        }
    }
}

impl fmt::Display for PatchOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchOp::Modify { node_id, .. } => write!(f, "modify {}", node_id),
            PatchOp::Add { new_nodes, new_links, .. } => write!(
                f,
                "add {} node(s) and {} link(s)",
                new_nodes.len(),
                new_links.len()
            ),
            PatchOp::Delete { node_ids, .. } => write!(f, "delete {}", node_ids.join(", ")),
            PatchOp::Replace { node_id, .. } => write!(f, "replace {}", node_id),
        }
    }
}

impl NewNode {
    /// Materialize against the graph the node joins. Missing membership
    /// fields fall back to `fallback`, the node being replaced if any.
    fn into_node(self, graph: &GraphDocument, fallback: Option<&Node>) -> Node {
        let graph_id = match self.graph_id {
            Some(id) => Some(id.resolve(graph.id.clone())),
            None => fallback.and_then(|n| n.graph_id.clone()),
        };
        let graph_version = match self.graph_version {
            Some(version) => Some(version.resolve(graph.version)),
            None => fallback.and_then(|n| n.graph_version),
        };
        Node {
            id: self.id,
            block_id: self.block_id,
            input_default: self.input_default,
            metadata: self.metadata,
            graph_id,
            graph_version,
            extra: self.extra,
        }
    }
}

/// Apply every operation of `patch` to a copy of `graph`, in order.
pub fn apply_patch(graph: &GraphDocument, patch: &PatchIntent) -> Result<GraphDocument, PatchError> {
    info!(
        "Applying patch with {} operation(s): {}",
        patch.operations.len(),
        patch.intent
    );
    let mut patched = graph.clone();
    for op in &patch.operations {
        apply_op(&mut patched, op)?;
        debug!("Applied {}", op);
    }
    Ok(patched)
}

fn apply_op(graph: &mut GraphDocument, op: &PatchOp) -> Result<(), PatchError> {
    match op {
        PatchOp::Modify { node_id, changes } => modify_node(graph, node_id, changes),
        PatchOp::Add {
            insert_after_node_id,
            new_nodes,
            new_links,
        } => add_nodes(graph, insert_after_node_id.as_deref(), new_nodes, new_links),
        PatchOp::Delete { node_ids, reconnect } => {
            delete_nodes(graph, node_ids, reconnect.as_ref());
            Ok(())
        }
        PatchOp::Replace {
            node_id,
            new_node,
            update_links,
        } => replace_node(graph, node_id, new_node, update_links),
    }
}

fn modify_node(
    graph: &mut GraphDocument,
    node_id: &str,
    changes: &Map<String, Value>,
) -> Result<(), PatchError> {
    let Some(index) = graph.nodes.iter().position(|n| n.id == node_id) else {
        debug!("Modify target {} not found, skipping", node_id);
        return Ok(());
    };
    let node: Node = merged(&graph.nodes[index], changes, node_id)?;
    if node.id.is_empty() {
        return Err(PatchError::InvalidChanges {
            target: node_id.to_string(),
            reason: "node id cannot be empty".to_string(),
        });
    }
    rename_node(graph, node_id, &node.id)?;
    graph.nodes[index] = node;
    Ok(())
}

/// Point every link at `new_id` instead of `old_id`. The new id must not be
/// taken by another node.
fn rename_node(graph: &mut GraphDocument, old_id: &str, new_id: &str) -> Result<(), PatchError> {
    if old_id == new_id {
        return Ok(());
    }
    if graph.contains_node(new_id) {
        return Err(PatchError::DuplicateNode {
            node_id: new_id.to_string(),
        });
    }
    for link in &mut graph.links {
        if link.source_id == old_id {
            link.source_id = new_id.to_string();
        }
        if link.sink_id == old_id {
            link.sink_id = new_id.to_string();
        }
    }
    Ok(())
}

fn add_nodes(
    graph: &mut GraphDocument,
    insert_after: Option<&str>,
    new_nodes: &[NewNode],
    new_links: &[Link],
) -> Result<(), PatchError> {
    let anchor = insert_after
        .and_then(|id| graph.find_node(id))
        .map(|n| n.position());

    for (slot, new_node) in new_nodes.iter().enumerate() {
        if !new_node.id.is_empty() && graph.contains_node(&new_node.id) {
            return Err(PatchError::DuplicateNode {
                node_id: new_node.id.clone(),
            });
        }
        let mut node = new_node.clone().into_node(graph, None);
        if node.metadata.position.is_none()
            && let Some(anchor) = anchor
        {
            node.metadata.position = Some(layout::after(anchor, slot));
        }
        graph.add_node(node);
    }

    for link in new_links {
        if graph.find_link(&link.id).is_some() {
            return Err(PatchError::DuplicateLink {
                link_id: link.id.clone(),
            });
        }
        ensure_endpoints(graph, link)?;
        graph.add_link(link.clone());
    }
    Ok(())
}

fn delete_nodes(graph: &mut GraphDocument, node_ids: &[String], reconnect: Option<&Reconnect>) {
    let doomed: HashSet<String> = node_ids.iter().cloned().collect();
    let bridge = reconnect
        .filter(|r| r.maintain_data_flow)
        .and_then(|r| bridge_link(graph, &doomed, r));

    graph.remove_nodes(&doomed);
    if let Some(link) = bridge {
        debug!(
            "Reconnected {}:{} -> {}:{}",
            link.source_id, link.source_name, link.sink_id, link.sink_name
        );
        graph.add_link(link);
    }
}

/// Link preserving the flow around deleted nodes, when it is unambiguous:
/// exactly one link from `from_node_id` into the deleted set and exactly one
/// link out of it into `to_node_id`.
fn bridge_link(graph: &GraphDocument, doomed: &HashSet<String>, hint: &Reconnect) -> Option<Link> {
    if doomed.contains(&hint.from_node_id)
        || doomed.contains(&hint.to_node_id)
        || !graph.contains_node(&hint.from_node_id)
        || !graph.contains_node(&hint.to_node_id)
    {
        return None;
    }

    let mut incoming = graph
        .links
        .iter()
        .filter(|l| l.source_id == hint.from_node_id && doomed.contains(&l.sink_id));
    let mut outgoing = graph
        .links
        .iter()
        .filter(|l| l.sink_id == hint.to_node_id && doomed.contains(&l.source_id));

    let (Some(inbound), None) = (incoming.next(), incoming.next()) else {
        return None;
    };
    let (Some(outbound), None) = (outgoing.next(), outgoing.next()) else {
        return None;
    };

    let mut link = Link::new(
        new_id(),
        &hint.from_node_id,
        &inbound.source_name,
        &hint.to_node_id,
        &outbound.sink_name,
    );
    link.is_static = inbound.is_static;
    Some(link)
}

fn replace_node(
    graph: &mut GraphDocument,
    node_id: &str,
    new_node: &NewNode,
    update_links: &[LinkUpdate],
) -> Result<(), PatchError> {
    let Some(index) = graph.nodes.iter().position(|n| n.id == node_id) else {
        return Err(PatchError::NodeNotFound {
            node_id: node_id.to_string(),
        });
    };

    let old = graph.nodes[index].clone();
    let mut node = new_node.clone().into_node(graph, Some(&old));
    if node.id.is_empty() {
        node.id = old.id.clone();
    }
    if node.metadata.position.is_none() {
        node.metadata.position = old.metadata.position;
    }

    rename_node(graph, &old.id, &node.id)?;
    graph.nodes[index] = node;

    for update in update_links {
        let Some(position) = graph.links.iter().position(|l| l.id == update.link_id) else {
            return Err(PatchError::LinkNotFound {
                link_id: update.link_id.clone(),
            });
        };
        let link: Link = merged(&graph.links[position], &update.changes, &update.link_id)?;
        if link.id != update.link_id && graph.find_link(&link.id).is_some() {
            return Err(PatchError::DuplicateLink { link_id: link.id });
        }
        ensure_endpoints(graph, &link)?;
        graph.links[position] = link;
    }
    Ok(())
}

fn ensure_endpoints(graph: &GraphDocument, link: &Link) -> Result<(), PatchError> {
    for endpoint in [&link.source_id, &link.sink_id] {
        if !graph.contains_node(endpoint) {
            return Err(PatchError::DanglingLink {
                link_id: link.id.clone(),
                node_id: endpoint.clone(),
            });
        }
    }
    Ok(())
}

/// Deep-merge `changes` into a serializable record and read it back.
fn merged<T>(target: &T, changes: &Map<String, Value>, label: &str) -> Result<T, PatchError>
where
    T: Serialize + DeserializeOwned,
{
    let invalid = |e: serde_json::Error| PatchError::InvalidChanges {
        target: label.to_string(),
        reason: e.to_string(),
    };
    let mut value = serde_json::to_value(target).map_err(invalid)?;
    deep_merge(&mut value, changes);
    serde_json::from_value(value).map_err(invalid)
}

/// Nested objects merge key by key; everything else overwrites.
pub fn deep_merge(target: &mut Value, changes: &Map<String, Value>) {
    let map = match target {
        Value::Object(map) => map,
        other => {
            *other = Value::Object(changes.clone());
            return;
        }
    };
    for (key, change) in changes {
        if let Value::Object(nested) = change
            && let Some(existing) = map.get_mut(key)
            && existing.is_object()
        {
            deep_merge(existing, nested);
            continue;
        }
        map.insert(key.clone(), change.clone());
    }
}
