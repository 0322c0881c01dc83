use std::collections::HashSet;
use std::fmt;

use thiserror::Error;
use tracing::{info, warn};

use crate::blocks::CREDENTIALS_FIELD;
use crate::schema::{split_nested, types_compatible};
use crate::{BlockCatalog, GraphDocument, Link};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Source,
    Sink,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Source => write!(f, "source"),
            Endpoint::Sink => write!(f, "sink"),
        }
    }
}

/// Coarse category of a [`Violation`], one per validator check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViolationKind {
    UnknownBlock,
    LinkIntegrity,
    MissingRequiredInput,
    DataTypeMismatch,
    InvalidNestedSink,
}

/// One structural or semantic defect. Reported, never raised.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Violation {
    #[error(
        "Node '{node_id}' uses block '{block_id}', which does not exist in the block catalog."
    )]
    UnknownBlock { node_id: String, block_id: String },

    #[error("Link '{link_id}' has no {endpoint} node id.")]
    MissingLinkEndpoint { link_id: String, endpoint: Endpoint },

    #[error("Link '{link_id}' references {endpoint} node '{node_id}', which does not exist in the graph.")]
    DanglingLink {
        link_id: String,
        endpoint: Endpoint,
        node_id: String,
    },

    #[error(
        "Node '{node_id}' (block '{block_name}' - {block_id}) is missing required input '{field}'. \
         This input must be either provided as a default value in the node's 'input_default' field \
         or connected via a link from another node's output."
    )]
    MissingRequiredInput {
        node_id: String,
        block_id: String,
        block_name: String,
        field: String,
    },

    #[error(
        "Data type mismatch in link '{link_id}': Source '{source_block}' output '{source_name}' \
         outputs '{source_type}' type, but sink '{sink_block}' input '{sink_name}' expects \
         '{sink_type}' type. These types must match for the connection to work properly."
    )]
    DataTypeMismatch {
        link_id: String,
        source_block: String,
        source_name: String,
        source_type: String,
        sink_block: String,
        sink_name: String,
        sink_type: String,
    },

    #[error(
        "Invalid nested sink link '{sink_name}' for node '{node_id}' (block '{block_name}' - {block_id}): \
         Parent property '{parent}' does not exist in the block's input schema."
    )]
    UnknownNestedParent {
        link_id: String,
        node_id: String,
        block_id: String,
        block_name: String,
        sink_name: String,
        parent: String,
    },

    #[error(
        "Invalid nested sink link '{sink_name}' for node '{node_id}' (block '{block_name}' - {block_id}): \
         Child property '{child}' does not exist in parent '{parent}' schema. \
         Available properties: [{available}]"
    )]
    UnknownNestedChild {
        link_id: String,
        node_id: String,
        block_id: String,
        block_name: String,
        sink_name: String,
        parent: String,
        child: String,
        available: String,
    },
}

impl Violation {
    pub fn kind(&self) -> ViolationKind {
        match self {
            Violation::UnknownBlock { .. } => ViolationKind::UnknownBlock,
            Violation::MissingLinkEndpoint { .. } | Violation::DanglingLink { .. } => {
                ViolationKind::LinkIntegrity
            }
            Violation::MissingRequiredInput { .. } => ViolationKind::MissingRequiredInput,
            Violation::DataTypeMismatch { .. } => ViolationKind::DataTypeMismatch,
            Violation::UnknownNestedParent { .. } | Violation::UnknownNestedChild { .. } => {
                ViolationKind::InvalidNestedSink
            }
        }
    }

    /// Node the violation is attached to, if any.
    pub fn node_id(&self) -> Option<&str> {
        match self {
            Violation::UnknownBlock { node_id, .. }
            | Violation::DanglingLink { node_id, .. }
            | Violation::MissingRequiredInput { node_id, .. }
            | Violation::UnknownNestedParent { node_id, .. }
            | Violation::UnknownNestedChild { node_id, .. } => Some(node_id),
            Violation::MissingLinkEndpoint { .. } | Violation::DataTypeMismatch { .. } => None,
        }
    }

    /// Link the violation is attached to, if any.
    pub fn link_id(&self) -> Option<&str> {
        match self {
            Violation::MissingLinkEndpoint { link_id, .. }
            | Violation::DanglingLink { link_id, .. }
            | Violation::DataTypeMismatch { link_id, .. }
            | Violation::UnknownNestedParent { link_id, .. }
            | Violation::UnknownNestedChild { link_id, .. } => Some(link_id),
            Violation::UnknownBlock { .. } | Violation::MissingRequiredInput { .. } => None,
        }
    }
}

/// Every violation found in one validation pass, in check order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.violations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn of_kind(&self, kind: ViolationKind) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(move |v| v.kind() == kind)
    }

    /// Numbered, human-readable report for a repair collaborator.
    pub fn render(&self) -> String {
        if self.is_ok() {
            return "Graph validation passed.".to_string();
        }
        let mut out = String::from("Graph validation failed with the following errors:\n\n");
        for (i, violation) in self.violations.iter().enumerate() {
            out.push_str(&format!("{}. {}\n", i + 1, violation));
        }
        out.push_str("\nPlease fix these issues before the graph can be used.");
        out
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Validate a graph against the block catalog.
///
/// Every check runs regardless of earlier findings so the report covers all
/// independent problems at once. The graph is not modified.
pub fn validate_graph(graph: &GraphDocument, catalog: &BlockCatalog) -> ValidationReport {
    info!(
        "Validating graph {} ({} nodes, {} links)",
        graph.id,
        graph.nodes.len(),
        graph.links.len()
    );

    let mut violations = Vec::new();
    check_block_existence(graph, catalog, &mut violations);
    check_link_integrity(graph, &mut violations);
    check_required_inputs(graph, catalog, &mut violations);
    check_data_types(graph, catalog, &mut violations);
    check_nested_sinks(graph, catalog, &mut violations);

    let report = ValidationReport { violations };
    if report.is_ok() {
        info!("Graph validation successful");
    } else {
        warn!("Graph validation failed with {} violation(s)", report.len());
    }
    report
}

pub fn check_block_existence(
    graph: &GraphDocument,
    catalog: &BlockCatalog,
    violations: &mut Vec<Violation>,
) {
    for node in &graph.nodes {
        if !catalog.contains(&node.block_id) {
            violations.push(Violation::UnknownBlock {
                node_id: node.id.clone(),
                block_id: node.block_id.clone(),
            });
        }
    }
}

pub fn check_link_integrity(graph: &GraphDocument, violations: &mut Vec<Violation>) {
    let node_ids: HashSet<&str> = graph.nodes.iter().map(|n| n.id.as_str()).collect();

    for link in &graph.links {
        for (endpoint, node_id) in [
            (Endpoint::Source, &link.source_id),
            (Endpoint::Sink, &link.sink_id),
        ] {
            if node_id.is_empty() {
                violations.push(Violation::MissingLinkEndpoint {
                    link_id: link.id.clone(),
                    endpoint,
                });
            } else if !node_ids.contains(node_id.as_str()) {
                violations.push(Violation::DanglingLink {
                    link_id: link.id.clone(),
                    endpoint,
                    node_id: node_id.clone(),
                });
            }
        }
    }
}

/// A required input is satisfied by a default, by a link into that exact
/// field, or by being the credentials input.
pub fn check_required_inputs(
    graph: &GraphDocument,
    catalog: &BlockCatalog,
    violations: &mut Vec<Violation>,
) {
    for node in &graph.nodes {
        let Some(block) = catalog.get(&node.block_id) else {
            continue;
        };

        let linked: HashSet<&str> = graph
            .incoming_links(&node.id)
            .map(|l| l.sink_name.as_str())
            .collect();

        for field in &block.input_schema.required {
            if field == CREDENTIALS_FIELD
                || node.input_default.contains_key(field)
                || linked.contains(field.as_str())
            {
                continue;
            }
            violations.push(Violation::MissingRequiredInput {
                node_id: node.id.clone(),
                block_id: block.id.clone(),
                block_name: block.display_name().to_string(),
                field: field.clone(),
            });
        }
    }
}

/// Links whose endpoint types are both declared must be compatible.
/// Links with an unknown endpoint, block or type are skipped here.
pub fn check_data_types(
    graph: &GraphDocument,
    catalog: &BlockCatalog,
    violations: &mut Vec<Violation>,
) {
    violations.extend(
        graph
            .links
            .iter()
            .filter_map(|link| link_type_mismatch(graph, catalog, link)),
    );
}

/// Type mismatch carried by a single link, if both ends resolve to declared
/// types that are not compatible. Unknown nodes, blocks or fields yield
/// `None`; those are other checks' business.
pub fn link_type_mismatch(
    graph: &GraphDocument,
    catalog: &BlockCatalog,
    link: &Link,
) -> Option<Violation> {
    let source_block = catalog.get(graph.block_of(&link.source_id)?)?;
    let sink_block = catalog.get(graph.block_of(&link.sink_id)?)?;

    let source_type = source_block.output_schema.type_of(&link.source_name)?;
    let sink_type = sink_block.input_schema.type_of(&link.sink_name)?;
    if types_compatible(source_type, sink_type) {
        return None;
    }

    Some(Violation::DataTypeMismatch {
        link_id: link.id.clone(),
        source_block: source_block.display_name().to_string(),
        source_name: link.source_name.clone(),
        source_type: source_type.to_string(),
        sink_block: sink_block.display_name().to_string(),
        sink_name: link.sink_name.clone(),
        sink_type: sink_type.to_string(),
    })
}

pub fn check_nested_sinks(
    graph: &GraphDocument,
    catalog: &BlockCatalog,
    violations: &mut Vec<Violation>,
) {
    for link in &graph.links {
        let Some((parent, child)) = split_nested(&link.sink_name) else {
            continue;
        };
        let Some(sink_node) = graph.find_node(&link.sink_id) else {
            continue;
        };
        // Unknown blocks are already reported by the existence check.
        let Some(block) = catalog.get(&sink_node.block_id) else {
            continue;
        };

        let Some(parent_schema) = block.input_schema.property(parent) else {
            violations.push(Violation::UnknownNestedParent {
                link_id: link.id.clone(),
                node_id: sink_node.id.clone(),
                block_id: block.id.clone(),
                block_name: block.display_name().to_string(),
                sink_name: link.sink_name.clone(),
                parent: parent.to_string(),
            });
            continue;
        };

        if parent_schema.allows_additional_properties() || parent_schema.declares_child(child) {
            continue;
        }

        let available = parent_schema
            .properties
            .as_ref()
            .map(|props| {
                props
                    .keys()
                    .map(|k| format!("'{}'", k))
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_default();

        violations.push(Violation::UnknownNestedChild {
            link_id: link.id.clone(),
            node_id: sink_node.id.clone(),
            block_id: block.id.clone(),
            block_name: block.display_name().to_string(),
            sink_name: link.sink_name.clone(),
            parent: parent.to_string(),
            child: child.to_string(),
            available,
        });
    }
}
