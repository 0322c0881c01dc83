//! What the orchestrator hands to a [`crate::PatchProducer`].

use graphwright_core::{GraphDocument, Position, ValidationReport};
use serde::Serialize;
use serde_json::{Map, Value};

/// Compact view of a graph for prompt building: enough to address nodes
/// by id without the full link list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphSummary {
    pub name: String,
    pub description: String,
    pub nodes: Vec<NodeSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeSummary {
    pub id: String,
    pub block_id: String,
    pub customized_name: String,
    pub position: Option<Position>,
    pub input_default: Map<String, Value>,
}

impl GraphSummary {
    pub fn of(graph: &GraphDocument) -> Self {
        Self {
            name: graph.name.clone(),
            description: graph.description.clone(),
            nodes: graph
                .nodes
                .iter()
                .map(|n| NodeSummary {
                    id: n.id.clone(),
                    block_id: n.block_id.clone(),
                    customized_name: n
                        .metadata
                        .customized_name
                        .clone()
                        .unwrap_or_else(|| "Unnamed".to_string()),
                    position: n.metadata.position,
                    input_default: n.input_default.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Fix the violations in the attached report.
    Repair,
    /// Apply a caller-supplied change request.
    Update,
}

#[derive(Debug, Clone)]
pub struct PatchRequest {
    pub kind: RequestKind,
    pub instruction: String,
    pub graph: GraphDocument,
    pub summary: GraphSummary,
    /// 1-based producer call number within one orchestration.
    pub attempt: usize,
}

impl PatchRequest {
    pub fn new(kind: RequestKind, instruction: String, graph: &GraphDocument, attempt: usize) -> Self {
        Self {
            kind,
            instruction,
            graph: graph.clone(),
            summary: GraphSummary::of(graph),
            attempt,
        }
    }
}

pub fn fix_instruction(report: &ValidationReport) -> String {
    format!(
        "Fix the following validation errors in the graph:\n\n\
         **Validation Error:**\n{}\n\n\
         **Instructions:**\n\
         Please generate a minimal patch to fix only these validation errors while preserving \
         all other parts of the graph exactly as they are.",
        report.render()
    )
}

pub fn with_patch_feedback(instruction: &str, error: &str) -> String {
    format!(
        "{}\n\nPrevious attempt failed with error: {}\nPlease fix this issue.",
        instruction, error
    )
}

pub fn with_validation_feedback(instruction: &str, report: &ValidationReport) -> String {
    format!(
        "{}\n\n**Validation Error from Previous Attempt:**\n{}\n\n\
         Please generate a patch that addresses these validation errors.",
        instruction,
        report.render()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphwright_core::{Node, Violation};
    use serde_json::json;

    #[test]
    fn summary_defaults_missing_names() {
        let mut graph = GraphDocument::new("Digest");
        let mut named = Node::new("a", "b").with_defaults(json!({"k": 1}));
        named.metadata.customized_name = Some("Reader".to_string());
        graph.add_node(named);
        graph.add_node(Node::new("c", "d").with_position(Position { x: 1.0, y: 2.0 }));

        let summary = GraphSummary::of(&graph);
        assert_eq!(summary.name, "Digest");
        assert_eq!(summary.nodes[0].customized_name, "Reader");
        assert_eq!(summary.nodes[0].input_default["k"], json!(1));
        assert_eq!(summary.nodes[1].customized_name, "Unnamed");
        assert_eq!(summary.nodes[1].position, Some(Position { x: 1.0, y: 2.0 }));
    }

    #[test]
    fn instructions_embed_the_rendered_report() {
        let report = ValidationReport {
            violations: vec![Violation::UnknownBlock {
                node_id: "n".to_string(),
                block_id: "ghost".to_string(),
            }],
        };
        let text = fix_instruction(&report);
        assert!(text.contains("1. Node 'n'"));
        assert!(text.contains("minimal patch"));

        let retried = with_validation_feedback("Add a logger", &report);
        assert!(retried.starts_with("Add a logger\n\n"));
        assert!(retried.contains("Previous Attempt"));

        let retried = with_patch_feedback("Add a logger", "node x not found");
        assert!(retried.ends_with("Previous attempt failed with error: node x not found\nPlease fix this issue."));
    }
}
