use std::collections::{HashMap, HashSet};

use super::{FixContext, FixRule};
use crate::GraphDocument;
use crate::ident::{is_canonical_id, new_id};

/// Replace non-canonical graph, node and link ids with fresh ones, keeping
/// every link endpoint pointed at the renamed node. Repeated link ids are
/// made unique.
pub struct RepairIdentifiers;

impl FixRule for RepairIdentifiers {
    fn name(&self) -> &'static str {
        "identifiers"
    }

    fn apply(&self, graph: &mut GraphDocument, ctx: &mut FixContext<'_>) {
        let mut renamed: HashMap<String, String> = HashMap::new();
        for node in &mut graph.nodes {
            if is_canonical_id(&node.id) {
                continue;
            }
            let fresh = new_id();
            ctx.record(format!("Fixed node ID: {} -> {}", node.id, fresh));
            // A repeated bad id keeps links on its first holder.
            renamed.entry(node.id.clone()).or_insert_with(|| fresh.clone());
            node.id = fresh;
        }

        let mut seen_links: HashSet<String> = HashSet::new();
        for link in &mut graph.links {
            if let Some(fresh) = renamed.get(&link.source_id) {
                link.source_id = fresh.clone();
            }
            if let Some(fresh) = renamed.get(&link.sink_id) {
                link.sink_id = fresh.clone();
            }
            // Later holders of an id already taken get a fresh one.
            let duplicate = is_canonical_id(&link.id) && !seen_links.insert(link.id.clone());
            if duplicate || !is_canonical_id(&link.id) {
                let fresh = new_id();
                let what = if duplicate { "duplicate link ID" } else { "link ID" };
                ctx.record(format!("Fixed {}: {} -> {}", what, link.id, fresh));
                seen_links.insert(fresh.clone());
                link.id = fresh;
            }
        }

        if !is_canonical_id(&graph.id) {
            let old = if graph.id.is_empty() {
                "missing".to_string()
            } else {
                graph.id.clone()
            };
            let fresh = new_id();
            for node in &mut graph.nodes {
                if node.graph_id.as_deref() == Some(graph.id.as_str()) {
                    node.graph_id = Some(fresh.clone());
                }
            }
            ctx.record(format!("Fixed graph ID: {} -> {}", old, fresh));
            graph.id = fresh;
        }
    }
}
