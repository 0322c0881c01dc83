use std::collections::HashSet;

use serde_json::{Value, json};

use super::{FixContext, FixRule, helper_node};
use crate::blocks::{
    ADD_TO_DICTIONARY_BLOCK_ID, ADD_TO_LIST_BLOCK_ID, CREATE_DICTIONARY_BLOCK_ID,
    CREATE_LIST_BLOCK_ID, STORE_VALUE_BLOCK_ID, fields,
};
use crate::ident::{new_id, short_id};
use crate::layout::helper_position;
use crate::{GraphDocument, Link, Node};

fn empty_list_defaults() -> Value {
    json!({"list": [], "entry": null, "entries": [], "position": null})
}

/// Every append-to-list node starts from an empty seed node and feeds its
/// own `updated_list` back into `list`. Explicit list constructors wired
/// into it are removed in favour of the seed.
pub struct BootstrapListAccumulators;

impl FixRule for BootstrapListAccumulators {
    fn name(&self) -> &'static str {
        "list_accumulators"
    }

    fn apply(&self, graph: &mut GraphDocument, ctx: &mut FixContext<'_>) {
        drop_list_constructors(graph, ctx);

        let accumulators: Vec<String> = graph
            .nodes
            .iter()
            .filter(|n| n.block_id == ADD_TO_LIST_BLOCK_ID)
            .map(|n| n.id.clone())
            .collect();

        let mut slot = 0;
        for node_id in &accumulators {
            let Some(node) = graph.find_node(node_id) else {
                continue;
            };
            if is_seed(graph, node) || has_seed(graph, node_id) {
                continue;
            }
            let seed = helper_node(
                graph,
                ADD_TO_LIST_BLOCK_ID,
                empty_list_defaults(),
                helper_position(node.position(), slot),
            );
            slot += 1;
            let seed_id = seed.id.clone();
            graph.add_node(seed);
            graph.add_link(Link::new(
                new_id(),
                &seed_id,
                fields::UPDATED_LIST,
                node_id,
                fields::LIST,
            ));
            ctx.record(format!(
                "Added prerequisite AddToList block {} before {}",
                short_id(&seed_id),
                short_id(node_id)
            ));
        }

        for node_id in &accumulators {
            let Some(node) = graph.find_node(node_id) else {
                continue;
            };
            if is_seed(graph, node) || has_self_link(graph, node_id) {
                continue;
            }
            graph.add_link(Link::new(
                new_id(),
                node_id,
                fields::UPDATED_LIST,
                node_id,
                fields::LIST,
            ));
            ctx.record(format!(
                "Added self-referencing link for AddToList block {}",
                short_id(node_id)
            ));
        }
    }
}

/// A seed has empty defaults and nothing feeding its list.
///
/// This is a heuristic: an accumulator whose entry arrives only by link and
/// that has no list input yet looks exactly like a seed and is left alone.
fn is_seed(graph: &GraphDocument, node: &Node) -> bool {
    let defaults = &node.input_default;
    let empty_array = |key: &str| matches!(defaults.get(key), Some(Value::Array(a)) if a.is_empty());
    let entry_unset = matches!(defaults.get(fields::LIST_ENTRY), None | Some(Value::Null));

    empty_array(fields::LIST)
        && empty_array(fields::LIST_ENTRIES)
        && entry_unset
        && graph.links_into(&node.id, fields::LIST).next().is_none()
}

fn has_seed(graph: &GraphDocument, node_id: &str) -> bool {
    graph.links_into(node_id, fields::LIST).any(|l| {
        l.source_name == fields::UPDATED_LIST
            && l.source_id != node_id
            && graph.block_of(&l.source_id) == Some(ADD_TO_LIST_BLOCK_ID)
    })
}

fn has_self_link(graph: &GraphDocument, node_id: &str) -> bool {
    graph
        .links_into(node_id, fields::LIST)
        .any(|l| l.is_self_loop() && l.source_name == fields::UPDATED_LIST)
}

/// A list constructor linked straight into an accumulator is deleted with
/// its links. One reached through a store node keeps the store node; only
/// the store-to-accumulator link goes.
fn drop_list_constructors(graph: &mut GraphDocument, ctx: &mut FixContext<'_>) {
    let mut doomed_nodes = HashSet::new();
    let mut doomed_links = HashSet::new();

    for (index, link) in graph.links.iter().enumerate() {
        if graph.block_of(&link.sink_id) != Some(ADD_TO_LIST_BLOCK_ID) {
            continue;
        }
        match graph.block_of(&link.source_id) {
            Some(CREATE_LIST_BLOCK_ID) => {
                ctx.record(format!(
                    "Removed CreateListBlock {} linked to AddToList block {}",
                    short_id(&link.source_id),
                    short_id(&link.sink_id)
                ));
                doomed_nodes.insert(link.source_id.clone());
                doomed_links.insert(index);
            }
            Some(STORE_VALUE_BLOCK_ID) => {
                let fed_by_constructor = graph
                    .incoming_links(&link.source_id)
                    .any(|prev| graph.block_of(&prev.source_id) == Some(CREATE_LIST_BLOCK_ID));
                if fed_by_constructor {
                    ctx.record(format!(
                        "Removed link from StoreValueBlock {} to AddToList block {}",
                        short_id(&link.source_id),
                        short_id(&link.sink_id)
                    ));
                    doomed_links.insert(index);
                }
            }
            _ => {}
        }
    }

    graph.remove_links_at(&doomed_links);
    graph.remove_nodes(&doomed_nodes);
}

/// Dictionary accumulators start from an empty dictionary on their own, so
/// a constructor wired directly into one is redundant and removed.
pub struct DropDictionarySeeds;

impl FixRule for DropDictionarySeeds {
    fn name(&self) -> &'static str {
        "dictionary_seeds"
    }

    fn apply(&self, graph: &mut GraphDocument, ctx: &mut FixContext<'_>) {
        let mut doomed = HashSet::new();
        for link in &graph.links {
            if graph.block_of(&link.source_id) == Some(CREATE_DICTIONARY_BLOCK_ID)
                && graph.block_of(&link.sink_id) == Some(ADD_TO_DICTIONARY_BLOCK_ID)
                && doomed.insert(link.source_id.clone())
            {
                ctx.record(format!(
                    "Removed CreateDictionaryBlock {} linked to AddToDictionary block {}",
                    short_id(&link.source_id),
                    short_id(&link.sink_id)
                ));
            }
        }
        graph.remove_nodes(&doomed);
    }
}
