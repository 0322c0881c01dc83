use std::collections::HashSet;

use serde_json::{Value, json};

use super::{FixContext, FixRule, helper_node};
use crate::blocks::{CONDITION_BLOCK_ID, STORE_VALUE_BLOCK_ID, fields};
use crate::ident::{new_id, short_id};
use crate::layout::helper_position;
use crate::{GraphDocument, Link, Position};

/// Every condition node compares against a value delivered by a store-value
/// node. An unfed comparison gets a store node carrying its literal value,
/// or `false` when it has none; existing feeds from any other source are
/// routed through a store node.
pub struct BootstrapConditionValue;

impl FixRule for BootstrapConditionValue {
    fn name(&self) -> &'static str {
        "condition_value"
    }

    fn apply(&self, graph: &mut GraphDocument, ctx: &mut FixContext<'_>) {
        let conditions: Vec<String> = graph
            .nodes
            .iter()
            .filter(|n| n.block_id == CONDITION_BLOCK_ID)
            .map(|n| n.id.clone())
            .collect();

        // Shared by every store node of this pass so none share coordinates.
        let mut slot = 0;
        for condition_id in conditions {
            let feeds: Vec<(usize, Link)> = graph
                .links
                .iter()
                .enumerate()
                .filter(|(_, l)| {
                    l.sink_id == condition_id && l.sink_name == fields::CONDITION_VALUE2
                })
                .map(|(index, l)| (index, l.clone()))
                .collect();

            if feeds.iter().any(|(_, l)| is_store_output(graph, l)) {
                continue;
            }

            let Some(anchor) = graph.find_node(&condition_id).map(|n| n.position()) else {
                continue;
            };

            if feeds.is_empty() {
                bootstrap_unfed(graph, ctx, &condition_id, helper_position(anchor, slot));
                slot += 1;
                continue;
            }

            let mut replaced = HashSet::new();
            for (index, feed) in feeds {
                let store = helper_node(
                    graph,
                    STORE_VALUE_BLOCK_ID,
                    json!({"data": null}),
                    helper_position(anchor, slot),
                );
                slot += 1;
                let store_id = store.id.clone();
                graph.add_node(store);
                graph.add_link(Link::new(
                    new_id(),
                    &feed.source_id,
                    &feed.source_name,
                    &store_id,
                    fields::STORE_INPUT,
                ));
                graph.add_link(Link::new(
                    new_id(),
                    &store_id,
                    fields::STORE_OUTPUT,
                    &condition_id,
                    fields::CONDITION_VALUE2,
                ));
                ctx.record(format!(
                    "Inserted StoreValueBlock {} between {}:{} and ConditionBlock {} value2",
                    short_id(&store_id),
                    short_id(&feed.source_id),
                    feed.source_name,
                    short_id(&condition_id)
                ));
                replaced.insert(index);
            }
            graph.remove_links_at(&replaced);
        }
    }
}

fn is_store_output(graph: &GraphDocument, link: &Link) -> bool {
    link.source_name == fields::STORE_OUTPUT
        && graph.block_of(&link.source_id) == Some(STORE_VALUE_BLOCK_ID)
}

/// The literal `value2` default, if any, moves into the new store node.
fn bootstrap_unfed(
    graph: &mut GraphDocument,
    ctx: &mut FixContext<'_>,
    condition_id: &str,
    position: Position,
) {
    let Some(condition) = graph.find_node_mut(condition_id) else {
        return;
    };
    let input = match condition.input_default.remove(fields::CONDITION_VALUE2) {
        None | Some(Value::Null) => Value::Bool(false),
        Some(Value::String(s)) if s.is_empty() => Value::Bool(false),
        Some(literal) => literal,
    };

    let store = helper_node(
        graph,
        STORE_VALUE_BLOCK_ID,
        json!({"input": input, "data": null}),
        position,
    );
    let store_id = store.id.clone();
    graph.add_node(store);
    graph.add_link(Link::new(
        new_id(),
        &store_id,
        fields::STORE_OUTPUT,
        condition_id,
        fields::CONDITION_VALUE2,
    ));
    ctx.record(format!(
        "Added StoreValueBlock {} feeding ConditionBlock {} value2",
        short_id(&store_id),
        short_id(condition_id)
    ));
}
