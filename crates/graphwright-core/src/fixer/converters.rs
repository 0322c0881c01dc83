use std::collections::HashSet;

use serde_json::json;

use super::{FixContext, FixRule, helper_node};
use crate::blocks::{TYPE_CONVERTER_BLOCK_ID, fields};
use crate::ident::{new_id, short_id};
use crate::layout::between;
use crate::schema::converter_target_type;
use crate::{GraphDocument, Link, Violation, link_type_mismatch};

/// Route every type-incompatible link through a converter node targeting
/// the sink's declared type. Needs a catalog that knows the converter block.
pub struct InsertTypeConverters;

impl FixRule for InsertTypeConverters {
    fn name(&self) -> &'static str {
        "type_converters"
    }

    fn apply(&self, graph: &mut GraphDocument, ctx: &mut FixContext<'_>) {
        let Some(catalog) = ctx.catalog else {
            return;
        };
        let Some(converter_block) = catalog.get(TYPE_CONVERTER_BLOCK_ID) else {
            return;
        };

        let mismatches: Vec<(usize, Link, String)> = graph
            .links
            .iter()
            .enumerate()
            .filter_map(|(index, link)| match link_type_mismatch(graph, catalog, link)? {
                Violation::DataTypeMismatch { sink_type, .. } => {
                    Some((index, link.clone(), sink_type))
                }
                _ => None,
            })
            .collect();

        let mut replaced = HashSet::new();
        for (slot, (index, link, sink_type)) in mismatches.into_iter().enumerate() {
            let Some(target) = converter_target_type(&sink_type) else {
                continue;
            };
            let (Some(source), Some(sink)) =
                (graph.find_node(&link.source_id), graph.find_node(&link.sink_id))
            else {
                continue;
            };
            let source_static = catalog
                .get(&source.block_id)
                .is_some_and(|b| b.static_output);

            let converter = helper_node(
                graph,
                TYPE_CONVERTER_BLOCK_ID,
                json!({"type": target}),
                between(source.position(), sink.position(), slot),
            );
            let converter_id = converter.id.clone();
            graph.add_node(converter);

            let mut inbound = Link::new(
                new_id(),
                &link.source_id,
                &link.source_name,
                &converter_id,
                fields::CONVERTER_VALUE,
            );
            inbound.is_static = source_static;
            let mut outbound = Link::new(
                new_id(),
                &converter_id,
                fields::CONVERTER_VALUE,
                &link.sink_id,
                &link.sink_name,
            );
            outbound.is_static = converter_block.static_output;
            graph.add_link(inbound);
            graph.add_link(outbound);

            ctx.record(format!(
                "Inserted type converter {} ({} -> {}) on link {}",
                short_id(&converter_id),
                sink_type,
                target,
                short_id(&link.id)
            ));
            replaced.insert(index);
        }
        graph.remove_links_at(&replaced);
    }
}
