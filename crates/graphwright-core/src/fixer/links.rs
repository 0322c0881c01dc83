use super::{FixContext, FixRule};
use crate::GraphDocument;
use crate::ident::short_id;

/// `is_static` is derived from the source block's `staticOutput` flag and
/// never trusted from input. Links whose source block is unknown are left
/// alone.
pub struct PropagateStaticOutput;

impl FixRule for PropagateStaticOutput {
    fn name(&self) -> &'static str {
        "static_output"
    }

    fn apply(&self, graph: &mut GraphDocument, ctx: &mut FixContext<'_>) {
        let Some(catalog) = ctx.catalog else {
            return;
        };

        let derived: Vec<Option<bool>> = graph
            .links
            .iter()
            .map(|l| {
                graph
                    .block_of(&l.source_id)
                    .and_then(|block_id| catalog.get(block_id))
                    .map(|block| block.static_output)
            })
            .collect();

        for (link, is_static) in graph.links.iter_mut().zip(derived) {
            let Some(is_static) = is_static else {
                continue;
            };
            if link.is_static != is_static {
                ctx.record(format!(
                    "Fixed link {} is_static: {} -> {}",
                    short_id(&link.id),
                    link.is_static,
                    is_static
                ));
                link.is_static = is_static;
            }
        }
    }
}
