use std::collections::HashSet;

use serde_json::Value;

use super::{FixContext, FixRule};
use crate::GraphDocument;
use crate::blocks::{CODE_EXECUTION_BLOCK_ID, DATA_SAMPLING_BLOCK_ID, fields};
use crate::ident::short_id;

/// Code execution blocks no longer expose `response`; their text output is
/// `stdout_logs`.
pub struct RenameCodeExecutionOutput;

impl FixRule for RenameCodeExecutionOutput {
    fn name(&self) -> &'static str {
        "code_execution_output"
    }

    fn apply(&self, graph: &mut GraphDocument, ctx: &mut FixContext<'_>) {
        let sources: HashSet<String> = graph
            .nodes
            .iter()
            .filter(|n| n.block_id == CODE_EXECUTION_BLOCK_ID)
            .map(|n| n.id.clone())
            .collect();

        for link in &mut graph.links {
            if sources.contains(&link.source_id) && link.source_name == fields::CODE_LEGACY_OUTPUT {
                link.source_name = fields::CODE_OUTPUT.to_string();
                ctx.record(format!(
                    "Fixed CodeExecutionBlock link {}: source_name {} -> {}",
                    short_id(&link.id),
                    fields::CODE_LEGACY_OUTPUT,
                    fields::CODE_OUTPUT
                ));
            }
        }
    }
}

/// Data sampling always runs with a sample size of 1; links into the field
/// are dropped.
pub struct NormalizeSampleSize;

impl FixRule for NormalizeSampleSize {
    fn name(&self) -> &'static str {
        "sample_size"
    }

    fn apply(&self, graph: &mut GraphDocument, ctx: &mut FixContext<'_>) {
        let samplers: Vec<String> = graph
            .nodes
            .iter()
            .filter(|n| n.block_id == DATA_SAMPLING_BLOCK_ID)
            .map(|n| n.id.clone())
            .collect();

        for node_id in samplers {
            let fed: HashSet<usize> = graph
                .links
                .iter()
                .enumerate()
                .filter(|(_, l)| l.sink_id == node_id && l.sink_name == fields::SAMPLE_SIZE)
                .map(|(index, _)| index)
                .collect();
            if !fed.is_empty() {
                ctx.record(format!(
                    "Removed {} link(s) into DataSamplingBlock {} sample_size",
                    fed.len(),
                    short_id(&node_id)
                ));
                graph.remove_links_at(&fed);
            }

            let Some(node) = graph.find_node_mut(&node_id) else {
                continue;
            };
            let one = Value::from(1);
            let old = node.input_default.insert(fields::SAMPLE_SIZE.to_string(), one.clone());
            if old.as_ref() != Some(&one) {
                ctx.record(format!(
                    "Fixed DataSamplingBlock {} sample_size: {} -> 1",
                    short_id(&node_id),
                    old.unwrap_or(Value::Null)
                ));
            }
        }
    }
}

/// AI blocks that do not name a model get the configured default.
/// Requires a catalog to know which blocks are AI blocks.
pub struct InjectDefaultModel;

impl FixRule for InjectDefaultModel {
    fn name(&self) -> &'static str {
        "default_model"
    }

    fn apply(&self, graph: &mut GraphDocument, ctx: &mut FixContext<'_>) {
        let Some(catalog) = ctx.catalog else {
            return;
        };
        let model = ctx.settings.default_model.clone();

        for node in &mut graph.nodes {
            if !catalog.get(&node.block_id).is_some_and(|b| b.is_ai()) {
                continue;
            }
            if matches!(node.input_default.get(fields::MODEL), None | Some(Value::Null)) {
                node.input_default
                    .insert(fields::MODEL.to_string(), Value::String(model.clone()));
                ctx.record(format!(
                    "Injected model {} into node {}",
                    model,
                    short_id(&node.id)
                ));
            }
        }
    }
}
