use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

use super::{FixContext, FixRule};
use crate::GraphDocument;
use crate::blocks::{CODE_EXECUTION_BLOCK_ID, TEMPLATED_TEXT_FIELDS, is_templated_text_block};
use crate::ident::short_id;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{[A-Za-z_][A-Za-z0-9_]*\}").expect("placeholder pattern is valid")
});

/// Rewrite `{name}` to `{{name}}`, leaving already doubled braces alone.
pub fn escape_placeholders(text: &str) -> Cow<'_, str> {
    let mut out = String::new();
    let mut last = 0;

    for m in PLACEHOLDER.find_iter(text) {
        let preceded = text[..m.start()].ends_with('{');
        let followed = text[m.end()..].starts_with('}');
        if preceded || followed {
            continue;
        }
        out.push_str(&text[last..m.start()]);
        out.push('{');
        out.push_str(m.as_str());
        out.push('}');
        last = m.end();
    }

    if last == 0 && out.is_empty() {
        return Cow::Borrowed(text);
    }
    out.push_str(&text[last..]);
    Cow::Owned(out)
}

/// Templated-text blocks expect double-brace placeholders in their text
/// inputs. Nodes whose output feeds a code-execution block are skipped so
/// literal code is never rewritten.
pub struct EscapeTemplatePlaceholders;

impl FixRule for EscapeTemplatePlaceholders {
    fn name(&self) -> &'static str {
        "template_placeholders"
    }

    fn apply(&self, graph: &mut GraphDocument, ctx: &mut FixContext<'_>) {
        let targets: Vec<String> = graph
            .nodes
            .iter()
            .filter(|n| is_templated_text_block(&n.block_id))
            .filter(|n| {
                !graph
                    .outgoing_links(&n.id)
                    .any(|l| graph.block_of(&l.sink_id) == Some(CODE_EXECUTION_BLOCK_ID))
            })
            .map(|n| n.id.clone())
            .collect();

        for node_id in targets {
            let Some(node) = graph.find_node_mut(&node_id) else {
                continue;
            };
            for field in TEMPLATED_TEXT_FIELDS {
                let Some(serde_json::Value::String(text)) = node.input_default.get_mut(*field)
                else {
                    continue;
                };
                let fixed = match escape_placeholders(text) {
                    Cow::Owned(fixed) => fixed,
                    Cow::Borrowed(_) => continue,
                };
                ctx.record(format!(
                    "Fixed {} placeholders in node {}: {} -> {}",
                    field,
                    short_id(&node_id),
                    text,
                    fixed
                ));
                *text = fixed;
            }
        }
    }
}
