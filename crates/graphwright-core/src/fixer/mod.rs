//! Deterministic repair of known producer defects.
//!
//! The fixer is an ordered pipeline of independent [`FixRule`]s applied to a
//! copy of the input graph. Every rule detects its own earlier application,
//! so running the pipeline on an already fixed graph changes nothing.

mod accumulators;
mod condition;
mod converters;
mod ids;
mod links;
mod normalize;
mod templates;


pub use accumulators::{BootstrapListAccumulators, DropDictionarySeeds};
pub use condition::BootstrapConditionValue;
pub use converters::InsertTypeConverters;
pub use ids::RepairIdentifiers;
pub use links::PropagateStaticOutput;
pub use normalize::{InjectDefaultModel, NormalizeSampleSize, RenameCodeExecutionOutput};
pub use templates::{EscapeTemplatePlaceholders, escape_placeholders};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::{BlockCatalog, GraphDocument, Node, Position, ident};

/// Values the fixer needs that are not part of the graph or the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixerSettings {
    /// Model injected into AI blocks that do not name one.
    pub default_model: String,
}

impl Default for FixerSettings {
    fn default() -> Self {
        Self {
            default_model: "gpt-4o".to_string(),
        }
    }
}

/// One change made by a rule, for the caller's audit trail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedFix {
    pub rule: &'static str,
    pub description: String,
}

/// Per-run state shared by the rules of one pipeline pass.
pub struct FixContext<'a> {
    pub catalog: Option<&'a BlockCatalog>,
    pub settings: &'a FixerSettings,
    rule: &'static str,
    applied: Vec<AppliedFix>,
}

impl<'a> FixContext<'a> {
    pub fn new(catalog: Option<&'a BlockCatalog>, settings: &'a FixerSettings) -> Self {
        Self {
            catalog,
            settings,
            rule: "",
            applied: Vec::new(),
        }
    }

    pub fn record(&mut self, description: impl Into<String>) {
        let description = description.into();
        debug!("[{}] {}", self.rule, description);
        self.applied.push(AppliedFix {
            rule: self.rule,
            description,
        });
    }

    pub fn applied(&self) -> &[AppliedFix] {
        &self.applied
    }

    pub fn into_applied(self) -> Vec<AppliedFix> {
        self.applied
    }

    fn enter(&mut self, rule: &'static str) {
        self.rule = rule;
    }
}

/// A single repair. Rules never fail: one that cannot apply leaves the graph
/// as it found it.
pub trait FixRule: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply(&self, graph: &mut GraphDocument, ctx: &mut FixContext<'_>);
}

#[derive(Debug, Clone)]
pub struct FixOutcome {
    pub graph: GraphDocument,
    pub applied: Vec<AppliedFix>,
}

impl FixOutcome {
    pub fn changed(&self) -> bool {
        !self.applied.is_empty()
    }
}

pub struct GraphFixer {
    rules: Vec<Box<dyn FixRule>>,
    settings: FixerSettings,
}

impl Default for GraphFixer {
    fn default() -> Self {
        Self::new(FixerSettings::default())
    }
}

impl GraphFixer {
    /// The full rule pipeline, in application order.
    pub fn new(settings: FixerSettings) -> Self {
        Self {
            rules: vec![
                Box::new(RepairIdentifiers),
                Box::new(EscapeTemplatePlaceholders),
                Box::new(BootstrapConditionValue),
                Box::new(BootstrapListAccumulators),
                Box::new(DropDictionarySeeds),
                Box::new(RenameCodeExecutionOutput),
                Box::new(NormalizeSampleSize),
                Box::new(InjectDefaultModel),
                Box::new(PropagateStaticOutput),
                Box::new(InsertTypeConverters),
            ],
            settings,
        }
    }

    /// A pipeline with an explicit rule list.
    pub fn with_rules(settings: FixerSettings, rules: Vec<Box<dyn FixRule>>) -> Self {
        Self { rules, settings }
    }

    pub fn settings(&self) -> &FixerSettings {
        &self.settings
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Run every rule over a copy of `graph`. Catalog-dependent rules are
    /// skipped when no catalog is given.
    pub fn fix(&self, graph: &GraphDocument, catalog: Option<&BlockCatalog>) -> FixOutcome {
        let mut graph = graph.clone();
        let mut ctx = FixContext::new(catalog, &self.settings);

        for rule in &self.rules {
            ctx.enter(rule.name());
            rule.apply(&mut graph, &mut ctx);
        }

        let applied = ctx.into_applied();
        info!("Applied {} fixes to graph {}", applied.len(), graph.id);
        FixOutcome { graph, applied }
    }
}

/// Fix a graph with the default pipeline and settings.
pub fn fix_graph(graph: &GraphDocument, catalog: Option<&BlockCatalog>) -> FixOutcome {
    GraphFixer::default().fix(graph, catalog)
}

/// A node synthesized by a rule, owned by `graph`.
pub(crate) fn helper_node(
    graph: &GraphDocument,
    block_id: &str,
    input_default: Value,
    position: Position,
) -> Node {
    let mut node = Node::new(ident::new_id(), block_id).with_position(position);
    node.input_default = match input_default {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    node.graph_id = Some(graph.id.clone());
    node.graph_version = Some(graph.version);
    node
}
