//! Bounded fix → validate → patch loop.
//!
//! Both flows run the same explicit state machine. `repair` starts from a
//! producer's draft and only asks for a patch when validation fails;
//! `update` starts by asking for a patch that implements a change request.

#[cfg(test)]
mod tests;

use std::fmt;

use graphwright_core::{
    AppliedFix, BlockCatalog, GraphDocument, GraphFixer, ValidationReport, apply_patch,
    validate_graph,
};
use tracing::{debug, info, warn};

use crate::request::{self, PatchRequest, RequestKind};
use crate::{ClarifyingQuestion, PatchProducer, ProducerReply, RepairConfig};

// ── Public types ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairState {
    Draft,
    Fixed,
    Validated,
    PatchRequested,
    PatchApplied,
    Done,
    Failed,
    NeedsInput,
}

impl RepairState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RepairState::Done | RepairState::Failed | RepairState::NeedsInput
        )
    }
}

impl fmt::Display for RepairState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone)]
pub enum RepairOutcome {
    /// The graph validates cleanly.
    Repaired {
        graph: GraphDocument,
        applied: Vec<AppliedFix>,
        patch_attempts: usize,
    },
    /// The producer asked questions instead of patching. Not a failure.
    NeedsInput {
        graph: GraphDocument,
        questions: Vec<ClarifyingQuestion>,
    },
    /// The attempt bound ran out; carries the last report.
    Unresolved {
        graph: GraphDocument,
        report: ValidationReport,
        cause: Option<String>,
    },
}

impl RepairOutcome {
    pub fn graph(&self) -> &GraphDocument {
        match self {
            RepairOutcome::Repaired { graph, .. }
            | RepairOutcome::NeedsInput { graph, .. }
            | RepairOutcome::Unresolved { graph, .. } => graph,
        }
    }

    pub fn is_repaired(&self) -> bool {
        matches!(self, RepairOutcome::Repaired { .. })
    }
}

// ── Orchestrator ────────────────────────────────────────────────

pub struct RepairOrchestrator<P> {
    producer: P,
    catalog: BlockCatalog,
    fixer: GraphFixer,
    max_patch_attempts: usize,
}

/// Everything one orchestration carries between states.
struct Run {
    kind: RequestKind,
    /// Graph patches are applied to: the latest candidate for repairs, the
    /// caller's graph for updates.
    base: GraphDocument,
    graph: GraphDocument,
    instruction: String,
    budget: usize,
    attempts: usize,
    report: ValidationReport,
    applied: Vec<AppliedFix>,
    cause: Option<String>,
    questions: Vec<ClarifyingQuestion>,
}

impl<P: PatchProducer> RepairOrchestrator<P> {
    pub fn new(producer: P, catalog: BlockCatalog) -> Self {
        Self::with_config(producer, catalog, &RepairConfig::default())
    }

    pub fn with_config(producer: P, catalog: BlockCatalog, config: &RepairConfig) -> Self {
        Self {
            producer,
            catalog,
            fixer: GraphFixer::new(config.fixer_settings()),
            max_patch_attempts: config.max_patch_attempts,
        }
    }

    pub fn producer(&self) -> &P {
        &self.producer
    }

    pub fn catalog(&self) -> &BlockCatalog {
        &self.catalog
    }

    /// Fix and validate a draft, asking the producer for a patch when
    /// violations remain.
    pub async fn repair(&self, draft: &GraphDocument) -> RepairOutcome {
        info!("Repairing graph {} ({} nodes)", draft.id, draft.nodes.len());
        let run = Run {
            kind: RequestKind::Repair,
            base: draft.clone(),
            graph: draft.clone(),
            instruction: String::new(),
            budget: self.max_patch_attempts,
            attempts: 0,
            report: ValidationReport::default(),
            applied: Vec::new(),
            cause: None,
            questions: Vec::new(),
        };
        self.drive(RepairState::Draft, run).await
    }

    /// Apply a change request to a valid graph. A failed patch or a failed
    /// validation is retried with the error appended to the request.
    pub async fn update(&self, graph: &GraphDocument, change_request: &str) -> RepairOutcome {
        info!("Updating graph {}: {}", graph.id, change_request);
        let run = Run {
            kind: RequestKind::Update,
            base: graph.clone(),
            graph: graph.clone(),
            instruction: change_request.to_string(),
            budget: self.max_patch_attempts + 1,
            attempts: 0,
            report: ValidationReport::default(),
            applied: Vec::new(),
            cause: None,
            questions: Vec::new(),
        };
        self.drive(RepairState::PatchRequested, run).await
    }

    async fn drive(&self, mut state: RepairState, mut run: Run) -> RepairOutcome {
        while !state.is_terminal() {
            let next = self.step(state, &mut run).await;
            debug!("{} -> {}", state, next);
            state = next;
        }

        match state {
            RepairState::Done => {
                info!(
                    "Graph {} valid after {} patch attempt(s), {} fixes",
                    run.graph.id,
                    run.attempts,
                    run.applied.len()
                );
                RepairOutcome::Repaired {
                    graph: run.graph,
                    applied: run.applied,
                    patch_attempts: run.attempts,
                }
            }
            RepairState::NeedsInput => RepairOutcome::NeedsInput {
                graph: run.graph,
                questions: run.questions,
            },
            _ => {
                warn!(
                    "Graph {} unresolved after {} patch attempt(s): {} violation(s)",
                    run.graph.id,
                    run.attempts,
                    run.report.len()
                );
                RepairOutcome::Unresolved {
                    graph: run.graph,
                    report: run.report,
                    cause: run.cause,
                }
            }
        }
    }

    async fn step(&self, state: RepairState, run: &mut Run) -> RepairState {
        match state {
            RepairState::Draft | RepairState::PatchApplied => {
                let outcome = self.fixer.fix(&run.graph, Some(&self.catalog));
                run.graph = outcome.graph;
                run.applied.extend(outcome.applied);
                RepairState::Fixed
            }
            RepairState::Fixed => {
                run.report = validate_graph(&run.graph, &self.catalog);
                RepairState::Validated
            }
            RepairState::Validated => {
                if run.report.is_ok() {
                    return RepairState::Done;
                }
                if run.attempts >= run.budget {
                    return RepairState::Failed;
                }
                warn!(
                    "Validation failed with {} violation(s), requesting patch",
                    run.report.len()
                );
                if run.kind == RequestKind::Update {
                    run.instruction = request::with_validation_feedback(&run.instruction, &run.report);
                }
                RepairState::PatchRequested
            }
            RepairState::PatchRequested => self.request_patch(run).await,
            terminal => terminal,
        }
    }

    async fn request_patch(&self, run: &mut Run) -> RepairState {
        run.attempts += 1;
        let instruction = match run.kind {
            RequestKind::Repair => request::fix_instruction(&run.report),
            RequestKind::Update => run.instruction.clone(),
        };
        if run.kind == RequestKind::Repair {
            run.base = run.graph.clone();
        }
        let request = PatchRequest::new(run.kind, instruction, &run.base, run.attempts);

        let patch = match self.producer.request_patch(&request).await {
            Ok(ProducerReply::Patch(patch)) => patch,
            Ok(ProducerReply::Clarification(clarification)) => {
                info!(
                    "Producer asked {} clarifying question(s)",
                    clarification.questions.len()
                );
                run.questions = clarification.questions;
                return RepairState::NeedsInput;
            }
            Err(e) => {
                warn!("Patch request {} failed: {:#}", run.attempts, e);
                run.cause = Some(format!("{:#}", e));
                return run.retry_or_fail();
            }
        };

        match apply_patch(&run.base, &patch) {
            Ok(graph) => {
                run.graph = graph;
                run.cause = None;
                RepairState::PatchApplied
            }
            Err(e) => {
                warn!("Patch {} could not be applied: {}", run.attempts, e);
                let error = e.to_string();
                if run.kind == RequestKind::Update {
                    run.instruction = request::with_patch_feedback(&run.instruction, &error);
                }
                run.cause = Some(error);
                run.retry_or_fail()
            }
        }
    }
}

impl Run {
    fn retry_or_fail(&self) -> RepairState {
        if self.attempts < self.budget {
            RepairState::PatchRequested
        } else {
            RepairState::Failed
        }
    }
}
