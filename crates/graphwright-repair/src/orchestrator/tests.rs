use super::*;
use anyhow::anyhow;
use graphwright_core::ident::new_id;
use graphwright_core::{Link, Node, ViolationKind};
use serde_json::{Value, json};
use std::sync::Mutex;

// ── Test helpers ────────────────────────────────────────────────

const EMAIL: &str = "email-block";
const TEXT: &str = "text-block";

enum Scripted {
    Reply(Value),
    Fail(&'static str),
}

/// Mock producer that plays back a fixed sequence of replies.
struct MockProducer {
    replies: Mutex<Vec<Scripted>>,
    requests: Mutex<Vec<PatchRequest>>,
}

impl MockProducer {
    fn new(replies: Vec<Scripted>) -> Self {
        Self {
            replies: Mutex::new(replies),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn replying(values: Vec<Value>) -> Self {
        Self::new(values.into_iter().map(Scripted::Reply).collect())
    }

    fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn request(&self, index: usize) -> PatchRequest {
        self.requests.lock().unwrap()[index].clone()
    }
}

impl PatchProducer for MockProducer {
    async fn request_patch(&self, request: &PatchRequest) -> anyhow::Result<ProducerReply> {
        self.requests.lock().unwrap().push(request.clone());
        let next = {
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                None
            } else {
                Some(replies.remove(0))
            }
        };
        match next {
            Some(Scripted::Reply(value)) => Ok(ProducerReply::from_value(value)?),
            Some(Scripted::Fail(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("no scripted reply left")),
        }
    }
}

fn catalog() -> BlockCatalog {
    BlockCatalog::from_json(json!([
        {
            "id": EMAIL,
            "name": "SendEmailBlock",
            "inputSchema": {
                "properties": {"to": {"type": "string"}, "body": {"type": "string"}},
                "required": ["to"]
            },
            "outputSchema": {"properties": {"status": {"type": "string"}}}
        },
        {
            "id": TEXT,
            "name": "TextBlock",
            "inputSchema": {"properties": {"text": {"type": "string"}}},
            "outputSchema": {"properties": {"output": {"type": "string"}}}
        }
    ]))
    .unwrap()
}

fn orchestrator(producer: MockProducer) -> RepairOrchestrator<MockProducer> {
    RepairOrchestrator::new(producer, catalog())
}

/// A text node feeding an email node's body; `to` is left to the caller.
fn draft(email_defaults: Value) -> (GraphDocument, String) {
    let text = Node::new(new_id(), TEXT);
    let email = Node::new(new_id(), EMAIL).with_defaults(email_defaults);
    let email_id = email.id.clone();
    let mut graph = GraphDocument::new("Notify");
    graph.add_link(Link::new(new_id(), &text.id, "output", &email.id, "body"));
    graph.add_node(text);
    graph.add_node(email);
    (graph, email_id)
}

fn set_recipient(node_id: &str) -> Value {
    json!({
        "intent": "add recipient",
        "patches": [{
            "type": "modify",
            "node_id": node_id,
            "changes": {"input_default": {"to": "ops@example.com"}}
        }]
    })
}

// ── Repair ──────────────────────────────────────────────────────

#[tokio::test]
async fn valid_draft_needs_no_producer() {
    let (graph, _) = draft(json!({"to": "a@b.c"}));
    let orch = orchestrator(MockProducer::replying(vec![]));

    let outcome = orch.repair(&graph).await;

    let RepairOutcome::Repaired { patch_attempts, .. } = outcome else {
        panic!("expected repaired, got {outcome:?}");
    };
    assert_eq!(patch_attempts, 0);
    assert_eq!(orch.producer().call_count(), 0);
}

#[tokio::test]
async fn fixer_alone_can_repair_a_draft() {
    let (mut graph, email_id) = draft(json!({"to": "a@b.c"}));
    graph.nodes[1].id = "node-1".to_string();
    for link in &mut graph.links {
        if link.sink_id == email_id {
            link.sink_id = "node-1".to_string();
        }
    }
    let orch = orchestrator(MockProducer::replying(vec![]));

    let outcome = orch.repair(&graph).await;

    let RepairOutcome::Repaired { graph: fixed, applied, .. } = outcome else {
        panic!("expected repaired, got {outcome:?}");
    };
    assert!(applied.iter().any(|f| f.rule == "identifiers"));
    assert!(fixed.links.iter().all(|l| l.sink_id != "node-1"));
    assert_eq!(orch.producer().call_count(), 0);
}

#[tokio::test]
async fn one_patch_round_resolves_violations() {
    let (graph, email_id) = draft(json!({}));
    let orch = orchestrator(MockProducer::replying(vec![set_recipient(&email_id)]));

    let outcome = orch.repair(&graph).await;

    let RepairOutcome::Repaired { graph: fixed, patch_attempts, .. } = outcome else {
        panic!("expected repaired, got {outcome:?}");
    };
    assert_eq!(patch_attempts, 1);
    assert_eq!(
        fixed.find_node(&email_id).unwrap().input_default["to"],
        json!("ops@example.com")
    );

    let request = orch.producer().request(0);
    assert_eq!(request.kind, RequestKind::Repair);
    assert_eq!(request.attempt, 1);
    assert!(request.instruction.contains("missing required input 'to'"));
    assert_eq!(request.summary.nodes.len(), 2);
}

#[tokio::test]
async fn unresolved_after_single_retry() {
    let (graph, _) = draft(json!({}));
    let useless = json!({"patches": [{"type": "modify", "node_id": "nobody", "changes": {}}]});
    let orch = orchestrator(MockProducer::replying(vec![useless.clone(), useless]));

    let outcome = orch.repair(&graph).await;

    let RepairOutcome::Unresolved { report, cause, .. } = outcome else {
        panic!("expected unresolved, got {outcome:?}");
    };
    assert_eq!(report.of_kind(ViolationKind::MissingRequiredInput).count(), 1);
    assert!(cause.is_none());
    assert_eq!(orch.producer().call_count(), 1);
}

#[tokio::test]
async fn clarification_short_circuits() {
    let (graph, _) = draft(json!({}));
    let orch = orchestrator(MockProducer::replying(vec![json!({
        "type": "clarifying_questions",
        "questions": [{"question": "Who should receive the email?", "keyword": "recipient"}]
    })]));

    let outcome = orch.repair(&graph).await;

    let RepairOutcome::NeedsInput { questions, .. } = &outcome else {
        panic!("expected needs input, got {outcome:?}");
    };
    assert_eq!(questions.len(), 1);
    assert_eq!(questions[0].keyword, "recipient");
    assert!(!outcome.is_repaired());
}

#[tokio::test]
async fn producer_failure_is_reported_with_last_report() {
    let (graph, _) = draft(json!({}));
    let orch = orchestrator(MockProducer::new(vec![Scripted::Fail("connection reset")]));

    let outcome = orch.repair(&graph).await;

    let RepairOutcome::Unresolved { report, cause, .. } = outcome else {
        panic!("expected unresolved, got {outcome:?}");
    };
    assert_eq!(report.len(), 1);
    assert_eq!(cause.as_deref(), Some("connection reset"));
}

#[tokio::test]
async fn inapplicable_patch_leaves_candidate_untouched() {
    let (graph, _) = draft(json!({}));
    let orch = orchestrator(MockProducer::replying(vec![json!({
        "patches": [{"type": "replace", "node_id": "ghost", "new_node": {"block_id": TEXT}}]
    })]));

    let outcome = orch.repair(&graph).await;

    let RepairOutcome::Unresolved { graph: candidate, cause, .. } = outcome else {
        panic!("expected unresolved, got {outcome:?}");
    };
    assert!(cause.unwrap().contains("ghost"));
    assert_eq!(candidate.nodes.len(), graph.nodes.len());
    assert!(candidate.find_node("ghost").is_none());
}

#[tokio::test]
async fn zero_patch_budget_never_calls_producer() {
    let (graph, _) = draft(json!({}));
    let config = RepairConfig {
        max_patch_attempts: 0,
        ..Default::default()
    };
    let orch = RepairOrchestrator::with_config(MockProducer::replying(vec![]), catalog(), &config);

    let outcome = orch.repair(&graph).await;

    assert!(matches!(outcome, RepairOutcome::Unresolved { .. }));
    assert_eq!(orch.producer().call_count(), 0);
}

// ── Update ──────────────────────────────────────────────────────

fn add_email(defaults: Value) -> Value {
    json!({
        "intent": "add a second notification",
        "patches": [{
            "type": "add",
            "new_nodes": [{
                "id": new_id(),
                "block_id": EMAIL,
                "input_default": defaults,
                "graph_id": "inherit",
                "graph_version": "inherit"
            }]
        }]
    })
}

#[tokio::test]
async fn update_applies_change_request() {
    let (graph, _) = draft(json!({"to": "a@b.c"}));
    let orch = orchestrator(MockProducer::replying(vec![add_email(json!({"to": "b@c.d"}))]));

    let outcome = orch.update(&graph, "Also notify b@c.d").await;

    let RepairOutcome::Repaired { graph: updated, patch_attempts, .. } = outcome else {
        panic!("expected repaired, got {outcome:?}");
    };
    assert_eq!(patch_attempts, 1);
    assert_eq!(updated.nodes.len(), 3);
    assert_eq!(updated.nodes[2].graph_id.as_deref(), Some(graph.id.as_str()));

    let request = orch.producer().request(0);
    assert_eq!(request.kind, RequestKind::Update);
    assert_eq!(request.instruction, "Also notify b@c.d");
}

#[tokio::test]
async fn update_retries_once_with_validation_feedback() {
    let (graph, _) = draft(json!({"to": "a@b.c"}));
    let orch = orchestrator(MockProducer::replying(vec![
        add_email(json!({})),
        add_email(json!({"to": "b@c.d"})),
    ]));

    let outcome = orch.update(&graph, "Also notify b@c.d").await;

    let RepairOutcome::Repaired { graph: updated, patch_attempts, .. } = outcome else {
        panic!("expected repaired, got {outcome:?}");
    };
    assert_eq!(patch_attempts, 2);
    // The retry patches the caller's graph, not the rejected candidate.
    assert_eq!(updated.nodes.len(), 3);

    let retry = orch.producer().request(1);
    assert!(retry.instruction.starts_with("Also notify b@c.d"));
    assert!(retry.instruction.contains("Validation Error from Previous Attempt"));
    assert_eq!(retry.graph, graph);
}

#[tokio::test]
async fn update_gives_up_after_two_failed_patches() {
    let (graph, _) = draft(json!({"to": "a@b.c"}));
    let broken = json!({
        "patches": [{"type": "replace", "node_id": "ghost", "new_node": {"block_id": TEXT}}]
    });
    let orch = orchestrator(MockProducer::replying(vec![broken.clone(), broken]));

    let outcome = orch.update(&graph, "Swap the formatter").await;

    let RepairOutcome::Unresolved { graph: unchanged, cause, .. } = outcome else {
        panic!("expected unresolved, got {outcome:?}");
    };
    assert_eq!(unchanged, graph);
    assert_eq!(cause.as_deref(), Some("node ghost not found"));
    assert_eq!(orch.producer().call_count(), 2);
    assert!(
        orch.producer()
            .request(1)
            .instruction
            .contains("Previous attempt failed with error: node ghost not found")
    );
}

#[tokio::test]
async fn update_clarification_returns_original_graph() {
    let (graph, _) = draft(json!({"to": "a@b.c"}));
    let orch = orchestrator(MockProducer::replying(vec![json!({
        "type": "clarifying_questions",
        "questions": [{"question": "Which address?"}]
    })]));

    let outcome = orch.update(&graph, "Notify someone else").await;

    assert!(matches!(&outcome, RepairOutcome::NeedsInput { questions, .. } if questions.len() == 1));
    assert_eq!(outcome.graph(), &graph);
}
