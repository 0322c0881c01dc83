use graphwright_core::{PatchError, PatchIntent};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::PatchRequest;

/// Discriminator value marking a reply as questions rather than a patch.
pub const CLARIFYING_QUESTIONS: &str = "clarifying_questions";

/// External collaborator that turns a request (violation report or update
/// instruction, plus the current graph) into a patch or a set of questions.
///
/// Timeouts and transport retries are the implementation's business.
pub trait PatchProducer {
    async fn request_patch(&self, request: &PatchRequest) -> anyhow::Result<ProducerReply>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProducerReply {
    Patch(PatchIntent),
    Clarification(ClarificationRequest),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClarificationRequest {
    #[serde(default)]
    pub questions: Vec<ClarifyingQuestion>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClarifyingQuestion {
    pub question: String,
    #[serde(default)]
    pub keyword: String,
    #[serde(default)]
    pub example: String,
}

impl ProducerReply {
    /// Resolve a wire reply. `{"type": "clarifying_questions", ...}` is a
    /// clarification; anything else must be a patch document.
    pub fn from_value(value: Value) -> Result<Self, PatchError> {
        if value.get("type").and_then(Value::as_str) == Some(CLARIFYING_QUESTIONS) {
            return serde_json::from_value(value)
                .map(ProducerReply::Clarification)
                .map_err(|e| PatchError::Malformed(e.to_string()));
        }
        PatchIntent::from_value(value).map(ProducerReply::Patch)
    }

    /// Parse raw model text, tolerating markdown fences around the JSON.
    pub fn from_text(text: &str) -> Result<Self, PatchError> {
        let value: Value = serde_json::from_str(extract_json(text))
            .map_err(|e| PatchError::Malformed(e.to_string()))?;
        Self::from_value(value)
    }
}

/// Extract JSON from text that may be wrapped in markdown code fences or
/// surrounded by prose.
pub fn extract_json(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(start) = trimmed.find("```json") {
        let after_fence = &trimmed[start + 7..];
        if let Some(end) = after_fence.find("```") {
            return after_fence[..end].trim();
        }
    }
    if let Some(start) = trimmed.find("```") {
        let after_fence = &trimmed[start + 3..];
        if let Some(end) = after_fence.find("```") {
            return after_fence[..end].trim();
        }
    }
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if end > start => &trimmed[start..=end],
        _ => trimmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphwright_core::PatchOp;
    use serde_json::json;

    #[test]
    fn clarification_is_recognized_by_type() {
        let reply = ProducerReply::from_value(json!({
            "type": "clarifying_questions",
            "questions": [
                {"question": "Which inbox?", "keyword": "inbox", "example": "support@"},
                {"question": "How often?"}
            ]
        }))
        .unwrap();

        let ProducerReply::Clarification(request) = reply else {
            panic!("expected clarification");
        };
        assert_eq!(request.questions.len(), 2);
        assert_eq!(request.questions[0].keyword, "inbox");
        assert_eq!(request.questions[1].example, "");
    }

    #[test]
    fn patch_reply_parses_operations() {
        let reply = ProducerReply::from_value(json!({
            "intent": "drop the logger",
            "patches": [{"type": "delete", "node_ids": ["n1"]}]
        }))
        .unwrap();

        let ProducerReply::Patch(patch) = reply else {
            panic!("expected patch");
        };
        assert_eq!(patch.intent, "drop the logger");
        assert!(matches!(&patch.operations[0], PatchOp::Delete { node_ids, .. } if node_ids == &["n1"]));
    }

    #[test]
    fn unknown_shapes_are_malformed() {
        assert!(matches!(
            ProducerReply::from_value(json!({"steps": []})),
            Err(PatchError::Malformed(_))
        ));
    }

    #[test]
    fn extracts_fenced_and_embedded_json() {
        assert_eq!(extract_json("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(extract_json("```\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(extract_json("Here you go: {\"a\": 1} done"), "{\"a\": 1}");
        assert_eq!(extract_json("  {\"a\": 1}  "), "{\"a\": 1}");

        let reply = ProducerReply::from_text(
            "Sure.\n```json\n{\"patches\": [{\"type\": \"modify\", \"node_id\": \"x\", \"changes\": {}}]}\n```",
        )
        .unwrap();
        assert!(matches!(reply, ProducerReply::Patch(_)));
    }
}
