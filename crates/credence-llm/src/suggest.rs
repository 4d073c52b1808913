//! Market-alignment suggestions: given the worldview and a set of market
//! nodes, classify whether the worldview implies each market resolves
//! YES, NO, or is unrelated.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use credence_common::retry::{with_retries, RetryPolicy};
use credence_common::Result;

use crate::backend::{ChatRequest, LlmBackend, Message};

const MAX_RATIONALE_CHARS: usize = 500;

const SUGGESTION_INSTRUCTIONS: &str = r#"You are a careful, neutral financial analyst.
Given a worldview and a market title, classify the directional alignment:
- YES: If the worldview implies the market is more likely to resolve YES
- NO: If the worldview implies the market is less likely to resolve YES
- SKIP: If unclear, ambiguous, or unrelated

Return strict JSON with:
{
  "suggestions": [
    { "nodeId": "<id>", "action": "YES|NO|SKIP", "confidence": <0..1>, "rationale": "<short>" }
  ]
}
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SuggestionAction {
    Yes,
    No,
    Skip,
}

/// Compact node payload handed to the classifier.
#[derive(Debug, Clone, Serialize)]
pub struct SuggestItem {
    #[serde(rename = "nodeId")]
    pub node_id: String,
    pub title: String,
    pub similarity: f32,
}

/// A classification before the caller joins node URLs onto it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSuggestion {
    #[serde(rename = "nodeId")]
    pub node_id: String,
    pub action: SuggestionAction,
    pub confidence: f32,
    pub rationale: String,
}

pub struct SuggestionClient {
    backend: Arc<dyn LlmBackend>,
}

impl SuggestionClient {
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self { backend }
    }

    /// Classify every item; malformed entries in the model output are
    /// skipped rather than failing the batch.
    pub async fn classify(
        &self,
        worldview: &str,
        items: &[SuggestItem],
    ) -> Result<Vec<RawSuggestion>> {
        let payload = serde_json::json!({
            "worldview": worldview,
            "markets":   items,
        });
        let content = with_retries(RetryPolicy::generation(), "suggestion classify", || {
            let payload = payload.clone();
            async move {
                let resp = self
                    .backend
                    .complete(ChatRequest {
                        messages: vec![
                            Message::system(SUGGESTION_INSTRUCTIONS),
                            Message::user(payload.to_string()),
                        ],
                        temperature: Some(0.2),
                        max_tokens: None,
                        response_format: Some(serde_json::json!({"type": "json_object"})),
                    })
                    .await?;
                Ok(resp.content)
            }
        })
        .await?;

        Ok(parse_suggestions(&content))
    }
}

fn parse_suggestions(content: &str) -> Vec<RawSuggestion> {
    let Ok(data) = serde_json::from_str::<serde_json::Value>(content) else {
        return vec![];
    };
    data["suggestions"]
        .as_array()
        .map(|raw| {
            raw.iter()
                .filter_map(|item| {
                    let mut s: RawSuggestion = serde_json::from_value(item.clone()).ok()?;
                    s.confidence = s.confidence.clamp(0.0, 1.0);
                    s.rationale.truncate(
                        s.rationale
                            .char_indices()
                            .nth(MAX_RATIONALE_CHARS)
                            .map(|(i, _)| i)
                            .unwrap_or(s.rationale.len()),
                    );
                    Some(s)
                })
                .collect()
        })
        .unwrap_or_default()
}
