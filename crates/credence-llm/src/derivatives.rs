//! Derivative-claim generation.
//!
//! One generation call yields one set of 6–15 validated derivative beliefs;
//! the pipeline asks for several independent sets (self-consistency) and
//! tolerates partial failure as long as at least two survive.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use tracing::warn;

use credence_common::retry::{with_retries, RetryPolicy};
use credence_common::{CredenceError, DerivativeGenerator, Result};

use crate::backend::{ChatRequest, LlmBackend, Message};

const MIN_CLAIM_CHARS: usize = 12;
const MAX_CLAIM_CHARS: usize = 220;
const MIN_SET_LEN: usize = 6;
const MAX_SET_LEN: usize = 15;
const MIN_SETS: usize = 3;
const MAX_SETS: usize = 5;
const MIN_VALID_SETS: usize = 2;

const DERIVATIVE_PROMPT: &str = r#"You are a contrarian-but-rigorous thesis exploder.

Given ONE user belief, produce a diverse set of derivative beliefs that could be true if the core belief is true (or that would become more/less likely if it is).

Cover multiple axes: technology milestones, regulation, macro, capital flows, consumer adoption, supply chain, geopolitics, competitive dynamics, and measurable milestones.

Return 6-15 concise derivative beliefs.

Each belief must be:
- Independent and falsifiable (has a measurable claim or milestone).
- Time-bounded when possible.
- Framed in neutral language (no hype).
- Varied in granularity (firm-level, sector-level, policy-level, macro-level).

Output as a JSON array of strings. No commentary.

The thesis to explore is: "{WORLDVIEW}"
"#;

pub struct DerivativesClient {
    backend: Arc<dyn LlmBackend>,
}

impl DerivativesClient {
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self { backend }
    }

    /// Generate and validate one derivative set.
    pub async fn generate(&self, worldview: &str) -> Result<Vec<String>> {
        let prompt = DERIVATIVE_PROMPT.replace("{WORLDVIEW}", worldview.trim());
        let content = with_retries(RetryPolicy::generation(), "derivative generation", || {
            let prompt = prompt.clone();
            async move {
                let resp = self
                    .backend
                    .complete(ChatRequest {
                        messages: vec![
                            Message::system("You ONLY reply with valid JSON. No commentary."),
                            Message::user(prompt),
                        ],
                        temperature: Some(0.4),
                        max_tokens: None,
                        response_format: Some(serde_json::json!({"type": "json_object"})),
                    })
                    .await?;
                Ok(resp.content)
            }
        })
        .await?;

        let items = parse_json_array(&content)?;
        validate_set(items)
    }
}

#[async_trait]
impl DerivativeGenerator for DerivativesClient {
    /// Fan out `num_sets` independent generations; per-set failure is
    /// tolerated, fewer than two surviving sets is fatal.
    async fn generate_sets(&self, worldview: &str, num_sets: usize) -> Result<Vec<Vec<String>>> {
        if !(MIN_SETS..=MAX_SETS).contains(&num_sets) {
            return Err(CredenceError::Validation(format!(
                "num_sets must be in [{MIN_SETS}, {MAX_SETS}], got {num_sets}"
            )));
        }

        let results = join_all((0..num_sets).map(|_| self.generate(worldview))).await;
        let mut sets = Vec::with_capacity(num_sets);
        for result in results {
            match result {
                Ok(set) => sets.push(set),
                Err(e) => warn!("derivative set generation failed: {e}"),
            }
        }
        if sets.len() < MIN_VALID_SETS {
            return Err(CredenceError::Validation(format!(
                "only {} of {num_sets} derivative sets succeeded (need {MIN_VALID_SETS})",
                sets.len()
            )));
        }
        Ok(sets)
    }
}

/// Accepts a bare JSON array of strings or `{"derivatives": [...]}`.
fn parse_json_array(text: &str) -> Result<Vec<String>> {
    let parsed: serde_json::Value = serde_json::from_str(text)?;
    let items = match &parsed {
        serde_json::Value::Array(items) => items.clone(),
        serde_json::Value::Object(map) => match map.get("derivatives") {
            Some(serde_json::Value::Array(items)) => items.clone(),
            _ => {
                return Err(CredenceError::Validation(
                    "unexpected JSON shape for derivatives".to_string(),
                ))
            }
        },
        _ => {
            return Err(CredenceError::Validation(
                "unexpected JSON shape for derivatives".to_string(),
            ))
        }
    };
    Ok(items
        .iter()
        .map(|v| match v {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect())
}

/// Whitespace-normalize, enforce per-claim length bounds, dedupe
/// case-insensitively, and require 6–15 survivors.
fn validate_set(items: Vec<String>) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for item in items {
        let cleaned = item.split_whitespace().collect::<Vec<_>>().join(" ");
        if !(MIN_CLAIM_CHARS..=MAX_CLAIM_CHARS).contains(&cleaned.len()) {
            continue;
        }
        if seen.insert(cleaned.to_lowercase()) {
            out.push(cleaned);
        }
    }
    if !(MIN_SET_LEN..=MAX_SET_LEN).contains(&out.len()) {
        return Err(CredenceError::Validation(format!(
            "derivative beliefs must be {MIN_SET_LEN}-{MAX_SET_LEN} items after validation, got {}",
            out.len()
        )));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(n: usize) -> Vec<String> {
        (0..n)
            .map(|i| format!("derivative claim number {i} holds"))
            .collect()
    }

    #[test]
    fn test_validate_accepts_clean_set() {
        let out = validate_set(claims(8)).unwrap();
        assert_eq!(out.len(), 8);
    }

    #[test]
    fn test_validate_normalizes_whitespace() {
        let mut items = claims(6);
        items[0] = "  spaced   out  derivative  claim ".to_string();
        let out = validate_set(items).unwrap();
        assert_eq!(out[0], "spaced out derivative claim");
    }

    #[test]
    fn test_validate_drops_out_of_bounds_lengths() {
        let mut items = claims(7);
        items.push("too short".to_string());
        items.push("x".repeat(221));
        let out = validate_set(items).unwrap();
        assert_eq!(out.len(), 7);
    }

    #[test]
    fn test_validate_dedupes_case_insensitively() {
        let mut items = claims(6);
        items.push(items[0].to_uppercase());
        let out = validate_set(items).unwrap();
        assert_eq!(out.len(), 6);
    }

    #[test]
    fn test_validate_rejects_too_few_survivors() {
        let err = validate_set(claims(5)).unwrap_err();
        assert!(matches!(err, CredenceError::Validation(_)));
    }

    #[test]
    fn test_validate_rejects_too_many_survivors() {
        let err = validate_set(claims(16)).unwrap_err();
        assert!(matches!(err, CredenceError::Validation(_)));
    }

    #[test]
    fn test_parse_bare_array() {
        let out = parse_json_array(r#"["a", "b"]"#).unwrap();
        assert_eq!(out, vec!["a", "b"]);
    }

    #[test]
    fn test_parse_derivatives_object() {
        let out = parse_json_array(r#"{"derivatives": ["a", "b"]}"#).unwrap();
        assert_eq!(out, vec!["a", "b"]);
    }

    #[test]
    fn test_parse_rejects_other_shapes() {
        assert!(parse_json_array(r#"{"claims": []}"#).is_err());
        assert!(parse_json_array(r#""just a string""#).is_err());
    }
}
