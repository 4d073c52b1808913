//! Claim verification: an LLM fact-checker with a web-search tool loop.
//!
//! The agent may search several times with different queries before
//! committing to a confidence score; every source it sees is collected and
//! attached (capped) to the final result.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use credence_common::retry::{with_retries, RetryPolicy};
use credence_common::{ClaimVerifier, CredenceError, EvidenceSource, Result, VerificationResult};

use crate::evidence::EvidenceSearchClient;

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
/// Hard stop on the search loop.
const MAX_TOOL_ITERATIONS: usize = 5;
/// At most this many evidence sources survive onto the result.
const MAX_EVIDENCE_SOURCES: usize = 10;
const DEFAULT_SEARCH_RESULTS: usize = 5;
const MAX_SEARCH_RESULTS: usize = 10;

const VERIFICATION_SYSTEM_PROMPT: &str = r#"You are a rigorous fact-checker with access to web search.

Your task is to verify the plausibility of claims using evidence from the internet.

When given a claim:
1. Use the search_evidence tool to find relevant evidence
2. You may search multiple times with different queries if needed
3. Evaluate the evidence to determine if the claim is plausible
4. Provide a confidence score (0-1) based on the strength of evidence
5. Write a brief rationale (2-3 sentences) explaining your assessment

Confidence scoring:
- 0.8-1.0: Strong evidence supports the claim
- 0.6-0.8: Moderate evidence, claim is plausible
- 0.4-0.6: Mixed or weak evidence
- 0.2-0.4: Evidence suggests claim is unlikely
- 0.0-0.2: Strong evidence against the claim

Be objective and cite specific sources in your rationale."#;

pub struct VerificationAgent {
    api_key: String,
    model: String,
    client: reqwest::Client,
    evidence: EvidenceSearchClient,
}

#[derive(Debug, Deserialize)]
struct Assessment {
    confidence: f32,
    rationale: String,
}

impl VerificationAgent {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        evidence: EvidenceSearchClient,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            client: reqwest::Client::new(),
            evidence,
        }
    }

    fn search_tool_definition() -> serde_json::Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": "search_evidence",
                "description": "Search the internet to find relevant articles and information about a topic. Returns articles with titles, URLs, and content snippets.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "The search query to find relevant information",
                        },
                        "num_results": {
                            "type": "integer",
                            "description": "Number of results to return (default 5, max 10)",
                        },
                    },
                    "required": ["query"],
                },
            },
        })
    }

    fn format_sources(sources: &[EvidenceSource]) -> String {
        if sources.is_empty() {
            return "No results found.".to_string();
        }
        sources
            .iter()
            .enumerate()
            .map(|(i, s)| {
                format!(
                    "{}. {}\n   URL: {}\n   Snippet: {}\n",
                    i + 1,
                    s.title,
                    s.url,
                    s.snippet
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    async fn chat(&self, body: &serde_json::Value) -> Result<serde_json::Value> {
        let resp = self
            .client
            .post(OPENAI_CHAT_URL)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;
        let status = resp.status().as_u16();
        let json: serde_json::Value = resp.json().await?;
        if status >= 400 {
            let msg = json["error"]["message"].as_str().unwrap_or("unknown API error");
            return Err(CredenceError::Upstream(format!(
                "verification API error [{status}]: {msg}"
            )));
        }
        Ok(json)
    }

    async fn verify_once(&self, claim: &str) -> Result<VerificationResult> {
        info!(claim = %truncate(claim, 100), "verifying claim");

        let mut messages = vec![
            serde_json::json!({"role": "system", "content": VERIFICATION_SYSTEM_PROMPT}),
            serde_json::json!({
                "role": "user",
                "content": format!("Please verify this claim and provide your assessment:\n\n{claim}"),
            }),
        ];
        let tools = serde_json::json!([Self::search_tool_definition()]);
        let mut all_sources: Vec<EvidenceSource> = Vec::new();

        for iteration in 0..MAX_TOOL_ITERATIONS {
            debug!(iteration = iteration + 1, "verification loop");
            let json = self
                .chat(&serde_json::json!({
                    "model":       &self.model,
                    "messages":    &messages,
                    "tools":       &tools,
                    "temperature": 0.2,
                }))
                .await?;

            let assistant = json["choices"][0]["message"].clone();
            let tool_calls = assistant["tool_calls"].as_array().cloned();
            messages.push(assistant);

            let Some(tool_calls) = tool_calls else {
                debug!("assistant finished reasoning (no more tool calls)");
                break;
            };

            for call in &tool_calls {
                if call["function"]["name"] != "search_evidence" {
                    continue;
                }
                let args: serde_json::Value =
                    serde_json::from_str(call["function"]["arguments"].as_str().unwrap_or("{}"))?;
                let query = args["query"].as_str().unwrap_or("").to_string();
                let num_results = args["num_results"]
                    .as_u64()
                    .map(|n| (n as usize).min(MAX_SEARCH_RESULTS))
                    .unwrap_or(DEFAULT_SEARCH_RESULTS);

                let sources = self.evidence.search_and_contents(&query, num_results).await?;
                let formatted = Self::format_sources(&sources);
                all_sources.extend(sources);

                messages.push(serde_json::json!({
                    "role":         "tool",
                    "tool_call_id": call["id"],
                    "content":      formatted,
                }));
            }
        }

        // Final structured assessment over everything seen so far.
        debug!("requesting structured final assessment");
        messages.push(serde_json::json!({
            "role": "user",
            "content": "Based on your search results and analysis, provide your final verification assessment with confidence score and rationale.",
        }));
        let json = self
            .chat(&serde_json::json!({
                "model":       &self.model,
                "messages":    &messages,
                "temperature": 0.1,
                "response_format": {
                    "type": "json_schema",
                    "json_schema": {
                        "name": "verification_response",
                        "strict": true,
                        "schema": {
                            "type": "object",
                            "properties": {
                                "confidence": {"type": "number"},
                                "rationale":  {"type": "string"},
                            },
                            "required": ["confidence", "rationale"],
                            "additionalProperties": false,
                        },
                    },
                },
            }))
            .await?;

        let content = json["choices"][0]["message"]["content"].as_str().unwrap_or("");
        let assessment: Assessment = serde_json::from_str(content)?;
        info!(confidence = assessment.confidence, "verification complete");

        all_sources.truncate(MAX_EVIDENCE_SOURCES);
        Ok(VerificationResult {
            confidence: assessment.confidence.clamp(0.0, 1.0),
            rationale: assessment.rationale,
            evidence: all_sources,
        })
    }
}

#[async_trait]
impl ClaimVerifier for VerificationAgent {
    async fn verify(&self, claim: &str) -> Result<VerificationResult> {
        with_retries(RetryPolicy::generation(), "claim verification", || {
            self.verify_once(claim)
        })
        .await
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_sources_empty() {
        assert_eq!(VerificationAgent::format_sources(&[]), "No results found.");
    }

    #[test]
    fn test_format_sources_numbers_entries() {
        let sources = vec![
            EvidenceSource {
                title: "A".to_string(),
                url: "https://a".to_string(),
                snippet: "sa".to_string(),
            },
            EvidenceSource {
                title: "B".to_string(),
                url: "https://b".to_string(),
                snippet: "sb".to_string(),
            },
        ];
        let text = VerificationAgent::format_sources(&sources);
        assert!(text.starts_with("1. A"));
        assert!(text.contains("2. B"));
        assert!(text.contains("URL: https://b"));
    }

    #[test]
    fn test_assessment_parses_structured_output() {
        let a: Assessment =
            serde_json::from_str(r#"{"confidence": 0.72, "rationale": "plausible"}"#).unwrap();
        assert!((a.confidence - 0.72).abs() < 1e-6);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("abcdef", 3), "abc");
        assert_eq!(truncate("ab", 3), "ab");
        assert_eq!(truncate("ééé", 2), "éé");
    }
}
