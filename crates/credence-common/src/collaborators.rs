//! Collaborator contracts consumed by the graph pipeline.
//!
//! The core only sees these traits; the concrete clients live in
//! credence-llm and credence-markets. Test suites substitute mocks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

// ── Data types ────────────────────────────────────────────────────────────────

/// A web-evidence snippet backing a verification verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceSource {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// The verifier's plausibility assessment for one claim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    /// Plausibility estimate in [0, 1].
    pub confidence: f32,
    pub rationale: String,
    #[serde(default)]
    pub evidence: Vec<EvidenceSource>,
}

/// Whether a market candidate is a series or a single market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateKind {
    Series,
    Market,
}

/// A ranked result from the prediction-market search API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketCandidate {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: CandidateKind,
    pub title: String,
    pub description: Option<String>,
    pub url: Option<String>,
}

impl MarketCandidate {
    /// The text fed to the embedder: title, or "title. description".
    pub fn embed_text(&self) -> String {
        match self.description.as_deref() {
            Some(d) if !d.is_empty() => format!("{}. {}", self.title, d),
            _ => self.title.clone(),
        }
    }
}

// ── Contracts ─────────────────────────────────────────────────────────────────

/// Produces an embedding vector for a text. Implementations memoize per
/// distinct text within a build and retry transient failures internally;
/// an error here means retries were exhausted.
#[async_trait]
pub trait TextEmbedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Generates independent sets of derivative-claim strings for a worldview.
///
/// `num_sets` must be in [3, 5]. Each returned set holds 6–15 validated
/// claims (12–220 chars, whitespace-normalized, deduped case-insensitive).
/// Partial failure across sets is tolerated; fewer than 2 surviving sets is
/// a validation error.
#[async_trait]
pub trait DerivativeGenerator: Send + Sync {
    async fn generate_sets(&self, worldview: &str, num_sets: usize) -> Result<Vec<Vec<String>>>;
}

/// Verifies a single claim against web evidence.
#[async_trait]
pub trait ClaimVerifier: Send + Sync {
    async fn verify(&self, claim: &str) -> Result<VerificationResult>;
}

/// Searches the prediction-market catalogue. An empty result is valid.
#[async_trait]
pub trait MarketSearcher: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<MarketCandidate>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embed_text_title_only() {
        let c = MarketCandidate {
            id: "series:FED".to_string(),
            kind: CandidateKind::Series,
            title: "Fed rate decisions".to_string(),
            description: None,
            url: None,
        };
        assert_eq!(c.embed_text(), "Fed rate decisions");
    }

    #[test]
    fn test_embed_text_joins_description() {
        let c = MarketCandidate {
            id: "market:FED-25SEP".to_string(),
            kind: CandidateKind::Market,
            title: "Fed cuts in September".to_string(),
            description: Some("25bps or more at the September meeting".to_string()),
            url: None,
        };
        assert_eq!(
            c.embed_text(),
            "Fed cuts in September. 25bps or more at the September meeting"
        );
    }

    #[test]
    fn test_candidate_kind_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&CandidateKind::Series).unwrap(),
            "\"series\""
        );
        assert_eq!(
            serde_json::to_string(&CandidateKind::Market).unwrap(),
            "\"market\""
        );
    }
}
