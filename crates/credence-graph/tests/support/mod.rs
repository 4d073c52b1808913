//! Mock collaborators for graph pipeline tests.

// Not every test binary exercises every mock.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;

use credence_common::{
    CandidateKind, ClaimVerifier, CredenceError, DerivativeGenerator, MarketCandidate,
    MarketSearcher, Result, TextEmbedder, VerificationResult,
};

/// Embedder backed by a fixed text → vector table.
#[derive(Default)]
pub struct StaticEmbedder {
    vectors: HashMap<String, Vec<f32>>,
    failing: HashSet<String>,
}

impl StaticEmbedder {
    pub fn new(entries: &[(&str, &[f32])]) -> Self {
        let vectors = entries
            .iter()
            .map(|(text, vec)| (text.to_string(), vec.to_vec()))
            .collect();
        Self { vectors, failing: HashSet::new() }
    }

    pub fn failing_for(mut self, text: &str) -> Self {
        self.failing.insert(text.to_string());
        self
    }
}

#[async_trait]
impl TextEmbedder for StaticEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.failing.contains(text) {
            return Err(CredenceError::Upstream(format!(
                "embedding unavailable for {text:?}"
            )));
        }
        self.vectors
            .get(text)
            .cloned()
            .ok_or_else(|| CredenceError::Upstream(format!("no vector for {text:?}")))
    }
}

/// Generator returning pre-baked derivative sets.
pub struct FixedGenerator {
    sets: Vec<Vec<String>>,
}

impl FixedGenerator {
    pub fn new(sets: &[&[&str]]) -> Self {
        let sets = sets
            .iter()
            .map(|set| set.iter().map(|s| s.to_string()).collect())
            .collect();
        Self { sets }
    }
}

#[async_trait]
impl DerivativeGenerator for FixedGenerator {
    async fn generate_sets(&self, _worldview: &str, _num_sets: usize) -> Result<Vec<Vec<String>>> {
        Ok(self.sets.clone())
    }
}

/// Generator that always fails validation.
pub struct FailingGenerator;

#[async_trait]
impl DerivativeGenerator for FailingGenerator {
    async fn generate_sets(&self, _worldview: &str, _num_sets: usize) -> Result<Vec<Vec<String>>> {
        Err(CredenceError::Validation(
            "fewer than 2 derivative sets succeeded".to_string(),
        ))
    }
}

/// Verifier with per-label confidences and an optional failure list.
#[derive(Default)]
pub struct MapVerifier {
    confidences: HashMap<String, f32>,
    failing: HashSet<String>,
}

impl MapVerifier {
    pub fn new(confidences: &[(&str, f32)]) -> Self {
        Self {
            confidences: confidences
                .iter()
                .map(|(label, c)| (label.to_string(), *c))
                .collect(),
            failing: HashSet::new(),
        }
    }

    pub fn failing_for(mut self, label: &str) -> Self {
        self.failing.insert(label.to_string());
        self
    }
}

#[async_trait]
impl ClaimVerifier for MapVerifier {
    async fn verify(&self, claim: &str) -> Result<VerificationResult> {
        if self.failing.contains(claim) {
            return Err(CredenceError::Upstream("verification backend down".to_string()));
        }
        Ok(VerificationResult {
            confidence: self.confidences.get(claim).copied().unwrap_or(0.5),
            rationale: "mock assessment".to_string(),
            evidence: vec![],
        })
    }
}

/// Market searcher returning pre-baked candidates per query.
#[derive(Default)]
pub struct StaticMarkets {
    results: HashMap<String, Vec<MarketCandidate>>,
    always_fail: bool,
}

impl StaticMarkets {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_result(mut self, query: &str, id: &str, title: &str, url: Option<&str>) -> Self {
        self.results.entry(query.to_string()).or_default().push(MarketCandidate {
            id: id.to_string(),
            kind: CandidateKind::Market,
            title: title.to_string(),
            description: None,
            url: url.map(|u| u.to_string()),
        });
        self
    }

    pub fn failing() -> Self {
        Self { results: HashMap::new(), always_fail: true }
    }
}

#[async_trait]
impl MarketSearcher for StaticMarkets {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<MarketCandidate>> {
        if self.always_fail {
            return Err(CredenceError::Upstream("market API unreachable".to_string()));
        }
        let mut out = self.results.get(query).cloned().unwrap_or_default();
        out.truncate(limit);
        Ok(out)
    }
}
