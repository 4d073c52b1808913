//! The primary claim-graph pipeline.
//!
//! Stages, run strictly in order with a full join between them:
//!   1. Root claim from the worldview
//!   2. Derivative-claim sets from the generator, flattened
//!   3. Embed derivatives, build nodes + root edges
//!   4. Verify claims (bounded parallel, per-node failure non-fatal)
//!   5. Dedupe by label, keep top N by confidence
//!   6. Attach market sources (bounded parallel, per-node failure non-fatal)
//!   7. All-pairs similarity edges over the survivors
//!
//! Each stage owns its node collection; parallel sub-tasks within a stage
//! borrow disjoint nodes, so no shared node map is needed. A builder is
//! single-use: one instance per build invocation.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use futures_util::future::{join_all, try_join_all};
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tracing::{info, warn};

use credence_common::{
    cosine_similarity, ClaimVerifier, CredenceError, DerivativeGenerator, MarketSearcher, Result,
    TextEmbedder, VerificationResult,
};

use crate::events::{EventLog, GraphEvent};
use crate::model::{
    dedupe_key, new_claim_id, ClaimEdge, ClaimNode, ClaimSource, ClaimStatus, EdgeKind, MarketRef,
};

/// Verification and market-attach fan-out cap.
pub const DEFAULT_CONCURRENCY: usize = 8;
/// Per-claim market search depth; only the top result is attached.
pub const MARKET_RESULTS_PER_CLAIM: usize = 3;
/// Relevance assigned to an attached market reference.
pub const MARKET_RELEVANCE: f32 = 0.8;

// ── Per-node verification outcome ─────────────────────────────────────────────

/// Why a single claim's verification failed. Local to the node; never aborts
/// the batch.
#[derive(Debug, Clone, Error)]
pub enum VerifyFailure {
    #[error("upstream verification failure: {0}")]
    Upstream(String),
    #[error("verifier returned an unusable response: {0}")]
    InvalidResponse(String),
}

impl From<CredenceError> for VerifyFailure {
    fn from(e: CredenceError) -> Self {
        match e {
            CredenceError::Serialization(e) => VerifyFailure::InvalidResponse(e.to_string()),
            other => VerifyFailure::Upstream(other.to_string()),
        }
    }
}

/// Typed outcome of one claim's verification.
#[derive(Debug, Clone)]
pub enum Verdict {
    Verified(VerificationResult),
    Failed(VerifyFailure),
}

// ── Builder ───────────────────────────────────────────────────────────────────

pub struct ClaimGraphBuilder {
    embedder: Arc<dyn TextEmbedder>,
    generator: Arc<dyn DerivativeGenerator>,
    verifier: Arc<dyn ClaimVerifier>,
    markets: Arc<dyn MarketSearcher>,
    events: EventLog,
    edges: Vec<ClaimEdge>,
}

impl ClaimGraphBuilder {
    pub fn new(
        embedder: Arc<dyn TextEmbedder>,
        generator: Arc<dyn DerivativeGenerator>,
        verifier: Arc<dyn ClaimVerifier>,
        markets: Arc<dyn MarketSearcher>,
    ) -> Self {
        Self {
            embedder,
            generator,
            verifier,
            markets,
            events: EventLog::new(),
            edges: Vec::new(),
        }
    }

    /// Forward progress events live through `tx` as they are emitted.
    pub fn with_event_channel(mut self, tx: mpsc::UnboundedSender<GraphEvent>) -> Self {
        self.events = EventLog::with_channel(tx);
        self
    }

    /// Snapshot of the ordered event trace.
    pub fn events(&self) -> Vec<GraphEvent> {
        self.events.events()
    }

    /// Build the complete claim graph for one worldview.
    ///
    /// Returns `(nodes, edges, root_id)` where `nodes` is the root followed
    /// by the surviving derivative claims. On fatal failure a terminal
    /// `error` event is emitted and no partial graph is returned.
    pub async fn build_from_worldview(
        &mut self,
        worldview: &str,
        k: usize,
        num_derivative_sets: usize,
        max_claims: usize,
        threshold: f32,
    ) -> Result<(Vec<ClaimNode>, Vec<ClaimEdge>, String)> {
        match self
            .run(worldview, k, num_derivative_sets, max_claims, threshold)
            .await
        {
            Ok(out) => Ok(out),
            Err(e) => {
                self.events.emit(GraphEvent::Error { error: e.to_string() });
                Err(e)
            }
        }
    }

    async fn run(
        &mut self,
        worldview: &str,
        k: usize,
        num_derivative_sets: usize,
        max_claims: usize,
        threshold: f32,
    ) -> Result<(Vec<ClaimNode>, Vec<ClaimEdge>, String)> {
        let root = self.root_claim(worldview);
        let root_id = root.id.clone();

        let sets = self
            .generator
            .generate_sets(worldview, num_derivative_sets)
            .await?;
        let derivatives: Vec<String> = sets.into_iter().flatten().collect();
        info!(
            count = derivatives.len(),
            "derivative claims generated, building nodes"
        );

        let mut nodes = self
            .derivative_nodes(worldview, derivatives, &root_id)
            .await?;

        self.verify_parallel(&mut nodes, DEFAULT_CONCURRENCY).await;

        let mut kept = merge_and_dedupe(nodes, max_claims);
        info!(kept = kept.len(), "claims after dedupe and truncation");

        let market_limit = MARKET_RESULTS_PER_CLAIM.min(k.max(1));
        self.attach_market_sources(&mut kept, market_limit, DEFAULT_CONCURRENCY)
            .await;

        self.similarity_edges(&kept, threshold).await?;

        let mut nodes = Vec::with_capacity(kept.len() + 1);
        nodes.push(root);
        nodes.extend(kept);

        self.events.emit(GraphEvent::GraphComplete {
            nodes: nodes.clone(),
            edges: self.edges.clone(),
            core_id: root_id.clone(),
        });

        Ok((nodes, self.edges.clone(), root_id))
    }

    // ── Stage 1: root ─────────────────────────────────────────────────────────

    /// The root is axiomatically true: verified by fiat, similarity 1.0,
    /// hop 0, never independently verified.
    fn root_claim(&self, worldview: &str) -> ClaimNode {
        let root = ClaimNode {
            id: new_claim_id(),
            label: worldview.to_string(),
            status: ClaimStatus::Verified,
            sources: vec![],
            similarity: 1.0,
            hop: 0,
        };
        self.events
            .emit(GraphEvent::ClaimGenerated { node: root.clone() });
        root
    }

    // ── Stage 2: derivative nodes + root edges ────────────────────────────────

    /// Embed the worldview once and every derivative in parallel, then build
    /// one node and one `derives_from` edge per derivative. Embedding
    /// failures here propagate; there is no per-claim skip at this stage.
    async fn derivative_nodes(
        &mut self,
        worldview: &str,
        derivatives: Vec<String>,
        root_id: &str,
    ) -> Result<Vec<ClaimNode>> {
        let worldview_vec = self.embedder.embed(worldview).await?;

        let embeds = try_join_all(derivatives.iter().map(|claim| {
            let embedder = Arc::clone(&self.embedder);
            async move { embedder.embed(claim).await }
        }))
        .await?;

        let mut nodes = Vec::with_capacity(derivatives.len());
        for (claim, claim_vec) in derivatives.into_iter().zip(embeds) {
            let similarity = cosine_similarity(&worldview_vec, &claim_vec)?;
            let node = ClaimNode {
                id: new_claim_id(),
                label: claim,
                status: ClaimStatus::Generated,
                sources: vec![],
                similarity,
                hop: 1,
            };
            self.events
                .emit(GraphEvent::ClaimGenerated { node: node.clone() });
            self.edges.push(ClaimEdge {
                source: root_id.to_string(),
                target: node.id.clone(),
                kind: EdgeKind::DerivesFrom,
                weight: similarity,
            });
            nodes.push(node);
        }
        Ok(nodes)
    }

    // ── Stage 3: bounded-parallel verification ────────────────────────────────

    /// Verify every node, at most `max_concurrent` in flight. Completion
    /// order is first-to-finish; the stage joins on all nodes. A failing
    /// verifier marks its node `failed` and never aborts the batch.
    async fn verify_parallel(&self, nodes: &mut [ClaimNode], max_concurrent: usize) {
        let sem = Semaphore::new(max_concurrent.max(1));
        join_all(nodes.iter_mut().map(|node| {
            let sem = &sem;
            async move {
                // the semaphore lives on this stack frame and is never closed
                let _permit = sem.acquire().await.ok();

                if node.status.advance(ClaimStatus::Verifying).is_err() {
                    return;
                }
                self.events.emit(GraphEvent::ClaimVerifying {
                    node_id: node.id.clone(),
                    label: node.label.clone(),
                });

                let verdict = match self.verifier.verify(&node.label).await {
                    Ok(v) => Verdict::Verified(v),
                    Err(e) => Verdict::Failed(e.into()),
                };
                self.apply_verdict(node, verdict);
            }
        }))
        .await;
    }

    fn apply_verdict(&self, node: &mut ClaimNode, verdict: Verdict) {
        match verdict {
            Verdict::Verified(verification) => {
                node.sources
                    .push(ClaimSource::from_verification(verification.clone()));
                let _ = node.status.advance(ClaimStatus::Verified);
                self.events.emit(GraphEvent::ClaimVerified {
                    node_id: node.id.clone(),
                    verification: Some(verification),
                    error: None,
                });
            }
            Verdict::Failed(failure) => {
                let _ = node.status.advance(ClaimStatus::Failed);
                warn!(node_id = %node.id, "verification failed: {failure}");
                self.events.emit(GraphEvent::ClaimVerified {
                    node_id: node.id.clone(),
                    verification: None,
                    error: Some(failure.to_string()),
                });
            }
        }
    }

    // ── Stage 5: bounded-parallel market attachment ───────────────────────────

    /// Search the market catalogue per node and merge the top hit into the
    /// canonical source slot. Search failure or an empty result is a no-op
    /// for that node; it never marks the node failed.
    async fn attach_market_sources(
        &self,
        nodes: &mut [ClaimNode],
        limit: usize,
        max_concurrent: usize,
    ) {
        let sem = Semaphore::new(max_concurrent.max(1));
        join_all(nodes.iter_mut().map(|node| {
            let sem = &sem;
            async move {
                let _permit = sem.acquire().await.ok();

                let candidates = match self.markets.search(&node.label, limit).await {
                    Ok(c) => c,
                    Err(e) => {
                        warn!(node_id = %node.id, "market search failed: {e}");
                        return;
                    }
                };
                let Some(top) = candidates.first() else {
                    return;
                };
                let market = MarketRef {
                    id: top.id.clone(),
                    title: top.title.clone(),
                    url: top.url.clone().unwrap_or_default(),
                    relevance: MARKET_RELEVANCE,
                };

                // Read-modify-replace of slot 0: keep the verification.
                match node.sources.first_mut() {
                    Some(slot) => slot.market = Some(market.clone()),
                    None => node.sources.push(ClaimSource {
                        verification: None,
                        market: Some(market.clone()),
                    }),
                }
                self.events.emit(GraphEvent::SourcesFound {
                    node_id: node.id.clone(),
                    market,
                });
            }
        }))
        .await;
    }

    // ── Stage 6: similarity edges ─────────────────────────────────────────────

    /// All-pairs similarity over the survivors; an edge is admitted iff
    /// cosine ≥ threshold (inclusive). Quadratic, bounded by `max_claims`.
    async fn similarity_edges(&mut self, nodes: &[ClaimNode], threshold: f32) -> Result<()> {
        let mut vectors = Vec::with_capacity(nodes.len());
        for node in nodes {
            vectors.push(self.embedder.embed(&node.label).await?);
        }
        for i in 0..nodes.len() {
            for j in (i + 1)..nodes.len() {
                let similarity = cosine_similarity(&vectors[i], &vectors[j])?;
                if similarity >= threshold {
                    self.edges.push(ClaimEdge {
                        source: nodes[i].id.clone(),
                        target: nodes[j].id.clone(),
                        kind: EdgeKind::SimilarTo,
                        weight: similarity,
                    });
                }
            }
        }
        Ok(())
    }
}

// ── Stage 4: merge & dedupe ───────────────────────────────────────────────────

/// Drop exact duplicates (case-insensitive, whitespace-normalized label;
/// first occurrence wins), stable-sort descending by verification
/// confidence, truncate to `max_claims`.
pub fn merge_and_dedupe(nodes: Vec<ClaimNode>, max_claims: usize) -> Vec<ClaimNode> {
    let mut seen = HashSet::new();
    let mut unique: Vec<ClaimNode> = nodes
        .into_iter()
        .filter(|node| seen.insert(dedupe_key(&node.label)))
        .collect();

    unique.sort_by(|a, b| {
        b.confidence()
            .partial_cmp(&a.confidence())
            .unwrap_or(Ordering::Equal)
    });
    unique.truncate(max_claims);
    unique
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(label: &str, confidence: Option<f32>) -> ClaimNode {
        let (status, sources) = match confidence {
            Some(c) => (
                ClaimStatus::Verified,
                vec![ClaimSource::from_verification(VerificationResult {
                    confidence: c,
                    rationale: String::new(),
                    evidence: vec![],
                })],
            ),
            None => (ClaimStatus::Failed, vec![]),
        };
        ClaimNode {
            id: new_claim_id(),
            label: label.to_string(),
            status,
            sources,
            similarity: 0.5,
            hop: 1,
        }
    }

    #[test]
    fn test_dedupe_keeps_first_seen_variant() {
        let nodes = vec![
            node("Rates will fall", Some(0.4)),
            node("RATES WILL FALL", Some(0.9)),
            node("Oil stays high", Some(0.7)),
        ];
        let out = merge_and_dedupe(nodes, 10);
        assert_eq!(out.len(), 2);
        // first-seen wins, not highest-confidence-wins
        let labels: Vec<_> = out.iter().map(|n| n.label.as_str()).collect();
        assert!(labels.contains(&"Rates will fall"));
        assert!(!labels.contains(&"RATES WILL FALL"));
    }

    #[test]
    fn test_dedupe_sorts_by_confidence_and_truncates() {
        let nodes = vec![
            node("a", Some(0.2)),
            node("b", Some(0.9)),
            node("c", None),
            node("d", Some(0.5)),
        ];
        let out = merge_and_dedupe(nodes, 3);
        assert_eq!(out.len(), 3);
        let confs: Vec<f32> = out.iter().map(|n| n.confidence()).collect();
        assert_eq!(confs, vec![0.9, 0.5, 0.2]);
        // confidence sequence is non-increasing
        assert!(confs.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_failed_nodes_rank_at_zero_confidence() {
        let nodes = vec![node("failed one", None), node("weak but verified", Some(0.01))];
        let out = merge_and_dedupe(nodes, 10);
        assert_eq!(out[0].label, "weak but verified");
        assert_eq!(out[1].confidence(), 0.0);
    }

    #[test]
    fn test_dedupe_output_labels_come_from_input() {
        let nodes = vec![
            node("one  claim", Some(0.3)),
            node("One Claim", Some(0.8)),
            node("two", Some(0.1)),
        ];
        let input_labels: Vec<String> = nodes.iter().map(|n| n.label.clone()).collect();
        let out = merge_and_dedupe(nodes, 10);
        for n in &out {
            assert!(input_labels.contains(&n.label));
        }
        // pairwise distinct under the dedupe key
        let mut keys: Vec<_> = out.iter().map(|n| dedupe_key(&n.label)).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), out.len());
    }
}
