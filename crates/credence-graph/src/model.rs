//! Graph data model: claim nodes/edges for the primary pipeline and the
//! lighter node/edge pair used by the BFS layer builder.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use credence_common::{CandidateKind, VerificationResult};

// ── Claim status state machine ────────────────────────────────────────────────

/// Lifecycle of a claim node. Transitions are monotonic:
/// generated → verifying → {verified | failed}, never reversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimStatus {
    Generated,
    Verifying,
    Verified,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid claim status transition: {from:?} → {to:?}")]
pub struct InvalidTransition {
    pub from: ClaimStatus,
    pub to: ClaimStatus,
}

impl ClaimStatus {
    /// Advance to `next`, rejecting anything but the forward path.
    pub fn advance(&mut self, next: ClaimStatus) -> Result<(), InvalidTransition> {
        let legal = matches!(
            (*self, next),
            (ClaimStatus::Generated, ClaimStatus::Verifying)
                | (ClaimStatus::Verifying, ClaimStatus::Verified)
                | (ClaimStatus::Verifying, ClaimStatus::Failed)
        );
        if legal {
            *self = next;
            Ok(())
        } else {
            Err(InvalidTransition { from: *self, to: next })
        }
    }
}

// ── Sources ───────────────────────────────────────────────────────────────────

/// A prediction-market reference attached to a claim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketRef {
    pub id: String,
    pub title: String,
    /// Empty when the candidate carried no URL.
    pub url: String,
    pub relevance: f32,
}

/// One evidence slot on a claim. Slot 0 is canonical: market attachment
/// updates it in place without discarding an existing verification.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClaimSource {
    pub verification: Option<VerificationResult>,
    pub market: Option<MarketRef>,
}

impl ClaimSource {
    pub fn from_verification(verification: VerificationResult) -> Self {
        Self { verification: Some(verification), market: None }
    }
}

// ── Claim nodes and edges ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimNode {
    pub id: String,
    pub label: String,
    pub status: ClaimStatus,
    pub sources: Vec<ClaimSource>,
    /// Cosine similarity to the root worldview, in [0, 1].
    pub similarity: f32,
    /// Graph distance from the root; 0 only for the root itself.
    pub hop: u32,
}

impl ClaimNode {
    /// Verification confidence of the canonical source slot; 0.0 when the
    /// node was never verified (including every failed node).
    pub fn confidence(&self) -> f32 {
        self.sources
            .first()
            .and_then(|s| s.verification.as_ref())
            .map(|v| v.confidence)
            .unwrap_or(0.0)
    }
}

/// Fresh opaque node id, unique within a build.
pub fn new_claim_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("claim-{}", &hex[..12])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    DerivesFrom,
    SimilarTo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimEdge {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub kind: EdgeKind,
    /// The similarity value that admitted the edge, in [0, 1].
    pub weight: f32,
}

// ── BFS-variant nodes and edges ───────────────────────────────────────────────

/// Hop value before BFS assigns a distance.
pub const HOP_UNASSIGNED: i32 = -1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    pub url: Option<String>,
    #[serde(rename = "type")]
    pub kind: CandidateKind,
    pub similarity: f32,
    /// −1 until BFS assigns it; assigned exactly once.
    pub hop: i32,
}

/// Undirected similarity edge, used purely for BFS adjacency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub weight: f32,
}

// ── Dedupe key ────────────────────────────────────────────────────────────────

/// Exact-match dedupe key: lower-cased, whitespace-normalized label. Two
/// claims differing only by case or repeated whitespace are the same entity.
pub fn dedupe_key(label: &str) -> String {
    label.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}
