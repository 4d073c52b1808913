//! credence-common — Shared error taxonomy, collaborator contracts, and
//! small utilities used across all Credence crates.

pub mod collaborators;
pub mod error;
pub mod retry;
pub mod similarity;

pub use collaborators::{
    CandidateKind, ClaimVerifier, DerivativeGenerator, EvidenceSource, MarketCandidate,
    MarketSearcher, TextEmbedder, VerificationResult,
};
pub use error::{CredenceError, Result};
pub use similarity::cosine_similarity;
