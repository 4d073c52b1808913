//! credence-graph — Claim-graph construction.
//!
//! The primary pipeline (`builder`) turns one worldview into a graph of
//! verified derivative claims; the alternative builder (`layers`) arranges
//! pre-fetched market candidates into BFS hop layers around a core node.

pub mod builder;
pub mod events;
pub mod layers;
pub mod model;

pub use builder::{merge_and_dedupe, ClaimGraphBuilder, Verdict, VerifyFailure};
pub use events::{EventLog, GraphEvent};
pub use layers::build_graph;
pub use model::{
    dedupe_key, ClaimEdge, ClaimNode, ClaimSource, ClaimStatus, EdgeKind, GraphEdge, GraphNode,
    MarketRef,
};
