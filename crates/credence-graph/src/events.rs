//! Progress events emitted while a graph is built.
//!
//! Every event is appended to an ordered log (the replayable trace) and,
//! when a channel is attached, forwarded immediately so the transport can
//! stream it live. One terminal event per build: `graph_complete` on
//! success, `error` on fatal failure.

use std::sync::Mutex;

use serde::Serialize;
use tokio::sync::mpsc;

use credence_common::VerificationResult;

use crate::model::{ClaimEdge, ClaimNode, MarketRef};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GraphEvent {
    ClaimGenerated {
        node: ClaimNode,
    },
    ClaimVerifying {
        #[serde(rename = "nodeId")]
        node_id: String,
        label: String,
    },
    ClaimVerified {
        #[serde(rename = "nodeId")]
        node_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        verification: Option<VerificationResult>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    SourcesFound {
        #[serde(rename = "nodeId")]
        node_id: String,
        market: MarketRef,
    },
    GraphComplete {
        nodes: Vec<ClaimNode>,
        edges: Vec<ClaimEdge>,
        #[serde(rename = "coreId")]
        core_id: String,
    },
    Error {
        error: String,
    },
}

impl GraphEvent {
    /// SSE event name.
    pub fn kind(&self) -> &'static str {
        match self {
            GraphEvent::ClaimGenerated { .. } => "claim_generated",
            GraphEvent::ClaimVerifying { .. } => "claim_verifying",
            GraphEvent::ClaimVerified { .. } => "claim_verified",
            GraphEvent::SourcesFound { .. } => "sources_found",
            GraphEvent::GraphComplete { .. } => "graph_complete",
            GraphEvent::Error { .. } => "error",
        }
    }
}

/// Ordered append-only event log with optional live forwarding.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<GraphEvent>>,
    tx: Option<mpsc::UnboundedSender<GraphEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forward every appended event through `tx` as it happens.
    pub fn with_channel(tx: mpsc::UnboundedSender<GraphEvent>) -> Self {
        Self { events: Mutex::new(Vec::new()), tx: Some(tx) }
    }

    /// Append an event and push it to the live channel, if any. A closed
    /// channel (client went away) is not an error; the log still records.
    pub fn emit(&self, event: GraphEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event.clone());
        }
        self.events.lock().expect("event log poisoned").push(event);
    }

    /// Snapshot of everything emitted so far, in order.
    pub fn events(&self) -> Vec<GraphEvent> {
        self.events.lock().expect("event log poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().expect("event log poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
