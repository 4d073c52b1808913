//! Graph endpoints: the non-streaming candidate/BFS build and the
//! streaming claim-graph build over SSE.

use std::collections::{HashMap, HashSet};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures_util::future::join_all;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Semaphore};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use tracing::{error, info};

use credence_common::{CredenceError, MarketCandidate, MarketSearcher, TextEmbedder};
use credence_graph::{
    build_graph, ClaimGraphBuilder, GraphEdge, GraphEvent, GraphNode,
};
use credence_llm::{
    DerivativesClient, EmbeddingClient, SuggestItem, SuggestionAction, SuggestionClient,
};
use credence_markets::MarketClient;

use crate::handlers::ApiError;
use crate::state::SharedState;

/// Derivative sets requested per streaming build (self-consistency).
const DERIVATIVE_SETS_PER_BUILD: usize = 4;
/// Market-search fan-out cap in the non-streaming path.
const SEARCH_CONCURRENCY: usize = 8;

// ── Payloads ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphRequest {
    #[serde(default)]
    pub worldview: String,
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default = "default_max_hops")]
    pub max_hops: u32,
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

fn default_k() -> usize {
    200
}
fn default_max_hops() -> u32 {
    3
}
fn default_threshold() -> f32 {
    0.78
}
fn default_top_n() -> usize {
    15
}

impl GraphRequest {
    fn validate(&self) -> Result<(), CredenceError> {
        let worldview = self.worldview.trim();
        if !(4..=2000).contains(&worldview.len()) {
            return Err(CredenceError::Validation(
                "worldview must be 4-2000 characters".to_string(),
            ));
        }
        if !(1..=1000).contains(&self.k) {
            return Err(CredenceError::Validation("k must be in [1, 1000]".to_string()));
        }
        if self.max_hops > 6 {
            return Err(CredenceError::Validation("maxHops must be in [0, 6]".to_string()));
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(CredenceError::Validation(
                "threshold must be in [0, 1]".to_string(),
            ));
        }
        if !(1..=100).contains(&self.top_n) {
            return Err(CredenceError::Validation("topN must be in [1, 100]".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct Graph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    #[serde(rename = "coreId")]
    pub core_id: String,
}

#[derive(Debug, Serialize)]
pub struct Suggestion {
    #[serde(rename = "nodeId")]
    pub node_id: String,
    pub action: SuggestionAction,
    pub confidence: f32,
    pub rationale: String,
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct GraphResponse {
    pub graph: Graph,
    pub suggestions: Vec<Suggestion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<serde_json::Value>,
}

// ── Non-streaming build ───────────────────────────────────────────────────────

pub async fn graph(
    State(state): State<SharedState>,
    Json(body): Json<GraphRequest>,
) -> Result<Json<GraphResponse>, ApiError> {
    body.validate()?;
    let worldview = body.worldview.trim().to_string();

    let backend = state.config.llm_backend()?;
    let embedder: Arc<dyn TextEmbedder> = Arc::new(EmbeddingClient::new(Arc::clone(&backend)));
    let derivatives_client = DerivativesClient::new(Arc::clone(&backend));
    let suggestion_client = SuggestionClient::new(backend);
    let markets = Arc::new(MarketClient::new(state.config.kalshi_base_url.clone()));

    // 1. One validated derivative set to seed the market searches.
    let derivatives = derivatives_client.generate(&worldview).await?;

    // 2. Bounded fan-out: search the catalogue per derivative. A failed
    //    query contributes nothing rather than failing the request.
    let sem = Arc::new(Semaphore::new(SEARCH_CONCURRENCY));
    let search_results = join_all(derivatives.iter().map(|derivative| {
        let markets = Arc::clone(&markets);
        let sem = Arc::clone(&sem);
        let query = derivative.clone();
        let k = body.k;
        async move {
            let _permit = sem.acquire().await.ok();
            markets.search(&query, k).await.unwrap_or_default()
        }
    }))
    .await;

    let mut seen = HashSet::new();
    let mut candidates: Vec<MarketCandidate> = Vec::new();
    for c in search_results.into_iter().flatten() {
        if seen.insert(c.id.clone()) {
            candidates.push(c);
        }
    }
    if candidates.is_empty() {
        return Err(ApiError::bad_gateway(
            "no market candidates found for the provided worldview",
        ));
    }
    info!(candidates = candidates.len(), "candidate pool assembled");

    // 3. Layered graph around the best-matching candidate.
    let (nodes, edges, core_id) = build_graph(
        &worldview,
        body.k,
        body.max_hops,
        body.threshold,
        &candidates,
        embedder,
    )
    .await?;

    // 4. Directional suggestions for the top-N nodes (hop asc, similarity desc).
    let mut ranked: Vec<&GraphNode> = nodes.iter().collect();
    ranked.sort_by(|a, b| {
        a.hop.cmp(&b.hop).then(
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal),
        )
    });
    let items: Vec<SuggestItem> = ranked
        .iter()
        .take(body.top_n)
        .map(|n| SuggestItem {
            node_id: n.id.clone(),
            title: n.label.clone(),
            similarity: n.similarity,
        })
        .collect();
    let raw = suggestion_client.classify(&worldview, &items).await?;

    // Suggestions without a resolvable market URL are dropped.
    let id_to_url: HashMap<&str, &str> = nodes
        .iter()
        .filter_map(|n| n.url.as_deref().map(|u| (n.id.as_str(), u)))
        .collect();
    let suggestions: Vec<Suggestion> = raw
        .into_iter()
        .filter_map(|s| {
            let url = id_to_url.get(s.node_id.as_str())?.to_string();
            Some(Suggestion {
                node_id: s.node_id,
                action: s.action,
                confidence: s.confidence,
                rationale: s.rationale,
                url,
            })
        })
        .collect();

    Ok(Json(GraphResponse {
        graph: Graph { nodes, edges, core_id },
        suggestions,
        debug: Some(serde_json::json!({"derivatives": derivatives})),
    }))
}

// ── Streaming build ───────────────────────────────────────────────────────────

/// Build a claim graph, streaming progress over SSE as it happens:
/// `claim_generated`, `claim_verifying`, `claim_verified`, `sources_found`,
/// then a terminal `graph_complete` (or `error`).
pub async fn graph_stream(
    State(state): State<SharedState>,
    Json(body): Json<GraphRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    body.validate()?;
    let worldview = body.worldview.trim().to_string();
    let config = state.config.clone();

    let (tx, rx) = mpsc::unbounded_channel::<GraphEvent>();

    tokio::spawn(async move {
        let clients = (|| {
            let backend = config.llm_backend()?;
            let verifier = config.verification_agent()?;
            Ok::<_, CredenceError>((backend, verifier))
        })();
        let (backend, verifier) = match clients {
            Ok(pair) => pair,
            Err(e) => {
                let _ = tx.send(GraphEvent::Error { error: e.to_string() });
                return;
            }
        };

        let mut builder = ClaimGraphBuilder::new(
            Arc::new(EmbeddingClient::new(Arc::clone(&backend))),
            Arc::new(DerivativesClient::new(backend)),
            Arc::new(verifier),
            Arc::new(MarketClient::new(config.kalshi_base_url.clone())),
        )
        .with_event_channel(tx);

        // The builder emits the terminal event (graph_complete or error)
        // through the channel itself; dropping the sender ends the stream.
        if let Err(e) = builder
            .build_from_worldview(
                &worldview,
                body.k,
                DERIVATIVE_SETS_PER_BUILD,
                body.top_n,
                body.threshold,
            )
            .await
        {
            error!("claim graph build failed: {e}");
        }
    });

    let stream = UnboundedReceiverStream::new(rx).map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
        Ok::<_, Infallible>(Event::default().event(event.kind()).data(data))
    });

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(worldview: &str) -> GraphRequest {
        serde_json::from_value(serde_json::json!({"worldview": worldview})).unwrap()
    }

    #[test]
    fn test_request_defaults() {
        let req = request("AI will transform healthcare by 2030");
        assert_eq!(req.k, 200);
        assert_eq!(req.max_hops, 3);
        assert_eq!(req.top_n, 15);
        assert!((req.threshold - 0.78).abs() < 1e-6);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_request_camel_case_keys() {
        let req: GraphRequest = serde_json::from_value(serde_json::json!({
            "worldview": "rates fall through 2026",
            "maxHops": 2,
            "topN": 30,
        }))
        .unwrap();
        assert_eq!(req.max_hops, 2);
        assert_eq!(req.top_n, 30);
    }

    #[test]
    fn test_request_rejects_short_worldview() {
        assert!(request("ai").validate().is_err());
    }

    #[test]
    fn test_request_rejects_out_of_range_params() {
        let mut req = request("AI will transform healthcare by 2030");
        req.k = 0;
        assert!(req.validate().is_err());

        let mut req = request("AI will transform healthcare by 2030");
        req.max_hops = 7;
        assert!(req.validate().is_err());

        let mut req = request("AI will transform healthcare by 2030");
        req.threshold = 1.2;
        assert!(req.validate().is_err());

        let mut req = request("AI will transform healthcare by 2030");
        req.top_n = 101;
        assert!(req.validate().is_err());
    }
}
