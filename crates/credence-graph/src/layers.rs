//! Alternative graph builder: arrange pre-fetched market candidates into
//! BFS hop layers around the candidate most similar to the worldview.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{info, warn};

use credence_common::{cosine_similarity, CredenceError, MarketCandidate, Result, TextEmbedder};

use crate::model::{GraphEdge, GraphNode, HOP_UNASSIGNED};

/// Build graph nodes/edges and assign hop layers.
///
/// - Embeds the worldview and all candidates in parallel; a candidate whose
///   embedding fails is skipped, but zero valid nodes is fatal.
/// - Node similarity = cosine(candidate, worldview).
/// - Undirected edges between pairs with cosine ≥ `threshold` (inclusive).
/// - BFS from the core node (argmax similarity, first occurrence on ties)
///   assigns hop distances; nodes unreachable from the core or beyond
///   `max_hops` are dropped, along with edges that lost an endpoint.
///
/// The candidate list is already deduplicated by id and capped by the
/// caller's per-query limit `k`.
pub async fn build_graph(
    worldview: &str,
    _k: usize,
    max_hops: u32,
    threshold: f32,
    candidates: &[MarketCandidate],
    embedder: Arc<dyn TextEmbedder>,
) -> Result<(Vec<GraphNode>, Vec<GraphEdge>, String)> {
    let worldview_vec = embedder.embed(worldview).await?;

    let embeds = join_all(candidates.iter().map(|c| {
        let embedder = Arc::clone(&embedder);
        async move { (c.id.clone(), embedder.embed(&c.embed_text()).await) }
    }))
    .await;

    let mut id_to_vec: HashMap<String, Vec<f32>> = HashMap::new();
    for (id, result) in embeds {
        match result {
            Ok(vec) => {
                id_to_vec.insert(id, vec);
            }
            Err(e) => warn!(candidate = %id, "candidate embedding failed, skipping: {e}"),
        }
    }

    // Nodes with similarity to the worldview; hop stays unassigned until BFS.
    let mut nodes: Vec<GraphNode> = Vec::new();
    for c in candidates {
        let Some(vec) = id_to_vec.get(&c.id) else {
            continue;
        };
        let similarity = cosine_similarity(&worldview_vec, vec)?;
        nodes.push(GraphNode {
            id: c.id.clone(),
            label: c.title.clone(),
            url: c.url.clone(),
            kind: c.kind,
            similarity,
            hop: HOP_UNASSIGNED,
        });
    }
    if nodes.is_empty() {
        return Err(CredenceError::Structural(
            "no valid nodes found from market candidates".to_string(),
        ));
    }

    // Core node: argmax similarity, first occurrence wins ties.
    let core_id = nodes
        .iter()
        .fold(&nodes[0], |best, n| {
            if n.similarity > best.similarity {
                n
            } else {
                best
            }
        })
        .id
        .clone();

    // Pairwise edges over the same candidate embeddings.
    let ids: Vec<&String> = nodes.iter().map(|n| &n.id).collect();
    let mut edges: Vec<GraphEdge> = Vec::new();
    for i in 0..ids.len() {
        for j in (i + 1)..ids.len() {
            let weight = cosine_similarity(&id_to_vec[ids[i]], &id_to_vec[ids[j]])?;
            if weight >= threshold {
                edges.push(GraphEdge {
                    source: ids[i].clone(),
                    target: ids[j].clone(),
                    weight,
                });
            }
        }
    }

    // Adjacency for BFS; similarity edges are undirected.
    let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
    for n in &nodes {
        adjacency.entry(n.id.clone()).or_default();
    }
    for e in &edges {
        adjacency
            .entry(e.source.clone())
            .or_default()
            .push(e.target.clone());
        adjacency
            .entry(e.target.clone())
            .or_default()
            .push(e.source.clone());
    }

    // Unweighted BFS from the core: first-discovery distance is final.
    let mut hops: HashMap<String, i32> = HashMap::new();
    let mut queue: VecDeque<String> = VecDeque::new();
    hops.insert(core_id.clone(), 0);
    queue.push_back(core_id.clone());
    while let Some(current) = queue.pop_front() {
        let current_hop = hops[&current];
        if let Some(neighbors) = adjacency.get(&current) {
            for next in neighbors {
                if !hops.contains_key(next) {
                    hops.insert(next.clone(), current_hop + 1);
                    queue.push_back(next.clone());
                }
            }
        }
    }

    // Keep nodes reachable within max_hops, and edges with both endpoints.
    let mut filtered_nodes: Vec<GraphNode> = Vec::new();
    for mut node in nodes {
        let Some(&hop) = hops.get(node.id.as_str()) else {
            continue; // unreachable from the core
        };
        if hop <= max_hops as i32 {
            node.hop = hop;
            filtered_nodes.push(node);
        }
    }
    let kept: HashSet<&str> = filtered_nodes.iter().map(|n| n.id.as_str()).collect();
    let filtered_edges: Vec<GraphEdge> = edges
        .into_iter()
        .filter(|e| kept.contains(e.source.as_str()) && kept.contains(e.target.as_str()))
        .collect();

    info!(
        nodes = filtered_nodes.len(),
        edges = filtered_edges.len(),
        core = %core_id,
        "layer graph built"
    );

    Ok((filtered_nodes, filtered_edges, core_id))
}
