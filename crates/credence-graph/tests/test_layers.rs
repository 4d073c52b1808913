//! Tests for the candidate/BFS layer builder.

mod support;

use std::sync::Arc;

use credence_common::{CandidateKind, CredenceError, MarketCandidate};
use credence_graph::build_graph;

use support::StaticEmbedder;

const WORLDVIEW: &str = "Interest rates fall through 2026";

fn candidate(id: &str, title: &str) -> MarketCandidate {
    MarketCandidate {
        id: id.to_string(),
        kind: CandidateKind::Series,
        title: title.to_string(),
        description: None,
        url: Some(format!("https://example.com/{id}")),
    }
}

/// Chain topology at threshold 0.5:
///   A (core) — B — C, with D isolated.
/// cos(A,B)=0.6, cos(B,C)=0.8, cos(A,C)=0, D orthogonal to everything.
fn chain_embedder() -> StaticEmbedder {
    StaticEmbedder::new(&[
        (WORLDVIEW, &[1.0, 0.0, 0.0]),
        ("cuts by march", &[1.0, 0.0, 0.0]),
        ("mortgage rates drop", &[0.6, 0.8, 0.0]),
        ("housing market rebounds", &[0.0, 1.0, 0.0]),
        ("unrelated sports bet", &[0.0, 0.0, 1.0]),
    ])
}

fn chain_candidates() -> Vec<MarketCandidate> {
    vec![
        candidate("series:A", "cuts by march"),
        candidate("series:B", "mortgage rates drop"),
        candidate("series:C", "housing market rebounds"),
        candidate("series:D", "unrelated sports bet"),
    ]
}

#[tokio::test]
async fn test_bfs_assigns_hops_and_drops_unreachable() {
    let (nodes, edges, core_id) = build_graph(
        WORLDVIEW,
        200,
        3,
        0.5,
        &chain_candidates(),
        Arc::new(chain_embedder()),
    )
    .await
    .unwrap();

    assert_eq!(core_id, "series:A");
    let hop_of = |id: &str| nodes.iter().find(|n| n.id == id).map(|n| n.hop);
    assert_eq!(hop_of("series:A"), Some(0));
    assert_eq!(hop_of("series:B"), Some(1));
    assert_eq!(hop_of("series:C"), Some(2));
    // unreachable from the core: absent from the output
    assert_eq!(hop_of("series:D"), None);

    // every node at hop h > 0 has a neighbor at hop h - 1
    for node in nodes.iter().filter(|n| n.hop > 0) {
        let has_closer_neighbor = edges.iter().any(|e| {
            let other = if e.source == node.id {
                Some(&e.target)
            } else if e.target == node.id {
                Some(&e.source)
            } else {
                None
            };
            other
                .and_then(|id| nodes.iter().find(|n| &n.id == id))
                .is_some_and(|n| n.hop == node.hop - 1)
        });
        assert!(has_closer_neighbor, "node {} has no closer neighbor", node.id);
    }
}

#[tokio::test]
async fn test_max_hops_filters_nodes_and_their_edges() {
    let (nodes, edges, _) = build_graph(
        WORLDVIEW,
        200,
        1,
        0.5,
        &chain_candidates(),
        Arc::new(chain_embedder()),
    )
    .await
    .unwrap();

    let ids: Vec<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(ids, vec!["series:A", "series:B"]);
    // the B—C edge lost an endpoint and must be gone
    assert_eq!(edges.len(), 1);
    assert!(edges[0].source == "series:A" || edges[0].target == "series:A");
}

#[tokio::test]
async fn test_edge_weight_equals_admitting_similarity() {
    let (_, edges, _) = build_graph(
        WORLDVIEW,
        200,
        3,
        0.5,
        &chain_candidates(),
        Arc::new(chain_embedder()),
    )
    .await
    .unwrap();

    let ab = edges
        .iter()
        .find(|e| e.source == "series:A" && e.target == "series:B")
        .unwrap();
    assert!((ab.weight - 0.6).abs() < 1e-6);
}

#[tokio::test]
async fn test_empty_candidate_list_is_structural() {
    let err = build_graph(WORLDVIEW, 200, 3, 0.5, &[], Arc::new(chain_embedder()))
        .await
        .unwrap_err();
    assert!(matches!(err, CredenceError::Structural(_)));
}

#[tokio::test]
async fn test_all_candidate_embeddings_failing_is_structural() {
    let embedder = StaticEmbedder::new(&[(WORLDVIEW, &[1.0, 0.0, 0.0])])
        .failing_for("cuts by march")
        .failing_for("mortgage rates drop");
    let candidates = vec![
        candidate("series:A", "cuts by march"),
        candidate("series:B", "mortgage rates drop"),
    ];
    let err = build_graph(WORLDVIEW, 200, 3, 0.5, &candidates, Arc::new(embedder))
        .await
        .unwrap_err();
    assert!(matches!(err, CredenceError::Structural(_)));
}

#[tokio::test]
async fn test_single_candidate_embedding_failure_is_tolerated() {
    let embedder = chain_embedder().failing_for("housing market rebounds");
    let (nodes, _, core_id) = build_graph(
        WORLDVIEW,
        200,
        3,
        0.5,
        &chain_candidates(),
        Arc::new(embedder),
    )
    .await
    .unwrap();

    assert_eq!(core_id, "series:A");
    assert!(nodes.iter().all(|n| n.id != "series:C"));
    assert!(nodes.iter().any(|n| n.id == "series:B"));
}

#[tokio::test]
async fn test_core_tie_broken_by_first_occurrence() {
    let embedder = StaticEmbedder::new(&[
        (WORLDVIEW, &[1.0, 0.0]),
        ("first twin", &[0.0, 1.0]),
        ("second twin", &[0.0, 1.0]),
    ]);
    let candidates = vec![
        candidate("series:first", "first twin"),
        candidate("series:second", "second twin"),
    ];
    let (_, _, core_id) = build_graph(WORLDVIEW, 200, 3, 0.9, &candidates, Arc::new(embedder))
        .await
        .unwrap();
    assert_eq!(core_id, "series:first");
}

#[tokio::test]
async fn test_candidate_description_participates_in_embedding() {
    let mut with_description = candidate("series:A", "cuts by march");
    with_description.description = Some("fed funds below 4 percent".to_string());
    let embedder = StaticEmbedder::new(&[
        (WORLDVIEW, &[1.0, 0.0]),
        ("cuts by march. fed funds below 4 percent", &[1.0, 0.0]),
    ]);
    let (nodes, _, _) = build_graph(WORLDVIEW, 200, 3, 0.9, &[with_description], Arc::new(embedder))
        .await
        .unwrap();
    assert_eq!(nodes.len(), 1);
    assert!((nodes[0].similarity - 1.0).abs() < 1e-6);
}
