//! Kalshi-style market search client.
//!
//! The search endpoint returns series with markets embedded; field naming
//! varies across API revisions, so extraction probes the common aliases
//! rather than binding a rigid schema.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use credence_common::retry::{with_retries, RetryPolicy};
use credence_common::{CandidateKind, CredenceError, MarketCandidate, MarketSearcher, Result};

pub const KALSHI_BASE_URL_DEFAULT: &str = "https://api.elections.kalshi.com";
const REQUEST_TIMEOUT_SECS: u64 = 12;
/// Embedded markets included per series hit.
const MARKETS_PER_SERIES: usize = 3;

pub struct MarketClient {
    base_url: String,
    client: reqwest::Client,
}

impl MarketClient {
    pub fn new(base_url: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.unwrap_or_else(|| KALSHI_BASE_URL_DEFAULT.to_string()),
            client,
        }
    }

    fn first_string(value: &Value, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|k| {
            let v = &value[*k];
            if v.is_null() {
                None
            } else if let Some(s) = v.as_str() {
                (!s.is_empty()).then(|| s.to_string())
            } else {
                Some(v.to_string())
            }
        })
    }

    fn candidate_from_series(series: &Value) -> Option<MarketCandidate> {
        let sid = Self::first_string(series, &["id", "series_id", "series_ticker", "ticker", "slug"])?;
        let title = Self::first_string(series, &["title", "name", "series_title"]).unwrap_or_else(|| sid.clone());
        Some(MarketCandidate {
            id: format!("series:{sid}"),
            kind: CandidateKind::Series,
            title,
            description: Self::first_string(series, &["description"]),
            url: Self::first_string(series, &["url", "permalink"]),
        })
    }

    fn candidate_from_market(market: &Value) -> Option<MarketCandidate> {
        let mid = Self::first_string(market, &["id", "market_id", "ticker", "slug"])?;
        let title = Self::first_string(market, &["title", "name"]).unwrap_or_else(|| mid.clone());
        Some(MarketCandidate {
            id: format!("market:{mid}"),
            kind: CandidateKind::Market,
            title,
            description: Self::first_string(market, &["description"]),
            url: Self::first_string(market, &["url", "permalink"]),
        })
    }

    fn candidates_from_response(data: &Value, k: usize) -> Vec<MarketCandidate> {
        let mut results: Vec<MarketCandidate> = Vec::new();

        for series in data["series"].as_array().unwrap_or(&vec![]).iter().take(k) {
            if let Some(c) = Self::candidate_from_series(series) {
                results.push(c);
            }
            for market in series["markets"]
                .as_array()
                .unwrap_or(&vec![])
                .iter()
                .take(MARKETS_PER_SERIES)
            {
                if let Some(c) = Self::candidate_from_market(market) {
                    results.push(c);
                }
            }
        }
        for market in data["markets"].as_array().unwrap_or(&vec![]).iter().take(k) {
            if let Some(c) = Self::candidate_from_market(market) {
                results.push(c);
            }
        }

        // Dedupe by id, first occurrence wins, capped at k.
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for c in results {
            if seen.insert(c.id.clone()) {
                out.push(c);
            }
            if out.len() == k {
                break;
            }
        }
        out
    }
}

#[async_trait]
impl MarketSearcher for MarketClient {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<MarketCandidate>> {
        let url = format!("{}/v1/search/series", self.base_url.trim_end_matches('/'));
        let data: Value = with_retries(RetryPolicy::search(), "market search", || {
            let url = url.clone();
            async move {
                let resp = self
                    .client
                    .get(&url)
                    .query(&[
                        ("embedding_search", "true"),
                        ("order_by", "querymatch"),
                        ("query", query),
                    ])
                    .send()
                    .await?;
                let status = resp.status();
                if !status.is_success() {
                    return Err(CredenceError::Upstream(format!(
                        "market search returned {status}"
                    )));
                }
                Ok(resp.json::<Value>().await?)
            }
        })
        .await?;

        let candidates = Self::candidates_from_response(&data, limit);
        debug!(query, found = candidates.len(), "market search complete");
        Ok(candidates)
    }
}
