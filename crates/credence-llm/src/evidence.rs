//! Web-evidence search client (Exa search API).

use serde::Deserialize;
use tracing::info;

use credence_common::retry::{with_retries, RetryPolicy};
use credence_common::{CredenceError, EvidenceSource, Result};

const EXA_SEARCH_URL: &str = "https://api.exa.ai/search";
const SNIPPET_MAX_CHARS: usize = 400;

pub struct EvidenceSearchClient {
    api_key: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    title: Option<String>,
    url: String,
    #[serde(default)]
    text: Option<String>,
}

impl EvidenceSearchClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self { api_key: api_key.into(), client: reqwest::Client::new() }
    }

    /// Search the web and return content snippets for each hit.
    pub async fn search_and_contents(
        &self,
        query: &str,
        num_results: usize,
    ) -> Result<Vec<EvidenceSource>> {
        info!(query, num_results, "searching web evidence");
        let body = serde_json::json!({
            "query":      query,
            "numResults": num_results,
            "contents":   { "text": { "maxCharacters": SNIPPET_MAX_CHARS } },
        });

        let parsed: SearchResponse =
            with_retries(RetryPolicy::search(), "evidence search", || {
                let body = body.clone();
                async move {
                    let resp = self
                        .client
                        .post(EXA_SEARCH_URL)
                        .header("x-api-key", &self.api_key)
                        .json(&body)
                        .send()
                        .await?;
                    let status = resp.status();
                    if !status.is_success() {
                        return Err(CredenceError::Upstream(format!(
                            "evidence search returned {status}"
                        )));
                    }
                    Ok(resp.json::<SearchResponse>().await?)
                }
            })
            .await?;

        Ok(parsed
            .results
            .into_iter()
            .map(|r| EvidenceSource {
                title: r.title.unwrap_or_else(|| "Untitled".to_string()),
                url: r.url,
                snippet: r.text.unwrap_or_default(),
            })
            .collect())
    }
}
