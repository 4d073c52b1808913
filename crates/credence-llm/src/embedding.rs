//! Memoized embedding client.
//!
//! One client is created per build; the memo map keeps every distinct text
//! to a single upstream call in the common case. Two tasks racing on the
//! same uncached text may both hit the backend — the pipeline does not
//! promise exactly-once collaborator calls.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use credence_common::retry::{with_retries, RetryPolicy};
use credence_common::{CredenceError, Result, TextEmbedder};

use crate::backend::LlmBackend;

pub struct EmbeddingClient {
    backend: Arc<dyn LlmBackend>,
    memo: Mutex<HashMap<String, Vec<f32>>>,
}

impl EmbeddingClient {
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self { backend, memo: Mutex::new(HashMap::new()) }
    }

    pub async fn get_embedding(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(cached) = self.memo.lock().await.get(text) {
            return Ok(cached.clone());
        }

        // keep the request bounded regardless of how the text was assembled
        let cleaned = text.split_whitespace().collect::<Vec<_>>().join(" ");
        let vec = with_retries(RetryPolicy::search(), "embedding", || {
            let backend = Arc::clone(&self.backend);
            let input = vec![cleaned.clone()];
            async move {
                let mut rows = backend.embed(&input).await?;
                if rows.is_empty() {
                    return Err(CredenceError::Upstream(
                        "embedding response contained no vectors".to_string(),
                    ));
                }
                Ok(rows.remove(0))
            }
        })
        .await?;

        debug!(chars = text.len(), dim = vec.len(), "embedded text");
        self.memo.lock().await.insert(text.to_string(), vec.clone());
        Ok(vec)
    }
}

#[async_trait]
impl TextEmbedder for EmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.get_embedding(text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ChatRequest, ChatResponse};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts embed calls; returns a constant vector.
    struct CountingBackend {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmBackend for CountingBackend {
        async fn complete(&self, _req: ChatRequest) -> Result<ChatResponse> {
            Err(CredenceError::Upstream("not a chat backend".to_string()))
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }

        fn model_id(&self) -> &str {
            "counting"
        }
    }

    #[tokio::test]
    async fn test_memoizes_per_distinct_text() {
        let backend = Arc::new(CountingBackend { calls: AtomicUsize::new(0) });
        let client = EmbeddingClient::new(backend.clone());

        client.get_embedding("rates will fall").await.unwrap();
        client.get_embedding("rates will fall").await.unwrap();
        client.get_embedding("oil stays high").await.unwrap();

        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_memo_keyed_by_raw_text() {
        let backend = Arc::new(CountingBackend { calls: AtomicUsize::new(0) });
        let client = EmbeddingClient::new(backend.clone());

        // same cleaned form, different raw texts: memo treats them apart
        client.get_embedding("rates  will fall").await.unwrap();
        client.get_embedding("rates will fall").await.unwrap();
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }
}
