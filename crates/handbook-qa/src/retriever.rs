use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use handbook_core::types::RetrievedChunk;
use handbook_vector::VectorIndex;

/// Top-k lookup over a shared [`VectorIndex`] that never fails: errors,
/// panics in the embedding call and timeouts all yield an empty result.
pub struct Retriever {
    index: Arc<VectorIndex>,
    timeout: Duration,
}

impl Retriever {
    pub fn new(index: Arc<VectorIndex>, timeout: Duration) -> Self {
        Self { index, timeout }
    }

    pub fn index(&self) -> &Arc<VectorIndex> { &self.index }

    pub async fn retrieve(&self, question: &str, k: usize) -> Vec<RetrievedChunk> {
        if k == 0 || self.index.is_empty() {
            return Vec::new();
        }
        let index = Arc::clone(&self.index);
        let q = question.to_string();
        let task = tokio::task::spawn_blocking(move || index.query(&q, k));

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(Ok(hits))) => {
                let hits: Vec<RetrievedChunk> = hits.into_iter().filter(|h| h.score.is_finite()).collect();
                debug!(k, hits = hits.len(), "retrieved chunks");
                hits
            }
            Ok(Ok(Err(e))) => {
                warn!(error = %e, "retrieval failed; answering without context");
                Vec::new()
            }
            Ok(Err(e)) => {
                warn!(error = %e, "retrieval task aborted");
                Vec::new()
            }
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs_f32(), "retrieval timed out");
                Vec::new()
            }
        }
    }
}
