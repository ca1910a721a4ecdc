use async_trait::async_trait;

/// Maps text to fixed-dimension vectors.
///
/// Implementations must be deterministic for a given `model_id` and return
/// vectors of exactly `dim()` elements.
pub trait Embedder: Send + Sync {
    /// Stable identity of the model, recorded alongside persisted indexes.
    fn model_id(&self) -> &str;
    fn dim(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;

    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])?
            .pop()
            .ok_or_else(|| anyhow::anyhow!("embedder returned no vector"))
    }
}

/// A remote text-completion service.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_id(&self) -> &str;
    async fn complete(&self, prompt: &str) -> anyhow::Result<String>;
}
