use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use handbook_core::config::{EmbeddingProvider, Settings};
use handbook_core::error::Error;
use handbook_core::traits::Embedder;
use handbook_embed::FakeEmbedder;
use handbook_qa::{load_or_build, rebuild_index, source_fingerprint};

const PLAIN_DOC: &str = "Our office opens at nine and closes at six on weekdays.\n\nVisitors must sign in at reception and wear a badge at all times.\n\nParking is available in the north lot for registered vehicles only.\n";

/// Fake embeddings plus a call counter and optional per-batch delay.
struct TrackingEmbedder {
    inner: FakeEmbedder,
    batches: AtomicUsize,
    delay: Duration,
}

impl TrackingEmbedder {
    fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self { inner: FakeEmbedder::new(64), batches: AtomicUsize::new(0), delay })
    }

    fn batches(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }
}

impl Embedder for TrackingEmbedder {
    fn model_id(&self) -> &str { self.inner.model_id() }
    fn dim(&self) -> usize { self.inner.dim() }

    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.inner.embed_batch(texts)
    }
}

fn settings_for(tmp: &TempDir, doc: &str) -> Settings {
    let path = tmp.path().join("handbook.txt");
    fs::write(&path, doc).unwrap();
    let mut s = Settings::default();
    s.document.path = path;
    s.index.dir = tmp.path().join("index");
    s.embedding.provider = EmbeddingProvider::Fake;
    s
}

#[tokio::test]
async fn unchanged_document_reuses_saved_index() {
    let tmp = TempDir::new().unwrap();
    let settings = settings_for(&tmp, PLAIN_DOC);
    let embedder = TrackingEmbedder::new(Duration::ZERO);

    let built = load_or_build(&settings, embedder.clone()).await.unwrap();
    let after_build = embedder.batches();
    assert!(after_build > 0);
    assert_eq!(built.source(), Some(source_fingerprint(PLAIN_DOC.as_bytes(), &settings.chunking).as_str()));

    let reused = load_or_build(&settings, embedder.clone()).await.unwrap();
    assert_eq!(embedder.batches(), after_build, "saved index must be reused without embedding");
    assert_eq!(reused.entries(), built.entries());
}

#[tokio::test]
async fn edited_document_triggers_rebuild() {
    let tmp = TempDir::new().unwrap();
    let settings = settings_for(&tmp, "3. Leave Policy\nEmployees get 15 days annual leave.\n");
    let first = load_or_build(&settings, TrackingEmbedder::new(Duration::ZERO)).await.unwrap();
    assert!(first.entries()[0].chunk.content.contains("15 days"));

    fs::write(&settings.document.path, "3. Leave Policy\nEmployees get 20 days annual leave.\n").unwrap();
    let second = load_or_build(&settings, TrackingEmbedder::new(Duration::ZERO)).await.unwrap();

    assert_eq!(second.len(), 1);
    assert!(second.entries()[0].chunk.content.contains("20 days"), "stale index served");
}

#[tokio::test]
async fn changed_chunking_settings_trigger_rebuild() {
    let tmp = TempDir::new().unwrap();
    let mut settings = settings_for(&tmp, PLAIN_DOC);
    let coarse = load_or_build(&settings, TrackingEmbedder::new(Duration::ZERO)).await.unwrap();
    assert_eq!(coarse.len(), 1);

    settings.chunking.chunk_size = 80;
    settings.chunking.chunk_overlap = 10;
    let fine = load_or_build(&settings, TrackingEmbedder::new(Duration::ZERO)).await.unwrap();
    assert!(fine.len() > 1, "expected smaller chunks, got {}", fine.len());
}

#[tokio::test]
async fn slow_build_times_out_without_saving() {
    let tmp = TempDir::new().unwrap();
    let mut settings = settings_for(&tmp, PLAIN_DOC);
    settings.index.build_timeout_secs = 1;

    let err = rebuild_index(&settings, TrackingEmbedder::new(Duration::from_millis(1500))).await.unwrap_err();

    assert!(matches!(&err, Error::IndexBuild(msg) if msg.contains("timed out")), "got {err:?}");
    assert!(!settings.index.dir.exists());
}
