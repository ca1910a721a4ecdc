//! Index bootstrap: extract → chunk → embed → persist, or reuse a saved index.
use std::fs;
use std::sync::Arc;
use tracing::{info, warn};

use handbook_core::chunker::{Chunker, ChunkingConfig};
use handbook_core::config::{has_api_key, ChunkingSettings, Settings};
use handbook_core::document::extract_pages;
use handbook_core::error::{Error, Result};
use handbook_core::traits::{Embedder, LanguageModel};
use handbook_embed::load_embedder;
use handbook_vector::VectorIndex;

use crate::engine::QaEngine;
use crate::llm::OpenAiModel;

/// Hex blake3 over the document bytes and the chunking settings that shape
/// the index built from them.
pub fn source_fingerprint(document: &[u8], chunking: &ChunkingSettings) -> String {
    let mut h = blake3::Hasher::new();
    h.update(document);
    h.update(
        format!(
            "\0chunk_size={};chunk_overlap={};section_split={}",
            chunking.chunk_size, chunking.chunk_overlap, chunking.section_split
        )
        .as_bytes(),
    );
    h.finalize().to_hex().to_string()
}

/// Build an in-memory index from the configured document. Blocking.
pub fn build_index(settings: &Settings, embedder: Arc<dyn Embedder>) -> Result<VectorIndex> {
    let path = &settings.document.path;
    let pages = extract_pages(path)?;
    let bytes = fs::read(path)
        .map_err(|e| Error::Extraction { path: path.display().to_string(), reason: e.to_string() })?;
    let chunker = Chunker::new(ChunkingConfig::from(&settings.chunking))?;
    let chunks = chunker.chunk_pages(&pages)?;
    info!(pages = pages.len(), chunks = chunks.len(), "document chunked");
    Ok(VectorIndex::build(&chunks, embedder)?.with_source(source_fingerprint(&bytes, &settings.chunking)))
}

/// Build from the document and replace the persisted index. The build is
/// abandoned with `Error::IndexBuild` after `index.build_timeout_secs`.
pub async fn rebuild_index(settings: &Settings, embedder: Arc<dyn Embedder>) -> Result<VectorIndex> {
    let owned = settings.clone();
    let limit = settings.index.build_timeout();
    let task = tokio::task::spawn_blocking(move || build_index(&owned, embedder));
    let index = tokio::time::timeout(limit, task)
        .await
        .map_err(|_| Error::IndexBuild(format!("index build timed out after {}s", limit.as_secs())))?
        .map_err(|e| Error::IndexBuild(format!("index build task failed: {e}")))??;
    index.save(&settings.index.dir).await?;
    Ok(index)
}

/// Load the persisted index, rebuilding when it is missing, corrupt, was
/// made with a different embedder, or no longer matches the document and
/// chunking settings. An unreadable document skips the source check.
pub async fn load_or_build(settings: &Settings, embedder: Arc<dyn Embedder>) -> Result<VectorIndex> {
    let expected = match tokio::fs::read(&settings.document.path).await {
        Ok(bytes) => Some(source_fingerprint(&bytes, &settings.chunking)),
        Err(e) => {
            warn!(document = %settings.document.path.display(), error = %e, "document unreadable; reusing saved index as is");
            None
        }
    };
    let loaded = VectorIndex::load(&settings.index.dir, Arc::clone(&embedder))
        .await
        .and_then(|index| check_source(index, expected.as_deref()));
    match loaded {
        Ok(index) => Ok(index),
        Err(e) if e.is_index_load() => {
            warn!(error = %e, "no usable persisted index; rebuilding from document");
            rebuild_index(settings, embedder).await
        }
        Err(e) => Err(e),
    }
}

fn check_source(index: VectorIndex, expected: Option<&str>) -> Result<VectorIndex> {
    match expected {
        Some(expected) if index.source() != Some(expected) => {
            Err(Error::IndexLoad("index was built from a different document or chunking settings".into()))
        }
        _ => Ok(index),
    }
}

/// Ready-to-query engine for `settings`. Installs the OpenAI model when an
/// API key is available.
pub async fn open_engine(settings: &Settings, rebuild: bool) -> Result<QaEngine> {
    settings.validate()?;
    let embedder =
        load_embedder(&settings.embedding).map_err(|e| Error::IndexBuild(format!("loading embedder: {e:#}")))?;
    let index = if rebuild {
        rebuild_index(settings, embedder).await?
    } else {
        load_or_build(settings, embedder).await?
    };

    let engine = QaEngine::new(Arc::new(index), settings);
    if has_api_key() {
        let model: Arc<dyn LanguageModel> = Arc::new(OpenAiModel::from_settings(&settings.llm)?);
        engine.install_language_model(Some(model));
    }
    Ok(engine)
}
