//! In-memory nearest-neighbour index over chunk embeddings.
//!
//! Vectors live in memory and are searched exhaustively by squared L2
//! distance. Persistence goes through LanceDB: a `chunks` table with one row
//! per chunk and a `meta` table stamping format version, embedder identity,
//! dimension, row count, a blake3 digest of the contents and, when known, a
//! fingerprint of the source document the chunks came from.
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, warn};

use handbook_core::error::{Error, Result};
use handbook_core::traits::Embedder;
use handbook_core::types::{Chunk, IndexedVector, RetrievedChunk};

use crate::reader::read_chunks;
use crate::schema::{CHUNKS_TABLE, META_TABLE};
use crate::table::{open_db, read_meta, table_exists, write_meta};
use crate::writer::write_chunks;

pub const FORMAT_VERSION: &str = "1";
const EMBED_BATCH: usize = 64;

pub struct VectorIndex {
	embedder: Arc<dyn Embedder>,
	dim: usize,
	entries: Vec<IndexedVector>,
	source: Option<String>,
}

impl VectorIndex {
	/// Embed every chunk. Any embedding failure aborts the whole build.
	pub fn build(chunks: &[Chunk], embedder: Arc<dyn Embedder>) -> Result<Self> {
		let dim = embedder.dim();
		if chunks.is_empty() {
			warn!("building an empty vector index");
			return Ok(Self { embedder, dim, entries: Vec::new(), source: None });
		}
		info!(chunks = chunks.len(), model = embedder.model_id(), dim, "building vector index");

		let pb = ProgressBar::new(chunks.len() as u64);
		pb.set_style(
			ProgressStyle::default_bar()
				.template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%) {msg}")
				.map(|s| s.progress_chars("#>-"))
				.unwrap_or_else(|_| ProgressStyle::default_bar()),
		);

		let mut entries = Vec::with_capacity(chunks.len());
		for part in chunks.chunks(EMBED_BATCH) {
			let texts: Vec<String> = part.iter().map(|c| c.content.clone()).collect();
			let vectors = embedder
				.embed_batch(&texts)
				.map_err(|e| Error::IndexBuild(format!("embedding chunks: {e:#}")))?;
			if vectors.len() != part.len() {
				return Err(Error::IndexBuild(format!(
					"embedder returned {} vectors for {} chunks",
					vectors.len(),
					part.len()
				)));
			}
			for (chunk, vector) in part.iter().zip(vectors) {
				check_vector(&vector, dim).map_err(Error::IndexBuild)?;
				entries.push(IndexedVector { vector, chunk: chunk.clone() });
			}
			pb.inc(part.len() as u64);
		}
		pb.finish_with_message("index built");
		info!(entries = entries.len(), "vector index built");
		Ok(Self { embedder, dim, entries, source: None })
	}

	/// Wrap already-embedded entries, checking they match `embedder`.
	pub fn from_entries(entries: Vec<IndexedVector>, embedder: Arc<dyn Embedder>) -> Result<Self> {
		let dim = embedder.dim();
		for e in &entries {
			check_vector(&e.vector, dim)
				.map_err(|m| Error::IndexBuild(format!("chunk {}: {m}", e.chunk.metadata.chunk_index)))?;
		}
		Ok(Self { embedder, dim, entries, source: None })
	}

	/// Tag the index with a fingerprint of the document and chunking
	/// settings it was built from. Saved with the index and returned by
	/// [`VectorIndex::source`] after a load.
	pub fn with_source(mut self, fingerprint: impl Into<String>) -> Self {
		self.source = Some(fingerprint.into());
		self
	}

	pub fn source(&self) -> Option<&str> { self.source.as_deref() }

	pub fn len(&self) -> usize { self.entries.len() }
	pub fn is_empty(&self) -> bool { self.entries.is_empty() }
	pub fn dim(&self) -> usize { self.dim }
	pub fn model_id(&self) -> &str { self.embedder.model_id() }
	pub fn entries(&self) -> &[IndexedVector] { &self.entries }

	/// The `k` chunks nearest to `text`, best first.
	pub fn query(&self, text: &str, k: usize) -> Result<Vec<RetrievedChunk>> {
		if k == 0 || self.entries.is_empty() {
			return Ok(Vec::new());
		}
		let q = self
			.embedder
			.embed(text)
			.map_err(|e| Error::Retrieval(format!("embedding query: {e:#}")))?;
		if q.len() != self.dim {
			return Err(Error::Retrieval(format!("query vector has {} dims, index has {}", q.len(), self.dim)));
		}
		Ok(self.search_vec(&q, k))
	}

	/// Exhaustive search; ties on distance resolve by `chunk_index`.
	pub fn search_vec(&self, q: &[f32], k: usize) -> Vec<RetrievedChunk> {
		let mut scored: Vec<(f32, &IndexedVector)> = self
			.entries
			.iter()
			.map(|e| (squared_l2(q, &e.vector), e))
			.filter(|(score, _)| score.is_finite())
			.collect();
		scored.sort_by(|a, b| {
			a.0.total_cmp(&b.0)
				.then_with(|| a.1.chunk.metadata.chunk_index.cmp(&b.1.chunk.metadata.chunk_index))
		});
		scored
			.into_iter()
			.take(k)
			.map(|(score, e)| RetrievedChunk { chunk: e.chunk.clone(), score })
			.collect()
	}

	/// Hex blake3 over every entry's metadata, text and vector.
	pub fn digest(&self) -> String {
		let mut h = blake3::Hasher::new();
		for e in &self.entries {
			let m = &e.chunk.metadata;
			h.update(&(m.chunk_index as u64).to_le_bytes());
			h.update(&m.source_page.to_le_bytes());
			match &m.section {
				Some(s) => {
					h.update(&[1]);
					hash_str(&mut h, s);
				}
				None => {
					h.update(&[0]);
				}
			}
			hash_str(&mut h, &m.source_name);
			hash_str(&mut h, &e.chunk.content);
			for x in &e.vector {
				h.update(&x.to_le_bytes());
			}
		}
		h.finalize().to_hex().to_string()
	}

	fn meta_entries(&self) -> Vec<(&'static str, String)> {
		let mut meta = vec![
			("format_version", FORMAT_VERSION.to_string()),
			("embedder_id", self.model_id().to_string()),
			("dim", self.dim.to_string()),
			("chunk_count", self.entries.len().to_string()),
			("digest", self.digest()),
			("created_at", chrono::Utc::now().to_rfc3339()),
		];
		if let Some(source) = &self.source {
			meta.push(("source", source.clone()));
		}
		meta
	}

	/// Persist to `dir`. The index is written to a sibling staging directory
	/// and renamed into place, so `dir` holds either the old or the new index.
	pub async fn save(&self, dir: &Path) -> Result<()> {
		let (staging, backup) = sibling_paths(dir).await.map_err(Error::IndexBuild)?;
		if exists(&staging).await {
			fs::remove_dir_all(&staging).await.map_err(|e| save_error(&staging, e))?;
		}
		fs::create_dir_all(&staging).await.map_err(|e| save_error(&staging, e))?;

		if let Err(e) = self.write_to(&staging).await {
			let _ = fs::remove_dir_all(&staging).await;
			return Err(save_error(dir, format!("{e:#}")));
		}

		if exists(&backup).await {
			fs::remove_dir_all(&backup).await.map_err(|e| save_error(&backup, e))?;
		}
		if exists(dir).await {
			fs::rename(dir, &backup).await.map_err(|e| save_error(dir, e))?;
		}
		if let Err(e) = fs::rename(&staging, dir).await {
			if exists(&backup).await {
				let _ = fs::rename(&backup, dir).await;
			}
			return Err(save_error(dir, e));
		}
		if exists(&backup).await {
			if let Err(e) = fs::remove_dir_all(&backup).await {
				warn!(path = %backup.display(), error = %e, "could not remove previous index");
			}
		}
		info!(dir = %dir.display(), entries = self.entries.len(), "vector index saved");
		Ok(())
	}

	async fn write_to(&self, dir: &Path) -> anyhow::Result<()> {
		let conn = open_db(dir).await?;
		write_chunks(&conn, &self.entries, self.dim).await?;
		write_meta(&conn, META_TABLE, &self.meta_entries()).await?;
		Ok(())
	}

	/// Load an index saved by [`VectorIndex::save`]. Fails with
	/// `Error::IndexLoad` when the directory is missing, was produced by a
	/// different embedder, or does not match its recorded digest.
	pub async fn load(dir: &Path, embedder: Arc<dyn Embedder>) -> Result<Self> {
		if !fs::metadata(dir).await.is_ok_and(|m| m.is_dir()) {
			return Err(Error::IndexLoad(format!("no index at {}", dir.display())));
		}
		let conn = open_db(dir).await.map_err(load_error)?;
		let meta = read_meta(&conn, META_TABLE)
			.await
			.map_err(load_error)?
			.ok_or_else(|| Error::IndexLoad(format!("{} has no metadata table", dir.display())))?;

		expect_meta(&meta, "format_version", FORMAT_VERSION)?;
		expect_meta(&meta, "embedder_id", embedder.model_id())?;
		expect_meta(&meta, "dim", &embedder.dim().to_string())?;
		let count: usize = meta_value(&meta, "chunk_count")?
			.parse()
			.map_err(|_| Error::IndexLoad("chunk_count is not a number".into()))?;

		if !table_exists(&conn, CHUNKS_TABLE).await.map_err(load_error)? {
			return Err(Error::IndexLoad(format!("{} has no chunks table", dir.display())));
		}
		let entries = read_chunks(&conn).await.map_err(load_error)?;
		if entries.len() != count {
			return Err(Error::IndexLoad(format!("expected {count} chunks, found {}", entries.len())));
		}

		let mut index = Self::from_entries(entries, embedder).map_err(|e| Error::IndexLoad(e.to_string()))?;
		index.source = meta.get("source").cloned();
		let digest = index.digest();
		expect_meta(&meta, "digest", &digest)?;
		debug!(created_at = meta.get("created_at").map(String::as_str).unwrap_or("?"), "index metadata verified");
		info!(dir = %dir.display(), entries = index.len(), "vector index loaded");
		Ok(index)
	}
}

fn check_vector(v: &[f32], dim: usize) -> std::result::Result<(), String> {
	if v.len() != dim {
		return Err(format!("vector has {} dims, expected {dim}", v.len()));
	}
	if v.iter().any(|x| !x.is_finite()) {
		return Err("vector contains non-finite values".to_string());
	}
	Ok(())
}

pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
	if a.len() != b.len() {
		return f32::NAN;
	}
	a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn hash_str(h: &mut blake3::Hasher, s: &str) {
	h.update(&(s.len() as u64).to_le_bytes());
	h.update(s.as_bytes());
}

async fn exists(path: &Path) -> bool {
	fs::try_exists(path).await.unwrap_or(false)
}

async fn sibling_paths(dir: &Path) -> std::result::Result<(PathBuf, PathBuf), String> {
	let name = dir
		.file_name()
		.ok_or_else(|| format!("index path {} has no directory name", dir.display()))?
		.to_string_lossy()
		.to_string();
	let parent = match dir.parent() {
		Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
		_ => PathBuf::from("."),
	};
	fs::create_dir_all(&parent).await.map_err(|e| format!("creating {}: {e}", parent.display()))?;
	Ok((parent.join(format!(".{name}.staging")), parent.join(format!(".{name}.previous"))))
}

fn save_error(path: &Path, e: impl std::fmt::Display) -> Error {
	Error::IndexBuild(format!("saving index at {}: {e}", path.display()))
}

fn load_error(e: anyhow::Error) -> Error {
	Error::IndexLoad(format!("{e:#}"))
}

fn meta_value<'a>(meta: &'a HashMap<String, String>, key: &str) -> Result<&'a str> {
	meta.get(key)
		.map(String::as_str)
		.ok_or_else(|| Error::IndexLoad(format!("metadata key '{key}' missing")))
}

fn expect_meta(meta: &HashMap<String, String>, key: &str, expected: &str) -> Result<()> {
	let found = meta_value(meta, key)?;
	if found != expected {
		return Err(Error::IndexLoad(format!("{key} mismatch: index has '{found}', expected '{expected}'")));
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use handbook_core::types::ChunkMetadata;

	struct AxisEmbedder;

	impl Embedder for AxisEmbedder {
		fn model_id(&self) -> &str { "axis" }
		fn dim(&self) -> usize { 2 }
		fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
			Ok(texts.iter().map(|t| vec![t.len() as f32, 0.0]).collect())
		}
	}

	fn chunk(i: usize, text: &str) -> Chunk {
		Chunk {
			content: text.to_string(),
			metadata: ChunkMetadata { source_page: 1, section: None, chunk_index: i, source_name: "h.txt".into() },
		}
	}

	#[test]
	fn nearest_first_with_index_tiebreak() {
		let chunks = vec![chunk(0, "aaaa"), chunk(1, "aa"), chunk(2, "bb"), chunk(3, "aaaaaaaa")];
		let index = VectorIndex::build(&chunks, Arc::new(AxisEmbedder)).unwrap();
		let hits = index.query("xx", 3).unwrap();
		let order: Vec<usize> = hits.iter().map(|h| h.chunk.metadata.chunk_index).collect();
		assert_eq!(order, vec![1, 2, 0]);
		assert_eq!(hits[0].score, 0.0);
		assert_eq!(hits[2].score, 4.0);
	}

	#[test]
	fn k_larger_than_index_returns_everything() {
		let index = VectorIndex::build(&[chunk(0, "a"), chunk(1, "b")], Arc::new(AxisEmbedder)).unwrap();
		assert_eq!(index.query("q", 10).unwrap().len(), 2);
		assert!(index.query("q", 0).unwrap().is_empty());
	}

	#[test]
	fn digest_changes_with_content() {
		let a = VectorIndex::build(&[chunk(0, "same")], Arc::new(AxisEmbedder)).unwrap();
		let b = VectorIndex::build(&[chunk(0, "diff")], Arc::new(AxisEmbedder)).unwrap();
		assert_ne!(a.digest(), b.digest());
	}

	#[test]
	fn wrong_dimension_is_a_build_error() {
		let bad = IndexedVector { vector: vec![1.0; 3], chunk: chunk(0, "x") };
		let err = VectorIndex::from_entries(vec![bad], Arc::new(AxisEmbedder)).err();
		assert!(matches!(err, Some(Error::IndexBuild(_))));
	}
}
