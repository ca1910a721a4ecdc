use anyhow::{anyhow, Result};
use arrow_array::{FixedSizeListArray, Int64Array, RecordBatch, StringArray};
use lancedb::Connection;
use std::sync::Arc;
use tracing::debug;

use handbook_core::types::IndexedVector;

use crate::schema::{build_chunks_schema, CHUNKS_TABLE};
use crate::table::create_table;

const WRITE_BATCH: usize = 1000;

pub fn entries_to_record_batch(entries: &[IndexedVector], dim: usize) -> Result<RecordBatch> {
	let dim_i32 = i32::try_from(dim).map_err(|_| anyhow!("dimension {dim} too large"))?;
	let mut chunk_indices = Vec::with_capacity(entries.len());
	let mut pages = Vec::with_capacity(entries.len());
	let mut sections = Vec::with_capacity(entries.len());
	let mut names = Vec::with_capacity(entries.len());
	let mut contents = Vec::with_capacity(entries.len());
	let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::with_capacity(entries.len());
	for e in entries {
		let meta = &e.chunk.metadata;
		chunk_indices.push(meta.chunk_index as i64);
		pages.push(i64::from(meta.source_page));
		sections.push(meta.section.clone());
		names.push(meta.source_name.clone());
		contents.push(e.chunk.content.clone());
		vectors.push(Some(e.vector.iter().map(|&x| Some(x)).collect()));
	}
	let record_batch = RecordBatch::try_new(
		build_chunks_schema(dim_i32),
		vec![
			Arc::new(Int64Array::from(chunk_indices)),
			Arc::new(Int64Array::from(pages)),
			Arc::new(StringArray::from(sections)),
			Arc::new(StringArray::from(names)),
			Arc::new(StringArray::from(contents)),
			Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(vectors.into_iter(), dim_i32)),
		],
	)?;
	Ok(record_batch)
}

/// Write every entry into a fresh chunks table.
pub async fn write_chunks(conn: &Connection, entries: &[IndexedVector], dim: usize) -> Result<()> {
	let dim_i32 = i32::try_from(dim).map_err(|_| anyhow!("dimension {dim} too large"))?;
	let batches = entries
		.chunks(WRITE_BATCH)
		.map(|part| entries_to_record_batch(part, dim))
		.collect::<Result<Vec<_>>>()?;
	debug!(rows = entries.len(), batches = batches.len(), "writing chunk table");
	create_table(conn, CHUNKS_TABLE, build_chunks_schema(dim_i32), batches).await
}
