use anyhow::{anyhow, Result};
use arrow_array::{Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::Connection;

use handbook_core::types::{Chunk, ChunkMetadata, IndexedVector};

use crate::schema::CHUNKS_TABLE;
use crate::table::{optional_string, string_column};

/// Read every stored chunk, ordered by `chunk_index`.
pub async fn read_chunks(conn: &Connection) -> Result<Vec<IndexedVector>> {
	let table = conn.open_table(CHUNKS_TABLE).execute().await?;
	let rows = table.count_rows(None).await?;
	let mut entries = Vec::with_capacity(rows);
	if rows == 0 {
		return Ok(entries);
	}
	let mut stream = table.query().limit(rows).execute().await?;
	while let Some(batch) = stream.try_next().await? {
		batch_to_entries(&batch, &mut entries)?;
	}
	entries.sort_by_key(|e| e.chunk.metadata.chunk_index);
	Ok(entries)
}

fn batch_to_entries(batch: &RecordBatch, out: &mut Vec<IndexedVector>) -> Result<()> {
	let chunk_indices = int_column(batch, "chunk_index")?;
	let pages = int_column(batch, "source_page")?;
	let sections = string_column(batch, "section")?;
	let names = string_column(batch, "source_name")?;
	let contents = string_column(batch, "content")?;
	let vectors = batch
		.column_by_name("vector")
		.and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
		.ok_or_else(|| anyhow!("column 'vector' missing or not a fixed-size list"))?;

	for i in 0..batch.num_rows() {
		if vectors.is_null(i) {
			return Err(anyhow!("row {i} has no vector"));
		}
		let values = vectors.value(i);
		let floats = values
			.as_any()
			.downcast_ref::<Float32Array>()
			.ok_or_else(|| anyhow!("vector items are not f32"))?;
		out.push(IndexedVector {
			vector: floats.values().to_vec(),
			chunk: Chunk {
				content: contents.value(i).to_string(),
				metadata: ChunkMetadata {
					source_page: u32::try_from(pages.value(i)).map_err(|_| anyhow!("bad page number at row {i}"))?,
					section: optional_string(sections, i),
					chunk_index: usize::try_from(chunk_indices.value(i)).map_err(|_| anyhow!("bad chunk_index at row {i}"))?,
					source_name: names.value(i).to_string(),
				},
			},
		});
	}
	Ok(())
}

fn int_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Int64Array> {
	batch
		.column_by_name(name)
		.and_then(|c| c.as_any().downcast_ref::<Int64Array>())
		.ok_or_else(|| anyhow!("column '{name}' missing or not int64"))
}
