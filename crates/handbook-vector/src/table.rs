//! LanceDB connection and housekeeping helpers.
//!
//! Opens databases, creates tables from record batches and reads/writes the
//! key/value metadata table stamped onto every saved index.
use anyhow::{anyhow, Result};
use arrow_array::{Array, RecordBatch, RecordBatchIterator, StringArray, TimestampMillisecondArray};
use arrow_schema::Schema;
use chrono::Utc;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::schema::build_meta_schema;

pub async fn open_db(path: &Path) -> Result<Connection> {
	Ok(connect(path.to_string_lossy().as_ref()).execute().await?)
}

pub async fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
	Ok(conn.table_names().execute().await?.iter().any(|n| n == name))
}

/// Create `name` from `batches`; an empty batch list creates an empty table.
pub async fn create_table(conn: &Connection, name: &str, schema: Arc<Schema>, batches: Vec<RecordBatch>) -> Result<()> {
	let iter = RecordBatchIterator::new(batches.into_iter().map(Ok), schema);
	conn.create_table(name, Box::new(iter)).execute().await?;
	Ok(())
}

pub async fn write_meta(conn: &Connection, table: &str, entries: &[(&str, String)]) -> Result<()> {
	let now = Utc::now().timestamp_millis();
	let rb = RecordBatch::try_new(
		build_meta_schema(),
		vec![
			Arc::new(StringArray::from(entries.iter().map(|(k, _)| k.to_string()).collect::<Vec<_>>())),
			Arc::new(StringArray::from(entries.iter().map(|(_, v)| v.clone()).collect::<Vec<_>>())),
			Arc::new(TimestampMillisecondArray::from(vec![now; entries.len()])),
		],
	)?;
	create_table(conn, table, build_meta_schema(), vec![rb]).await
}

/// All meta rows; `None` when the table does not exist.
pub async fn read_meta(conn: &Connection, table: &str) -> Result<Option<HashMap<String, String>>> {
	if !table_exists(conn, table).await? {
		return Ok(None);
	}
	let t = conn.open_table(table).execute().await?;
	let rows = t.count_rows(None).await?;
	let mut stream = t.query().limit(rows.max(1)).execute().await?;
	let mut out = HashMap::new();
	while let Some(batch) = stream.try_next().await? {
		let keys = string_column(&batch, "key")?;
		let values = string_column(&batch, "value")?;
		for i in 0..batch.num_rows() {
			out.insert(keys.value(i).to_string(), values.value(i).to_string());
		}
	}
	Ok(Some(out))
}

pub(crate) fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
	batch
		.column_by_name(name)
		.and_then(|c| c.as_any().downcast_ref::<StringArray>())
		.ok_or_else(|| anyhow!("column '{name}' missing or not utf8"))
}

pub(crate) fn optional_string(arr: &StringArray, i: usize) -> Option<String> {
	if arr.is_null(i) { None } else { Some(arr.value(i).to_string()) }
}
