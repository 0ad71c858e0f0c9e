use crate::embedding_service::cosine_similarity;
use crate::models::*;
use anyhow::{Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
    UInt32Array,
};
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection, DistanceType, Table};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Append-only store of embedded chunks with similarity search.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn add(&self, records: Vec<VectorRecord>) -> Result<()>;

    /// Returns at most `k` records scoring strictly above `threshold`, best
    /// first. No match is an empty result, not an error.
    async fn search(&self, query: &[f32], k: usize, threshold: f32) -> Result<Vec<ScoredRecord>>;

    async fn len(&self) -> Result<usize>;
}

const TABLE_NAME: &str = "chunks";
const VECTOR_COLUMN: &str = "vector";

/// Schema of the chunks table. The vector width is fixed by the first batch
/// ever written.
fn chunks_schema(vector_dim: usize) -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("text", DataType::Utf8, false),
        Field::new("source", DataType::Utf8, false),
        Field::new("page", DataType::UInt32, false),
        Field::new(
            VECTOR_COLUMN,
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                vector_dim as i32,
            ),
            true,
        ),
    ]))
}

/// LanceDB table under the configured directory. Each write commits a new
/// table version, so a crashed or concurrent upload never leaves a half
/// written row behind for readers.
pub struct LanceVectorStore {
    path: PathBuf,
    connection: Connection,
    // Only one writer may create the table or append at a time.
    write_lock: Mutex<()>,
}

impl LanceVectorStore {
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let path = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&path)
            .await
            .with_context(|| format!("failed to create index directory {}", path.display()))?;

        log::info!("Opening LanceDB at {}", path.display());
        let connection = connect(path.to_string_lossy().as_ref())
            .execute()
            .await
            .with_context(|| format!("failed to open index at {}", path.display()))?;

        Ok(Self {
            path,
            connection,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The chunks table, or `None` before the first upload.
    async fn table(&self) -> Result<Option<Table>> {
        let names = self.connection.table_names().execute().await?;
        if !names.iter().any(|name| name == TABLE_NAME) {
            return Ok(None);
        }
        Ok(Some(self.connection.open_table(TABLE_NAME).execute().await?))
    }
}

#[async_trait]
impl VectorIndex for LanceVectorStore {
    async fn add(&self, records: Vec<VectorRecord>) -> Result<()> {
        let Some(first) = records.first() else {
            return Ok(());
        };
        let dim = first.embedding.len();
        anyhow::ensure!(dim > 0, "cannot index an empty embedding");
        anyhow::ensure!(
            records.iter().all(|r| r.embedding.len() == dim),
            "records in one batch have different embedding sizes"
        );

        let schema = chunks_schema(dim);
        let batch = records_to_batch(&records, schema.clone())?;
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        let _guard = self.write_lock.lock().await;
        match self.table().await? {
            Some(table) => {
                let indexed = vector_dim(&*table.schema().await?)?;
                anyhow::ensure!(
                    indexed == dim,
                    "embedding size {} does not match the index ({})",
                    dim,
                    indexed
                );
                table.add(Box::new(batches)).execute().await?;
            }
            None => {
                log::info!("Creating {} table ({} dimensions)", TABLE_NAME, dim);
                self.connection
                    .create_table(TABLE_NAME, Box::new(batches))
                    .execute()
                    .await?;
            }
        }

        log::info!("Appended {} records to {}", records.len(), self.path.display());
        Ok(())
    }

    async fn search(&self, query: &[f32], k: usize, threshold: f32) -> Result<Vec<ScoredRecord>> {
        let Some(table) = self.table().await? else {
            return Ok(Vec::new());
        };
        if k == 0 {
            return Ok(Vec::new());
        }

        let batches: Vec<RecordBatch> = table
            .vector_search(query.to_vec())?
            .column(VECTOR_COLUMN)
            .distance_type(DistanceType::Cosine)
            .limit(k)
            .execute()
            .await?
            .try_collect()
            .await?;

        let mut hits = Vec::new();
        for batch in &batches {
            for record in batch_to_records(batch)? {
                let score = cosine_similarity(query, &record.embedding);
                hits.push(ScoredRecord { record, score });
            }
        }
        hits.retain(|hit| hit.score > threshold);
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);

        log::info!("Found {} relevant chunks", hits.len());
        Ok(hits)
    }

    async fn len(&self) -> Result<usize> {
        match self.table().await? {
            Some(table) => Ok(table.count_rows(None).await?),
            None => Ok(0),
        }
    }
}

fn vector_dim(schema: &Schema) -> Result<usize> {
    match schema.field_with_name(VECTOR_COLUMN)?.data_type() {
        DataType::FixedSizeList(_, size) => Ok(*size as usize),
        other => anyhow::bail!("unexpected type for column {}: {}", VECTOR_COLUMN, other),
    }
}

fn records_to_batch(records: &[VectorRecord], schema: SchemaRef) -> Result<RecordBatch> {
    let dim = vector_dim(&schema)?;

    let ids = StringArray::from(records.iter().map(|r| r.id.to_string()).collect::<Vec<_>>());
    let texts = StringArray::from(records.iter().map(|r| r.text.clone()).collect::<Vec<_>>());
    let sources = StringArray::from(
        records
            .iter()
            .map(|r| r.metadata.source.clone())
            .collect::<Vec<_>>(),
    );
    let pages = UInt32Array::from(records.iter().map(|r| r.metadata.page).collect::<Vec<_>>());

    let values = Float32Array::from(
        records
            .iter()
            .flat_map(|r| r.embedding.iter().copied())
            .collect::<Vec<_>>(),
    );
    let item = Arc::new(Field::new("item", DataType::Float32, true));
    let vectors = FixedSizeListArray::try_new(item, dim as i32, Arc::new(values), None)?;

    Ok(RecordBatch::try_new(
        schema,
        vec![
            Arc::new(ids),
            Arc::new(texts),
            Arc::new(sources),
            Arc::new(pages),
            Arc::new(vectors),
        ],
    )?)
}

fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| anyhow::anyhow!("index rows are missing column {}", name))
}

/// Rows without a page are an error, never skipped.
fn batch_to_records(batch: &RecordBatch) -> Result<Vec<VectorRecord>> {
    let ids = column::<StringArray>(batch, "id")?;
    let texts = column::<StringArray>(batch, "text")?;
    let sources = column::<StringArray>(batch, "source")?;
    let pages = column::<UInt32Array>(batch, "page")?;
    let vectors = column::<FixedSizeListArray>(batch, VECTOR_COLUMN)?;

    (0..batch.num_rows())
        .map(|row| {
            anyhow::ensure!(!pages.is_null(row), "index row {} has no page", row);
            let embedding = vectors
                .value(row)
                .as_any()
                .downcast_ref::<Float32Array>()
                .map(|values| values.values().to_vec())
                .ok_or_else(|| anyhow::anyhow!("index row {} has no vector", row))?;

            Ok(VectorRecord {
                id: Uuid::parse_str(ids.value(row))
                    .with_context(|| format!("index row {} has a bad id", row))?,
                embedding,
                text: texts.value(row).to_string(),
                metadata: DocumentMetadata {
                    source: sources.value(row).to_string(),
                    page: pages.value(row),
                },
            })
        })
        .collect()
}
