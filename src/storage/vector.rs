//! Passage index using LanceDB for nearest-neighbour lookup

use std::sync::Arc;

use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lance_arrow::FixedSizeListArrayExt;
use lancedb::connect;
use lancedb::query::{ExecutableQuery, QueryBase};

use crate::config::Config;
use crate::error::{Error, Result};

/// A reference passage as stored in the index
#[derive(Debug, Clone, PartialEq)]
pub struct Passage {
    pub id: String,
    pub text: Option<String>,
    pub vector: Vec<f32>,
}

/// One hit from a nearest-neighbour query
#[derive(Debug, Clone, PartialEq)]
pub struct QueryMatch {
    pub id: String,
    /// `metadata.text` of the passage, if it has any
    pub text: Option<String>,
    /// Distance to the query vector, smaller is closer
    pub distance: f32,
}

impl QueryMatch {
    /// Similarity in (0, 1], derived from the L2 distance
    pub fn score(&self) -> f32 {
        1.0 / (1.0 + self.distance)
    }
}

/// Nearest-neighbour lookup over stored passages
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Up to `k` matches ordered by ascending distance
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<QueryMatch>>;

    /// Dimension of the stored vectors
    fn dimensions(&self) -> usize;
}

/// Vector index backend using LanceDB
pub struct LanceIndex {
    db: lancedb::Connection,
    table_name: String,
    dimensions: usize,
}

impl LanceIndex {
    /// Open an existing passage collection.
    ///
    /// A missing collection, or one whose vectors do not have the configured
    /// dimension, is an error.
    pub async fn open(config: &Config) -> Result<Self> {
        let index = Self::connect(config).await?;

        if !index.table_exists().await? {
            return Err(Error::vector_db(format!(
                "Collection '{}' not found in {}",
                index.table_name,
                config.vector_db_path().display()
            )));
        }

        let stored = index.stored_dimensions().await?;
        if stored != index.dimensions {
            return Err(Error::vector_db(format!(
                "Collection '{}' holds {}-dimensional vectors, expected {}",
                index.table_name, stored, index.dimensions
            )));
        }

        Ok(index)
    }

    /// Replace the collection with `passages`, creating it if needed
    pub async fn create(config: &Config, passages: &[Passage]) -> Result<Self> {
        if passages.is_empty() {
            return Err(Error::invalid_input("No passages to index"));
        }

        let index = Self::connect(config).await?;

        if index.table_exists().await? {
            index
                .db
                .drop_table(&index.table_name)
                .await
                .map_err(|e| Error::vector_db(e.to_string()))?;
        }

        let schema = Arc::new(index.schema());
        let batch = index.passages_to_batch(passages)?;
        let reader = RecordBatchIterator::new(vec![batch].into_iter().map(Ok), schema);

        index
            .db
            .create_table(&index.table_name, Box::new(reader))
            .execute()
            .await
            .map_err(|e| Error::vector_db(e.to_string()))?;

        tracing::info!(
            collection = %index.table_name,
            passages = passages.len(),
            "passage collection written"
        );

        Ok(index)
    }

    async fn connect(config: &Config) -> Result<Self> {
        let path = config.vector_db_path();
        let uri = path
            .to_str()
            .ok_or_else(|| Error::config(format!("Non UTF-8 vector db path: {}", path.display())))?;

        let db = connect(uri)
            .execute()
            .await
            .map_err(|e| Error::vector_db(e.to_string()))?;

        Ok(Self {
            db,
            table_name: config.collection.clone(),
            dimensions: config.embedding_dimensions,
        })
    }

    async fn table_exists(&self) -> Result<bool> {
        let tables = self
            .db
            .table_names()
            .execute()
            .await
            .map_err(|e| Error::vector_db(e.to_string()))?;

        Ok(tables.contains(&self.table_name))
    }

    async fn stored_dimensions(&self) -> Result<usize> {
        let table = self
            .db
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| Error::vector_db(e.to_string()))?;
        let schema = table
            .schema()
            .await
            .map_err(|e| Error::vector_db(e.to_string()))?;
        let field = schema
            .field_with_name("vector")
            .map_err(|e| Error::vector_db(e.to_string()))?;

        match field.data_type() {
            DataType::FixedSizeList(_, size) => Ok(*size as usize),
            other => Err(Error::vector_db(format!(
                "vector column has unexpected type {}",
                other
            ))),
        }
    }

    /// Get the schema for the passages table
    fn schema(&self) -> Schema {
        Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("text", DataType::Utf8, true),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.dimensions as i32,
                ),
                false,
            ),
        ])
    }

    fn passages_to_batch(&self, passages: &[Passage]) -> Result<RecordBatch> {
        let mut values = Vec::with_capacity(passages.len() * self.dimensions);
        for passage in passages {
            if passage.vector.len() != self.dimensions {
                return Err(Error::vector_db(format!(
                    "Embedding dimension mismatch for passage {}: expected {}, got {}",
                    passage.id,
                    self.dimensions,
                    passage.vector.len()
                )));
            }
            values.extend_from_slice(&passage.vector);
        }

        let id_array = StringArray::from(passages.iter().map(|p| p.id.clone()).collect::<Vec<_>>());
        let text_array =
            StringArray::from(passages.iter().map(|p| p.text.clone()).collect::<Vec<_>>());
        let vector_array = FixedSizeListArray::try_new_from_values(
            Float32Array::from(values),
            self.dimensions as i32,
        )
        .map_err(|e: arrow_schema::ArrowError| Error::vector_db(e.to_string()))?;

        RecordBatch::try_new(
            Arc::new(self.schema()),
            vec![
                Arc::new(id_array) as Arc<dyn Array>,
                Arc::new(text_array),
                Arc::new(vector_array),
            ],
        )
        .map_err(|e| Error::vector_db(e.to_string()))
    }
}

#[async_trait]
impl VectorIndex for LanceIndex {
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<QueryMatch>> {
        if vector.len() != self.dimensions {
            return Err(Error::vector_db(format!(
                "Query dimension mismatch: expected {}, got {}",
                self.dimensions,
                vector.len()
            )));
        }

        let table = self
            .db
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e: lancedb::Error| Error::vector_db(e.to_string()))?;

        let stream = table
            .vector_search(vector.to_vec())
            .map_err(|e: lancedb::Error| Error::vector_db(e.to_string()))?
            .limit(k)
            .execute()
            .await
            .map_err(|e: lancedb::Error| Error::vector_db(e.to_string()))?;

        let batches: Vec<RecordBatch> = stream
            .try_collect::<Vec<RecordBatch>>()
            .await
            .map_err(|e: lancedb::Error| Error::vector_db(e.to_string()))?;

        let mut matches = Vec::new();

        for batch in batches {
            let ids = string_column(&batch, "id")?;
            let texts = string_column(&batch, "text")?;
            let distances = batch
                .column_by_name("_distance")
                .ok_or_else(|| Error::vector_db("Missing _distance column"))?
                .as_any()
                .downcast_ref::<Float32Array>()
                .ok_or_else(|| Error::vector_db("_distance column is not Float32Array"))?;

            for i in 0..batch.num_rows() {
                matches.push(QueryMatch {
                    id: ids.value(i).to_string(),
                    text: (!texts.is_null(i)).then(|| texts.value(i).to_string()),
                    distance: distances.value(i),
                });
            }
        }

        // Stable, so equal distances keep the order LanceDB returned them in
        matches.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        matches.truncate(k);

        Ok(matches)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| Error::vector_db(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| Error::vector_db(format!("{} column is not StringArray", name)))
}
