//! LanceDB Vector Store - vector_document 릴레이션
//!
//! ANN (Approximate Nearest Neighbor) 검색을 제공합니다.
//! 행 수가 적을 때는 flat 검색, `min_rows` 이상이면 IVF-HNSW-SQ 인덱스를 사용합니다.
//! ref: https://lancedb.github.io/lancedb/
//!
//! 필터 텍스트(`only_if`, `delete`)는 모두 Query Builder의 `Condition`으로 만듭니다.

use std::path::Path;
use std::sync::Arc;

use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
};
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::index::vector::IvfHnswSqIndexBuilder;
use lancedb::index::Index;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::DistanceType;

use super::error::{WikiError, WikiResult};
use super::query::{check_vector, Condition, Literal};
use super::schema::{Distance, IndexConfig};
use super::vector::{VectorCounts, VectorHit, VectorRecord, VectorStatus, VectorStore};

/// 벡터 테이블 이름
const TABLE_NAME: &str = "vector_document";

/// 임베딩 컬럼 이름
const EMBEDDING_COLUMN: &str = "embedding";

// ============================================================================
// LanceVectorStore
// ============================================================================

/// LanceDB 벡터 저장소 구현
pub struct LanceVectorStore {
    db: Connection,
    dimension: usize,
    distance: Distance,
    ef_search: u32,
}

impl LanceVectorStore {
    /// LanceDB 저장소 열기
    ///
    /// # Arguments
    /// * `path` - .lance 디렉토리 경로
    /// * `config` - 인덱스 설정 (차원, 거리 함수)
    pub async fn open(path: &Path, config: &IndexConfig) -> WikiResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let path_str = path
            .to_str()
            .ok_or_else(|| WikiError::Schema(format!("invalid path encoding: {:?}", path)))?;

        let db = lancedb::connect(path_str).execute().await?;

        Ok(Self {
            db,
            dimension: config.dimension,
            distance: config.distance,
            ef_search: config.ef_search,
        })
    }

    /// vector_document 스키마
    fn schema(dimension: usize) -> Schema {
        Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("status", DataType::Utf8, false),
            Field::new(
                EMBEDDING_COLUMN,
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    dimension as i32,
                ),
                false,
            ),
            Field::new("updated_at", DataType::Utf8, false),
        ])
    }

    /// 레코드를 Arrow RecordBatch로 변환
    ///
    /// `Ready` 레코드는 차원/유한성 검증을 거치고, 나머지는 0 벡터로 채웁니다.
    fn record_to_batch(&self, record: &VectorRecord) -> WikiResult<RecordBatch> {
        let values = match record.status {
            VectorStatus::Ready => {
                check_vector(&record.embedding, self.dimension)?;
                record.embedding.clone()
            }
            VectorStatus::Pending | VectorStatus::Failed => vec![0.0; self.dimension],
        };

        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let embeddings = FixedSizeListArray::try_new(
            field,
            self.dimension as i32,
            Arc::new(Float32Array::from(values)) as Arc<dyn Array>,
            None,
        )?;

        let now = Utc::now().to_rfc3339();
        let batch = RecordBatch::try_new(
            Arc::new(Self::schema(self.dimension)),
            vec![
                Arc::new(StringArray::from(vec![record.id.as_str()])),
                Arc::new(StringArray::from(vec![record.status.as_str()])),
                Arc::new(embeddings),
                Arc::new(StringArray::from(vec![now.as_str()])),
            ],
        )?;

        Ok(batch)
    }

    /// RecordBatch에서 레코드 추출
    fn batch_to_records(batch: &RecordBatch) -> WikiResult<Vec<VectorRecord>> {
        let ids = string_column(batch, "id")?;
        let statuses = string_column(batch, "status")?;
        let embeddings = batch
            .column_by_name(EMBEDDING_COLUMN)
            .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
            .ok_or_else(|| missing_column(EMBEDDING_COLUMN))?;

        let mut records = Vec::with_capacity(batch.num_rows());
        for i in 0..batch.num_rows() {
            let status: VectorStatus = statuses
                .value(i)
                .parse()
                .map_err(WikiError::Schema)?;

            let embedding = match status {
                VectorStatus::Ready => {
                    let values = embeddings.value(i);
                    values
                        .as_any()
                        .downcast_ref::<Float32Array>()
                        .ok_or_else(|| missing_column(EMBEDDING_COLUMN))?
                        .values()
                        .to_vec()
                }
                _ => Vec::new(),
            };

            records.push(VectorRecord {
                id: ids.value(i).to_string(),
                embedding,
                status,
            });
        }

        Ok(records)
    }

    /// 테이블 존재 여부 확인
    async fn table_exists(&self) -> WikiResult<bool> {
        let names = self.db.table_names().execute().await?;
        Ok(names.iter().any(|n| n == TABLE_NAME))
    }

    async fn open_table(&self) -> WikiResult<lancedb::table::Table> {
        Ok(self.db.open_table(TABLE_NAME).execute().await?)
    }

    /// 필터에 맞는 레코드 조회
    async fn query_records(&self, filter: &Condition, limit: usize) -> WikiResult<Vec<VectorRecord>> {
        if !self.table_exists().await? {
            return Ok(vec![]);
        }

        let table = self.open_table().await?;
        let batches: Vec<RecordBatch> = table
            .query()
            .only_if(filter.render())
            .limit(limit)
            .execute()
            .await?
            .try_collect()
            .await?;

        let mut records = Vec::new();
        for batch in &batches {
            records.extend(Self::batch_to_records(batch)?);
        }
        Ok(records)
    }
}

#[async_trait]
impl VectorStore for LanceVectorStore {
    async fn ensure_relation(&self, config: &IndexConfig) -> WikiResult<()> {
        if self.table_exists().await? {
            return Ok(());
        }

        let schema: SchemaRef = Arc::new(Self::schema(config.dimension));
        match self.db.create_empty_table(TABLE_NAME, schema).execute().await {
            Ok(_) => {
                tracing::debug!("Created relation '{}'", TABLE_NAME);
                Ok(())
            }
            Err(lancedb::Error::TableAlreadyExists { .. }) => {
                tracing::debug!("Relation '{}' created concurrently", TABLE_NAME);
                Ok(())
            }
            Err(e) => {
                // 다른 초기화가 먼저 끝났으면 성공으로 취급
                if self.table_exists().await? {
                    tracing::warn!("Ignoring create race on '{}': {}", TABLE_NAME, e);
                    Ok(())
                } else {
                    Err(e.into())
                }
            }
        }
    }

    async fn stored_dimension(&self) -> WikiResult<Option<usize>> {
        if !self.table_exists().await? {
            return Ok(None);
        }

        let schema = self.open_table().await?.schema().await?;
        let field = schema.field_with_name(EMBEDDING_COLUMN)?;
        match field.data_type() {
            DataType::FixedSizeList(_, size) => Ok(Some(*size as usize)),
            other => Err(WikiError::Schema(format!(
                "unexpected embedding column type {:?}",
                other
            ))),
        }
    }

    async fn ensure_index(&self, config: &IndexConfig) -> WikiResult<bool> {
        if !self.table_exists().await? {
            return Ok(false);
        }

        let table = self.open_table().await?;

        let indices = table.list_indices().await?;
        if indices
            .iter()
            .any(|idx| idx.columns.iter().any(|c| c == EMBEDDING_COLUMN))
        {
            return Ok(false);
        }

        let rows = table.count_rows(None).await?;
        if rows < config.min_rows {
            tracing::debug!(
                "Skipping ANN index: {} rows (< {}), using flat search",
                rows,
                config.min_rows
            );
            return Ok(false);
        }

        let builder = IvfHnswSqIndexBuilder::default()
            .distance_type(distance_type(config.distance))
            .num_edges(config.m)
            .ef_construction(config.ef_construction);

        match table
            .create_index(&[EMBEDDING_COLUMN], Index::IvfHnswSq(builder))
            .execute()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.to_string().contains("already exists") => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn upsert(&self, record: &VectorRecord) -> WikiResult<()> {
        let batch = self.record_to_batch(record)?;
        let schema = batch.schema();
        let table = self.open_table().await?;

        // id 기준 merge: 있으면 교체, 없으면 삽입
        let reader = RecordBatchIterator::new(vec![Ok(batch)], schema);
        let mut merge = table.merge_insert(&["id"]);
        merge
            .when_matched_update_all(None)
            .when_not_matched_insert_all();
        merge.execute(Box::new(reader)).await?;

        tracing::debug!("Upserted vector record {} ({})", record.id, record.status);
        Ok(())
    }

    async fn get(&self, id: &str) -> WikiResult<Option<VectorRecord>> {
        let filter = Condition::eq("id", Literal::text(id)?);
        let mut records = self.query_records(&filter, 1).await?;
        Ok(records.pop())
    }

    async fn delete(&self, id: &str) -> WikiResult<usize> {
        if !self.table_exists().await? {
            return Ok(0);
        }

        let table = self.open_table().await?;
        let filter = Condition::eq("id", Literal::text(id)?).render();

        let existing = table.count_rows(Some(filter.clone())).await?;
        if existing > 0 {
            table.delete(&filter).await?;
        }

        Ok(existing)
    }

    async fn search(&self, query: &[f32], limit: usize) -> WikiResult<Vec<VectorHit>> {
        if limit == 0 || !self.table_exists().await? {
            return Ok(vec![]);
        }
        check_vector(query, self.dimension)?;

        let table = self.open_table().await?;
        let ready = Condition::eq("status", Literal::text(VectorStatus::Ready.as_str())?);

        let batches: Vec<RecordBatch> = table
            .vector_search(query.to_vec())?
            .distance_type(distance_type(self.distance))
            .ef(self.ef_search as usize)
            .only_if(ready.render())
            .limit(limit)
            .execute()
            .await?
            .try_collect()
            .await?;

        let mut hits = Vec::new();
        for batch in &batches {
            let ids = string_column(batch, "id")?;

            // _distance 컬럼 (LanceDB가 자동 추가)
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| missing_column("_distance"))?;

            for i in 0..batch.num_rows() {
                let distance = distances.value(i);
                hits.push(VectorHit {
                    id: ids.value(i).to_string(),
                    distance,
                    score: self.distance.score(distance),
                });
            }
        }

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        Ok(hits)
    }

    async fn ids_with_status(&self, status: VectorStatus, limit: usize) -> WikiResult<Vec<String>> {
        let filter = Condition::eq("status", Literal::text(status.as_str())?);
        let records = self.query_records(&filter, limit).await?;
        Ok(records.into_iter().map(|r| r.id).collect())
    }

    async fn counts(&self) -> WikiResult<VectorCounts> {
        if !self.table_exists().await? {
            return Ok(VectorCounts::default());
        }

        let table = self.open_table().await?;
        let mut counts = VectorCounts::default();

        for status in [VectorStatus::Ready, VectorStatus::Pending, VectorStatus::Failed] {
            let filter = Condition::eq("status", Literal::text(status.as_str())?).render();
            let n = table.count_rows(Some(filter)).await?;
            match status {
                VectorStatus::Ready => counts.ready = n,
                VectorStatus::Pending => counts.pending = n,
                VectorStatus::Failed => counts.failed = n,
            }
        }

        Ok(counts)
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn distance_type(distance: Distance) -> DistanceType {
    match distance {
        Distance::Cosine => DistanceType::Cosine,
        Distance::L2 => DistanceType::L2,
        Distance::Dot => DistanceType::Dot,
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> WikiResult<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| missing_column(name))
}

fn missing_column(name: &str) -> WikiError {
    WikiError::Schema(format!("vector_document batch is missing column '{}'", name))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DIM: usize = 8;

    fn test_index() -> IndexConfig {
        IndexConfig {
            dimension: DIM,
            ..Default::default()
        }
    }

    async fn open_store(dir: &TempDir) -> LanceVectorStore {
        let config = test_index();
        let store = LanceVectorStore::open(&dir.path().join("test.lance"), &config)
            .await
            .unwrap();
        store.ensure_relation(&config).await.unwrap();
        store
    }

    fn unit(axis: usize) -> Vec<f32> {
        let mut v = vec![0.0; DIM];
        v[axis] = 1.0;
        v
    }

    #[tokio::test]
    async fn test_upsert_and_get() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        store.upsert(&VectorRecord::ready("d1", unit(0))).await.unwrap();
        let record = store.get("d1").await.unwrap().unwrap();
        assert_eq!(record.status, VectorStatus::Ready);
        assert_eq!(record.embedding, unit(0));

        // 같은 id는 교체
        store
            .upsert(&VectorRecord::placeholder("d1", VectorStatus::Pending))
            .await
            .unwrap();
        let record = store.get("d1").await.unwrap().unwrap();
        assert_eq!(record.status, VectorStatus::Pending);
        assert!(record.embedding.is_empty());
        assert_eq!(store.counts().await.unwrap().total(), 1);
    }

    #[tokio::test]
    async fn test_rejects_bad_vectors() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        let short = VectorRecord::ready("d1", vec![1.0; DIM - 1]);
        assert!(matches!(store.upsert(&short).await, Err(WikiError::QueryBuild(_))));

        let mut nan = unit(0);
        nan[1] = f32::NAN;
        assert!(store.upsert(&VectorRecord::ready("d1", nan)).await.is_err());
        assert!(store.get("d1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_search_only_ready_and_ordered() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        let mut near = unit(0);
        near[1] = 0.2;
        store.upsert(&VectorRecord::ready("exact", unit(0))).await.unwrap();
        store.upsert(&VectorRecord::ready("near", near)).await.unwrap();
        store.upsert(&VectorRecord::ready("far", unit(3))).await.unwrap();
        store
            .upsert(&VectorRecord::placeholder("waiting", VectorStatus::Pending))
            .await
            .unwrap();

        let hits = store.search(&unit(0), 10).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();

        assert_eq!(ids, vec!["exact", "near", "far"]);
        for pair in hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn test_delete_with_quoted_id() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        store.upsert(&VectorRecord::ready("it's", unit(0))).await.unwrap();
        store.upsert(&VectorRecord::ready("other", unit(1))).await.unwrap();

        assert_eq!(store.delete("it's").await.unwrap(), 1);
        assert_eq!(store.delete("it's").await.unwrap(), 0);
        assert!(store.get("other").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_counts_and_status_ids() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        store.upsert(&VectorRecord::ready("a", unit(0))).await.unwrap();
        store
            .upsert(&VectorRecord::placeholder("b", VectorStatus::Pending))
            .await
            .unwrap();
        store
            .upsert(&VectorRecord::placeholder("c", VectorStatus::Failed))
            .await
            .unwrap();

        let counts = store.counts().await.unwrap();
        assert_eq!(
            counts,
            VectorCounts {
                ready: 1,
                pending: 1,
                failed: 1
            }
        );

        let pending = store.ids_with_status(VectorStatus::Pending, 10).await.unwrap();
        assert_eq!(pending, vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_index_skipped_below_min_rows() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        store.upsert(&VectorRecord::ready("a", unit(0))).await.unwrap();

        assert!(!store.ensure_index(&test_index()).await.unwrap());
        assert_eq!(store.stored_dimension().await.unwrap(), Some(DIM));
    }
}
