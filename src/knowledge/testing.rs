//! 테스트 헬퍼 - 임시 저장소, 테스트용 프로바이더/벡터 저장소

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{Config, ProviderKind};
use crate::embedding::{EmbeddingProvider, HashingEmbedding};

use super::error::{WikiError, WikiResult};
use super::schema::{IndexConfig, SchemaManager};
use super::store::Store;
use super::vector::{VectorCounts, VectorHit, VectorRecord, VectorStatus, VectorStore};
use super::wiki::Wiki;

pub const TEST_DIMENSION: usize = 64;

/// 작은 차원 + 해싱 프로바이더 설정
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::for_data_dir(dir);
    config.provider = ProviderKind::Hashing;
    config.index.dimension = TEST_DIMENSION;
    config.embedding_timeout = Duration::from_secs(2);
    config
}

/// 스키마까지 준비된 저장소
pub async fn open_store(dir: &Path) -> Store {
    let store = Store::open(&test_config(dir)).await.unwrap();
    SchemaManager::new(store.clone()).ensure_schema().await.unwrap();
    store
}

pub async fn open_wiki(dir: &Path) -> Wiki {
    let config = test_config(dir);
    Wiki::open_with(&config, Arc::new(HashingEmbedding::new(TEST_DIMENSION)))
        .await
        .unwrap()
}

/// 응답이 느린 프로바이더
pub struct SlowEmbedding {
    delay: Duration,
    inner: HashingEmbedding,
}

impl SlowEmbedding {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            inner: HashingEmbedding::new(TEST_DIMENSION),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for SlowEmbedding {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        tokio::time::sleep(self.delay).await;
        self.inner.embed(text).await
    }

    fn dimension(&self) -> usize {
        TEST_DIMENSION
    }

    fn name(&self) -> &str {
        "slow"
    }
}

/// 쓰기가 항상 실패하는 벡터 저장소
pub struct FailingVectors;

#[async_trait]
impl VectorStore for FailingVectors {
    async fn ensure_relation(&self, _config: &IndexConfig) -> WikiResult<()> {
        Ok(())
    }

    async fn stored_dimension(&self) -> WikiResult<Option<usize>> {
        Ok(None)
    }

    async fn ensure_index(&self, _config: &IndexConfig) -> WikiResult<bool> {
        Ok(false)
    }

    async fn upsert(&self, _record: &VectorRecord) -> WikiResult<()> {
        Err(WikiError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "vector store is read-only",
        )))
    }

    async fn get(&self, _id: &str) -> WikiResult<Option<VectorRecord>> {
        Ok(None)
    }

    async fn delete(&self, _id: &str) -> WikiResult<usize> {
        Ok(0)
    }

    async fn search(&self, _query: &[f32], _limit: usize) -> WikiResult<Vec<VectorHit>> {
        Ok(vec![])
    }

    async fn ids_with_status(&self, _status: VectorStatus, _limit: usize) -> WikiResult<Vec<String>> {
        Ok(vec![])
    }

    async fn counts(&self) -> WikiResult<VectorCounts> {
        Ok(VectorCounts::default())
    }
}
