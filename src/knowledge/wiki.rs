//! Wiki - 저장소 핸들과 repository/service 묶음
//!
//! 프로세스 시작 시 한 번 열고, 종료 시 `close()`로 닫습니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let wiki = Wiki::open(&Config::from_env()?).await?;
//! let written = wiki.documents().create(NewDocument::new("Intro", "...")).await?;
//! let results = wiki.search().search("semantic", 10).await?;
//! wiki.close()?;
//! ```

use std::sync::Arc;

use serde::Serialize;

use crate::config::Config;
use crate::embedding::{create_provider, EmbeddingProvider};

use super::documents::DocumentRepository;
use super::error::{WikiError, WikiResult};
use super::graph::GraphService;
use super::relationships::RelationshipRepository;
use super::schema::SchemaManager;
use super::search::SearchService;
use super::store::Store;
use super::vector::VectorCounts;

/// 저장소 통계
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub documents: usize,
    pub relationships: usize,
    pub vectors: VectorCounts,
    pub provider: String,
    pub dimension: usize,
}

/// 위키 문서 저장소
pub struct Wiki {
    store: Store,
    schema: SchemaManager,
    documents: DocumentRepository,
    relationships: RelationshipRepository,
    search: SearchService,
    graph: GraphService,
}

impl Wiki {
    /// 설정의 프로바이더로 열기
    pub async fn open(config: &Config) -> WikiResult<Self> {
        let embedder = create_provider(config)?;
        Self::open_with(config, embedder).await
    }

    /// 프로바이더를 직접 지정하여 열기
    pub async fn open_with(config: &Config, embedder: Arc<dyn EmbeddingProvider>) -> WikiResult<Self> {
        if embedder.dimension() != config.index.dimension {
            return Err(WikiError::Config {
                key: "VESA_EMBEDDING_DIMENSION".to_string(),
                message: format!(
                    "provider '{}' produces {}-dim embeddings, index expects {}",
                    embedder.name(),
                    embedder.dimension(),
                    config.index.dimension
                ),
            });
        }

        let store = Store::open(config).await?;
        let schema = SchemaManager::new(store.clone());
        schema.ensure_schema().await?;

        let documents = DocumentRepository::new(store.clone(), embedder);
        let relationships = RelationshipRepository::new(store.clone(), documents.clone());
        let search = SearchService::new(store.clone(), documents.clone());
        let graph = GraphService::new(store.clone(), documents.clone(), relationships.clone());

        tracing::info!("Wiki opened at {:?}", config.data_dir);

        Ok(Self {
            store,
            schema,
            documents,
            relationships,
            search,
            graph,
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn schema(&self) -> &SchemaManager {
        &self.schema
    }

    pub fn documents(&self) -> &DocumentRepository {
        &self.documents
    }

    pub fn relationships(&self) -> &RelationshipRepository {
        &self.relationships
    }

    pub fn search(&self) -> &SearchService {
        &self.search
    }

    pub fn graph(&self) -> &GraphService {
        &self.graph
    }

    /// 저장소 통계
    pub async fn stats(&self) -> WikiResult<StoreStats> {
        let embedder = self.documents.embedder();
        Ok(StoreStats {
            documents: self.documents.count()?,
            relationships: self.relationships.count()?,
            vectors: self.store.vectors().counts().await?,
            provider: embedder.name().to_string(),
            dimension: embedder.dimension(),
        })
    }

    /// 저장소 닫기
    pub fn close(self) -> WikiResult<()> {
        let Self {
            store,
            schema,
            documents,
            relationships,
            search,
            graph,
        } = self;
        drop((schema, documents, relationships, search, graph));
        store.close()
    }
}

// ============================================================================
// Tests
// ============================================================================
