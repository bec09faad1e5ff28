//! vesa - 벡터 + 그래프 위키 문서 저장소
//!
//! 문서 텍스트, 시맨틱 임베딩, 문서 간 관계를 하나의 저장소에서
//! 일관되게 관리합니다. SQLite(document, relationship) + LanceDB(vector_document).

pub mod cli;
pub mod config;
pub mod embedding;
pub mod knowledge;

// Re-exports
pub use config::{get_data_dir, Config, ProviderKind};
pub use embedding::{
    create_provider, get_api_key, has_api_key, EmbeddingProvider, GeminiEmbedding,
    HashingEmbedding, UnavailableEmbedding,
};
pub use knowledge::{
    Document, DocumentPatch, DocumentRepository, DocumentWrite, Graph, GraphService,
    NeighborDirection, NewDocument, Relationship, RelationshipRepository, SchemaManager,
    SearchResult, SearchService, SearchTier, Store, StoreStats, VectorStatus, Wiki, WikiError,
    WikiResult,
};
