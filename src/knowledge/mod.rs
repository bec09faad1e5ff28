//! Knowledge 모듈 - 벡터 + 그래프 위키 문서 저장소
//!
//! - SQLite: document, relationship 릴레이션
//! - LanceDB: vector_document 릴레이션 (ANN 검색)
//! - Query Builder: 인코딩된 리터럴만 받는 쿼리 텍스트 생성
//! - Search: semantic → substring fallback 2단계 검색
//! - Graph: 관련 문서 조회, 전체 그래프 export

mod documents;
mod error;
mod graph;
mod lance;
mod locks;
mod query;
mod relationships;
mod schema;
mod search;
mod store;
mod vector;
mod wiki;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports
pub use documents::{
    Document, DocumentPatch, DocumentRepository, DocumentWrite, EmbeddingOutcome, NewDocument,
};
pub use error::{WikiError, WikiResult};
pub use graph::{Graph, GraphService, NeighborDirection};
pub use lance::LanceVectorStore;
pub use locks::DocumentLocks;
pub use query::{check_vector, Condition, Literal, Order, Query, Relation};
pub use relationships::{Relationship, RelationshipRepository};
pub use schema::{Distance, IndexConfig, SchemaManager};
pub use search::{SearchResult, SearchService, SearchTier};
pub use store::Store;
pub use vector::{VectorCounts, VectorHit, VectorRecord, VectorStatus, VectorStore};
pub use wiki::{StoreStats, Wiki};
