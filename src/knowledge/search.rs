//! Search Service - 2단계 검색
//!
//! 1. Semantic: 쿼리 임베딩 → `ready` VectorRecord 대상 ANN 검색 → 문서 hydrate
//! 2. Fallback: 임베딩을 쓸 수 없을 때만 제목/본문 부분 문자열 매칭
//!
//! 두 단계는 같은 결과 형태(`SearchResult`)를 반환하며, 어느 단계가 처리했는지
//! `tier`에 기록됩니다. 임베딩 외의 저장소 에러는 폴백하지 않고 그대로 전달합니다.

use std::cmp::Ordering;
use std::fmt;

use serde::Serialize;

use super::documents::{Document, DocumentRepository};
use super::error::{WikiError, WikiResult};
use super::query::check_vector;
use super::store::Store;

/// 제목 매칭 가중치
const TITLE_WEIGHT: f32 = 2.0;

/// 검색을 처리한 단계
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchTier {
    Semantic,
    Fallback,
}

impl fmt::Display for SearchTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Semantic => f.write_str("semantic"),
            Self::Fallback => f.write_str("fallback"),
        }
    }
}

/// 검색 결과
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub document: Document,
    /// 높을수록 관련성 높음
    pub score: f32,
    pub tier: SearchTier,
}

/// 검색 서비스
#[derive(Clone)]
pub struct SearchService {
    store: Store,
    documents: DocumentRepository,
}

impl SearchService {
    pub fn new(store: Store, documents: DocumentRepository) -> Self {
        Self { store, documents }
    }

    /// 검색 (semantic 우선, 임베딩 불가 시 fallback)
    pub async fn search(&self, query: &str, limit: usize) -> WikiResult<Vec<SearchResult>> {
        let query = query.trim();
        if query.is_empty() || limit == 0 {
            return Ok(vec![]);
        }

        match self.semantic(query, limit).await {
            Ok(results) => Ok(results),
            Err(WikiError::EmbeddingUnavailable(reason)) => {
                tracing::warn!("Semantic search unavailable ({}), using fallback", reason);
                self.fallback(query, limit)
            }
            Err(e) => Err(e),
        }
    }

    /// Semantic 단계
    ///
    /// 프로바이더 실패/타임아웃/차원 불일치는 `EmbeddingUnavailable`로 반환됩니다.
    pub async fn semantic(&self, query: &str, limit: usize) -> WikiResult<Vec<SearchResult>> {
        let config = self.store.config();
        let embedder = self.documents.embedder();

        let embedding =
            match tokio::time::timeout(config.embedding_timeout, embedder.embed_query(query)).await
            {
                Ok(Ok(embedding)) => embedding,
                Ok(Err(e)) => return Err(WikiError::EmbeddingUnavailable(e.to_string())),
                Err(_) => {
                    return Err(WikiError::EmbeddingUnavailable(format!(
                        "query embedding timed out after {:?}",
                        config.embedding_timeout
                    )))
                }
            };
        check_vector(&embedding, config.index.dimension)
            .map_err(|e| WikiError::EmbeddingUnavailable(e.to_string()))?;

        let hits = self.store.vectors().search(&embedding, limit).await?;

        let mut results = Vec::with_capacity(hits.len());
        for hit in hits {
            // 삭제 중인 문서는 건너뜀
            match self.documents.find(&hit.id)? {
                Some(document) => results.push(SearchResult {
                    document,
                    score: hit.score,
                    tier: SearchTier::Semantic,
                }),
                None => tracing::debug!("Skipping vector hit without document: {}", hit.id),
            }
        }

        tracing::debug!("Semantic search '{}' -> {} results", query, results.len());
        Ok(results)
    }

    /// Fallback 단계 - 대소문자 무시 부분 문자열 매칭
    ///
    /// 점수 = 제목 매칭 수 × 2 + 본문 매칭 수. 매칭이 없는 문서는 제외합니다.
    /// 동점은 최근 수정 순, 그다음 id 순으로 정렬되어 결과가 결정적입니다.
    pub fn fallback(&self, query: &str, limit: usize) -> WikiResult<Vec<SearchResult>> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() || limit == 0 {
            return Ok(vec![]);
        }

        let mut results: Vec<SearchResult> = self
            .documents
            .list_all()?
            .into_iter()
            .filter_map(|document| {
                let score = substring_score(&document, &needle);
                (score > 0.0).then_some(SearchResult {
                    document,
                    score,
                    tier: SearchTier::Fallback,
                })
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.document.updated_at.cmp(&a.document.updated_at))
                .then_with(|| a.document.id.cmp(&b.document.id))
        });
        results.truncate(limit);

        tracing::debug!("Fallback search '{}' -> {} results", query, results.len());
        Ok(results)
    }
}

fn substring_score(document: &Document, needle: &str) -> f32 {
    let title = document.title.to_lowercase().matches(needle).count() as f32;
    let content = document.content.to_lowercase().matches(needle).count() as f32;
    title * TITLE_WEIGHT + content
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{EmbeddingProvider, HashingEmbedding, UnavailableEmbedding};
    use crate::knowledge::documents::NewDocument;
    use crate::knowledge::testing::{open_store, TEST_DIMENSION};
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn service(dir: &TempDir, embedder: Arc<dyn EmbeddingProvider>) -> SearchService {
        let store = open_store(dir.path()).await;
        let documents = DocumentRepository::new(store.clone(), embedder);
        SearchService::new(store, documents)
    }

    async fn add(service: &SearchService, title: &str, content: &str) -> String {
        service
            .documents
            .create(NewDocument::new(title, content))
            .await
            .unwrap()
            .document
            .id
    }

    #[tokio::test]
    async fn test_empty_query_returns_nothing() {
        let dir = TempDir::new().unwrap();
        let search = service(&dir, Arc::new(HashingEmbedding::new(TEST_DIMENSION))).await;
        add(&search, "Doc", "content").await;

        assert!(search.search("", 10).await.unwrap().is_empty());
        assert!(search.search("   ", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_semantic_results_are_ranked() {
        let dir = TempDir::new().unwrap();
        let search = service(&dir, Arc::new(HashingEmbedding::new(TEST_DIMENSION))).await;

        let best = add(&search, "Ownership", "rust ownership borrowing lifetimes").await;
        add(&search, "Borrowing", "rust borrowing rules").await;
        add(&search, "Bread", "flour water salt yeast").await;

        let results = search.search("rust ownership", 10).await.unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].document.id, best);
        assert!(results.iter().all(|r| r.tier == SearchTier::Semantic));
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn test_limit_is_respected() {
        let dir = TempDir::new().unwrap();
        let search = service(&dir, Arc::new(HashingEmbedding::new(TEST_DIMENSION))).await;
        for i in 0..4 {
            add(&search, &format!("Doc {}", i), "shared words here").await;
        }

        assert_eq!(search.search("shared words", 2).await.unwrap().len(), 2);
        assert!(search.search("shared words", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fallback_when_provider_unavailable() {
        let dir = TempDir::new().unwrap();
        let search = service(&dir, Arc::new(UnavailableEmbedding::new(TEST_DIMENSION))).await;

        let hit = add(&search, "Alpha", "The quick brown fox.").await;
        add(&search, "Beta", "A lazy dog sleeps.").await;

        let results = search.search("QUICK", 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document.id, hit);
        assert!(results[0].score > 0.0);
        assert_eq!(results[0].tier, SearchTier::Fallback);
    }

    #[tokio::test]
    async fn test_fallback_ordering_is_deterministic() {
        let dir = TempDir::new().unwrap();
        let search = service(&dir, Arc::new(UnavailableEmbedding::new(TEST_DIMENSION))).await;

        let title_hit = add(&search, "Graph notes", "nothing else").await;
        let double = add(&search, "Misc", "graph and another graph").await;
        let single = add(&search, "Other", "one graph").await;
        add(&search, "Unrelated", "no match").await;

        let first: Vec<String> = search
            .fallback("graph", 10)
            .unwrap()
            .into_iter()
            .map(|r| r.document.id)
            .collect();
        let second: Vec<String> = search
            .fallback("graph", 10)
            .unwrap()
            .into_iter()
            .map(|r| r.document.id)
            .collect();

        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
        // 제목 2점 = 본문 2회, 동점은 최근 수정 순
        assert_eq!(first[0], double);
        assert_eq!(first[1], title_hit);
        assert_eq!(first[2], single);
    }

    #[tokio::test]
    async fn test_failed_vectors_are_not_semantic_hits() {
        let dir = TempDir::new().unwrap();
        let store = open_store(dir.path()).await;

        let offline = DocumentRepository::new(
            store.clone(),
            Arc::new(UnavailableEmbedding::new(TEST_DIMENSION)),
        );
        offline
            .create(NewDocument::new("Offline", "semantic words"))
            .await
            .unwrap();

        let online = DocumentRepository::new(
            store.clone(),
            Arc::new(HashingEmbedding::new(TEST_DIMENSION)),
        );
        let search = SearchService::new(store, online);
        assert!(search.semantic("semantic words", 10).await.unwrap().is_empty());
    }
}
