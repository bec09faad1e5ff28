//! Document Repository - 문서 생명주기
//!
//! document 행(SQLite)과 VectorRecord(LanceDB)를 함께 관리합니다.
//!
//! 쓰기는 2단계로 진행됩니다:
//! 1. 임베딩 생성 (타임아웃 적용). 실패해도 쓰기는 계속되고 상태만 `pending`/`failed`
//! 2. document 행 기록 후 VectorRecord upsert. upsert가 실패하면 document 행을 되돌림
//!
//! 같은 id에 대한 쓰기는 `DocumentLocks`로 직렬화되므로
//! 마지막으로 끝난 쓰기의 content와 embedding이 항상 짝을 이룹니다.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::embedding::EmbeddingProvider;

use super::error::{WikiError, WikiResult};
use super::query::{check_vector, Condition, Literal, Order, Query, Relation};
use super::store::Store;
use super::vector::{VectorRecord, VectorStatus};

const DOCUMENT_COLUMNS: &[&str] = &[
    "id",
    "title",
    "content",
    "tags",
    "author",
    "path",
    "created_at",
    "updated_at",
];

// ============================================================================
// Types
// ============================================================================

/// 위키 문서
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    /// Markdown 원문
    pub content: String,
    /// 태그 (입력 순서 유지, 중복 없음)
    pub tags: Vec<String>,
    pub author: Option<String>,
    /// 원본 파일 경로 (파일에서 가져온 경우)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 새 문서 입력
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewDocument {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub author: Option<String>,
    pub path: Option<String>,
}

impl NewDocument {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// 부분 수정 입력 (지정된 필드만 변경)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocumentPatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub tags: Option<Vec<String>>,
    pub author: Option<String>,
    pub path: Option<String>,
}

impl DocumentPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.content.is_none()
            && self.tags.is_none()
            && self.author.is_none()
            && self.path.is_none()
    }
}

/// 쓰기 결과 - 문서와 VectorRecord 상태
#[derive(Debug, Clone, Serialize)]
pub struct DocumentWrite {
    pub document: Document,
    pub vector_status: VectorStatus,
}

/// 임베딩 생성 결과
#[derive(Debug, Clone)]
pub enum EmbeddingOutcome {
    Ready(Vec<f32>),
    /// 타임아웃
    Pending(String),
    /// 프로바이더 에러 또는 차원 불일치
    Failed(String),
}

impl EmbeddingOutcome {
    pub fn status(&self) -> VectorStatus {
        match self {
            Self::Ready(_) => VectorStatus::Ready,
            Self::Pending(_) => VectorStatus::Pending,
            Self::Failed(_) => VectorStatus::Failed,
        }
    }

    fn into_record(self, id: &str) -> VectorRecord {
        match self {
            Self::Ready(embedding) => VectorRecord::ready(id, embedding),
            Self::Pending(_) => VectorRecord::placeholder(id, VectorStatus::Pending),
            Self::Failed(_) => VectorRecord::placeholder(id, VectorStatus::Failed),
        }
    }
}

// ============================================================================
// DocumentRepository
// ============================================================================

/// 문서 저장소
#[derive(Clone)]
pub struct DocumentRepository {
    store: Store,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl DocumentRepository {
    pub fn new(store: Store, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { store, embedder }
    }

    /// 문서 생성
    pub async fn create(&self, input: NewDocument) -> WikiResult<DocumentWrite> {
        let title = validate_title(input.title)?;
        let timestamp = now();
        let document = Document {
            id: Uuid::new_v4().to_string(),
            title,
            content: input.content,
            tags: normalize_tags(input.tags),
            author: non_blank(input.author),
            path: non_blank(input.path),
            created_at: timestamp,
            updated_at: timestamp,
        };

        let _guard = self.store.locks().lock(&document.id).await;

        let outcome = self.embed(&document.content).await;
        let vector_status = outcome.status();

        self.store.execute(&insert_statement(&document)?)?;

        if let Err(e) = self.store.vectors().upsert(&outcome.into_record(&document.id)).await {
            tracing::warn!("Vector write failed for {}, rolling back document: {}", document.id, e);
            self.store.execute(&delete_statement(&document.id)?)?;
            return Err(e);
        }

        tracing::info!(
            "Created document {} ('{}', embedding {})",
            document.id,
            document.title,
            vector_status
        );

        Ok(DocumentWrite {
            document,
            vector_status,
        })
    }

    /// 문서 조회
    pub fn get(&self, id: &str) -> WikiResult<Document> {
        self.find(id)?
            .ok_or_else(|| WikiError::document_not_found(id))
    }

    /// 문서 조회 (없으면 None)
    pub fn find(&self, id: &str) -> WikiResult<Option<Document>> {
        let sql = Query::select(Relation::Document, DOCUMENT_COLUMNS)
            .filter(Condition::eq("id", Literal::text(id)?))
            .limit(1)
            .build()?;

        let mut documents = self.fetch(&sql)?;
        Ok(documents.pop())
    }

    /// 문서 존재 여부
    pub fn exists(&self, id: &str) -> WikiResult<bool> {
        let sql = Query::select(Relation::Document, &["COUNT(*)"])
            .filter(Condition::eq("id", Literal::text(id)?))
            .build()?;
        Ok(self.store.query_count(&sql)? > 0)
    }

    /// 문서 수정
    ///
    /// content가 실제로 바뀐 경우에만 임베딩을 다시 생성합니다.
    pub async fn update(&self, id: &str, patch: DocumentPatch) -> WikiResult<DocumentWrite> {
        let _guard = self.store.locks().lock(id).await;

        let current = self.get(id)?;
        if patch.is_empty() {
            let vector_status = self.current_status(id).await?;
            return Ok(DocumentWrite {
                document: current,
                vector_status,
            });
        }

        let mut updated = current.clone();
        if let Some(title) = patch.title {
            updated.title = validate_title(title)?;
        }
        if let Some(tags) = patch.tags {
            updated.tags = normalize_tags(tags);
        }
        if let Some(author) = patch.author {
            updated.author = non_blank(Some(author));
        }
        if let Some(path) = patch.path {
            updated.path = non_blank(Some(path));
        }
        let content_changed = match patch.content {
            Some(content) if content != current.content => {
                updated.content = content;
                true
            }
            _ => false,
        };
        updated.updated_at = now().max(current.updated_at);

        let outcome = if content_changed {
            Some(self.embed(&updated.content).await)
        } else {
            None
        };

        self.store.execute(&update_statement(&updated)?)?;

        let vector_status = match outcome {
            Some(outcome) => {
                let status = outcome.status();
                if let Err(e) = self.store.vectors().upsert(&outcome.into_record(id)).await {
                    tracing::warn!("Vector write failed for {}, restoring document: {}", id, e);
                    self.store.execute(&update_statement(&current)?)?;
                    return Err(e);
                }
                status
            }
            None => self.current_status(id).await?,
        };

        tracing::info!("Updated document {} (embedding {})", id, vector_status);

        Ok(DocumentWrite {
            document: updated,
            vector_status,
        })
    }

    /// 문서 삭제 (relationship -> vector record -> document 순서)
    pub async fn delete(&self, id: &str) -> WikiResult<()> {
        let _guard = self.store.locks().lock(id).await;

        if !self.exists(id)? {
            return Err(WikiError::document_not_found(id));
        }

        let id_literal = Literal::text(id)?;
        let edges = Query::delete(Relation::Relationship)
            .filter(Condition::Or(vec![
                Condition::eq("source_id", id_literal.clone()),
                Condition::eq("target_id", id_literal),
            ]))
            .build()?;
        let removed_edges = self.store.execute(&edges)?;

        self.store.vectors().delete(id).await?;
        self.store.execute(&delete_statement(id)?)?;

        tracing::info!(
            "Deleted document {} ({} relationships removed)",
            id,
            removed_edges
        );
        Ok(())
    }

    /// 최근 수정 순 목록
    pub fn list_recent(&self, limit: usize) -> WikiResult<Vec<Document>> {
        let sql = Query::select(Relation::Document, DOCUMENT_COLUMNS)
            .order_by("updated_at", Order::Desc)
            .order_by("id", Order::Asc)
            .limit(limit)
            .build()?;
        self.fetch(&sql)
    }

    /// 전체 문서 (생성 순)
    pub fn list_all(&self) -> WikiResult<Vec<Document>> {
        let sql = Query::select(Relation::Document, DOCUMENT_COLUMNS)
            .order_by("created_at", Order::Asc)
            .order_by("id", Order::Asc)
            .build()?;
        self.fetch(&sql)
    }

    pub fn count(&self) -> WikiResult<usize> {
        let sql = Query::select(Relation::Document, &["COUNT(*)"]).build()?;
        self.store.query_count(&sql)
    }

    /// 문서의 VectorRecord 상태
    pub async fn vector_status(&self, id: &str) -> WikiResult<VectorStatus> {
        if !self.exists(id)? {
            return Err(WikiError::document_not_found(id));
        }
        self.current_status(id).await
    }

    /// `pending`/`failed` 문서 재임베딩, `ready`가 된 수 반환
    pub async fn retry_embeddings(&self, limit: usize) -> WikiResult<usize> {
        let vectors = self.store.vectors();
        let mut ids = vectors.ids_with_status(VectorStatus::Pending, limit).await?;
        if ids.len() < limit {
            let failed = vectors
                .ids_with_status(VectorStatus::Failed, limit - ids.len())
                .await?;
            ids.extend(failed);
        }

        let mut recovered = 0;
        for id in ids {
            let _guard = self.store.locks().lock(&id).await;

            let document = match self.find(&id)? {
                Some(doc) => doc,
                None => {
                    tracing::warn!("Removing orphan vector record {}", id);
                    vectors.delete(&id).await?;
                    continue;
                }
            };

            // 잠금 대기 중 다른 쓰기가 끝났을 수 있음
            if self.current_status(&id).await? == VectorStatus::Ready {
                continue;
            }

            let outcome = self.embed(&document.content).await;
            let status = outcome.status();
            vectors.upsert(&outcome.into_record(&id)).await?;

            if status == VectorStatus::Ready {
                recovered += 1;
            }
        }

        if recovered > 0 {
            tracing::info!("Re-embedded {} documents", recovered);
        }
        Ok(recovered)
    }

    pub(crate) fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    // ========================================================================
    // Internal
    // ========================================================================

    /// 타임아웃이 적용된 임베딩 생성. 실패는 상태로 변환
    async fn embed(&self, text: &str) -> EmbeddingOutcome {
        let config = self.store.config();
        let dimension = config.index.dimension;

        match tokio::time::timeout(config.embedding_timeout, self.embedder.embed(text)).await {
            Err(_) => {
                tracing::warn!(
                    "Embedding timed out after {:?}, storing as pending",
                    config.embedding_timeout
                );
                EmbeddingOutcome::Pending(format!(
                    "timed out after {:?}",
                    config.embedding_timeout
                ))
            }
            Ok(Err(e)) => {
                tracing::warn!("Embedding failed ({}), storing as failed", e);
                EmbeddingOutcome::Failed(e.to_string())
            }
            Ok(Ok(embedding)) => match check_vector(&embedding, dimension) {
                Ok(()) => EmbeddingOutcome::Ready(embedding),
                Err(e) => {
                    tracing::warn!("Embedding rejected ({}), storing as failed", e);
                    EmbeddingOutcome::Failed(e.to_string())
                }
            },
        }
    }

    async fn current_status(&self, id: &str) -> WikiResult<VectorStatus> {
        Ok(self
            .store
            .vectors()
            .get(id)
            .await?
            .map(|r| r.status)
            .unwrap_or(VectorStatus::Pending))
    }

    fn fetch(&self, sql: &str) -> WikiResult<Vec<Document>> {
        let rows = self.store.query(sql, |row| {
            Ok(DocumentRow {
                id: row.get(0)?,
                title: row.get(1)?,
                content: row.get(2)?,
                tags: row.get(3)?,
                author: row.get(4)?,
                path: row.get(5)?,
                created_at: row.get(6)?,
                updated_at: row.get(7)?,
            })
        })?;

        rows.into_iter().map(DocumentRow::into_document).collect()
    }
}

// ============================================================================
// Row Mapping
// ============================================================================

struct DocumentRow {
    id: String,
    title: String,
    content: String,
    tags: String,
    author: Option<String>,
    path: Option<String>,
    created_at: String,
    updated_at: String,
}

impl DocumentRow {
    fn into_document(self) -> WikiResult<Document> {
        Ok(Document {
            tags: serde_json::from_str(&self.tags)?,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
            id: self.id,
            title: self.title,
            content: self.content,
            author: self.author,
            path: self.path,
        })
    }
}

/// 저장 정밀도(마이크로초)에 맞춘 현재 시각
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// 사전순 = 시간순이 되도록 고정 정밀도(마이크로초)로 저장
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(raw: &str) -> WikiResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| WikiError::Schema(format!("invalid timestamp '{}': {}", raw, e)))
}

fn insert_statement(doc: &Document) -> WikiResult<String> {
    Query::insert(Relation::Document)
        .value("id", Literal::text(&doc.id)?)
        .value("title", Literal::text(&doc.title)?)
        .value("content", Literal::text(&doc.content)?)
        .value("tags", Literal::json(&doc.tags)?)
        .value("author", Literal::opt_text(doc.author.as_deref())?)
        .value("path", Literal::opt_text(doc.path.as_deref())?)
        .value("created_at", Literal::text(&format_timestamp(&doc.created_at))?)
        .value("updated_at", Literal::text(&format_timestamp(&doc.updated_at))?)
        .build()
}

fn update_statement(doc: &Document) -> WikiResult<String> {
    Query::update(Relation::Document)
        .set("title", Literal::text(&doc.title)?)
        .set("content", Literal::text(&doc.content)?)
        .set("tags", Literal::json(&doc.tags)?)
        .set("author", Literal::opt_text(doc.author.as_deref())?)
        .set("path", Literal::opt_text(doc.path.as_deref())?)
        .set("updated_at", Literal::text(&format_timestamp(&doc.updated_at))?)
        .filter(Condition::eq("id", Literal::text(&doc.id)?))
        .build()
}

fn delete_statement(id: &str) -> WikiResult<String> {
    Query::delete(Relation::Document)
        .filter(Condition::eq("id", Literal::text(id)?))
        .build()
}

/// 공백뿐인 제목은 거부, 값은 입력 그대로 저장
fn validate_title(title: String) -> WikiResult<String> {
    if title.trim().is_empty() {
        return Err(WikiError::Validation("title must not be empty".to_string()));
    }
    Ok(title)
}

/// 빈 태그 제외, 순서를 유지한 중복 제거 (값은 그대로)
fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        if !tag.trim().is_empty() && !normalized.contains(&tag) {
            normalized.push(tag);
        }
    }
    normalized
}

/// 공백뿐인 선택 필드는 None
fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{HashingEmbedding, UnavailableEmbedding};
    use crate::knowledge::testing::{
        open_store, test_config, FailingVectors, SlowEmbedding, TEST_DIMENSION,
    };
    use crate::knowledge::SchemaManager;
    use std::time::Duration;
    use tempfile::TempDir;

    async fn repo(dir: &TempDir) -> DocumentRepository {
        let store = open_store(dir.path()).await;
        DocumentRepository::new(store, Arc::new(HashingEmbedding::new(TEST_DIMENSION)))
    }

    #[test]
    fn test_normalize_tags() {
        let tags = vec![" db ", "vector", "", "  ", "db", "vector", "Vector", " db "]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(normalize_tags(tags), vec![" db ", "vector", "db", "Vector"]);
    }

    #[test]
    fn test_timestamp_format_sorts() {
        let a = parse_timestamp("2024-01-01T00:00:00.000001Z").unwrap();
        let b = parse_timestamp("2024-01-01T00:00:00.000010Z").unwrap();
        assert!(format_timestamp(&a) < format_timestamp(&b));
        assert_eq!(parse_timestamp(&format_timestamp(&a)).unwrap(), a);
    }

    #[tokio::test]
    async fn test_create_and_get_round_trip() {
        let dir = TempDir::new().unwrap();
        let docs = repo(&dir).await;

        let inputs = [
            NewDocument::new("Intro", "Vector databases enable semantic search.")
                .with_tags(["db", "vector"]),
            NewDocument::new("It's \"quoted\"", "line1\nline2\t'single'\\ {x}")
                .with_tags(["a'b", "c\"d"])
                .with_author("O'Brien"),
            NewDocument::new("한국어 제목", "본문 🚀"),
            NewDocument::new("  Intro  ", "  padded content\n")
                .with_tags([" db", "vector "])
                .with_author(" Ann ")
                .with_path("notes/intro.md"),
        ];

        for input in inputs {
            let written = docs.create(input.clone()).await.unwrap();
            assert_eq!(written.vector_status, VectorStatus::Ready);

            let fetched = docs.get(&written.document.id).unwrap();
            assert_eq!(fetched.title, input.title);
            assert_eq!(fetched.content, input.content);
            assert_eq!(fetched.tags, input.tags);
            assert_eq!(fetched.author, input.author);
            assert_eq!(fetched.path, input.path);
            assert_eq!(fetched, written.document);
        }
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let docs = repo(&dir).await;
        assert!(docs.get("nope").unwrap_err().is_not_found());
        assert!(docs.delete("nope").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_empty_title_is_rejected() {
        let dir = TempDir::new().unwrap();
        let docs = repo(&dir).await;
        let err = docs.create(NewDocument::new("  ", "body")).await.unwrap_err();
        assert!(matches!(err, WikiError::Validation(_)));
        assert_eq!(docs.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_keeps_padded_values() {
        let dir = TempDir::new().unwrap();
        let docs = repo(&dir).await;
        let created = docs
            .create(NewDocument::new("Title", "body"))
            .await
            .unwrap()
            .document;

        let patch = DocumentPatch {
            title: Some(" Renamed ".to_string()),
            tags: Some(vec![" a".to_string(), "".to_string(), " a".to_string()]),
            path: Some("docs/renamed.md".to_string()),
            ..Default::default()
        };
        docs.update(&created.id, patch).await.unwrap();

        let fetched = docs.get(&created.id).unwrap();
        assert_eq!(fetched.title, " Renamed ");
        assert_eq!(fetched.tags, vec![" a"]);
        assert_eq!(fetched.path.as_deref(), Some("docs/renamed.md"));

        let blank = DocumentPatch {
            title: Some("\t ".to_string()),
            ..Default::default()
        };
        let err = docs.update(&created.id, blank).await.unwrap_err();
        assert!(matches!(err, WikiError::Validation(_)));
        assert_eq!(docs.get(&created.id).unwrap().title, " Renamed ");
    }

    #[tokio::test]
    async fn test_create_with_unavailable_provider_is_failed() {
        let dir = TempDir::new().unwrap();
        let store = open_store(dir.path()).await;
        let docs =
            DocumentRepository::new(store, Arc::new(UnavailableEmbedding::new(TEST_DIMENSION)));

        let written = docs.create(NewDocument::new("Title", "content")).await.unwrap();
        assert_eq!(written.vector_status, VectorStatus::Failed);
        assert!(docs.get(&written.document.id).is_ok());
        assert_eq!(
            docs.vector_status(&written.document.id).await.unwrap(),
            VectorStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_create_with_slow_provider_is_pending() {
        let dir = TempDir::new().unwrap();
        let mut config = test_config(dir.path());
        config.embedding_timeout = Duration::from_millis(20);

        let store = crate::knowledge::Store::open(&config).await.unwrap();
        SchemaManager::new(store.clone()).ensure_schema().await.unwrap();
        let docs = DocumentRepository::new(
            store,
            Arc::new(SlowEmbedding::new(Duration::from_millis(500))),
        );

        let written = docs.create(NewDocument::new("Slow", "content")).await.unwrap();
        assert_eq!(written.vector_status, VectorStatus::Pending);
        assert_eq!(docs.count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_wrong_dimension_is_failed() {
        let dir = TempDir::new().unwrap();
        let store = open_store(dir.path()).await;
        let docs = DocumentRepository::new(
            store,
            Arc::new(HashingEmbedding::new(TEST_DIMENSION + 1)),
        );

        let written = docs.create(NewDocument::new("Dim", "content")).await.unwrap();
        assert_eq!(written.vector_status, VectorStatus::Failed);
    }

    #[tokio::test]
    async fn test_update_only_supplied_fields() {
        let dir = TempDir::new().unwrap();
        let docs = repo(&dir).await;

        let created = docs
            .create(NewDocument::new("Title", "original").with_tags(["a"]))
            .await
            .unwrap()
            .document;

        let patch = DocumentPatch {
            title: Some("Renamed".to_string()),
            ..Default::default()
        };
        let updated = docs.update(&created.id, patch).await.unwrap().document;

        assert_eq!(updated.title, "Renamed");
        assert_eq!(updated.content, "original");
        assert_eq!(updated.tags, vec!["a"]);
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at >= created.updated_at);
        assert_eq!(docs.get(&created.id).unwrap(), updated);
    }

    #[tokio::test]
    async fn test_update_content_reembeds() {
        let dir = TempDir::new().unwrap();
        let docs = repo(&dir).await;
        let embedder = HashingEmbedding::new(TEST_DIMENSION);

        let id = docs
            .create(NewDocument::new("T", "first text"))
            .await
            .unwrap()
            .document
            .id;

        let patch = DocumentPatch {
            content: Some("second text".to_string()),
            ..Default::default()
        };
        let written = docs.update(&id, patch).await.unwrap();
        assert_eq!(written.vector_status, VectorStatus::Ready);

        let record = docs.store.vectors().get(&id).await.unwrap().unwrap();
        assert_eq!(record.embedding, embedder.embed("second text").await.unwrap());
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let docs = repo(&dir).await;
        let patch = DocumentPatch {
            title: Some("x".to_string()),
            ..Default::default()
        };
        assert!(docs.update("nope", patch).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_concurrent_updates_keep_content_and_embedding_paired() {
        let dir = TempDir::new().unwrap();
        let docs = repo(&dir).await;
        let embedder = HashingEmbedding::new(TEST_DIMENSION);

        let id = docs
            .create(NewDocument::new("Race", "start"))
            .await
            .unwrap()
            .document
            .id;

        let mut tasks = Vec::new();
        for i in 0..8 {
            let docs = docs.clone();
            let id = id.clone();
            tasks.push(tokio::spawn(async move {
                let patch = DocumentPatch {
                    content: Some(format!("version {} body", i)),
                    ..Default::default()
                };
                docs.update(&id, patch).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let document = docs.get(&id).unwrap();
        let record = docs.store.vectors().get(&id).await.unwrap().unwrap();
        assert_eq!(record.status, VectorStatus::Ready);
        assert_eq!(
            record.embedding,
            embedder.embed(&document.content).await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_delete_removes_everything() {
        let dir = TempDir::new().unwrap();
        let docs = repo(&dir).await;

        let a = docs.create(NewDocument::new("A", "alpha")).await.unwrap().document;
        let b = docs.create(NewDocument::new("B", "beta")).await.unwrap().document;

        for (s, t) in [(&a.id, &b.id), (&b.id, &a.id)] {
            let sql = Query::insert(Relation::Relationship)
                .value("source_id", Literal::text(s).unwrap())
                .value("target_id", Literal::text(t).unwrap())
                .value("relationship_type", Literal::text("related").unwrap())
                .value("created_at", Literal::text("2024-01-01T00:00:00.000000Z").unwrap())
                .build()
                .unwrap();
            docs.store.execute(&sql).unwrap();
        }

        docs.delete(&a.id).await.unwrap();

        assert!(docs.get(&a.id).unwrap_err().is_not_found());
        assert!(docs.store.vectors().get(&a.id).await.unwrap().is_none());
        assert_eq!(
            docs.store
                .query_count("SELECT COUNT(*) FROM relationship\n")
                .unwrap(),
            0
        );
        assert!(docs.get(&b.id).is_ok());
    }

    #[tokio::test]
    async fn test_list_recent_and_count() {
        let dir = TempDir::new().unwrap();
        let docs = repo(&dir).await;

        let mut ids = Vec::new();
        for i in 0..3 {
            let doc = docs
                .create(NewDocument::new(format!("Doc {}", i), "text"))
                .await
                .unwrap()
                .document;
            ids.push(doc.id);
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        let recent = docs.list_recent(2).unwrap();
        let recent_ids: Vec<&str> = recent.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(recent_ids, vec![ids[2].as_str(), ids[1].as_str()]);
        assert_eq!(docs.count().unwrap(), 3);
        assert_eq!(docs.list_recent(usize::MAX).unwrap().len(), 3);

        let all: Vec<String> = docs.list_all().unwrap().into_iter().map(|d| d.id).collect();
        assert_eq!(all, ids);
    }

    #[tokio::test]
    async fn test_vector_write_failure_rolls_back_document() {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path());
        let store =
            crate::knowledge::Store::open_with_vectors(&config, Arc::new(FailingVectors)).unwrap();
        SchemaManager::new(store.clone()).ensure_schema().await.unwrap();

        let docs = DocumentRepository::new(store, Arc::new(HashingEmbedding::new(TEST_DIMENSION)));
        assert!(docs.create(NewDocument::new("Lost", "body")).await.is_err());
        assert_eq!(docs.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_retry_embeddings_recovers_failed() {
        let dir = TempDir::new().unwrap();
        let store = open_store(dir.path()).await;

        let offline =
            DocumentRepository::new(store.clone(), Arc::new(UnavailableEmbedding::new(TEST_DIMENSION)));
        let id = offline
            .create(NewDocument::new("Later", "embed me later"))
            .await
            .unwrap()
            .document
            .id;
        assert_eq!(offline.retry_embeddings(10).await.unwrap(), 0);

        let online = DocumentRepository::new(store, Arc::new(HashingEmbedding::new(TEST_DIMENSION)));
        assert_eq!(online.retry_embeddings(10).await.unwrap(), 1);
        assert_eq!(online.vector_status(&id).await.unwrap(), VectorStatus::Ready);
        assert_eq!(online.retry_embeddings(10).await.unwrap(), 0);
    }
}
