//! Vector Store - vector_document 릴레이션 트레이트 및 타입
//!
//! 문서 하나에 VectorRecord 하나 (같은 id, 1:1).
//! 임베딩 생성 결과는 `status`로 기록되고, `ready`인 레코드만 ANN 검색 대상입니다.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::WikiResult;
use super::schema::IndexConfig;

// ============================================================================
// Types
// ============================================================================

/// 임베딩 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorStatus {
    /// 임베딩 완료, 검색 가능
    Ready,
    /// 프로바이더 타임아웃 - 재시도 대상
    Pending,
    /// 프로바이더 실패 - 재시도 대상
    Failed,
}

impl VectorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Pending => "pending",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for VectorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VectorStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ready" => Ok(Self::Ready),
            "pending" => Ok(Self::Pending),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown vector status '{}'", other)),
        }
    }
}

/// 벡터 레코드 (저장용)
///
/// `Ready`가 아닌 레코드의 `embedding`은 비어 있고, 저장 시 0 벡터로 채워집니다.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    /// 문서 ID (document.id)
    pub id: String,
    pub embedding: Vec<f32>,
    pub status: VectorStatus,
}

impl VectorRecord {
    pub fn ready(id: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            embedding,
            status: VectorStatus::Ready,
        }
    }

    /// 임베딩 없는 레코드 (pending/failed)
    pub fn placeholder(id: impl Into<String>, status: VectorStatus) -> Self {
        Self {
            id: id.into(),
            embedding: Vec::new(),
            status,
        }
    }
}

/// ANN 검색 결과
#[derive(Debug, Clone)]
pub struct VectorHit {
    /// 문서 ID
    pub id: String,
    /// 엔진이 반환한 거리
    pub distance: f32,
    /// 유사도 스코어 (높을수록 유사)
    pub score: f32,
}

/// 상태별 레코드 수
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VectorCounts {
    pub ready: usize,
    pub pending: usize,
    pub failed: usize,
}

impl VectorCounts {
    pub fn total(&self) -> usize {
        self.ready + self.pending + self.failed
    }
}

// ============================================================================
// VectorStore Trait
// ============================================================================

/// VectorStore 트레이트 (async)
///
/// vector_document 릴레이션과 ANN 인덱스의 공통 인터페이스입니다.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// 릴레이션이 없으면 생성 (이미 있으면 no-op)
    async fn ensure_relation(&self, config: &IndexConfig) -> WikiResult<()>;

    /// 저장된 임베딩 차원 (릴레이션이 없으면 None)
    async fn stored_dimension(&self) -> WikiResult<Option<usize>>;

    /// 행 수가 충분하면 ANN 인덱스 생성. 새로 만들었으면 true
    async fn ensure_index(&self, config: &IndexConfig) -> WikiResult<bool>;

    /// id 기준 삽입 또는 교체
    async fn upsert(&self, record: &VectorRecord) -> WikiResult<()>;

    /// id로 레코드 조회
    async fn get(&self, id: &str) -> WikiResult<Option<VectorRecord>>;

    /// id로 레코드 삭제, 삭제된 행 수 반환
    async fn delete(&self, id: &str) -> WikiResult<usize>;

    /// `ready` 레코드 대상 top-K 검색 (스코어 내림차순)
    async fn search(&self, query: &[f32], limit: usize) -> WikiResult<Vec<VectorHit>>;

    /// 지정 상태의 레코드 id 목록
    async fn ids_with_status(&self, status: VectorStatus, limit: usize) -> WikiResult<Vec<String>>;

    /// 상태별 개수
    async fn counts(&self) -> WikiResult<VectorCounts>;
}

// ============================================================================
// Tests
// ============================================================================
