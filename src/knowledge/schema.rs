//! Schema Manager - 세 릴레이션과 ANN 인덱스 프로비저닝
//!
//! - document, relationship: SQLite (`CREATE ... IF NOT EXISTS`)
//! - vector_document: LanceDB 테이블 + IVF-HNSW-SQ 인덱스
//!
//! 여러 프로세스가 동시에 처음 시작해도 안전합니다.
//! 경쟁으로 인한 "already exists"는 성공으로 취급합니다.

use std::fmt;
use std::str::FromStr;

use crate::embedding::DEFAULT_DIMENSION;

use super::error::{WikiError, WikiResult};
use super::store::Store;

/// 허용되는 최대 임베딩 차원
const MAX_DIMENSION: usize = 4096;

/// SQLite 릴레이션 정의
/// ref: https://www.sqlite.org/lang_createtable.html
const SQLITE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS document (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    content TEXT NOT NULL,
    tags TEXT NOT NULL DEFAULT '[]',
    author TEXT,
    path TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_document_updated_at ON document(updated_at);

CREATE TABLE IF NOT EXISTS relationship (
    source_id TEXT NOT NULL,
    target_id TEXT NOT NULL,
    relationship_type TEXT NOT NULL,
    properties TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    UNIQUE (source_id, target_id, relationship_type)
);

CREATE INDEX IF NOT EXISTS idx_relationship_target ON relationship(target_id);
"#;

/// 초기 스키마 이후 추가된 document 컬럼 (이름, 정의)
const DOCUMENT_ADDED_COLUMNS: &[(&str, &str)] = &[("path", "TEXT")];

/// 예전 데이터 디렉토리에 없는 컬럼 추가
/// ref: https://www.sqlite.org/pragma.html#pragma_table_info
fn add_missing_columns(
    conn: &rusqlite::Connection,
    table: &str,
    columns: &[(&str, &str)],
) -> WikiResult<()> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let existing = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<Vec<String>>>()?;

    for (name, definition) in columns {
        if existing.iter().any(|c| c == name) {
            continue;
        }
        conn.execute_batch(&format!("ALTER TABLE {} ADD COLUMN {} {}", table, name, definition))?;
        tracing::info!("Migrated {}: added column {}", table, name);
    }
    Ok(())
}

// ============================================================================
// Index Configuration
// ============================================================================

/// 거리 함수
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Distance {
    Cosine,
    L2,
    Dot,
}

impl Distance {
    /// 엔진 거리 -> 유사도 스코어 (높을수록 유사)
    ///
    /// cosine/dot 거리는 `1 - sim`, L2는 `1 / (1 + d)`로 변환합니다.
    pub fn score(&self, distance: f32) -> f32 {
        match self {
            Self::Cosine | Self::Dot => 1.0 - distance,
            Self::L2 => 1.0 / (1.0 + distance.max(0.0)),
        }
    }
}

impl fmt::Display for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Cosine => "cosine",
            Self::L2 => "l2",
            Self::Dot => "dot",
        };
        f.write_str(s)
    }
}

impl FromStr for Distance {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "l2" | "euclidean" => Ok(Self::L2),
            "dot" => Ok(Self::Dot),
            other => Err(format!("unknown distance '{}'", other)),
        }
    }
}

/// ANN 인덱스 설정 (프로세스 전역, 초기화 후 읽기 전용)
#[derive(Debug, Clone, PartialEq)]
pub struct IndexConfig {
    /// 임베딩 차원
    pub dimension: usize,
    pub distance: Distance,
    /// HNSW 그래프 차수 (M)
    pub m: u32,
    pub ef_construction: u32,
    pub ef_search: u32,
    /// 인덱스 학습에 필요한 최소 행 수 (그 전에는 flat 검색)
    pub min_rows: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_DIMENSION,
            distance: Distance::Cosine,
            m: 16,
            ef_construction: 200,
            ef_search: 64,
            min_rows: 256,
        }
    }
}

impl IndexConfig {
    /// 설정 검증
    pub fn validate(&self) -> WikiResult<()> {
        if self.dimension == 0 || self.dimension > MAX_DIMENSION {
            return Err(WikiError::Schema(format!(
                "invalid dimension {} (expected 1..={})",
                self.dimension, MAX_DIMENSION
            )));
        }
        if self.m < 2 {
            return Err(WikiError::Schema(format!("invalid HNSW m {}", self.m)));
        }
        if self.ef_construction == 0 || self.ef_search == 0 {
            return Err(WikiError::Schema("HNSW ef values must be positive".to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// SchemaManager
// ============================================================================

/// 스키마 관리자
pub struct SchemaManager {
    store: Store,
}

impl SchemaManager {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// 세 릴레이션 + ANN 인덱스 보장 (멱등)
    pub async fn ensure_schema(&self) -> WikiResult<()> {
        let config = &self.store.config().index;
        config.validate()?;

        self.store
            .with_conn(|conn| conn.execute_batch(SQLITE_SCHEMA).map_err(WikiError::from))
            .map_err(|e| WikiError::Schema(format!("failed to provision relations: {}", e)))?;
        self.store
            .with_conn(|conn| add_missing_columns(conn, "document", DOCUMENT_ADDED_COLUMNS))
            .map_err(|e| WikiError::Schema(format!("failed to migrate document: {}", e)))?;
        tracing::debug!("SQLite relations ready");

        let vectors = self.store.vectors();
        vectors
            .ensure_relation(config)
            .await
            .map_err(|e| WikiError::Schema(format!("failed to provision vector_document: {}", e)))?;

        match vectors.stored_dimension().await? {
            Some(stored) if stored != config.dimension => {
                return Err(WikiError::Schema(format!(
                    "vector_document stores {}-dim embeddings but index is configured for {}",
                    stored, config.dimension
                )));
            }
            _ => {}
        }

        self.ensure_ann_index().await?;

        tracing::info!(
            "Schema ready (dimension={}, distance={})",
            config.dimension,
            config.distance
        );
        Ok(())
    }

    /// 행 수가 `min_rows` 이상이면 HNSW 인덱스 생성
    ///
    /// 새로 생성했으면 true. 이미 있거나 행이 부족하면 false.
    pub async fn ensure_ann_index(&self) -> WikiResult<bool> {
        let config = &self.store.config().index;
        let created = self.store.vectors().ensure_index(config).await?;
        if created {
            tracing::info!("Built ANN index on vector_document.embedding");
        }
        Ok(created)
    }

    /// SQLite 릴레이션 정의 (이름, DDL)
    pub fn relation_definitions(&self) -> WikiResult<Vec<(String, String)>> {
        self.store.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT name, sql FROM sqlite_master
                 WHERE type IN ('table', 'index') AND sql IS NOT NULL
                 ORDER BY name",
            )?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<Result<Vec<(String, String)>, _>>()?;
            Ok(rows)
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
