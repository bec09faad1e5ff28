//! 설정 모듈 - 환경변수 기반 런타임 설정
//!
//! `.env` 파일(있으면)을 먼저 읽고 `VESA_*` 환경변수로 설정을 구성합니다.
//! 값이 없으면 기본값을 사용하고, 잘못된 값은 키 이름과 함께 에러를 반환합니다.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::embedding::lookup_api_key;
use crate::knowledge::{Distance, IndexConfig, NeighborDirection, WikiError, WikiResult};

/// 기본 임베딩 타임아웃 (ms)
const DEFAULT_EMBEDDING_TIMEOUT_MS: u64 = 10_000;

/// 기본 검색 결과 수
const DEFAULT_SEARCH_LIMIT: usize = 10;

// ============================================================================
// Data Directory
// ============================================================================

/// 데이터 디렉토리 경로 (~/.vesa/)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".vesa")
}

// ============================================================================
// Types
// ============================================================================

/// 임베딩 프로바이더 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// Google Gemini API
    Gemini,
    /// 오프라인 해싱 임베딩
    Hashing,
    /// 임베딩 비활성화 (항상 폴백 검색)
    None,
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "hashing" | "hash" | "local" => Ok(Self::Hashing),
            "none" | "off" => Ok(Self::None),
            other => Err(format!("unknown provider '{}'", other)),
        }
    }
}

/// 런타임 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// 저장소 루트 (wiki.db, vectors.lance)
    pub data_dir: PathBuf,
    pub provider: ProviderKind,
    /// ANN 인덱스 설정
    pub index: IndexConfig,
    /// 임베딩 호출 제한 시간
    pub embedding_timeout: Duration,
    pub search_limit: usize,
    /// 관련 문서 방향 정책
    pub neighbor_direction: NeighborDirection,
}

impl Config {
    /// 지정된 데이터 디렉토리와 기본값으로 생성
    pub fn for_data_dir(data_dir: &Path) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
            provider: ProviderKind::Hashing,
            index: IndexConfig::default(),
            embedding_timeout: Duration::from_millis(DEFAULT_EMBEDDING_TIMEOUT_MS),
            search_limit: DEFAULT_SEARCH_LIMIT,
            neighbor_direction: NeighborDirection::Outgoing,
        }
    }

    /// `.env` + 프로세스 환경변수에서 로드
    pub fn from_env() -> WikiResult<Self> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!("Loaded environment from {:?}", path),
            Err(e) if e.not_found() => {}
            Err(e) => tracing::warn!("Failed to read .env file: {}", e),
        }

        Self::from_lookup(|key| std::env::var(key).ok().filter(|v| !v.trim().is_empty()))
    }

    /// 임의의 키 조회 함수로 설정 구성
    pub fn from_lookup<F>(lookup: F) -> WikiResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = lookup("VESA_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(get_data_dir);

        let mut config = Self::for_data_dir(&data_dir);

        config.provider = match lookup("VESA_EMBEDDING_PROVIDER") {
            Some(raw) => parse_value("VESA_EMBEDDING_PROVIDER", &raw)?,
            None if lookup_api_key(&lookup).is_some() => ProviderKind::Gemini,
            None => ProviderKind::Hashing,
        };

        if let Some(raw) = lookup("VESA_EMBEDDING_DIMENSION") {
            config.index.dimension = parse_value("VESA_EMBEDDING_DIMENSION", &raw)?;
        }
        if let Some(raw) = lookup("VESA_DISTANCE") {
            config.index.distance = parse_value("VESA_DISTANCE", &raw)?;
        }
        if let Some(raw) = lookup("VESA_HNSW_M") {
            config.index.m = parse_value("VESA_HNSW_M", &raw)?;
        }
        if let Some(raw) = lookup("VESA_HNSW_EF_CONSTRUCTION") {
            config.index.ef_construction = parse_value("VESA_HNSW_EF_CONSTRUCTION", &raw)?;
        }
        if let Some(raw) = lookup("VESA_HNSW_EF_SEARCH") {
            config.index.ef_search = parse_value("VESA_HNSW_EF_SEARCH", &raw)?;
        }
        if let Some(raw) = lookup("VESA_INDEX_MIN_ROWS") {
            config.index.min_rows = parse_value("VESA_INDEX_MIN_ROWS", &raw)?;
        }
        if let Some(raw) = lookup("VESA_EMBEDDING_TIMEOUT_MS") {
            let ms: u64 = parse_value("VESA_EMBEDDING_TIMEOUT_MS", &raw)?;
            config.embedding_timeout = Duration::from_millis(ms);
        }
        if let Some(raw) = lookup("VESA_SEARCH_LIMIT") {
            config.search_limit = parse_value("VESA_SEARCH_LIMIT", &raw)?;
        }
        if let Some(raw) = lookup("VESA_BIDIRECTIONAL_NEIGHBORS") {
            let both: bool = parse_value("VESA_BIDIRECTIONAL_NEIGHBORS", &raw)?;
            config.neighbor_direction = if both {
                NeighborDirection::Both
            } else {
                NeighborDirection::Outgoing
            };
        }

        Ok(config)
    }

    /// SQLite 파일 경로
    pub fn sqlite_path(&self) -> PathBuf {
        self.data_dir.join("wiki.db")
    }

    /// LanceDB 디렉토리 경로
    pub fn lance_path(&self) -> PathBuf {
        self.data_dir.join("vectors.lance")
    }
}

fn parse_value<T>(key: &str, raw: &str) -> WikiResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| WikiError::Config {
        key: key.to_string(),
        message: format!("invalid value '{}': {}", raw, e),
    })
}

// ============================================================================
// Tests
// ============================================================================
