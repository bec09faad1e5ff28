//! 임베딩 모듈 - 텍스트 벡터화 프로바이더
//!
//! 문서 저장소는 프로바이더를 불투명한 capability로 사용합니다.
//! 실패하거나 느릴 수 있으며, 그 경우 저장소가 `pending`/`failed` 상태나
//! 폴백 검색으로 흡수합니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = create_provider(&config)?;
//! let embedding = embedder.embed("Hello, world!").await?;
//! ```

mod gemini;
mod hashing;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::{Config, ProviderKind};
use crate::knowledge::{WikiError, WikiResult};

pub use gemini::{GeminiEmbedding, DEFAULT_DIMENSION};
pub use hashing::{HashingEmbedding, UnavailableEmbedding};

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 텍스트를 고정 차원 벡터로 변환하는 인터페이스입니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 문서 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 검색 쿼리 임베딩 (기본 구현: `embed`)
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(text).await
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// API Key Management
// ============================================================================

/// API 키 로드 (환경변수에서)
///
/// 우선순위:
/// 1. `GEMINI_API_KEY` 환경변수
/// 2. `GOOGLE_AI_API_KEY` 환경변수
pub fn get_api_key() -> Result<String> {
    if let Some((var, key)) = lookup_api_key(|var| std::env::var(var).ok()) {
        tracing::debug!("Using API key from {}", var);
        return Ok(key);
    }

    anyhow::bail!(
        "API key not found. Set GEMINI_API_KEY or GOOGLE_AI_API_KEY environment variable.\n\
         Get your API key at: https://aistudio.google.com/app/apikey"
    )
}

/// API 키 존재 여부 확인
pub fn has_api_key() -> bool {
    lookup_api_key(|var| std::env::var(var).ok()).is_some()
}

const API_KEY_VARS: [&str; 2] = ["GEMINI_API_KEY", "GOOGLE_AI_API_KEY"];

/// 우선순위대로 비어 있지 않은 첫 키를 찾음
pub(crate) fn lookup_api_key<F>(lookup: F) -> Option<(&'static str, String)>
where
    F: Fn(&str) -> Option<String>,
{
    API_KEY_VARS
        .iter()
        .find_map(|&var| lookup(var).filter(|key| !key.is_empty()).map(|key| (var, key)))
}

// ============================================================================
// Factory Function
// ============================================================================

/// 설정에 맞는 임베딩 프로바이더 생성
pub fn create_provider(config: &Config) -> WikiResult<Arc<dyn EmbeddingProvider>> {
    let dimension = config.index.dimension;

    let provider: Arc<dyn EmbeddingProvider> = match config.provider {
        ProviderKind::Gemini => {
            let embedder = GeminiEmbedding::from_env_with_dimension(dimension).map_err(|e| {
                WikiError::Config {
                    key: "VESA_EMBEDDING_PROVIDER".to_string(),
                    message: e.to_string(),
                }
            })?;
            Arc::new(embedder)
        }
        ProviderKind::Hashing => Arc::new(HashingEmbedding::new(dimension)),
        ProviderKind::None => Arc::new(UnavailableEmbedding::new(dimension)),
    };

    tracing::info!(
        "Using {} embedding (dimension: {})",
        provider.name(),
        provider.dimension()
    );
    Ok(provider)
}

// ============================================================================
// Tests
// ============================================================================
